//! Run-level failures.

use skiff_config::ConfigError;
use skiff_core::error::ProviderError;
use thiserror::Error;

/// Why a run ended in the error state.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Reached the iteration limit ({max_iterations}) without a final answer")]
    BudgetExceeded { max_iterations: u32 },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// The model produced a final answer.
    Completed { text: String },

    /// The caller cancelled the run.
    Aborted,

    Failed(RunError),
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// The final answer, if the run completed.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Completed { text } => Some(text),
            _ => None,
        }
    }
}
