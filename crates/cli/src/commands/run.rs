//! `skiff run`: Run the agent on one prompt.
//!
//! Events are printed to stdout as JSON lines. Ctrl-C aborts the run at its
//! next poll point.

use std::path::PathBuf;
use std::sync::Arc;
use skiff_agent::{AgentRunner, RunOutcome, StreamEvent};
use skiff_config::Settings;
use skiff_core::memory::MemoryBackend;
use skiff_core::session::{Session, SessionUpdate};
use skiff_providers::openai_compat::OpenAiCompatProvider;
use skiff_store::{FileBackend, JsonlSessionStore};
use skiff_tools::ToolExecutor;
use tracing::{info, warn};

pub struct RunArgs {
    pub message: String,
    pub cwd: Option<PathBuf>,
    pub session: Option<String>,
    pub resume: bool,
}

/// One event as a single JSON line.
pub fn event_line(event: &StreamEvent) -> String {
    serde_json::to_string(event).unwrap_or_else(|e| {
        format!(r#"{{"type":"session_status","status":"error","message":"Failed to serialize event: {e}"}}"#)
    })
}

pub async fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let working_dir = match args.cwd {
        Some(dir) => std::path::absolute(dir)?,
        None => std::env::current_dir()?,
    };
    if !working_dir.is_dir() {
        return Err(format!("Working directory does not exist: {}", working_dir.display()).into());
    }

    let store = Arc::new(JsonlSessionStore::new(Settings::sessions_dir()));
    let session_id = match (args.session, args.resume) {
        (Some(id), _) => Some(id),
        (None, true) => {
            let latest = store.latest_session().await?;
            if latest.is_none() {
                warn!("No previous session to resume, starting a new one");
            }
            latest
        }
        (None, false) => None,
    };
    let session = match session_id {
        Some(id) => Session::new(&working_dir).with_id(id.clone()).resuming(id),
        None => Session::new(&working_dir),
    };
    info!(session_id = %session.id, cwd = %working_dir.display(), "Starting session");

    let memory: Option<Arc<dyn MemoryBackend>> = settings
        .features
        .memory
        .then(|| Arc::new(FileBackend::new(Settings::memory_path())) as Arc<dyn MemoryBackend>);

    let provider = Arc::new(OpenAiCompatProvider::from_settings(&settings)?);
    let executor = Arc::new(ToolExecutor::from_settings(&working_dir, &settings, memory.clone()));

    let observer = |event: &StreamEvent| println!("{}", event_line(event));
    let on_update = |update: SessionUpdate| {
        if let Some(id) = &update.resume_session_id {
            info!(session_id = %id, "Resume this session with --session {id}");
        }
        if let Some(title) = &update.title {
            info!(title = %title, "Session title");
        }
    };

    let mut runner = AgentRunner::new(provider, executor, settings)
        .with_store(store)
        .with_observer(Arc::new(observer))
        .with_session_update(Arc::new(on_update));
    if let Some(memory) = memory {
        runner = runner.with_memory(memory);
    }

    let handle = Arc::new(runner).start(session, args.message);
    let abort = handle.abort_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, aborting run");
            abort.cancel();
        }
    });
    let outcome = handle.finished().await;

    match outcome {
        RunOutcome::Completed { .. } | RunOutcome::Aborted => Ok(()),
        RunOutcome::Failed(e) => Err(e.into()),
    }
}
