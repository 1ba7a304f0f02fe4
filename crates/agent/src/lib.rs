//! The skiff agent loop.
//!
//! The runner follows a **stream → dispatch → feed back** cycle:
//!
//! 1. **Rebuild history** from the session's event log (system message,
//!    replayed turns, the new prompt)
//! 2. **Stream** the model response, assembling text and indexed tool-call
//!    fragments as they arrive
//! 3. **If tool calls**: run them one at a time through the `ToolExecutor`,
//!    append their results, loop back to step 2
//! 4. **If text only**: emit the final result and stop
//!
//! The loop ends early when the iteration cap is reached or the caller aborts.

pub mod assembler;
pub mod error;
pub mod history;
pub mod loop_runner;
pub mod stream_event;

pub use assembler::{AssembledResponse, StreamAssembler};
pub use error::{RunError, RunOutcome};
pub use history::{HistoryContext, build_history};
pub use loop_runner::{AgentRunner, RunHandle, SessionUpdateFn};
pub use stream_event::{AssistantContent, EventObserver, NoopObserver, PermissionMode, RunStatus, StreamEvent};
