//! The agent loop controller.
//!
//! A run validates configuration, rebuilds history from the session log, then
//! alternates between a streaming model call and sequential tool execution
//! until the model answers without tool calls, the iteration cap is reached,
//! or the caller aborts. Cancellation is cooperative: it is observed between
//! stream chunks and between tool calls, never in the middle of a tool.

use std::sync::Arc;
use std::time::Instant;
use serde_json::Value;
use skiff_config::Settings;
use skiff_core::memory::MemoryBackend;
use skiff_core::message::{Message, MessageToolCall};
use skiff_core::provider::{ChunkReceiver, Provider, ProviderRequest};
use skiff_core::session::{PersistedEvent, Session, SessionStore, SessionUpdate};
use skiff_tools::ToolExecutor;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use crate::assembler::{AssembledResponse, StreamAssembler};
use crate::error::{RunError, RunOutcome};
use crate::history::{self, HistoryContext};
use crate::stream_event::{AssistantContent, EventObserver, NoopObserver, PermissionMode, RunStatus, StreamEvent};

/// Callback receiving session fields the caller should persist.
pub type SessionUpdateFn = Arc<dyn Fn(SessionUpdate) + Send + Sync>;

const TITLE_MAX_CHARS: usize = 50;

/// Orchestrates model calls and tool execution for one session at a time.
pub struct AgentRunner {
    provider: Arc<dyn Provider>,

    /// Tool dispatch, confined to the session's working directory
    executor: Arc<ToolExecutor>,

    /// Snapshot taken when the runner was built
    settings: Settings,

    /// Event log used to rebuild history; absent means no history
    store: Option<Arc<dyn SessionStore>>,

    /// Source of the memory section, when the memory feature is on
    memory: Option<Arc<dyn MemoryBackend>>,

    observer: Arc<dyn EventObserver>,

    on_session_update: Option<SessionUpdateFn>,

    /// Maximum memories listed into the first prompt
    recall_limit: usize,
}

impl AgentRunner {
    pub fn new(provider: Arc<dyn Provider>, executor: Arc<ToolExecutor>, settings: Settings) -> Self {
        Self {
            provider,
            executor,
            settings,
            store: None,
            memory: None,
            observer: Arc::new(NoopObserver),
            on_session_update: None,
            recall_limit: 20,
        }
    }

    /// Attach the session log.
    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Attach a memory backend. Only consulted when `features.memory` is on.
    pub fn with_memory(mut self, memory: Arc<dyn MemoryBackend>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn EventObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_session_update(mut self, callback: SessionUpdateFn) -> Self {
        self.on_session_update = Some(callback);
        self
    }

    pub fn with_recall_limit(mut self, limit: usize) -> Self {
        self.recall_limit = limit;
        self
    }

    /// Spawn the run in the background and return immediately.
    pub fn start(self: Arc<Self>, session: Session, prompt: impl Into<String>) -> RunHandle {
        let token = CancellationToken::new();
        let prompt = prompt.into();
        let run_token = token.clone();
        let join = tokio::spawn(async move { self.run(&session, &prompt, run_token).await });
        RunHandle { token, join }
    }

    /// Drive one run to completion. Never panics and never returns an error
    /// directly: failures are reported as a `SessionStatus` event and
    /// `RunOutcome::Failed`.
    pub async fn run(&self, session: &Session, prompt: &str, token: CancellationToken) -> RunOutcome {
        let started = Instant::now();
        info!(session_id = %session.id, provider = self.provider.name(), "Agent run started");

        let outcome = match self.drive(session, prompt, &token, started).await {
            Ok(Some(text)) => RunOutcome::Completed { text },
            Ok(None) => {
                info!(session_id = %session.id, "Agent run aborted");
                RunOutcome::Aborted
            }
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "Agent run failed");
                self.emit(StreamEvent::SessionStatus {
                    status: RunStatus::Error,
                    message: Some(e.to_string()),
                });
                RunOutcome::Failed(e)
            }
        };

        info!(
            session_id = %session.id,
            completed = outcome.is_completed(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Agent run finished"
        );
        outcome
    }

    /// `Ok(None)` means the run was aborted.
    async fn drive(
        &self,
        session: &Session,
        prompt: &str,
        token: &CancellationToken,
        started: Instant,
    ) -> Result<Option<String>, RunError> {
        let endpoint = self.settings.require_model_endpoint()?;

        let events = self.load_history(&session.id).await;
        let ctx = HistoryContext::new(&session.working_dir)
            .with_memory_section(self.memory_section().await);
        let mut messages = history::build_history(&events, Some(prompt), session.last_prompt.as_deref(), &ctx);

        if history::is_new_prompt(&events, prompt, session.last_prompt.as_deref()) {
            self.record(&session.id, PersistedEvent::UserPrompt { text: prompt.to_string() })
                .await;
        } else {
            debug!(session_id = %session.id, "Prompt matches the last recorded prompt, not appending");
        }

        self.emit(StreamEvent::SystemInit {
            session_id: session.id.clone(),
            cwd: session.working_dir.display().to_string(),
            model: endpoint.model.clone(),
            tools: self.executor.tool_names(),
            permission_mode: PermissionMode::Default,
        });
        self.report_session_update(session, prompt);

        let tools = self.executor.definitions();
        let max_iterations = self.settings.max_iterations;

        for iteration in 1..=max_iterations {
            if token.is_cancelled() {
                return Ok(None);
            }
            debug!(session_id = %session.id, iteration, messages = messages.len(), "Agent iteration");

            let request = ProviderRequest {
                model: endpoint.model.clone(),
                messages: messages.clone(),
                temperature: self.settings.temperature,
                max_tokens: self.settings.max_tokens,
                tools: tools.clone(),
                stream: true,
            };

            let rx = tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(None),
                rx = self.provider.stream(request) => rx?,
            };

            let Some(response) = self.consume_stream(rx, token).await? else {
                return Ok(None);
            };

            if response.tool_calls.is_empty() {
                self.finish(session, &response.text, iteration, started).await;
                return Ok(Some(response.text));
            }

            if !self
                .dispatch_tools(session, response, &mut messages, token)
                .await
            {
                return Ok(None);
            }
        }

        Err(RunError::BudgetExceeded { max_iterations })
    }

    /// Feed the stream through a fresh assembler. `Ok(None)` on abort; the
    /// receiver is dropped and whatever the provider still sends is discarded.
    async fn consume_stream(
        &self,
        mut rx: ChunkReceiver,
        token: &CancellationToken,
    ) -> Result<Option<AssembledResponse>, RunError> {
        let mut assembler = StreamAssembler::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(None),
                next = rx.recv() => next,
            };

            match next {
                None => break,
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(chunk)) => {
                    for event in assembler.push(&chunk) {
                        self.emit(event);
                    }
                    if let Some(usage) = &chunk.usage {
                        debug!(
                            prompt_tokens = usage.prompt_tokens,
                            completion_tokens = usage.completion_tokens,
                            "Model usage"
                        );
                    }
                    if chunk.done {
                        break;
                    }
                }
            }
        }

        let (response, stop) = assembler.finish();
        if let Some(stop) = stop {
            self.emit(stop);
        }
        Ok(Some(response))
    }

    async fn finish(&self, session: &Session, text: &str, num_turns: u32, started: Instant) {
        self.emit(StreamEvent::Assistant {
            content: AssistantContent::Text { text: text.to_string() },
        });
        if !text.is_empty() {
            self.record(&session.id, PersistedEvent::Text { text: text.to_string() })
                .await;
        }
        self.emit(StreamEvent::Result {
            result: text.to_string(),
            is_error: false,
            num_turns,
            duration_ms: started.elapsed().as_millis() as u64,
            total_cost_usd: 0.0,
        });
        self.emit(StreamEvent::SessionStatus {
            status: RunStatus::Completed,
            message: None,
        });
    }

    /// Run every call of one response in order. Returns `false` on abort.
    async fn dispatch_tools(
        &self,
        session: &Session,
        response: AssembledResponse,
        messages: &mut Vec<Message>,
        token: &CancellationToken,
    ) -> bool {
        let AssembledResponse { text, tool_calls } = response;
        messages.push(Message::assistant_with_tools(text.clone(), tool_calls.clone()));

        if !text.is_empty() {
            self.emit(StreamEvent::Assistant {
                content: AssistantContent::Text { text: text.clone() },
            });
            self.record(&session.id, PersistedEvent::Text { text }).await;
        }

        let inputs: Vec<Value> = tool_calls.iter().map(call_input).collect();
        for (call, input) in tool_calls.iter().zip(&inputs) {
            self.emit(StreamEvent::Assistant {
                content: AssistantContent::ToolUse {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: input.clone(),
                },
            });
            self.record(
                &session.id,
                PersistedEvent::ToolUse {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: input.clone(),
                },
            )
            .await;
        }

        for (call, input) in tool_calls.iter().zip(inputs) {
            if token.is_cancelled() {
                return false;
            }

            self.emit(StreamEvent::PermissionRequest {
                tool_use_id: call.id.clone(),
                tool_name: call.name.clone(),
                input,
                mode: PermissionMode::Default,
            });

            debug!(tool = %call.name, id = %call.id, "Executing tool call");
            let result = self.executor.execute_tool(&call.name, &call.arguments).await;
            let content = result.to_content();
            if !result.success {
                warn!(tool = %call.name, id = %call.id, error = %content, "Tool call failed");
            }

            messages.push(Message::tool_result(&call.id, &call.name, &content));
            self.emit(StreamEvent::ToolResult {
                tool_use_id: call.id.clone(),
                tool_name: call.name.clone(),
                content: content.clone(),
                is_error: !result.success,
            });
            self.record(
                &session.id,
                PersistedEvent::ToolResult {
                    tool_use_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    content,
                    is_error: !result.success,
                },
            )
            .await;
        }

        true
    }

    async fn load_history(&self, session_id: &str) -> Vec<PersistedEvent> {
        let Some(store) = &self.store else {
            return vec![];
        };
        match store.get_session_history(session_id).await {
            Ok(events) => {
                debug!(session_id, events = events.len(), store = store.name(), "Loaded session history");
                events
            }
            Err(e) => {
                warn!(session_id, error = %e, "Failed to load session history, starting fresh");
                vec![]
            }
        }
    }

    async fn memory_section(&self) -> Option<String> {
        if !self.settings.features.memory {
            return None;
        }
        let memory = self.memory.as_ref()?;
        match memory.list(self.recall_limit).await {
            Ok(entries) => {
                if !entries.is_empty() {
                    debug!(count = entries.len(), "Recalled memories for prompt");
                }
                history::render_memory_section(&entries)
            }
            Err(e) => {
                warn!("Memory recall failed: {e}");
                None
            }
        }
    }

    async fn record(&self, session_id: &str, event: PersistedEvent) {
        if let Some(store) = &self.store
            && let Err(e) = store.record_message(session_id, event).await
        {
            warn!(session_id, error = %e, "Failed to record session event");
        }
    }

    fn report_session_update(&self, session: &Session, prompt: &str) {
        let Some(callback) = &self.on_session_update else {
            return;
        };
        let update = SessionUpdate {
            resume_session_id: (session.resume_session_id.as_deref() != Some(session.id.as_str()))
                .then(|| session.id.clone()),
            title: session.title.is_empty().then(|| title_from(prompt)),
        };
        callback(update);
    }

    fn emit(&self, event: StreamEvent) {
        self.observer.on_event(&event);
    }
}

/// Tool input for events and the log: parsed arguments, or the raw string
/// when they are not valid JSON.
fn call_input(call: &MessageToolCall) -> Value {
    if call.arguments.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(&call.arguments).unwrap_or_else(|_| Value::String(call.arguments.clone()))
}

fn title_from(prompt: &str) -> String {
    let first_line = prompt.lines().next().unwrap_or_default().trim();
    match first_line.char_indices().nth(TITLE_MAX_CHARS) {
        Some((cut, _)) => format!("{}...", &first_line[..cut]),
        None => first_line.to_string(),
    }
}

/// Handle to a background run.
pub struct RunHandle {
    token: CancellationToken,
    join: JoinHandle<RunOutcome>,
}

impl RunHandle {
    /// Request cancellation. Idempotent; takes effect at the next poll point.
    pub fn abort(&self) {
        self.token.cancel();
    }

    /// A token that aborts this run when cancelled, for signal handlers and
    /// other tasks that cannot hold the handle.
    pub fn abort_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the run to end.
    pub async fn finished(self) -> RunOutcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) => RunOutcome::Failed(RunError::Internal(format!("Agent task failed: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use skiff_core::error::{ProviderError, StoreError};
    use skiff_core::provider::{StreamChunk, ToolCallDelta};
    use skiff_store::{InMemoryBackend, InMemorySessionStore};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Replays one scripted response per request. Once the script runs out
    /// the last response repeats.
    struct ScriptedProvider {
        script: Mutex<VecDeque<Vec<StreamChunk>>>,
        last: Mutex<Vec<StreamChunk>>,
        requests: Mutex<Vec<ProviderRequest>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<Vec<StreamChunk>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(responses.into()),
                last: Mutex::new(Vec::new()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
            self.requests.lock().unwrap().push(request);
            let chunks = match self.script.lock().unwrap().pop_front() {
                Some(chunks) => {
                    *self.last.lock().unwrap() = chunks.clone();
                    chunks
                }
                None => self.last.lock().unwrap().clone(),
            };
            let (tx, rx) = mpsc::channel(chunks.len().max(1));
            for chunk in chunks {
                let _ = tx.try_send(Ok(chunk));
            }
            Ok(rx)
        }
    }

    /// Never finishes its stream.
    struct StalledProvider {
        senders: Mutex<Vec<mpsc::Sender<Result<StreamChunk, ProviderError>>>>,
    }

    #[async_trait]
    impl Provider for StalledProvider {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn stream(&self, _request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
            let (tx, rx) = mpsc::channel(4);
            let _ = tx.try_send(Ok(StreamChunk::text("Thinking")));
            self.senders.lock().unwrap().push(tx);
            Ok(rx)
        }
    }

    struct FailingStore;

    #[async_trait]
    impl SessionStore for FailingStore {
        fn name(&self) -> &str {
            "failing"
        }

        async fn record_message(&self, _session_id: &str, _event: PersistedEvent) -> Result<(), StoreError> {
            Err(StoreError::Storage("disk full".into()))
        }

        async fn get_session_history(&self, _session_id: &str) -> Result<Vec<PersistedEvent>, StoreError> {
            Err(StoreError::Storage("disk full".into()))
        }
    }

    fn settings() -> Settings {
        Settings {
            api_url: Some("http://localhost:9/v1".into()),
            model: Some("test-model".into()),
            ..Settings::default()
        }
    }

    fn text_response(text: &str) -> Vec<StreamChunk> {
        vec![
            StreamChunk::text(text),
            StreamChunk {
                done: true,
                ..Default::default()
            },
        ]
    }

    fn tool_response(id: &str, name: &str, arguments: &str) -> Vec<StreamChunk> {
        vec![StreamChunk::tool_calls(vec![ToolCallDelta {
            index: 0,
            id: Some(id.into()),
            name: Some(name.into()),
            arguments: Some(arguments.into()),
        }])]
    }

    type Events = Arc<Mutex<Vec<StreamEvent>>>;

    fn runner(provider: Arc<dyn Provider>, dir: &std::path::Path, settings: Settings) -> (AgentRunner, Events) {
        let executor = Arc::new(ToolExecutor::from_settings(dir, &settings, None));
        let events: Events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let observer = move |e: &StreamEvent| sink.lock().unwrap().push(e.clone());
        let runner = AgentRunner::new(provider, executor, settings).with_observer(Arc::new(observer));
        (runner, events)
    }

    fn types(events: &Events) -> Vec<&'static str> {
        events.lock().unwrap().iter().map(|e| e.event_type()).collect()
    }

    fn results(events: &Events) -> Vec<StreamEvent> {
        events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, StreamEvent::Result { .. }))
            .cloned()
            .collect()
    }

    fn last_status(events: &Events) -> Option<(RunStatus, Option<String>)> {
        events.lock().unwrap().iter().rev().find_map(|e| match e {
            StreamEvent::SessionStatus { status, message } => Some((*status, message.clone())),
            _ => None,
        })
    }

    #[tokio::test]
    async fn text_only_response_completes() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new(vec![text_response("All done.")]);
        let (runner, events) = runner(provider.clone(), dir.path(), settings());

        let outcome = runner
            .run(&Session::new(dir.path()), "say hi", CancellationToken::new())
            .await;

        assert_eq!(outcome.text(), Some("All done."));
        assert_eq!(
            types(&events),
            vec![
                "system_init",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "assistant",
                "result",
                "session_status",
            ]
        );
        let results = results(&events);
        assert_eq!(results.len(), 1);
        match &results[0] {
            StreamEvent::Result { result, is_error, num_turns, total_cost_usd, .. } => {
                assert_eq!(result, "All done.");
                assert!(!is_error);
                assert_eq!(*num_turns, 1);
                assert_eq!(*total_cost_usd, 0.0);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(last_status(&events), Some((RunStatus::Completed, None)));

        let requests = provider.requests.lock().unwrap();
        assert!(requests[0].stream);
        assert_eq!(requests[0].model, "test-model");
        assert_eq!(requests[0].tools[0].name, "Bash");
    }

    #[tokio::test]
    async fn tool_call_then_answer() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello\n").unwrap();
        let provider = ScriptedProvider::new(vec![
            tool_response("c1", "Read", r#"{"path":"a.txt"}"#),
            text_response("It says hello."),
        ]);
        let (runner, events) = runner(provider.clone(), dir.path(), settings());

        let outcome = runner
            .run(&Session::new(dir.path()), "what is in a.txt?", CancellationToken::new())
            .await;
        assert_eq!(outcome.text(), Some("It says hello."));

        let evs = events.lock().unwrap().clone();
        let perm = evs
            .iter()
            .position(|e| matches!(e, StreamEvent::PermissionRequest { .. }))
            .unwrap();
        let result = evs
            .iter()
            .position(|e| matches!(e, StreamEvent::ToolResult { .. }))
            .unwrap();
        assert!(perm < result);
        match &evs[result] {
            StreamEvent::ToolResult { tool_use_id, content, is_error, .. } => {
                assert_eq!(tool_use_id, "c1");
                assert_eq!(content, "     1\thello");
                assert!(!is_error);
            }
            other => panic!("unexpected event {other:?}"),
        }

        // Second request carries the assistant call and its result
        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        let tail = &requests[1].messages[requests[1].messages.len() - 2..];
        assert_eq!(tail[0].tool_calls()[0].id, "c1");
        assert_eq!(tail[1].content(), "     1\thello");
    }

    #[tokio::test]
    async fn unknown_tool_and_unsafe_path_feed_back_to_model() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new(vec![
            vec![StreamChunk::tool_calls(vec![
                ToolCallDelta {
                    index: 0,
                    id: Some("c1".into()),
                    name: Some("Teleport".into()),
                    arguments: Some("{}".into()),
                },
                ToolCallDelta {
                    index: 1,
                    id: Some("c2".into()),
                    name: Some("Read".into()),
                    arguments: Some(r#"{"path":"../../etc/passwd"}"#.into()),
                },
            ])],
            text_response("Sorry."),
        ]);
        let (runner, events) = runner(provider, dir.path(), settings());

        let outcome = runner
            .run(&Session::new(dir.path()), "go", CancellationToken::new())
            .await;
        assert!(outcome.is_completed());

        let tool_results: Vec<(String, bool)> = events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                StreamEvent::ToolResult { content, is_error, .. } => Some((content.clone(), *is_error)),
                _ => None,
            })
            .collect();
        assert_eq!(tool_results.len(), 2);
        assert_eq!(tool_results[0], ("Error: Unknown tool: Teleport".to_string(), true));
        assert!(tool_results[1].0.contains("outside working directory"));
        assert!(tool_results[1].1);
    }

    #[tokio::test]
    async fn budget_exceeded_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new(vec![tool_response("c1", "Glob", r#"{"pattern":"*"}"#)]);
        let (runner, events) = runner(provider.clone(), dir.path(), settings());

        let outcome = runner
            .run(&Session::new(dir.path()), "loop forever", CancellationToken::new())
            .await;

        assert!(matches!(
            outcome,
            RunOutcome::Failed(RunError::BudgetExceeded { max_iterations: 50 })
        ));
        assert_eq!(provider.request_count(), 50);
        assert!(results(&events).is_empty());
        let (status, message) = last_status(&events).unwrap();
        assert_eq!(status, RunStatus::Error);
        assert!(message.unwrap().contains("iteration limit"));
    }

    #[tokio::test]
    async fn missing_model_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new(vec![text_response("unused")]);
        let settings = Settings {
            model: None,
            ..settings()
        };
        let (runner, events) = runner(provider.clone(), dir.path(), settings);

        let outcome = runner
            .run(&Session::new(dir.path()), "hi", CancellationToken::new())
            .await;

        assert!(matches!(outcome, RunOutcome::Failed(RunError::Config(_))));
        assert_eq!(provider.request_count(), 0);
        assert_eq!(types(&events), vec!["session_status"]);
    }

    #[tokio::test]
    async fn provider_error_ends_with_error_status() {
        struct Down;

        #[async_trait]
        impl Provider for Down {
            fn name(&self) -> &str {
                "down"
            }

            async fn stream(&self, _request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
                Err(ProviderError::Network("connection refused".into()))
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let (runner, events) = runner(Arc::new(Down), dir.path(), settings());
        let outcome = runner
            .run(&Session::new(dir.path()), "hi", CancellationToken::new())
            .await;

        assert!(matches!(outcome, RunOutcome::Failed(RunError::Provider(_))));
        let (status, message) = last_status(&events).unwrap();
        assert_eq!(status, RunStatus::Error);
        assert_eq!(message.as_deref(), Some("Network error: connection refused"));
    }

    #[tokio::test]
    async fn abort_during_stream() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(StalledProvider {
            senders: Mutex::new(Vec::new()),
        });
        let (runner, events) = runner(provider, dir.path(), settings());

        let handle = Arc::new(runner).start(Session::new(dir.path()), "think hard");
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        handle.abort();
        handle.abort();

        let outcome = tokio::time::timeout(std::time::Duration::from_secs(5), handle.finished())
            .await
            .unwrap();
        assert!(matches!(outcome, RunOutcome::Aborted));
        assert!(results(&events).is_empty());
        assert!(last_status(&events).is_none());
    }

    #[tokio::test]
    async fn abort_between_tool_calls() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new(vec![vec![StreamChunk::tool_calls(vec![
            ToolCallDelta {
                index: 0,
                id: Some("c1".into()),
                name: Some("Write".into()),
                arguments: Some(r#"{"path":"one.txt","content":"1"}"#.into()),
            },
            ToolCallDelta {
                index: 1,
                id: Some("c2".into()),
                name: Some("Write".into()),
                arguments: Some(r#"{"path":"two.txt","content":"2"}"#.into()),
            },
        ])]]);

        let token = CancellationToken::new();
        let cancel = token.clone();
        let executor = Arc::new(ToolExecutor::from_settings(dir.path(), &settings(), None));
        let observer = move |e: &StreamEvent| {
            if matches!(e, StreamEvent::ToolResult { .. }) {
                cancel.cancel();
            }
        };
        let runner = AgentRunner::new(provider.clone(), executor, settings()).with_observer(Arc::new(observer));

        let outcome = runner.run(&Session::new(dir.path()), "write both", token).await;
        assert!(matches!(outcome, RunOutcome::Aborted));
        assert!(dir.path().join("one.txt").exists());
        assert!(!dir.path().join("two.txt").exists());
        assert_eq!(provider.request_count(), 1);
    }

    #[tokio::test]
    async fn records_log_and_resumes_without_duplicating_prompt() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello\n").unwrap();
        let store = Arc::new(InMemorySessionStore::new());
        let provider = ScriptedProvider::new(vec![
            tool_response("c1", "Read", r#"{"path":"a.txt"}"#),
            text_response("It says hello."),
            text_response("Still hello."),
        ]);
        let (runner, _) = runner(provider.clone(), dir.path(), settings());
        let runner = runner.with_store(store.clone());
        let session = Session::new(dir.path()).with_id("s1");

        runner.run(&session, "read a.txt", CancellationToken::new()).await;

        let logged: Vec<PersistedEvent> = store.records("s1").await.into_iter().map(|r| r.event).collect();
        assert_eq!(logged.len(), 4);
        assert_eq!(logged[0], PersistedEvent::UserPrompt { text: "read a.txt".into() });
        assert!(matches!(&logged[1], PersistedEvent::ToolUse { id, input, .. } if id == "c1" && input["path"] == "a.txt"));
        assert!(matches!(&logged[2], PersistedEvent::ToolResult { is_error: false, .. }));
        assert_eq!(logged[3], PersistedEvent::Text { text: "It says hello.".into() });

        // Same prompt again: replayed, not appended
        runner.run(&session, "read a.txt", CancellationToken::new()).await;
        let requests = provider.requests.lock().unwrap();
        let replay = &requests[2].messages;
        let user_turns = replay.iter().filter(|m| m.role() == skiff_core::message::Role::User).count();
        assert_eq!(user_turns, 1);
        assert!(replay[2].content().contains("[Tool result: Read]"));
        assert_eq!(store.records("s1").await.len(), 5);
    }

    #[tokio::test]
    async fn persistence_failures_are_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new(vec![text_response("fine")]);
        let (runner, _) = runner(provider, dir.path(), settings());
        let runner = runner.with_store(Arc::new(FailingStore));

        let outcome = runner
            .run(&Session::new(dir.path()), "hi", CancellationToken::new())
            .await;
        assert_eq!(outcome.text(), Some("fine"));
    }

    #[tokio::test]
    async fn session_update_reported_once() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new(vec![tool_response("c1", "Glob", r#"{"pattern":"*"}"#), text_response("ok")]);
        let updates = Arc::new(Mutex::new(Vec::new()));
        let sink = updates.clone();
        let (runner, _) = runner(provider, dir.path(), settings());
        let runner = runner.with_session_update(Arc::new(move |u: SessionUpdate| sink.lock().unwrap().push(u)));

        let session = Session::new(dir.path()).with_id("s9");
        runner.run(&session, "find everything in this repository please, including hidden", CancellationToken::new()).await;

        let updates = updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].resume_session_id.as_deref(), Some("s9"));
        let title = updates[0].title.as_deref().unwrap();
        assert!(title.ends_with("..."));
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS + 3);
    }

    #[tokio::test]
    async fn memory_section_only_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let memory = Arc::new(InMemoryBackend::new());
        memory
            .store(skiff_core::memory::MemoryEntry::new("User prefers tabs", vec![]))
            .await
            .unwrap();

        for enabled in [false, true] {
            let provider = ScriptedProvider::new(vec![text_response("ok")]);
            let mut settings = settings();
            settings.features.memory = enabled;
            let (runner, _) = runner(provider.clone(), dir.path(), settings);
            let runner = runner.with_memory(memory.clone());
            runner
                .run(&Session::new(dir.path()), "format code", CancellationToken::new())
                .await;

            let requests = provider.requests.lock().unwrap();
            let prompt = requests[0].messages.last().unwrap().content().to_string();
            assert_eq!(prompt.contains("User prefers tabs"), enabled);
        }
    }

    #[test]
    fn tool_input_falls_back_to_raw_text() {
        let call = |args: &str| MessageToolCall {
            id: "c".into(),
            name: "Bash".into(),
            arguments: args.into(),
        };
        assert_eq!(call_input(&call(r#"{"command":"ls"}"#))["command"], "ls");
        assert_eq!(call_input(&call("not json")), Value::String("not json".into()));
        assert_eq!(call_input(&call("")), serde_json::json!({}));
        assert_eq!(title_from("short\nsecond line"), "short");
    }
}
