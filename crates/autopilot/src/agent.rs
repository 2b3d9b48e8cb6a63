use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::accumulator::{ActionObserver, ResponseAccumulator};
use crate::config::AgentSettings;
use crate::context::{feedback_message, trim_ledger};
use crate::errors::{AgentError, AgentResult};
use crate::models::action::{AgentAction, AgenticResponse, Termination};
use crate::models::message::{Message, MessageKind};
use crate::project::ProjectCache;
use crate::prompt_template::system_prompt;
use crate::protocol;
use crate::providers::base::Provider;
use crate::systems::ToolCatalog;
use crate::workspace::{CommandRunner, FileSystem, LocalFileSystem, ShellRunner};

/// Agent drives a text generation provider through the tools in its catalog
pub struct Agent {
    provider: Box<dyn Provider>,
    catalog: ToolCatalog,
    project: ProjectCache,
    settings: AgentSettings,
    messages: Vec<Message>,
    project_context_injected: bool,
    observer: Option<ActionObserver>,
}

impl Agent {
    pub fn new(
        provider: Box<dyn Provider>,
        catalog: ToolCatalog,
        project: ProjectCache,
        settings: AgentSettings,
    ) -> Self {
        Self {
            provider,
            catalog,
            project,
            settings,
            messages: Vec::new(),
            project_context_injected: false,
            observer: None,
        }
    }

    /// An agent with every built-in system, working on `settings.working_dir`
    pub fn local(provider: Box<dyn Provider>, settings: AgentSettings) -> AgentResult<Self> {
        let local = LocalFileSystem::new(&settings.working_dir)?;
        let runner: Arc<dyn CommandRunner> = Arc::new(ShellRunner::new(local.root()));
        let fs: Arc<dyn FileSystem> = Arc::new(local);
        let catalog = ToolCatalog::developer(fs.clone(), runner)?;
        Ok(Self::new(provider, catalog, ProjectCache::new(fs), settings))
    }

    /// Receive every action as it happens
    pub fn with_observer(mut self, observer: ActionObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn history(&self) -> &[Message] {
        &self.messages
    }

    /// Forget the conversation. The project summary is sent again on the next turn.
    pub fn clear_history(&mut self) {
        self.messages.clear();
        self.project_context_injected = false;
    }

    /// Drop the cached project understanding so the next turn analyzes the tree again
    pub async fn invalidate_project(&mut self) {
        self.project.clear().await;
        self.project_context_injected = false;
    }

    /// Handle one user turn, streaming generated text to `on_chunk`
    pub async fn chat<F>(&mut self, text: &str, on_chunk: F) -> AgentResult<AgenticResponse>
    where
        F: FnMut(&str),
    {
        self.chat_with_cancel(text, on_chunk, CancellationToken::new())
            .await
    }

    /// Like `chat`, but the turn stops with `Cancelled` as soon as `cancel`
    /// fires. In-flight tool calls settle as cancelled and running commands are killed.
    pub async fn chat_with_cancel<F>(
        &mut self,
        text: &str,
        mut on_chunk: F,
        cancel: CancellationToken,
    ) -> AgentResult<AgenticResponse>
    where
        F: FnMut(&str),
    {
        match self.settings.turn_timeout() {
            Some(limit) => tokio::time::timeout(limit, self.run_turn(text, &mut on_chunk, &cancel))
                .await
                .map_err(|_| {
                    warn!(timeout_secs = limit.as_secs(), "turn exceeded its deadline");
                    AgentError::DeadlineExceeded
                })?,
            None => self.run_turn(text, &mut on_chunk, &cancel).await,
        }
    }

    async fn run_turn<F>(
        &mut self,
        text: &str,
        on_chunk: &mut F,
        cancel: &CancellationToken,
    ) -> AgentResult<AgenticResponse>
    where
        F: FnMut(&str),
    {
        self.messages.push(Message::user().with_text(text));
        let mut accumulator = ResponseAccumulator::new(self.observer.clone());

        if self.settings.project_context {
            self.add_project_context(&mut accumulator).await;
        }

        let system = system_prompt(&self.catalog).map_err(|e| AgentError::Internal(e.to_string()))?;
        let max_iterations = self.settings.max_iterations.max(1);

        loop {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            trim_ledger(&mut self.messages, self.settings.max_context_chars);

            let round = accumulator.rounds() + 1;
            debug!(round, messages = self.messages.len(), "requesting generation");
            let reply = self.generate(&system, on_chunk, cancel).await?;

            self.messages.push(Message::assistant().with_text(&reply));
            accumulator.push_text(&protocol::strip_tool_blocks(&reply));

            let decoded = protocol::decode(&reply);
            if decoded.is_empty() {
                info!(rounds = round, "turn completed");
                return Ok(accumulator.finish(Termination::Completed));
            }

            debug!(round, calls = decoded.calls.len(), skipped = decoded.errors.len(), "executing tool calls");
            accumulator.push_calls(&decoded.calls);
            let results = self.catalog.invoke_all(&decoded.calls, cancel).await;
            accumulator.push_results(&results);
            self.messages
                .push(feedback_message(&results, self.settings.max_result_chars));

            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            // The capping round's batch has run; its results stay in the
            // ledger for the next turn but get no further round-trip
            if round >= max_iterations {
                warn!(rounds = round, "stopping at the iteration cap");
                accumulator.record(AgentAction::response(format!(
                    "Stopped after {} rounds without a final answer",
                    round
                )));
                return Ok(accumulator.finish(Termination::IterationCapReached));
            }
        }
    }

    /// Stream one reply, forwarding every delta to `on_chunk`
    async fn generate<F>(
        &self,
        system: &str,
        on_chunk: &mut F,
        cancel: &CancellationToken,
    ) -> AgentResult<String>
    where
        F: FnMut(&str),
    {
        let mut stream = tokio::select! {
            stream = self.provider.stream(system, &self.messages) => {
                stream.map_err(|e| AgentError::Generation(e.to_string()))?
            }
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
        };

        let mut reply = String::new();
        loop {
            tokio::select! {
                delta = stream.next() => match delta {
                    Some(Ok(delta)) => {
                        on_chunk(&delta);
                        reply.push_str(&delta);
                    }
                    Some(Err(e)) => return Err(AgentError::Generation(e.to_string())),
                    None => return Ok(reply),
                },
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            }
        }
    }

    /// Attach the project understanding to the response, and put its summary
    /// in the ledger the first time around. Analysis failures only cost the summary.
    async fn add_project_context(&mut self, accumulator: &mut ResponseAccumulator) {
        if self.project.cached().await.is_none() {
            info!("analyzing project structure");
        }

        let understanding = match self.project.get().await {
            Ok(understanding) => understanding,
            Err(e) => {
                warn!(error = %e, "project analysis failed, continuing without it");
                return;
            }
        };

        if !self.project_context_injected {
            let summary = Message::system()
                .with_text(understanding.summary())
                .with_kind(MessageKind::ProjectContext);
            // Ahead of the user message that triggered it
            let at = self.messages.len().saturating_sub(1);
            self.messages.insert(at, summary);
            self.project_context_injected = true;
        }
        accumulator.set_project_understanding((*understanding).clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::action::ActionKind;
    use crate::models::role::Role;
    use crate::models::tool::ToolCall;
    use crate::providers::mock::MockProvider;
    use serde_json::json;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn settings(max_iterations: usize) -> AgentSettings {
        AgentSettings {
            max_iterations,
            project_context: false,
            ..AgentSettings::default()
        }
    }

    fn tree() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("utils")).unwrap();
        fs::write(
            dir.path().join("utils/format.js"),
            "export function format(s) {\n  return s.trim();\n}\n",
        )
        .unwrap();
        fs::write(dir.path().join("utils/math.js"), "export const add = (a, b) => a + b;\n").unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{"name": "demo", "dependencies": {"express": "^4.0.0"}}"#,
        )
        .unwrap();
        dir
    }

    fn agent(dir: &TempDir, provider: MockProvider, settings: AgentSettings) -> Agent {
        Agent::local(
            Box::new(provider),
            AgentSettings {
                working_dir: dir.path().to_path_buf(),
                ..settings
            },
        )
        .unwrap()
    }

    fn call_reply(text: &str, calls: &[ToolCall]) -> String {
        format!("{}\n{}\n", text, protocol::encode(calls))
    }

    #[tokio::test]
    async fn test_plain_answer_is_one_round() {
        let dir = tree();
        let provider = MockProvider::new(vec!["Nothing to do here.".to_string()]);
        let requests = provider.requests();
        let mut agent = agent(&dir, provider, settings(10));

        let mut streamed = String::new();
        let response = agent
            .chat("hello", |chunk| streamed.push_str(chunk))
            .await
            .unwrap();

        assert_eq!(response.termination, Termination::Completed);
        assert_eq!(response.rounds, 1);
        assert_eq!(response.content, "Nothing to do here.");
        assert_eq!(streamed, "Nothing to do here.");
        assert!(response.actions.is_empty());
        assert_eq!(requests.lock().unwrap().len(), 1);
        assert_eq!(agent.history().len(), 2);
    }

    #[tokio::test]
    async fn test_list_then_read_scenario() {
        let dir = tree();
        let provider = MockProvider::new(vec![
            call_reply(
                "Let me find the JS files.",
                &[ToolCall::new("call_1", "list_files", json!({"pattern": "utils/**/*.js"}))],
            ),
            call_reply(
                "Reading the first one.",
                &[ToolCall::new("call_2", "read_file", json!({"path": "utils/format.js"}))],
            ),
            "utils/format.js exports a single `format` function that trims its input.".to_string(),
        ]);
        let requests = provider.requests();
        let mut agent = agent(&dir, provider, AgentSettings::default());

        let response = agent
            .chat("list JS files under utils, then show me the first one", |_| {})
            .await
            .unwrap();

        assert_eq!(response.termination, Termination::Completed);
        assert_eq!(response.rounds, 3);
        assert_eq!(response.tool_calls.len(), 2);
        assert_eq!(response.tool_results.len(), 2);
        assert_eq!(response.actions.len(), 4);
        let kinds: Vec<_> = response.actions.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ActionKind::ToolCall,
                ActionKind::ToolResult,
                ActionKind::ToolCall,
                ActionKind::ToolResult
            ]
        );

        let listed = response.tool_results[0].result.as_ref().unwrap();
        assert_eq!(listed["files"], json!(["utils/format.js", "utils/math.js"]));
        let read = response.tool_results[1].result.as_ref().unwrap();
        assert!(read["content"].as_str().unwrap().contains("function format"));
        assert!(!response.content.contains("```tool_call"));
        assert!(response.content.ends_with("trims its input."));
        assert_eq!(response.project_understanding.unwrap().language, "JavaScript");

        // Each later round sees the previous batch's feedback last
        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 3);
        let feedback = requests[1].last().unwrap();
        assert!(feedback.is_tool_feedback());
        assert!(feedback.content.contains("[1] list_files (id: call_1): SUCCESS"));
    }

    #[tokio::test]
    async fn test_iteration_cap_bounds_round_trips() {
        let dir = tree();
        let looping = call_reply(
            "Checking again.",
            &[ToolCall::new("a", "get_working_directory", json!({}))],
        );
        let provider = MockProvider::new(vec![looping; 6]);
        let requests = provider.requests();
        let mut agent = agent(&dir, provider, settings(3));

        let response = agent.chat("loop forever", |_| {}).await.unwrap();

        assert!(response.reached_iteration_cap());
        assert_eq!(response.rounds, 3);
        assert_eq!(requests.lock().unwrap().len(), 3);
        assert_eq!(response.tool_results.len(), 3);
        assert_eq!(response.actions.last().unwrap().kind, ActionKind::Response);
    }

    #[tokio::test]
    async fn test_capping_round_batch_still_runs() {
        let dir = tree();
        let provider = MockProvider::new(vec![
            call_reply(
                "One look.",
                &[ToolCall::new("only", "read_file", json!({"path": "package.json"}))],
            ),
            "never requested".to_string(),
        ]);
        let requests = provider.requests();
        let mut agent = agent(&dir, provider, settings(1));

        let response = agent.chat("what is this project?", |_| {}).await.unwrap();

        assert_eq!(response.termination, Termination::IterationCapReached);
        assert_eq!(response.tool_results.len(), 1);
        assert!(response.tool_results[0].is_success());
        assert_eq!(requests.lock().unwrap().len(), 1);
        // The results are in the ledger for the next turn
        assert!(agent.history().last().unwrap().is_tool_feedback());
    }

    #[tokio::test]
    async fn test_oversized_results_still_reach_the_next_round() {
        let dir = tree();
        fs::write(dir.path().join("big.log"), "x".repeat(3_000)).unwrap();
        let provider = MockProvider::new(vec![
            call_reply(
                "Reading the log.",
                &[ToolCall::new("log", "read_file", json!({"path": "big.log"}))],
            ),
            "The log is all x.".to_string(),
        ]);
        let requests = provider.requests();
        let mut agent = agent(
            &dir,
            provider,
            AgentSettings {
                max_context_chars: 2_000,
                ..settings(10)
            },
        );

        let response = agent.chat("what is in big.log?", |_| {}).await.unwrap();
        assert_eq!(response.termination, Termination::Completed);

        let requests = requests.lock().unwrap();
        let second = &requests[1];
        let kinds: Vec<_> = second.iter().map(|m| (m.role, m.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                (Role::User, MessageKind::Conversation),
                (Role::Assistant, MessageKind::Conversation),
                (Role::System, MessageKind::ToolFeedback),
            ]
        );
        assert!(second[2].content.contains("[1] read_file (id: log): SUCCESS"));
        assert!(second[2].content.contains("[truncated"));
    }

    #[tokio::test]
    async fn test_unknown_tool_does_not_end_the_turn() {
        let dir = tree();
        let provider = MockProvider::new(vec![
            call_reply("Trying.", &[ToolCall::new("x", "deploy", json!({}))]),
            "I can't deploy from here.".to_string(),
        ]);
        let mut agent = agent(&dir, provider, settings(10));

        let response = agent.chat("deploy it", |_| {}).await.unwrap();

        assert_eq!(response.termination, Termination::Completed);
        assert_eq!(response.rounds, 2);
        assert_eq!(
            response.tool_results[0].result,
            Err(AgentError::ToolNotFound("deploy".to_string()))
        );
    }

    #[tokio::test]
    async fn test_generation_failure_fails_the_turn() {
        let dir = tree();
        let mut agent = agent(&dir, MockProvider::failing("connection reset"), settings(10));

        let err = agent.chat("hello", |_| {}).await.unwrap_err();

        assert_eq!(err, AgentError::Generation("connection reset".to_string()));
        assert_eq!(agent.history().len(), 1);
        assert_eq!(agent.history()[0].role, Role::User);
    }

    #[tokio::test]
    async fn test_project_summary_is_sent_once() {
        let dir = tree();
        let provider = MockProvider::new(vec!["First.".to_string(), "Second.".to_string()]);
        let requests = provider.requests();
        let mut agent = agent(
            &dir,
            provider,
            AgentSettings {
                project_context: true,
                ..settings(10)
            },
        );

        let first = agent.chat("what is this?", |_| {}).await.unwrap();
        assert!(first.actions.is_empty());
        let understanding = first.project_understanding.unwrap();
        assert_eq!(understanding.language, "JavaScript");

        let second = agent.chat("and now?", |_| {}).await.unwrap();
        assert!(second.actions.is_empty());
        assert!(second.project_understanding.is_some());

        let requests = requests.lock().unwrap();
        let summaries = |messages: &Vec<Message>| {
            messages
                .iter()
                .filter(|m| m.kind == MessageKind::ProjectContext)
                .count()
        };
        assert_eq!(summaries(&requests[0]), 1);
        assert_eq!(summaries(&requests[1]), 1);
        assert_eq!(requests[0][0].kind, MessageKind::ProjectContext);
        assert!(requests[0][0].content.starts_with("Project overview:"));
    }

    #[tokio::test]
    async fn test_clear_history_resends_summary() {
        let dir = tree();
        let provider = MockProvider::new(vec!["One.".to_string(), "Two.".to_string()]);
        let requests = provider.requests();
        let mut agent = agent(
            &dir,
            provider,
            AgentSettings {
                project_context: true,
                ..settings(10)
            },
        );

        agent.chat("first", |_| {}).await.unwrap();
        agent.clear_history();
        assert!(agent.history().is_empty());
        let response = agent.chat("second", |_| {}).await.unwrap();

        // Cached, so no new analysis, but the fresh ledger gets the summary again
        assert!(response.actions.is_empty());
        let requests = requests.lock().unwrap();
        assert_eq!(requests[1].len(), 2);
        assert_eq!(requests[1][0].kind, MessageKind::ProjectContext);
    }

    #[tokio::test]
    async fn test_observer_sees_actions_live() {
        let dir = tree();
        let provider = MockProvider::new(vec![
            call_reply("Status.", &[ToolCall::new("w", "get_working_directory", json!({}))]),
            "Done.".to_string(),
        ]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut agent = agent(&dir, provider, settings(10)).with_observer(Arc::new(
            move |action: &AgentAction| sink.lock().unwrap().push(action.kind),
        ));

        let response = agent.chat("where am I?", |_| {}).await.unwrap();

        let kinds: Vec<_> = response.actions.iter().map(|a| a.kind).collect();
        assert_eq!(*seen.lock().unwrap(), kinds);
    }

    #[tokio::test]
    async fn test_cancelled_turn() {
        let dir = tree();
        let provider = MockProvider::new(vec!["unused".to_string()]);
        let requests = provider.requests();
        let mut agent = agent(&dir, provider, settings(10));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = agent
            .chat_with_cancel("hello", |_| {}, cancel)
            .await
            .unwrap_err();

        assert_eq!(err, AgentError::Cancelled);
        assert!(requests.lock().unwrap().is_empty());
        assert_eq!(agent.history().len(), 1);
    }

    #[tokio::test]
    async fn test_turn_deadline() {
        let dir = tree();
        let provider = MockProvider::new(vec![call_reply(
            "Waiting.",
            &[ToolCall::new("s", "run_command", json!({"command": "sleep 5"}))],
        )]);
        let mut agent = agent(
            &dir,
            provider,
            AgentSettings {
                turn_timeout_secs: Some(1),
                ..settings(10)
            },
        );

        let err = agent.chat("wait", |_| {}).await.unwrap_err();
        assert_eq!(err, AgentError::DeadlineExceeded);
    }
}
