use futures::stream::BoxStream;
use futures::StreamExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::models::message::{Message, ToolRequest};
use crate::models::tool::ToolOutput;
use crate::models::transcript::Transcript;
use crate::providers::base::Provider;
use crate::registry::ToolRegistry;

/// Why a request ended without a final answer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    #[error("the model service failed: {0}")]
    Model(String),

    #[error("the model asked for an unknown tool: {0}")]
    UnknownTool(String),

    #[error("gave up after {0} model requests")]
    RoundLimit(usize),

    #[error("the request was cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The model's final text
    Done(String),
    Failed(FailureReason),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// A model or tool turn that was just appended to the transcript
    Message(Message),
    /// Always the last event of a reply
    Finished(Outcome),
}

enum LoopState {
    AwaitingModel,
    DispatchingTool(ToolRequest),
    Done(String),
    Failed(FailureReason),
}

/// Drives a model through tool calls until it answers in plain text
pub struct Agent {
    provider: Box<dyn Provider>,
    registry: ToolRegistry,
    system_prompt: String,
    max_rounds: Option<usize>,
}

impl Agent {
    pub fn new<S: Into<String>>(
        provider: Box<dyn Provider>,
        registry: ToolRegistry,
        system_prompt: S,
    ) -> Self {
        Self {
            provider,
            registry,
            system_prompt: system_prompt.into(),
            max_rounds: None,
        }
    }

    /// Cap the number of model requests made for a single user request.
    /// `None` keeps going until the model stops calling tools.
    pub fn with_max_rounds(mut self, max_rounds: Option<usize>) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Answer `request`, appending every turn to `transcript`.
    ///
    /// Each round makes one model request. When the response asks for tools only
    /// the first call is run; its result goes back to the model on the next
    /// round. The stream ends with exactly one [`AgentEvent::Finished`].
    pub fn reply<'a>(
        &'a self,
        transcript: &'a mut Transcript,
        request: &str,
        cancel: CancellationToken,
    ) -> BoxStream<'a, AgentEvent> {
        let request = request.to_string();
        Box::pin(async_stream::stream! {
            transcript.push(Message::user().with_text(request));
            let mut state = LoopState::AwaitingModel;
            let mut rounds = 0usize;

            loop {
                state = match state {
                    LoopState::AwaitingModel => {
                        if cancel.is_cancelled() {
                            LoopState::Failed(FailureReason::Cancelled)
                        } else if self.max_rounds.is_some_and(|max| rounds >= max) {
                            LoopState::Failed(FailureReason::RoundLimit(rounds))
                        } else {
                            rounds += 1;
                            debug!(round = rounds, messages = transcript.len(), "requesting model");
                            let response = tokio::select! {
                                biased;
                                _ = cancel.cancelled() => None,
                                response = self.provider.complete(
                                    &self.system_prompt,
                                    transcript.messages(),
                                    self.registry.tools(),
                                ) => Some(response),
                            };

                            match response {
                                None => LoopState::Failed(FailureReason::Cancelled),
                                Some(Err(e)) => {
                                    error!(round = rounds, error = %e, "model request failed");
                                    LoopState::Failed(FailureReason::Model(e.to_string()))
                                }
                                Some(Ok((response, usage))) => {
                                    info!(
                                        round = rounds,
                                        input_tokens = usage.input_tokens,
                                        output_tokens = usage.output_tokens,
                                        "model responded"
                                    );
                                    let requested = response.tool_requests().len();
                                    let first = response.tool_requests().first().map(|r| (*r).clone());
                                    match first {
                                        None => {
                                            let text = response.text();
                                            transcript.push(response.clone());
                                            yield AgentEvent::Message(response);
                                            LoopState::Done(text)
                                        }
                                        Some(first) if !self.registry.contains(&first.tool_call.name) => {
                                            LoopState::Failed(FailureReason::UnknownTool(first.tool_call.name))
                                        }
                                        Some(first) => {
                                            if requested > 1 {
                                                warn!(dropped = requested - 1, "only the first tool call is run");
                                            }
                                            let mut turn = Message::model();
                                            let text = response.text();
                                            if !text.is_empty() {
                                                turn = turn.with_text(text);
                                            }
                                            let turn = turn.with_tool_request(first.id.clone(), first.tool_call.clone());
                                            transcript.push(turn.clone());
                                            yield AgentEvent::Message(turn);
                                            LoopState::DispatchingTool(first)
                                        }
                                    }
                                }
                            }
                        }
                    }
                    LoopState::DispatchingTool(request) => {
                        // Let the caller render the request before a long running tool starts
                        tokio::task::yield_now().await;
                        let name = request.tool_call.name.clone();
                        let output = self
                            .registry
                            .dispatch(request.tool_call)
                            .await
                            .unwrap_or_else(ToolOutput::from);
                        let turn = Message::user().with_tool_response(request.id, name, output.to_string());
                        transcript.push(turn.clone());
                        yield AgentEvent::Message(turn);
                        LoopState::AwaitingModel
                    }
                    LoopState::Done(text) => {
                        info!(rounds, "request complete");
                        yield AgentEvent::Finished(Outcome::Done(text));
                        break;
                    }
                    LoopState::Failed(reason) => {
                        warn!(rounds, reason = %reason, "request failed");
                        yield AgentEvent::Finished(Outcome::Failed(reason));
                        break;
                    }
                };
            }
        })
    }

    /// Run a request to completion, discarding the intermediate events
    pub async fn run(
        &self,
        transcript: &mut Transcript,
        request: &str,
        cancel: CancellationToken,
    ) -> Outcome {
        let mut stream = self.reply(transcript, request, cancel);
        let mut outcome = Outcome::Failed(FailureReason::Cancelled);
        while let Some(event) = stream.next().await {
            if let AgentEvent::Finished(finished) = event {
                outcome = finished;
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::developer::{DeveloperConfig, ShellConfig, WebDeveloperSystem};
    use crate::models::role::Role;
    use crate::models::tool::{Tool, ToolCall};
    use crate::providers::base::Usage;
    use crate::providers::mock::MockProvider;
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn registry_in(dir: &TempDir) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry
            .register(Box::new(WebDeveloperSystem::new(DeveloperConfig {
                working_dir: dir.path().to_path_buf(),
                shell: ShellConfig::default(),
                server_settle: Duration::ZERO,
            })))
            .unwrap();
        registry
    }

    fn write_call(id: &str, file: &str, content: &str) -> Message {
        Message::model().with_tool_request(
            id,
            ToolCall::new("writeFile", json!({"filePath": file, "content": content})),
        )
    }

    // Lets a test keep inspecting what the provider received after the agent owns it
    struct SharedProvider(Arc<MockProvider>);

    #[async_trait]
    impl Provider for SharedProvider {
        async fn complete(
            &self,
            system: &str,
            messages: &[Message],
            tools: &[Tool],
        ) -> Result<(Message, Usage)> {
            self.0.complete(system, messages, tools).await
        }
    }

    struct PendingProvider;

    #[async_trait]
    impl Provider for PendingProvider {
        async fn complete(
            &self,
            _system: &str,
            _messages: &[Message],
            _tools: &[Tool],
        ) -> Result<(Message, Usage)> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_tool_rounds_then_final_answer() {
        let dir = TempDir::new().unwrap();
        let provider = MockProvider::new(vec![
            write_call("1", "index.html", "<h1>Hi</h1>"),
            write_call("2", "styles.css", "h1 { color: teal; }"),
            Message::model().with_text("Built your site."),
        ]);
        let agent = Agent::new(Box::new(provider), registry_in(&dir), "system");
        let mut transcript = Transcript::new();

        let events: Vec<_> = agent
            .reply(&mut transcript, "Make a site", CancellationToken::new())
            .collect()
            .await;

        assert_eq!(events.len(), 6);
        assert_eq!(
            events.last(),
            Some(&AgentEvent::Finished(Outcome::Done("Built your site.".to_string())))
        );

        // 1 + 2N + 1
        assert_eq!(transcript.len(), 6);
        let roles: Vec<_> = transcript.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Model, Role::User, Role::Model, Role::User, Role::Model]
        );
        assert!(transcript.is_settled());
        let response = &transcript.messages()[2].tool_responses()[0];
        assert_eq!(response.id, "1");
        assert_eq!(response.name, "writeFile");
        assert_eq!(response.result, "Success: File written successfully to index.html");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("styles.css")).unwrap(),
            "h1 { color: teal; }"
        );
    }

    #[tokio::test]
    async fn test_tool_errors_go_back_to_the_model() {
        let dir = TempDir::new().unwrap();
        let provider = Arc::new(MockProvider::new(vec![
            Message::model().with_tool_request(
                "r",
                ToolCall::new("readFile", json!({"filePath": "missing.html"})),
            ),
            Message::model().with_text("That file does not exist."),
        ]));
        let agent = Agent::new(
            Box::new(SharedProvider(provider.clone())),
            registry_in(&dir),
            "system",
        );
        let mut transcript = Transcript::new();

        let outcome = agent
            .run(&mut transcript, "Show me missing.html", CancellationToken::new())
            .await;
        assert_eq!(outcome, Outcome::Done("That file does not exist.".to_string()));

        let calls = provider.calls();
        assert_eq!(calls.len(), 2);
        let sent = &calls[1][2].tool_responses()[0];
        assert!(sent.result.starts_with("Error: Failed to read file - "));
    }

    #[tokio::test]
    async fn test_unknown_tool_fails_without_appending() {
        let dir = TempDir::new().unwrap();
        let provider = MockProvider::new(vec![Message::model()
            .with_tool_request("x", ToolCall::new("deployToProduction", json!({})))]);
        let agent = Agent::new(Box::new(provider), registry_in(&dir), "system");
        let mut transcript = Transcript::new();

        let outcome = agent
            .run(&mut transcript, "Ship it", CancellationToken::new())
            .await;

        assert_eq!(
            outcome,
            Outcome::Failed(FailureReason::UnknownTool("deployToProduction".to_string()))
        );
        assert_eq!(transcript.len(), 1);
        assert!(transcript.is_settled());
    }

    #[tokio::test]
    async fn test_only_first_tool_call_runs() {
        let dir = TempDir::new().unwrap();
        let provider = MockProvider::new(vec![
            write_call("a", "a.txt", "first").with_tool_request(
                "b",
                ToolCall::new("writeFile", json!({"filePath": "b.txt", "content": "second"})),
            ),
            Message::model().with_text("done"),
        ]);
        let agent = Agent::new(Box::new(provider), registry_in(&dir), "system");
        let mut transcript = Transcript::new();

        agent
            .run(&mut transcript, "Write two files", CancellationToken::new())
            .await;

        assert!(dir.path().join("a.txt").exists());
        assert!(!dir.path().join("b.txt").exists());
        assert_eq!(transcript.messages()[1].tool_requests().len(), 1);
        assert!(transcript.is_settled());
    }

    #[tokio::test]
    async fn test_model_error_fails() {
        let dir = TempDir::new().unwrap();
        let provider = MockProvider::with_results(vec![Err("Request failed: 503".to_string())]);
        let agent = Agent::new(Box::new(provider), registry_in(&dir), "system");
        let mut transcript = Transcript::new();

        let outcome = agent
            .run(&mut transcript, "hello", CancellationToken::new())
            .await;

        assert_eq!(
            outcome,
            Outcome::Failed(FailureReason::Model("Request failed: 503".to_string()))
        );
        assert_eq!(transcript.len(), 1);
    }

    #[tokio::test]
    async fn test_round_limit() {
        let dir = TempDir::new().unwrap();
        let provider = MockProvider::new(vec![
            write_call("1", "a.txt", "a"),
            write_call("2", "b.txt", "b"),
            write_call("3", "c.txt", "c"),
        ]);
        let agent =
            Agent::new(Box::new(provider), registry_in(&dir), "system").with_max_rounds(Some(2));
        let mut transcript = Transcript::new();

        let outcome = agent
            .run(&mut transcript, "loop forever", CancellationToken::new())
            .await;

        assert_eq!(outcome, Outcome::Failed(FailureReason::RoundLimit(2)));
        assert_eq!(transcript.len(), 5);
        assert!(!dir.path().join("c.txt").exists());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let dir = TempDir::new().unwrap();
        let provider = Arc::new(MockProvider::new(vec![Message::model().with_text("hi")]));
        let agent = Agent::new(
            Box::new(SharedProvider(provider.clone())),
            registry_in(&dir),
            "system",
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut transcript = Transcript::new();

        let outcome = agent.run(&mut transcript, "hello", cancel).await;

        assert_eq!(outcome, Outcome::Failed(FailureReason::Cancelled));
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_interrupts_model_request() {
        let dir = TempDir::new().unwrap();
        let agent = Agent::new(Box::new(PendingProvider), registry_in(&dir), "system");
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        let mut transcript = Transcript::new();

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            agent.run(&mut transcript, "hello", cancel),
        )
        .await
        .unwrap();

        assert_eq!(outcome, Outcome::Failed(FailureReason::Cancelled));
    }

    #[tokio::test]
    async fn test_transcript_carries_over() {
        let dir = TempDir::new().unwrap();
        let provider = Arc::new(MockProvider::new(vec![
            Message::model().with_text("first"),
            Message::model().with_text("second"),
        ]));
        let agent = Agent::new(
            Box::new(SharedProvider(provider.clone())),
            registry_in(&dir),
            "system",
        );
        let mut transcript = Transcript::new();

        agent.run(&mut transcript, "one", CancellationToken::new()).await;
        agent.run(&mut transcript, "two", CancellationToken::new()).await;

        assert_eq!(transcript.len(), 4);
        assert_eq!(provider.calls()[1].len(), 3);
    }
}
