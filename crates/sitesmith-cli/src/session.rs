use anyhow::Result;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::prompt::{InputType, Notice, Prompt};
use sitesmith::agent::{Agent, AgentEvent, FailureReason, Outcome};
use sitesmith::models::transcript::Transcript;

pub struct Session<'a> {
    agent: Agent,
    prompt: Box<dyn Prompt + 'a>,
    keep_history: bool,
    transcript: Transcript,
}

impl<'a> Session<'a> {
    pub fn new(agent: Agent, prompt: Box<dyn Prompt + 'a>, keep_history: bool) -> Self {
        Session {
            agent,
            prompt,
            keep_history,
            transcript: Transcript::new(),
        }
    }

    pub async fn start(&mut self) -> Result<()> {
        self.prompt.ready();

        loop {
            let input = self.prompt.get_input()?;
            match input.input_type {
                InputType::Message => {
                    if let Some(content) = input.content {
                        self.process(&content).await;
                    }
                }
                InputType::Exit => break,
                InputType::AskAgain => self.prompt.notice(Notice::EmptyInput),
            }
        }

        self.prompt.notice(Notice::Goodbye);
        self.prompt.close();
        Ok(())
    }

    pub async fn headless_start(&mut self, request: &str) -> Outcome {
        let outcome = self.process(request).await;
        self.prompt.close();
        outcome
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    async fn process(&mut self, request: &str) -> Outcome {
        if !self.keep_history {
            self.transcript = Transcript::new();
        }
        let start = self.transcript.len();
        info!(request, keep_history = self.keep_history, "starting request");

        let cancel = CancellationToken::new();
        let mut outcome = Outcome::Failed(FailureReason::Cancelled);
        self.prompt.notice(Notice::Building(request.to_string()));
        self.prompt.show_busy();
        {
            let mut stream = self.agent.reply(&mut self.transcript, request, cancel.clone());
            loop {
                tokio::select! {
                    event = stream.next() => match event {
                        Some(AgentEvent::Message(message)) => {
                            self.prompt.hide_busy();
                            self.prompt.render(&message);
                            self.prompt.show_busy();
                        }
                        Some(AgentEvent::Finished(finished)) => outcome = finished,
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                        info!("interrupted, cancelling request");
                        cancel.cancel();
                    }
                }
            }
        }
        self.prompt.hide_busy();

        match &outcome {
            Outcome::Done(_) => self.prompt.notice(Notice::Completed),
            Outcome::Failed(reason) => {
                // A retained transcript goes back to how it was before this request
                self.transcript.rewind(start);
                match reason {
                    FailureReason::Cancelled => self.prompt.notice(Notice::Cancelled),
                    other => self.prompt.notice(Notice::Failed(other.to_string())),
                }
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::{parse_input, Input};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use serde_json::json;
    use sitesmith::developer::{DeveloperConfig, WebDeveloperSystem};
    use sitesmith::models::message::Message;
    use sitesmith::models::tool::{Tool, ToolCall};
    use sitesmith::providers::base::{Provider, Usage};
    use sitesmith::registry::ToolRegistry;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[derive(Default)]
    struct Log {
        rendered: Vec<Message>,
        notices: Vec<Notice>,
    }

    struct ScriptedPrompt {
        lines: VecDeque<&'static str>,
        log: Arc<Mutex<Log>>,
    }

    impl Prompt for ScriptedPrompt {
        fn render(&mut self, message: &Message) {
            self.log.lock().unwrap().rendered.push(message.clone());
        }

        fn get_input(&mut self) -> Result<Input> {
            match self.lines.pop_front() {
                Some(line) => Ok(parse_input(line)),
                None => Err(anyhow!("script exhausted")),
            }
        }

        fn show_busy(&mut self) {}

        fn hide_busy(&mut self) {}

        fn notice(&mut self, notice: Notice) {
            self.log.lock().unwrap().notices.push(notice);
        }

        fn close(&self) {}

        fn ready(&self) {}
    }

    struct ScriptedProvider {
        responses: Mutex<VecDeque<Result<Message, String>>>,
        seen: Arc<Mutex<Vec<usize>>>,
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        async fn complete(
            &self,
            _system: &str,
            messages: &[Message],
            _tools: &[Tool],
        ) -> anyhow::Result<(Message, Usage)> {
            self.seen.lock().unwrap().push(messages.len());
            match self.responses.lock().unwrap().pop_front() {
                Some(Ok(message)) => Ok((message, Usage::default())),
                Some(Err(e)) => Err(anyhow!(e)),
                None => Err(anyhow!("no scripted response")),
            }
        }
    }

    struct Fixture {
        _dir: TempDir,
        log: Arc<Mutex<Log>>,
        seen: Arc<Mutex<Vec<usize>>>,
    }

    fn session(
        lines: Vec<&'static str>,
        responses: Vec<Result<Message, String>>,
        keep_history: bool,
    ) -> (Session<'static>, Fixture) {
        let dir = TempDir::new().unwrap();
        let mut registry = ToolRegistry::new();
        registry
            .register(Box::new(WebDeveloperSystem::new(DeveloperConfig {
                working_dir: dir.path().to_path_buf(),
                ..DeveloperConfig::default()
            })))
            .unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let provider = ScriptedProvider {
            responses: Mutex::new(responses.into()),
            seen: seen.clone(),
        };
        let log = Arc::new(Mutex::new(Log::default()));
        let prompt = ScriptedPrompt {
            lines: lines.into(),
            log: log.clone(),
        };
        let agent = Agent::new(Box::new(provider), registry, "system");
        (
            Session::new(agent, Box::new(prompt), keep_history),
            Fixture {
                _dir: dir,
                log,
                seen,
            },
        )
    }

    #[tokio::test]
    async fn test_exit_without_calling_the_agent() {
        let (mut session, fixture) = session(vec!["EXIT"], vec![], false);
        session.start().await.unwrap();

        assert!(fixture.seen.lock().unwrap().is_empty());
        assert_eq!(fixture.log.lock().unwrap().notices, vec![Notice::Goodbye]);
    }

    #[tokio::test]
    async fn test_blank_input_reprompts() {
        let (mut session, fixture) = session(
            vec!["   ", "a bakery site", "/quit"],
            vec![Ok(Message::model().with_text("Done!"))],
            false,
        );
        session.start().await.unwrap();

        assert_eq!(*fixture.seen.lock().unwrap(), vec![1]);
        let log = fixture.log.lock().unwrap();
        assert_eq!(
            log.notices,
            vec![
                Notice::EmptyInput,
                Notice::Building("a bakery site".to_string()),
                Notice::Completed,
                Notice::Goodbye
            ]
        );
        assert_eq!(log.rendered.len(), 1);
        assert_eq!(log.rendered[0].text(), "Done!");
    }

    #[tokio::test]
    async fn test_failure_keeps_the_session_going() {
        let (mut session, fixture) = session(
            vec!["first", "second", "exit"],
            vec![
                Err("Request failed: 500".to_string()),
                Ok(Message::model().with_text("Recovered")),
            ],
            false,
        );
        session.start().await.unwrap();

        let log = fixture.log.lock().unwrap();
        assert_eq!(log.notices[0], Notice::Building("first".to_string()));
        assert!(matches!(log.notices[1], Notice::Failed(_)));
        assert_eq!(log.notices[2], Notice::Building("second".to_string()));
        assert_eq!(log.notices[3], Notice::Completed);
    }

    #[tokio::test]
    async fn test_fresh_transcript_per_request() {
        let (mut session, fixture) = session(
            vec!["one", "two", "exit"],
            vec![
                Ok(Message::model().with_tool_request(
                    "1",
                    ToolCall::new("writeFile", json!({"filePath": "a.html", "content": "a"})),
                )),
                Ok(Message::model().with_text("first done")),
                Ok(Message::model().with_text("second done")),
            ],
            false,
        );
        session.start().await.unwrap();

        // the second request starts from just its own user turn
        assert_eq!(*fixture.seen.lock().unwrap(), vec![1, 3, 1]);
        assert_eq!(session.transcript().len(), 2);
    }

    #[tokio::test]
    async fn test_keep_history_retains_transcript() {
        let (mut session, fixture) = session(
            vec!["one", "two", "exit"],
            vec![
                Ok(Message::model().with_text("first done")),
                Ok(Message::model().with_text("second done")),
            ],
            true,
        );
        session.start().await.unwrap();

        assert_eq!(*fixture.seen.lock().unwrap(), vec![1, 3]);
        assert_eq!(session.transcript().len(), 4);
    }

    #[tokio::test]
    async fn test_failed_request_is_rewound_when_keeping_history() {
        let (mut session, _fixture) = session(
            vec!["one", "two", "exit"],
            vec![
                Ok(Message::model().with_text("first done")),
                Err("Request failed: 503".to_string()),
            ],
            true,
        );
        session.start().await.unwrap();

        assert_eq!(session.transcript().len(), 2);
        assert!(session.transcript().is_settled());
    }

    #[tokio::test]
    async fn test_headless_start() {
        let (mut session, _fixture) = session(
            vec![],
            vec![Ok(Message::model().with_text("Built it"))],
            false,
        );
        let outcome = session.headless_start("a landing page").await;
        assert_eq!(outcome, Outcome::Done("Built it".to_string()));
    }
}
