use super::message::Message;
use super::role::Role;

/// The ordered conversation exchanged with the model service.
///
/// Turns are only appended while a request runs. A tool request turn must be followed by the
/// matching tool response turn before the transcript is sent to the model
/// again; [`Transcript::is_settled`] reports whether that holds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Forget every turn after the first `len`, abandoning an unfinished request
    pub fn rewind(&mut self, len: usize) {
        self.messages.truncate(len);
    }

    /// True when every tool request has its response in the following turn
    pub fn is_settled(&self) -> bool {
        let mut turns = self.messages.iter().peekable();
        while let Some(turn) = turns.next() {
            let requests = turn.tool_requests();
            if requests.is_empty() {
                continue;
            }
            let Some(next) = turns.peek() else {
                return false;
            };
            if next.role != Role::User {
                return false;
            }
            let responses = next.tool_responses();
            let answered = requests
                .iter()
                .all(|req| responses.iter().any(|res| res.id == req.id));
            if !answered {
                return false;
            }
        }
        true
    }
}

impl From<Vec<Message>> for Transcript {
    fn from(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}
