use anyhow::Result;
use sitesmith::models::message::Message;

pub mod cliclack;

pub trait Prompt {
    fn render(&mut self, message: &Message);
    fn get_input(&mut self) -> Result<Input>;
    fn show_busy(&mut self);
    fn hide_busy(&mut self);
    /// A one line status for the user, outside of the conversation
    fn notice(&mut self, notice: Notice);
    fn close(&self);
    fn ready(&self) {
        println!("Sitesmith: describe a website and it will be built and served locally.");
        println!("Type \"exit\" to end the session.");
        println!();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Input {
    pub input_type: InputType,
    pub content: Option<String>, // Optional content as sometimes the user may be issuing a command eg. (Exit)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputType {
    AskAgain, // Ask the user for input again. Control flow command.
    Message,  // User sent a message
    Exit,     // User wants to exit the session
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    EmptyInput,
    Building(String),
    Completed,
    Failed(String),
    Cancelled,
    Goodbye,
}

impl Notice {
    pub fn text(&self) -> String {
        match self {
            Notice::EmptyInput => "Please describe the website you want built.".to_string(),
            Notice::Building(request) => format!("Building your website: {}", request),
            Notice::Completed => {
                "Website creation finished. Check the project directory for the new files."
                    .to_string()
            }
            Notice::Failed(reason) => format!("Something went wrong ({}). Let's try again.", reason),
            Notice::Cancelled => "Request cancelled.".to_string(),
            Notice::Goodbye => "Thanks for using sitesmith!".to_string(),
        }
    }
}

/// Classify a line typed by the user
pub fn parse_input(raw: &str) -> Input {
    let text = raw.trim();
    if text.is_empty() {
        return Input {
            input_type: InputType::AskAgain,
            content: None,
        };
    }
    if ["exit", "/exit", "/quit"]
        .iter()
        .any(|command| text.eq_ignore_ascii_case(command))
    {
        return Input {
            input_type: InputType::Exit,
            content: None,
        };
    }
    Input {
        input_type: InputType::Message,
        content: Some(text.to_string()),
    }
}
