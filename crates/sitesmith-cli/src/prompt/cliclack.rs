use std::io::{self, Write};

use anyhow::Result;
use bat::WrappingMode;
use cliclack::{input, spinner};
use console::style;
use sitesmith::models::message::{Message, MessageContent};

use super::{parse_input, Input, Notice, Prompt};

pub struct CliclackPrompt {
    spinner: Option<cliclack::ProgressBar>,
    input_mode: InputMode,
    theme: Theme,
}

enum InputMode {
    Singleline,
    Multiline,
}

enum Theme {
    Light,
    Dark,
}

impl Default for CliclackPrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl CliclackPrompt {
    pub fn new() -> Self {
        CliclackPrompt {
            spinner: None,
            input_mode: InputMode::Singleline,
            theme: Theme::Dark,
        }
    }

    fn theme_name(&self) -> &'static str {
        match self.theme {
            Theme::Light => "GitHub",
            Theme::Dark => "zenburn",
        }
    }
}

fn print_tool_request(content: &str, theme: &str, tool_name: &str) {
    let _ = bat::PrettyPrinter::new()
        .input(
            bat::Input::from_bytes(content.as_bytes()).name(format!("Tool Request: {}", tool_name)),
        )
        .theme(theme)
        .language("JSON")
        .grid(true)
        .header(true)
        .wrapping_mode(WrappingMode::Character)
        .print();
}

fn print_tool_response(content: &str, theme: &str, tool_name: &str) {
    let _ = bat::PrettyPrinter::new()
        .input(
            bat::Input::from_bytes(content.as_bytes())
                .name(format!("Tool Response: {}", tool_name)),
        )
        .theme(theme)
        .language("Markdown")
        .grid(true)
        .header(true)
        .wrapping_mode(WrappingMode::Character)
        .print();
}

fn print(content: &str, theme: &str) {
    let _ = bat::PrettyPrinter::new()
        .input(bat::Input::from_bytes(content.as_bytes()))
        .theme(theme)
        .language("Markdown")
        .wrapping_mode(WrappingMode::Character)
        .print();
}

impl Prompt for CliclackPrompt {
    fn render(&mut self, message: &Message) {
        let theme = self.theme_name();
        for message_content in &message.content {
            match message_content {
                MessageContent::Text(text) => print(&text.text, theme),
                MessageContent::ToolRequest(tool_request) => {
                    let arguments = serde_json::to_string_pretty(&tool_request.tool_call.arguments)
                        .unwrap_or_else(|_| tool_request.tool_call.arguments.to_string());
                    print_tool_request(&arguments, theme, &tool_request.tool_call.name);
                }
                MessageContent::ToolResponse(tool_response) => {
                    print_tool_response(&tool_response.result, theme, &tool_response.name)
                }
            }
        }
        println!();
        let _ = io::stdout().flush();
    }

    fn show_busy(&mut self) {
        if self.spinner.is_none() {
            let progress = spinner();
            progress.start("working on it");
            self.spinner = Some(progress);
        }
    }

    fn hide_busy(&mut self) {
        if let Some(progress) = self.spinner.take() {
            progress.stop("");
        }
    }

    fn notice(&mut self, notice: Notice) {
        let text = notice.text();
        match notice {
            Notice::Completed | Notice::Goodbye => println!("{}", style(text).green()),
            Notice::EmptyInput | Notice::Cancelled => println!("{}", style(text).yellow()),
            Notice::Failed(_) => println!("{}", style(text).red()),
            Notice::Building(_) => println!("{}", style(text).cyan()),
        }
    }

    fn get_input(&mut self) -> Result<Input> {
        let mut input = input("What website would you like me to build?  [Help: /?]").placeholder("");
        if let InputMode::Multiline = self.input_mode {
            input = input.multiline();
        }
        let message_text: String = input.required(false).interact()?;
        let command = message_text.trim();

        if command.eq_ignore_ascii_case("/m") {
            self.input_mode = InputMode::Multiline;
            return self.get_input();
        } else if command.eq_ignore_ascii_case("/s") {
            self.input_mode = InputMode::Singleline;
            return self.get_input();
        } else if command.eq_ignore_ascii_case("/t") {
            self.theme = match self.theme {
                Theme::Light => {
                    println!("Switching to Dark theme");
                    Theme::Dark
                }
                Theme::Dark => {
                    println!("Switching to Light theme");
                    Theme::Light
                }
            };
            return self.get_input();
        } else if command.eq_ignore_ascii_case("/?") {
            println!("Commands:");
            println!("exit, /exit, /quit - End the session");
            println!("/m - Switch to multiline input mode");
            println!("/s - Switch to singleline input mode");
            println!("/t - Toggle Light/Dark theme");
            println!("/? - Display this help message");
            println!("Ctrl+C - Cancel the request that is running");
            return self.get_input();
        }

        Ok(parse_input(&message_text))
    }

    fn close(&self) {
        // No cleanup required
    }
}
