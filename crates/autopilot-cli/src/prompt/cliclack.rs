use std::io::{self, Write};

use anyhow::Result;
use bat::WrappingMode;
use cliclack::input;
use console::style;

use super::{Input, InputType, Prompt, Theme};

pub struct CliclackPrompt {
    input_mode: InputMode,
    theme: Theme,
}

enum InputMode {
    Singleline,
    Multiline,
}

impl CliclackPrompt {
    pub fn new() -> Self {
        CliclackPrompt {
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

fn parse_input(text: &str) -> Input {
    let command = |input_type| Input {
        input_type,
        content: None,
    };
    match text.to_ascii_lowercase().as_str() {
        "/exit" | "/quit" => command(InputType::Exit),
        "/clear" => command(InputType::Clear),
        "" => command(InputType::AskAgain),
        _ => Input {
            input_type: InputType::Message,
            content: Some(text.to_string()),
        },
    }
}

impl Prompt for CliclackPrompt {
    fn render_chunk(&mut self, chunk: &str) {
        print!("{}", style(chunk).dim());
        // Best effort; a closed stdout only loses the live preview
        let _ = io::stdout().flush();
    }

    fn render_answer(&mut self, answer: &str) -> Result<()> {
        println!("\n");
        if answer.trim().is_empty() {
            return Ok(());
        }
        bat::PrettyPrinter::new()
            .input(bat::Input::from_bytes(answer.as_bytes()))
            .theme(self.theme_name())
            .language("Markdown")
            .wrapping_mode(WrappingMode::Character)
            .print()?;
        println!();
        Ok(())
    }

    fn render_notice(&mut self, notice: &str) {
        println!("{}", style(notice).yellow());
    }

    fn get_input(&mut self) -> Result<Input> {
        let mut input = input("Autopilot:          [Help: /?]").placeholder("");
        if let InputMode::Multiline = self.input_mode {
            input = input.multiline();
        }
        let message_text: String = input.interact()?;
        let message_text = message_text.trim();

        if message_text.eq_ignore_ascii_case("/m") {
            self.input_mode = InputMode::Multiline;
            return self.get_input();
        } else if message_text.eq_ignore_ascii_case("/s") {
            self.input_mode = InputMode::Singleline;
            return self.get_input();
        } else if message_text.eq_ignore_ascii_case("/t") {
            self.theme = match self.theme {
                Theme::Light => Theme::Dark,
                Theme::Dark => Theme::Light,
            };
            return self.get_input();
        } else if message_text == "/?" {
            println!("Commands:");
            println!("/exit - Exit the session");
            println!("/clear - Start a fresh conversation");
            println!("/m - Switch to multiline input mode");
            println!("/s - Switch to singleline input mode");
            println!("/t - Toggle Light/Dark theme");
            println!("/? - Display this help message");
            println!("Ctrl+C - Cancel the running request");
            return self.get_input();
        }
        Ok(parse_input(message_text))
    }
}
