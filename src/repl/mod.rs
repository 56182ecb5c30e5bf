//! Interactive chat in the terminal
//!
//! Answers stream to stdout as they arrive; an attached file stays in use
//! until `/detach` or `/clear`.

pub mod commands;
pub mod input;

use anyhow::Result;
use colored::Colorize;
use std::io::Write;
use std::path::PathBuf;

use crate::agent::QueryResolver;
use crate::cli::config::Config;
use crate::documents::detect_kind;
use crate::repl::commands::{is_command, parse, Command, HELP};
use crate::repl::input::{Input, InputHandler};

/// One user's chat session
pub struct ChatSession<'a> {
    resolver: &'a QueryResolver,
    thread: String,
    input: InputHandler,
    attachment: Option<PathBuf>,
}

impl<'a> ChatSession<'a> {
    pub fn new(resolver: &'a QueryResolver, thread: impl Into<String>, input: InputHandler) -> Self {
        Self {
            resolver,
            thread: thread.into(),
            input,
            attachment: None,
        }
    }

    pub fn show_welcome(&self) {
        println!(
            "{} {}",
            "Lexi".bold().blue(),
            format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
        );
        println!("Ask me anything about Victorian laws or court procedures. /help for commands.\n");
    }

    /// Run until `/quit` or end of input
    pub async fn run(&mut self) -> Result<()> {
        loop {
            let line = match tokio::task::block_in_place(|| self.input.read_line())? {
                Input::Line(line) => line,
                Input::Interrupted => continue,
                Input::Eof => break,
            };
            if line.is_empty() {
                continue;
            }

            if is_command(&line) {
                if !self.handle_command(parse(&line)) {
                    break;
                }
                continue;
            }

            self.ask(&line).await;
        }

        self.input.save_history()?;
        Ok(())
    }

    /// Returns false when the session should end
    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Quit => return false,
            Command::Clear => {
                self.resolver.clear(&self.thread);
                self.attachment = None;
                println!("{}", "Conversation cleared.".dimmed());
            }
            Command::Attach(path) => {
                let path = Config::expand_path(&path.to_string_lossy());
                match detect_kind(&path) {
                    Ok(_) if path.is_file() => {
                        println!("{} {}", "Attached".green(), path.display());
                        self.attachment = Some(path);
                    }
                    Ok(_) => println!("{} {}", "No such file:".red(), path.display()),
                    Err(e) => println!("{}", e.to_string().red()),
                }
            }
            Command::Detach => {
                self.attachment = None;
                println!("{}", "Attachment removed.".dimmed());
            }
            Command::Help => println!("{}", HELP),
            Command::Unknown(message) => println!("{}", message.yellow()),
        }
        true
    }

    async fn ask(&mut self, query: &str) {
        let print_token = |token: &str| {
            print!("{}", token);
            let _ = std::io::stdout().flush();
        };

        let outcome = self
            .resolver
            .resolve(&self.thread, query, self.attachment.as_deref(), &print_token)
            .await;
        println!();

        match outcome {
            Ok(resolution) => {
                tracing::debug!(route = %resolution.route, "answered");
                if let Some(form) = resolution.form_path {
                    println!("{} {}", "Form saved:".green().bold(), form.display());
                }
            }
            Err(e) => println!("{} {}", "Error:".red().bold(), e),
        }
        println!();
    }
}
