//! Slash commands understood by the chat REPL

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Forget the conversation so far
    Clear,
    /// Attach a file to following questions
    Attach(PathBuf),
    /// Stop attaching a file
    Detach,
    Help,
    Quit,
    Unknown(String),
}

/// Lines starting with `/` are commands
pub fn is_command(input: &str) -> bool {
    input.trim_start().starts_with('/')
}

pub fn parse(input: &str) -> Command {
    let input = input.trim();
    let (name, arg) = match input.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (input, ""),
    };

    match name.to_lowercase().as_str() {
        "/clear" => Command::Clear,
        "/attach" if !arg.is_empty() => Command::Attach(PathBuf::from(arg)),
        "/attach" => Command::Unknown("/attach needs a file path".to_string()),
        "/detach" => Command::Detach,
        "/help" | "/?" => Command::Help,
        "/quit" | "/exit" | "/q" => Command::Quit,
        other => Command::Unknown(format!("Unknown command: {}", other)),
    }
}

pub const HELP: &str = "\
Commands:
  /clear          forget the conversation so far
  /attach <path>  use a PDF or image as context for following questions
  /detach         stop using the attached file
  /help           show this help
  /quit           leave the chat";
