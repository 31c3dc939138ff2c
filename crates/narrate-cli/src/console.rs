//! Keyboard commands read from stdin while narrating.

use std::fmt;

/// One line of console input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Pause if sounding, otherwise play.
    Toggle,
    Next,
    Back,
    Stop,
    /// Jump to a paragraph (0-based).
    Seek(usize),
    Status,
    Help,
    Quit,
}

/// Input that is not a console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCommand(pub String);

impl fmt::Display for UnknownCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown command '{}' (type h for help)", self.0)
    }
}

pub const HELP: &str = "\
  p        pause / resume
  n        next paragraph
  b        previous paragraph
  s        stop (back to the start)
  g <n>    go to paragraph n
  i        show status
  h        this help
  q        quit";

/// Parse one line. Blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<ConsoleCommand>, UnknownCommand> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };
    let arg = words.next();

    let command = match (head.to_ascii_lowercase().as_str(), arg) {
        ("p" | "pause" | "play", None) => ConsoleCommand::Toggle,
        ("n" | "next", None) => ConsoleCommand::Next,
        ("b" | "back", None) => ConsoleCommand::Back,
        ("s" | "stop", None) => ConsoleCommand::Stop,
        ("i" | "info" | "status", None) => ConsoleCommand::Status,
        ("h" | "help" | "?", None) => ConsoleCommand::Help,
        ("q" | "quit" | "exit", None) => ConsoleCommand::Quit,
        ("g" | "go", Some(n)) => match n.parse::<usize>() {
            Ok(n) if n > 0 => ConsoleCommand::Seek(n - 1),
            _ => return Err(UnknownCommand(line.trim().to_string())),
        },
        _ => return Err(UnknownCommand(line.trim().to_string())),
    };
    Ok(Some(command))
}
