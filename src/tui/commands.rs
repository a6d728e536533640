//! Local slash commands
//!
//! Input starting with one of these is handled by the client; anything
//! else (including unknown `/words`) is sent to the backend as a prompt.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalCommand {
    Help,
    Tts,
    Voice,
    Copy,
    Clear,
    Quit,
}

impl LocalCommand {
    pub fn all() -> &'static [LocalCommand] {
        &[
            LocalCommand::Help,
            LocalCommand::Tts,
            LocalCommand::Voice,
            LocalCommand::Copy,
            LocalCommand::Clear,
            LocalCommand::Quit,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            LocalCommand::Help => "help",
            LocalCommand::Tts => "tts",
            LocalCommand::Voice => "voice",
            LocalCommand::Copy => "copy",
            LocalCommand::Clear => "clear",
            LocalCommand::Quit => "quit",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            LocalCommand::Help => "show local commands",
            LocalCommand::Tts => "toggle spoken summaries",
            LocalCommand::Voice => "speak a prompt",
            LocalCommand::Copy => "copy code block N to the clipboard",
            LocalCommand::Clear => "scroll past the conversation so far",
            LocalCommand::Quit => "exit Jarvix",
        }
    }

    pub fn parse(name: &str) -> Option<LocalCommand> {
        let name = name.to_lowercase();
        Self::all().iter().find(|cmd| cmd.name() == name).copied()
    }

    /// One line per command, for `/help`.
    pub fn help_text() -> String {
        Self::all()
            .iter()
            .map(|cmd| {
                let usage = if *cmd == LocalCommand::Copy {
                    format!("{} N", cmd)
                } else {
                    cmd.to_string()
                };
                format!("  {:<10} {}", usage, cmd.description())
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for LocalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.name())
    }
}

/// Parsed local command with its argument text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub command: LocalCommand,
    pub args: String,
}

impl ParsedCommand {
    /// Argument of `/copy N`.
    pub fn copy_index(&self) -> Option<usize> {
        self.args.trim().parse().ok().filter(|n| *n > 0)
    }
}

/// Parse input as a local command. `None` means "send it as a prompt".
pub fn parse_command(input: &str) -> Option<ParsedCommand> {
    let rest = input.trim().strip_prefix('/')?;
    let (name, args) = rest.split_once(' ').unwrap_or((rest, ""));
    LocalCommand::parse(name).map(|command| ParsedCommand {
        command,
        args: args.trim().to_string(),
    })
}
