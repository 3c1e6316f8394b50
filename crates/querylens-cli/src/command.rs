//! REPL input parsing.

use querylens_core::ids::SessionId;
use querylens_settings::ProcessingMode;

/// One line of user input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Plain text: analyze, then submit as a chat message.
    Say(String),
    /// Feed input for live analysis only.
    Analyze(String),
    /// Start a fresh session.
    New,
    /// List past conversations.
    History,
    /// Switch to a past conversation.
    Load(SessionId),
    /// Show learned user facts.
    Facts,
    /// List available models.
    Models,
    /// Show or switch the active model.
    Model(Option<String>),
    /// Show or switch the chat processing mode.
    Mode(Option<ProcessingMode>),
    /// List tools of registered servers.
    Tools,
    /// Show identity and connection state.
    Status,
    /// Show the command list.
    Help,
    /// Leave the REPL.
    Quit,
    /// Blank line.
    Empty,
    /// A slash command that could not be parsed.
    Invalid(String),
}

/// Command reference printed by `/help`.
pub const HELP: &str = "\
  <text>            analyze and send a message
  /analyze <text>   live analysis only
  /new              start a new session
  /history          list past conversations
  /load <id>        switch to a past conversation
  /facts            show what the backend knows about you
  /models           list models
  /model [name]     show or switch the active model
  /mode [immediate|complete]
                    show or switch the processing mode
  /tools            list available tools
  /status           show session and connection state
  /quit             exit";

impl Command {
    /// Parse one input line.
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }
        let Some(rest) = trimmed.strip_prefix('/') else {
            return Self::Say(line.trim_end_matches(['\r', '\n']).to_owned());
        };
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        match (name, arg) {
            ("analyze" | "a", "") => Self::Invalid("usage: /analyze <text>".into()),
            ("analyze" | "a", text) => Self::Analyze(text.to_owned()),
            ("new", _) => Self::New,
            ("history", _) => Self::History,
            ("load", "") => Self::Invalid("usage: /load <session id>".into()),
            ("load", id) => Self::Load(SessionId::from(id)),
            ("facts", _) => Self::Facts,
            ("models", _) => Self::Models,
            ("model", "") => Self::Model(None),
            ("model", name) => Self::Model(Some(name.to_owned())),
            ("mode", "") => Self::Mode(None),
            ("mode", name) => match name.parse() {
                Ok(mode) => Self::Mode(Some(mode)),
                Err(_) => Self::Invalid("usage: /mode immediate|complete".into()),
            },
            ("tools", _) => Self::Tools,
            ("status", _) => Self::Status,
            ("help" | "?", _) => Self::Help,
            ("quit" | "exit" | "q", _) => Self::Quit,
            (other, _) => Self::Invalid(format!("unknown command /{other}, try /help")),
        }
    }
}
