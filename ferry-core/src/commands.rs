// ABOUTME: Slash-command parsing for Telegram messages
// ABOUTME: Splits /command@bot args from prompts and maps names to the bot's commands

/// Represents a parsed command from a chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// The command name (without the slash or @bot suffix), lowercased
    pub name: String,
    /// Parsed arguments (handles quoted strings)
    pub args: Vec<String>,
    /// The raw argument string after the command name
    pub raw_args: String,
}

impl Command {
    pub fn new(name: impl Into<String>, args: Vec<String>, raw_args: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args,
            raw_args: raw_args.into(),
        }
    }

    pub fn first_arg(&self) -> Option<&str> {
        self.args.first().map(|s| s.as_str())
    }
}

/// Result of parsing a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseResult {
    /// A slash command addressed to this bot
    Command(Command),
    /// Text to hand to the agent
    Message(String),
    /// Empty, or a command for a different bot in a group chat
    Ignore,
}

impl ParseResult {
    pub fn is_command(&self) -> bool {
        matches!(self, ParseResult::Command(_))
    }

    pub fn as_message(&self) -> Option<&str> {
        match self {
            ParseResult::Message(msg) => Some(msg),
            _ => None,
        }
    }
}

/// Parse arguments from a string, respecting quoted strings
fn parse_args(input: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut quote_char = '"';

    for c in input.chars() {
        match c {
            '"' | '\'' if !in_quotes => {
                in_quotes = true;
                quote_char = c;
            }
            c if c == quote_char && in_quotes => {
                in_quotes = false;
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }

    if !current.is_empty() {
        args.push(current);
    }

    args
}

/// Parse a chat message to determine if it's a command
///
/// Recognizes `/command args` and `/command@bot_username args`. A command
/// addressed to another bot is ignored. Messages starting with `//` are
/// sent to the agent with one slash removed, so the agent's own slash
/// commands stay reachable.
pub fn parse_message(body: &str, bot_username: Option<&str>) -> ParseResult {
    let trimmed = body.trim();

    if trimmed.is_empty() {
        return ParseResult::Ignore;
    }

    if let Some(escaped) = trimmed.strip_prefix("//") {
        let escaped = escaped.trim();
        if escaped.is_empty() {
            return ParseResult::Ignore;
        }
        return ParseResult::Message(format!("/{}", escaped));
    }

    let Some(after_slash) = trimmed.strip_prefix('/') else {
        return ParseResult::Message(trimmed.to_string());
    };

    if !after_slash.chars().next().is_some_and(|c| c.is_alphabetic()) {
        return ParseResult::Message(trimmed.to_string());
    }

    let (head, raw_args) = match after_slash.find(char::is_whitespace) {
        Some(pos) => (&after_slash[..pos], after_slash[pos..].trim()),
        None => (after_slash, ""),
    };

    let name = match head.split_once('@') {
        Some((name, target)) => {
            let ours = bot_username.is_some_and(|u| u.eq_ignore_ascii_case(target));
            if !ours {
                return ParseResult::Ignore;
            }
            name
        }
        None => head,
    };

    ParseResult::Command(Command::new(
        name.to_lowercase(),
        parse_args(raw_args),
        raw_args,
    ))
}

/// Commands the bot handles itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    Help,
    /// Forget the session token (alias: /reset)
    New,
    Status,
    Files,
}

impl BotCommand {
    /// None for commands the bot doesn't know; those go to the agent
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "start" => Some(Self::Start),
            "help" => Some(Self::Help),
            "new" | "reset" => Some(Self::New),
            "status" => Some(Self::Status),
            "files" => Some(Self::Files),
            _ => None,
        }
    }
}

pub const HELP_TEXT: &str = "\
Send any message and I'll pass it to Claude, streaming the answer back here.

/new - start a fresh conversation (alias /reset)
/status - session, rate limit, and working directory
/files - list files you've uploaded
/help - this message

Attach a document or photo to put it in your working directory.
Start a message with // to send a slash command to Claude itself.";

pub const WELCOME_TEXT: &str = "👋 Hi! I relay your messages to Claude and stream back the answer.";
