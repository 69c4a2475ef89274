//! Command Parsing
//!
//! Every command starts with `漫展` followed by a subcommand, separated by
//! whitespace or a dot: `漫展 查询 南京` and `漫展.查询 南京` are the same.
//! Arguments are whitespace separated and only the first one is used.

use thiserror::Error;

/// Root command word
pub const COMMAND_PREFIX: &str = "漫展";

/// A parsed user command
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// `查询 <kw>`: text lookup
    Query { keyword: Option<String> },
    /// `图片查询 <kw>` / `tpcx`: image lookup
    ImageQuery { keyword: Option<String> },
    /// `一键查询`: text fan-out over subscriptions
    BatchQuery,
    /// `一键图片查询` / `yjtpcx`: image fan-out over subscriptions
    ImageBatchQuery,
    /// `订阅 <kw>`
    Subscribe { keyword: Option<String> },
    /// `取消订阅 [kw]`; no keyword means all, after confirmation
    Unsubscribe { keyword: Option<String> },
    /// `订阅列表`
    ListSubscriptions,
    /// Bare `漫展`
    Help,
}

impl Command {
    /// Canonical subcommand name, for logs
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Query { .. } => "查询",
            Self::ImageQuery { .. } => "图片查询",
            Self::BatchQuery => "一键查询",
            Self::ImageBatchQuery => "一键图片查询",
            Self::Subscribe { .. } => "订阅",
            Self::Unsubscribe { .. } => "取消订阅",
            Self::ListSubscriptions => "订阅列表",
            Self::Help => "help",
        }
    }
}

/// Parse failures for text that does address the bot
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown subcommand '{0}'")]
    UnknownSubcommand(String),
}

/// Stateless parser for `漫展` commands
#[derive(Clone, Copy, Debug, Default)]
pub struct CommandParser;

impl CommandParser {
    /// Parse a message.
    ///
    /// `Ok(None)` means the text is not addressed to the bot at all.
    pub fn parse(text: &str) -> Result<Option<Command>, CommandError> {
        let Some(rest) = text.trim().strip_prefix(COMMAND_PREFIX) else {
            return Ok(None);
        };

        let rest = if let Some(dotted) = rest.strip_prefix('.') {
            dotted
        } else if rest.is_empty() || rest.starts_with(char::is_whitespace) {
            rest
        } else {
            // e.g. "漫展真好玩"
            return Ok(None);
        };

        let mut words = rest.split_whitespace();
        let Some(sub) = words.next() else {
            return Ok(Some(Command::Help));
        };
        let keyword = words.next().map(str::to_string);

        let command = match sub {
            "查询" => Command::Query { keyword },
            "图片查询" | "tpcx" => Command::ImageQuery { keyword },
            "一键查询" => Command::BatchQuery,
            "一键图片查询" | "yjtpcx" => Command::ImageBatchQuery,
            "订阅" => Command::Subscribe { keyword },
            "取消订阅" => Command::Unsubscribe { keyword },
            "订阅列表" => Command::ListSubscriptions,
            other => return Err(CommandError::UnknownSubcommand(other.to_string())),
        };
        Ok(Some(command))
    }
}
