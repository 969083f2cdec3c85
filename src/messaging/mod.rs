//! Messaging adapters
//!
//! An adapter turns platform traffic into `InboundEvent`s and delivers the
//! dispatcher's reply for each one. Telegram is the production adapter; the
//! console adapter drives the same dispatcher from a terminal.

pub mod console;
pub mod telegram;

use crate::core::turn::UserId;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

pub use console::ConsoleAdapter;
pub use telegram::TelegramAdapter;

/// Inbound event stream
pub type InboundStream = Pin<Box<dyn Stream<Item = InboundEvent> + Send>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Start,
    Reset,
    Text(String),
}

impl EventKind {
    /// Classify a raw message. `/start` and `/reset` become commands, other
    /// slash commands are ignored, anything else is chat text.
    ///
    /// A `/cmd@name` suffix is accepted only when it names this bot.
    pub fn parse(text: &str, bot_username: Option<&str>) -> Option<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }

        let Some(command) = trimmed.strip_prefix('/') else {
            return Some(EventKind::Text(text.to_string()));
        };

        let word = command.split_whitespace().next().unwrap_or("");
        let (name, target) = match word.split_once('@') {
            Some((name, target)) => (name, Some(target)),
            None => (word, None),
        };

        if let (Some(target), Some(me)) = (target, bot_username) {
            if !target.eq_ignore_ascii_case(me) {
                return None;
            }
        }

        match name.to_ascii_lowercase().as_str() {
            "start" => Some(EventKind::Start),
            "reset" => Some(EventKind::Reset),
            _ => None,
        }
    }

    pub fn needs_completion(&self) -> bool {
        matches!(self, EventKind::Text(_))
    }
}

/// A single message from the platform
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub user_id: UserId,
    pub chat_id: i64,
    pub kind: EventKind,
}

#[async_trait]
pub trait Messaging: Send + Sync + 'static {
    /// Unique name for this adapter
    fn name(&self) -> &str;

    /// Start the adapter and return the inbound event stream
    async fn start(&self) -> anyhow::Result<InboundStream>;

    /// Show a typing/presence indicator until the reply is sent
    async fn send_typing(&self, _event: &InboundEvent) -> anyhow::Result<()> {
        Ok(())
    }

    /// Deliver the reply for an event
    async fn respond(&self, event: &InboundEvent, text: &str) -> anyhow::Result<()>;

    async fn shutdown(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Split `text` into chunks of at most `max_len` bytes, preferring newline
/// and then space boundaries. Only the separator a chunk ends on is dropped.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if max_len == 0 || text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut limit = floor_char_boundary(remaining, max_len);
        if limit == 0 {
            // a single char wider than max_len still has to go somewhere
            limit = remaining.chars().next().map_or(remaining.len(), char::len_utf8);
        }

        let (split_at, separator) = match remaining[..limit]
            .rfind('\n')
            .or_else(|| remaining[..limit].rfind(' '))
            .filter(|&at| at > 0)
        {
            Some(at) => (at, 1),
            None => (limit, 0),
        };

        chunks.push(remaining[..split_at].to_string());
        remaining = &remaining[split_at + separator..];
    }

    chunks
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}
