//! Error types for provider calls
//!
//! Application edges (startup, adapters) use `anyhow`; the completion path
//! keeps a typed error so the dispatcher can turn it into a fallback reply.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider did not answer within {0} seconds")]
    Timeout(u64),

    #[error("Provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode provider response: {0}")]
    Decode(String),

    #[error("Provider returned no reply content")]
    EmptyReply,

    #[error("Refusing to request a completion for an empty conversation")]
    EmptyConversation,
}

impl ProviderError {
    /// Short machine-friendly label used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Http(_) => "http",
            ProviderError::Timeout(_) => "timeout",
            ProviderError::Status { .. } => "status",
            ProviderError::Decode(_) => "decode",
            ProviderError::EmptyReply => "empty_reply",
            ProviderError::EmptyConversation => "empty_conversation",
        }
    }
}
