//! Completion gateway
//!
//! One request, one response. Every provider failure, including a timeout,
//! comes back as a `CompletionFailure` holding the text to show the user.

use crate::core::llm::CompletionProvider;
use crate::core::turn::Turn;
use crate::error::ProviderError;
use std::fmt;
use std::sync::Arc;
use tokio::time::{timeout, Duration};

/// A failed completion: the cause plus the reply the user should see
#[derive(Debug)]
pub struct CompletionFailure {
    pub error: ProviderError,
    pub fallback: String,
}

impl fmt::Display for CompletionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "completion failed ({}): {}", self.error.kind(), self.error)
    }
}

impl std::error::Error for CompletionFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

pub struct CompletionGateway {
    provider: Arc<dyn CompletionProvider>,
    timeout: Duration,
    fallback: String,
}

impl CompletionGateway {
    pub fn new(provider: Arc<dyn CompletionProvider>, timeout: Duration, fallback: impl Into<String>) -> Self {
        Self {
            provider,
            timeout,
            fallback: fallback.into(),
        }
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    fn fail(&self, error: ProviderError) -> CompletionFailure {
        CompletionFailure {
            error,
            fallback: self.fallback.clone(),
        }
    }

    /// Ask the provider for the assistant reply to `turns`
    pub async fn complete(&self, turns: &[Turn]) -> Result<String, CompletionFailure> {
        if turns.is_empty() {
            return Err(self.fail(ProviderError::EmptyConversation));
        }

        match timeout(self.timeout, self.provider.generate(turns)).await {
            Ok(Ok(reply)) => {
                tracing::debug!(
                    "[CompletionGateway] {} replied with {} chars",
                    self.provider.name(),
                    reply.len()
                );
                Ok(reply)
            }
            Ok(Err(error)) => Err(self.fail(error)),
            Err(_) => Err(self.fail(ProviderError::Timeout(self.timeout.as_secs()))),
        }
    }
}
