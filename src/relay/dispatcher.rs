//! Event dispatcher
//!
//! Maps each inbound event to store and gateway calls and always produces
//! exactly one reply text. No store lock is held while the provider runs.

use crate::config::RepliesConfig;
use crate::core::gateway::CompletionGateway;
use crate::core::turn::{Turn, UserId};
use crate::messaging::{EventKind, InboundEvent};
use crate::storage::ConversationStore;
use std::sync::Arc;

pub struct Dispatcher {
    store: Arc<ConversationStore>,
    gateway: CompletionGateway,
    max_history: usize,
    replies: RepliesConfig,
}

impl Dispatcher {
    pub fn new(
        store: Arc<ConversationStore>,
        gateway: CompletionGateway,
        max_history: usize,
        replies: RepliesConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            max_history,
            replies,
        }
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn gateway(&self) -> &CompletionGateway {
        &self.gateway
    }

    /// Produce the reply for one event
    pub async fn handle(&self, event: &InboundEvent) -> String {
        match &event.kind {
            EventKind::Start => self.replies.greeting.clone(),
            EventKind::Reset => {
                self.store.reset(event.user_id).await;
                tracing::info!("[Dispatcher] [{}] conversation reset", event.user_id);
                self.replies.reset_confirmation.clone()
            }
            EventKind::Text(text) => self.chat(event.user_id, text).await,
        }
    }

    /// Record the user's turn, ask the provider about the recent window and
    /// record the assistant's answer on success. The answer is discarded if
    /// the history was reset or evicted while the provider was running.
    pub async fn chat(&self, user: UserId, text: &str) -> String {
        tracing::info!("[Dispatcher] [{}] {}", user, text);

        let (window, generation) = self
            .store
            .append_and_window(user, Turn::user(text), self.max_history)
            .await;

        match self.gateway.complete(&window).await {
            Ok(reply) => {
                self.store
                    .append_if_current(user, Turn::assistant(reply.clone()), generation)
                    .await;
                reply
            }
            Err(failure) => {
                tracing::error!("[Dispatcher] [{}] {}", user, failure);
                failure.fallback
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::llm::CompletionProvider;
    use crate::error::ProviderError;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::time::Duration;

    /// Records every window it receives and answers with a fixed reply
    struct Recording {
        reply: Option<String>,
        seen: Mutex<Vec<Vec<Turn>>>,
    }

    #[async_trait]
    impl CompletionProvider for Recording {
        async fn generate(&self, turns: &[Turn]) -> Result<String, ProviderError> {
            self.seen.lock().unwrap().push(turns.to_vec());
            self.reply.clone().ok_or(ProviderError::EmptyReply)
        }
    }

    fn dispatcher(reply: Option<&str>) -> (Dispatcher, Arc<Recording>) {
        let provider = Arc::new(Recording {
            reply: reply.map(str::to_string),
            seen: Mutex::new(Vec::new()),
        });
        let gateway = CompletionGateway::new(provider.clone(), Duration::from_secs(5), "fallback");
        let dispatcher = Dispatcher::new(
            Arc::new(ConversationStore::new()),
            gateway,
            4,
            RepliesConfig::default(),
        );
        (dispatcher, provider)
    }

    fn event(kind: EventKind) -> InboundEvent {
        InboundEvent {
            user_id: UserId(1),
            chat_id: 1,
            kind,
        }
    }

    #[tokio::test]
    async fn test_start_does_not_touch_state() {
        let (dispatcher, provider) = dispatcher(Some("ok"));
        let reply = dispatcher.handle(&event(EventKind::Start)).await;

        assert_eq!(reply, RepliesConfig::default().greeting);
        assert_eq!(dispatcher.store().user_count().await, 0);
        assert!(provider.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_provider_sees_capped_window() {
        let (dispatcher, provider) = dispatcher(Some("ok"));
        for i in 0..3 {
            dispatcher.chat(UserId(1), &format!("q{}", i)).await;
        }

        let seen = provider.seen.lock().unwrap();
        let last = seen.last().unwrap();
        // 3 questions + 2 answers stored before the last call, window of 4
        assert_eq!(last.len(), 4);
        assert_eq!(last[0], Turn::assistant("ok"));
        assert_eq!(last[3], Turn::user("q2"));
    }

    #[tokio::test]
    async fn test_failure_keeps_only_user_turn() {
        let (dispatcher, _) = dispatcher(None);
        let reply = dispatcher.chat(UserId(1), "hello").await;

        assert_eq!(reply, "fallback");
        assert_eq!(
            dispatcher.store().recent_window(UserId(1), 10).await,
            vec![Turn::user("hello")]
        );
    }
}
