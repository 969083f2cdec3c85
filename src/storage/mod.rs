//! Conversation Storage
//!
//! Histories live in memory for the lifetime of the process. The store is
//! constructed once at startup and shared by `Arc` with every handler.

pub mod memory;

pub use memory::ConversationStore;

use crate::config::ConversationConfig;

impl ConversationStore {
    /// Build a store from the `[conversation]` settings
    pub fn from_config(config: &ConversationConfig) -> Self {
        let mut store = ConversationStore::new();
        if let Some(cap) = config.max_stored_turns {
            store = store.with_max_stored_turns(cap);
        }
        if let Some(ttl) = config.idle_ttl() {
            store = store.with_idle_ttl(ttl);
        }
        store
    }
}
