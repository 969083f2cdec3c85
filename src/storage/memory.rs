//! In-Memory Conversation Store
//!
//! Information Hiding:
//! - HashMap of per-user histories hidden behind async methods
//! - Each user's history has its own mutex, so same-user operations are
//!   serialized while different users never wait on each other
//! - The outer map lock is only held to find or insert an entry

use crate::core::turn::{Turn, UserId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};

struct History {
    turns: Vec<Turn>,
    last_active: Instant,
    /// Changes on reset and differs between an evicted entry and its replacement
    generation: u64,
}

impl History {
    fn new(generation: u64) -> Self {
        Self {
            turns: Vec::new(),
            last_active: Instant::now(),
            generation,
        }
    }

    fn window(&self, max_turns: usize) -> Vec<Turn> {
        let start = self.turns.len().saturating_sub(max_turns);
        self.turns[start..].to_vec()
    }
}

/// Process-wide mapping from user to chronological turn history.
/// Data is lost when the process terminates.
pub struct ConversationStore {
    histories: RwLock<HashMap<UserId, Arc<Mutex<History>>>>,
    max_stored_turns: Option<usize>,
    idle_ttl: Option<Duration>,
    next_generation: AtomicU64,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self {
            histories: RwLock::new(HashMap::new()),
            max_stored_turns: None,
            idle_ttl: None,
            next_generation: AtomicU64::new(0),
        }
    }

    fn bump_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::Relaxed)
    }

    /// Drop the oldest stored turns once a history grows past `cap`
    pub fn with_max_stored_turns(mut self, cap: usize) -> Self {
        self.max_stored_turns = Some(cap);
        self
    }

    /// Enable eviction of users idle for longer than `ttl`
    pub fn with_idle_ttl(mut self, ttl: Duration) -> Self {
        self.idle_ttl = Some(ttl);
        self
    }

    async fn entry(&self, user: UserId) -> Arc<Mutex<History>> {
        if let Some(history) = self.histories.read().await.get(&user) {
            return history.clone();
        }

        let mut histories = self.histories.write().await;
        histories
            .entry(user)
            .or_insert_with(|| {
                tracing::debug!("[ConversationStore] New history for user {}", user);
                Arc::new(Mutex::new(History::new(self.bump_generation())))
            })
            .clone()
    }

    async fn existing(&self, user: UserId) -> Option<Arc<Mutex<History>>> {
        self.histories.read().await.get(&user).cloned()
    }

    fn push(&self, history: &mut History, turn: Turn) {
        history.turns.push(turn);
        if let Some(cap) = self.max_stored_turns {
            let excess = history.turns.len().saturating_sub(cap);
            if excess > 0 {
                history.turns.drain(..excess);
            }
        }
        history.last_active = Instant::now();
    }

    /// Append a turn to the end of the user's history, creating it if absent
    pub async fn append(&self, user: UserId, turn: Turn) {
        let entry = self.entry(user).await;
        let mut history = entry.lock().await;
        self.push(&mut history, turn);
    }

    /// Last `max_turns` turns in chronological order; empty for an unknown user
    pub async fn recent_window(&self, user: UserId, max_turns: usize) -> Vec<Turn> {
        let Some(entry) = self.existing(user).await else {
            return Vec::new();
        };
        let mut history = entry.lock().await;
        history.last_active = Instant::now();
        history.window(max_turns)
    }

    /// Append and read the window under one lock acquisition, so another
    /// message from the same user cannot land between the two steps.
    ///
    /// Also returns the history's generation for a later `append_if_current`.
    pub async fn append_and_window(
        &self,
        user: UserId,
        turn: Turn,
        max_turns: usize,
    ) -> (Vec<Turn>, u64) {
        let entry = self.entry(user).await;
        let mut history = entry.lock().await;
        self.push(&mut history, turn);
        (history.window(max_turns), history.generation)
    }

    /// Append only if the history is still the one `generation` was read from.
    /// A reset or eviction in between drops the turn; returns whether it was stored.
    pub async fn append_if_current(&self, user: UserId, turn: Turn, generation: u64) -> bool {
        let Some(entry) = self.existing(user).await else {
            tracing::debug!(
                "[ConversationStore] History for user {} was evicted, dropping {} turn",
                user,
                turn.role
            );
            return false;
        };

        let mut history = entry.lock().await;
        if history.generation != generation {
            tracing::debug!(
                "[ConversationStore] History for user {} was reset, dropping {} turn",
                user,
                turn.role
            );
            return false;
        }

        self.push(&mut history, turn);
        true
    }

    /// Replace the user's history with an empty one. Idempotent.
    pub async fn reset(&self, user: UserId) {
        let entry = self.entry(user).await;
        let mut history = entry.lock().await;
        history.turns.clear();
        history.generation = self.bump_generation();
        history.last_active = Instant::now();
        tracing::debug!("[ConversationStore] Reset history for user {}", user);
    }

    /// Number of stored turns for the user
    pub async fn len(&self, user: UserId) -> usize {
        match self.existing(user).await {
            Some(entry) => entry.lock().await.turns.len(),
            None => 0,
        }
    }

    /// Number of users with a history entry
    pub async fn user_count(&self) -> usize {
        self.histories.read().await.len()
    }

    /// Remove users idle since before `now - idle_ttl`. Returns how many were removed.
    ///
    /// Entries currently locked or referenced by an in-flight operation are
    /// skipped and reconsidered on the next sweep.
    pub async fn evict_idle(&self, now: Instant) -> usize {
        let Some(ttl) = self.idle_ttl else {
            return 0;
        };

        let mut histories = self.histories.write().await;
        let before = histories.len();

        histories.retain(|_, entry| {
            if Arc::strong_count(entry) > 1 {
                return true;
            }
            match entry.try_lock() {
                Ok(history) => now.saturating_duration_since(history.last_active) < ttl,
                Err(_) => true,
            }
        });

        let evicted = before - histories.len();
        if evicted > 0 {
            tracing::info!(
                "[ConversationStore] Evicted {} idle conversation(s), {} remaining",
                evicted,
                histories.len()
            );
        }
        evicted
    }

    /// Run `evict_idle` every `interval`. Returns `None` when eviction is disabled.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> Option<JoinHandle<()>> {
        if self.idle_ttl.is_none() {
            return None;
        }

        let store = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                store.evict_idle(Instant::now()).await;
            }
        }))
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER: UserId = UserId(42);

    #[tokio::test]
    async fn test_window_returns_last_turns_in_order() {
        let store = ConversationStore::new();
        for i in 0..5 {
            store.append(USER, Turn::user(format!("m{}", i))).await;
        }

        for k in 0..8 {
            let window = store.recent_window(USER, k).await;
            let expected: Vec<Turn> = (0..5)
                .skip(5usize.saturating_sub(k))
                .map(|i| Turn::user(format!("m{}", i)))
                .collect();
            assert_eq!(window, expected, "window size {}", k);
        }
    }

    #[tokio::test]
    async fn test_unknown_user_is_empty_and_not_created() {
        let store = ConversationStore::new();
        assert!(store.recent_window(UserId(7), 20).await.is_empty());
        assert_eq!(store.len(UserId(7)).await, 0);
        assert_eq!(store.user_count().await, 0);
    }

    #[tokio::test]
    async fn test_reset_clears_and_is_idempotent() {
        let store = ConversationStore::new();
        store.append(USER, Turn::user("hello")).await;
        store.append(USER, Turn::assistant("hi there")).await;

        store.reset(USER).await;
        store.reset(USER).await;
        for k in [0, 1, 20, 100] {
            assert!(store.recent_window(USER, k).await.is_empty());
        }

        store.reset(UserId(99)).await;
        assert!(store.recent_window(UserId(99), 20).await.is_empty());
    }

    #[tokio::test]
    async fn test_stored_history_is_not_trimmed_by_default() {
        let store = ConversationStore::new();
        for i in 0..25 {
            store.append(USER, Turn::user(format!("m{}", i))).await;
        }
        assert_eq!(store.len(USER).await, 25);

        let window = store.recent_window(USER, 20).await;
        assert_eq!(window.len(), 20);
        assert_eq!(window[0].content, "m5");
        assert_eq!(window[19].content, "m24");
    }

    #[tokio::test]
    async fn test_write_time_cap_drops_oldest() {
        let store = ConversationStore::new().with_max_stored_turns(3);
        for i in 0..5 {
            store.append(USER, Turn::user(format!("m{}", i))).await;
        }
        let all = store.recent_window(USER, 10).await;
        let contents: Vec<_> = all.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn test_append_and_window_includes_new_turn() {
        let store = ConversationStore::new();
        store.append(USER, Turn::user("a")).await;
        store.append(USER, Turn::assistant("b")).await;

        let (window, _) = store.append_and_window(USER, Turn::user("c"), 2).await;
        assert_eq!(window, vec![Turn::assistant("b"), Turn::user("c")]);
        assert_eq!(store.len(USER).await, 3);
    }

    #[tokio::test]
    async fn test_append_if_current_checks_generation() {
        let store = ConversationStore::new();
        let (_, generation) = store.append_and_window(USER, Turn::user("q1"), 20).await;
        assert!(store.append_if_current(USER, Turn::assistant("a1"), generation).await);

        let (_, stale) = store.append_and_window(USER, Turn::user("q2"), 20).await;
        assert_eq!(stale, generation);
        store.reset(USER).await;

        assert!(!store.append_if_current(USER, Turn::assistant("a2"), stale).await);
        assert!(store.recent_window(USER, 20).await.is_empty());
    }

    #[tokio::test]
    async fn test_append_if_current_does_not_revive_evicted_user() {
        let store = ConversationStore::new().with_idle_ttl(Duration::from_secs(1));
        let (_, generation) = store.append_and_window(USER, Turn::user("q"), 20).await;

        assert_eq!(store.evict_idle(Instant::now() + Duration::from_secs(5)).await, 1);
        assert!(!store.append_if_current(USER, Turn::assistant("late"), generation).await);
        assert_eq!(store.user_count().await, 0);

        // a recreated entry gets a fresh generation
        let (_, fresh) = store.append_and_window(USER, Turn::user("again"), 20).await;
        assert_ne!(fresh, generation);
        assert!(!store.append_if_current(USER, Turn::assistant("late"), generation).await);
        assert_eq!(store.recent_window(USER, 20).await, vec![Turn::user("again")]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_same_user_appends_are_not_lost() {
        let store = Arc::new(ConversationStore::new());
        store.append(USER, Turn::user("seed")).await;
        let before = store.recent_window(USER, usize::MAX).await.len();

        let a = {
            let store = store.clone();
            tokio::spawn(async move { store.append(USER, Turn::user("a")).await })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move { store.append(USER, Turn::user("b")).await })
        };
        a.await.unwrap();
        b.await.unwrap();

        let after = store.recent_window(USER, usize::MAX).await.len();
        assert_eq!(after, before + 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_many_users_many_appends() {
        let store = Arc::new(ConversationStore::new());
        let mut handles = Vec::new();
        for user in 0..8u64 {
            for i in 0..50 {
                let store = store.clone();
                handles.push(tokio::spawn(async move {
                    store.append(UserId(user), Turn::user(format!("{}", i))).await;
                }));
            }
        }
        futures::future::join_all(handles).await;

        assert_eq!(store.user_count().await, 8);
        for user in 0..8u64 {
            assert_eq!(store.len(UserId(user)).await, 50);
        }
    }

    #[tokio::test]
    async fn test_evict_idle_disabled_by_default() {
        let store = ConversationStore::new();
        store.append(USER, Turn::user("hello")).await;
        let later = Instant::now() + Duration::from_secs(10_000);
        assert_eq!(store.evict_idle(later).await, 0);
        assert_eq!(store.user_count().await, 1);
    }

    #[tokio::test]
    async fn test_evict_idle_removes_stale_users_only() {
        let store = ConversationStore::new().with_idle_ttl(Duration::from_secs(60));
        store.append(UserId(1), Turn::user("old")).await;
        store.append(UserId(2), Turn::user("new")).await;

        assert_eq!(store.evict_idle(Instant::now()).await, 0);

        let later = Instant::now() + Duration::from_secs(120);
        assert_eq!(store.evict_idle(later).await, 2);
        assert_eq!(store.user_count().await, 0);
        assert!(store.recent_window(UserId(1), 20).await.is_empty());
    }

    #[tokio::test]
    async fn test_sweeper_only_spawned_with_ttl() {
        let store = Arc::new(ConversationStore::new());
        assert!(store.spawn_sweeper(Duration::from_secs(1)).is_none());

        let store = Arc::new(ConversationStore::new().with_idle_ttl(Duration::from_secs(1)));
        let handle = store.spawn_sweeper(Duration::from_secs(1)).unwrap();
        handle.abort();
    }
}
