//! chatrelay - Telegram chat relay for LLM completion endpoints
//!
//! Keeps a per-user turn history in memory, sends the most recent window
//! of it to the completion provider and relays the reply back.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod messaging;
pub mod relay;
pub mod storage;
pub mod utils;

pub use crate::config::Settings;
pub use crate::core::{CompletionFailure, CompletionGateway, CompletionProvider, OpenAiProvider, Role, Turn, UserId};
pub use crate::error::ProviderError;
pub use crate::relay::Dispatcher;
pub use crate::storage::ConversationStore;

use messaging::Messaging;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Everything the relay needs, built once at startup and torn down at shutdown
pub struct RelaySystem {
    settings: Settings,
    dispatcher: Arc<Dispatcher>,
    sweeper: Option<JoinHandle<()>>,
}

impl RelaySystem {
    /// Build against the OpenAI provider using `OPENAI_API_KEY`
    pub fn new(settings: Settings) -> anyhow::Result<Self> {
        let api_key = Settings::api_key()?;
        let provider = Arc::new(OpenAiProvider::new(api_key, settings.provider.clone()));
        Ok(Self::with_provider(settings, provider))
    }

    pub fn with_provider(settings: Settings, provider: Arc<dyn CompletionProvider>) -> Self {
        let store = Arc::new(ConversationStore::from_config(&settings.conversation));
        let sweeper = store.spawn_sweeper(Duration::from_secs(settings.conversation.sweep_interval_secs.max(1)));

        let gateway = CompletionGateway::new(
            provider,
            settings.provider.timeout(),
            settings.replies.fallback.clone(),
        );
        let dispatcher = Arc::new(Dispatcher::new(
            store,
            gateway,
            settings.conversation.max_history,
            settings.replies.clone(),
        ));

        tracing::info!(
            "Relay system initialized (model: {}, max_history: {})",
            settings.provider.model,
            settings.conversation.max_history
        );

        Self {
            settings,
            dispatcher,
            sweeper,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Run the relay loop over `adapter` until it stops
    pub async fn serve(&self, adapter: Arc<dyn Messaging>) -> anyhow::Result<()> {
        relay::run(adapter, self.dispatcher.clone()).await
    }

    pub fn shutdown(mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
        tracing::info!("Relay system shutdown complete");
    }
}
