mod settings;

pub use settings::{
    ConversationConfig, LoggingConfig, ProviderConfig, RepliesConfig, Settings, TelegramConfig,
};
