use anyhow::Result;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub provider: ProviderConfig,
    pub conversation: ConversationConfig,
    pub telegram: TelegramConfig,
    pub replies: RepliesConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub model: String,
    pub base_url: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
    /// Prepended to every request; never stored in a user's history
    pub system_prompt: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            temperature: None,
            max_tokens: None,
            timeout_secs: 60,
            system_prompt: None,
        }
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Number of most recent turns sent to the provider
    pub max_history: usize,
    /// Write-time cap on stored turns. Unset keeps the full history.
    pub max_stored_turns: Option<usize>,
    /// Users idle for longer than this are dropped. 0 disables eviction.
    pub idle_ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_history: 20,
            max_stored_turns: None,
            idle_ttl_secs: 0,
            sweep_interval_secs: 300,
        }
    }
}

impl ConversationConfig {
    pub fn idle_ttl(&self) -> Option<Duration> {
        (self.idle_ttl_secs > 0).then(|| Duration::from_secs(self.idle_ttl_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub poll_timeout_secs: u32,
    pub retry_delay_secs: u64,
    pub parse_mode_markdown: bool,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            poll_timeout_secs: 30,
            retry_delay_secs: 5,
            parse_mode_markdown: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepliesConfig {
    pub greeting: String,
    pub reset_confirmation: String,
    pub fallback: String,
}

impl Default for RepliesConfig {
    fn default() -> Self {
        Self {
            greeting: "👋 Hi! I'm a GPT bot.\n\n\
                       Just send me a message and I'll do my best to answer 🤖\n\n\
                       Use /reset to clear the conversation."
                .to_string(),
            reset_confirmation: "🧹 Conversation history cleared.".to_string(),
            fallback: "⚠️ Error while contacting GPT. Please try again later.".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Load `config/{CONFIG_ENV}` (optional) and `APP__*` overrides on top of defaults
    pub fn new() -> Result<Self> {
        let config_env = env::var("CONFIG_ENV").unwrap_or_else(|_| "default".to_string());
        let settings = Self::build(File::with_name(&format!("config/{}", config_env)).required(false))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from an explicit file path
    pub fn from_file(path: &Path) -> Result<Self> {
        let settings = Self::build(File::from(path).required(true))?;
        settings.validate()?;
        Ok(settings)
    }

    fn build<S>(file: S) -> Result<Self, ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    pub fn validate(&self) -> Result<()> {
        if self.conversation.max_history == 0 {
            anyhow::bail!("conversation.max_history must be at least 1");
        }
        if self.provider.timeout_secs == 0 {
            anyhow::bail!("provider.timeout_secs must be at least 1");
        }
        if let Some(cap) = self.conversation.max_stored_turns {
            if cap < self.conversation.max_history {
                anyhow::bail!(
                    "conversation.max_stored_turns ({}) must not be smaller than max_history ({})",
                    cap,
                    self.conversation.max_history
                );
            }
        }
        Ok(())
    }

    pub fn api_key() -> Result<String> {
        env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))
    }

    pub fn telegram_token() -> Result<String> {
        env::var("TELEGRAM_TOKEN")
            .map_err(|_| anyhow::anyhow!("TELEGRAM_TOKEN environment variable not set"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_relay_behaviour() {
        let settings = Settings::default();
        assert_eq!(settings.conversation.max_history, 20);
        assert_eq!(settings.provider.model, "gpt-4");
        assert!(settings.conversation.max_stored_turns.is_none());
        assert!(settings.conversation.idle_ttl().is_none());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[conversation]\nmax_history = 6\nidle_ttl_secs = 3600\n\n[provider]\nmodel = \"gpt-4o-mini\""
        )
        .unwrap();

        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.conversation.max_history, 6);
        assert_eq!(settings.conversation.idle_ttl(), Some(Duration::from_secs(3600)));
        assert_eq!(settings.provider.model, "gpt-4o-mini");
        assert_eq!(settings.provider.timeout_secs, 60);
        assert_eq!(settings.replies.fallback, RepliesConfig::default().fallback);
    }

    #[test]
    fn test_zero_history_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[conversation]\nmax_history = 0").unwrap();

        let err = Settings::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("max_history"));
    }

    #[test]
    fn test_stored_cap_below_window_rejected() {
        let mut settings = Settings::default();
        settings.conversation.max_stored_turns = Some(5);
        assert!(settings.validate().is_err());
    }
}
