use crate::config::ProviderConfig;
use crate::core::turn::Turn;
use crate::error::ProviderError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// The external completion service behind the gateway
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Generate the assistant reply for an ordered sequence of turns
    async fn generate(&self, turns: &[Turn]) -> Result<String, ProviderError>;

    fn name(&self) -> &str {
        "provider"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl From<&Turn> for ChatMessage {
    fn from(turn: &Turn) -> Self {
        Self {
            role: turn.role.as_str().to_string(),
            content: turn.content.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat completions client
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    config: ProviderConfig,
}

impl OpenAiProvider {
    pub fn new(api_key: String, config: ProviderConfig) -> Self {
        Self {
            client: Client::new(),
            api_key,
            config,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn build_request(&self, turns: &[Turn]) -> ChatRequest {
        let mut messages = Vec::with_capacity(turns.len() + 1);
        if let Some(system) = &self.config.system_prompt {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.extend(turns.iter().map(ChatMessage::from));

        ChatRequest {
            model: self.config.model.clone(),
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn generate(&self, turns: &[Turn]) -> Result<String, ProviderError> {
        let request = self.build_request(turns);

        tracing::debug!(
            "[OpenAiProvider] Sending {} messages to model {}",
            request.messages.len(),
            request.model
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let chat_response = response
            .json::<ChatResponse>()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(ProviderError::EmptyReply)
    }

    fn name(&self) -> &str {
        "openai"
    }
}
