//! Telegram adapter using teloxide long polling

use super::{split_message, EventKind, InboundEvent, InboundStream, Messaging};
use crate::config::TelegramConfig;
use crate::core::turn::UserId;

use anyhow::Context as _;
use async_trait::async_trait;
use teloxide::payloads::setters::*;
use teloxide::requests::{Request, Requester};
use teloxide::types::{ChatAction, ChatId, ParseMode, UpdateKind};
use teloxide::Bot;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

/// Telegram's per-message character limit
const MAX_MESSAGE_LENGTH: usize = 4096;

/// Typing indicators expire after 5 seconds on Telegram's side
const TYPING_REFRESH: Duration = Duration::from_secs(4);

struct TypingIndicator {
    pending: usize,
    handle: JoinHandle<()>,
}

pub struct TelegramAdapter {
    bot: Bot,
    config: TelegramConfig,
    /// Repeating typing indicator per chat, with the number of replies still pending there
    typing_tasks: Arc<RwLock<HashMap<i64, TypingIndicator>>>,
    shutdown_tx: Arc<RwLock<Option<mpsc::Sender<()>>>>,
}

fn build_http_client(config: &TelegramConfig) -> reqwest::Client {
    // long polling holds the request open for poll_timeout_secs
    let timeout = Duration::from_secs(config.poll_timeout_secs as u64 + 5);

    match reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .timeout(timeout)
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!("[Telegram] Failed to build HTTP client ({}), using defaults", e);
            reqwest::Client::new()
        }
    }
}

impl TelegramAdapter {
    pub fn new(token: impl Into<String>, config: TelegramConfig) -> Self {
        let bot = Bot::with_client(token.into(), build_http_client(&config));
        Self {
            bot,
            config,
            typing_tasks: Arc::new(RwLock::new(HashMap::new())),
            shutdown_tx: Arc::new(RwLock::new(None)),
        }
    }

    /// Release one pending reply; the indicator stops with the last one
    async fn stop_typing(&self, chat_id: i64) {
        let mut tasks = self.typing_tasks.write().await;
        let Some(indicator) = tasks.get_mut(&chat_id) else {
            return;
        };

        indicator.pending = indicator.pending.saturating_sub(1);
        if indicator.pending == 0 {
            if let Some(indicator) = tasks.remove(&chat_id) {
                indicator.handle.abort();
            }
        }
    }

    async fn send_chunk(&self, chat_id: ChatId, chunk: &str) -> anyhow::Result<()> {
        if self.config.parse_mode_markdown {
            #[allow(deprecated)]
            let sent = self
                .bot
                .send_message(chat_id, chunk)
                .parse_mode(ParseMode::Markdown)
                .send()
                .await;

            match sent {
                Ok(_) => return Ok(()),
                Err(e) => {
                    // model output is not guaranteed to be valid Markdown
                    tracing::debug!("[Telegram] Markdown rejected ({}), resending as plain text", e);
                }
            }
        }

        self.bot
            .send_message(chat_id, chunk)
            .send()
            .await
            .context("failed to send telegram message")?;
        Ok(())
    }
}

#[async_trait]
impl Messaging for TelegramAdapter {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> anyhow::Result<InboundStream> {
        let (inbound_tx, inbound_rx) = mpsc::channel(256);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        *self.shutdown_tx.write().await = Some(shutdown_tx);

        let me = self
            .bot
            .get_me()
            .send()
            .await
            .context("failed to call getMe on Telegram")?;
        tracing::info!("[Telegram] Connected as {:?}", me.username);

        let bot = self.bot.clone();
        let bot_username = me.username.clone();
        let poll_timeout = self.config.poll_timeout_secs;
        let retry_delay = Duration::from_secs(self.config.retry_delay_secs);

        tokio::spawn(async move {
            let mut offset = 0i32;

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("[Telegram] Polling loop shutting down");
                        break;
                    }
                    result = bot.get_updates().offset(offset).timeout(poll_timeout).send() => {
                        let updates = match result {
                            Ok(updates) => updates,
                            Err(e) => {
                                tracing::error!(
                                    "[Telegram] getUpdates failed: {}. Retrying in {:?}",
                                    e,
                                    retry_delay
                                );
                                tokio::time::sleep(retry_delay).await;
                                continue;
                            }
                        };

                        for update in updates {
                            offset = update.id.as_offset() as i32;

                            let UpdateKind::Message(message) = update.kind else {
                                continue;
                            };

                            let Some(from) = message.from.as_ref() else {
                                continue;
                            };
                            if from.is_bot {
                                continue;
                            }

                            let Some(text) = message.text() else {
                                continue;
                            };

                            let Some(kind) = EventKind::parse(text, bot_username.as_deref()) else {
                                continue;
                            };

                            let event = InboundEvent {
                                user_id: UserId(from.id.0),
                                chat_id: message.chat.id.0,
                                kind,
                            };

                            if inbound_tx.send(event).await.is_err() {
                                tracing::warn!("[Telegram] Inbound receiver dropped, stopping polling");
                                return;
                            }
                        }
                    }
                }
            }
        });

        let stream = tokio_stream::wrappers::ReceiverStream::new(inbound_rx);
        Ok(Box::pin(stream))
    }

    async fn send_typing(&self, event: &InboundEvent) -> anyhow::Result<()> {
        let mut tasks = self.typing_tasks.write().await;
        if let Some(indicator) = tasks.get_mut(&event.chat_id) {
            indicator.pending += 1;
            return Ok(());
        }

        let bot = self.bot.clone();
        let chat_id = ChatId(event.chat_id);

        let handle = tokio::spawn(async move {
            loop {
                if let Err(e) = bot.send_chat_action(chat_id, ChatAction::Typing).send().await {
                    tracing::debug!("[Telegram] Failed to send typing indicator: {}", e);
                    break;
                }
                tokio::time::sleep(TYPING_REFRESH).await;
            }
        });

        tasks.insert(event.chat_id, TypingIndicator { pending: 1, handle });
        Ok(())
    }

    async fn respond(&self, event: &InboundEvent, text: &str) -> anyhow::Result<()> {
        if event.kind.needs_completion() {
            self.stop_typing(event.chat_id).await;
        }

        let chat_id = ChatId(event.chat_id);
        for chunk in split_message(text, MAX_MESSAGE_LENGTH) {
            self.send_chunk(chat_id, &chunk).await?;
        }
        Ok(())
    }

    async fn shutdown(&self) -> anyhow::Result<()> {
        let mut tasks = self.typing_tasks.write().await;
        for (_, indicator) in tasks.drain() {
            indicator.handle.abort();
        }

        if let Some(tx) = self.shutdown_tx.read().await.as_ref() {
            tx.send(()).await.ok();
        }

        tracing::info!("[Telegram] Adapter shut down");
        Ok(())
    }
}
