//! Console adapter: one local user chatting through stdin/stdout

use super::{EventKind, InboundEvent, InboundStream, Messaging};
use crate::core::turn::UserId;
use crate::utils;
use async_trait::async_trait;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

pub struct ConsoleAdapter {
    user_id: UserId,
}

impl ConsoleAdapter {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }
}

#[async_trait]
impl Messaging for ConsoleAdapter {
    fn name(&self) -> &str {
        "console"
    }

    async fn start(&self) -> anyhow::Result<InboundStream> {
        let (inbound_tx, inbound_rx) = mpsc::channel(16);
        let user_id = self.user_id;

        utils::print_header("Chat relay (console)");
        utils::print_info("Type a message, /reset to clear the conversation, Ctrl+D to exit\n");
        utils::print_prompt("You: ");

        tokio::spawn(async move {
            let mut lines = BufReader::new(io::stdin()).lines();

            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!("[Console] Failed to read stdin: {}", e);
                        break;
                    }
                };

                let Some(kind) = EventKind::parse(&line, None) else {
                    utils::print_prompt("You: ");
                    continue;
                };

                let event = InboundEvent {
                    user_id,
                    chat_id: 0,
                    kind,
                };
                if inbound_tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        let stream = tokio_stream::wrappers::ReceiverStream::new(inbound_rx);
        Ok(Box::pin(stream))
    }

    async fn send_typing(&self, _event: &InboundEvent) -> anyhow::Result<()> {
        utils::print_info("…");
        Ok(())
    }

    async fn respond(&self, _event: &InboundEvent, text: &str) -> anyhow::Result<()> {
        utils::print_reply(text);
        utils::print_prompt("You: ");
        Ok(())
    }
}
