use crate::messaging::{InboundEvent, Messaging};
use crate::relay::dispatcher::Dispatcher;
use anyhow::Result;
use futures::StreamExt;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Drive an adapter's inbound stream through the dispatcher until the stream
/// ends or Ctrl-C is received. Each event runs on its own task.
pub async fn run(adapter: Arc<dyn Messaging>, dispatcher: Arc<Dispatcher>) -> Result<()> {
    let mut inbound = adapter.start().await?;
    let mut in_flight = JoinSet::new();

    tracing::info!("[Relay] {} adapter started", adapter.name());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            event = inbound.next() => {
                let Some(event) = event else {
                    tracing::info!("[Relay] Inbound stream closed");
                    break;
                };
                in_flight.spawn(handle_event(adapter.clone(), dispatcher.clone(), event));
            }
            _ = &mut ctrl_c => {
                tracing::info!("[Relay] Interrupt received, shutting down");
                break;
            }
        }

        while let Some(finished) = in_flight.try_join_next() {
            if let Err(e) = finished {
                tracing::error!("[Relay] Event handler task failed: {}", e);
            }
        }
    }

    while let Some(finished) = in_flight.join_next().await {
        if let Err(e) = finished {
            tracing::error!("[Relay] Event handler task failed: {}", e);
        }
    }

    adapter.shutdown().await?;
    tracing::info!("[Relay] {} adapter stopped", adapter.name());
    Ok(())
}

/// Handle one event end to end. Errors are logged, never returned.
pub async fn handle_event(adapter: Arc<dyn Messaging>, dispatcher: Arc<Dispatcher>, event: InboundEvent) {
    if event.kind.needs_completion() {
        if let Err(e) = adapter.send_typing(&event).await {
            tracing::debug!("[Relay] Typing indicator failed: {}", e);
        }
    }

    let reply = dispatcher.handle(&event).await;

    if let Err(e) = adapter.respond(&event, &reply).await {
        tracing::error!(
            "[Relay] Failed to deliver reply to {} via {}: {:#}",
            event.user_id,
            adapter.name(),
            e
        );
    }
}
