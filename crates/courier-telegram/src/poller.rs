// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Long polling for one Telegram channel.

use std::sync::Arc;

use courier_core::{ChatSink, CourierError};
use teloxide::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::convert::telegram_to_inbound;
use crate::transport::TelegramTransport;

/// Receives updates for a bot and hands every message to a [`ChatSink`].
pub struct TelegramPoller {
    transport: TelegramTransport,
    sink: Arc<dyn ChatSink>,
}

impl TelegramPoller {
    pub fn new(transport: TelegramTransport, sink: Arc<dyn ChatSink>) -> Self {
        Self { transport, sink }
    }

    /// Poll until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let channel_id = self.transport.channel_id().to_string();
        let sink = self.sink;
        info!(channel = %channel_id, "starting Telegram long polling");

        let handler_channel = channel_id.clone();
        let handler = Update::filter_message().endpoint(move |msg: Message| {
            let sink = Arc::clone(&sink);
            let channel_id = handler_channel.clone();
            async move {
                let inbound = telegram_to_inbound(&channel_id, &msg);
                match sink.accept_chat(inbound).await {
                    Ok(stored) => {
                        debug!(channel = %channel_id, message_id = %stored.id, "telegram message stored");
                    }
                    Err(CourierError::Blocked { account, .. }) => {
                        debug!(channel = %channel_id, sender = %account, "ignoring message from blocked account");
                    }
                    Err(e) => {
                        error!(channel = %channel_id, msg_id = msg.id.0, error = %e, "failed to store telegram message");
                    }
                }
                respond(())
            }
        });

        let mut dispatcher = Dispatcher::builder(self.transport.bot().clone(), handler)
            .default_handler(|_| async {})
            .build();
        let shutdown = dispatcher.shutdown_token();
        let stopper = tokio::spawn(async move {
            cancel.cancelled().await;
            // Fails only when the dispatcher is not running, which means it already stopped.
            if let Ok(stopped) = shutdown.shutdown() {
                stopped.await;
            }
        });

        dispatcher.dispatch().await;
        stopper.abort();
        info!(channel = %channel_id, "telegram polling stopped");
    }
}
