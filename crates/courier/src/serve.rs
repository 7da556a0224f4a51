// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `courier serve` command implementation.
//!
//! Opens storage, starts an IMAP listener for every active email channel and
//! a long-poll loop for every active Telegram channel, then runs until a
//! shutdown signal arrives. Every stored incoming message opens a request,
//! which is identified and categorized straight away.

use std::sync::Arc;

use courier_config::{ChannelConfig, CourierConfig};
use courier_core::{CourierError, MailboxConnector, Platform, RawEmailSink, Store};
use courier_email::{AsyncImapConnector, EmailIngestor, ListenerSupervisor, SinkFactory};
use courier_engine::{ChatIngest, HandlerRegistry, RequestEngine, RequestOpeningSink};
use courier_storage::SqliteStore;
use courier_telegram::{TelegramPoller, TelegramTransport};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::shutdown;

/// Sink factory wiring each email channel's listener to the ingestor.
pub fn email_sink_factory(
    store: Arc<dyn Store>,
    engine: Arc<RequestEngine>,
    link_prefix: String,
) -> SinkFactory {
    Arc::new(
        move |channel: &ChannelConfig| -> Result<Arc<dyn RawEmailSink>, CourierError> {
            let ingestor = EmailIngestor::new(store.clone(), channel, link_prefix.clone())?;
            let sink = RequestOpeningSink::new(ingestor, store.clone()).with_engine(engine.clone());
            Ok(Arc::new(sink))
        },
    )
}

/// Running listeners and pollers.
pub struct Service {
    supervisor: ListenerSupervisor,
    engine: Arc<RequestEngine>,
    pollers: Vec<(String, JoinHandle<()>)>,
    cancel: CancellationToken,
}

impl Service {
    /// Start every active email and Telegram channel in `config`.
    ///
    /// A channel that fails to start is logged and skipped. New requests
    /// are matched against the categories using `handlers`.
    pub async fn start(
        config: &CourierConfig,
        store: Arc<dyn Store>,
        connector: Arc<dyn MailboxConnector>,
        handlers: Arc<HandlerRegistry>,
    ) -> Result<Self, CourierError> {
        let engine = Arc::new(RequestEngine::new(store.clone(), handlers));
        let sinks = email_sink_factory(
            store.clone(),
            engine.clone(),
            config.inline_images.link_prefix.clone(),
        );
        let supervisor = ListenerSupervisor::new(connector, sinks, &config.listener);
        let cancel = CancellationToken::new();
        let mut service = Self {
            supervisor,
            engine,
            pollers: Vec::new(),
            cancel,
        };

        for channel in config.channels.iter().filter(|c| c.active) {
            let started = match channel.platform {
                Platform::Email => service.supervisor.start(channel).await.map(|_| ()),
                Platform::Telegram => service.spawn_poller(channel, store.clone()),
                _ => {
                    info!(channel = %channel.id, platform = %channel.platform, "channel receives through its own endpoint");
                    Ok(())
                }
            };
            if let Err(e) = started {
                error!(channel = %channel.id, error = %e, "channel failed to start");
            }
        }

        info!(
            email = service.supervisor.running().await.len(),
            telegram = service.pollers.len(),
            "courier service started"
        );
        Ok(service)
    }

    fn spawn_poller(
        &mut self,
        channel: &ChannelConfig,
        store: Arc<dyn Store>,
    ) -> Result<(), CourierError> {
        let transport = TelegramTransport::new(channel)?;
        let ingest = ChatIngest::new(store.clone())
            .with_fetcher(channel.id.clone(), Arc::new(transport.clone()));
        let sink = Arc::new(RequestOpeningSink::new(ingest, store).with_engine(self.engine.clone()));
        let poller = TelegramPoller::new(transport, sink);
        let handle = tokio::spawn(poller.run(self.cancel.child_token()));
        self.pollers.push((channel.id.clone(), handle));
        Ok(())
    }

    /// Ids of email channels with a live listener, sorted.
    pub async fn email_channels(&self) -> Vec<String> {
        self.supervisor.running().await
    }

    /// Stop every listener (each logs out) and poller.
    pub async fn shutdown(self) {
        self.supervisor.stop_all().await;
        self.cancel.cancel();
        for (channel, handle) in self.pollers {
            if let Err(e) = handle.await {
                error!(channel = %channel, error = %e, "telegram poller ended abnormally");
            }
        }
        info!("courier service stopped");
    }
}

/// Runs `courier serve` until SIGINT or SIGTERM.
pub async fn run_serve(config: CourierConfig) -> Result<(), CourierError> {
    info!("starting courier serve");
    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&config.storage).await?);
    let service = Service::start(
        &config,
        store,
        Arc::new(AsyncImapConnector::new()),
        Arc::new(HandlerRegistry::new()),
    )
    .await?;

    shutdown::install_signal_handler().cancelled().await;
    service.shutdown().await;
    Ok(())
}
