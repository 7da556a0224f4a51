// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Owns one [`ImapListener`] task per running email channel.

use std::collections::HashMap;
use std::sync::Arc;

use courier_config::{ChannelConfig, ListenerConfig};
use courier_core::{CourierError, MailboxConnector, Platform, RawEmailSink};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::listener::{ImapListener, ListenerSettings, ListenerState};

/// Builds the sink a channel's listener hands fetched mail to.
pub type SinkFactory =
    Arc<dyn Fn(&ChannelConfig) -> Result<Arc<dyn RawEmailSink>, CourierError> + Send + Sync>;

struct RunningListener {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
    state: watch::Receiver<ListenerState>,
}

/// Starts and stops listeners by channel id. All operations are idempotent.
pub struct ListenerSupervisor {
    connector: Arc<dyn MailboxConnector>,
    sinks: SinkFactory,
    settings: ListenerSettings,
    running: Mutex<HashMap<String, RunningListener>>,
}

impl ListenerSupervisor {
    pub fn new(
        connector: Arc<dyn MailboxConnector>,
        sinks: SinkFactory,
        config: &ListenerConfig,
    ) -> Self {
        Self {
            connector,
            sinks,
            settings: ListenerSettings::from(config),
            running: Mutex::new(HashMap::new()),
        }
    }

    /// Start a listener for `channel`. Returns `false` if one is already running.
    pub async fn start(&self, channel: &ChannelConfig) -> Result<bool, CourierError> {
        if channel.platform != Platform::Email {
            return Err(CourierError::Validation(format!(
                "channel `{}` is a {} channel, not email",
                channel.id, channel.platform
            )));
        }
        if !channel.active {
            return Err(CourierError::Validation(format!(
                "channel `{}` is inactive",
                channel.id
            )));
        }

        let mut running = self.running.lock().await;
        if let Some(existing) = running.get(&channel.id) {
            if !existing.handle.is_finished() {
                return Ok(false);
            }
            running.remove(&channel.id);
        }

        let endpoint = channel.email_settings()?.imap_endpoint();
        let sink = (self.sinks)(channel)?;
        let listener = ImapListener::new(
            channel.id.clone(),
            endpoint,
            self.settings.clone(),
            Arc::clone(&self.connector),
            sink,
        );
        let state = listener.subscribe();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(listener.run(cancel.clone()));
        running.insert(
            channel.id.clone(),
            RunningListener {
                handle,
                cancel,
                state,
            },
        );
        info!(channel = %channel.id, "listener started");
        Ok(true)
    }

    /// Stop the listener for `channel_id` and wait for it to log out.
    /// Returns `false` if none was running.
    pub async fn stop(&self, channel_id: &str) -> bool {
        let entry = self.running.lock().await.remove(channel_id);
        let Some(listener) = entry else {
            return false;
        };
        listener.cancel.cancel();
        if let Err(e) = listener.handle.await {
            warn!(channel = channel_id, error = %e, "listener task ended abnormally");
        }
        info!(channel = channel_id, "listener stopped");
        true
    }

    /// Stop then start, e.g. after the channel's settings changed.
    pub async fn restart(&self, channel: &ChannelConfig) -> Result<bool, CourierError> {
        self.stop(&channel.id).await;
        self.start(channel).await
    }

    pub async fn stop_all(&self) {
        let ids: Vec<String> = self.running.lock().await.keys().cloned().collect();
        for id in ids {
            self.stop(&id).await;
        }
    }

    /// Ids of channels with a live listener task, sorted.
    pub async fn running(&self) -> Vec<String> {
        let running = self.running.lock().await;
        let mut ids: Vec<String> = running
            .iter()
            .filter(|(_, l)| !l.handle.is_finished())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Current state of a channel's listener, if one was started.
    pub async fn state(&self, channel_id: &str) -> Option<ListenerState> {
        self.running
            .lock()
            .await
            .get(channel_id)
            .map(|l| *l.state.borrow())
    }

    /// Watch a channel's listener state.
    pub async fn subscribe(&self, channel_id: &str) -> Option<watch::Receiver<ListenerState>> {
        self.running
            .lock()
            .await
            .get(channel_id)
            .map(|l| l.state.clone())
    }
}
