// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Long-lived IMAP listener for one email channel.
//!
//! The listener cycles `Connecting -> Idle -> Processing -> Idle ...` and
//! falls back to `Connecting` on any connection-level error. A message is
//! marked `\Seen` on the server only after it has been stored, so a crash
//! between fetch and save leaves it unseen and it is picked up again on the
//! next sweep. Re-ingestion is harmless because ingestion deduplicates by
//! Message-ID.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use courier_config::ListenerConfig;
use courier_core::{
    CourierError, IdleOutcome, MailEndpoint, MailboxConnector, MailboxSession, RawEmailSink,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Observable state of a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// Not connected, waiting out the reconnect backoff.
    Disconnected,
    /// Connecting, authenticating and selecting the inbox.
    Connecting,
    /// In IDLE, waiting for the server.
    Idle,
    /// Fetching and storing unseen messages.
    Processing,
    /// The loop has exited.
    Stopped,
}

impl std::fmt::Display for ListenerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerState::Disconnected => write!(f, "disconnected"),
            ListenerState::Connecting => write!(f, "connecting"),
            ListenerState::Idle => write!(f, "idle"),
            ListenerState::Processing => write!(f, "processing"),
            ListenerState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Timing and mailbox settings for a listener.
#[derive(Debug, Clone)]
pub struct ListenerSettings {
    pub idle_timeout: Duration,
    pub reconnect_backoff: Duration,
    pub inbox: String,
}

impl From<&ListenerConfig> for ListenerSettings {
    fn from(config: &ListenerConfig) -> Self {
        Self {
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
            reconnect_backoff: Duration::from_secs(config.reconnect_backoff_secs),
            inbox: config.inbox.clone(),
        }
    }
}

/// Why the inner session loop ended with an error.
struct SessionFailure {
    error: CourierError,
    /// At least one full sweep completed on this connection.
    was_healthy: bool,
}

/// Failure counts per UID, kept across reconnects.
///
/// A sweep handles UIDs that never failed first, so one message the server
/// keeps refusing cannot hold back the rest of the inbox.
#[derive(Debug, Default)]
struct Retries(HashMap<u32, u32>);

impl Retries {
    fn order(&self, uids: &mut [u32]) {
        uids.sort_by_key(|uid| (self.0.get(uid).copied().unwrap_or(0), *uid));
    }

    fn failed(&mut self, uid: u32) -> u32 {
        let count = self.0.entry(uid).or_insert(0);
        *count += 1;
        *count
    }

    fn succeeded(&mut self, uid: u32) {
        self.0.remove(&uid);
    }
}

/// IMAP IDLE loop for one channel.
pub struct ImapListener {
    channel_id: String,
    endpoint: MailEndpoint,
    settings: ListenerSettings,
    connector: Arc<dyn MailboxConnector>,
    sink: Arc<dyn RawEmailSink>,
    state: watch::Sender<ListenerState>,
}

impl ImapListener {
    pub fn new(
        channel_id: impl Into<String>,
        endpoint: MailEndpoint,
        settings: ListenerSettings,
        connector: Arc<dyn MailboxConnector>,
        sink: Arc<dyn RawEmailSink>,
    ) -> Self {
        let (state, _) = watch::channel(ListenerState::Disconnected);
        Self {
            channel_id: channel_id.into(),
            endpoint,
            settings,
            connector,
            sink,
            state,
        }
    }

    /// Receiver for state changes. Stays readable after the listener exits.
    pub fn subscribe(&self) -> watch::Receiver<ListenerState> {
        self.state.subscribe()
    }

    fn set_state(&self, next: ListenerState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(channel = %self.channel_id, from = %previous, to = %next, "listener state changed");
        }
    }

    /// Run until `cancel` fires.
    ///
    /// Cancellation takes effect between messages and between IDLE cycles;
    /// a message being stored is always finished first.
    pub async fn run(self, cancel: CancellationToken) {
        info!(channel = %self.channel_id, host = %self.endpoint.host, "imap listener starting");
        let mut retries = Retries::default();

        while !cancel.is_cancelled() {
            self.set_state(ListenerState::Connecting);
            let connected = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.connector.connect(&self.endpoint, &self.settings.inbox) => result,
            };

            let reconnect_now = match connected {
                Ok(mut session) => {
                    debug!(channel = %self.channel_id, "imap session opened");
                    let outcome = self.serve(session.as_mut(), &mut retries, &cancel).await;
                    if let Err(e) = session.logout().await {
                        debug!(channel = %self.channel_id, error = %e, "logout failed");
                    }
                    match outcome {
                        Ok(()) => break,
                        Err(failure) => {
                            warn!(
                                channel = %self.channel_id,
                                error = %failure.error,
                                "imap connection lost, reconnecting"
                            );
                            failure.was_healthy
                        }
                    }
                }
                Err(e) => {
                    warn!(channel = %self.channel_id, error = %e, "imap connect failed");
                    false
                }
            };

            if !reconnect_now {
                self.set_state(ListenerState::Disconnected);
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.settings.reconnect_backoff) => {}
                }
            }
        }

        self.set_state(ListenerState::Stopped);
        info!(channel = %self.channel_id, "imap listener stopped");
    }

    /// Sweep, then IDLE, until cancelled or the connection fails.
    async fn serve(
        &self,
        session: &mut dyn MailboxSession,
        retries: &mut Retries,
        cancel: &CancellationToken,
    ) -> Result<(), SessionFailure> {
        let mut was_healthy = false;
        loop {
            self.set_state(ListenerState::Processing);
            self.sweep(session, retries, cancel)
                .await
                .map_err(|error| SessionFailure { error, was_healthy })?;
            was_healthy = true;

            if cancel.is_cancelled() {
                return Ok(());
            }

            self.set_state(ListenerState::Idle);
            let outcome = session
                .idle_wait(self.settings.idle_timeout, cancel)
                .await
                .map_err(|error| SessionFailure { error, was_healthy })?;
            match outcome {
                IdleOutcome::Cancelled => return Ok(()),
                IdleOutcome::NewData => debug!(channel = %self.channel_id, "idle woke on new data"),
                IdleOutcome::Timeout => debug!(channel = %self.channel_id, "idle timed out"),
            }
        }
    }

    /// Fetch and store every unseen message, fresh UIDs first.
    ///
    /// A transient error aborts the sweep so the connection is rebuilt. Any
    /// other failure skips that message and leaves it unseen.
    async fn sweep(
        &self,
        session: &mut dyn MailboxSession,
        retries: &mut Retries,
        cancel: &CancellationToken,
    ) -> Result<(), CourierError> {
        let mut uids = session.search_unseen().await?;
        if !uids.is_empty() {
            debug!(channel = %self.channel_id, count = uids.len(), "unseen messages");
        }
        retries.order(&mut uids);

        for uid in uids {
            if cancel.is_cancelled() {
                break;
            }
            match self.deliver(session, uid).await {
                Ok(()) => retries.succeeded(uid),
                Err(e) => {
                    let attempts = retries.failed(uid);
                    if e.is_transient() {
                        return Err(e);
                    }
                    warn!(
                        channel = %self.channel_id,
                        uid,
                        attempts,
                        error = %e,
                        "failed to process message, leaving it unseen"
                    );
                }
            }
        }
        Ok(())
    }

    /// Fetch, store and flag one message.
    async fn deliver(&self, session: &mut dyn MailboxSession, uid: u32) -> Result<(), CourierError> {
        let Some(raw) = session.fetch_raw(uid).await? else {
            debug!(channel = %self.channel_id, uid, "message vanished before fetch");
            return Ok(());
        };
        match self.sink.accept(&raw, Some(uid)).await {
            Ok(message) => {
                session.mark_seen(uid).await?;
                debug!(channel = %self.channel_id, uid, message_id = %message.id, "message stored");
                Ok(())
            }
            // Dropped on purpose; flag it so it is not fetched again.
            Err(CourierError::Blocked { account, .. }) => {
                session.mark_seen(uid).await?;
                debug!(channel = %self.channel_id, uid, sender = %account, "blocked sender, marked seen");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_come_from_config() {
        let config = ListenerConfig {
            idle_timeout_secs: 60,
            reconnect_backoff_secs: 5,
            inbox: "INBOX".into(),
            sent_folder: "Sent".into(),
        };
        let settings = ListenerSettings::from(&config);
        assert_eq!(settings.idle_timeout, Duration::from_secs(60));
        assert_eq!(settings.reconnect_backoff, Duration::from_secs(5));
        assert_eq!(settings.inbox, "INBOX");
    }

    #[test]
    fn failed_uids_are_swept_last() {
        let mut retries = Retries::default();
        assert_eq!(retries.failed(3), 1);
        assert_eq!(retries.failed(3), 2);
        retries.failed(1);

        let mut uids = vec![1, 2, 3, 4];
        retries.order(&mut uids);
        assert_eq!(uids, [2, 4, 1, 3]);

        retries.succeeded(3);
        let mut uids = vec![3, 1, 2];
        retries.order(&mut uids);
        assert_eq!(uids, [2, 3, 1]);
    }

    #[test]
    fn state_display() {
        assert_eq!(ListenerState::Idle.to_string(), "idle");
        assert_eq!(ListenerState::Stopped.to_string(), "stopped");
    }
}
