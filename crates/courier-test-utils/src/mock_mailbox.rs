// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! An in-memory IMAP mailbox with scripted faults.
//!
//! `FakeMailbox` is the connector; every `connect` hands out a session that
//! shares the same mailbox state. Faults are counters that are consumed as
//! they fire, so a test can say "the next two connects fail" or "drop the
//! connection on the next IDLE".

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use courier_core::{CourierError, IdleOutcome, MailEndpoint, MailboxConnector, MailboxSession};

#[derive(Debug, Default)]
struct StoredMessage {
    bytes: Vec<u8>,
    seen: bool,
}

#[derive(Debug, Default)]
struct MailboxState {
    messages: BTreeMap<u32, StoredMessage>,
    next_uid: u32,
    appended: Vec<(String, String, Vec<u8>)>,
    connects: usize,
    logouts: usize,
    failing_connects: usize,
    failing_idles: usize,
    failing_fetches: usize,
    failing_appends: usize,
    refused_uids: BTreeSet<u32>,
}

/// Shared handle to a scripted mailbox.
#[derive(Clone, Default)]
pub struct FakeMailbox {
    state: Arc<Mutex<MailboxState>>,
    arrivals: Arc<Notify>,
}

impl FakeMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MailboxState) -> R) -> R {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    /// Drop a new unseen message into the inbox and wake any IDLE session.
    pub fn deliver(&self, bytes: Vec<u8>) -> u32 {
        let uid = self.with_state(|s| {
            s.next_uid += 1;
            let uid = s.next_uid;
            s.messages.insert(uid, StoredMessage { bytes, seen: false });
            uid
        });
        self.arrivals.notify_one();
        uid
    }

    pub fn fail_next_connects(&self, n: usize) {
        self.with_state(|s| s.failing_connects = n);
    }

    /// The next `n` IDLE waits end with a dropped connection.
    pub fn drop_next_idles(&self, n: usize) {
        self.with_state(|s| s.failing_idles = n);
    }

    pub fn fail_next_fetches(&self, n: usize) {
        self.with_state(|s| s.failing_fetches = n);
    }

    /// Every FETCH of `uid` gets a `NO` reply, on every connection.
    pub fn refuse_fetches_of(&self, uid: u32) {
        self.with_state(|s| s.refused_uids.insert(uid));
    }

    pub fn fail_next_appends(&self, n: usize) {
        self.with_state(|s| s.failing_appends = n);
    }

    pub fn is_seen(&self, uid: u32) -> bool {
        self.with_state(|s| s.messages.get(&uid).is_some_and(|m| m.seen))
    }

    pub fn unseen_count(&self) -> usize {
        self.with_state(|s| s.messages.values().filter(|m| !m.seen).count())
    }

    pub fn connects(&self) -> usize {
        self.with_state(|s| s.connects)
    }

    pub fn logouts(&self) -> usize {
        self.with_state(|s| s.logouts)
    }

    /// `(folder, flags, bytes)` for every APPEND.
    pub fn appended(&self) -> Vec<(String, String, Vec<u8>)> {
        self.with_state(|s| s.appended.clone())
    }
}

#[async_trait]
impl MailboxConnector for FakeMailbox {
    async fn connect(
        &self,
        _endpoint: &MailEndpoint,
        _mailbox: &str,
    ) -> Result<Box<dyn MailboxSession>, CourierError> {
        let refused = self.with_state(|s| {
            s.connects += 1;
            if s.failing_connects > 0 {
                s.failing_connects -= 1;
                true
            } else {
                false
            }
        });
        if refused {
            return Err(CourierError::channel("connection refused"));
        }
        Ok(Box::new(FakeSession {
            mailbox: self.clone(),
        }))
    }
}

struct FakeSession {
    mailbox: FakeMailbox,
}

fn take(counter: &mut usize) -> bool {
    if *counter > 0 {
        *counter -= 1;
        true
    } else {
        false
    }
}

#[async_trait]
impl MailboxSession for FakeSession {
    async fn idle_wait(
        &mut self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<IdleOutcome, CourierError> {
        if self.mailbox.with_state(|s| take(&mut s.failing_idles)) {
            return Err(CourierError::channel("connection reset by peer"));
        }
        let arrivals = Arc::clone(&self.mailbox.arrivals);
        tokio::select! {
            _ = cancel.cancelled() => Ok(IdleOutcome::Cancelled),
            _ = arrivals.notified() => Ok(IdleOutcome::NewData),
            _ = tokio::time::sleep(timeout) => Ok(IdleOutcome::Timeout),
        }
    }

    async fn search_unseen(&mut self) -> Result<Vec<u32>, CourierError> {
        Ok(self.mailbox.with_state(|s| {
            s.messages
                .iter()
                .filter(|(_, m)| !m.seen)
                .map(|(uid, _)| *uid)
                .collect()
        }))
    }

    async fn fetch_raw(&mut self, uid: u32) -> Result<Option<Vec<u8>>, CourierError> {
        self.mailbox.with_state(|s| {
            if take(&mut s.failing_fetches) {
                return Err(CourierError::channel("connection reset during FETCH"));
            }
            if s.refused_uids.contains(&uid) {
                return Err(CourierError::Rejected {
                    message: format!("IMAP UID FETCH: NO message {uid} cannot be read"),
                });
            }
            Ok(s.messages.get(&uid).map(|m| m.bytes.clone()))
        })
    }

    async fn mark_seen(&mut self, uid: u32) -> Result<(), CourierError> {
        self.mailbox.with_state(|s| {
            if let Some(message) = s.messages.get_mut(&uid) {
                message.seen = true;
            }
        });
        Ok(())
    }

    async fn append(
        &mut self,
        folder: &str,
        flags: &str,
        message: &[u8],
    ) -> Result<(), CourierError> {
        self.mailbox.with_state(|s| {
            if take(&mut s.failing_appends) {
                return Err(CourierError::channel(format!("APPEND to {folder} failed")));
            }
            s.appended
                .push((folder.to_string(), flags.to_string(), message.to_vec()));
            Ok(())
        })
    }

    async fn logout(&mut self) -> Result<(), CourierError> {
        self.mailbox.with_state(|s| s.logouts += 1);
        Ok(())
    }
}
