// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! IMAP session seam used by the listener and by Sent-folder mirroring.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::CourierError;
use crate::intent::MailEndpoint;

/// Why an IDLE wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleOutcome {
    /// The server pushed an untagged response.
    NewData,
    /// The wait hit its timeout without server activity.
    Timeout,
    /// The cancellation token fired.
    Cancelled,
}

/// An authenticated IMAP session with a mailbox selected.
///
/// Errors returned from these methods are connection-level unless they are
/// `CourierError::Parse`/`Validation`; the listener reconnects on
/// [`CourierError::is_transient`] errors.
#[async_trait]
pub trait MailboxSession: Send {
    /// Enter IDLE and wait up to `timeout` or until `cancel` fires.
    ///
    /// Implementations always terminate IDLE (send `DONE`) before returning,
    /// so the session is ready for the next command.
    async fn idle_wait(
        &mut self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<IdleOutcome, CourierError>;

    /// UIDs of unseen messages in ascending order.
    async fn search_unseen(&mut self) -> Result<Vec<u32>, CourierError>;

    /// Full RFC 5322 bytes of a message, fetched without setting `\Seen`.
    /// `None` when the UID no longer exists.
    async fn fetch_raw(&mut self, uid: u32) -> Result<Option<Vec<u8>>, CourierError>;

    async fn mark_seen(&mut self, uid: u32) -> Result<(), CourierError>;

    /// APPEND a message to `folder` with the given flags, e.g. `(\Seen)`.
    async fn append(
        &mut self,
        folder: &str,
        flags: &str,
        message: &[u8],
    ) -> Result<(), CourierError>;

    async fn logout(&mut self) -> Result<(), CourierError>;
}

/// Opens sessions against an IMAP endpoint.
#[async_trait]
pub trait MailboxConnector: Send + Sync + 'static {
    /// Connect, authenticate and select `mailbox`.
    async fn connect(
        &self,
        endpoint: &MailEndpoint,
        mailbox: &str,
    ) -> Result<Box<dyn MailboxSession>, CourierError>;
}
