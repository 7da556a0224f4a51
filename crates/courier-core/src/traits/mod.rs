// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Seams between Courier crates.
//!
//! All traits use `#[async_trait]` so they can be held as trait objects.

pub mod mailbox;
pub mod store;
pub mod transport;

pub use mailbox::{IdleOutcome, MailboxConnector, MailboxSession};
pub use store::{CrmStore, MessageStore, RequestStore, Store};
pub use transport::{ChatSink, ChatTransport, MailTransport, MediaFetcher, RawEmailSink};
