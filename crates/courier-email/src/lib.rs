// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Email channel for Courier.
//!
//! - [`parser`] and [`ingest`]: raw RFC 5322 bytes to threaded canonical messages.
//! - [`listener`] and [`supervisor`]: per-channel IMAP IDLE loops.
//! - [`imap`] and [`smtp`]: production transports (`async-imap`, `lettre`).
//! - [`outbound`]: building, sending and mirroring replies.

pub mod html;
pub mod imap;
pub mod ingest;
pub mod listener;
pub mod outbound;
pub mod parser;
pub mod smtp;
pub mod supervisor;

pub use imap::AsyncImapConnector;
pub use ingest::EmailIngestor;
pub use listener::{ImapListener, ListenerSettings, ListenerState};
pub use outbound::{EmailSender, HtmlRewriter, reply_subject};
pub use parser::{ParsedEmail, parse_email};
pub use smtp::LettreTransport;
pub use supervisor::{ListenerSupervisor, SinkFactory};
