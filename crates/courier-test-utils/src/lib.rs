// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Courier integration tests.
//!
//! # Components
//!
//! - [`TestHarness`] - temp SQLite store plus a config with test channels
//! - [`MockChatTransport`] / [`MockMailTransport`] - capture outbound traffic
//! - [`FakeMailbox`] - scripted IMAP mailbox with fault injection
//! - [`FaultyStore`] - SQLite store with switchable read failures
//! - [`RawEmail`] - builder for RFC 5322 fixtures

pub mod faulty_store;
pub mod fixtures;
pub mod harness;
pub mod mock_mailbox;
pub mod mock_transport;

pub use fixtures::{RawEmail, email_channel, telegram_channel, webchat_channel, whatsapp_channel};
pub use faulty_store::FaultyStore;
pub use harness::TestHarness;
pub use mock_mailbox::FakeMailbox;
pub use mock_transport::{MockChatTransport, MockMailTransport, SentMail};
