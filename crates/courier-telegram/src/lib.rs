// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram channel adapter for Courier.
//!
//! Converts Bot API messages into inbound chat messages, sends replies and
//! media through teloxide, and long-polls a bot on behalf of a channel.

pub mod convert;
pub mod poller;
pub mod transport;

pub use convert::{canonical_message_id, native_message_id, telegram_to_inbound};
pub use poller::TelegramPoller;
pub use transport::{TelegramTransport, crop_text};
