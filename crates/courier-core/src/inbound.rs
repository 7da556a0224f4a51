// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Platform-neutral shapes produced by the chat adapters (Telegram, WhatsApp,
//! web chat) before anything is persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{DeliveryEvent, MediaType, Platform};

/// Who sent an inbound chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundSender {
    pub id: String,
    pub name: Option<String>,
    pub is_bot: bool,
    pub raw: serde_json::Value,
}

/// A provider-hosted file that still has to be downloaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    /// Provider file handle (Telegram `file_id`, WhatsApp media id).
    pub file_id: String,
    pub content_type: Option<String>,
    pub filename: Option<String>,
}

/// One received chat message, already mapped to canonical ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundChatMessage {
    pub platform: Platform,
    pub channel_id: String,
    pub id: String,
    pub chat_id: String,
    pub chat_name: Option<String>,
    pub is_private: bool,
    pub sender: InboundSender,
    pub text: String,
    pub media_type: MediaType,
    pub media: Option<MediaRef>,
    /// Canonical id of the message this one answers, if the provider says so.
    pub reply_to: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub raw: serde_json::Value,
}

/// A delivery milestone reported by a provider callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryUpdate {
    pub platform: Platform,
    pub message_id: String,
    pub event: DeliveryEvent,
    pub at: DateTime<Utc>,
}
