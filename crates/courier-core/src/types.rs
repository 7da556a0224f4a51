// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Canonical messaging entities shared by every platform.
//!
//! Accounts, chats and messages are keyed by `(platform, native id)`. The
//! native id is whatever the platform uses: an email address or Message-ID
//! header for email, a numeric id for Telegram, a phone number for WhatsApp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Free-form JSON object attached to requests and handler results.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Messaging platform a channel, account, chat or message belongs to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Email,
    Telegram,
    WhatsApp,
    WebChat,
}

/// Who produced a message relative to the channel owner.
///
/// `Internal` covers system-generated entries (service notices, bot
/// bookkeeping) that are neither sent nor received.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outgoing,
    Incoming,
    Internal,
}

/// Kind of content carried by a message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    #[default]
    Text,
    Html,
    Image,
    Audio,
    File,
    Callback,
}

impl MediaType {
    /// Derive the media type of an attachment from its MIME type.
    pub fn from_mime(content_type: &str) -> Self {
        let lower = content_type.to_ascii_lowercase();
        if lower.starts_with("image/") {
            MediaType::Image
        } else if lower.starts_with("audio/") {
            MediaType::Audio
        } else {
            MediaType::File
        }
    }

    /// Placeholder text used when a media message carries no text of its own.
    pub fn placeholder(self) -> String {
        let label = match self {
            MediaType::Text => "Text",
            MediaType::Html => "Html",
            MediaType::Image => "Image",
            MediaType::Audio => "Audio",
            MediaType::File => "File",
            MediaType::Callback => "Callback",
        };
        format!("**{label}**")
    }
}

/// A platform-scoped sender or recipient identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub platform: Platform,
    pub id: String,
    pub name: Option<String>,
    pub is_bot: bool,
    /// Provider payload the account was first seen with.
    pub raw: serde_json::Value,
    /// CRM member this account has been linked to.
    pub member_id: Option<String>,
    /// Messages from a blocked account are dropped at ingestion.
    #[serde(default)]
    pub blocked: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(platform: Platform, id: impl Into<String>) -> Self {
        Self {
            platform,
            id: id.into(),
            name: None,
            is_bot: false,
            raw: serde_json::Value::Null,
            member_id: None,
            blocked: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Denormalized pointers to notable messages of a chat.
///
/// Always derivable from the chat's messages; see [`ChatCache::from_messages`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatCache {
    pub first_message_id: Option<String>,
    pub last_message_id: Option<String>,
    pub first_incoming_message_id: Option<String>,
    pub last_incoming_message_id: Option<String>,
    pub first_outgoing_message_id: Option<String>,
    pub last_outgoing_message_id: Option<String>,
}

impl ChatCache {
    /// Recompute the cache from a chat's messages.
    ///
    /// Messages are ordered by timestamp with the id as tie breaker, so the
    /// result does not depend on insertion order.
    pub fn from_messages<'a, I>(messages: I) -> Self
    where
        I: IntoIterator<Item = &'a Message>,
    {
        let mut sorted: Vec<&Message> = messages.into_iter().collect();
        sorted.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));

        let first_of = |dir: Direction| {
            sorted
                .iter()
                .find(|m| m.direction == dir)
                .map(|m| m.id.clone())
        };
        let last_of = |dir: Direction| {
            sorted
                .iter()
                .rev()
                .find(|m| m.direction == dir)
                .map(|m| m.id.clone())
        };

        Self {
            first_message_id: sorted.first().map(|m| m.id.clone()),
            last_message_id: sorted.last().map(|m| m.id.clone()),
            first_incoming_message_id: first_of(Direction::Incoming),
            last_incoming_message_id: last_of(Direction::Incoming),
            first_outgoing_message_id: first_of(Direction::Outgoing),
            last_outgoing_message_id: last_of(Direction::Outgoing),
        }
    }
}

/// A conversation container. For email the id is the root Message-ID of the thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub platform: Platform,
    pub id: String,
    pub channel_id: String,
    pub name: Option<String>,
    pub is_private: bool,
    pub is_archived: bool,
    pub cache: ChatCache,
    pub created_at: DateTime<Utc>,
}

impl Chat {
    pub fn new(platform: Platform, id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            platform,
            id: id.into(),
            channel_id: channel_id.into(),
            name: None,
            is_private: true,
            is_archived: false,
            cache: ChatCache::default(),
            created_at: Utc::now(),
        }
    }

    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }
}

/// Binary payload stored alongside a message (first attachment, voice note, photo).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaBlob {
    pub filename: String,
    pub content_type: String,
    #[serde(skip)]
    pub data: Vec<u8>,
}

/// Sent/delivered/seen flags reported by the platform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryState {
    pub sent: bool,
    pub delivered: bool,
    pub seen: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub seen_at: Option<DateTime<Utc>>,
}

/// Delivery milestone reported by a provider callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryEvent {
    Sent,
    Delivered,
    Seen,
}

impl DeliveryState {
    /// Apply a delivery milestone. Later milestones imply earlier ones; a
    /// milestone already recorded keeps its original timestamp.
    pub fn apply(&mut self, event: DeliveryEvent, at: DateTime<Utc>) {
        if !self.sent {
            self.sent = true;
            self.sent_at = Some(at);
        }
        if matches!(event, DeliveryEvent::Delivered | DeliveryEvent::Seen) && !self.delivered {
            self.delivered = true;
            self.delivered_at = Some(at);
        }
        if event == DeliveryEvent::Seen && !self.seen {
            self.seen = true;
            self.seen_at = Some(at);
        }
    }
}

/// Recipient interaction reported for a tracked email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TrackingEvent {
    Opened,
    LinkClicked,
}

/// Open/click tracking fields for outgoing email.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tracking {
    pub tracking_id: Option<String>,
    pub opened: bool,
    pub link_clicked: bool,
    #[serde(default)]
    pub opened_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub link_clicked_at: Option<DateTime<Utc>>,
}

impl Tracking {
    /// Record an interaction. A click implies an open; first timestamps are kept.
    pub fn apply(&mut self, event: TrackingEvent, at: DateTime<Utc>) {
        if !self.opened {
            self.opened = true;
            self.opened_at = Some(at);
        }
        if event == TrackingEvent::LinkClicked && !self.link_clicked {
            self.link_clicked = true;
            self.link_clicked_at = Some(at);
        }
    }
}

/// The canonical unit of communication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub platform: Platform,
    pub id: String,
    pub channel_id: String,
    pub sender_id: String,
    pub chat_id: String,
    pub direction: Direction,
    pub text: String,
    pub html: Option<String>,
    pub subject: Option<String>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub media: Option<MediaBlob>,
    pub media_type: MediaType,
    pub reply_to_message_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub delivery: DeliveryState,
    /// Provider payload. For email this is the header map.
    pub raw: serde_json::Value,
    pub imap_uid: Option<u32>,
    /// Actor that dispatched an outgoing message, if any.
    pub sent_by: Option<String>,
    pub tracking: Tracking,
}

impl Message {
    /// A text message with empty optional fields; callers fill in the rest.
    pub fn new(
        platform: Platform,
        id: impl Into<String>,
        channel_id: impl Into<String>,
        sender_id: impl Into<String>,
        chat_id: impl Into<String>,
        direction: Direction,
    ) -> Self {
        Self {
            platform,
            id: id.into(),
            channel_id: channel_id.into(),
            sender_id: sender_id.into(),
            chat_id: chat_id.into(),
            direction,
            text: String::new(),
            html: None,
            subject: None,
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            media: None,
            media_type: MediaType::Text,
            reply_to_message_id: None,
            timestamp: Utc::now(),
            delivery: DeliveryState::default(),
            raw: serde_json::Value::Null,
            imap_uid: None,
            sent_by: None,
            tracking: Tracking::default(),
        }
    }

    pub fn is_incoming(&self) -> bool {
        self.direction == Direction::Incoming
    }

    /// Read a header from the stored email header map (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.raw
            .as_object()?
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.as_str())
    }
}

/// An image lifted out of stored HTML and served by short link instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineImage {
    pub short_id: String,
    pub message_id: Option<String>,
    pub content_id: Option<String>,
    pub content_type: String,
    #[serde(skip)]
    pub data: Vec<u8>,
    /// Hex SHA-256 of `data`.
    pub sha256: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    fn msg(id: &str, dir: Direction, secs: i64) -> Message {
        let mut m = Message::new(Platform::Email, id, "ch", "a@x", "chat", dir);
        m.timestamp = Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap();
        m
    }

    #[test]
    fn platform_string_forms() {
        assert_eq!(Platform::WhatsApp.to_string(), "whatsapp");
        assert_eq!(Platform::from_str("webchat").unwrap(), Platform::WebChat);
        let json = serde_json::to_string(&Platform::Telegram).unwrap();
        assert_eq!(json, "\"telegram\"");
    }

    #[test]
    fn media_type_from_mime() {
        assert_eq!(MediaType::from_mime("image/png"), MediaType::Image);
        assert_eq!(MediaType::from_mime("AUDIO/ogg"), MediaType::Audio);
        assert_eq!(MediaType::from_mime("application/pdf"), MediaType::File);
        assert_eq!(MediaType::Image.placeholder(), "**Image**");
    }

    #[test]
    fn chat_cache_ignores_insertion_order() {
        let messages = vec![
            msg("c", Direction::Incoming, 30),
            msg("a", Direction::Outgoing, 10),
            msg("b", Direction::Incoming, 20),
            msg("d", Direction::Outgoing, 40),
        ];
        let cache = ChatCache::from_messages(&messages);
        assert_eq!(cache.first_message_id.as_deref(), Some("a"));
        assert_eq!(cache.last_message_id.as_deref(), Some("d"));
        assert_eq!(cache.first_incoming_message_id.as_deref(), Some("b"));
        assert_eq!(cache.last_incoming_message_id.as_deref(), Some("c"));
        assert_eq!(cache.first_outgoing_message_id.as_deref(), Some("a"));
        assert_eq!(cache.last_outgoing_message_id.as_deref(), Some("d"));
    }

    #[test]
    fn chat_cache_of_empty_chat_is_empty() {
        let cache = ChatCache::from_messages(&[]);
        assert_eq!(cache, ChatCache::default());
    }

    #[test]
    fn delivery_state_keeps_first_timestamps() {
        let t1 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let t2 = Utc.timestamp_opt(1_700_000_100, 0).unwrap();
        let mut state = DeliveryState::default();
        state.apply(DeliveryEvent::Delivered, t1);
        assert!(state.sent && state.delivered && !state.seen);
        state.apply(DeliveryEvent::Seen, t2);
        assert_eq!(state.delivered_at, Some(t1));
        assert_eq!(state.seen_at, Some(t2));
    }

    #[test]
    fn click_implies_open_and_keeps_first_times() {
        let t1 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let t2 = Utc.timestamp_opt(1_700_000_100, 0).unwrap();
        let mut tracking = Tracking::default();
        tracking.apply(TrackingEvent::LinkClicked, t1);
        assert!(tracking.opened && tracking.link_clicked);
        assert_eq!(tracking.opened_at, Some(t1));

        tracking.apply(TrackingEvent::Opened, t2);
        tracking.apply(TrackingEvent::LinkClicked, t2);
        assert_eq!(tracking.opened_at, Some(t1));
        assert_eq!(tracking.link_clicked_at, Some(t1));
        assert_eq!(TrackingEvent::from_str("link_clicked").unwrap(), TrackingEvent::LinkClicked);
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let mut m = msg("a", Direction::Incoming, 0);
        m.raw = serde_json::json!({"References": "<x@y> <z@y>"});
        assert_eq!(m.header("references"), Some("<x@y> <z@y>"));
        assert_eq!(m.header("In-Reply-To"), None);
    }
}
