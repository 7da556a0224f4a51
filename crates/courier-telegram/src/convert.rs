// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapping of Telegram updates onto [`InboundChatMessage`].
//!
//! Telegram message ids are only unique within a chat, so the canonical id
//! is `"<chat_id>:<message_id>"`.

use courier_core::{InboundChatMessage, InboundSender, MediaRef, MediaType, Platform};
use teloxide::types::{Message, MessageKind};

/// Canonical Courier id of Telegram message `message_id` in `chat_id`.
pub fn canonical_message_id(chat_id: i64, message_id: i32) -> String {
    format!("{chat_id}:{message_id}")
}

/// Telegram's own message id from a canonical id. Bare numeric ids pass through.
pub fn native_message_id(canonical: &str) -> Option<i32> {
    canonical
        .rsplit_once(':')
        .map_or(canonical, |(_, id)| id)
        .parse()
        .ok()
}

/// Convert a received Telegram message.
pub fn telegram_to_inbound(channel_id: &str, msg: &Message) -> InboundChatMessage {
    let chat_id = msg.chat.id.0;
    let sender = sender_of(msg);
    let is_private = msg.chat.is_private();
    let chat_name = if is_private {
        sender.name.clone()
    } else {
        msg.chat.title().map(str::to_string)
    };

    let (media_type, media) = media_of(msg);
    let text = text_of(msg, media_type);

    InboundChatMessage {
        platform: Platform::Telegram,
        channel_id: channel_id.to_string(),
        id: canonical_message_id(chat_id, msg.id.0),
        chat_id: chat_id.to_string(),
        chat_name,
        is_private,
        sender,
        text,
        media_type,
        media,
        reply_to: msg
            .reply_to_message()
            .map(|parent| canonical_message_id(chat_id, parent.id.0)),
        timestamp: msg.date,
        raw: serde_json::to_value(msg).unwrap_or_default(),
    }
}

fn sender_of(msg: &Message) -> InboundSender {
    match msg.from.as_ref() {
        Some(user) => InboundSender {
            id: user.id.0.to_string(),
            name: Some(user.full_name()),
            is_bot: user.is_bot,
            raw: serde_json::to_value(user).unwrap_or_default(),
        },
        // Channel posts carry no user; the chat itself is the author.
        None => InboundSender {
            id: msg.chat.id.0.to_string(),
            name: msg.chat.title().map(str::to_string),
            is_bot: false,
            raw: serde_json::Value::Null,
        },
    }
}

fn media_of(msg: &Message) -> (MediaType, Option<MediaRef>) {
    if let Some(voice) = msg.voice() {
        let media = MediaRef {
            file_id: voice.file.id.to_string(),
            content_type: voice.mime_type.as_ref().map(|m| m.to_string()),
            filename: Some(format!("{}.ogg", voice.file.unique_id)),
        };
        return (MediaType::Audio, Some(media));
    }
    if let Some(largest) = msg.photo().and_then(<[_]>::last) {
        let media = MediaRef {
            file_id: largest.file.id.to_string(),
            content_type: Some("image/jpeg".to_string()),
            filename: Some(format!("{}.jpg", largest.file.unique_id)),
        };
        return (MediaType::Image, Some(media));
    }
    if let Some(doc) = msg.document() {
        let media = MediaRef {
            file_id: doc.file.id.to_string(),
            content_type: doc.mime_type.as_ref().map(|m| m.to_string()),
            filename: doc.file_name.clone(),
        };
        return (MediaType::File, Some(media));
    }
    (MediaType::Text, None)
}

fn text_of(msg: &Message, media_type: MediaType) -> String {
    if let Some(text) = msg.text().or_else(|| msg.caption()) {
        return text.to_string();
    }
    match media_type {
        MediaType::Audio => return "**Voice Message**".into(),
        MediaType::Image => return "**Photo**".into(),
        MediaType::File => return "**Document**".into(),
        _ => {}
    }
    let event = match &msg.kind {
        MessageKind::GroupChatCreated(_) | MessageKind::SupergroupChatCreated(_) => {
            "**Group Chat Created**"
        }
        MessageKind::NewChatMembers(_) => "**Member Joined**",
        MessageKind::LeftChatMember(_) => "**Member Left**",
        MessageKind::NewChatTitle(_) => "**Chat Title Changed**",
        MessageKind::Pinned(_) => "**Message Pinned**",
        _ => "**Unsupported Message**",
    };
    event.to_string()
}
