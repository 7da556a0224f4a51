// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WhatsApp Cloud API webhook payloads.
//!
//! A single callback may batch several messages and status updates across
//! entries and changes; every one of them is returned.

use chrono::{DateTime, Utc};
use courier_core::{
    CourierError, DeliveryEvent, DeliveryUpdate, InboundChatMessage, InboundSender, MediaRef,
    MediaType, Platform,
};
use serde::Deserialize;
use tracing::{debug, warn};

/// Root webhook payload.
#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppWebhook {
    pub object: String,
    #[serde(default)]
    pub entry: Vec<WhatsAppEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppEntry {
    pub id: String,
    #[serde(default)]
    pub changes: Vec<WhatsAppChange>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppChange {
    pub value: WhatsAppValue,
    pub field: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppValue {
    pub messaging_product: String,
    pub metadata: WhatsAppMetadata,
    #[serde(default)]
    pub contacts: Vec<WhatsAppContact>,
    #[serde(default)]
    pub messages: Vec<WhatsAppMessage>,
    #[serde(default)]
    pub statuses: Vec<WhatsAppStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppMetadata {
    pub display_phone_number: Option<String>,
    pub phone_number_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppContact {
    pub wa_id: String,
    pub profile: Option<WhatsAppProfile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppProfile {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppMessage {
    pub id: String,
    pub from: String,
    pub timestamp: String,
    #[serde(rename = "type")]
    pub message_type: String,
    pub context: Option<WhatsAppContext>,
    pub text: Option<WhatsAppText>,
    pub button: Option<WhatsAppButton>,
    pub interactive: Option<WhatsAppInteractive>,
    pub image: Option<WhatsAppMedia>,
    pub audio: Option<WhatsAppMedia>,
    pub voice: Option<WhatsAppMedia>,
    pub video: Option<WhatsAppMedia>,
    pub document: Option<WhatsAppMedia>,
}

/// Present when the customer replied to a specific message.
#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppContext {
    pub id: Option<String>,
    pub from: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppText {
    pub body: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppButton {
    pub text: String,
    pub payload: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppInteractive {
    #[serde(rename = "type")]
    pub interactive_type: Option<String>,
    pub button_reply: Option<WhatsAppReplyOption>,
    pub list_reply: Option<WhatsAppReplyOption>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppReplyOption {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppMedia {
    pub id: String,
    pub mime_type: Option<String>,
    pub sha256: Option<String>,
    pub caption: Option<String>,
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppStatus {
    pub id: String,
    pub status: String,
    pub timestamp: String,
    pub recipient_id: String,
}

/// Decode a webhook body.
pub fn parse_webhook(body: &[u8]) -> Result<WhatsAppWebhook, CourierError> {
    serde_json::from_slice(body)
        .map_err(|e| CourierError::Parse(format!("invalid WhatsApp webhook payload: {e}")))
}

fn parse_timestamp(secs: &str) -> DateTime<Utc> {
    secs.parse::<i64>()
        .ok()
        .and_then(|s| DateTime::<Utc>::from_timestamp(s, 0))
        .unwrap_or_else(Utc::now)
}

/// Every inbound message in the payload, in payload order.
///
/// The chat of a WhatsApp conversation is the customer's phone number.
pub fn whatsapp_to_inbound(channel_id: &str, webhook: &WhatsAppWebhook) -> Vec<InboundChatMessage> {
    let mut out = Vec::new();
    for change in webhook.entry.iter().flat_map(|e| &e.changes) {
        let value = &change.value;
        for message in &value.messages {
            let name = value
                .contacts
                .iter()
                .find(|c| c.wa_id == message.from)
                .or_else(|| value.contacts.first())
                .and_then(|c| c.profile.as_ref())
                .map(|p| p.name.clone());
            out.push(convert_message(channel_id, message, name));
        }
    }
    out
}

fn convert_message(
    channel_id: &str,
    message: &WhatsAppMessage,
    name: Option<String>,
) -> InboundChatMessage {
    let (media_type, media) = media_of(message);
    let text = message
        .text
        .as_ref()
        .map(|t| t.body.clone())
        .or_else(|| message.button.as_ref().map(|b| b.text.clone()))
        .or_else(|| {
            message.interactive.as_ref().and_then(|i| {
                i.button_reply
                    .as_ref()
                    .or(i.list_reply.as_ref())
                    .map(|r| r.title.clone())
            })
        })
        .or_else(|| media.as_ref().and(media_caption(message)))
        .unwrap_or_else(|| media_type.placeholder());
    let media_type = if message.button.is_some() || message.interactive.is_some() {
        MediaType::Callback
    } else {
        media_type
    };

    InboundChatMessage {
        platform: Platform::WhatsApp,
        channel_id: channel_id.to_string(),
        id: message.id.clone(),
        chat_id: message.from.clone(),
        chat_name: name.clone(),
        is_private: true,
        sender: InboundSender {
            id: message.from.clone(),
            name,
            is_bot: false,
            raw: serde_json::json!({ "wa_id": message.from }),
        },
        text,
        media_type,
        media,
        reply_to: message.context.as_ref().and_then(|c| c.id.clone()),
        timestamp: parse_timestamp(&message.timestamp),
        raw: serde_json::json!({
            "id": message.id,
            "from": message.from,
            "type": message.message_type,
            "timestamp": message.timestamp,
        }),
    }
}

fn media_caption(message: &WhatsAppMessage) -> Option<String> {
    [&message.image, &message.video, &message.document]
        .into_iter()
        .flatten()
        .find_map(|m| m.caption.clone())
}

fn media_of(message: &WhatsAppMessage) -> (MediaType, Option<MediaRef>) {
    let as_ref = |m: &WhatsAppMedia| MediaRef {
        file_id: m.id.clone(),
        content_type: m.mime_type.clone(),
        filename: m.filename.clone(),
    };
    if let Some(image) = &message.image {
        return (MediaType::Image, Some(as_ref(image)));
    }
    if let Some(audio) = message.audio.as_ref().or(message.voice.as_ref()) {
        return (MediaType::Audio, Some(as_ref(audio)));
    }
    if let Some(file) = message.document.as_ref().or(message.video.as_ref()) {
        return (MediaType::File, Some(as_ref(file)));
    }
    (MediaType::Text, None)
}

/// Map a Cloud API status string onto a delivery milestone.
pub fn delivery_event(status: &str) -> Option<DeliveryEvent> {
    match status {
        "sent" => Some(DeliveryEvent::Sent),
        "delivered" => Some(DeliveryEvent::Delivered),
        "read" => Some(DeliveryEvent::Seen),
        _ => None,
    }
}

/// Delivery updates carried by the payload. `failed` and unknown statuses are skipped.
pub fn status_updates(webhook: &WhatsAppWebhook) -> Vec<DeliveryUpdate> {
    let mut out = Vec::new();
    for status in webhook
        .entry
        .iter()
        .flat_map(|e| &e.changes)
        .flat_map(|c| &c.value.statuses)
    {
        match delivery_event(&status.status) {
            Some(event) => out.push(DeliveryUpdate {
                platform: Platform::WhatsApp,
                message_id: status.id.clone(),
                event,
                at: parse_timestamp(&status.timestamp),
            }),
            None if status.status == "failed" => {
                warn!(message_id = %status.id, recipient = %status.recipient_id, "whatsapp reported a failed delivery");
            }
            None => debug!(message_id = %status.id, status = %status.status, "ignoring whatsapp status"),
        }
    }
    out
}
