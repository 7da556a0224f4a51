// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Web chat: messages posted by site visitors and replies shown back to them.
//!
//! There is no provider in between. Ids are minted locally and replies are
//! only persisted; the site reads them from the store.

use async_trait::async_trait;
use chrono::Utc;
use courier_core::{
    ChatDelivery, ChatTransport, CourierError, DeliveryReceipt, InboundChatMessage, InboundSender,
    MediaBlob, MediaType, Message, Platform,
};
use serde_json::json;
use tracing::debug;

use crate::chat_ingest::ChatIngest;

/// A message posted from the web chat widget.
#[derive(Debug, Clone)]
pub struct WebChatPost {
    pub channel_id: String,
    /// Account id of the visitor or logged-in user.
    pub sender_id: String,
    pub sender_name: Option<String>,
    /// Existing chat to post into. A new chat is started when absent.
    pub chat_id: Option<String>,
    pub text: String,
    pub media: Option<MediaBlob>,
    pub reply_to: Option<String>,
}

/// Store a web chat post and return the new message.
///
/// Posting into an existing chat requires the sender to be a member of it.
/// A post without text is stored with a `**<media type>**` placeholder.
pub async fn save_webchat_message(
    ingest: &ChatIngest,
    post: WebChatPost,
) -> Result<Message, CourierError> {
    let store = ingest.store();
    let text = post.text.trim().to_string();
    let media_type = post
        .media
        .as_ref()
        .map(|m| MediaType::from_mime(&m.content_type))
        .unwrap_or(MediaType::Text);
    if text.is_empty() && post.media.is_none() {
        return Err(CourierError::Validation(
            "web chat message needs text or media".into(),
        ));
    }

    let (chat_id, chat_name) = match post.chat_id {
        Some(chat_id) => {
            if store.get_chat(Platform::WebChat, &chat_id).await?.is_none() {
                return Err(CourierError::not_found("chat", chat_id));
            }
            if !store
                .is_chat_member(Platform::WebChat, &chat_id, &post.sender_id)
                .await?
            {
                return Err(CourierError::Validation(format!(
                    "account {} is not a member of chat {chat_id}",
                    post.sender_id
                )));
            }
            (chat_id, None)
        }
        None => {
            let chat_id = format!("webchat_{}", uuid::Uuid::new_v4());
            let who = post.sender_name.as_deref().unwrap_or(&post.sender_id);
            debug!(chat_id = %chat_id, sender = %post.sender_id, "starting web chat");
            (chat_id, Some(format!("Chat with {who}")))
        }
    };

    let message_id = format!("webchat_{chat_id}_{}", uuid::Uuid::new_v4());
    let inbound = InboundChatMessage {
        platform: Platform::WebChat,
        channel_id: post.channel_id,
        id: message_id,
        chat_id,
        chat_name,
        is_private: true,
        sender: InboundSender {
            id: post.sender_id.clone(),
            name: post.sender_name,
            is_bot: false,
            raw: json!({ "source": "webchat" }),
        },
        text: if text.is_empty() {
            media_type.placeholder()
        } else {
            text
        },
        media_type,
        media: None,
        reply_to: post.reply_to,
        timestamp: Utc::now(),
        raw: json!({ "source": "webchat", "account_id": post.sender_id }),
    };

    let (mut message, _) = ingest.ingest_chat_message(inbound).await?;
    if let Some(blob) = post.media {
        store
            .set_message_media(Platform::WebChat, &message.id, blob.clone(), media_type)
            .await?;
        message.media = Some(blob);
    }
    Ok(message)
}

/// Outbound side of web chat. Nothing leaves the process; the receipt only
/// assigns the id under which the reply is stored.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebChatTransport;

#[async_trait]
impl ChatTransport for WebChatTransport {
    fn platform(&self) -> Platform {
        Platform::WebChat
    }

    async fn deliver(&self, delivery: &ChatDelivery) -> Result<DeliveryReceipt, CourierError> {
        Ok(DeliveryReceipt {
            message_id: format!("webchat_{}_{}", delivery.chat_id, uuid::Uuid::new_v4()),
            timestamp: Utc::now(),
            raw: json!({ "source": "webchat" }),
        })
    }
}
