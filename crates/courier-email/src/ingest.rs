// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Email ingestion: raw bytes in, canonical threaded [`Message`] out.
//!
//! The same path handles mail fetched from the inbox and copies of mail we
//! sent ourselves, so both views of a conversation are built identically.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use courier_config::ChannelConfig;
use courier_core::{
    Account, Chat, CourierError, DeliveryEvent, Direction, InlineImage, MediaType, Message,
    Platform, RawEmailSink, Store,
};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::html::{
    find_data_uri_images, html_to_text, inline_cid_images, replace_data_uris, trim_quoted_reply,
};
use crate::parser::{MailAddress, ParsedEmail, parse_email};

/// Turns raw RFC 5322 bytes for one email channel into stored messages.
pub struct EmailIngestor {
    store: Arc<dyn Store>,
    channel_id: String,
    address: String,
    link_prefix: String,
}

impl EmailIngestor {
    /// Ingestor for `channel`. Fails if the channel has no email settings.
    pub fn new(
        store: Arc<dyn Store>,
        channel: &ChannelConfig,
        link_prefix: impl Into<String>,
    ) -> Result<Self, CourierError> {
        let settings = channel.email_settings()?;
        Ok(Self {
            store,
            channel_id: channel.id.clone(),
            address: settings.email_address.trim().to_lowercase(),
            link_prefix: link_prefix.into(),
        })
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// The channel's own address, lowercased.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Ingest one email. Returns the stored message and whether it was new.
    ///
    /// Mail from a blocked sender is refused with [`CourierError::Blocked`]
    /// before anything is stored.
    pub async fn ingest(
        &self,
        raw: &[u8],
        uid: Option<u32>,
    ) -> Result<(Message, bool), CourierError> {
        self.ingest_as(raw, uid, None).await
    }

    /// Like [`ingest`](Self::ingest), recording `sent_by` as the actor on a new message.
    pub async fn ingest_as(
        &self,
        raw: &[u8],
        uid: Option<u32>,
        sent_by: Option<&str>,
    ) -> Result<(Message, bool), CourierError> {
        let parsed = parse_email(raw)?;

        if let Some(existing) = self
            .store
            .get_message(Platform::Email, &parsed.message_id)
            .await?
        {
            debug!(
                channel = %self.channel_id,
                message_id = %existing.id,
                "email already ingested"
            );
            return Ok((existing, false));
        }

        let sender = parsed.from.clone().unwrap_or_else(|| MailAddress {
            address: "unknown".to_string(),
            name: None,
        });
        let direction = if sender.address == self.address {
            Direction::Outgoing
        } else {
            Direction::Incoming
        };

        let mut account = Account::new(Platform::Email, &sender.address)
            .with_name(sender.name.clone().unwrap_or_else(|| sender.address.clone()));
        account.is_bot = direction == Direction::Outgoing;
        account.raw = serde_json::json!({
            "address": sender.address,
            "name": sender.name,
        });
        let (account, _) = self.store.get_or_create_account(account).await?;
        if account.blocked {
            info!(channel = %self.channel_id, sender = %account.id, "dropping email from blocked sender");
            return Err(CourierError::Blocked {
                platform: Platform::Email,
                account: account.id,
            });
        }

        let parent = self.find_parent(&parsed).await?;
        let chat_id = parent
            .as_ref()
            .map(|p| p.chat_id.clone())
            .unwrap_or_else(|| parsed.message_id.clone());
        let (chat, chat_created) = self
            .store
            .get_or_create_chat(
                Chat::new(Platform::Email, chat_id, &self.channel_id)
                    .with_name(parsed.subject.clone()),
            )
            .await?;
        self.store
            .add_chat_member(Platform::Email, &chat.id, &account.id)
            .await?;

        let html = match &parsed.html {
            Some(html) => Some(
                self.prepare_html(&parsed, html, parent.is_some(), &chat.id)
                    .await?,
            ),
            None => None,
        };

        let text = if !parsed.text.is_empty() {
            parsed.text.clone()
        } else if let Some(html) = &html {
            html_to_text(html)
        } else if let Some(media) = &parsed.attachment {
            MediaType::from_mime(&media.content_type).placeholder()
        } else {
            String::new()
        };

        let mut message = Message::new(
            Platform::Email,
            &parsed.message_id,
            &self.channel_id,
            &account.id,
            &chat.id,
            direction,
        );
        message.subject = parsed.subject.clone();
        message.to = parsed.to.clone();
        message.cc = parsed.cc.clone();
        message.bcc = parsed.bcc.clone();
        message.text = text;
        message.html = html;
        message.media_type = match &parsed.attachment {
            Some(media) => MediaType::from_mime(&media.content_type),
            None => MediaType::Html,
        };
        message.media = parsed.attachment.clone();
        message.reply_to_message_id = parent.map(|p| p.id);
        message.timestamp = parsed.date;
        message.raw = serde_json::Value::Object(parsed.headers.clone());
        message.imap_uid = uid;
        message.sent_by = sent_by.map(str::to_string);
        if direction == Direction::Outgoing {
            message.delivery.apply(DeliveryEvent::Sent, parsed.date);
            message.tracking.tracking_id = Some(uuid::Uuid::new_v4().to_string());
        }

        let (stored, created) = self.store.insert_message(message).await?;
        if created {
            info!(
                channel = %self.channel_id,
                message_id = %stored.id,
                chat_id = %stored.chat_id,
                direction = %stored.direction,
                new_thread = chat_created,
                "email ingested"
            );
        }
        Ok((stored, created))
    }

    /// In-Reply-To first, then References from newest to oldest.
    async fn find_parent(&self, parsed: &ParsedEmail) -> Result<Option<Message>, CourierError> {
        for candidate in parsed.parent_candidates() {
            if let Some(parent) = self.store.get_message(Platform::Email, candidate).await? {
                return Ok(Some(parent));
            }
        }
        Ok(None)
    }

    /// Resolve `cid:` images, drop quoted history, and move embedded images
    /// out of the HTML into inline image records.
    async fn prepare_html(
        &self,
        parsed: &ParsedEmail,
        html: &str,
        in_thread: bool,
        chat_id: &str,
    ) -> Result<String, CourierError> {
        let mut html = inline_cid_images(html, &parsed.cid_images);

        if in_thread {
            let prior: Vec<String> = self
                .store
                .chat_messages(Platform::Email, chat_id)
                .await?
                .into_iter()
                .map(|m| m.text)
                .filter(|t| !t.trim().is_empty())
                .collect();
            if let Some(trimmed) = trim_quoted_reply(&html, &prior) {
                html = trimmed;
            }
        }

        let cid_by_hash: HashMap<String, &str> = parsed
            .cid_images
            .iter()
            .map(|(cid, image)| (hex::encode(Sha256::digest(&image.data)), cid.as_str()))
            .collect();

        let mut replacements = Vec::new();
        for image in find_data_uri_images(&html) {
            let sha256 = hex::encode(Sha256::digest(&image.data));
            let short_id = short_image_id(&parsed.message_id, &sha256);
            let stored = self
                .store
                .save_inline_image(InlineImage {
                    short_id,
                    message_id: Some(parsed.message_id.clone()),
                    content_id: cid_by_hash.get(&sha256).map(|c| c.to_string()),
                    content_type: image.content_type,
                    data: image.data,
                    sha256,
                })
                .await?;
            replacements.push((image.uri, format!("{}{}", self.link_prefix, stored.short_id)));
        }
        Ok(replace_data_uris(&html, &replacements))
    }
}

fn short_image_id(message_id: &str, sha256: &str) -> String {
    let digest = hex::encode(Sha256::digest(format!("{message_id}{sha256}").as_bytes()));
    digest[..16].to_string()
}

#[async_trait]
impl RawEmailSink for EmailIngestor {
    async fn accept(&self, raw: &[u8], uid: Option<u32>) -> Result<Message, CourierError> {
        self.ingest(raw, uid).await.map(|(message, _)| message)
    }
}
