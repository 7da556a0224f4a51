// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bot API sender and media downloader.

use std::time::Duration;

use async_trait::async_trait;
use courier_config::ChannelConfig;
use courier_core::{
    Attachment, ChatDelivery, ChatTransport, CourierError, DeliveryReceipt, MediaBlob, MediaFetcher,
    MediaRef, MediaType, Platform,
};
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{ChatId, FileId, InputFile, MessageId, ParseMode, ReplyParameters};
use teloxide::RequestError;
use tracing::{debug, warn};

use crate::convert::{canonical_message_id, native_message_id};

/// Telegram's limit for message text and captions, in characters.
pub const MAX_TEXT_CHARS: usize = 4096;

const CROP_FOOTER: &str = "\n\n[message cropped]";
const MAX_RATE_LIMIT_RETRIES: usize = 3;

fn send_err(e: RequestError) -> CourierError {
    CourierError::channel_with(format!("failed to send Telegram message: {e}"), e)
}

/// Shorten `text` to Telegram's limit, marking the cut.
pub fn crop_text(text: &str) -> String {
    if text.chars().count() <= MAX_TEXT_CHARS {
        return text.to_string();
    }
    let keep = MAX_TEXT_CHARS - CROP_FOOTER.chars().count();
    let mut cropped: String = text.chars().take(keep).collect();
    cropped.push_str(CROP_FOOTER);
    cropped
}

/// Sends through one bot token.
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
    channel_id: String,
}

impl TelegramTransport {
    pub fn new(channel: &ChannelConfig) -> Result<Self, CourierError> {
        let settings = channel.telegram_settings()?;
        if settings.bot_token.trim().is_empty() {
            return Err(CourierError::Config(format!(
                "channel `{}`: telegram.bot_token cannot be empty",
                channel.id
            )));
        }
        Ok(Self {
            bot: Bot::new(&settings.bot_token),
            channel_id: channel.id.clone(),
        })
    }

    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Run `attempt`, sleeping out Telegram's flood-control window a few times.
    async fn with_rate_limit<T, F, Fut>(&self, mut attempt: F) -> Result<T, RequestError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, RequestError>>,
    {
        let mut retries = 0;
        loop {
            match attempt().await {
                Err(RequestError::RetryAfter(wait)) if retries < MAX_RATE_LIMIT_RETRIES => {
                    retries += 1;
                    let wait: Duration = wait.duration();
                    warn!(channel = %self.channel_id, ?wait, retries, "telegram rate limited, retrying");
                    tokio::time::sleep(wait).await;
                }
                other => return other,
            }
        }
    }

    async fn send_text(
        &self,
        chat_id: ChatId,
        delivery: &ChatDelivery,
        reply: Option<ReplyParameters>,
    ) -> Result<Message, CourierError> {
        if let Some(html) = delivery.html.as_deref().filter(|h| !h.trim().is_empty()) {
            let html = crop_text(html);
            let sent = self
                .with_rate_limit(|| {
                    let mut request = self
                        .bot
                        .send_message(chat_id, html.clone())
                        .parse_mode(ParseMode::Html);
                    if let Some(reply) = reply.clone() {
                        request = request.reply_parameters(reply);
                    }
                    async move { request.await }
                })
                .await;
            match sent {
                Ok(message) => return Ok(message),
                Err(e) if e.to_string().contains("can't parse entities") => {
                    warn!(channel = %self.channel_id, error = %e, "HTML rejected, sending as plain text");
                }
                Err(e) => return Err(send_err(e)),
            }
        }

        let text = crop_text(&delivery.text);
        self.with_rate_limit(|| {
            let mut request = self.bot.send_message(chat_id, text.clone());
            if let Some(reply) = reply.clone() {
                request = request.reply_parameters(reply);
            }
            async move { request.await }
        })
        .await
        .map_err(send_err)
    }

    /// Images go out as photos, audio as audio, everything else as documents.
    async fn send_attachment(
        &self,
        chat_id: ChatId,
        attachment: &Attachment,
        caption: Option<String>,
        reply: Option<ReplyParameters>,
    ) -> Result<Message, CourierError> {
        let file = || InputFile::memory(attachment.data.clone()).file_name(attachment.filename.clone());
        let caption = caption.map(|c| crop_text(&c)).filter(|c| !c.trim().is_empty());
        let sent = match MediaType::from_mime(&attachment.content_type) {
            MediaType::Image => {
                self.with_rate_limit(|| {
                    let mut request = self.bot.send_photo(chat_id, file());
                    if let Some(caption) = caption.clone() {
                        request = request.caption(caption);
                    }
                    if let Some(reply) = reply.clone() {
                        request = request.reply_parameters(reply);
                    }
                    async move { request.await }
                })
                .await
            }
            MediaType::Audio => {
                self.with_rate_limit(|| {
                    let mut request = self.bot.send_audio(chat_id, file());
                    if let Some(caption) = caption.clone() {
                        request = request.caption(caption);
                    }
                    if let Some(reply) = reply.clone() {
                        request = request.reply_parameters(reply);
                    }
                    async move { request.await }
                })
                .await
            }
            _ => {
                self.with_rate_limit(|| {
                    let mut request = self.bot.send_document(chat_id, file());
                    if let Some(caption) = caption.clone() {
                        request = request.caption(caption);
                    }
                    if let Some(reply) = reply.clone() {
                        request = request.reply_parameters(reply);
                    }
                    async move { request.await }
                })
                .await
            }
        };
        sent.map_err(send_err)
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    fn platform(&self) -> Platform {
        Platform::Telegram
    }

    async fn deliver(&self, delivery: &ChatDelivery) -> Result<DeliveryReceipt, CourierError> {
        let chat_id = delivery
            .chat_id
            .parse::<i64>()
            .map(ChatId)
            .map_err(|e| CourierError::Validation(format!("invalid Telegram chat id `{}`: {e}", delivery.chat_id)))?;
        let reply = delivery
            .reply_to
            .as_deref()
            .and_then(native_message_id)
            .map(|id| ReplyParameters::new(MessageId(id)));

        // The first attachment carries the text as its caption; any others follow it.
        let sent = match delivery.attachments.split_first() {
            Some((first, rest)) => {
                let sent = self
                    .send_attachment(chat_id, first, Some(delivery.text.clone()), reply)
                    .await?;
                for extra in rest {
                    self.send_attachment(chat_id, extra, None, None).await?;
                }
                sent
            }
            None => self.send_text(chat_id, delivery, reply).await?,
        };

        debug!(channel = %self.channel_id, chat_id = chat_id.0, message_id = sent.id.0, "telegram message sent");
        Ok(DeliveryReceipt {
            message_id: canonical_message_id(sent.chat.id.0, sent.id.0),
            timestamp: sent.date,
            raw: serde_json::to_value(&sent).unwrap_or_default(),
        })
    }
}

#[async_trait]
impl MediaFetcher for TelegramTransport {
    async fn fetch(&self, media: &MediaRef) -> Result<MediaBlob, CourierError> {
        let file = self
            .bot
            .get_file(FileId(media.file_id.clone()))
            .await
            .map_err(|e| CourierError::channel_with(format!("failed to get file info: {e}"), e))?;

        let mut data = Vec::new();
        self.bot
            .download_file(&file.path, &mut data)
            .await
            .map_err(|e| CourierError::channel_with(format!("failed to download file: {e}"), e))?;
        debug!(channel = %self.channel_id, file_id = %media.file_id, size = data.len(), "downloaded file from Telegram");

        let filename = media.filename.clone().unwrap_or_else(|| {
            file.path
                .rsplit('/')
                .next()
                .unwrap_or(file.path.as_str())
                .to_string()
        });
        Ok(MediaBlob {
            filename,
            content_type: media
                .content_type
                .clone()
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            data,
        })
    }
}
