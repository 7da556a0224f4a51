// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Graph API sender and media downloader for one WhatsApp business number.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use courier_config::ChannelConfig;
use courier_core::{
    ChatDelivery, ChatTransport, CourierError, DeliveryReceipt, MediaBlob, MediaFetcher, MediaRef,
    Platform,
};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    messaging_product: &'static str,
    recipient_type: &'static str,
    to: &'a str,
    #[serde(rename = "type")]
    message_type: &'static str,
    text: TextContent<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<ReplyContext<'a>>,
}

#[derive(Debug, Serialize)]
struct TextContent<'a> {
    body: &'a str,
}

#[derive(Debug, Serialize)]
struct ReplyContext<'a> {
    message_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    #[serde(default)]
    messages: Vec<SentMessage>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MediaInfo {
    url: String,
    mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Sends text messages through the WhatsApp Cloud API.
#[derive(Debug, Clone)]
pub struct WhatsAppTransport {
    client: reqwest::Client,
    api_base: String,
    phone_number_id: String,
    channel_id: String,
}

impl WhatsAppTransport {
    pub fn new(channel: &ChannelConfig) -> Result<Self, CourierError> {
        let settings = channel.whatsapp_settings()?;
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {}", settings.access_token)).map_err(|e| {
                CourierError::Config(format!("invalid WhatsApp access token header value: {e}"))
            })?,
        );
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CourierError::channel_with(format!("failed to build HTTP client: {e}"), e))?;
        Ok(Self {
            client,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            phone_number_id: settings.phone_number_id.clone(),
            channel_id: channel.id.clone(),
        })
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    async fn error_from(response: reqwest::Response) -> CourierError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ApiErrorResponse>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);
        CourierError::channel(format!("WhatsApp API returned {status}: {detail}"))
    }
}

#[async_trait]
impl ChatTransport for WhatsAppTransport {
    fn platform(&self) -> Platform {
        Platform::WhatsApp
    }

    async fn deliver(&self, delivery: &ChatDelivery) -> Result<DeliveryReceipt, CourierError> {
        if !delivery.attachments.is_empty() {
            return Err(CourierError::Validation(
                "WhatsApp attachments are not supported".into(),
            ));
        }
        if delivery.text.trim().is_empty() {
            return Err(CourierError::Validation("WhatsApp message needs text".into()));
        }

        let request = SendMessageRequest {
            messaging_product: "whatsapp",
            recipient_type: "individual",
            to: &delivery.chat_id,
            message_type: "text",
            text: TextContent {
                body: &delivery.text,
            },
            context: delivery
                .reply_to
                .as_deref()
                .map(|message_id| ReplyContext { message_id }),
        };
        let url = format!("{}/{}/messages", self.api_base, self.phone_number_id);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| CourierError::channel_with(format!("HTTP request failed: {e}"), e))?;
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CourierError::channel_with("invalid WhatsApp API response", e))?;
        let parsed: SendMessageResponse = serde_json::from_value(raw.clone())
            .map_err(|e| CourierError::Parse(format!("unexpected WhatsApp API response: {e}")))?;
        let message_id = parsed
            .messages
            .into_iter()
            .next()
            .map(|m| m.id)
            .ok_or_else(|| CourierError::Parse("WhatsApp API response has no message id".into()))?;

        debug!(channel = %self.channel_id, to = %delivery.chat_id, message_id = %message_id, "whatsapp message sent");
        Ok(DeliveryReceipt {
            message_id,
            timestamp: Utc::now(),
            raw,
        })
    }
}

#[async_trait]
impl MediaFetcher for WhatsAppTransport {
    /// Resolve the media id to a short-lived URL, then download it.
    async fn fetch(&self, media: &MediaRef) -> Result<MediaBlob, CourierError> {
        let url = format!("{}/{}", self.api_base, media.file_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CourierError::channel_with(format!("HTTP request failed: {e}"), e))?;
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }
        let info: MediaInfo = response
            .json()
            .await
            .map_err(|e| CourierError::channel_with("invalid WhatsApp media response", e))?;

        let response = self
            .client
            .get(&info.url)
            .send()
            .await
            .map_err(|e| CourierError::channel_with(format!("media download failed: {e}"), e))?;
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }
        let data = response
            .bytes()
            .await
            .map_err(|e| CourierError::channel_with("media download failed", e))?
            .to_vec();
        debug!(channel = %self.channel_id, media_id = %media.file_id, size = data.len(), "downloaded whatsapp media");

        Ok(MediaBlob {
            filename: media.filename.clone().unwrap_or_else(|| media.file_id.clone()),
            content_type: media
                .content_type
                .clone()
                .or(info.mime_type)
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            data,
        })
    }
}
