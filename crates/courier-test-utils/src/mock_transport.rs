// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound transports that record instead of sending.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use courier_core::{
    ChatDelivery, ChatTransport, CourierError, DeliveryReceipt, Envelope, MailEndpoint,
    MailTransport, Platform,
};

/// A chat transport that captures deliveries and hands out sequential ids.
pub struct MockChatTransport {
    platform: Platform,
    sent: Arc<Mutex<Vec<ChatDelivery>>>,
    next_id: AtomicU64,
    failing: AtomicBool,
}

impl MockChatTransport {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            sent: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(1),
            failing: AtomicBool::new(false),
        }
    }

    /// Make every following delivery fail with a channel error.
    pub fn fail_sends(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn sent_messages(&self) -> Vec<ChatDelivery> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[async_trait]
impl ChatTransport for MockChatTransport {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn deliver(&self, delivery: &ChatDelivery) -> Result<DeliveryReceipt, CourierError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CourierError::channel("mock transport refused the message"));
        }
        let seq = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().await.push(delivery.clone());
        Ok(DeliveryReceipt {
            message_id: format!("{}:{seq}", delivery.chat_id),
            timestamp: Utc::now(),
            raw: serde_json::json!({ "mock": true, "seq": seq }),
        })
    }
}

/// One message handed to [`MockMailTransport`].
#[derive(Debug, Clone)]
pub struct SentMail {
    pub endpoint: MailEndpoint,
    pub envelope: Envelope,
    pub bytes: Vec<u8>,
}

impl SentMail {
    pub fn as_text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// An SMTP stand-in.
#[derive(Default)]
pub struct MockMailTransport {
    sent: Arc<Mutex<Vec<SentMail>>>,
    failing: AtomicBool,
}

impl MockMailTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_sends(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn sent_messages(&self) -> Vec<SentMail> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl MailTransport for MockMailTransport {
    async fn send_raw(
        &self,
        endpoint: &MailEndpoint,
        envelope: &Envelope,
        message: &[u8],
    ) -> Result<(), CourierError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CourierError::channel("smtp: 554 rejected by mock"));
        }
        self.sent.lock().await.push(SentMail {
            endpoint: endpoint.clone(),
            envelope: envelope.clone(),
            bytes: message.to_vec(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delivery(text: &str) -> ChatDelivery {
        ChatDelivery {
            chat_id: "100".into(),
            text: text.into(),
            html: None,
            reply_to: None,
            attachments: Vec::new(),
        }
    }

    #[tokio::test]
    async fn chat_transport_records_and_numbers() {
        let transport = MockChatTransport::new(Platform::Telegram);
        let first = transport.deliver(&delivery("a")).await.unwrap();
        let second = transport.deliver(&delivery("b")).await.unwrap();
        assert_eq!(first.message_id, "100:1");
        assert_eq!(second.message_id, "100:2");
        assert_eq!(transport.sent_count().await, 2);

        transport.fail_sends(true);
        assert!(transport.deliver(&delivery("c")).await.is_err());
        assert_eq!(transport.sent_count().await, 2);
    }
}
