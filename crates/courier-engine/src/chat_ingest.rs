// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared sink for Telegram, WhatsApp and web-chat messages.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use courier_core::{
    Account, Chat, ChatSink, CourierError, Direction, InboundChatMessage, MediaFetcher, Message,
    Platform, Store,
};
use tracing::{debug, info, warn};

/// Persists inbound chat messages: sender account, chat, membership and
/// the message itself, each get-or-create.
///
/// Media referenced by a new message is downloaded through the fetcher
/// registered for its channel. A failed download leaves the message stored
/// with its placeholder text.
pub struct ChatIngest {
    store: Arc<dyn Store>,
    fetchers: HashMap<String, Arc<dyn MediaFetcher>>,
}

impl ChatIngest {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            fetchers: HashMap::new(),
        }
    }

    /// Download media for messages arriving on `channel_id` with `fetcher`.
    pub fn with_fetcher(mut self, channel_id: impl Into<String>, fetcher: Arc<dyn MediaFetcher>) -> Self {
        self.fetchers.insert(channel_id.into(), fetcher);
        self
    }

    pub(crate) fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Store one inbound message. Returns the stored row and whether it was new.
    ///
    /// A provider redelivering the same message id gets the first row back
    /// unchanged. A blocked sender is refused with [`CourierError::Blocked`]
    /// and nothing is stored.
    pub async fn ingest_chat_message(
        &self,
        inbound: InboundChatMessage,
    ) -> Result<(Message, bool), CourierError> {
        let platform = inbound.platform;
        if let Some(existing) = self.store.get_message(platform, &inbound.id).await? {
            debug!(platform = %platform, message_id = %inbound.id, "chat message already stored");
            return Ok((existing, false));
        }

        let mut account = Account::new(platform, inbound.sender.id.clone());
        account.name = inbound.sender.name.clone();
        account.is_bot = inbound.sender.is_bot;
        account.raw = inbound.sender.raw.clone();
        let (account, _) = self.store.get_or_create_account(account).await?;
        if account.blocked {
            info!(platform = %platform, sender = %account.id, "dropping message from blocked account");
            return Err(CourierError::Blocked {
                platform,
                account: account.id,
            });
        }

        let mut chat = Chat::new(platform, inbound.chat_id.clone(), inbound.channel_id.clone())
            .with_name(inbound.chat_name.clone());
        chat.is_private = inbound.is_private;
        let (chat, chat_created) = self.store.get_or_create_chat(chat).await?;
        if chat_created {
            debug!(platform = %platform, chat_id = %chat.id, "created chat");
        }
        self.store
            .add_chat_member(platform, &chat.id, &account.id)
            .await?;

        let reply_to = match inbound.reply_to.as_deref() {
            Some(parent) => self.resolve_parent(platform, parent).await?,
            None => None,
        };

        let mut message = Message::new(
            platform,
            inbound.id.clone(),
            inbound.channel_id.clone(),
            account.id.clone(),
            chat.id.clone(),
            Direction::Incoming,
        );
        message.text = inbound.text;
        message.media_type = inbound.media_type;
        message.reply_to_message_id = reply_to;
        message.timestamp = inbound.timestamp;
        message.raw = inbound.raw;

        let (mut message, created) = self.store.insert_message(message).await?;
        if !created {
            return Ok((message, false));
        }
        info!(
            platform = %platform,
            channel = %message.channel_id,
            chat_id = %message.chat_id,
            message_id = %message.id,
            "stored chat message"
        );

        if let Some(media) = &inbound.media {
            match self.fetchers.get(&message.channel_id) {
                Some(fetcher) => match fetcher.fetch(media).await {
                    Ok(blob) => {
                        self.store
                            .set_message_media(platform, &message.id, blob.clone(), message.media_type)
                            .await?;
                        message.media = Some(blob);
                    }
                    Err(e) => {
                        warn!(message_id = %message.id, file_id = %media.file_id, error = %e, "media download failed");
                    }
                },
                None => {
                    debug!(channel = %message.channel_id, "no media fetcher registered, keeping placeholder");
                }
            }
        }

        Ok((message, true))
    }

    /// The parent id if it is stored on this platform.
    async fn resolve_parent(
        &self,
        platform: Platform,
        parent: &str,
    ) -> Result<Option<String>, CourierError> {
        let found = self.store.get_message(platform, parent).await?;
        if found.is_none() {
            debug!(platform = %platform, parent = %parent, "reply target not stored");
        }
        Ok(found.map(|m| m.id))
    }
}

#[async_trait]
impl ChatSink for ChatIngest {
    async fn accept_chat(&self, message: InboundChatMessage) -> Result<Message, CourierError> {
        self.ingest_chat_message(message).await.map(|(m, _)| m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use courier_core::{InboundSender, MediaBlob, MediaRef, MediaType, MessageStore};
    use courier_test_utils::TestHarness;
    use tracing_test::traced_test;

    struct StaticFetcher {
        fail: bool,
    }

    #[async_trait]
    impl MediaFetcher for StaticFetcher {
        async fn fetch(&self, media: &MediaRef) -> Result<MediaBlob, CourierError> {
            if self.fail {
                return Err(CourierError::channel("file expired"));
            }
            Ok(MediaBlob {
                filename: format!("{}.jpg", media.file_id),
                content_type: "image/jpeg".into(),
                data: vec![1, 2, 3],
            })
        }
    }

    fn inbound(id: &str, chat: &str, reply_to: Option<&str>) -> InboundChatMessage {
        InboundChatMessage {
            platform: Platform::Telegram,
            channel_id: "bot".into(),
            id: id.into(),
            chat_id: chat.into(),
            chat_name: Some("Ops".into()),
            is_private: false,
            sender: InboundSender {
                id: "42".into(),
                name: Some("Dana".into()),
                is_bot: false,
                raw: serde_json::Value::Null,
            },
            text: "hello".into(),
            media_type: MediaType::Text,
            media: None,
            reply_to: reply_to.map(str::to_string),
            timestamp: Utc::now(),
            raw: serde_json::json!({ "id": id }),
        }
    }

    fn photo(id: &str) -> InboundChatMessage {
        InboundChatMessage {
            text: "**Photo**".into(),
            media_type: MediaType::Image,
            media: Some(MediaRef {
                file_id: "file-1".into(),
                content_type: Some("image/jpeg".into()),
                filename: None,
            }),
            ..inbound(id, "-100", None)
        }
    }

    #[tokio::test]
    async fn first_message_creates_account_chat_and_membership() {
        let harness = TestHarness::new().await.unwrap();
        let ingest = ChatIngest::new(harness.store.clone());

        let (message, created) = ingest
            .ingest_chat_message(inbound("-100:1", "-100", None))
            .await
            .unwrap();
        assert!(created);
        assert_eq!(message.direction, Direction::Incoming);
        assert_eq!(message.sender_id, "42");

        let chat = harness
            .store
            .get_chat(Platform::Telegram, "-100")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(chat.name.as_deref(), Some("Ops"));
        assert_eq!(chat.cache.last_incoming_message_id.as_deref(), Some("-100:1"));
        assert!(harness
            .store
            .is_chat_member(Platform::Telegram, "-100", "42")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn redelivery_returns_the_stored_row() {
        let harness = TestHarness::new().await.unwrap();
        let ingest = ChatIngest::new(harness.store.clone());
        ingest
            .ingest_chat_message(inbound("-100:1", "-100", None))
            .await
            .unwrap();

        let mut again = inbound("-100:1", "-100", None);
        again.text = "edited".into();
        let (message, created) = ingest.ingest_chat_message(again).await.unwrap();
        assert!(!created);
        assert_eq!(message.text, "hello");
    }

    #[tokio::test]
    async fn reply_target_is_kept_only_when_stored() {
        let harness = TestHarness::new().await.unwrap();
        let ingest = ChatIngest::new(harness.store.clone());
        ingest
            .ingest_chat_message(inbound("-100:1", "-100", None))
            .await
            .unwrap();

        let (known, _) = ingest
            .ingest_chat_message(inbound("-100:2", "-100", Some("-100:1")))
            .await
            .unwrap();
        assert_eq!(known.reply_to_message_id.as_deref(), Some("-100:1"));

        let (unknown, _) = ingest
            .ingest_chat_message(inbound("-100:3", "-100", Some("-100:999")))
            .await
            .unwrap();
        assert!(unknown.reply_to_message_id.is_none());
    }

    #[tokio::test]
    async fn media_is_downloaded_for_new_messages() {
        let harness = TestHarness::new().await.unwrap();
        let ingest = ChatIngest::new(harness.store.clone())
            .with_fetcher("bot", Arc::new(StaticFetcher { fail: false }));

        let (message, _) = ingest.ingest_chat_message(photo("-100:5")).await.unwrap();
        assert_eq!(message.media.as_ref().unwrap().data, vec![1, 2, 3]);

        let stored = harness
            .store
            .get_message(Platform::Telegram, "-100:5")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.media.unwrap().filename, "file-1.jpg");
        assert_eq!(stored.media_type, MediaType::Image);
    }

    #[tokio::test]
    #[traced_test]
    async fn failed_download_keeps_the_placeholder() {
        let harness = TestHarness::new().await.unwrap();
        let ingest = ChatIngest::new(harness.store.clone())
            .with_fetcher("bot", Arc::new(StaticFetcher { fail: true }));

        let (message, created) = ingest.ingest_chat_message(photo("-100:6")).await.unwrap();
        assert!(created);
        assert!(message.media.is_none());
        assert_eq!(message.text, "**Photo**");
        assert!(logs_contain("media download failed"));
    }

    #[tokio::test]
    async fn blocked_sender_stores_nothing() {
        let harness = TestHarness::new().await.unwrap();
        let ingest = ChatIngest::new(harness.store.clone());
        ingest
            .ingest_chat_message(inbound("-100:1", "-100", None))
            .await
            .unwrap();
        harness
            .store
            .set_account_blocked(Platform::Telegram, "42", true)
            .await
            .unwrap();

        let err = ingest
            .ingest_chat_message(inbound("-100:2", "-100", None))
            .await
            .unwrap_err();
        assert!(matches!(err, CourierError::Blocked { ref account, .. } if account == "42"));
        assert!(harness
            .store
            .get_message(Platform::Telegram, "-100:2")
            .await
            .unwrap()
            .is_none());
        let messages = harness
            .store
            .chat_messages(Platform::Telegram, "-100")
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
    }
}
