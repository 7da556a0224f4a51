// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A store that forwards to SQLite but can be told to fail category reads.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_core::crm::{Communication, CommunicationDelivery, DraftMessage};
use courier_core::{
    Account, Chat, ChatCache, CourierError, CrmStore, DeliveryEvent, InlineImage, MediaBlob,
    MediaType, Member, Message, MessageStore, Platform, Request, RequestCategory, RequestStore,
    TrackingEvent,
};
use courier_storage::SqliteStore;

/// Wraps a [`SqliteStore`]; every call is forwarded unless a fault is switched on.
pub struct FaultyStore {
    inner: Arc<SqliteStore>,
    fail_categories: AtomicBool,
}

impl FaultyStore {
    pub fn new(inner: Arc<SqliteStore>) -> Self {
        Self {
            inner,
            fail_categories: AtomicBool::new(false),
        }
    }

    /// Make `get_category` and `child_categories` fail with a storage error.
    pub fn fail_category_reads(&self, failing: bool) {
        self.fail_categories.store(failing, Ordering::SeqCst);
    }

    fn category_fault(&self) -> Result<(), CourierError> {
        if self.fail_categories.load(Ordering::SeqCst) {
            return Err(CourierError::Storage {
                source: Box::new(std::io::Error::other("disk I/O error reading categories")),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MessageStore for FaultyStore {
    async fn get_account(
        &self,
        platform: Platform,
        id: &str,
    ) -> Result<Option<Account>, CourierError> {
        self.inner.get_account(platform, id).await
    }

    async fn get_or_create_account(
        &self,
        account: Account,
    ) -> Result<(Account, bool), CourierError> {
        self.inner.get_or_create_account(account).await
    }

    async fn set_account_member(
        &self,
        platform: Platform,
        account_id: &str,
        member_id: &str,
    ) -> Result<(), CourierError> {
        self.inner
            .set_account_member(platform, account_id, member_id)
            .await
    }

    async fn set_account_blocked(
        &self,
        platform: Platform,
        account_id: &str,
        blocked: bool,
    ) -> Result<(), CourierError> {
        self.inner
            .set_account_blocked(platform, account_id, blocked)
            .await
    }

    async fn get_chat(&self, platform: Platform, id: &str) -> Result<Option<Chat>, CourierError> {
        self.inner.get_chat(platform, id).await
    }

    async fn get_or_create_chat(&self, chat: Chat) -> Result<(Chat, bool), CourierError> {
        self.inner.get_or_create_chat(chat).await
    }

    async fn add_chat_member(
        &self,
        platform: Platform,
        chat_id: &str,
        account_id: &str,
    ) -> Result<bool, CourierError> {
        self.inner.add_chat_member(platform, chat_id, account_id).await
    }

    async fn is_chat_member(
        &self,
        platform: Platform,
        chat_id: &str,
        account_id: &str,
    ) -> Result<bool, CourierError> {
        self.inner.is_chat_member(platform, chat_id, account_id).await
    }

    async fn get_message(
        &self,
        platform: Platform,
        id: &str,
    ) -> Result<Option<Message>, CourierError> {
        self.inner.get_message(platform, id).await
    }

    async fn insert_message(&self, message: Message) -> Result<(Message, bool), CourierError> {
        self.inner.insert_message(message).await
    }

    async fn chat_messages(
        &self,
        platform: Platform,
        chat_id: &str,
    ) -> Result<Vec<Message>, CourierError> {
        self.inner.chat_messages(platform, chat_id).await
    }

    async fn record_delivery(
        &self,
        platform: Platform,
        message_id: &str,
        event: DeliveryEvent,
        at: DateTime<Utc>,
    ) -> Result<(), CourierError> {
        self.inner
            .record_delivery(platform, message_id, event, at)
            .await
    }

    async fn record_tracking(
        &self,
        tracking_id: &str,
        event: TrackingEvent,
        at: DateTime<Utc>,
    ) -> Result<Message, CourierError> {
        self.inner.record_tracking(tracking_id, event, at).await
    }

    async fn set_message_media(
        &self,
        platform: Platform,
        message_id: &str,
        media: MediaBlob,
        media_type: MediaType,
    ) -> Result<(), CourierError> {
        self.inner
            .set_message_media(platform, message_id, media, media_type)
            .await
    }

    async fn save_inline_image(&self, image: InlineImage) -> Result<InlineImage, CourierError> {
        self.inner.save_inline_image(image).await
    }

    async fn get_inline_image(&self, short_id: &str) -> Result<Option<InlineImage>, CourierError> {
        self.inner.get_inline_image(short_id).await
    }

    async fn refresh_chat_cache(
        &self,
        platform: Platform,
        chat_id: &str,
    ) -> Result<ChatCache, CourierError> {
        self.inner.refresh_chat_cache(platform, chat_id).await
    }
}

#[async_trait]
impl RequestStore for FaultyStore {
    async fn insert_request(&self, request: Request) -> Result<(Request, bool), CourierError> {
        self.inner.insert_request(request).await
    }

    async fn get_request(&self, id: &str) -> Result<Option<Request>, CourierError> {
        self.inner.get_request(id).await
    }

    async fn request_for_message(
        &self,
        platform: Platform,
        message_id: &str,
    ) -> Result<Option<Request>, CourierError> {
        self.inner.request_for_message(platform, message_id).await
    }

    async fn update_request(&self, request: &Request) -> Result<(), CourierError> {
        self.inner.update_request(request).await
    }

    async fn get_category(&self, id: &str) -> Result<Option<RequestCategory>, CourierError> {
        self.category_fault()?;
        self.inner.get_category(id).await
    }

    async fn child_categories(
        &self,
        parent_id: Option<&str>,
    ) -> Result<Vec<RequestCategory>, CourierError> {
        self.category_fault()?;
        self.inner.child_categories(parent_id).await
    }

    async fn save_category(&self, category: &RequestCategory) -> Result<(), CourierError> {
        self.inner.save_category(category).await
    }

    async fn get_member(&self, id: &str) -> Result<Option<Member>, CourierError> {
        self.inner.get_member(id).await
    }

    async fn save_member(&self, member: &Member) -> Result<(), CourierError> {
        self.inner.save_member(member).await
    }

    async fn find_members_by_contact(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Result<Vec<Member>, CourierError> {
        self.inner.find_members_by_contact(email, phone).await
    }
}

#[async_trait]
impl CrmStore for FaultyStore {
    async fn get_communication(&self, id: &str) -> Result<Option<Communication>, CourierError> {
        self.inner.get_communication(id).await
    }

    async fn save_communication(&self, communication: &Communication) -> Result<(), CourierError> {
        self.inner.save_communication(communication).await
    }

    async fn get_or_create_delivery(
        &self,
        communication_id: &str,
        contact_id: &str,
    ) -> Result<(CommunicationDelivery, bool), CourierError> {
        self.inner
            .get_or_create_delivery(communication_id, contact_id)
            .await
    }

    async fn save_delivery(&self, delivery: &CommunicationDelivery) -> Result<(), CourierError> {
        self.inner.save_delivery(delivery).await
    }

    async fn get_draft(&self, id: &str) -> Result<Option<DraftMessage>, CourierError> {
        self.inner.get_draft(id).await
    }

    async fn save_draft(&self, draft: &DraftMessage) -> Result<(), CourierError> {
        self.inner.save_draft(draft).await
    }

    async fn due_drafts(&self, now: DateTime<Utc>) -> Result<Vec<DraftMessage>, CourierError> {
        self.inner.due_drafts(now).await
    }
}
