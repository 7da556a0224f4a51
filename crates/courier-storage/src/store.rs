// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed implementation of the core repository traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_config::model::StorageConfig;
use courier_core::crm::{Communication, CommunicationDelivery, DraftMessage};
use courier_core::{
    Account, Chat, ChatCache, CourierError, CrmStore, DeliveryEvent, InlineImage, MediaBlob,
    MediaType, Member, Message, MessageStore, Platform, Request, RequestCategory, RequestStore,
    TrackingEvent,
};

use crate::database::Database;
use crate::queries::{accounts, chats, crm, images, members, messages, requests};

/// Repository over a single SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Open the database named by the storage configuration.
    pub async fn open(config: &StorageConfig) -> Result<Self, CourierError> {
        Ok(Self::new(Database::open(&config.database_path).await?))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub async fn close(self) -> Result<(), CourierError> {
        self.db.close().await
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn get_account(
        &self,
        platform: Platform,
        id: &str,
    ) -> Result<Option<Account>, CourierError> {
        accounts::get_account(&self.db, platform, id).await
    }

    async fn get_or_create_account(
        &self,
        account: Account,
    ) -> Result<(Account, bool), CourierError> {
        accounts::get_or_create_account(&self.db, account).await
    }

    async fn set_account_member(
        &self,
        platform: Platform,
        account_id: &str,
        member_id: &str,
    ) -> Result<(), CourierError> {
        accounts::set_account_member(&self.db, platform, account_id, member_id).await
    }

    async fn set_account_blocked(
        &self,
        platform: Platform,
        account_id: &str,
        blocked: bool,
    ) -> Result<(), CourierError> {
        accounts::set_account_blocked(&self.db, platform, account_id, blocked).await
    }

    async fn get_chat(&self, platform: Platform, id: &str) -> Result<Option<Chat>, CourierError> {
        chats::get_chat(&self.db, platform, id).await
    }

    async fn get_or_create_chat(&self, chat: Chat) -> Result<(Chat, bool), CourierError> {
        chats::get_or_create_chat(&self.db, chat).await
    }

    async fn add_chat_member(
        &self,
        platform: Platform,
        chat_id: &str,
        account_id: &str,
    ) -> Result<bool, CourierError> {
        chats::add_chat_member(&self.db, platform, chat_id, account_id).await
    }

    async fn is_chat_member(
        &self,
        platform: Platform,
        chat_id: &str,
        account_id: &str,
    ) -> Result<bool, CourierError> {
        chats::is_chat_member(&self.db, platform, chat_id, account_id).await
    }

    async fn get_message(
        &self,
        platform: Platform,
        id: &str,
    ) -> Result<Option<Message>, CourierError> {
        messages::get_message(&self.db, platform, id).await
    }

    async fn insert_message(&self, message: Message) -> Result<(Message, bool), CourierError> {
        messages::insert_message(&self.db, message).await
    }

    async fn chat_messages(
        &self,
        platform: Platform,
        chat_id: &str,
    ) -> Result<Vec<Message>, CourierError> {
        messages::chat_messages(&self.db, platform, chat_id).await
    }

    async fn record_delivery(
        &self,
        platform: Platform,
        message_id: &str,
        event: DeliveryEvent,
        at: DateTime<Utc>,
    ) -> Result<(), CourierError> {
        messages::record_delivery(&self.db, platform, message_id, event, at).await
    }

    async fn record_tracking(
        &self,
        tracking_id: &str,
        event: TrackingEvent,
        at: DateTime<Utc>,
    ) -> Result<Message, CourierError> {
        messages::record_tracking(&self.db, tracking_id, event, at).await
    }

    async fn set_message_media(
        &self,
        platform: Platform,
        message_id: &str,
        media: MediaBlob,
        media_type: MediaType,
    ) -> Result<(), CourierError> {
        messages::set_message_media(&self.db, platform, message_id, media, media_type).await
    }

    async fn save_inline_image(&self, image: InlineImage) -> Result<InlineImage, CourierError> {
        images::save_inline_image(&self.db, image).await
    }

    async fn get_inline_image(&self, short_id: &str) -> Result<Option<InlineImage>, CourierError> {
        images::get_inline_image(&self.db, short_id).await
    }

    async fn refresh_chat_cache(
        &self,
        platform: Platform,
        chat_id: &str,
    ) -> Result<ChatCache, CourierError> {
        chats::refresh_chat_cache(&self.db, platform, chat_id).await
    }
}

#[async_trait]
impl RequestStore for SqliteStore {
    async fn insert_request(&self, request: Request) -> Result<(Request, bool), CourierError> {
        requests::insert_request(&self.db, request).await
    }

    async fn get_request(&self, id: &str) -> Result<Option<Request>, CourierError> {
        requests::get_request(&self.db, id).await
    }

    async fn request_for_message(
        &self,
        platform: Platform,
        message_id: &str,
    ) -> Result<Option<Request>, CourierError> {
        requests::request_for_message(&self.db, platform, message_id).await
    }

    async fn update_request(&self, request: &Request) -> Result<(), CourierError> {
        requests::update_request(&self.db, request).await
    }

    async fn get_category(&self, id: &str) -> Result<Option<RequestCategory>, CourierError> {
        requests::get_category(&self.db, id).await
    }

    async fn child_categories(
        &self,
        parent_id: Option<&str>,
    ) -> Result<Vec<RequestCategory>, CourierError> {
        requests::child_categories(&self.db, parent_id).await
    }

    async fn save_category(&self, category: &RequestCategory) -> Result<(), CourierError> {
        requests::save_category(&self.db, category).await
    }

    async fn get_member(&self, id: &str) -> Result<Option<Member>, CourierError> {
        members::get_member(&self.db, id).await
    }

    async fn save_member(&self, member: &Member) -> Result<(), CourierError> {
        members::save_member(&self.db, member).await
    }

    async fn find_members_by_contact(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Result<Vec<Member>, CourierError> {
        members::find_members_by_contact(&self.db, email, phone).await
    }
}

#[async_trait]
impl CrmStore for SqliteStore {
    async fn get_communication(&self, id: &str) -> Result<Option<Communication>, CourierError> {
        crm::get_communication(&self.db, id).await
    }

    async fn save_communication(&self, communication: &Communication) -> Result<(), CourierError> {
        crm::save_communication(&self.db, communication).await
    }

    async fn get_or_create_delivery(
        &self,
        communication_id: &str,
        contact_id: &str,
    ) -> Result<(CommunicationDelivery, bool), CourierError> {
        crm::get_or_create_delivery(&self.db, communication_id, contact_id).await
    }

    async fn save_delivery(&self, delivery: &CommunicationDelivery) -> Result<(), CourierError> {
        crm::save_delivery(&self.db, delivery).await
    }

    async fn get_draft(&self, id: &str) -> Result<Option<DraftMessage>, CourierError> {
        crm::get_draft(&self.db, id).await
    }

    async fn save_draft(&self, draft: &DraftMessage) -> Result<(), CourierError> {
        crm::save_draft(&self.db, draft).await
    }

    async fn due_drafts(&self, now: DateTime<Utc>) -> Result<Vec<DraftMessage>, CourierError> {
        crm::due_drafts(&self.db, now).await
    }
}
