// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Repository traits for the durable store.
//!
//! Every write that can race with a duplicate delivery is a get-or-create
//! returning `(entity, created)`. Implementations must make message insertion
//! and the owning chat's cache refresh a single atomic step.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::crm::{Communication, CommunicationDelivery, DraftMessage};
use crate::error::CourierError;
use crate::request::{Member, Request, RequestCategory};
use crate::types::{
    Account, Chat, ChatCache, DeliveryEvent, InlineImage, MediaBlob, MediaType, Message, Platform,
    TrackingEvent,
};

/// Accounts, chats, memberships, messages and inline images.
#[async_trait]
pub trait MessageStore: Send + Sync + 'static {
    async fn get_account(
        &self,
        platform: Platform,
        id: &str,
    ) -> Result<Option<Account>, CourierError>;

    /// Insert `account` unless `(platform, id)` exists. Returns the stored row.
    async fn get_or_create_account(
        &self,
        account: Account,
    ) -> Result<(Account, bool), CourierError>;

    async fn set_account_member(
        &self,
        platform: Platform,
        account_id: &str,
        member_id: &str,
    ) -> Result<(), CourierError>;

    async fn set_account_blocked(
        &self,
        platform: Platform,
        account_id: &str,
        blocked: bool,
    ) -> Result<(), CourierError>;

    async fn get_chat(&self, platform: Platform, id: &str) -> Result<Option<Chat>, CourierError>;

    /// Insert `chat` unless `(platform, id)` exists. An existing chat is never renamed.
    async fn get_or_create_chat(&self, chat: Chat) -> Result<(Chat, bool), CourierError>;

    /// Link an account to a chat. Returns whether the link is new.
    async fn add_chat_member(
        &self,
        platform: Platform,
        chat_id: &str,
        account_id: &str,
    ) -> Result<bool, CourierError>;

    async fn is_chat_member(
        &self,
        platform: Platform,
        chat_id: &str,
        account_id: &str,
    ) -> Result<bool, CourierError>;

    async fn get_message(
        &self,
        platform: Platform,
        id: &str,
    ) -> Result<Option<Message>, CourierError>;

    /// Insert `message` unless `(platform, id)` exists, refreshing the chat
    /// cache in the same step. An existing row is returned unchanged.
    async fn insert_message(&self, message: Message) -> Result<(Message, bool), CourierError>;

    /// Messages of a chat, oldest first.
    async fn chat_messages(
        &self,
        platform: Platform,
        chat_id: &str,
    ) -> Result<Vec<Message>, CourierError>;

    async fn record_delivery(
        &self,
        platform: Platform,
        message_id: &str,
        event: DeliveryEvent,
        at: DateTime<Utc>,
    ) -> Result<(), CourierError>;

    /// Apply an open or click to the message with `tracking_id`.
    async fn record_tracking(
        &self,
        tracking_id: &str,
        event: TrackingEvent,
        at: DateTime<Utc>,
    ) -> Result<Message, CourierError>;

    /// Backfill media on an existing message.
    async fn set_message_media(
        &self,
        platform: Platform,
        message_id: &str,
        media: MediaBlob,
        media_type: MediaType,
    ) -> Result<(), CourierError>;

    /// Store an inline image. The same bytes for the same message are stored
    /// once; the existing record is returned on repeat.
    async fn save_inline_image(&self, image: InlineImage) -> Result<InlineImage, CourierError>;

    async fn get_inline_image(&self, short_id: &str) -> Result<Option<InlineImage>, CourierError>;

    /// Recompute the denormalized pointers of a chat from its messages.
    async fn refresh_chat_cache(
        &self,
        platform: Platform,
        chat_id: &str,
    ) -> Result<ChatCache, CourierError>;
}

/// Requests, categories and members.
#[async_trait]
pub trait RequestStore: Send + Sync + 'static {
    /// Insert a request unless one exists for the same message.
    async fn insert_request(&self, request: Request) -> Result<(Request, bool), CourierError>;

    async fn get_request(&self, id: &str) -> Result<Option<Request>, CourierError>;

    async fn request_for_message(
        &self,
        platform: Platform,
        message_id: &str,
    ) -> Result<Option<Request>, CourierError>;

    async fn update_request(&self, request: &Request) -> Result<(), CourierError>;

    async fn get_category(&self, id: &str) -> Result<Option<RequestCategory>, CourierError>;

    /// All categories directly under `parent_id` (roots when `None`), ordered by sequence.
    async fn child_categories(
        &self,
        parent_id: Option<&str>,
    ) -> Result<Vec<RequestCategory>, CourierError>;

    /// Insert or replace a category. Duplicate sibling sequences and ancestor
    /// cycles are rejected with a validation error.
    async fn save_category(&self, category: &RequestCategory) -> Result<(), CourierError>;

    async fn get_member(&self, id: &str) -> Result<Option<Member>, CourierError>;

    async fn save_member(&self, member: &Member) -> Result<(), CourierError>;

    /// Members whose email equals `email` or whose phone equals `phone`.
    async fn find_members_by_contact(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Result<Vec<Member>, CourierError>;
}

/// Communications, deliveries and draft messages.
#[async_trait]
pub trait CrmStore: Send + Sync + 'static {
    async fn get_communication(&self, id: &str) -> Result<Option<Communication>, CourierError>;

    async fn save_communication(&self, communication: &Communication) -> Result<(), CourierError>;

    async fn get_or_create_delivery(
        &self,
        communication_id: &str,
        contact_id: &str,
    ) -> Result<(CommunicationDelivery, bool), CourierError>;

    async fn save_delivery(&self, delivery: &CommunicationDelivery) -> Result<(), CourierError>;

    async fn get_draft(&self, id: &str) -> Result<Option<DraftMessage>, CourierError>;

    /// Insert or replace a draft.
    async fn save_draft(&self, draft: &DraftMessage) -> Result<(), CourierError>;

    /// Approved, scheduled drafts with `send_at <= now`, earliest first.
    async fn due_drafts(&self, now: DateTime<Utc>) -> Result<Vec<DraftMessage>, CourierError>;
}

/// The full repository surface.
pub trait Store: MessageStore + RequestStore + CrmStore {}

impl<T: MessageStore + RequestStore + CrmStore> Store for T {}
