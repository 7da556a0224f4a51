// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound transports and the inbound email sink.

use async_trait::async_trait;

use crate::error::CourierError;
use crate::inbound::{InboundChatMessage, MediaRef};
use crate::intent::{ChatDelivery, DeliveryReceipt, Envelope, MailEndpoint};
use crate::types::{MediaBlob, Message, Platform};

/// Sends a pre-built RFC 5322 message over SMTP.
#[async_trait]
pub trait MailTransport: Send + Sync + 'static {
    /// Deliver `message` exactly as given.
    async fn send_raw(
        &self,
        endpoint: &MailEndpoint,
        envelope: &Envelope,
        message: &[u8],
    ) -> Result<(), CourierError>;
}

/// Provider API of a chat-style platform, bound to one channel.
#[async_trait]
pub trait ChatTransport: Send + Sync + 'static {
    fn platform(&self) -> Platform;

    async fn deliver(&self, delivery: &ChatDelivery) -> Result<DeliveryReceipt, CourierError>;
}

/// Downloads provider-hosted media referenced by an inbound chat message.
#[async_trait]
pub trait MediaFetcher: Send + Sync + 'static {
    async fn fetch(&self, media: &MediaRef) -> Result<MediaBlob, CourierError>;
}

/// Accepts messages received by a chat adapter.
#[async_trait]
pub trait ChatSink: Send + Sync + 'static {
    async fn accept_chat(&self, message: InboundChatMessage) -> Result<Message, CourierError>;
}

/// Accepts raw email bytes fetched for one channel.
#[async_trait]
pub trait RawEmailSink: Send + Sync + 'static {
    async fn accept(&self, raw: &[u8], uid: Option<u32>) -> Result<Message, CourierError>;
}
