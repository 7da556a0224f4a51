// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Courier messaging layer.
//!
//! This crate provides the canonical data model (accounts, chats, messages,
//! requests), the error type, and the traits that storage backends and
//! platform transports implement. It has no I/O of its own.

pub mod crm;
pub mod error;
pub mod inbound;
pub mod intent;
pub mod request;
pub mod thread;
pub mod traits;
pub mod types;

pub use error::CourierError;
pub use inbound::{DeliveryUpdate, InboundChatMessage, InboundSender, MediaRef};
pub use intent::{Attachment, ChatDelivery, DeliveryReceipt, Envelope, MailEndpoint, MessageIntent};
pub use request::{Member, MemberGroup, Request, RequestCategory, RequestStatus};
pub use types::{
    Account, Chat, ChatCache, DeliveryEvent, DeliveryState, Direction, InlineImage, MediaBlob,
    MediaType, Message, Metadata, Platform, Tracking, TrackingEvent,
};

pub use traits::{
    ChatSink, ChatTransport, CrmStore, IdleOutcome, MailTransport, MailboxConnector, MailboxSession,
    MediaFetcher, MessageStore, RawEmailSink, RequestStore, Store,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_traits_are_object_safe() {
        fn _store(_: &dyn Store) {}
        fn _mailbox(_: &dyn MailboxSession) {}
        fn _connector(_: &dyn MailboxConnector) {}
        fn _mail(_: &dyn MailTransport) {}
        fn _chat(_: &dyn ChatTransport) {}
        fn _sink(_: &dyn RawEmailSink) {}
        fn _media(_: &dyn MediaFetcher) {}
    }
}
