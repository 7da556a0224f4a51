// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Platform-independent workflows of the Courier messaging layer.
//!
//! - [`ChatIngest`]: stores messages from every chat adapter.
//! - [`Dispatcher`]: sends a [`MessageIntent`](courier_core::MessageIntent) on any channel.
//! - [`open_request`] and [`RequestEngine`]: request intake, member
//!   identification, categorization and processing.
//! - [`webchat`]: the web chat adapter.
//! - [`CommunicationScheduler`]: bulk drafts and their timed sending.

pub mod chat_ingest;
pub mod dispatch;
pub mod handlers;
pub mod intake;
pub mod scheduler;
pub mod triage;
pub mod webchat;

pub use chat_ingest::ChatIngest;
pub use dispatch::Dispatcher;
pub use handlers::{CategoryHandler, HandlerRegistry, MATCH_KEY, match_decision};
pub use intake::{RequestOpeningSink, open_request};
pub use scheduler::{
    CommunicationScheduler, DraftReport, PlaceholderRenderer, SegmentResolver, SendReport,
    TemplateRenderer,
};
pub use triage::{CATEGORIZATION_ERRORS_KEY, MEMBER_IDENTIFICATION_KEY, RequestEngine};
pub use webchat::{WebChatPost, WebChatTransport, save_webchat_message};
