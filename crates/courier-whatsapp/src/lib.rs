// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WhatsApp Cloud API adapter for Courier.
//!
//! [`webhook`] turns callback payloads into inbound messages and delivery
//! updates; [`transport`] sends text and downloads media over the Graph API.

pub mod transport;
pub mod webhook;

pub use transport::WhatsAppTransport;
pub use webhook::{
    WhatsAppWebhook, delivery_event, parse_webhook, status_updates, whatsapp_to_inbound,
};
