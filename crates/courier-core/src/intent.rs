// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound message intents and the transport-facing types derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A file to attach to an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Platform-agnostic description of a message to send.
///
/// Email uses the recipient lists and subject; chat platforms use `chat_id`.
/// `reply_to` names an existing message id on the same platform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageIntent {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub chat_id: Option<String>,
    pub subject: Option<String>,
    pub text: Option<String>,
    pub html: Option<String>,
    pub attachments: Vec<Attachment>,
    pub reply_to: Option<String>,
}

impl MessageIntent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn html(html: impl Into<String>) -> Self {
        Self {
            html: Some(html.into()),
            ..Self::default()
        }
    }

    pub fn to(mut self, address: impl Into<String>) -> Self {
        self.to.push(address.into());
        self
    }

    pub fn cc(mut self, address: impl Into<String>) -> Self {
        self.cc.push(address.into());
        self
    }

    pub fn in_chat(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = Some(chat_id.into());
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn replying_to(mut self, message_id: impl Into<String>) -> Self {
        self.reply_to = Some(message_id.into());
        self
    }

    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Whether the intent carries anything to deliver.
    pub fn has_content(&self) -> bool {
        let non_blank = |s: &Option<String>| s.as_deref().is_some_and(|s| !s.trim().is_empty());
        non_blank(&self.text) || non_blank(&self.html) || !self.attachments.is_empty()
    }
}

/// Payload handed to a chat-style transport (Telegram, WhatsApp, web chat).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatDelivery {
    pub chat_id: String,
    pub text: String,
    pub html: Option<String>,
    /// Canonical id of the message being replied to. Transports map it to
    /// the provider's own id.
    pub reply_to: Option<String>,
    pub attachments: Vec<Attachment>,
}

/// Structured confirmation returned by a chat-style provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    /// Canonical message id for the sent message.
    pub message_id: String,
    pub timestamp: DateTime<Utc>,
    pub raw: serde_json::Value,
}

/// Resolved connection settings for one IMAP or SMTP service.
#[derive(Clone, PartialEq, Eq)]
pub struct MailEndpoint {
    pub host: String,
    pub port: u16,
    pub use_ssl: bool,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for MailEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailEndpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("use_ssl", &self.use_ssl)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// SMTP envelope: the addresses used for MAIL FROM and RCPT TO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub from: String,
    pub to: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_check_ignores_blank_text() {
        assert!(!MessageIntent::default().has_content());
        assert!(!MessageIntent::text("   ").has_content());
        assert!(MessageIntent::html("<p>hi</p>").has_content());
        let with_file = MessageIntent::default().attach(Attachment {
            filename: "a.txt".into(),
            content_type: "text/plain".into(),
            data: b"a".to_vec(),
        });
        assert!(with_file.has_content());
    }

    #[test]
    fn endpoint_debug_hides_password() {
        let endpoint = MailEndpoint {
            host: "imap.example.com".into(),
            port: 993,
            use_ssl: true,
            username: "bot@example.com".into(),
            password: "hunter2".into(),
        };
        let rendered = format!("{endpoint:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("REDACTED"));
    }
}
