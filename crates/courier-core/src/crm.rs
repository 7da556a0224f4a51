// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bulk-communication entities: communications, contacts, deliveries and drafts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::types::Metadata;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CommunicationStatus {
    #[default]
    Draft,
    Scheduled,
    Sent,
    Cancelled,
}

/// Content template a communication is rendered from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunicationTemplate {
    pub content: String,
    pub title: Option<String>,
    pub description: Option<String>,
}

/// One template fanned out to a segment of contacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Communication {
    pub id: String,
    /// Channel the drafts are sent through. Required before drafts are generated.
    pub channel_id: Option<String>,
    pub template: CommunicationTemplate,
    pub subject_template: Option<String>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub status: CommunicationStatus,
    pub initiated_by: Option<String>,
}

impl Communication {
    /// Subject template with fallbacks: explicit subject, template title,
    /// template description, then a generated label.
    pub fn subject_source(&self) -> String {
        [
            self.subject_template.as_deref(),
            self.template.title.as_deref(),
            self.template.description.as_deref(),
        ]
        .into_iter()
        .flatten()
        .find(|s| !s.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Communication {}", self.id))
    }
}

/// A CRM contact that can receive communications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    /// Extra attributes exposed to template rendering.
    pub attributes: Metadata,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DraftStatus {
    #[default]
    Draft,
    Scheduled,
    Sent,
    Failed,
}

/// An outgoing email waiting for its send time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftMessage {
    pub id: String,
    pub channel_id: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    pub status: DraftStatus,
    pub is_approved: bool,
    pub send_at: DateTime<Utc>,
    pub created_by: Option<String>,
    /// Message produced when the draft was sent.
    pub sent_message_id: Option<String>,
    pub error: Option<String>,
}

/// Link between a communication and one contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunicationDelivery {
    pub communication_id: String,
    pub contact_id: String,
    pub draft_id: Option<String>,
    pub metadata: Metadata,
}

impl CommunicationDelivery {
    pub fn new(communication_id: impl Into<String>, contact_id: impl Into<String>) -> Self {
        Self {
            communication_id: communication_id.into(),
            contact_id: contact_id.into(),
            draft_id: None,
            metadata: Metadata::new(),
        }
    }

    /// Append a human-readable problem to the delivery's `errors` list.
    pub fn push_error(&mut self, error: impl Into<String>) {
        let entry = self
            .metadata
            .entry("errors")
            .or_insert_with(|| serde_json::Value::Array(Vec::new()));
        if !entry.is_array() {
            *entry = serde_json::Value::Array(Vec::new());
        }
        if let serde_json::Value::Array(list) = entry {
            list.push(serde_json::Value::String(error.into()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn communication() -> Communication {
        Communication {
            id: "42".into(),
            channel_id: Some("newsletter".into()),
            template: CommunicationTemplate::default(),
            subject_template: None,
            scheduled_for: None,
            status: CommunicationStatus::Draft,
            initiated_by: None,
        }
    }

    #[test]
    fn subject_falls_back_through_template_fields() {
        let mut comm = communication();
        assert_eq!(comm.subject_source(), "Communication 42");
        comm.template.description = Some("Monthly digest".into());
        assert_eq!(comm.subject_source(), "Monthly digest");
        comm.template.title = Some("Digest".into());
        assert_eq!(comm.subject_source(), "Digest");
        comm.subject_template = Some("Hello {{ name }}".into());
        assert_eq!(comm.subject_source(), "Hello {{ name }}");
    }

    #[test]
    fn delivery_errors_accumulate() {
        let mut delivery = CommunicationDelivery::new("42", "c1");
        delivery.push_error("No email address on contact.");
        delivery.push_error("again");
        let errors = delivery.metadata["errors"].as_array().unwrap();
        assert_eq!(errors.len(), 2);
    }
}
