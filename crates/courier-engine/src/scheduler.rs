// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Communication Scheduler: fans a communication out into per-contact
//! email drafts and sends the drafts that are due.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_core::crm::{
    Communication, CommunicationStatus, Contact, DraftMessage, DraftStatus,
};
use courier_core::{CourierError, MessageIntent, Store};
use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::dispatch::Dispatcher;

/// Resolves the contacts a communication is addressed to.
#[async_trait]
pub trait SegmentResolver: Send + Sync {
    async fn contacts(&self, communication: &Communication) -> Result<Vec<Contact>, CourierError>;
}

/// Renders a template string for one contact.
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template: &str, contact: &Contact) -> Result<String, CourierError>;
}

static RE_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.]*)\s*\}\}").unwrap());

/// Replaces `{{ name }}`, `{{ email }}`, `{{ id }}` and `{{ <attribute> }}`
/// with the contact's values. Unknown placeholders render empty.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderRenderer;

impl TemplateRenderer for PlaceholderRenderer {
    fn render(&self, template: &str, contact: &Contact) -> Result<String, CourierError> {
        let rendered = RE_PLACEHOLDER.replace_all(template, |caps: &regex::Captures<'_>| {
            let key = &caps[1];
            match key {
                "id" => contact.id.clone(),
                "name" => contact.name.clone().unwrap_or_default(),
                "email" => contact.email.clone().unwrap_or_default(),
                _ => match contact.attributes.get(key) {
                    Some(serde_json::Value::String(s)) => s.clone(),
                    Some(serde_json::Value::Null) | None => String::new(),
                    Some(other) => other.to_string(),
                },
            }
        });
        Ok(rendered.into_owned())
    }
}

/// Outcome of [`CommunicationScheduler::generate_drafts`].
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct DraftReport {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// Outcome of [`CommunicationScheduler::send_due_drafts`].
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SendReport {
    pub sent: usize,
    pub failed: usize,
}

pub struct CommunicationScheduler {
    store: Arc<dyn Store>,
    dispatcher: Arc<Dispatcher>,
    segments: Arc<dyn SegmentResolver>,
    renderer: Arc<dyn TemplateRenderer>,
}

impl CommunicationScheduler {
    pub fn new(
        store: Arc<dyn Store>,
        dispatcher: Arc<Dispatcher>,
        segments: Arc<dyn SegmentResolver>,
        renderer: Arc<dyn TemplateRenderer>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            segments,
            renderer,
        }
    }

    /// Create or refresh one approved draft per contact of `communication_id`.
    ///
    /// Contacts without an email address are skipped and the reason is kept
    /// on their delivery record. Drafts that were already sent are left
    /// alone. The communication is marked scheduled afterwards.
    pub async fn generate_drafts(&self, communication_id: &str) -> Result<DraftReport, CourierError> {
        let mut communication = self
            .store
            .get_communication(communication_id)
            .await?
            .ok_or_else(|| CourierError::not_found("communication", communication_id))?;
        let channel_id = communication.channel_id.clone().ok_or_else(|| {
            CourierError::Validation(format!(
                "communication {communication_id} has no channel to send through"
            ))
        })?;

        let contacts = self.segments.contacts(&communication).await?;
        let send_at = communication.scheduled_for.unwrap_or_else(Utc::now);
        let subject_template = communication.subject_source();
        let mut report = DraftReport::default();

        for contact in contacts {
            let (mut delivery, _) = self
                .store
                .get_or_create_delivery(&communication.id, &contact.id)
                .await?;

            let Some(email) = contact.email.as_deref().map(str::trim).filter(|e| !e.is_empty())
            else {
                delivery.push_error("No email address on contact.");
                self.store.save_delivery(&delivery).await?;
                report.skipped += 1;
                continue;
            };

            let rendered = self
                .renderer
                .render(&communication.template.content, &contact)
                .and_then(|html| {
                    self.renderer
                        .render(&subject_template, &contact)
                        .map(|subject| (subject, html))
                });
            let (subject, html) = match rendered {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(communication = %communication.id, contact = %contact.id, error = %e, "template rendering failed");
                    delivery.push_error(format!("Rendering failed: {e}"));
                    self.store.save_delivery(&delivery).await?;
                    report.errors += 1;
                    continue;
                }
            };

            let existing = match delivery.draft_id.as_deref() {
                Some(id) => self.store.get_draft(id).await?,
                None => None,
            };
            let draft = match existing {
                Some(draft) if draft.status == DraftStatus::Sent => {
                    report.skipped += 1;
                    continue;
                }
                Some(mut draft) => {
                    draft.channel_id = channel_id.clone();
                    draft.to = vec![email.to_string()];
                    draft.subject = subject;
                    draft.html = html;
                    draft.status = DraftStatus::Scheduled;
                    draft.is_approved = true;
                    draft.send_at = send_at;
                    draft.error = None;
                    report.updated += 1;
                    draft
                }
                None => {
                    report.created += 1;
                    DraftMessage {
                        id: uuid::Uuid::new_v4().to_string(),
                        channel_id: channel_id.clone(),
                        to: vec![email.to_string()],
                        subject,
                        html,
                        status: DraftStatus::Scheduled,
                        is_approved: true,
                        send_at,
                        created_by: communication.initiated_by.clone(),
                        sent_message_id: None,
                        error: None,
                    }
                }
            };
            self.store.save_draft(&draft).await?;
            delivery.draft_id = Some(draft.id);
            self.store.save_delivery(&delivery).await?;
        }

        communication.status = CommunicationStatus::Scheduled;
        self.store.save_communication(&communication).await?;
        info!(
            communication = %communication.id,
            created = report.created,
            updated = report.updated,
            skipped = report.skipped,
            errors = report.errors,
            "drafts generated"
        );
        Ok(report)
    }

    /// Send every approved scheduled draft whose send time has passed.
    ///
    /// Each draft ends up `sent` with the message id, or `failed` with the
    /// error. One failing draft does not stop the others.
    pub async fn send_due_drafts(&self, now: DateTime<Utc>) -> Result<SendReport, CourierError> {
        let mut report = SendReport::default();
        for mut draft in self.store.due_drafts(now).await? {
            let mut intent = MessageIntent::html(draft.html.clone()).subject(draft.subject.clone());
            intent.to = draft.to.clone();

            match self
                .dispatcher
                .send(&draft.channel_id, &intent, draft.created_by.as_deref())
                .await
            {
                Ok(message) => {
                    draft.status = DraftStatus::Sent;
                    draft.sent_message_id = Some(message.id);
                    draft.error = None;
                    report.sent += 1;
                }
                Err(e) => {
                    warn!(draft = %draft.id, channel = %draft.channel_id, error = %e, "draft send failed");
                    draft.status = DraftStatus::Failed;
                    draft.error = Some(e.to_string());
                    report.failed += 1;
                }
            }
            self.store.save_draft(&draft).await?;
        }
        if report.sent + report.failed > 0 {
            info!(sent = report.sent, failed = report.failed, "due drafts processed");
        }
        Ok(report)
    }
}
