// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound email: MIME building, SMTP send, Sent mirroring, re-ingestion.
//!
//! The sent bytes are fed back through [`EmailIngestor`], so an outgoing
//! message is stored exactly the way it would be if it were fetched from the
//! mailbox later.

use std::sync::{Arc, LazyLock};

use courier_config::ChannelConfig;
use courier_core::{
    CourierError, Envelope, MailEndpoint, MailTransport, MailboxConnector, Message,
    MessageIntent, Platform, Store,
};
use lettre::message::header::ContentType;
use lettre::message::{Attachment as MimeAttachment, Mailbox, MultiPart, SinglePart};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::html::html_to_text;
use crate::ingest::EmailIngestor;
use crate::parser::extract_ids;

static RE_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^\s*(re\s*:\s*)+").unwrap());

/// Subject for a reply to `subject`: exactly one `Re: ` prefix.
pub fn reply_subject(subject: &str) -> String {
    let base = RE_PREFIX.replace(subject.trim(), "");
    format!("Re: {}", base.trim())
}

/// Hook applied to outgoing HTML before the MIME body is built, e.g. to turn
/// icon fonts or SVG into images mail clients can display.
pub trait HtmlRewriter: Send + Sync {
    fn rewrite(&self, html: &str) -> String;
}

/// Sends email for one channel.
pub struct EmailSender {
    channel_id: String,
    address: String,
    smtp: MailEndpoint,
    imap: MailEndpoint,
    sent_folder: String,
    store: Arc<dyn Store>,
    transport: Arc<dyn MailTransport>,
    connector: Arc<dyn MailboxConnector>,
    ingestor: Arc<EmailIngestor>,
    rewriter: Option<Arc<dyn HtmlRewriter>>,
}

/// Threading fields derived from the message being replied to.
struct ReplyContext {
    subject: String,
    in_reply_to: String,
    references: Vec<String>,
    to: Vec<String>,
    cc: Vec<String>,
}

impl EmailSender {
    pub fn new(
        channel: &ChannelConfig,
        store: Arc<dyn Store>,
        transport: Arc<dyn MailTransport>,
        connector: Arc<dyn MailboxConnector>,
        ingestor: Arc<EmailIngestor>,
        sent_folder: impl Into<String>,
    ) -> Result<Self, CourierError> {
        let settings = channel.email_settings()?;
        Ok(Self {
            channel_id: channel.id.clone(),
            address: settings.email_address.trim().to_lowercase(),
            smtp: settings.smtp_endpoint(),
            imap: settings.imap_endpoint(),
            sent_folder: sent_folder.into(),
            store,
            transport,
            connector,
            ingestor,
            rewriter: None,
        })
    }

    pub fn with_rewriter(mut self, rewriter: Arc<dyn HtmlRewriter>) -> Self {
        self.rewriter = Some(rewriter);
        self
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Build, send, mirror and store one email.
    ///
    /// Transport failures are returned. A failure to mirror into the Sent
    /// folder is only logged since the message has already been delivered.
    pub async fn send(
        &self,
        intent: &MessageIntent,
        actor: Option<&str>,
    ) -> Result<Message, CourierError> {
        if !intent.has_content() {
            return Err(CourierError::Validation(
                "email needs text, html or an attachment".into(),
            ));
        }

        let reply = match &intent.reply_to {
            Some(parent_id) => Some(self.reply_context(parent_id).await?),
            None => None,
        };

        let (to, cc) = self.recipients(intent, reply.as_ref());
        let bcc = self.filter_own(&intent.bcc);
        if to.is_empty() && cc.is_empty() && bcc.is_empty() {
            return Err(CourierError::Validation("email has no recipients".into()));
        }

        let subject = match (&intent.subject, &reply) {
            (Some(subject), _) => subject.clone(),
            (None, Some(reply)) => reply.subject.clone(),
            (None, None) => String::new(),
        };

        let message_id = format!("<{}@{}>", uuid::Uuid::new_v4(), self.domain());
        let bytes = self.build_mime(intent, &message_id, &subject, &to, &cc, &bcc, reply.as_ref())?;

        let envelope = Envelope {
            from: self.address.clone(),
            to: to.iter().chain(&cc).chain(&bcc).cloned().collect(),
        };
        self.transport.send_raw(&self.smtp, &envelope, &bytes).await?;
        info!(
            channel = %self.channel_id,
            message_id = %message_id,
            recipients = envelope.to.len(),
            "email sent"
        );

        if let Err(e) = self.mirror_to_sent(&bytes).await {
            warn!(
                channel = %self.channel_id,
                message_id = %message_id,
                folder = %self.sent_folder,
                error = %e,
                "failed to copy sent email into the Sent folder"
            );
        }

        let (message, _) = self.ingestor.ingest_as(&bytes, None, actor).await?;
        Ok(message)
    }

    async fn reply_context(&self, parent_id: &str) -> Result<ReplyContext, CourierError> {
        let Some(parent) = self.store.get_message(Platform::Email, parent_id).await? else {
            warn!(channel = %self.channel_id, parent = parent_id, "reply target not stored, threading by header only");
            return Ok(ReplyContext {
                subject: String::new(),
                in_reply_to: parent_id.to_string(),
                references: vec![parent_id.to_string()],
                to: Vec::new(),
                cc: Vec::new(),
            });
        };

        let mut references = parent.header("References").map(extract_ids).unwrap_or_default();
        if !references.contains(&parent.id) {
            references.push(parent.id.clone());
        }
        let to = if parent.is_incoming() {
            vec![parent.sender_id.clone()]
        } else {
            parent.to.clone()
        };
        Ok(ReplyContext {
            subject: reply_subject(parent.subject.as_deref().unwrap_or_default()),
            in_reply_to: parent.id.clone(),
            references,
            to,
            cc: parent.cc.clone(),
        })
    }

    /// Explicit recipients win; otherwise reply to the parent's side of the conversation.
    fn recipients(
        &self,
        intent: &MessageIntent,
        reply: Option<&ReplyContext>,
    ) -> (Vec<String>, Vec<String>) {
        if !intent.to.is_empty() {
            return (self.filter_own(&intent.to), self.filter_own(&intent.cc));
        }
        let Some(reply) = reply else {
            return (Vec::new(), self.filter_own(&intent.cc));
        };
        let to = self.filter_own(&reply.to);
        let cc: Vec<String> = reply.cc.iter().chain(&intent.cc).cloned().collect();
        let cc = self
            .filter_own(&cc)
            .into_iter()
            .filter(|a| !to.contains(a))
            .collect();
        (to, cc)
    }

    /// Lowercase, drop our own address and duplicates.
    fn filter_own(&self, addresses: &[String]) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for address in addresses {
            let address = address.trim().to_lowercase();
            if address.is_empty() || address == self.address || out.contains(&address) {
                continue;
            }
            out.push(address);
        }
        out
    }

    fn domain(&self) -> &str {
        self.address
            .rsplit_once('@')
            .map(|(_, domain)| domain)
            .unwrap_or("courier.local")
    }

    #[allow(clippy::too_many_arguments)]
    fn build_mime(
        &self,
        intent: &MessageIntent,
        message_id: &str,
        subject: &str,
        to: &[String],
        cc: &[String],
        bcc: &[String],
        reply: Option<&ReplyContext>,
    ) -> Result<Vec<u8>, CourierError> {
        let mut builder = lettre::Message::builder()
            .from(mailbox(&self.address)?)
            .subject(subject)
            .message_id(Some(message_id.to_string()))
            .date_now();
        for address in to {
            builder = builder.to(mailbox(address)?);
        }
        for address in cc {
            builder = builder.cc(mailbox(address)?);
        }
        for address in bcc {
            builder = builder.bcc(mailbox(address)?);
        }
        if let Some(reply) = reply {
            builder = builder
                .in_reply_to(reply.in_reply_to.clone())
                .references(reply.references.join(" "));
        }

        let html = intent
            .html
            .as_deref()
            .filter(|h| !h.trim().is_empty())
            .map(|h| match &self.rewriter {
                Some(rewriter) => rewriter.rewrite(h),
                None => h.to_string(),
            });
        let text = match (intent.text.as_deref().filter(|t| !t.trim().is_empty()), &html) {
            (Some(text), _) => text.to_string(),
            (None, Some(html)) => html_to_text(html),
            (None, None) => String::new(),
        };

        let built = if intent.attachments.is_empty() {
            match html {
                Some(html) => builder.multipart(MultiPart::alternative_plain_html(text, html)),
                None => builder.singlepart(SinglePart::plain(text)),
            }
        } else {
            let mut mixed = match html {
                Some(html) => MultiPart::mixed().multipart(MultiPart::alternative_plain_html(text, html)),
                None => MultiPart::mixed().singlepart(SinglePart::plain(text)),
            };
            for attachment in &intent.attachments {
                let content_type = ContentType::parse(&attachment.content_type).map_err(|e| {
                    CourierError::Validation(format!(
                        "attachment `{}` has invalid content type `{}`: {e}",
                        attachment.filename, attachment.content_type
                    ))
                })?;
                mixed = mixed.singlepart(
                    MimeAttachment::new(attachment.filename.clone())
                        .body(attachment.data.clone(), content_type),
                );
            }
            builder.multipart(mixed)
        };
        let message =
            built.map_err(|e| CourierError::Validation(format!("cannot build email: {e}")))?;

        Ok(message.formatted())
    }

    async fn mirror_to_sent(&self, bytes: &[u8]) -> Result<(), CourierError> {
        let mut session = self.connector.connect(&self.imap, &self.sent_folder).await?;
        let appended = session.append(&self.sent_folder, "(\\Seen)", bytes).await;
        if let Err(e) = session.logout().await {
            debug!(channel = %self.channel_id, error = %e, "logout after APPEND failed");
        }
        appended
    }
}

fn mailbox(address: &str) -> Result<Mailbox, CourierError> {
    address
        .parse::<Mailbox>()
        .map_err(|e| CourierError::Validation(format!("invalid email address `{address}`: {e}")))
}
