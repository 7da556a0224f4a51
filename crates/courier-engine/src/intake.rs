// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Opening a [`Request`] for every incoming message.

use std::sync::Arc;

use async_trait::async_trait;
use courier_core::{
    ChatSink, CourierError, InboundChatMessage, Message, Platform, RawEmailSink, Request, Store,
};
use tracing::{info, warn};

use crate::triage::RequestEngine;

/// Open the request for an incoming `message`. Idempotent per message.
///
/// The sender address becomes the contact email on email requests and the
/// sender id the contact phone on WhatsApp. A sender account that is already
/// linked to a member carries that link and the member's contact details
/// over.
pub async fn open_request(
    store: &dyn Store,
    message: &Message,
) -> Result<(Request, bool), CourierError> {
    if !message.is_incoming() {
        return Err(CourierError::Validation(format!(
            "message {} is not incoming, no request is opened",
            message.id
        )));
    }
    if let Some(existing) = store.request_for_message(message.platform, &message.id).await? {
        return Ok((existing, false));
    }

    let mut request = Request::new(
        message.platform,
        message.id.clone(),
        message.sender_id.clone(),
        message.channel_id.clone(),
    );
    match message.platform {
        Platform::Email => request.email = Some(message.sender_id.clone()),
        Platform::WhatsApp => request.phone = Some(message.sender_id.clone()),
        Platform::Telegram | Platform::WebChat => {}
    }

    let member_id = store
        .get_account(message.platform, &message.sender_id)
        .await?
        .and_then(|a| a.member_id);
    if let Some(member_id) = member_id {
        if let Some(member) = store.get_member(&member_id).await? {
            request.email = request.email.or(member.email);
            request.phone = request.phone.or(member.phone);
        }
        request.member_id = Some(member_id);
    }

    let (request, created) = store.insert_request(request).await?;
    if created {
        info!(
            request_id = %request.id,
            platform = %request.platform,
            message_id = %request.message_id,
            "opened request"
        );
    }
    Ok((request, created))
}

/// Wraps a sink so each incoming message it stores also opens a request.
///
/// Works for both the email ingestor and [`ChatIngest`](crate::ChatIngest).
/// With an engine attached, a newly opened request is triaged right away.
pub struct RequestOpeningSink<S> {
    inner: S,
    store: Arc<dyn Store>,
    engine: Option<Arc<RequestEngine>>,
}

impl<S> RequestOpeningSink<S> {
    pub fn new(inner: S, store: Arc<dyn Store>) -> Self {
        Self {
            inner,
            store,
            engine: None,
        }
    }

    /// Identify and categorize every request this sink opens.
    pub fn with_engine(mut self, engine: Arc<RequestEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    async fn open_for(&self, message: Message) -> Result<Message, CourierError> {
        if !message.is_incoming() {
            return Ok(message);
        }
        let (mut request, created) = open_request(self.store.as_ref(), &message).await?;
        if let (true, Some(engine)) = (created, &self.engine) {
            // The message is already stored; a triage failure must not make
            // the transport redeliver it.
            if let Err(e) = engine.triage(&mut request).await {
                warn!(request_id = %request.id, error = %e, "request triage failed");
            }
        }
        Ok(message)
    }
}

#[async_trait]
impl<S> RawEmailSink for RequestOpeningSink<S>
where
    S: RawEmailSink,
{
    async fn accept(&self, raw: &[u8], uid: Option<u32>) -> Result<Message, CourierError> {
        let message = self.inner.accept(raw, uid).await?;
        self.open_for(message).await
    }
}

#[async_trait]
impl<S> ChatSink for RequestOpeningSink<S>
where
    S: ChatSink,
{
    async fn accept_chat(&self, message: InboundChatMessage) -> Result<Message, CourierError> {
        let message = self.inner.accept_chat(message).await?;
        self.open_for(message).await
    }
}
