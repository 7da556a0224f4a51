// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound Dispatcher: one entry point for sending on any channel.
//!
//! Email goes through the channel's [`EmailSender`], which stores the sent
//! copy by parsing its own MIME bytes. Chat platforms return a structured
//! receipt, from which the outgoing message is stored directly.

use std::collections::HashMap;
use std::sync::Arc;

use courier_config::ChannelConfig;
use courier_core::{
    Account, Chat, ChatDelivery, ChatTransport, CourierError, DeliveryEvent, DeliveryUpdate,
    Direction, MediaBlob, MediaType, Message, MessageIntent, Platform, Store, TrackingEvent,
};
use courier_email::EmailSender;
use courier_email::html::html_to_text;
use tracing::{debug, info};

enum Route {
    Email(Arc<EmailSender>),
    Chat(Arc<dyn ChatTransport>),
}

struct Registered {
    channel: ChannelConfig,
    route: Route,
}

/// Routes message intents to the transport registered for their channel.
pub struct Dispatcher {
    store: Arc<dyn Store>,
    channels: HashMap<String, Registered>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            channels: HashMap::new(),
        }
    }

    /// Send email for `channel` through `sender`.
    pub fn register_email(
        &mut self,
        channel: &ChannelConfig,
        sender: Arc<EmailSender>,
    ) -> Result<(), CourierError> {
        if channel.platform != Platform::Email {
            return Err(CourierError::Config(format!(
                "channel `{}` is a {} channel, not email",
                channel.id, channel.platform
            )));
        }
        self.channels.insert(
            channel.id.clone(),
            Registered {
                channel: channel.clone(),
                route: Route::Email(sender),
            },
        );
        Ok(())
    }

    /// Send chat messages for `channel` through `transport`.
    pub fn register_chat(
        &mut self,
        channel: &ChannelConfig,
        transport: Arc<dyn ChatTransport>,
    ) -> Result<(), CourierError> {
        if channel.platform != transport.platform() {
            return Err(CourierError::Config(format!(
                "channel `{}` is a {} channel but the transport sends {}",
                channel.id,
                channel.platform,
                transport.platform()
            )));
        }
        self.channels.insert(
            channel.id.clone(),
            Registered {
                channel: channel.clone(),
                route: Route::Chat(transport),
            },
        );
        Ok(())
    }

    /// Ids of channels that can send, sorted.
    pub fn channels(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.channels.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    fn route(&self, channel_id: &str) -> Result<&Registered, CourierError> {
        let registered = self.channels.get(channel_id).ok_or_else(|| {
            CourierError::Validation(format!("no transport is registered for channel `{channel_id}`"))
        })?;
        if !registered.channel.active {
            return Err(CourierError::Validation(format!(
                "channel `{channel_id}` is inactive"
            )));
        }
        Ok(registered)
    }

    /// Send `intent` on `channel_id` and return the stored outgoing message.
    ///
    /// Every validation runs before a transport is touched. Transport
    /// failures are returned and nothing is stored for them.
    pub async fn send(
        &self,
        channel_id: &str,
        intent: &MessageIntent,
        actor: Option<&str>,
    ) -> Result<Message, CourierError> {
        let registered = self.route(channel_id)?;
        if !intent.has_content() {
            return Err(CourierError::Validation(
                "message needs text, html or an attachment".into(),
            ));
        }

        let message = match &registered.route {
            Route::Email(sender) => {
                if intent.to.is_empty()
                    && intent.cc.is_empty()
                    && intent.bcc.is_empty()
                    && intent.reply_to.is_none()
                {
                    return Err(CourierError::Validation(
                        "email needs a recipient or a message to reply to".into(),
                    ));
                }
                sender.send(intent, actor).await?
            }
            Route::Chat(transport) => {
                self.send_chat(&registered.channel, transport.as_ref(), intent, actor)
                    .await?
            }
        };
        info!(
            channel = %channel_id,
            platform = %message.platform,
            chat_id = %message.chat_id,
            message_id = %message.id,
            "message sent"
        );
        Ok(message)
    }

    /// Send into an existing chat.
    ///
    /// Email has no chat address of its own, so the message replies to the
    /// chat's latest incoming message (or its latest message when nothing
    /// came in yet).
    pub async fn send_to_chat(
        &self,
        channel_id: &str,
        chat_id: &str,
        mut intent: MessageIntent,
        actor: Option<&str>,
    ) -> Result<Message, CourierError> {
        let registered = self.route(channel_id)?;
        match registered.channel.platform {
            Platform::Email => {
                let chat = self
                    .store
                    .get_chat(Platform::Email, chat_id)
                    .await?
                    .ok_or_else(|| CourierError::not_found("chat", chat_id))?;
                let parent = chat
                    .cache
                    .last_incoming_message_id
                    .or(chat.cache.last_message_id)
                    .ok_or_else(|| {
                        CourierError::Validation(format!("chat {chat_id} has no message to reply to"))
                    })?;
                intent.reply_to = Some(parent);
                intent.chat_id = None;
            }
            _ => intent.chat_id = Some(chat_id.to_string()),
        }
        self.send(channel_id, &intent, actor).await
    }

    /// Record a delivery milestone reported by a provider.
    pub async fn mark_delivery(&self, update: &DeliveryUpdate) -> Result<(), CourierError> {
        debug!(
            platform = %update.platform,
            message_id = %update.message_id,
            event = %update.event,
            "delivery update"
        );
        self.store
            .record_delivery(update.platform, &update.message_id, update.event, update.at)
            .await
    }

    /// Record that the recipient of a tracked email opened it or clicked a link.
    pub async fn record_tracking(
        &self,
        tracking_id: &str,
        event: TrackingEvent,
    ) -> Result<Message, CourierError> {
        let message = self
            .store
            .record_tracking(tracking_id, event, chrono::Utc::now())
            .await?;
        debug!(message_id = %message.id, tracking_id, event = %event, "tracking event");
        Ok(message)
    }

    async fn send_chat(
        &self,
        channel: &ChannelConfig,
        transport: &dyn ChatTransport,
        intent: &MessageIntent,
        actor: Option<&str>,
    ) -> Result<Message, CourierError> {
        let platform = channel.platform;
        let parent = match intent.reply_to.as_deref() {
            Some(id) => self.store.get_message(platform, id).await?,
            None => None,
        };
        let chat_id = match (&intent.chat_id, &parent, &intent.reply_to) {
            (Some(chat_id), _, _) => chat_id.clone(),
            (None, Some(parent), _) => parent.chat_id.clone(),
            (None, None, Some(reply_to)) => {
                return Err(CourierError::Validation(format!(
                    "reply target {reply_to} is not stored and no chat id was given"
                )));
            }
            (None, None, None) => {
                return Err(CourierError::Validation(
                    "chat message needs a chat id or a message to reply to".into(),
                ));
            }
        };

        let text = intent
            .text
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| intent.html.as_deref().map(html_to_text))
            .unwrap_or_default();
        let delivery = ChatDelivery {
            chat_id: chat_id.clone(),
            text: text.clone(),
            html: intent.html.clone(),
            reply_to: intent.reply_to.clone(),
            attachments: intent.attachments.clone(),
        };
        let receipt = transport.deliver(&delivery).await?;

        let mut own = Account::new(platform, channel.id.clone()).with_name(channel.id.clone());
        own.is_bot = true;
        let (own, _) = self.store.get_or_create_account(own).await?;
        let (chat, _) = self
            .store
            .get_or_create_chat(Chat::new(platform, chat_id, channel.id.clone()))
            .await?;
        self.store
            .add_chat_member(platform, &chat.id, &own.id)
            .await?;

        let mut message = Message::new(
            platform,
            receipt.message_id,
            channel.id.clone(),
            own.id,
            chat.id,
            Direction::Outgoing,
        );
        if let Some(first) = intent.attachments.first() {
            message.media_type = MediaType::from_mime(&first.content_type);
            message.media = Some(MediaBlob {
                filename: first.filename.clone(),
                content_type: first.content_type.clone(),
                data: first.data.clone(),
            });
        }
        message.text = if text.is_empty() {
            message.media_type.placeholder()
        } else {
            text
        };
        message.html = intent.html.clone();
        message.reply_to_message_id = parent.map(|p| p.id);
        message.timestamp = receipt.timestamp;
        message.raw = receipt.raw;
        message.sent_by = actor.map(str::to_string);
        message.delivery.apply(DeliveryEvent::Sent, receipt.timestamp);

        let (message, _) = self.store.insert_message(message).await?;
        Ok(message)
    }
}
