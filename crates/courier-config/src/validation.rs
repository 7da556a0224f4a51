// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic checks that serde attributes cannot express.

use std::collections::HashSet;

use courier_core::Platform;

use crate::diagnostic::ConfigError;
use crate::model::{ChannelConfig, CourierConfig, MailServiceConfig};

/// Validate a deserialized configuration, collecting every problem.
pub fn validate_config(config: &CourierConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation(
            "storage.database_path must not be empty",
        ));
    }

    if config.listener.idle_timeout_secs == 0 {
        errors.push(ConfigError::validation(
            "listener.idle_timeout_secs must be greater than zero",
        ));
    }

    if config.listener.reconnect_backoff_secs == 0 {
        errors.push(ConfigError::validation(
            "listener.reconnect_backoff_secs must be greater than zero",
        ));
    }

    if config.listener.sent_folder.trim().is_empty() {
        errors.push(ConfigError::validation(
            "listener.sent_folder must not be empty",
        ));
    }

    let mut seen_ids = HashSet::new();
    for (i, channel) in config.channels.iter().enumerate() {
        if channel.id.trim().is_empty() {
            errors.push(ConfigError::validation(format!(
                "channels[{i}].id must not be empty"
            )));
        } else if !seen_ids.insert(channel.id.as_str()) {
            errors.push(ConfigError::validation(format!(
                "duplicate channel id `{}` in [[channels]] array",
                channel.id
            )));
        }
        validate_channel(channel, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_channel(channel: &ChannelConfig, errors: &mut Vec<ConfigError>) {
    let id = &channel.id;
    let expected = match channel.platform {
        Platform::Email => "email",
        Platform::Telegram => "telegram",
        Platform::WhatsApp => "whatsapp",
        Platform::WebChat => "",
    };

    let present: Vec<&str> = [
        channel.email.as_ref().map(|_| "email"),
        channel.telegram.as_ref().map(|_| "telegram"),
        channel.whatsapp.as_ref().map(|_| "whatsapp"),
    ]
    .into_iter()
    .flatten()
    .collect();

    for section in &present {
        if *section != expected {
            errors.push(ConfigError::validation(format!(
                "channel `{id}` is a {} channel but has a [{section}] section",
                channel.platform
            )));
        }
    }
    if !expected.is_empty() && !present.contains(&expected) {
        errors.push(ConfigError::validation(format!(
            "channel `{id}` is missing its [{expected}] section"
        )));
    }

    if let Some(email) = &channel.email {
        if !email.email_address.contains('@') {
            errors.push(ConfigError::validation(format!(
                "channel `{id}`: email_address `{}` is not an email address",
                email.email_address
            )));
        }
        validate_service(id, "imap", &email.imap, errors);
        validate_service(id, "smtp", &email.smtp, errors);
    }

    if let Some(telegram) = &channel.telegram
        && telegram.bot_token.trim().is_empty()
    {
        errors.push(ConfigError::validation(format!(
            "channel `{id}`: telegram.bot_token must not be empty"
        )));
    }

    if let Some(whatsapp) = &channel.whatsapp {
        if whatsapp.access_token.trim().is_empty() {
            errors.push(ConfigError::validation(format!(
                "channel `{id}`: whatsapp.access_token must not be empty"
            )));
        }
        if whatsapp.phone_number_id.trim().is_empty() {
            errors.push(ConfigError::validation(format!(
                "channel `{id}`: whatsapp.phone_number_id must not be empty"
            )));
        }
    }
}

fn validate_service(id: &str, name: &str, service: &MailServiceConfig, errors: &mut Vec<ConfigError>) {
    if service.host.trim().is_empty() {
        errors.push(ConfigError::validation(format!(
            "channel `{id}`: {name}.host must not be empty"
        )));
    }
    if service.port == 0 {
        errors.push(ConfigError::validation(format!(
            "channel `{id}`: {name}.port must be between 1 and 65535"
        )));
    }
}
