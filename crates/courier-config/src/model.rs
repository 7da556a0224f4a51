// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` so a misspelled key is
//! reported at startup instead of being silently ignored.

use courier_core::{CourierError, MailEndpoint, Platform};
use serde::{Deserialize, Serialize};

/// Top-level Courier configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CourierConfig {
    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// IMAP listener tuning shared by all email channels.
    #[serde(default)]
    pub listener: ListenerConfig,

    #[serde(default)]
    pub inline_images: InlineImageConfig,

    /// Configured platform endpoints.
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

impl CourierConfig {
    pub fn channel(&self, id: &str) -> Option<&ChannelConfig> {
        self.channels.iter().find(|c| c.id == id)
    }

    /// Active email channels, in declaration order.
    pub fn active_email_channels(&self) -> impl Iterator<Item = &ChannelConfig> {
        self.channels
            .iter()
            .filter(|c| c.active && c.platform == Platform::Email)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("courier").join("courier.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("courier.db"))
        .to_string_lossy()
        .into_owned()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ListenerConfig {
    /// Upper bound on a single IDLE wait before the loop re-checks the mailbox.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Delay before retrying after a failed connection attempt.
    #[serde(default = "default_reconnect_backoff_secs")]
    pub reconnect_backoff_secs: u64,

    #[serde(default = "default_inbox")]
    pub inbox: String,

    /// Folder that sent messages are mirrored into.
    #[serde(default = "default_sent_folder")]
    pub sent_folder: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            reconnect_backoff_secs: default_reconnect_backoff_secs(),
            inbox: default_inbox(),
            sent_folder: default_sent_folder(),
        }
    }
}

fn default_idle_timeout_secs() -> u64 {
    300
}

fn default_reconnect_backoff_secs() -> u64 {
    30
}

fn default_inbox() -> String {
    "INBOX".to_string()
}

fn default_sent_folder() -> String {
    "Sent".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct InlineImageConfig {
    /// Prefix of the short links that replace embedded images in stored HTML.
    #[serde(default = "default_link_prefix")]
    pub link_prefix: String,
}

impl Default for InlineImageConfig {
    fn default() -> Self {
        Self {
            link_prefix: default_link_prefix(),
        }
    }
}

fn default_link_prefix() -> String {
    "/i/".to_string()
}

/// One configured platform endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelConfig {
    pub id: String,
    pub platform: Platform,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub email: Option<EmailChannelConfig>,
    #[serde(default)]
    pub telegram: Option<TelegramChannelConfig>,
    #[serde(default)]
    pub whatsapp: Option<WhatsAppChannelConfig>,
}

impl ChannelConfig {
    /// Email settings, or a configuration error naming the channel.
    pub fn email_settings(&self) -> Result<&EmailChannelConfig, CourierError> {
        self.email.as_ref().ok_or_else(|| {
            CourierError::Config(format!("channel `{}` has no [email] settings", self.id))
        })
    }

    pub fn telegram_settings(&self) -> Result<&TelegramChannelConfig, CourierError> {
        self.telegram.as_ref().ok_or_else(|| {
            CourierError::Config(format!("channel `{}` has no [telegram] settings", self.id))
        })
    }

    pub fn whatsapp_settings(&self) -> Result<&WhatsAppChannelConfig, CourierError> {
        self.whatsapp.as_ref().ok_or_else(|| {
            CourierError::Config(format!("channel `{}` has no [whatsapp] settings", self.id))
        })
    }
}

fn default_true() -> bool {
    true
}

/// Mailbox credentials plus the IMAP and SMTP services behind them.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EmailChannelConfig {
    pub email_address: String,
    pub email_password: String,
    pub imap: MailServiceConfig,
    pub smtp: MailServiceConfig,
}

impl std::fmt::Debug for EmailChannelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailChannelConfig")
            .field("email_address", &self.email_address)
            .field("email_password", &"[REDACTED]")
            .field("imap", &self.imap)
            .field("smtp", &self.smtp)
            .finish()
    }
}

impl EmailChannelConfig {
    pub fn imap_endpoint(&self) -> MailEndpoint {
        self.imap.endpoint(&self.email_address, &self.email_password)
    }

    pub fn smtp_endpoint(&self) -> MailEndpoint {
        self.smtp.endpoint(&self.email_address, &self.email_password)
    }
}

/// Host settings for IMAP or SMTP. Username and password fall back to the
/// channel's shared address and password.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MailServiceConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_true")]
    pub use_ssl: bool,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl std::fmt::Debug for MailServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailServiceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("use_ssl", &self.use_ssl)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl MailServiceConfig {
    fn endpoint(&self, address: &str, password: &str) -> MailEndpoint {
        MailEndpoint {
            host: self.host.clone(),
            port: self.port,
            use_ssl: self.use_ssl,
            username: self
                .username
                .clone()
                .unwrap_or_else(|| address.to_string()),
            password: self
                .password
                .clone()
                .unwrap_or_else(|| password.to_string()),
        }
    }
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TelegramChannelConfig {
    pub bot_token: String,
}

impl std::fmt::Debug for TelegramChannelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramChannelConfig")
            .field("bot_token", &"[REDACTED]")
            .finish()
    }
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WhatsAppChannelConfig {
    pub access_token: String,
    pub phone_number_id: String,
    /// Graph API base, without trailing slash.
    #[serde(default = "default_graph_api_base")]
    pub api_base: String,
}

impl std::fmt::Debug for WhatsAppChannelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhatsAppChannelConfig")
            .field("access_token", &"[REDACTED]")
            .field("phone_number_id", &self.phone_number_id)
            .field("api_base", &self.api_base)
            .finish()
    }
}

fn default_graph_api_base() -> String {
    "https://graph.facebook.com/v17.0".to_string()
}
