// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Courier messaging layer.

use thiserror::Error;

use crate::request::RequestStatus;
use crate::types::Platform;

/// The primary error type used across Courier crates.
#[derive(Debug, Error)]
pub enum CourierError {
    /// Configuration errors (missing channel settings, wrong platform section).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Input that cannot be parsed at all (for email: not an RFC 5322 message).
    #[error("parse error: {0}")]
    Parse(String),

    /// Transport-level failure talking to a platform (IMAP, SMTP, Bot API, Graph API).
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The remote side refused one command but the connection is still usable
    /// (an IMAP `NO` or `BAD` reply).
    #[error("rejected by server: {message}")]
    Rejected { message: String },

    /// The sender's account is blocked. Nothing from it is stored.
    #[error("{platform} account `{account}` is blocked")]
    Blocked { platform: Platform, account: String },

    /// Caller supplied an intent or record that cannot be acted upon.
    #[error("validation error: {0}")]
    Validation(String),

    /// A referenced entity does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A request status change that would move backwards or leave FAILED.
    #[error("invalid request status transition: {from} -> {to}")]
    InvalidTransition {
        from: RequestStatus,
        to: RequestStatus,
    },

    /// A category handler reported a failure.
    #[error("handler `{name}` failed: {message}")]
    Handler { name: String, message: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CourierError {
    /// Shorthand for a transport error without an underlying source.
    pub fn channel(message: impl Into<String>) -> Self {
        CourierError::Channel {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a transport error wrapping its cause.
    pub fn channel_with<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        CourierError::Channel {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        CourierError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Whether the error comes from the connection rather than the item being processed.
    ///
    /// The IMAP listener reconnects on transient errors and skips the current
    /// item on everything else.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CourierError::Channel { .. } | CourierError::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_transient() {
        assert!(CourierError::channel("connection reset").is_transient());
        assert!(
            CourierError::Timeout {
                duration: std::time::Duration::from_secs(5)
            }
            .is_transient()
        );
        assert!(!CourierError::Parse("garbage".into()).is_transient());
        assert!(!CourierError::Validation("no recipients".into()).is_transient());
        assert!(
            !CourierError::Rejected {
                message: "UID FETCH: NO message is gone".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn display_includes_context() {
        let err = CourierError::not_found("message", "<a@example.com>");
        assert_eq!(err.to_string(), "message not found: <a@example.com>");

        let err = CourierError::InvalidTransition {
            from: RequestStatus::Queued,
            to: RequestStatus::Pending,
        };
        assert_eq!(
            err.to_string(),
            "invalid request status transition: QUEUED -> PENDING"
        );

        let err = CourierError::Blocked {
            platform: Platform::Telegram,
            account: "42".into(),
        };
        assert_eq!(err.to_string(), "telegram account `42` is blocked");
        assert!(!err.is_transient());
    }
}
