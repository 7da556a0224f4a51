// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SMTP transport backed by `lettre`.

use async_trait::async_trait;
use courier_core::{CourierError, Envelope, MailEndpoint, MailTransport};
use lettre::address::Envelope as SmtpEnvelope;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use tracing::debug;

/// Sends pre-built messages with `AsyncSmtpTransport`.
///
/// `use_ssl` selects implicit TLS (SMTPS); otherwise STARTTLS is required.
/// A transport is built per send since credentials are per channel.
#[derive(Debug, Default, Clone)]
pub struct LettreTransport;

impl LettreTransport {
    pub fn new() -> Self {
        Self
    }

    fn build(endpoint: &MailEndpoint) -> Result<AsyncSmtpTransport<Tokio1Executor>, CourierError> {
        let builder = if endpoint.use_ssl {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&endpoint.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&endpoint.host)
        }
        .map_err(|e| CourierError::channel_with(format!("SMTP relay {} rejected", endpoint.host), e))?;

        Ok(builder
            .port(endpoint.port)
            .credentials(Credentials::new(
                endpoint.username.clone(),
                endpoint.password.clone(),
            ))
            .build())
    }
}

fn parse_address(address: &str) -> Result<Address, CourierError> {
    address
        .trim()
        .parse::<Address>()
        .map_err(|e| CourierError::Validation(format!("invalid email address `{address}`: {e}")))
}

/// Convert our envelope into lettre's, validating every address.
pub(crate) fn smtp_envelope(envelope: &Envelope) -> Result<SmtpEnvelope, CourierError> {
    let from = parse_address(&envelope.from)?;
    let to = envelope
        .to
        .iter()
        .map(|a| parse_address(a))
        .collect::<Result<Vec<_>, _>>()?;
    SmtpEnvelope::new(Some(from), to)
        .map_err(|e| CourierError::Validation(format!("invalid SMTP envelope: {e}")))
}

#[async_trait]
impl MailTransport for LettreTransport {
    async fn send_raw(
        &self,
        endpoint: &MailEndpoint,
        envelope: &Envelope,
        message: &[u8],
    ) -> Result<(), CourierError> {
        let smtp_envelope = smtp_envelope(envelope)?;
        let transport = Self::build(endpoint)?;
        transport
            .send_raw(&smtp_envelope, message)
            .await
            .map_err(|e| CourierError::channel_with("SMTP send failed", e))?;
        debug!(host = %endpoint.host, recipients = envelope.to.len(), "smtp message accepted");
        Ok(())
    }
}
