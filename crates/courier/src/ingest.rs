// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `courier ingest`: store one `.eml` file as if it arrived on a channel.

use std::path::Path;
use std::sync::Arc;

use courier_config::CourierConfig;
use courier_core::{CourierError, Message, Platform, RawEmailSink, Store};
use courier_email::EmailIngestor;
use courier_engine::{HandlerRegistry, RequestEngine, RequestOpeningSink};
use tracing::info;

/// Ingest the raw email at `path` through `channel_id`, then open and triage
/// its request.
pub async fn ingest_file(
    config: &CourierConfig,
    store: Arc<dyn Store>,
    channel_id: &str,
    path: &Path,
) -> Result<Message, CourierError> {
    let channel = config
        .channel(channel_id)
        .ok_or_else(|| CourierError::not_found("channel", channel_id))?;
    if channel.platform != Platform::Email {
        return Err(CourierError::Validation(format!(
            "channel `{channel_id}` is a {} channel, not email",
            channel.platform
        )));
    }

    let raw = tokio::fs::read(path).await.map_err(|e| {
        CourierError::Validation(format!("cannot read {}: {e}", path.display()))
    })?;
    let ingestor = EmailIngestor::new(store.clone(), channel, config.inline_images.link_prefix.clone())?;
    let engine = RequestEngine::new(store.clone(), Arc::new(HandlerRegistry::new()));
    let sink = RequestOpeningSink::new(ingestor, store).with_engine(Arc::new(engine));
    let message = sink.accept(&raw, None).await?;
    info!(channel = channel_id, message_id = %message.id, chat_id = %message.chat_id, "email ingested");
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{MessageStore, RequestStore};
    use courier_test_utils::{RawEmail, TestHarness, email_channel, telegram_channel};

    async fn harness() -> TestHarness {
        TestHarness::builder()
            .with_channel(email_channel("support", "support@courier.test"))
            .with_channel(telegram_channel("bot"))
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn eml_file_is_stored_with_a_request() {
        let harness = harness().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("question.eml");
        std::fs::write(
            &path,
            RawEmail::new("<f1@customer.test>", "dora@customer.test", "support@courier.test")
                .subject("Refund")
                .text("Please refund order 1182.")
                .build(),
        )
        .unwrap();

        let message = ingest_file(&harness.config, harness.store.clone(), "support", &path)
            .await
            .unwrap();
        assert_eq!(message.id, "<f1@customer.test>");
        assert!(
            harness
                .store
                .get_message(Platform::Email, "<f1@customer.test>")
                .await
                .unwrap()
                .is_some()
        );
        let request = harness
            .store
            .request_for_message(Platform::Email, "<f1@customer.test>")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request.email.as_deref(), Some("dora@customer.test"));
        assert_eq!(request.status, courier_core::RequestStatus::Queued);

        // A second run finds the same message and request.
        let again = ingest_file(&harness.config, harness.store.clone(), "support", &path)
            .await
            .unwrap();
        assert_eq!(again.id, message.id);
    }

    #[tokio::test]
    async fn unknown_or_non_email_channels_are_refused() {
        let harness = harness().await;
        let path = Path::new("/nonexistent/mail.eml");
        let err = ingest_file(&harness.config, harness.store.clone(), "nope", path)
            .await
            .unwrap_err();
        assert!(matches!(err, CourierError::NotFound { .. }));

        let err = ingest_file(&harness.config, harness.store.clone(), "bot", path)
            .await
            .unwrap_err();
        assert!(matches!(err, CourierError::Validation(_)));

        let err = ingest_file(&harness.config, harness.store.clone(), "support", path)
            .await
            .unwrap_err();
        assert!(matches!(err, CourierError::Validation(_)));
    }
}
