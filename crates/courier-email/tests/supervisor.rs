// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use courier_config::{ChannelConfig, ListenerConfig};
use courier_core::{CourierError, RawEmailSink, Store};
use courier_email::{EmailIngestor, ListenerState, ListenerSupervisor, SinkFactory};
use courier_test_utils::{FakeMailbox, RawEmail, TestHarness, email_channel, telegram_channel};

async fn setup() -> (TestHarness, FakeMailbox, ListenerSupervisor) {
    let harness = TestHarness::builder()
        .with_channel(email_channel("support", "support@courier.test"))
        .with_channel(email_channel("sales", "sales@courier.test"))
        .build()
        .await
        .unwrap();
    let store: Arc<dyn Store> = harness.store.clone();
    let sinks: SinkFactory = Arc::new(
        move |channel: &ChannelConfig| -> Result<Arc<dyn RawEmailSink>, CourierError> {
            let ingestor = EmailIngestor::new(store.clone(), channel, "/i/")?;
            Ok(Arc::new(ingestor))
        },
    );
    let mailbox = FakeMailbox::new();
    let config = ListenerConfig {
        idle_timeout_secs: 1,
        reconnect_backoff_secs: 1,
        inbox: "INBOX".into(),
        sent_folder: "Sent".into(),
    };
    let supervisor = ListenerSupervisor::new(Arc::new(mailbox.clone()), sinks, &config);
    (harness, mailbox, supervisor)
}

async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn start_is_idempotent_and_stop_logs_out() {
    let (harness, mailbox, supervisor) = setup().await;
    let support = harness.channel("support");

    assert!(supervisor.start(support).await.unwrap());
    assert!(!supervisor.start(support).await.unwrap());
    assert_eq!(supervisor.running().await, ["support"]);

    let uid = mailbox.deliver(
        RawEmail::new("<s1@customer.test>", "alice@customer.test", "support@courier.test")
            .text("hello")
            .build(),
    );
    eventually("mail to be seen", || mailbox.is_seen(uid)).await;
    assert_eq!(mailbox.connects(), 1);

    assert!(supervisor.stop("support").await);
    assert!(!supervisor.stop("support").await);
    assert!(supervisor.running().await.is_empty());
    assert_eq!(mailbox.logouts(), 1);
    assert_eq!(supervisor.state("support").await, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn channels_run_independently() {
    let (harness, mailbox, supervisor) = setup().await;
    supervisor.start(harness.channel("support")).await.unwrap();
    supervisor.start(harness.channel("sales")).await.unwrap();
    assert_eq!(supervisor.running().await, ["sales", "support"]);

    for id in ["support", "sales"] {
        let mut state = supervisor.subscribe(id).await.unwrap();
        state
            .wait_for(|s| *s == ListenerState::Idle)
            .await
            .unwrap();
    }

    supervisor.stop("support").await;
    assert_eq!(supervisor.running().await, ["sales"]);
    assert!(supervisor.state("sales").await.is_some());

    supervisor.stop_all().await;
    assert!(supervisor.running().await.is_empty());
    assert_eq!(mailbox.logouts(), 2);
}

#[tokio::test]
async fn restart_replaces_the_listener() {
    let (harness, mailbox, supervisor) = setup().await;
    let support = harness.channel("support");
    supervisor.start(support).await.unwrap();
    assert!(supervisor.restart(support).await.unwrap());
    assert_eq!(supervisor.running().await, ["support"]);
    supervisor.stop_all().await;
    assert!(mailbox.connects() <= 2);
}

#[tokio::test]
async fn inactive_and_non_email_channels_are_refused() {
    let (harness, _mailbox, supervisor) = setup().await;

    let mut paused = harness.channel("support").clone();
    paused.active = false;
    let err = supervisor.start(&paused).await.unwrap_err();
    assert!(matches!(err, CourierError::Validation(_)));

    let err = supervisor.start(&telegram_channel("tg")).await.unwrap_err();
    assert!(matches!(err, CourierError::Validation(_)));
    assert!(supervisor.running().await.is_empty());
}
