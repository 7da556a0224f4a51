// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound email: threading headers, recipient defaults, Sent mirroring, storage.

use std::sync::Arc;

use courier_core::{CourierError, Direction, Message, MessageIntent, MessageStore, Platform, Store};
use courier_email::{EmailIngestor, EmailSender, HtmlRewriter};
use courier_test_utils::{FakeMailbox, MockMailTransport, RawEmail, TestHarness, email_channel};

const ADDRESS: &str = "support@courier.test";
const ALICE: &str = "alice@customer.test";
const BOB: &str = "bob@customer.test";

struct Setup {
    harness: TestHarness,
    ingestor: Arc<EmailIngestor>,
    transport: Arc<MockMailTransport>,
    mailbox: FakeMailbox,
    sender: EmailSender,
}

async fn setup() -> Setup {
    let harness = TestHarness::builder()
        .with_channel(email_channel("support", ADDRESS))
        .build()
        .await
        .unwrap();
    let store: Arc<dyn Store> = harness.store.clone();
    let ingestor =
        Arc::new(EmailIngestor::new(store.clone(), harness.channel("support"), "/i/").unwrap());
    let transport = Arc::new(MockMailTransport::new());
    let mailbox = FakeMailbox::new();
    let sender = EmailSender::new(
        harness.channel("support"),
        store,
        transport.clone(),
        Arc::new(mailbox.clone()),
        ingestor.clone(),
        "Sent",
    )
    .unwrap();
    Setup {
        harness,
        ingestor,
        transport,
        mailbox,
        sender,
    }
}

async fn incoming(setup: &Setup) -> Message {
    let raw = RawEmail::new("<q1@customer.test>", &format!("Alice <{ALICE}>"), ADDRESS)
        .subject("Printer on fire")
        .cc(BOB)
        .text("It is still burning")
        .build();
    setup.ingestor.ingest(&raw, Some(1)).await.unwrap().0
}

#[tokio::test]
async fn reply_threads_under_the_parent() {
    let setup = setup().await;
    let parent = incoming(&setup).await;

    let sent = setup
        .sender
        .send(
            &MessageIntent::text("Fire brigade is on the way").replying_to(&parent.id),
            Some("agent-1"),
        )
        .await
        .unwrap();

    let mails = setup.transport.sent_messages().await;
    assert_eq!(mails.len(), 1);
    let text = mails[0].as_text();
    assert!(text.contains("Subject: Re: Printer on fire"));
    assert!(text.contains("In-Reply-To: <q1@customer.test>"));
    assert!(text.contains("References: <q1@customer.test>"));
    assert_eq!(mails[0].envelope.from, ADDRESS);
    assert_eq!(mails[0].endpoint.host, "smtp.test");

    assert_eq!(sent.direction, Direction::Outgoing);
    assert_eq!(sent.chat_id, parent.chat_id);
    assert_eq!(sent.reply_to_message_id.as_deref(), Some(parent.id.as_str()));
    assert_eq!(sent.sent_by.as_deref(), Some("agent-1"));
    assert_eq!(sent.subject.as_deref(), Some("Re: Printer on fire"));
    assert!(sent.text.contains("Fire brigade is on the way"));

    let thread = setup
        .harness
        .store
        .chat_messages(Platform::Email, &parent.chat_id)
        .await
        .unwrap();
    assert_eq!(thread.len(), 2);
}

#[tokio::test]
async fn explicit_subject_wins_over_the_reply_subject() {
    let setup = setup().await;
    let parent = incoming(&setup).await;

    let sent = setup
        .sender
        .send(
            &MessageIntent::text("Closing this one")
                .replying_to(&parent.id)
                .subject("Case 118 resolved"),
            None,
        )
        .await
        .unwrap();

    let text = setup.transport.sent_messages().await[0].as_text();
    assert!(text.contains("Subject: Case 118 resolved"));
    assert!(text.contains("In-Reply-To: <q1@customer.test>"));
    assert_eq!(sent.subject.as_deref(), Some("Case 118 resolved"));
    assert_eq!(sent.chat_id, parent.chat_id);
}

#[tokio::test]
async fn reply_to_incoming_goes_back_to_the_sender_and_keeps_cc() {
    let setup = setup().await;
    let parent = incoming(&setup).await;

    setup
        .sender
        .send(&MessageIntent::text("On it").replying_to(&parent.id), None)
        .await
        .unwrap();

    let mails = setup.transport.sent_messages().await;
    assert_eq!(mails[0].envelope.to, [ALICE, BOB]);
}

#[tokio::test]
async fn reply_to_our_own_message_goes_to_its_recipients() {
    let setup = setup().await;
    let ours = RawEmail::new("<o1@courier.test>", ADDRESS, ALICE)
        .subject("Your invoice")
        .cc(BOB)
        .text("Attached")
        .build();
    let (parent, _) = setup.ingestor.ingest_as(&ours, None, None).await.unwrap();
    assert_eq!(parent.direction, Direction::Outgoing);

    setup
        .sender
        .send(&MessageIntent::text("Friendly reminder").replying_to(&parent.id), None)
        .await
        .unwrap();

    let mails = setup.transport.sent_messages().await;
    assert_eq!(mails[0].envelope.to, [ALICE, BOB]);
    assert!(mails[0].as_text().contains("Subject: Re: Your invoice"));
}

#[tokio::test]
async fn explicit_recipients_override_the_parent() {
    let setup = setup().await;
    let parent = incoming(&setup).await;

    setup
        .sender
        .send(
            &MessageIntent::text("Forwarding internally")
                .replying_to(&parent.id)
                .to("Ops@Courier.Test")
                .to(ADDRESS),
            None,
        )
        .await
        .unwrap();

    let mails = setup.transport.sent_messages().await;
    assert_eq!(mails[0].envelope.to, ["ops@courier.test"]);
}

#[tokio::test]
async fn bcc_reaches_the_envelope_but_not_the_headers() {
    let setup = setup().await;
    let mut intent = MessageIntent::text("Hello").to(ALICE).subject("Hi");
    intent.bcc.push("audit@courier.test".into());

    setup.sender.send(&intent, None).await.unwrap();

    let mails = setup.transport.sent_messages().await;
    assert!(mails[0].envelope.to.contains(&"audit@courier.test".to_string()));
    assert!(!mails[0].as_text().contains("audit@courier.test"));
}

#[tokio::test]
async fn sent_copy_is_appended_seen() {
    let setup = setup().await;
    setup
        .sender
        .send(&MessageIntent::text("Hello").to(ALICE).subject("Hi"), None)
        .await
        .unwrap();

    let appended = setup.mailbox.appended();
    assert_eq!(appended.len(), 1);
    let (folder, flags, bytes) = &appended[0];
    assert_eq!(folder, "Sent");
    assert_eq!(flags, "(\\Seen)");
    assert_eq!(bytes, &setup.transport.sent_messages().await[0].bytes);
    assert_eq!(setup.mailbox.logouts(), 1);
}

#[tokio::test]
async fn failed_sent_mirror_does_not_fail_the_send() {
    let setup = setup().await;
    setup.mailbox.fail_next_appends(1);

    let sent = setup
        .sender
        .send(&MessageIntent::text("Hello").to(ALICE).subject("Hi"), None)
        .await
        .unwrap();

    assert!(setup.mailbox.appended().is_empty());
    assert!(
        setup
            .harness
            .store
            .get_message(Platform::Email, &sent.id)
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn transport_failure_stores_nothing() {
    let setup = setup().await;
    let parent = incoming(&setup).await;
    setup.transport.fail_sends(true);

    let err = setup
        .sender
        .send(&MessageIntent::text("Hello").replying_to(&parent.id), None)
        .await
        .unwrap_err();
    assert!(err.is_transient());

    let thread = setup
        .harness
        .store
        .chat_messages(Platform::Email, &parent.chat_id)
        .await
        .unwrap();
    assert_eq!(thread.len(), 1);
    assert!(setup.mailbox.appended().is_empty());
}

#[tokio::test]
async fn empty_or_unaddressed_mail_is_rejected() {
    let setup = setup().await;

    let err = setup
        .sender
        .send(&MessageIntent::text("  ").to(ALICE), None)
        .await
        .unwrap_err();
    assert!(matches!(err, CourierError::Validation(_)));

    let err = setup
        .sender
        .send(&MessageIntent::text("Hello").to(ADDRESS), None)
        .await
        .unwrap_err();
    assert!(matches!(err, CourierError::Validation(_)));
    assert!(setup.transport.sent_messages().await.is_empty());
}

#[tokio::test]
async fn unknown_reply_target_still_threads_by_header() {
    let setup = setup().await;
    setup
        .sender
        .send(
            &MessageIntent::text("Following up")
                .replying_to("<gone@customer.test>")
                .to(ALICE)
                .subject("Follow-up"),
            None,
        )
        .await
        .unwrap();

    let text = setup.transport.sent_messages().await[0].as_text();
    assert!(text.contains("In-Reply-To: <gone@customer.test>"));
    assert!(text.contains("Subject: Follow-up"));
}

struct Stars;

impl HtmlRewriter for Stars {
    fn rewrite(&self, html: &str) -> String {
        html.replace("ICONFONT", "STAR")
    }
}

#[tokio::test]
async fn html_rewriter_runs_before_sending() {
    let setup = setup().await;
    let sender = setup.sender.with_rewriter(Arc::new(Stars));

    sender
        .send(
            &MessageIntent::html("<p>Rated ICONFONT</p>").to(ALICE).subject("Review"),
            None,
        )
        .await
        .unwrap();

    let text = setup.transport.sent_messages().await[0].as_text();
    assert!(text.contains("STAR"));
    assert!(!text.contains("ICONFONT"));
}
