// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Member identification, categorization and processing against a real store.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use courier_core::{
    Account, CourierError, Member, MessageStore, Metadata, Platform, Request, RequestCategory,
    RequestStatus, RequestStore,
};
use courier_engine::{
    CATEGORIZATION_ERRORS_KEY, CategoryHandler, HandlerRegistry, MATCH_KEY,
    MEMBER_IDENTIFICATION_KEY, RequestEngine,
};
use courier_test_utils::{FaultyStore, TestHarness};

#[derive(Clone, Copy)]
enum Outcome {
    Match,
    NoMatch,
    Fail,
    Malformed,
}

struct Scripted {
    name: &'static str,
    outcome: Outcome,
    calls: AtomicUsize,
}

impl Scripted {
    fn new(name: &'static str, outcome: Outcome) -> Arc<Self> {
        Arc::new(Self {
            name,
            outcome,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CategoryHandler for Scripted {
    fn name(&self) -> &str {
        self.name
    }

    async fn call(&self, _: &Request, mut metadata: Metadata) -> Result<Metadata, CourierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.outcome {
            Outcome::Match => {
                metadata.insert(MATCH_KEY.into(), true.into());
                metadata.insert(format!("seen_by_{}", self.name), true.into());
                Ok(metadata)
            }
            Outcome::NoMatch => {
                metadata.insert(MATCH_KEY.into(), false.into());
                Ok(metadata)
            }
            Outcome::Fail => Err(CourierError::Handler {
                name: self.name.to_string(),
                message: "division by zero".into(),
            }),
            Outcome::Malformed => {
                metadata.insert(MATCH_KEY.into(), "maybe".into());
                Ok(metadata)
            }
        }
    }
}

struct Setup {
    harness: TestHarness,
    engine: RequestEngine,
}

async fn setup(handlers: Vec<Arc<Scripted>>, categories: Vec<RequestCategory>) -> Setup {
    let harness = TestHarness::new().await.unwrap();
    for category in &categories {
        harness.store.save_category(category).await.unwrap();
    }
    let mut registry = HandlerRegistry::new();
    for handler in handlers {
        registry.register(handler);
    }
    let engine = RequestEngine::new(harness.store.clone(), Arc::new(registry));
    Setup { harness, engine }
}

async fn request(setup: &Setup, channel: &str) -> Request {
    let mut request = Request::new(Platform::Email, "<q@customer.test>", "alice@customer.test", channel);
    request.email = Some("alice@customer.test".into());
    setup.harness.store.insert_request(request).await.unwrap().0
}

fn member(id: &str, email: Option<&str>, groups: &[&str]) -> Member {
    Member {
        id: id.into(),
        name: id.to_uppercase(),
        email: email.map(str::to_string),
        phone: None,
        group_ids: groups.iter().map(|g| g.to_string()).collect(),
    }
}

#[tokio::test]
async fn single_visible_category_skips_its_matcher() {
    let exploding = Scripted::new("exploding", Outcome::Fail);
    let setup = setup(
        vec![exploding.clone()],
        vec![RequestCategory::new("general", "General", 1).with_handler("exploding")],
    )
    .await;
    let mut request = request(&setup, "support").await;

    assert!(setup.engine.categorize(&mut request).await.unwrap());
    assert_eq!(request.category_id.as_deref(), Some("general"));
    assert_eq!(request.status, RequestStatus::Queued);
    assert_eq!(exploding.calls(), 0);
    assert!(!request.metadata.contains_key(CATEGORIZATION_ERRORS_KEY));
}

#[tokio::test]
async fn failing_matcher_does_not_block_later_ones() {
    let broken = Scripted::new("broken", Outcome::Fail);
    let no = Scripted::new("no", Outcome::NoMatch);
    let yes = Scripted::new("yes", Outcome::Match);
    let setup = setup(
        vec![broken.clone(), no.clone(), yes.clone()],
        vec![
            RequestCategory::new("a", "Broken", 1).with_handler("broken"),
            RequestCategory::new("b", "Declines", 2).with_handler("no"),
            RequestCategory::new("c", "Accepts", 3).with_handler("yes"),
        ],
    )
    .await;
    let mut request = request(&setup, "support").await;

    assert!(setup.engine.categorize(&mut request).await.unwrap());
    assert_eq!(request.category_id.as_deref(), Some("c"));
    assert_eq!((broken.calls(), no.calls(), yes.calls()), (1, 1, 1));

    let errors = request.metadata[CATEGORIZATION_ERRORS_KEY].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["category"], "Broken");
    assert!(errors[0]["error"].as_str().unwrap().contains("division by zero"));
    assert_eq!(request.metadata["seen_by_yes"], true);

    let stored = setup.harness.store.get_request(&request.id).await.unwrap().unwrap();
    assert_eq!(stored.category_id.as_deref(), Some("c"));
    assert_eq!(stored.status, RequestStatus::Queued);
}

#[tokio::test]
async fn first_match_in_sequence_order_wins() {
    let first = Scripted::new("first", Outcome::Match);
    let second = Scripted::new("second", Outcome::Match);
    // Saved out of order; sequence decides.
    let setup = setup(
        vec![first.clone(), second.clone()],
        vec![
            RequestCategory::new("late", "Late", 20).with_handler("second"),
            RequestCategory::new("early", "Early", 10).with_handler("first"),
        ],
    )
    .await;
    let mut request = request(&setup, "support").await;

    setup.engine.categorize(&mut request).await.unwrap();
    assert_eq!(request.category_id.as_deref(), Some("early"));
    assert_eq!(second.calls(), 0);
}

#[tokio::test]
async fn matching_descends_into_subcategories() {
    let yes = Scripted::new("yes", Outcome::Match);
    let no = Scripted::new("no", Outcome::NoMatch);
    let setup = setup(
        vec![yes.clone(), no.clone()],
        vec![
            RequestCategory::new("billing", "Billing", 1).with_handler("yes"),
            RequestCategory::new("sales", "Sales", 2).with_handler("no"),
            RequestCategory::new("refunds", "Refunds", 1)
                .under("billing")
                .with_handler("no"),
            RequestCategory::new("invoices", "Invoices", 2)
                .under("billing")
                .with_handler("yes"),
        ],
    )
    .await;
    let mut request = request(&setup, "support").await;

    assert!(setup.engine.categorize(&mut request).await.unwrap());
    assert_eq!(request.category_id.as_deref(), Some("invoices"));
}

#[tokio::test]
async fn no_match_below_keeps_the_parent() {
    let yes = Scripted::new("yes", Outcome::Match);
    let no = Scripted::new("no", Outcome::NoMatch);
    let setup = setup(
        vec![yes.clone(), no.clone()],
        vec![
            RequestCategory::new("billing", "Billing", 1).with_handler("yes"),
            RequestCategory::new("sales", "Sales", 2).with_handler("no"),
            RequestCategory::new("refunds", "Refunds", 1)
                .under("billing")
                .with_handler("no"),
            RequestCategory::new("invoices", "Invoices", 2)
                .under("billing")
                .with_handler("no"),
        ],
    )
    .await;
    let mut request = request(&setup, "support").await;

    assert!(setup.engine.categorize(&mut request).await.unwrap());
    assert_eq!(request.category_id.as_deref(), Some("billing"));
    assert_eq!(request.status, RequestStatus::Queued);
}

#[tokio::test]
async fn nothing_matching_still_queues() {
    let no = Scripted::new("no", Outcome::NoMatch);
    let odd = Scripted::new("odd", Outcome::Malformed);
    let setup = setup(
        vec![no.clone(), odd.clone()],
        vec![
            RequestCategory::new("a", "A", 1).with_handler("no"),
            RequestCategory::new("b", "B", 2).with_handler("odd"),
            RequestCategory::new("c", "C", 3).with_handler("not-registered"),
        ],
    )
    .await;
    let mut request = request(&setup, "support").await;

    assert!(!setup.engine.categorize(&mut request).await.unwrap());
    assert!(request.category_id.is_none());
    assert_eq!(request.status, RequestStatus::Queued);
    // The malformed answer and the unknown handler are both recorded.
    let errors = request.metadata[CATEGORIZATION_ERRORS_KEY].as_array().unwrap();
    assert_eq!(errors.len(), 2);
}

#[tokio::test]
async fn empty_forest_queues_without_category() {
    let setup = setup(Vec::new(), Vec::new()).await;
    let mut request = request(&setup, "support").await;
    assert!(!setup.engine.categorize(&mut request).await.unwrap());
    assert_eq!(request.status, RequestStatus::Queued);
    assert!(request.stamps.categorizing_at.is_some());
    assert!(request.stamps.queued_at.is_some());
}

#[tokio::test]
async fn channel_and_permission_filters_apply() {
    let yes = Scripted::new("yes", Outcome::Match);
    let staff_only = RequestCategory {
        authorized_groups: vec!["staff".into()],
        ..RequestCategory::new("internal", "Internal", 1)
            .with_handler("yes")
            .private()
    };
    let sales_only = RequestCategory {
        allowed_channels: vec!["sales".into()],
        ..RequestCategory::new("quotes", "Quotes", 2).with_handler("yes")
    };
    let inactive = RequestCategory {
        is_active: false,
        ..RequestCategory::new("old", "Old", 3).with_handler("yes")
    };
    let public = RequestCategory::new("general", "General", 4).with_handler("yes");
    let setup = setup(vec![yes.clone()], vec![staff_only, sales_only, inactive, public]).await;

    // Anonymous on the support channel only sees "general": fast path.
    let mut anonymous = request(&setup, "support").await;
    setup.engine.categorize(&mut anonymous).await.unwrap();
    assert_eq!(anonymous.category_id.as_deref(), Some("general"));
    assert_eq!(yes.calls(), 0);

    // Staff on the support channel sees "internal" first.
    setup
        .harness
        .store
        .save_member(&member("m1", Some("ann@corp.test"), &["staff"]))
        .await
        .unwrap();
    let mut staff = Request::new(Platform::Email, "<s@corp.test>", "ann@corp.test", "support");
    staff.member_id = Some("m1".into());
    let mut staff = setup.harness.store.insert_request(staff).await.unwrap().0;
    setup.engine.categorize(&mut staff).await.unwrap();
    assert_eq!(staff.category_id.as_deref(), Some("internal"));
}

#[tokio::test]
async fn categorizing_twice_is_rejected_without_failing() {
    let setup = setup(Vec::new(), Vec::new()).await;
    let mut request = request(&setup, "support").await;
    setup.engine.categorize(&mut request).await.unwrap();

    let err = setup.engine.categorize(&mut request).await.unwrap_err();
    assert!(matches!(err, CourierError::InvalidTransition { .. }));
    assert_eq!(request.status, RequestStatus::Queued);
}

#[tokio::test]
async fn processing_replaces_metadata_and_completes() {
    let yes = Scripted::new("yes", Outcome::Match);
    let setup = setup(
        vec![yes.clone()],
        vec![RequestCategory::new("general", "General", 1).with_handler("yes")],
    )
    .await;
    let mut request = request(&setup, "support").await;
    setup.engine.categorize(&mut request).await.unwrap();

    setup.engine.process_category(&mut request).await.unwrap();
    assert_eq!(request.status, RequestStatus::Completed);
    assert_eq!(request.metadata["seen_by_yes"], true);
    assert!(request.stamps.processing_at.is_some());
    assert!(request.stamps.completed_at.is_some());
    assert_eq!(yes.calls(), 1);
}

#[tokio::test]
async fn processing_without_category_completes_immediately() {
    let setup = setup(Vec::new(), Vec::new()).await;
    let mut request = request(&setup, "support").await;
    setup.engine.categorize(&mut request).await.unwrap();

    setup.engine.process_category(&mut request).await.unwrap();
    assert_eq!(request.status, RequestStatus::Completed);
    assert!(request.stamps.processing_at.is_none());
}

#[tokio::test]
async fn processing_failure_marks_failed_and_is_returned() {
    let broken = Scripted::new("broken", Outcome::Fail);
    let setup = setup(
        vec![broken.clone()],
        vec![RequestCategory::new("general", "General", 1).with_handler("broken")],
    )
    .await;
    let mut request = request(&setup, "support").await;
    setup.engine.categorize(&mut request).await.unwrap();

    let err = setup.engine.process_category(&mut request).await.unwrap_err();
    assert!(matches!(err, CourierError::Handler { .. }));
    assert_eq!(request.status, RequestStatus::Failed);
    assert!(request.error.as_deref().unwrap().contains("division by zero"));

    let stored = setup.engine.load(&request.id).await.unwrap();
    assert_eq!(stored.status, RequestStatus::Failed);
}

#[tokio::test]
async fn member_found_through_the_account() {
    let setup = setup(Vec::new(), Vec::new()).await;
    let store = &setup.harness.store;
    store.save_member(&member("m1", None, &[])).await.unwrap();
    store
        .get_or_create_account(Account::new(Platform::Email, "alice@customer.test"))
        .await
        .unwrap();
    store
        .set_account_member(Platform::Email, "alice@customer.test", "m1")
        .await
        .unwrap();
    let mut request = request(&setup, "support").await;

    assert!(setup.engine.identify_member(&mut request).await.unwrap());
    assert_eq!(request.member_id.as_deref(), Some("m1"));
    assert_eq!(request.status, RequestStatus::Identifying);
    assert_eq!(request.metadata[MEMBER_IDENTIFICATION_KEY]["method"], "account");

    // Already linked: nothing changes.
    assert!(setup.engine.identify_member(&mut request).await.unwrap());
}

#[tokio::test]
async fn member_found_by_email_links_the_account() {
    let setup = setup(Vec::new(), Vec::new()).await;
    let store = &setup.harness.store;
    store
        .save_member(&member("m2", Some("alice@customer.test"), &[]))
        .await
        .unwrap();
    store
        .get_or_create_account(Account::new(Platform::Email, "alice@customer.test"))
        .await
        .unwrap();
    let mut request = request(&setup, "support").await;

    assert!(setup.engine.identify_member(&mut request).await.unwrap());
    assert_eq!(request.member_id.as_deref(), Some("m2"));
    assert_eq!(request.metadata[MEMBER_IDENTIFICATION_KEY]["matched_by"], "email");

    let account = store
        .get_account(Platform::Email, "alice@customer.test")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.member_id.as_deref(), Some("m2"));
}

#[tokio::test]
async fn ambiguous_or_missing_members_stay_unlinked() {
    let setup = setup(Vec::new(), Vec::new()).await;
    let store = &setup.harness.store;

    let mut request = request(&setup, "support").await;
    assert!(!setup.engine.identify_member(&mut request).await.unwrap());
    assert_eq!(request.metadata[MEMBER_IDENTIFICATION_KEY]["result"], "no_match");

    store
        .save_member(&member("m3", Some("alice@customer.test"), &[]))
        .await
        .unwrap();
    store
        .save_member(&member("m4", Some("alice@customer.test"), &[]))
        .await
        .unwrap();
    assert!(!setup.engine.identify_member(&mut request).await.unwrap());
    assert!(request.member_id.is_none());
    assert_eq!(request.metadata[MEMBER_IDENTIFICATION_KEY]["count"], 2);
    assert_eq!(
        request.error.as_deref(),
        Some("2 members match the request's contact details")
    );
    assert_ne!(request.status, RequestStatus::Failed);
    let saved = store.get_request(&request.id).await.unwrap().unwrap();
    assert_eq!(saved.error, request.error);
}

#[tokio::test]
async fn triage_identifies_then_categorizes() {
    let yes = Scripted::new("yes", Outcome::Match);
    let vip = RequestCategory {
        authorized_members: vec!["m5".into()],
        ..RequestCategory::new("vip", "VIP", 1).with_handler("yes").private()
    };
    let setup = setup(
        vec![yes.clone()],
        vec![vip, RequestCategory::new("general", "General", 2).with_handler("yes")],
    )
    .await;
    setup
        .harness
        .store
        .save_member(&member("m5", Some("alice@customer.test"), &[]))
        .await
        .unwrap();
    let mut request = request(&setup, "support").await;

    assert!(setup.engine.triage(&mut request).await.unwrap());
    assert_eq!(request.member_id.as_deref(), Some("m5"));
    assert_eq!(request.category_id.as_deref(), Some("vip"));
    assert!(request.stamps.identifying_at.is_some());
    assert!(request.stamps.identifying_at <= request.stamps.categorizing_at);
}

#[tokio::test]
async fn unreadable_categories_fail_the_request() {
    let harness = TestHarness::new().await.unwrap();
    let store = Arc::new(FaultyStore::new(harness.store.clone()));
    let engine = RequestEngine::new(store.clone(), Arc::new(HandlerRegistry::new()));
    let request = Request::new(Platform::Email, "<broken@customer.test>", "bob@customer.test", "support");
    let (mut request, _) = store.insert_request(request).await.unwrap();

    store.fail_category_reads(true);
    assert!(!engine.categorize(&mut request).await.unwrap());
    assert_eq!(request.status, RequestStatus::Failed);
    assert!(request.category_id.is_none());
    let error = request.error.as_deref().unwrap();
    assert!(error.contains("disk I/O error reading categories"), "{error}");

    let saved = store.get_request(&request.id).await.unwrap().unwrap();
    assert_eq!(saved.status, RequestStatus::Failed);
    assert_eq!(saved.error, request.error);
    assert!(saved.stamps.failed_at.is_some());
}
