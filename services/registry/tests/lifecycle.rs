//! Intake and lifecycle integration tests.
//!
//! Exercises the creation path's all-or-nothing contract and the status
//! state machine's idempotence and at-most-once notification guarantees
//! against a real Postgres.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use common::{applicant, TestDb};
use marma_registry::db::DbError;
use marma_registry::enroll::{enroll, EnrollError};
use marma_registry::ident::{
    AllocationError, Allocator, Category, CodeAllocator, IssuedCode,
};
use marma_registry::lifecycle::{LifecycleController, Status, TransitionError};
use marma_registry::notify::{Decision, MockNotifier, SentNotice};

/// Delegates to the real allocator until `fail_from` calls have been made,
/// then fails every allocation the way an unreachable store would.
struct FailingAllocator {
    inner: Allocator,
    calls: AtomicUsize,
    fail_from: usize,
}

#[async_trait]
impl CodeAllocator for FailingAllocator {
    async fn allocate(
        &self,
        category: Category,
        country: &str,
    ) -> Result<IssuedCode, AllocationError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call >= self.fail_from {
            return Err(AllocationError::Exhausted {
                category: category.key(),
                scope: country.to_string(),
                attempts: 3,
                source: DbError::Query(sqlx::Error::PoolClosed),
            });
        }
        self.inner.allocate(category, country).await
    }
}

#[tokio::test]
async fn enroll_issues_both_codes_and_sends_confirmation() {
    let harness = TestDb::new().await;
    let allocator = Allocator::new(&harness.db);
    let notifier = MockNotifier::new();

    let registration = enroll(&harness.db, &allocator, &notifier, applicant("001", "Liberia"))
        .await
        .unwrap();

    assert_eq!(registration.status, Status::Pending);
    assert_eq!(registration.regional_code, "ML001");
    assert_eq!(registration.identification_number, "LIB001");
    assert!(registration.status_updated_at.is_none());
    assert_eq!(
        notifier.sent(),
        vec![SentNotice::Received {
            registration_id: registration.registration_id
        }]
    );
}

#[tokio::test]
async fn duplicate_email_is_rejected_before_any_allocation() {
    let harness = TestDb::new().await;
    let allocator = Allocator::new(&harness.db);
    let notifier = MockNotifier::new();

    enroll(&harness.db, &allocator, &notifier, applicant("002", "Liberia"))
        .await
        .unwrap();

    let err = enroll(&harness.db, &allocator, &notifier, applicant("002", "Liberia"))
        .await
        .unwrap_err();
    assert!(matches!(err, EnrollError::DuplicateApplicant));

    // The rejected request consumed no counter values.
    let counters = harness.db.counters();
    assert_eq!(counters.current("regionalCode", "Liberia").await.unwrap(), Some(1));
    assert_eq!(
        counters.current("identificationNumber", "Liberia").await.unwrap(),
        Some(1)
    );
}

#[tokio::test]
async fn failed_second_allocation_leaves_no_registration_behind() {
    let harness = TestDb::new().await;
    let failing = FailingAllocator {
        inner: Allocator::new(&harness.db),
        calls: AtomicUsize::new(0),
        fail_from: 1,
    };
    let notifier = MockNotifier::new();

    let new = applicant("003", "Liberia");
    let email = new.email.clone();

    let err = enroll(&harness.db, &failing, &notifier, new).await.unwrap_err();
    assert!(matches!(err, EnrollError::Allocation(_)));

    assert!(!harness.db.registrations().email_exists(&email).await.unwrap());
    assert!(notifier.sent().is_empty());
}

#[tokio::test]
async fn approve_is_idempotent_and_notifies_once() {
    let harness = TestDb::new().await;
    let allocator = Allocator::new(&harness.db);
    let notifier = MockNotifier::new();
    let controller = LifecycleController::new(harness.db.clone(), Arc::new(notifier.clone()));

    let registration = enroll(&harness.db, &allocator, &notifier, applicant("004", "Ghana"))
        .await
        .unwrap();
    let id = registration.registration_id;

    let approved = controller
        .apply_status(&id, Status::Approved, Some("welcome"), Some("admin@marma.org"))
        .await
        .unwrap();
    assert_eq!(approved.status, Status::Approved);
    assert_eq!(approved.status_message.as_deref(), Some("welcome"));
    assert_eq!(approved.reviewed_by.as_deref(), Some("admin@marma.org"));
    let decided_at = approved.status_updated_at.expect("timestamp set on change");

    // Retried request: same target status, different message.
    let again = controller
        .apply_status(&id, Status::Approved, Some("welcome again"), None)
        .await
        .unwrap();
    assert_eq!(again.status, Status::Approved);
    assert_eq!(again.status_message.as_deref(), Some("welcome"));
    assert_eq!(again.status_updated_at, Some(decided_at));

    assert_eq!(notifier.status_changes(), 1);
}

#[tokio::test]
async fn decline_then_redecline_sends_one_email() {
    let harness = TestDb::new().await;
    let allocator = Allocator::new(&harness.db);
    let notifier = MockNotifier::new();
    let controller = LifecycleController::new(harness.db.clone(), Arc::new(notifier.clone()));

    let registration = enroll(&harness.db, &allocator, &notifier, applicant("005", "Nigeria"))
        .await
        .unwrap();
    let id = registration.registration_id;

    let declined = controller
        .apply_status(&id, Status::Declined, Some("incomplete docs"), None)
        .await
        .unwrap();
    assert_eq!(declined.status_message.as_deref(), Some("incomplete docs"));

    let redeclined = controller
        .apply_status(&id, Status::Declined, Some("resubmit later"), None)
        .await
        .unwrap();
    assert_eq!(redeclined.status_message.as_deref(), Some("incomplete docs"));

    let status_emails: Vec<_> = notifier
        .sent()
        .into_iter()
        .filter(|n| matches!(n, SentNotice::StatusChanged { .. }))
        .collect();
    assert_eq!(
        status_emails,
        vec![SentNotice::StatusChanged {
            registration_id: id,
            decision: Decision::Declined,
            message: "incomplete docs".to_string(),
        }]
    );
}

#[tokio::test]
async fn under_review_is_silent_and_can_still_be_decided() {
    let harness = TestDb::new().await;
    let allocator = Allocator::new(&harness.db);
    let notifier = MockNotifier::new();
    let controller = LifecycleController::new(harness.db.clone(), Arc::new(notifier.clone()));

    let registration = enroll(&harness.db, &allocator, &notifier, applicant("006", "Mali"))
        .await
        .unwrap();
    let id = registration.registration_id;

    let reviewing = controller
        .apply_status(&id, Status::UnderReview, None, Some("admin@marma.org"))
        .await
        .unwrap();
    assert_eq!(reviewing.status, Status::UnderReview);
    assert!(reviewing.status_updated_at.is_some());
    assert_eq!(notifier.status_changes(), 0);

    controller
        .apply_status(&id, Status::Approved, None, Some("admin@marma.org"))
        .await
        .unwrap();
    assert_eq!(notifier.status_changes(), 1);
}

#[tokio::test]
async fn terminal_statuses_reject_backward_transitions() {
    let harness = TestDb::new().await;
    let allocator = Allocator::new(&harness.db);
    let notifier = MockNotifier::new();
    let controller = LifecycleController::new(harness.db.clone(), Arc::new(notifier.clone()));

    let registration = enroll(&harness.db, &allocator, &notifier, applicant("007", "Senegal"))
        .await
        .unwrap();
    let id = registration.registration_id;

    let approved = controller
        .apply_status(&id, Status::Approved, Some("welcome"), None)
        .await
        .unwrap();

    for target in [Status::Pending, Status::UnderReview, Status::Declined] {
        let err = controller
            .apply_status(&id, target, Some("should not apply"), None)
            .await
            .unwrap_err();
        assert!(
            matches!(
                err,
                TransitionError::InvalidTransition {
                    from: Status::Approved,
                    ..
                }
            ),
            "expected rejection for {target:?}"
        );
    }

    // Nothing about the record moved.
    let stored = harness.db.registrations().find(&id).await.unwrap().unwrap();
    assert_eq!(stored.status, Status::Approved);
    assert_eq!(stored.status_message.as_deref(), Some("welcome"));
    assert_eq!(stored.status_updated_at, approved.status_updated_at);
    assert_eq!(notifier.status_changes(), 1);
}

#[tokio::test]
async fn notifier_failure_does_not_roll_back_the_decision() {
    let harness = TestDb::new().await;
    let allocator = Allocator::new(&harness.db);
    let confirmations = MockNotifier::new();
    let failing = MockNotifier::failing();
    let controller = LifecycleController::new(harness.db.clone(), Arc::new(failing.clone()));

    let registration = enroll(&harness.db, &allocator, &confirmations, applicant("008", "Guinea"))
        .await
        .unwrap();
    let id = registration.registration_id;

    let approved = controller
        .apply_status(&id, Status::Approved, None, None)
        .await
        .unwrap();
    assert_eq!(approved.status, Status::Approved);

    let stored = harness.db.registrations().find(&id).await.unwrap().unwrap();
    assert_eq!(stored.status, Status::Approved);
    assert_eq!(failing.status_changes(), 0);
}

#[tokio::test]
async fn concurrent_identical_decisions_notify_once() {
    let harness = TestDb::new().await;
    let allocator = Allocator::new(&harness.db);
    let notifier = MockNotifier::new();
    let controller = LifecycleController::new(harness.db.clone(), Arc::new(notifier.clone()));

    let registration = enroll(&harness.db, &allocator, &notifier, applicant("009", "Gambia"))
        .await
        .unwrap();
    let id = registration.registration_id;

    let a = {
        let controller = controller.clone();
        tokio::spawn(async move {
            controller
                .apply_status(&id, Status::Approved, Some("welcome"), None)
                .await
        })
    };
    let b = {
        let controller = controller.clone();
        tokio::spawn(async move {
            controller
                .apply_status(&id, Status::Approved, Some("welcome"), None)
                .await
        })
    };

    let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());
    assert_eq!(a.status, Status::Approved);
    assert_eq!(b.status, Status::Approved);
    // The row lock serializes the two requests; the loser takes the no-op
    // path, so exactly one email goes out.
    assert_eq!(notifier.status_changes(), 1);
}
