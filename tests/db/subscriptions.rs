//! Subscription lookup and state-transition tests.

#[path = "../common/mod.rs"]
mod common;
use common::*;

#[test]
fn identity_lookup_requires_matching_token() {
    let conn = setup_test_db();
    let (sub, token) = create_test_subscription(&conn, "owner@bistro.test");

    let found = queries::get_subscription_by_identity(&conn, "owner@bistro.test", &token)
        .unwrap()
        .expect("identity should resolve");
    assert_eq!(found.id, sub.id);
    assert_eq!(found.status, SubscriptionStatus::Trial);

    assert!(
        queries::get_subscription_by_identity(&conn, "owner@bistro.test", "tt_wrong")
            .unwrap()
            .is_none()
    );
    assert!(
        queries::get_subscription_by_identity(&conn, "other@bistro.test", &token)
            .unwrap()
            .is_none()
    );
}

#[test]
fn trial_past_period_end_expires() {
    let conn = setup_test_db();
    let (sub, _) = create_test_subscription(&conn, "owner@bistro.test");
    let ts = queries::now();
    set_period_end(&conn, &sub.id, ts - ONE_DAY);

    let sub = queries::get_subscription_by_id(&conn, &sub.id).unwrap().unwrap();
    let updated = queries::apply_time_transitions(&conn, &sub, ts).unwrap();
    assert_eq!(updated.status, SubscriptionStatus::Expired);

    // Persisted, not just returned
    let stored = queries::get_subscription_by_id(&conn, &sub.id).unwrap().unwrap();
    assert_eq!(stored.status, SubscriptionStatus::Expired);
}

#[test]
fn trial_within_period_is_untouched() {
    let conn = setup_test_db();
    let (sub, _) = create_test_subscription(&conn, "owner@bistro.test");

    let updated = queries::apply_time_transitions(&conn, &sub, queries::now()).unwrap();
    assert_eq!(updated.status, SubscriptionStatus::Trial);
}

#[test]
fn past_due_moves_to_grace_after_period_end() {
    let conn = setup_test_db();
    let (sub, _) = create_test_subscription(&conn, "owner@bistro.test");
    let ts = queries::now();

    queries::apply_payment_failed(&conn, &sub.id, ts + 7 * ONE_DAY).unwrap();
    set_period_end(&conn, &sub.id, ts - ONE_DAY);

    let sub = queries::get_subscription_by_id(&conn, &sub.id).unwrap().unwrap();
    assert_eq!(sub.status, SubscriptionStatus::PastDue);

    let updated = queries::apply_time_transitions(&conn, &sub, ts).unwrap();
    assert_eq!(updated.status, SubscriptionStatus::Grace);
    assert!(updated.status.is_entitled());
}

#[test]
fn past_due_beyond_grace_deadline_expires() {
    let conn = setup_test_db();
    let (sub, _) = create_test_subscription(&conn, "owner@bistro.test");
    let ts = queries::now();

    queries::apply_payment_failed(&conn, &sub.id, ts - 1).unwrap();

    let sub = queries::get_subscription_by_id(&conn, &sub.id).unwrap().unwrap();
    let updated = queries::apply_time_transitions(&conn, &sub, ts).unwrap();
    assert_eq!(updated.status, SubscriptionStatus::Expired);
    assert!(!updated.status.is_entitled());
}

#[test]
fn active_past_period_end_waits_for_billing() {
    // Renewal is webhook-driven; the validation walk never expires an
    // active subscription on its own.
    let conn = setup_test_db();
    let (sub, _) = create_test_subscription(&conn, "owner@bistro.test");
    let ts = queries::now();

    set_subscription_status(&conn, &sub.id, "active");
    set_period_end(&conn, &sub.id, ts - ONE_DAY);

    let sub = queries::get_subscription_by_id(&conn, &sub.id).unwrap().unwrap();
    let updated = queries::apply_time_transitions(&conn, &sub, ts).unwrap();
    assert_eq!(updated.status, SubscriptionStatus::Active);
}

#[test]
fn payment_succeeded_clears_grace_and_advances_period() {
    let conn = setup_test_db();
    let (sub, _) = create_test_subscription(&conn, "owner@bistro.test");
    let ts = queries::now();

    queries::apply_payment_failed(&conn, &sub.id, ts + 7 * ONE_DAY).unwrap();
    queries::apply_payment_succeeded(&conn, &sub.id, Some(ts + 30 * ONE_DAY)).unwrap();

    let stored = queries::get_subscription_by_id(&conn, &sub.id).unwrap().unwrap();
    assert_eq!(stored.status, SubscriptionStatus::Active);
    assert_eq!(stored.grace_period_until, None);
    assert_eq!(stored.current_period_end, ts + 30 * ONE_DAY);
    // Failure history is kept for cache-strategy decisions
    assert!(stored.last_payment_failure_at.is_some());
}

#[test]
fn record_validation_increments_count() {
    let conn = setup_test_db();
    let (sub, _) = create_test_subscription(&conn, "owner@bistro.test");
    assert_eq!(sub.validation_count, 0);

    let ts = queries::now();
    queries::record_validation(&conn, &sub.id, ts).unwrap();
    queries::record_validation(&conn, &sub.id, ts).unwrap();

    let stored = queries::get_subscription_by_id(&conn, &sub.id).unwrap().unwrap();
    assert_eq!(stored.validation_count, 2);
    assert_eq!(stored.last_validated_at, Some(ts));
}
