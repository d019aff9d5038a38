//! Webhook idempotency ledger tests: exactly-once application under retries.

#[path = "../common/mod.rs"]
mod common;
use common::*;

use tabletide::db::queries::EventClaim;

#[test]
fn first_delivery_claims_the_event() {
    let conn = setup_test_db();

    let claim = queries::claim_webhook_event(&conn, "evt_001", "payment_succeeded").unwrap();
    assert_eq!(claim, EventClaim::Claimed);

    let stored = queries::get_webhook_event(&conn, "evt_001").unwrap().unwrap();
    assert_eq!(stored.processing_status, ProcessingStatus::Processing);
    assert_eq!(stored.event_type, "payment_succeeded");
}

#[test]
fn redelivery_while_processing_is_in_flight() {
    let conn = setup_test_db();

    queries::claim_webhook_event(&conn, "evt_001", "payment_succeeded").unwrap();
    let second = queries::claim_webhook_event(&conn, "evt_001", "payment_succeeded").unwrap();
    assert_eq!(second, EventClaim::InFlight);
}

#[test]
fn redelivery_after_completion_is_a_duplicate() {
    let conn = setup_test_db();

    queries::claim_webhook_event(&conn, "evt_001", "payment_failed").unwrap();
    queries::complete_webhook_event(&conn, "evt_001").unwrap();

    let second = queries::claim_webhook_event(&conn, "evt_001", "payment_failed").unwrap();
    assert_eq!(second, EventClaim::Duplicate);

    let stored = queries::get_webhook_event(&conn, "evt_001").unwrap().unwrap();
    assert_eq!(stored.processing_status, ProcessingStatus::Completed);
    assert!(stored.processed_at.is_some());
}

#[test]
fn failed_event_is_reclaimable() {
    let conn = setup_test_db();

    queries::claim_webhook_event(&conn, "evt_001", "payment_succeeded").unwrap();
    queries::fail_webhook_event(&conn, "evt_001", "subscription missing").unwrap();

    let stored = queries::get_webhook_event(&conn, "evt_001").unwrap().unwrap();
    assert_eq!(stored.processing_status, ProcessingStatus::Failed);
    assert_eq!(stored.last_error.as_deref(), Some("subscription missing"));

    // Provider retry of the same id gets to try again
    let retry = queries::claim_webhook_event(&conn, "evt_001", "payment_succeeded").unwrap();
    assert_eq!(retry, EventClaim::Claimed);

    let reclaimed = queries::get_webhook_event(&conn, "evt_001").unwrap().unwrap();
    assert_eq!(reclaimed.processing_status, ProcessingStatus::Processing);
    assert_eq!(reclaimed.last_error, None);
}

#[test]
fn distinct_event_ids_do_not_interfere() {
    let conn = setup_test_db();

    assert_eq!(
        queries::claim_webhook_event(&conn, "evt_001", "payment_succeeded").unwrap(),
        EventClaim::Claimed
    );
    assert_eq!(
        queries::claim_webhook_event(&conn, "evt_002", "payment_succeeded").unwrap(),
        EventClaim::Claimed
    );
}

#[test]
fn prune_drops_only_old_records() {
    let conn = setup_test_db();

    queries::claim_webhook_event(&conn, "evt_old", "payment_succeeded").unwrap();
    queries::complete_webhook_event(&conn, "evt_old").unwrap();
    conn.execute(
        "UPDATE webhook_events SET received_at = ?2 WHERE provider_event_id = ?1",
        rusqlite::params!["evt_old", queries::now() - 91 * ONE_DAY],
    )
    .unwrap();

    queries::claim_webhook_event(&conn, "evt_new", "payment_succeeded").unwrap();

    let pruned = queries::prune_webhook_events(&conn, queries::now() - 90 * ONE_DAY).unwrap();
    assert_eq!(pruned, 1);
    assert!(queries::get_webhook_event(&conn, "evt_old").unwrap().is_none());
    assert!(queries::get_webhook_event(&conn, "evt_new").unwrap().is_some());
}

#[test]
fn concurrent_claims_yield_exactly_one_owner() {
    let (state, _dir) = create_test_app_state();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let pool = state.db.clone();
        handles.push(std::thread::spawn(move || {
            let conn = pool.get().unwrap();
            queries::claim_webhook_event(&conn, "evt_race", "payment_succeeded").unwrap()
        }));
    }

    let results: Vec<EventClaim> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let claimed = results.iter().filter(|r| **r == EventClaim::Claimed).count();
    assert_eq!(claimed, 1, "exactly one delivery may own the event: {:?}", results);
}
