//! Billing webhook endpoint tests: signatures and exactly-once application.

#[path = "../common/mod.rs"]
mod common;
use common::*;

use axum::http::StatusCode;

const SIGNATURE_HEADER: &str = "x-billing-signature";

async fn deliver(
    app: &axum::Router,
    event: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let (header, body) = signed_webhook(event);
    post_raw(
        app,
        "/webhooks/billing",
        &[("content-type", "application/json"), (SIGNATURE_HEADER, &header)],
        body,
    )
    .await
}

fn payment_failed_event(event_id: &str, subscription_id: &str) -> serde_json::Value {
    serde_json::json!({
        "id": event_id,
        "type": "payment_failed",
        "data": { "subscription_id": subscription_id }
    })
}

#[tokio::test]
async fn payment_failed_starts_grace_window() {
    let (state, _dir) = create_test_app_state();
    let sub_id = {
        let conn = state.db.get().unwrap();
        let (sub, _) = create_test_subscription(&conn, "owner@bistro.test");
        set_subscription_status(&conn, &sub.id, "active");
        sub.id
    };
    let app = test_app(state.clone());

    let (status, body) = deliver(&app, &payment_failed_event("evt_001", &sub_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["applied"], true);
    assert_eq!(body["status"], "applied");

    let conn = state.db.get().unwrap();
    let sub = queries::get_subscription_by_id(&conn, &sub_id).unwrap().unwrap();
    assert_eq!(sub.status, SubscriptionStatus::PastDue);
    assert!(sub.grace_period_until.is_some());
}

#[tokio::test]
async fn duplicate_delivery_is_not_applied_twice() {
    let (state, _dir) = create_test_app_state();
    let sub_id = {
        let conn = state.db.get().unwrap();
        let (sub, _) = create_test_subscription(&conn, "owner@bistro.test");
        sub.id
    };
    let app = test_app(state.clone());

    let (_, body) = deliver(&app, &payment_failed_event("evt_001", &sub_id)).await;
    assert_eq!(body["status"], "applied");

    // Plant a sentinel deadline; a reapplied event would overwrite it
    let sentinel = future_timestamp(42 * ONE_DAY);
    {
        let conn = state.db.get().unwrap();
        conn.execute(
            "UPDATE subscriptions SET grace_period_until = ?2 WHERE id = ?1",
            rusqlite::params![sub_id, sentinel],
        )
        .unwrap();
    }

    let (status, body) = deliver(&app, &payment_failed_event("evt_001", &sub_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["applied"], false);
    assert_eq!(body["status"], "duplicate");

    let conn = state.db.get().unwrap();
    let sub = queries::get_subscription_by_id(&conn, &sub_id).unwrap().unwrap();
    assert_eq!(sub.grace_period_until, Some(sentinel));
}

#[tokio::test]
async fn payment_succeeded_reactivates_and_advances_period() {
    let (state, _dir) = create_test_app_state();
    let sub_id = {
        let conn = state.db.get().unwrap();
        let (sub, _) = create_test_subscription(&conn, "owner@bistro.test");
        sub.id
    };
    let app = test_app(state.clone());

    deliver(&app, &payment_failed_event("evt_001", &sub_id)).await;

    let new_period_end = future_timestamp(30 * ONE_DAY);
    let (status, body) = deliver(
        &app,
        &serde_json::json!({
            "id": "evt_002",
            "type": "payment_succeeded",
            "data": { "subscription_id": sub_id, "current_period_end": new_period_end }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "applied");

    let conn = state.db.get().unwrap();
    let sub = queries::get_subscription_by_id(&conn, &sub_id).unwrap().unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Active);
    assert_eq!(sub.grace_period_until, None);
    assert_eq!(sub.current_period_end, new_period_end);
}

#[tokio::test]
async fn cancellation_revokes_entitlement() {
    let (state, _dir) = create_test_app_state();
    let (sub_id, token) = {
        let conn = state.db.get().unwrap();
        let (sub, token) = create_test_subscription(&conn, "owner@bistro.test");
        (sub.id, token)
    };
    let app = test_app(state);

    let (_, body) = deliver(
        &app,
        &serde_json::json!({
            "id": "evt_001",
            "type": "subscription_cancelled",
            "data": { "subscription_id": sub_id }
        }),
    )
    .await;
    assert_eq!(body["status"], "applied");

    let (status, body) = post_json(
        &app,
        "/validate",
        validate_body("owner@bistro.test", &token, "terminal-a"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["validation"]["valid"], false);
    assert_eq!(body["validation"]["status"], "cancelled");
}

#[tokio::test]
async fn missing_signature_is_rejected_before_any_claim() {
    let (state, _dir) = create_test_app_state();
    let app = test_app(state.clone());

    let event = payment_failed_event("evt_001", "sub_x");
    let (status, body) = post_raw(
        &app,
        "/webhooks/billing",
        &[("content-type", "application/json")],
        serde_json::to_vec(&event).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["category"], "auth");

    // Nothing was written to the ledger
    let conn = state.db.get().unwrap();
    assert!(queries::get_webhook_event(&conn, "evt_001").unwrap().is_none());
}

#[tokio::test]
async fn tampered_body_fails_signature_check() {
    let (state, _dir) = create_test_app_state();
    let app = test_app(state.clone());

    let (header, _) = signed_webhook(&payment_failed_event("evt_001", "sub_x"));
    let tampered = serde_json::to_vec(&payment_failed_event("evt_001", "sub_other")).unwrap();

    let (status, body) = post_raw(
        &app,
        "/webhooks/billing",
        &[("content-type", "application/json"), ("x-billing-signature", &header)],
        tampered,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["category"], "auth");

    let conn = state.db.get().unwrap();
    assert!(queries::get_webhook_event(&conn, "evt_001").unwrap().is_none());
}

#[tokio::test]
async fn unknown_event_type_is_recorded_but_ignored() {
    let (state, _dir) = create_test_app_state();
    let app = test_app(state.clone());

    let (status, body) = deliver(
        &app,
        &serde_json::json!({
            "id": "evt_001",
            "type": "invoice.finalized",
            "data": { "subscription_id": "sub_x" }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["applied"], false);
    assert_eq!(body["status"], "ignored");

    // Recorded as completed so redelivery is a duplicate
    let conn = state.db.get().unwrap();
    let stored = queries::get_webhook_event(&conn, "evt_001").unwrap().unwrap();
    assert_eq!(stored.processing_status, ProcessingStatus::Completed);
}

#[tokio::test]
async fn failed_event_succeeds_on_redelivery() {
    let (state, _dir) = create_test_app_state();
    let app = test_app(state.clone());

    // References a subscription that does not exist yet
    let event = serde_json::json!({
        "id": "evt_001",
        "type": "payment_succeeded",
        "data": { "subscription_id": "sub_pending" }
    });

    let (status, body) = deliver(&app, &event).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["applied"], false);
    assert_eq!(body["status"], "failed");

    // The subscription shows up before the provider redelivers
    {
        let conn = state.db.get().unwrap();
        let (sub, _) = create_test_subscription(&conn, "owner@bistro.test");
        conn.execute(
            "UPDATE subscriptions SET id = 'sub_pending' WHERE id = ?1",
            rusqlite::params![sub.id],
        )
        .unwrap();
    }

    let (status, body) = deliver(&app, &event).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["applied"], true);
    assert_eq!(body["status"], "applied");
}
