//! /validate endpoint tests.

#[path = "../common/mod.rs"]
mod common;
use common::*;

use axum::http::StatusCode;

#[tokio::test]
async fn health_reports_ok() {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    let (state, _dir) = create_test_app_state();
    let app = test_app(state);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn trial_validation_succeeds_with_session_and_cache_advice() {
    let (state, _dir) = create_test_app_state();
    let token = {
        let conn = state.db.get().unwrap();
        let (_, token) = create_test_subscription(&conn, "owner@bistro.test");
        token
    };
    let app = test_app(state);

    let (status, body) = post_json(
        &app,
        "/validate",
        validate_body("owner@bistro.test", &token, "terminal-a"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["validation"]["valid"], true);
    assert_eq!(body["validation"]["status"], "trial");
    assert_eq!(body["session"]["allowed"], true);
    assert!(body["session"]["session_id"].is_string());
    // Nothing to serve from cache before the first validation completes
    assert_eq!(body["caching"]["strategy"], "immediate");
    assert_eq!(body["caching"]["ttl_seconds"], 0);
    assert!(body["performance"]["response_time_ms"].is_number());

    // Second validation: trial subscriptions re-check frequently
    let (status, body) = post_json(
        &app,
        "/validate",
        validate_body("owner@bistro.test", &token, "terminal-a"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["caching"]["strategy"], "frequent");
    assert_eq!(body["caching"]["ttl_seconds"], 120);
    // Same device resumes its own session
    assert_eq!(body["session"]["allowed"], true);
}

#[tokio::test]
async fn stable_active_subscription_gets_aggressive_caching() {
    let (state, _dir) = create_test_app_state();
    let token = {
        let conn = state.db.get().unwrap();
        let (sub, token) = create_test_subscription(&conn, "owner@bistro.test");
        set_subscription_status(&conn, &sub.id, "active");
        set_period_end(&conn, &sub.id, future_timestamp(ONE_YEAR));
        queries::record_validation(&conn, &sub.id, queries::now()).unwrap();
        token
    };
    let app = test_app(state);

    let (status, body) = post_json(
        &app,
        "/validate",
        validate_body("owner@bistro.test", &token, "terminal-a"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["validation"]["valid"], true);
    assert_eq!(body["caching"]["strategy"], "aggressive");
    assert_eq!(body["caching"]["ttl_seconds"], 3600);
}

#[tokio::test]
async fn wrong_token_is_an_auth_error() {
    let (state, _dir) = create_test_app_state();
    {
        let conn = state.db.get().unwrap();
        create_test_subscription(&conn, "owner@bistro.test");
    }
    let app = test_app(state);

    let (status, body) = post_json(
        &app,
        "/validate",
        validate_body("owner@bistro.test", "tt_wrong", "terminal-a"),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["category"], "auth");
    assert_eq!(body["retry"]["allowed"], false);
    // The message must not reveal whether the email exists
    assert!(!body["details"].as_str().unwrap().contains("owner@"));
}

#[tokio::test]
async fn expired_trial_is_denied_with_no_session_and_no_caching() {
    let (state, _dir) = create_test_app_state();
    let token = {
        let conn = state.db.get().unwrap();
        let (sub, token) = create_test_subscription(&conn, "owner@bistro.test");
        set_period_end(&conn, &sub.id, queries::now() - ONE_DAY);
        token
    };
    let app = test_app(state);

    let (status, body) = post_json(
        &app,
        "/validate",
        validate_body("owner@bistro.test", &token, "terminal-a"),
    )
    .await;

    // Denial is a well-formed answer, not a transport error
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["validation"]["valid"], false);
    assert_eq!(body["validation"]["status"], "expired");
    assert!(body.get("session").is_none());
    // Denials are never cached
    assert_eq!(body["caching"]["strategy"], "immediate");
    assert_eq!(body["caching"]["ttl_seconds"], 0);
}

#[tokio::test]
async fn second_device_sees_session_conflict_through_validate() {
    let (state, _dir) = create_test_app_state();
    let token = {
        let conn = state.db.get().unwrap();
        let (_, token) = create_test_subscription(&conn, "owner@bistro.test");
        token
    };
    let app = test_app(state);

    let (_, body) = post_json(
        &app,
        "/validate",
        validate_body("owner@bistro.test", &token, "terminal-a"),
    )
    .await;
    assert_eq!(body["session"]["allowed"], true);

    let (status, body) = post_json(
        &app,
        "/validate",
        validate_body("owner@bistro.test", &token, "terminal-b"),
    )
    .await;

    // Entitlement holds, the session slot does not
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["validation"]["valid"], true);
    assert_eq!(body["session"]["allowed"], false);
    assert_eq!(body["session"]["conflict"]["device_fingerprint"], "terminal-a");
}

#[tokio::test]
async fn performance_mode_skips_session_coordination() {
    let (state, _dir) = create_test_app_state();
    let token = {
        let conn = state.db.get().unwrap();
        let (_, token) = create_test_subscription(&conn, "owner@bistro.test");
        token
    };
    let app = test_app(state);

    let mut body = validate_body("owner@bistro.test", &token, "terminal-a");
    body["options"] = serde_json::json!({ "performance_mode": true });

    let (status, body) = post_json(&app, "/validate", body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["validation"]["valid"], true);
    assert!(body.get("session").is_none());
}

#[tokio::test]
async fn validation_is_rate_limited_per_identity() {
    let (mut state, _dir) = create_test_app_state();
    state.validate_rate_limit_per_minute = 2;
    let token = {
        let conn = state.db.get().unwrap();
        let (_, token) = create_test_subscription(&conn, "owner@bistro.test");
        token
    };
    let app = test_app(state);

    for _ in 0..2 {
        let (status, _) = post_json(
            &app,
            "/validate",
            validate_body("owner@bistro.test", &token, "terminal-a"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = post_json(
        &app,
        "/validate",
        validate_body("owner@bistro.test", &token, "terminal-a"),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["category"], "system");
    assert_eq!(body["retry"]["allowed"], true);
    let after = body["retry"]["after_seconds"].as_i64().unwrap();
    assert!(after > 0 && after <= 60);

    // A different device is a different identity and is not throttled
    let (status, _) = post_json(
        &app,
        "/validate",
        validate_body("owner@bistro.test", &token, "terminal-b"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn malformed_request_is_a_validation_error() {
    let (state, _dir) = create_test_app_state();
    let app = test_app(state);

    let (status, body) = post_raw(
        &app,
        "/validate",
        &[("content-type", "application/json")],
        b"{\"identity\": {}".to_vec(),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["category"], "validation");
    assert_eq!(body["retry"]["allowed"], false);
}
