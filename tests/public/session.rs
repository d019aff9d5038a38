//! Session endpoint tests: start, heartbeat, takeover, end over HTTP.

#[path = "../common/mod.rs"]
mod common;
use common::*;

use axum::http::StatusCode;

fn session_body(token: &str, fingerprint: &str, name: Option<&str>) -> serde_json::Value {
    let mut body = serde_json::json!({
        "identity": {
            "email": "owner@bistro.test",
            "installation_token": token,
            "device_fingerprint": fingerprint,
        }
    });
    if let Some(name) = name {
        body["device_name"] = serde_json::json!(name);
    }
    body
}

#[tokio::test]
async fn conflict_takeover_and_expiry_flow() {
    let (state, _dir) = create_test_app_state();
    let token = {
        let conn = state.db.get().unwrap();
        let (_, token) = create_test_subscription(&conn, "owner@bistro.test");
        token
    };
    let app = test_app(state);

    // Device A opens the shift
    let (status, body) = post_json(
        &app,
        "/session/start",
        session_body(&token, "terminal-a", Some("Front counter")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowed"], true);
    let session_a = body["session_id"].as_str().unwrap().to_string();

    // Device B is told who holds the license
    let (status, body) = post_json(
        &app,
        "/session/start",
        session_body(&token, "terminal-b", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowed"], false);
    assert!(body.get("session_id").is_none());
    assert_eq!(body["conflict"]["device_fingerprint"], "terminal-a");
    assert_eq!(body["conflict"]["device_name"], "Front counter");

    // The user confirms the takeover on device B
    let (status, body) = post_json(
        &app,
        "/session/takeover",
        session_body(&token, "terminal-b", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let session_b = body["session_id"].as_str().unwrap().to_string();
    assert_ne!(session_b, session_a);

    // Device A's next heartbeat learns it was superseded
    let (status, body) = post_json(
        &app,
        "/session/heartbeat",
        serde_json::json!({ "session_id": session_a }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], false);
    assert_eq!(body["reason"], "expired");

    // Device B heartbeats normally
    let (status, body) = post_json(
        &app,
        "/session/heartbeat",
        serde_json::json!({ "session_id": session_b }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert!(body["last_heartbeat_at"].is_number());

    // Closing time
    let (status, body) = post_json(
        &app,
        "/session/end",
        serde_json::json!({ "session_id": session_b }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ended"], true);
}

#[tokio::test]
async fn abandoned_session_does_not_block_a_new_start() {
    let (state, _dir) = create_test_app_state();
    let token = {
        let conn = state.db.get().unwrap();
        let (_, token) = create_test_subscription(&conn, "owner@bistro.test");
        token
    };
    let liveness = state.liveness_window_secs();
    let app = test_app(state.clone());

    let (_, body) = post_json(
        &app,
        "/session/start",
        session_body(&token, "terminal-a", None),
    )
    .await;
    let session_a = body["session_id"].as_str().unwrap().to_string();

    // Terminal A's network drops and its heartbeats stop
    {
        let conn = state.db.get().unwrap();
        backdate_heartbeat(&conn, &session_a, queries::now() - liveness - 10);
    }

    let (status, body) = post_json(
        &app,
        "/session/start",
        session_body(&token, "terminal-b", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowed"], true);
}

#[tokio::test]
async fn expired_subscription_cannot_start_a_session() {
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
        "/session/start",
        session_body(&token, "terminal-a", None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["category"], "subscription");

    let (status, body) = post_json(
        &app,
        "/session/takeover",
        session_body(&token, "terminal-a", None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["category"], "subscription");
}

#[tokio::test]
async fn ending_an_unknown_session_is_a_no_op() {
    let (state, _dir) = create_test_app_state();
    let app = test_app(state);

    let (status, body) = post_json(
        &app,
        "/session/end",
        serde_json::json!({ "session_id": "no-such-session" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ended"], false);
}
