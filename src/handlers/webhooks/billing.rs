//! Billing-provider webhook endpoint.
//!
//! Providers redeliver liberally and without deduplication, so every
//! delivery runs through the idempotency ledger: signature verification
//! first (unverifiable payloads are rejected before any state mutation),
//! then an atomic first-writer-wins claim on the provider event id, then
//! the subscription-state transition, then completion marking. Once a
//! payload is durably claimed the endpoint answers 200 even if the
//! transition fails — the provider's redelivery retries a `failed`
//! record from the claim step.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::crypto;
use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::extractors::Json;
use crate::models::BillingEventType;
use crate::util::days_from;

pub const SIGNATURE_HEADER: &str = "x-billing-signature";

#[derive(Debug, Deserialize)]
pub struct BillingEvent {
    /// Provider's unique event id (idempotency key)
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: BillingEventData,
}

#[derive(Debug, Deserialize)]
pub struct BillingEventData {
    pub subscription_id: String,
    /// New billing period end for payment_succeeded events
    #[serde(default)]
    pub current_period_end: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub applied: bool,
    pub status: &'static str,
}

impl WebhookAck {
    fn new(applied: bool, status: &'static str) -> Self {
        WebhookAck {
            received: true,
            applied,
            status,
        }
    }
}

pub async fn billing_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Auth("Missing webhook signature".into()))?;

    if !crypto::verify_webhook_signature(&state.webhook_secret, &body, signature, queries::now())? {
        return Err(AppError::Auth("Invalid webhook signature".into()));
    }

    let event: BillingEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Malformed event payload: {}", e)))?;

    let conn = state.db.get()?;

    match queries::claim_webhook_event(&conn, &event.id, &event.event_type)? {
        queries::EventClaim::Duplicate => {
            tracing::info!("Duplicate webhook delivery: {}", event.id);
            return Ok(Json(WebhookAck::new(false, "duplicate")));
        }
        queries::EventClaim::InFlight => {
            tracing::info!("Concurrent webhook delivery: {}", event.id);
            return Ok(Json(WebhookAck::new(false, "in_flight")));
        }
        queries::EventClaim::Claimed => {}
    }

    match apply_event(&conn, &event, state.grace_days) {
        Ok(applied) => {
            queries::complete_webhook_event(&conn, &event.id)?;
            if applied {
                Ok(Json(WebhookAck::new(true, "applied")))
            } else {
                Ok(Json(WebhookAck::new(false, "ignored")))
            }
        }
        Err(e) => {
            tracing::error!("Webhook {} failed to apply: {}", event.id, e);
            queries::fail_webhook_event(&conn, &event.id, &e.to_string())?;
            // Claimed durably, so still 200; the provider's redelivery
            // retries from the claim step.
            Ok(Json(WebhookAck::new(false, "failed")))
        }
    }
}

/// Apply the subscription-state transition an event encodes. Returns
/// `Ok(false)` for event types we record but do not act on.
fn apply_event(conn: &Connection, event: &BillingEvent, grace_days: i64) -> Result<bool> {
    let Some(kind) = BillingEventType::from_provider(&event.event_type) else {
        tracing::info!(
            "Ignoring unhandled webhook event type: {}",
            event.event_type
        );
        return Ok(false);
    };

    let subscription_id = &event.data.subscription_id;
    let found = match kind {
        BillingEventType::PaymentSucceeded => {
            queries::apply_payment_succeeded(conn, subscription_id, event.data.current_period_end)?
        }
        BillingEventType::PaymentFailed => {
            let grace_until = days_from(queries::now(), grace_days);
            queries::apply_payment_failed(conn, subscription_id, grace_until)?
        }
        BillingEventType::SubscriptionCancelled => {
            queries::apply_cancellation(conn, subscription_id)?
        }
    };

    if !found {
        return Err(AppError::NotFound(format!(
            "No subscription {}",
            subscription_id
        )));
    }

    Ok(true)
}
