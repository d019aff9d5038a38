//! Hashing and webhook signature verification.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a webhook timestamp before it's rejected (in seconds).
/// Billing providers recommend 300 seconds (5 minutes).
const WEBHOOK_TIMESTAMP_TOLERANCE_SECS: i64 = 300;

/// Hash a secret (installation token) for storage.
/// Tokens are high-entropy, so an unsalted digest is sufficient.
pub fn hash_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Stable hash of a validating identity, used as the cache and
/// rate-limit key. Never logged in full.
pub fn identity_hash(email: &str, installation_token: &str, device_fingerprint: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(email.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(installation_token.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(device_fingerprint.as_bytes());
    hex::encode(hasher.finalize())
}

/// Verify a billing webhook signature header of the form `t=<ts>,v1=<hex>`.
///
/// The signed payload is `{timestamp}.{body}`. Timestamps outside the
/// tolerance window are rejected to prevent replay of captured deliveries.
pub fn verify_webhook_signature(
    secret: &str,
    payload: &[u8],
    signature: &str,
    now: i64,
) -> Result<bool> {
    let mut timestamp = None;
    let mut sig_v1 = None;

    for part in signature.split(',') {
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = Some(t);
        } else if let Some(s) = part.strip_prefix("v1=") {
            sig_v1 = Some(s);
        }
    }

    let timestamp_str =
        timestamp.ok_or_else(|| AppError::BadRequest("Invalid signature format".into()))?;
    let sig_v1 =
        sig_v1.ok_or_else(|| AppError::BadRequest("Invalid signature format".into()))?;

    let timestamp: i64 = timestamp_str
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid timestamp in signature".into()))?;

    let age = now - timestamp;

    if age > WEBHOOK_TIMESTAMP_TOLERANCE_SECS {
        tracing::warn!(
            "Webhook rejected: timestamp too old (age={}s, max={}s)",
            age,
            WEBHOOK_TIMESTAMP_TOLERANCE_SECS
        );
        return Ok(false);
    }

    // Also reject timestamps from the future (clock skew tolerance: 60 seconds)
    if age < -60 {
        tracing::warn!("Webhook rejected: timestamp in the future (age={}s)", age);
        return Ok(false);
    }

    let signed_payload = format!("{}.{}", timestamp_str, String::from_utf8_lossy(payload));

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Internal("Invalid webhook secret".into()))?;
    mac.update(signed_payload.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());

    let expected_bytes = expected.as_bytes();
    let provided_bytes = sig_v1.as_bytes();

    // Length is not secret (always 64 hex chars for SHA-256)
    if expected_bytes.len() != provided_bytes.len() {
        return Ok(false);
    }

    Ok(expected_bytes.ct_eq(provided_bytes).into())
}

/// Build a signature header for a payload. Used by tests and dev tooling
/// to exercise the webhook endpoint.
pub fn sign_webhook_payload(secret: &str, payload: &[u8], timestamp: i64) -> String {
    let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(signed_payload.as_bytes());
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}
