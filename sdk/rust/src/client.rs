//! TableTide client: the validation orchestrator.
//!
//! `validate` runs a four-tier ladder: fresh cache, live call through the
//! circuit breaker, durable fallback, offline denial. Transport failures
//! never surface from `validate` while a usable cached answer exists; the
//! caller always gets a [`ValidationOutcome`] telling it exactly which
//! tier answered.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

use crate::breaker::{BreakerConfig, BreakerState, CircuitBreaker, Clock, SystemClock};
use crate::cache::{CacheConfig, FallbackCache};
use crate::device::{generate_uuid, machine_fingerprint};
use crate::error::{map_category, Result, SdkError};
use crate::storage::{keys, MemoryStorage, StorageAdapter};
use crate::types::*;

/// Deadline for a validation round trip
pub const VALIDATE_TIMEOUT: Duration = Duration::from_secs(5);
/// Deadline for a heartbeat round trip, kept tight so a dying server
/// cannot stall the POS heartbeat loop
pub const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(3);

/// How long a fallback answer may be trusted before a mandatory re-check
const FALLBACK_RECHECK_SECS: i64 = 300;
/// Retry hint when offline with no breaker estimate
const OFFLINE_RETRY_SECS: i64 = 30;

/// The remote calls the orchestrator makes, as a seam so the ladder is
/// testable against a stub.
pub trait ValidationTransport: Send + Sync {
    fn validate(&self, req: &ValidateRequest)
        -> impl Future<Output = Result<ValidateResponse>> + Send;
    fn start_session(&self, req: &SessionRequest)
        -> impl Future<Output = Result<SessionBlock>> + Send;
    fn heartbeat(&self, req: &SessionIdRequest)
        -> impl Future<Output = Result<HeartbeatResponse>> + Send;
    fn end_session(&self, req: &SessionIdRequest)
        -> impl Future<Output = Result<EndSessionResponse>> + Send;
    fn takeover(&self, req: &SessionRequest)
        -> impl Future<Output = Result<TakeoverResponse>> + Send;
}

/// reqwest-backed transport talking to a TableTide server.
pub struct HttpTransport {
    http: HttpClient,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = HttpClient::builder()
            .user_agent(concat!("tabletide-sdk-rust/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SdkError::network(e.to_string()))?;

        Ok(HttpTransport {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<T, B>(&self, path: &str, body: &B, timeout: Duration) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
        B: Serialize,
    {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .http
            .post(&url)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SdkError::timeout(format!("Request to {} timed out", path))
                } else {
                    SdkError::network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if !response.status().is_success() {
            #[derive(Deserialize)]
            struct RetryBody {
                #[serde(default)]
                after_seconds: Option<i64>,
            }

            #[derive(Deserialize)]
            struct ErrorBody {
                error: Option<String>,
                category: Option<String>,
                details: Option<String>,
                retry: Option<RetryBody>,
            }

            let body: ErrorBody = response.json().await.unwrap_or(ErrorBody {
                error: None,
                category: None,
                details: None,
                retry: None,
            });

            let message = match (&body.error, &body.details) {
                (Some(err), Some(details)) => format!("{}: {}", err, details),
                (Some(err), None) => err.clone(),
                (None, Some(details)) => details.clone(),
                (None, None) => format!("Request failed: {}", status),
            };

            return Err(SdkError {
                code: map_category(body.category.as_deref(), status),
                message,
                status: Some(status),
                retry_after: body.retry.and_then(|r| r.after_seconds),
            });
        }

        response
            .json()
            .await
            .map_err(|e| SdkError::validation(e.to_string()))
    }
}

impl ValidationTransport for HttpTransport {
    async fn validate(&self, req: &ValidateRequest) -> Result<ValidateResponse> {
        self.post("/validate", req, VALIDATE_TIMEOUT).await
    }

    async fn start_session(&self, req: &SessionRequest) -> Result<SessionBlock> {
        self.post("/session/start", req, VALIDATE_TIMEOUT).await
    }

    async fn heartbeat(&self, req: &SessionIdRequest) -> Result<HeartbeatResponse> {
        self.post("/session/heartbeat", req, HEARTBEAT_TIMEOUT).await
    }

    async fn end_session(&self, req: &SessionIdRequest) -> Result<EndSessionResponse> {
        self.post("/session/end", req, VALIDATE_TIMEOUT).await
    }

    async fn takeover(&self, req: &SessionRequest) -> Result<TakeoverResponse> {
        self.post("/session/takeover", req, VALIDATE_TIMEOUT).await
    }
}

/// Configuration options for the TableTide client
#[derive(Default)]
pub struct TabletideOptions {
    /// Custom storage adapter (default: MemoryStorage)
    pub storage: Option<Arc<dyn StorageAdapter>>,
    /// Human-readable device label shown in session conflicts
    pub device_name: Option<String>,
    /// Override the device fingerprint (default: machine-derived)
    pub device_fingerprint: Option<String>,
    pub breaker: BreakerConfig,
    pub cache: CacheConfig,
    /// Override the time source (tests)
    pub clock: Option<Arc<dyn Clock>>,
}

impl std::fmt::Debug for TabletideOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TabletideOptions")
            .field("storage", &"<storage>")
            .field("device_name", &self.device_name)
            .field("device_fingerprint", &self.device_fingerprint)
            .field("breaker", &self.breaker)
            .field("cache", &self.cache)
            .finish()
    }
}

/// TableTide SDK client.
///
/// Owns the circuit breaker and fallback cache for one installation
/// identity; construct it once at startup and share it for the process
/// lifetime.
pub struct Tabletide<T: ValidationTransport> {
    transport: T,
    identity: Identity,
    device_name: Option<String>,
    storage: Arc<dyn StorageAdapter>,
    clock: Arc<dyn Clock>,
    breaker: Mutex<CircuitBreaker>,
    cache: Mutex<FallbackCache>,
}

impl Tabletide<HttpTransport> {
    /// Create a client talking to a TableTide server over HTTP.
    pub fn new(
        base_url: &str,
        email: &str,
        installation_token: &str,
        options: TabletideOptions,
    ) -> Result<Self> {
        let transport = HttpTransport::new(base_url)?;
        Self::with_transport(transport, email, installation_token, options)
    }
}

impl<T: ValidationTransport> Tabletide<T> {
    /// Create a client over a custom transport.
    pub fn with_transport(
        transport: T,
        email: &str,
        installation_token: &str,
        options: TabletideOptions,
    ) -> Result<Self> {
        if email.is_empty() || installation_token.is_empty() {
            return Err(SdkError::validation("email and installation_token are required"));
        }

        let storage: Arc<dyn StorageAdapter> = options
            .storage
            .unwrap_or_else(|| Arc::new(MemoryStorage::new()));

        let device_fingerprint = options.device_fingerprint.unwrap_or_else(|| {
            if let Some(fp) = storage.get(keys::DEVICE_FINGERPRINT) {
                return fp;
            }
            let fp = machine_fingerprint().unwrap_or_else(|_| generate_uuid());
            storage.set(keys::DEVICE_FINGERPRINT, &fp);
            fp
        });

        let clock: Arc<dyn Clock> = options.clock.unwrap_or_else(|| Arc::new(SystemClock));

        Ok(Tabletide {
            transport,
            identity: Identity {
                email: email.to_string(),
                installation_token: installation_token.to_string(),
                device_fingerprint,
            },
            device_name: options.device_name,
            storage: storage.clone(),
            clock: clock.clone(),
            breaker: Mutex::new(CircuitBreaker::with_clock(options.breaker, clock)),
            cache: Mutex::new(FallbackCache::new(options.cache, storage)),
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn breaker_state(&self) -> BreakerState {
        lock(&self.breaker).state()
    }

    /// The session id from the last allowed start/takeover, if any.
    pub fn current_session_id(&self) -> Option<String> {
        self.storage.get(keys::SESSION_ID)
    }

    // ==================== Validation ====================

    /// Validate this installation's license.
    ///
    /// Ladder: fresh cache (when `allow_cache`), then a live call guarded
    /// by the circuit breaker, then the durable fallback, then an offline
    /// denial with a retry hint. Definitive server denials of the
    /// *request* (bad credentials, rate limit) surface as errors; loss of
    /// *connectivity* never does.
    pub async fn validate(&self, options: ValidateOptions) -> Result<ValidationOutcome> {
        let key = self.identity.identity_hash();
        let now = self.clock.now();

        if options.allow_cache {
            if let Some(entry) = lock(&self.cache).get(&key, now) {
                return Ok(ValidationOutcome::Cache {
                    age_seconds: now - entry.cached_at,
                    result: entry.value,
                });
            }
        }

        if lock(&self.breaker).try_call().is_err() {
            return Ok(self.degraded(&key, now));
        }

        let req = ValidateRequest {
            identity: self.identity.clone(),
            device_name: self.device_name.clone(),
            options,
        };

        match self.transport.validate(&req).await {
            Ok(response) => {
                lock(&self.breaker).record_success();
                if response.validation.valid {
                    lock(&self.cache).set(
                        &key,
                        CachedValidation::from_response(&response),
                        response.caching.ttl_seconds,
                        now,
                    );
                }
                if let Some(session) = &response.session {
                    self.remember_session(session.session_id.as_deref());
                }
                Ok(ValidationOutcome::Live(response))
            }
            Err(e) if e.is_transport() => {
                lock(&self.breaker).record_failure();
                Ok(self.degraded(&key, now))
            }
            Err(e) => {
                // The server answered; the backend is healthy
                lock(&self.breaker).record_success();
                Err(e)
            }
        }
    }

    /// Resolve a degraded validation: durable fallback if recent enough,
    /// otherwise an offline denial.
    fn degraded(&self, key: &str, now: i64) -> ValidationOutcome {
        if let Some(entry) = lock(&self.cache).get_fallback(key, now) {
            return ValidationOutcome::Fallback {
                age_seconds: now - entry.cached_at,
                result: entry.value,
                recheck_by: now + FALLBACK_RECHECK_SECS,
            };
        }

        let retry_after_seconds = match lock(&self.breaker).retry_after_secs() {
            Some(secs) if secs > 0 => secs,
            _ => OFFLINE_RETRY_SECS,
        };
        ValidationOutcome::Offline {
            retry_after_seconds,
        }
    }

    // ==================== Sessions ====================

    /// Start (or resume) this device's session. `allowed: false` carries
    /// the conflicting device's metadata so the user can be offered a
    /// takeover.
    pub async fn start_session(&self) -> Result<SessionBlock> {
        let req = SessionRequest {
            identity: self.identity.clone(),
            device_name: self.device_name.clone(),
        };
        let block = self.guarded(self.transport.start_session(&req)).await?;
        self.remember_session(block.session_id.as_deref());
        Ok(block)
    }

    /// Heartbeat the current session. `ok: false` means the session was
    /// superseded or timed out; the device must validate and start again.
    pub async fn heartbeat(&self, session_id: &str) -> Result<HeartbeatResponse> {
        let req = SessionIdRequest {
            session_id: session_id.to_string(),
        };
        let response = self.guarded(self.transport.heartbeat(&req)).await?;
        if !response.ok {
            self.storage.remove(keys::SESSION_ID);
        }
        Ok(response)
    }

    /// Release the current session (end of shift).
    pub async fn end_session(&self, session_id: &str) -> Result<EndSessionResponse> {
        let req = SessionIdRequest {
            session_id: session_id.to_string(),
        };
        let response = self.guarded(self.transport.end_session(&req)).await?;
        self.storage.remove(keys::SESSION_ID);
        Ok(response)
    }

    /// User-confirmed takeover of the license from another device.
    pub async fn takeover(&self) -> Result<TakeoverResponse> {
        let req = SessionRequest {
            identity: self.identity.clone(),
            device_name: self.device_name.clone(),
        };
        let response = self.guarded(self.transport.takeover(&req)).await?;
        self.remember_session(Some(&response.session_id));
        Ok(response)
    }

    // ==================== Internal ====================

    /// Bracket a remote call with breaker accounting. Transport failures
    /// count against the breaker; definitive server answers reset it.
    async fn guarded<R>(&self, fut: impl Future<Output = Result<R>>) -> Result<R> {
        lock(&self.breaker).try_call()?;
        match fut.await {
            Ok(value) => {
                lock(&self.breaker).record_success();
                Ok(value)
            }
            Err(e) if e.is_transport() => {
                lock(&self.breaker).record_failure();
                Err(e)
            }
            Err(e) => {
                lock(&self.breaker).record_success();
                Err(e)
            }
        }
    }

    fn remember_session(&self, session_id: Option<&str>) {
        if let Some(id) = session_id {
            self.storage.set(keys::SESSION_ID, id);
        }
    }
}

// Breaker and cache mutexes are only held for in-memory bookkeeping, so a
// panic mid-update cannot leave partial state worth rejecting.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
