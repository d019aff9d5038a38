//! Fallback cache store: the last known-good validation results.
//!
//! Two read paths with different staleness rules. `get` is the ordinary
//! cache lookup and honors the entry's TTL strictly. `get_fallback` is
//! used only when live validation is unavailable: it ignores the TTL and
//! applies a much looser independent max age, so an installation that
//! validated recently keeps working through a server outage.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::storage::{keys, StorageAdapter};
use crate::types::CachedValidation;

#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// In-memory entry cap; exceeding it trims the oldest 20%
    pub capacity: usize,
    /// Oldest entry `get_fallback` will ever return, in seconds
    pub fallback_max_age_secs: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            capacity: 64,
            fallback_max_age_secs: 24 * 3600,
        }
    }
}

/// One cached validation result. `expires_at` is `None` for TTL-0 entries,
/// which are never served by `get` but stay fallback-eligible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: CachedValidation,
    pub cached_at: i64,
    pub expires_at: Option<i64>,
}

/// In-memory map mirrored to a [`StorageAdapter`] so cached results
/// survive restarts.
pub struct FallbackCache {
    config: CacheConfig,
    storage: Arc<dyn StorageAdapter>,
    entries: HashMap<String, CacheEntry>,
}

impl FallbackCache {
    pub fn new(config: CacheConfig, storage: Arc<dyn StorageAdapter>) -> Self {
        let entries = storage
            .get(keys::CACHE)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();

        FallbackCache {
            config,
            storage,
            entries,
        }
    }

    /// Store a validation result with the server-advised TTL.
    pub fn set(&mut self, key: &str, value: CachedValidation, ttl_seconds: i64, now: i64) {
        let expires_at = if ttl_seconds > 0 {
            Some(now + ttl_seconds)
        } else {
            None
        };
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                cached_at: now,
                expires_at,
            },
        );

        if self.entries.len() > self.config.capacity {
            self.trim();
        }

        self.persist();
    }

    /// Fresh lookup: only entries strictly before their expiry.
    pub fn get(&self, key: &str, now: i64) -> Option<CacheEntry> {
        let entry = self.entries.get(key)?;
        match entry.expires_at {
            Some(expires_at) if now < expires_at => Some(entry.clone()),
            _ => None,
        }
    }

    /// Relaxed lookup for when the live path is unavailable. Ignores the
    /// TTL but refuses entries older than the fallback max age.
    pub fn get_fallback(&self, key: &str, now: i64) -> Option<CacheEntry> {
        let entry = self.entries.get(key)?;
        if now - entry.cached_at <= self.config.fallback_max_age_secs {
            Some(entry.clone())
        } else {
            None
        }
    }

    pub fn remove(&mut self, key: &str) {
        if self.entries.remove(key).is_some() {
            self.persist();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop the oldest 20% of entries by `cached_at`.
    fn trim(&mut self) {
        let drop_count = (self.entries.len() + 4) / 5;
        let mut by_age: Vec<(String, i64)> = self
            .entries
            .iter()
            .map(|(k, e)| (k.clone(), e.cached_at))
            .collect();
        by_age.sort_by_key(|(_, cached_at)| *cached_at);

        for (key, _) in by_age.into_iter().take(drop_count) {
            self.entries.remove(&key);
        }
    }

    fn persist(&self) {
        if let Ok(raw) = serde_json::to_string(&self.entries) {
            self.storage.set(keys::CACHE, &raw);
        }
    }
}
