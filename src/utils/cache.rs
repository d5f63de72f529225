//! In-memory response cache with time-based expiration.
//!
//! Entries are keyed by a [`Fingerprint`] of the request (endpoint plus sorted
//! query parameters) and expire lazily: an expired entry is removed by the
//! lookup that finds it. The cache belongs to a single crawler and is never
//! persisted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use super::Payload;

/// Deterministic cache key for a request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Derive a fingerprint from an endpoint and its parameters.
    ///
    /// Parameter order does not matter.
    pub fn new(endpoint: &str, params: &[(String, String)]) -> Self {
        let mut sorted: Vec<&(String, String)> = params.iter().collect();
        sorted.sort();

        // JSON keeps keys and values unambiguous even when they contain '&' or '='
        let canonical = serde_json::json!([endpoint.trim_matches('/'), sorted]).to_string();
        let digest = md5::compute(canonical.as_bytes());
        Self(format!("{:x}", digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug)]
struct CacheEntry {
    payload: Arc<Payload>,
    stored_at: Instant,
}

/// Time-bounded response cache
#[derive(Debug)]
pub struct ResponseCache {
    ttl: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<Fingerprint, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    /// Create a cache; a zero `ttl` disables caching
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Check if caching is enabled
    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    /// Return the cached payload if present and unexpired
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<Arc<Payload>> {
        if !self.is_enabled() {
            return None;
        }

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let fresh = match entries.get(fingerprint) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.payload.clone()),
            Some(_) => {
                tracing::debug!("Cache expired: {}", fingerprint);
                entries.remove(fingerprint);
                None
            }
            None => None,
        };

        match fresh {
            Some(payload) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Cache HIT: {}", fingerprint);
                Some(payload)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Cache MISS: {}", fingerprint);
                None
            }
        }
    }

    /// Store a payload, replacing any previous entry for the fingerprint
    pub fn put(&self, fingerprint: Fingerprint, payload: Arc<Payload>) {
        if !self.is_enabled() {
            return;
        }

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.len() >= self.max_entries && !entries.contains_key(&fingerprint) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.stored_at)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                tracing::debug!("Cache evicting oldest entry: {}", oldest);
                entries.remove(&oldest);
            }
        }

        entries.insert(
            fingerprint,
            CacheEntry {
                payload,
                stored_at: Instant::now(),
            },
        );
    }

    /// Remove every entry
    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        tracing::debug!("Clearing cache with {} entries", entries.len());
        entries.clear();
    }

    /// Number of stored entries, including expired ones not yet evicted
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            enabled: self.is_enabled(),
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            ttl: self.ttl,
        }
    }
}

/// Statistics about the cache
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    /// Whether caching is enabled
    pub enabled: bool,

    /// Stored entries
    pub entries: usize,

    /// Lookups served from the cache
    pub hits: u64,

    /// Lookups that missed or found an expired entry
    pub misses: u64,

    /// Entry time-to-live
    pub ttl: Duration,
}
