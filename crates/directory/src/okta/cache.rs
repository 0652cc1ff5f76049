//! Short-TTL cache of decoded API pages
//!
//! Pages are keyed by a fingerprint of the request parameters. A live entry
//! answers the request without touching the network; only successfully
//! decoded pages are ever stored.

use chrono::{DateTime, Utc};
use log::debug;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use super::api::PageResult;
use super::client::FetchError;
use super::query::OperationKind;

/// A cached page and its expiry time
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub payload: PageResult,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// In-process page cache shared by every fetch in a process.
///
/// Access is not serialized beyond the map lock: two runs racing on the same
/// fingerprint may both fetch and both store the same page.
pub struct ResponseCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    clock: Clock,
}

impl ResponseCache {
    /// Create an empty cache using the system clock
    pub fn new() -> Self {
        Self::with_clock(Utc::now)
    }

    /// Create an empty cache with a custom time source
    pub fn with_clock(clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock: Box::new(clock),
        }
    }

    /// Return the live page for `fingerprint`, or run `producer` and cache its result.
    ///
    /// A producer error is returned as-is and leaves the cache untouched.
    pub fn get_or_fetch<F>(
        &self,
        fingerprint: &str,
        ttl: Duration,
        producer: F,
    ) -> Result<PageResult, FetchError>
    where
        F: FnOnce() -> Result<PageResult, FetchError>,
    {
        if let Some(page) = self.get(fingerprint) {
            debug!("Page cache hit for {fingerprint}");
            return Ok(page);
        }

        debug!("Page cache miss for {fingerprint}");
        let page = producer()?;
        self.put(fingerprint, page.clone(), ttl);
        Ok(page)
    }

    /// Look up a live entry
    pub fn get(&self, fingerprint: &str) -> Option<PageResult> {
        let now = (self.clock)();
        let entries = self.entries.read().ok()?;
        entries
            .get(fingerprint)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.payload.clone())
    }

    /// Store a page for the full `ttl`, replacing any expired entry
    fn put(&self, fingerprint: &str, payload: PageResult, ttl: Duration) {
        let now = (self.clock)();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        if let Ok(mut entries) = self.entries.write() {
            entries.insert(
                fingerprint.to_string(),
                CacheEntry {
                    fingerprint: fingerprint.to_string(),
                    payload,
                    expires_at,
                },
            );
        }
    }

    /// Drop entries whose TTL has passed; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = (self.clock)();
        let Ok(mut entries) = self.entries.write() else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    /// Number of stored entries, live or not
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Stable cache key for one page request.
///
/// Filters are sorted first, so their order does not matter. Each component
/// is length-prefixed before hashing so adjacent values cannot run together.
pub fn fingerprint(
    kind: OperationKind,
    limit: usize,
    cursor: Option<&str>,
    filters: &[String],
    watermark: Option<DateTime<Utc>>,
) -> String {
    let mut sorted = filters.to_vec();
    sorted.sort();

    let mut hasher = Sha256::new();
    let mut feed = |part: &str| {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    };

    feed(kind.as_str());
    feed(&limit.to_string());
    feed(cursor.unwrap_or_default());
    feed(&sorted.len().to_string());
    for filter in &sorted {
        feed(filter);
    }
    feed(&watermark.map(|w| w.timestamp().to_string()).unwrap_or_default());

    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}
