//! Process-local TTL cache keyed by request fingerprint.
//!
//! Entries are replaced wholesale, never mutated. A lookup past
//! `stored_at + ttl` behaves exactly like a miss. Concurrent misses for the
//! same key collapse into one fetch whose outcome every joined caller sees.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use market_core::{RequestKey, UpstreamError};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

pub const DEFAULT_TTL_SECS: u64 = 300; // 5 minutes
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, now: Instant) -> bool {
        now < self.stored_at + self.ttl
    }
}

/// Outcome of a fetch in progress; `None` until the leading caller settles.
type Flight<V, E> = watch::Receiver<Option<Result<V, E>>>;

pub struct FingerprintCache<V = Value, E = UpstreamError> {
    entries: DashMap<RequestKey, CacheEntry<V>>,
    /// Keys with a fetch in progress.
    in_flight: DashMap<RequestKey, Flight<V, E>>,
    ttl: Duration,
    max_entries: usize,
}

/// Unregisters the leader's flight when its future completes or is dropped.
struct FlightGuard<'a, V, E> {
    in_flight: &'a DashMap<RequestKey, Flight<V, E>>,
    key: &'a RequestKey,
    flight: Flight<V, E>,
}

impl<V, E> Drop for FlightGuard<'_, V, E> {
    fn drop(&mut self) {
        self.in_flight
            .remove_if(self.key, |_, flight| flight.same_channel(&self.flight));
    }
}

impl<V: Clone, E: Clone> FingerprintCache<V, E> {
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            in_flight: DashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fresh value for `key`, if any. Expired entries are dropped on sight.
    pub fn get(&self, key: &RequestKey) -> Option<V> {
        let now = Instant::now();
        {
            let entry = self.entries.get(key)?;
            if entry.is_fresh(now) {
                return Some(entry.value.clone());
            }
        }
        self.entries.remove_if(key, |_, entry| !entry.is_fresh(now));
        None
    }

    pub fn set(&self, key: RequestKey, value: V) {
        self.set_with_ttl(key, value, self.ttl);
    }

    pub fn set_with_ttl(&self, key: RequestKey, value: V, ttl: Duration) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            self.make_room();
        }

        self.entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Return the cached value or run `fetch` to obtain it.
    ///
    /// Only one caller per key runs `fetch`. Callers arriving while it is in
    /// progress get its outcome, error included. Errors are never stored, so
    /// the next request after a failure fetches again. If the leading caller
    /// is dropped before settling, one of the waiters takes over.
    pub async fn get_or_fetch<F, Fut>(&self, key: &RequestKey, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let sender = loop {
            if let Some(value) = self.get(key) {
                tracing::debug!(key = %key, "Cache hit");
                return Ok(value);
            }

            let mut flight = match self.in_flight.entry(key.clone()) {
                Entry::Occupied(entry) => entry.get().clone(),
                Entry::Vacant(entry) => {
                    let (sender, flight) = watch::channel(None);
                    entry.insert(flight);
                    break sender;
                }
            };

            let outcome = match flight.wait_for(Option::is_some).await {
                Ok(settled) => Option::clone(&settled),
                Err(_) => None,
            };
            match outcome {
                Some(result) => {
                    tracing::debug!(key = %key, ok = result.is_ok(), "Joined in-flight fetch");
                    return result;
                }
                None => tracing::debug!(key = %key, "In-flight fetch abandoned, retrying lookup"),
            }
        };

        let _guard = FlightGuard {
            in_flight: &self.in_flight,
            key,
            flight: sender.subscribe(),
        };

        tracing::debug!(key = %key, "Cache miss");
        let result = fetch().await;
        if let Ok(value) = &result {
            self.set(key.clone(), value.clone());
        }
        sender.send_replace(Some(result.clone()));
        result
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh(now));
        before.saturating_sub(self.entries.len())
    }

    /// Drop everything. The cache stays usable afterwards.
    pub fn dispose(&self) {
        self.entries.clear();
        self.in_flight.clear();
    }

    fn make_room(&self) {
        let purged = self.purge_expired();
        if purged > 0 {
            tracing::debug!("Cache full, purged {} expired entries", purged);
        }
        if self.entries.len() < self.max_entries {
            return;
        }

        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().stored_at)
            .map(|entry| entry.key().clone());

        if let Some(key) = oldest {
            tracing::debug!(key = %key, "Cache full, evicting oldest entry");
            self.entries.remove(&key);
        }
    }
}
