//! Three-tier cache (hot/warm/cold) with independent TTLs.
//!
//! Locking idiom grounded on `route_quality::prober`'s
//! `dns_cache: RwLock<HashMap<...>>` and `middleware::rate_limit`'s
//! lazily-expiring entries; `cleanup()` mirrors
//! `RateLimitLayer::cleanup()`.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Hot,
    Warm,
    Cold,
}

struct Entry {
    bytes: Vec<u8>,
    stored_at: Instant,
}

struct TierStore {
    ttl: Duration,
    entries: RwLock<HashMap<String, Entry>>,
}

impl TierStore {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn get(&self, key: &str) -> Option<(Vec<u8>, Duration)> {
        let entries = self.entries.read();
        entries.get(key).and_then(|entry| {
            let age = entry.stored_at.elapsed();
            if age < self.ttl {
                Some((entry.bytes.clone(), age))
            } else {
                None
            }
        })
    }

    fn set(&self, key: String, bytes: Vec<u8>) {
        self.entries.write().insert(
            key,
            Entry {
                bytes,
                stored_at: Instant::now(),
            },
        );
    }

    fn sweep(&self) {
        let ttl = self.ttl;
        self.entries.write().retain(|_, e| e.stored_at.elapsed() < ttl);
    }
}

/// Builds a semantic cache key: `"<kind>:<arg1>:<arg2>..."`.
pub fn key(kind: &str, args: &[&str]) -> String {
    let mut s = String::from(kind);
    for arg in args {
        s.push(':');
        s.push_str(arg);
    }
    s
}

/// Like `key`, but appends a time bucket: `floor(now_secs / bucket_secs)`.
/// Used where identical requests within the same bucket should collapse
/// onto the same cache entry (e.g. regime data refreshed every 4h).
pub fn key_with_bucket(kind: &str, args: &[&str], bucket: Duration, now: Duration) -> String {
    let bucket_index = now.as_secs() / bucket.as_secs().max(1);
    format!("{}:{}", key(kind, args), bucket_index)
}

pub struct LayeredCache {
    hot: TierStore,
    warm: TierStore,
    cold: TierStore,
}

impl LayeredCache {
    pub fn new(hot_ttl: Duration, warm_ttl: Duration, cold_ttl: Duration) -> Self {
        Self {
            hot: TierStore::new(hot_ttl),
            warm: TierStore::new(warm_ttl),
            cold: TierStore::new(cold_ttl),
        }
    }

    fn store(&self, tier: Tier) -> &TierStore {
        match tier {
            Tier::Hot => &self.hot,
            Tier::Warm => &self.warm,
            Tier::Cold => &self.cold,
        }
    }

    /// Reads a raw byte value, returning its age if present and unexpired.
    pub fn get_raw(&self, tier: Tier, key: &str) -> Option<(Vec<u8>, Duration)> {
        self.store(tier).get(key)
    }

    pub fn set_raw(&self, tier: Tier, key: impl Into<String>, bytes: Vec<u8>) {
        self.store(tier).set(key.into(), bytes);
    }

    /// Typed convenience wrapper over `get_raw`/`set_raw` via JSON.
    pub fn get<T: serde::de::DeserializeOwned>(&self, tier: Tier, key: &str) -> Option<(T, Duration)> {
        let (bytes, age) = self.get_raw(tier, key)?;
        serde_json::from_slice(&bytes).ok().map(|v| (v, age))
    }

    pub fn set<T: serde::Serialize>(&self, tier: Tier, key: impl Into<String>, value: &T) {
        if let Ok(bytes) = serde_json::to_vec(value) {
            self.set_raw(tier, key, bytes);
        }
    }

    /// Evicts expired entries in all tiers. Intended to run on a 60s
    /// background interval.
    pub fn sweep(&self) {
        self.hot.sweep();
        self.warm.sweep();
        self.cold.sweep();
    }
}
