//! Single-flight request cache keyed by `(method, url, params)`.
//!
//! Concurrent identical requests are served by one in-flight call; the
//! waiters subscribe to a `tokio::sync::broadcast` channel the way
//! `edge::client::EdgeReceiverClient` fans a single received tick out to
//! many subscribers. `ProviderGuard` is generic per call over the
//! response type, so the cache stores values type-erased behind
//! `Arc<dyn Any + Send + Sync>` and downcasts them back out at the
//! caller's known type.

use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

type Cached = Arc<dyn Any + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub method: String,
    pub url: String,
    pub params: String,
}

impl RequestKey {
    pub fn new(method: impl Into<String>, url: impl Into<String>, params: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            params: params.into(),
        }
    }
}

struct Entry {
    value: Cached,
    stored_at: Instant,
}

enum Slot {
    Ready(Entry),
    InFlight(broadcast::Sender<Cached>),
}

pub struct RequestCache {
    ttl: Duration,
    slots: Mutex<HashMap<RequestKey, Slot>>,
}

impl RequestCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a fresh cached value if present, else `None`.
    pub fn get<T: Clone + Send + Sync + 'static>(&self, key: &RequestKey) -> Option<T> {
        let slots = self.slots.lock();
        match slots.get(key) {
            Some(Slot::Ready(entry)) if entry.stored_at.elapsed() < self.ttl => {
                entry.value.downcast_ref::<T>().cloned()
            }
            _ => None,
        }
    }

    /// Registers this call as in-flight, or returns a receiver to join an
    /// already-in-flight call for the same key.
    pub fn begin<T: Clone + Send + Sync + 'static>(&self, key: &RequestKey) -> BeginOutcome<T> {
        let mut slots = self.slots.lock();
        match slots.get(key) {
            Some(Slot::InFlight(tx)) => BeginOutcome::Join(JoinReceiver {
                rx: tx.subscribe(),
                _marker: PhantomData,
            }),
            _ => {
                let (tx, _rx) = broadcast::channel(1);
                slots.insert(key.clone(), Slot::InFlight(tx));
                BeginOutcome::Lead
            }
        }
    }

    /// Completes an in-flight call: stores the value and wakes joiners.
    pub fn complete<T: Clone + Send + Sync + 'static>(&self, key: &RequestKey, value: T) {
        let cached: Cached = Arc::new(value);
        let mut slots = self.slots.lock();
        if let Some(Slot::InFlight(tx)) = slots.remove(key) {
            let _ = tx.send(cached.clone());
        }
        slots.insert(
            key.clone(),
            Slot::Ready(Entry {
                value: cached,
                stored_at: Instant::now(),
            }),
        );
    }

    /// Releases the in-flight slot without storing a value (call failed).
    pub fn abandon(&self, key: &RequestKey) {
        self.slots.lock().remove(key);
    }
}

pub enum BeginOutcome<T> {
    Lead,
    Join(JoinReceiver<T>),
}

pub struct JoinReceiver<T> {
    rx: broadcast::Receiver<Cached>,
    _marker: PhantomData<T>,
}

impl<T: Clone + Send + Sync + 'static> JoinReceiver<T> {
    /// Awaits the leader's result and downcasts it back to `T`.
    pub async fn recv(&mut self) -> Option<T> {
        let cached = self.rx.recv().await.ok()?;
        cached.downcast_ref::<T>().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_after_set_within_ttl_hits() {
        let cache = RequestCache::new(Duration::from_secs(60));
        let key = RequestKey::new("GET", "https://x", "");
        assert!(cache.get::<u32>(&key).is_none());
        cache.complete(&key, 42u32);
        assert_eq!(cache.get::<u32>(&key), Some(42));
    }

    #[test]
    fn get_after_ttl_misses() {
        let cache = RequestCache::new(Duration::from_millis(1));
        let key = RequestKey::new("GET", "https://x", "");
        cache.complete(&key, 42u32);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get::<u32>(&key), None);
    }

    #[tokio::test]
    async fn joiners_receive_leader_result() {
        let cache = std::sync::Arc::new(RequestCache::new(Duration::from_secs(60)));
        let key = RequestKey::new("GET", "https://x", "");

        match cache.begin::<u32>(&key) {
            BeginOutcome::Lead => {}
            BeginOutcome::Join(_) => panic!("expected to lead"),
        }

        let mut joiner_rx = match cache.begin::<u32>(&key) {
            BeginOutcome::Join(rx) => rx,
            BeginOutcome::Lead => panic!("expected to join"),
        };

        cache.complete(&key, 7u32);
        assert_eq!(joiner_rx.recv().await.unwrap(), 7);
    }
}
