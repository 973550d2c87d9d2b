//! Cooperative cancellation handle threaded through every downstream call.
//!
//! Mirrors `edge::client::EdgeReceiverClient`'s `running: Arc<AtomicBool>`
//! pattern, plus a `watch` channel so waiters (rate limiter, HTTP calls) can
//! `select!` on cancellation instead of polling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Clone)]
pub struct ScanHandle {
    cancelled: Arc<AtomicBool>,
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl ScanHandle {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            tx: Arc::new(tx),
            rx,
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Resolves once the handle is cancelled. Intended for `tokio::select!`.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for ScanHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_resolves_waiter() {
        let handle = ScanHandle::new();
        assert!(!handle.is_cancelled());
        let waiter = handle.clone();
        let task = tokio::spawn(async move {
            waiter.cancelled().await;
        });
        handle.cancel();
        task.await.unwrap();
        assert!(handle.is_cancelled());
    }
}
