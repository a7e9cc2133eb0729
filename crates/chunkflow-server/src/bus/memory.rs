//! Recording publisher for tests

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

use super::{BusError, MessagePublisher};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub routing_key: String,
    pub payload: Vec<u8>,
}

impl PublishedMessage {
    pub fn decode<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.payload)
    }
}

#[derive(Default)]
struct Log {
    published: Vec<PublishedMessage>,
    attempts: Vec<Instant>,
}

/// Keeps every successful publish and the time of every attempt.
///
/// `fail_next(n)` fails the next `n` attempts; `fail_publishes_after(n)` lets
/// `n` more succeed and fails the rest.
#[derive(Clone)]
pub struct MemoryPublisher {
    log: Arc<Mutex<Log>>,
    failures_pending: Arc<AtomicUsize>,
    successes_allowed: Arc<AtomicUsize>,
}

impl Default for MemoryPublisher {
    fn default() -> Self {
        Self {
            log: Arc::default(),
            failures_pending: Arc::new(AtomicUsize::new(0)),
            successes_allowed: Arc::new(AtomicUsize::new(usize::MAX)),
        }
    }
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, attempts: usize) {
        self.failures_pending.store(attempts, Ordering::SeqCst);
    }

    pub fn fail_publishes_after(&self, successes: usize) {
        self.successes_allowed.store(successes, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.lock().published.clone()
    }

    pub fn published_to(&self, routing_key: &str) -> Vec<PublishedMessage> {
        self.lock()
            .published
            .iter()
            .filter(|m| m.routing_key == routing_key)
            .cloned()
            .collect()
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.lock().attempts.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Log> {
        self.log.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn take_one(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl MessagePublisher for MemoryPublisher {
    async fn publish(&self, routing_key: &str, payload: &[u8]) -> Result<(), BusError> {
        self.lock().attempts.push(Instant::now());

        if Self::take_one(&self.failures_pending) || !Self::take_one(&self.successes_allowed) {
            return Err(BusError::Unavailable(format!(
                "injected publish failure on '{}'",
                routing_key
            )));
        }

        self.lock().published.push(PublishedMessage {
            routing_key: routing_key.to_string(),
            payload: payload.to_vec(),
        });
        Ok(())
    }
}
