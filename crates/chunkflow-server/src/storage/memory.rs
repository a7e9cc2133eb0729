//! In-process object store for tests and local runs

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{calculate_sha256, ObjectReader, ObjectStore, UploadResult};

#[derive(Default)]
struct Inner {
    objects: HashMap<String, Vec<u8>>,
    /// Keys written, in order, including overwrites
    put_log: Vec<String>,
}

/// Object store held in a `HashMap`.
///
/// `fail_puts_after(n)` lets the first `n` puts succeed and fails every later
/// one; `fail_reads()` makes every `get_reader` fail.
#[derive(Clone)]
pub struct MemoryStorage {
    inner: Arc<Mutex<Inner>>,
    puts_allowed: Arc<AtomicUsize>,
    fail_reads: Arc<AtomicBool>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self {
            inner: Arc::default(),
            puts_allowed: Arc::new(AtomicUsize::new(usize::MAX)),
            fail_reads: Arc::default(),
        }
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_puts_after(&self, successes: usize) {
        self.puts_allowed.store(successes, Ordering::SeqCst);
    }

    pub fn fail_reads(&self) {
        self.fail_reads.store(true, Ordering::SeqCst);
    }

    pub fn insert(&self, key: &str, data: impl Into<Vec<u8>>) {
        self.lock().objects.insert(key.to_string(), data.into());
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().objects.get(key).cloned()
    }

    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .lock()
            .objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub fn put_log(&self) -> Vec<String> {
        self.lock().put_log.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ObjectStore for MemoryStorage {
    async fn put(
        &self,
        key: &str,
        data: Vec<u8>,
        _content_type: Option<&str>,
    ) -> Result<UploadResult> {
        let allowed = self
            .puts_allowed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if allowed.is_err() {
            return Err(anyhow!("injected put failure for {}", key));
        }

        let result = UploadResult {
            key: key.to_string(),
            checksum: calculate_sha256(&data),
            size: data.len(),
        };

        let mut inner = self.lock();
        inner.objects.insert(key.to_string(), data);
        inner.put_log.push(key.to_string());

        Ok(result)
    }

    async fn get_reader(&self, key: &str) -> Result<ObjectReader> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(anyhow!("injected read failure for {}", key));
        }
        let data = self
            .get(key)
            .ok_or_else(|| anyhow!("object not found: {}", key))?;
        Ok(Box::pin(Cursor::new(data)))
    }

    async fn presigned_get_url(&self, key: &str, expires_in: Duration) -> Result<String> {
        Ok(format!(
            "memory://{}?expires_in={}",
            key,
            expires_in.as_secs()
        ))
    }
}
