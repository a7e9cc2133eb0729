//! In-process progress cache for tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use super::{CacheError, CacheResult, ProgressCache};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    ttl: Option<Duration>,
    expires_at: Option<Instant>,
}

/// `HashMap` cache honouring TTLs against the tokio clock
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Seed a raw entry without expiry
    pub fn insert(&self, key: &str, value: &str) {
        self.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                ttl: None,
                expires_at: None,
            },
        );
    }

    /// TTL the entry was written with
    pub fn ttl_of(&self, key: &str) -> Option<Duration> {
        self.lock().get(key).and_then(|e| e.ttl)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn live_value(entry: &Entry, now: Instant) -> Option<&str> {
        match entry.expires_at {
            Some(at) if at <= now => None,
            _ => Some(entry.value.as_str()),
        }
    }
}

#[async_trait]
impl ProgressCache for MemoryCache {
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("injected write failure".to_string()));
        }
        self.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                ttl,
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let now = Instant::now();
        Ok(self
            .lock()
            .get(key)
            .and_then(|e| Self::live_value(e, now))
            .map(str::to_string))
    }

    async fn scan_keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .lock()
            .iter()
            .filter(|(key, entry)| {
                Self::live_value(entry, now).is_some() && glob_match(pattern, key)
            })
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

/// Glob match supporting only `*`
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let (first, rest) = (parts[0], &parts[1..]);
    let Some(mut remaining) = text.strip_prefix(first) else {
        return false;
    };

    let last = rest.len() - 1;
    for (i, part) in rest.iter().enumerate() {
        if i == last {
            return remaining.ends_with(part);
        }
        match remaining.find(part) {
            Some(pos) => remaining = &remaining[pos + part.len()..],
            None => return false,
        }
    }
    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("job:a:chunk:*", "job:a:chunk:0"));
        assert!(glob_match("job:a:chunk:*", "job:a:chunk:"));
        assert!(!glob_match("job:a:chunk:*", "job:b:chunk:0"));
        assert!(glob_match("*:chunk:*", "job:a:chunk:7"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exactly"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let cache = MemoryCache::new();
        cache.set("k", "v", Some(Duration::from_secs(10))).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.scan_keys("*").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_injected_write_failure() {
        let cache = MemoryCache::new();
        cache.set_fail_writes(true);
        assert!(cache.set("k", "v", None).await.is_err());
    }
}
