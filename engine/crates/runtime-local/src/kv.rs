use std::{
    collections::{BinaryHeap, HashMap},
    time::{Duration, Instant},
};

use bytes::Bytes;
use futures_util::lock::Mutex;
use runtime::kv::{KvError, KvResult, KvStoreInner};

/// A process local key-value store with per entry expiration.
pub struct InMemoryKv {
    inner: Mutex<KvInner>,
}

impl InMemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn new_with_time(now: impl Fn() -> Instant + Sync + Send + 'static) -> Self {
        InMemoryKv {
            inner: Mutex::new(KvInner {
                now: Box::new(now),
                entries: HashMap::new(),
                deletion_tasks: BinaryHeap::new(),
            }),
        }
    }
}

impl Default for InMemoryKv {
    fn default() -> Self {
        InMemoryKv {
            inner: Mutex::new(KvInner {
                now: Box::new(Instant::now),
                entries: HashMap::new(),
                deletion_tasks: BinaryHeap::new(),
            }),
        }
    }
}

struct KvInner {
    // for testing
    now: Box<dyn Fn() -> Instant + Sync + Send>,
    entries: HashMap<String, KvEntry>,
    deletion_tasks: BinaryHeap<DeletionTask>,
}

struct KvEntry {
    bytes: Bytes,
    expires_at: Option<Instant>,
}

#[derive(Debug, PartialEq, Eq)]
struct DeletionTask {
    key: String,
    to_delete_at: Instant,
}

impl PartialOrd for DeletionTask {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DeletionTask {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.to_delete_at.cmp(&other.to_delete_at).reverse()
    }
}

impl KvInner {
    fn purge(&mut self, now: Instant) {
        while let Some(task) = self.deletion_tasks.peek() {
            if task.to_delete_at > now {
                break;
            }
            let Some(DeletionTask { key, .. }) = self.deletion_tasks.pop() else {
                break;
            };
            // The key may have been overwritten with a later expiry since this task was queued
            let expired = self
                .entries
                .get(&key)
                .and_then(|entry| entry.expires_at)
                .is_some_and(|expires_at| expires_at <= now);

            if expired {
                self.entries.remove(&key);
            }
        }
    }
}

#[async_trait::async_trait]
impl KvStoreInner for InMemoryKv {
    async fn get(&self, key: &str) -> KvResult<Option<Bytes>> {
        let mut inner = self.inner.lock().await;
        let now = (inner.now)();
        inner.purge(now);
        Ok(inner.entries.get(key).map(|entry| entry.bytes.clone()))
    }

    async fn set(&self, key: &str, bytes: Bytes, expiration_ttl: Option<Duration>) -> KvResult<()> {
        let mut inner = self.inner.lock().await;
        let now = (inner.now)();
        inner.purge(now);

        let expires_at = match expiration_ttl {
            Some(ttl) => Some(
                now.checked_add(ttl)
                    .ok_or_else(|| KvError::Kv(format!("ttl of {ttl:?} is out of range")))?,
            ),
            None => None,
        };

        inner.entries.insert(key.to_string(), KvEntry { bytes, expires_at });
        if let Some(to_delete_at) = expires_at {
            inner.deletion_tasks.push(DeletionTask {
                key: key.to_string(),
                to_delete_at,
            });
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> KvResult<()> {
        let mut inner = self.inner.lock().await;
        let now = (inner.now)();
        inner.purge(now);
        inner.entries.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> KvResult<bool> {
        let mut inner = self.inner.lock().await;
        let now = (inner.now)();
        inner.purge(now);
        Ok(inner.entries.contains_key(key))
    }

    async fn keys(&self, pattern: &str) -> KvResult<Vec<String>> {
        let pattern = glob::Pattern::new(pattern).map_err(|err| KvError::Kv(err.to_string()))?;

        let mut inner = self.inner.lock().await;
        let now = (inner.now)();
        inner.purge(now);

        let mut keys = inner
            .entries
            .keys()
            .filter(|key| pattern.matches(key))
            .cloned()
            .collect::<Vec<_>>();
        keys.sort_unstable();
        Ok(keys)
    }

    async fn flush_all(&self) -> KvResult<()> {
        let mut inner = self.inner.lock().await;
        inner.entries.clear();
        inner.deletion_tasks.clear();
        Ok(())
    }
}
