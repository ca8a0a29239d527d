//! Small in-memory TTL cache shared by request handlers.
//!
//! Built once in `main` and handed to the router through `AppState`, so there
//! is no process-wide singleton. Entries expire lazily: a read that finds a
//! stale entry evicts it and reports a miss. When full, inserting a new key
//! evicts the oldest entry.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

pub struct TtlCache<K, V> {
    inner: Arc<RwLock<HashMap<K, (Instant, V)>>>,
    ttl: Duration,
    capacity: usize,
}

impl<K, V> Clone for TtlCache<K, V> {
    fn clone(&self) -> Self {
        TtlCache {
            inner: Arc::clone(&self.inner),
            ttl: self.ttl,
            capacity: self.capacity,
        }
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        TtlCache {
            inner: Arc::new(RwLock::new(HashMap::new())),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Fresh value for `key`, or `None` (evicting it if it expired).
    pub async fn get(&self, key: &K) -> Option<V> {
        {
            let inner = self.inner.read().await;
            match inner.get(key) {
                None => return None,
                Some((at, value)) if at.elapsed() <= self.ttl => return Some(value.clone()),
                Some(_) => {}
            }
        }

        let mut inner = self.inner.write().await;
        if inner.get(key).is_some_and(|(at, _)| at.elapsed() > self.ttl) {
            inner.remove(key);
        }
        None
    }

    pub async fn insert(&self, key: K, value: V) {
        let mut inner = self.inner.write().await;
        if !inner.contains_key(&key) && inner.len() >= self.capacity {
            let ttl = self.ttl;
            inner.retain(|_, (at, _)| at.elapsed() <= ttl);
            if inner.len() >= self.capacity {
                let oldest = inner
                    .iter()
                    .min_by_key(|(_, (at, _))| *at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    inner.remove(&oldest);
                }
            }
        }
        inner.insert(key, (Instant::now(), value));
    }

    pub async fn invalidate(&self, key: &K) {
        self.inner.write().await.remove(key);
    }

    /// Number of entries, stale ones included.
    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}
