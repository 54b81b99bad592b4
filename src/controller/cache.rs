//! Local watch-fed cache
//!
//! A `WatchCache` mirrors one resource type as last reported by its watch
//! stream. Entries are handed out as `Arc<K>` snapshots: readers never see a
//! partially applied update, and anything that wants to change an object must
//! clone it first.

use super::key::{key_for, object_key, KeyError};
use crate::server::ShutdownSignal;
use kube::Resource;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Interval between readiness checks in `wait_for_cache_sync`
const SYNC_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Anything that can report whether its initial list has completed
pub trait CacheSync: Send + Sync {
    fn has_synced(&self) -> bool;

    /// The feeding watch has ended; an unsynced cache will stay unsynced
    fn is_closed(&self) -> bool;
}

pub struct WatchCache<K> {
    inner: Arc<CacheInner<K>>,
}

struct CacheInner<K> {
    store: RwLock<HashMap<String, Arc<K>>>,
    synced: AtomicBool,
    closed: AtomicBool,
}

impl<K> Clone for WatchCache<K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K> Default for WatchCache<K>
where
    K: Resource,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> WatchCache<K>
where
    K: Resource,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CacheInner {
                store: RwLock::new(HashMap::new()),
                synced: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Point lookup by namespace and name
    pub fn get(&self, namespace: &str, name: &str) -> Option<Arc<K>> {
        self.get_by_key(&key_for(Some(namespace), name))
    }

    pub fn get_by_key(&self, key: &str) -> Option<Arc<K>> {
        self.read().get(key).cloned()
    }

    /// All cached objects, in no particular order
    pub fn list(&self) -> Vec<Arc<K>> {
        self.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Insert or replace an object, returning the stored snapshot and the
    /// snapshot it displaced
    pub(crate) fn apply(&self, obj: K) -> Result<(Arc<K>, Option<Arc<K>>), KeyError> {
        let key = object_key(&obj)?;
        let obj = Arc::new(obj);
        let previous = self.write().insert(key, obj.clone());
        Ok((obj, previous))
    }

    /// Remove an object by key, returning its last stored snapshot
    pub(crate) fn remove(&self, key: &str) -> Option<Arc<K>> {
        self.write().remove(key)
    }

    /// Swap the whole content for a fresh list, returning the old content
    pub(crate) fn replace(&self, objs: Vec<K>) -> HashMap<String, Arc<K>> {
        let mut fresh = HashMap::with_capacity(objs.len());
        for obj in objs {
            match object_key(&obj) {
                Ok(key) => {
                    fresh.insert(key, Arc::new(obj));
                }
                Err(e) => debug!(error = %e, "Skipping listed object without a key"),
            }
        }
        std::mem::replace(&mut *self.write(), fresh)
    }

    pub(crate) fn mark_synced(&self) {
        self.inner.synced.store(true, Ordering::SeqCst);
    }

    pub(crate) fn mark_closed(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<K>>> {
        self.inner
            .store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<K>>> {
        self.inner
            .store
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K> CacheSync for WatchCache<K>
where
    K: Resource + Send + Sync,
{
    fn has_synced(&self) -> bool {
        self.inner.synced.load(Ordering::SeqCst)
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

/// Wait until every cache has completed its initial list
///
/// Returns false if shutdown was signalled first, or if a cache's watch
/// ended before delivering its initial list.
pub async fn wait_for_cache_sync(caches: &[&dyn CacheSync], shutdown: &ShutdownSignal) -> bool {
    info!(caches = caches.len(), "Waiting for caches to sync");
    loop {
        if caches.iter().all(|c| c.has_synced()) {
            info!("Caches synced");
            return true;
        }
        if shutdown.is_shutdown() {
            return false;
        }
        if caches.iter().any(|c| c.is_closed() && !c.has_synced()) {
            warn!("Watch ended before its cache synced");
            return false;
        }
        tokio::select! {
            _ = shutdown.wait() => return false,
            _ = tokio::time::sleep(SYNC_POLL_INTERVAL) => {}
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "cache_test.rs"]
mod tests;
