//! Watch ingestion
//!
//! An `Informer` drives one watch stream into its `WatchCache` and turns each
//! change into a `WatchEvent` for an `EventHandler`. Deletions the watch
//! missed while it was disconnected surface on the next relist as
//! tombstones carrying the last state the cache knew.

use super::cache::WatchCache;
use super::key::object_key;
use crate::server::ShutdownSignal;
use futures::stream::BoxStream;
use futures::StreamExt;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Resource};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, Interval};
use tracing::{debug, info, warn};

pub type WatchStream<K> = BoxStream<'static, Result<watcher::Event<K>, watcher::Error>>;

/// A change observed on one watched resource type
#[derive(Debug)]
pub enum WatchEvent<K> {
    Added(Arc<K>),
    /// `old` and `new` are the same snapshot on periodic resync
    Updated {
        old: Arc<K>,
        new: Arc<K>,
    },
    Deleted(DeletedObject<K>),
}

/// What is known about a deleted object
#[derive(Debug)]
pub enum DeletedObject<K> {
    /// The watch reported the deletion with the object's final state
    Live(Arc<K>),
    /// The deletion was inferred from a relist; `last_known` is the state the
    /// cache held before the object disappeared
    Tombstone { key: String, last_known: Arc<K> },
}

impl<K> DeletedObject<K> {
    /// The best available state of the deleted object
    pub fn object(&self) -> &Arc<K> {
        match self {
            DeletedObject::Live(obj) => obj,
            DeletedObject::Tombstone { last_known, .. } => last_known,
        }
    }
}

pub trait EventHandler<K>: Send + Sync {
    fn on_event(&self, event: WatchEvent<K>);
}

pub struct Informer<K> {
    cache: WatchCache<K>,
    stream: WatchStream<K>,
    resync_period: Option<Duration>,
}

impl<K> Informer<K>
where
    K: Resource<DynamicType = ()> + Clone + Debug + Send + Sync + 'static,
{
    /// Build an informer over any watch-event stream
    pub fn new(stream: WatchStream<K>, resync_period: Option<Duration>) -> Self {
        Self {
            cache: WatchCache::new(),
            stream,
            resync_period,
        }
    }

    /// Build an informer over a live API watch with the default reconnect backoff
    pub fn from_api(api: Api<K>, resync_period: Option<Duration>) -> Self
    where
        K: DeserializeOwned,
    {
        let stream = watcher(api, watcher::Config::default())
            .default_backoff()
            .boxed();
        Self::new(stream, resync_period)
    }

    /// Handle to the cache this informer maintains
    pub fn cache(&self) -> WatchCache<K> {
        self.cache.clone()
    }

    /// Pump the watch stream until shutdown or the stream ends
    pub async fn run(self, handler: Arc<dyn EventHandler<K>>, shutdown: ShutdownSignal) {
        let kind = K::kind(&()).to_string();
        let Informer {
            cache,
            mut stream,
            resync_period,
        } = self;
        let mut resync = resync_period
            .filter(|p| !p.is_zero())
            .map(|p| tokio::time::interval_at(Instant::now() + p, p));
        let mut relist: Option<Vec<K>> = None;

        info!(kind = %kind, "Starting informer");
        loop {
            tokio::select! {
                _ = shutdown.wait() => {
                    info!(kind = %kind, "Informer stopping on shutdown");
                    break;
                }
                _ = next_tick(&mut resync) => {
                    resync_all(&cache, handler.as_ref());
                }
                item = stream.next() => match item {
                    Some(Ok(event)) => apply_event(&cache, event, &mut relist, handler.as_ref()),
                    Some(Err(e)) => warn!(kind = %kind, error = %e, "Watch stream error"),
                    None => {
                        warn!(kind = %kind, "Watch stream ended");
                        cache.mark_closed();
                        break;
                    }
                },
            }
        }
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn resync_all<K>(cache: &WatchCache<K>, handler: &dyn EventHandler<K>)
where
    K: Resource,
{
    let objects = cache.list();
    debug!(count = objects.len(), "Resyncing cached objects");
    for obj in objects {
        handler.on_event(WatchEvent::Updated {
            old: obj.clone(),
            new: obj,
        });
    }
}

/// Fold one raw watch event into the cache and notify the handler
pub(crate) fn apply_event<K>(
    cache: &WatchCache<K>,
    event: watcher::Event<K>,
    relist: &mut Option<Vec<K>>,
    handler: &dyn EventHandler<K>,
) where
    K: Resource,
{
    match event {
        watcher::Event::Apply(obj) => upsert(cache, obj, handler),
        watcher::Event::Delete(obj) => {
            let key = match object_key(&obj) {
                Ok(key) => key,
                Err(e) => {
                    debug!(error = %e, "Ignoring deletion of object without a key");
                    return;
                }
            };
            cache.remove(&key);
            handler.on_event(WatchEvent::Deleted(DeletedObject::Live(Arc::new(obj))));
        }
        watcher::Event::Init => {
            *relist = Some(Vec::new());
        }
        watcher::Event::InitApply(obj) => match relist {
            Some(buffer) => buffer.push(obj),
            // InitApply outside Init/InitDone is not expected; treat it as a plain apply
            None => upsert(cache, obj, handler),
        },
        watcher::Event::InitDone => {
            let listed = relist.take().unwrap_or_default();
            let mut previous = cache.replace(listed);

            for new in cache.list() {
                let Ok(key) = object_key(new.as_ref()) else {
                    continue;
                };
                match previous.remove(&key) {
                    Some(old) => handler.on_event(WatchEvent::Updated { old, new }),
                    None => handler.on_event(WatchEvent::Added(new)),
                }
            }
            for (key, last_known) in previous {
                debug!(key = %key, "Object vanished while the watch was down");
                handler.on_event(WatchEvent::Deleted(DeletedObject::Tombstone {
                    key,
                    last_known,
                }));
            }

            cache.mark_synced();
        }
    }
}

fn upsert<K>(cache: &WatchCache<K>, obj: K, handler: &dyn EventHandler<K>)
where
    K: Resource,
{
    match cache.apply(obj) {
        Ok((new, Some(old))) => handler.on_event(WatchEvent::Updated { old, new }),
        Ok((new, None)) => handler.on_event(WatchEvent::Added(new)),
        Err(e) => debug!(error = %e, "Ignoring object without a key"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "informer_test.rs"]
mod tests;
