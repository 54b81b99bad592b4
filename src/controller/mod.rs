pub mod cache;
pub mod client;
pub mod config;
pub mod deployment;
pub mod events;
pub mod informer;
pub mod key;
pub mod queue;
pub mod rate_limiter;
pub mod reconcile;
pub mod router;
pub mod status;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{wait_for_cache_sync, CacheSync, WatchCache};
pub use config::{ConfigError, ControllerConfig};
pub use informer::Informer;
pub use queue::WorkQueue;
pub use reconcile::{sync, Context, ReconcileError, SyncOutcome};
pub use router::{EventRouter, RouteOutcome};
pub use worker::{Controller, ControllerError, ExternalClients};
