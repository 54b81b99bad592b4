//! Controller lifecycle
//!
//! Wires informers, the event router, the work queue and a pool of workers
//! together, then runs them until shutdown.

use super::cache::{wait_for_cache_sync, CacheSync};
use super::client::{DeploymentClient, FooClient, KubeClients};
use super::config::ControllerConfig;
use super::events::{EventRecorder, KubeEventRecorder};
use super::informer::{EventHandler, Informer};
use super::queue::WorkQueue;
use super::rate_limiter::default_controller_rate_limiter;
use super::reconcile::{sync, Context};
use super::router::EventRouter;
use super::status::StatusReporter;
use crate::crd::Foo;
use crate::server::{ReadinessState, SharedMetrics, ShutdownSignal};
use k8s_openapi::api::apps::v1::Deployment;
use kube::Client;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

const QUEUE_NAME: &str = "Foos";

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("failed to wait for caches to sync")]
    CacheSyncFailed,
}

/// The outside world a controller writes to
pub struct ExternalClients {
    pub deployments: Arc<dyn DeploymentClient>,
    pub foos: Arc<dyn FooClient>,
    pub recorder: Arc<dyn EventRecorder>,
}

impl ExternalClients {
    /// Production clients sharing one Kubernetes connection
    pub fn from_client(client: Client) -> Self {
        let kube = Arc::new(KubeClients::new(client.clone()));
        Self {
            deployments: kube.clone(),
            foos: kube,
            recorder: Arc::new(KubeEventRecorder::new(client)),
        }
    }
}

pub struct Controller {
    queue: WorkQueue<String>,
    foo_informer: Informer<Foo>,
    deployment_informer: Informer<Deployment>,
    ctx: Arc<Context>,
    workers: usize,
    metrics: Option<SharedMetrics>,
    readiness: Option<ReadinessState>,
}

impl Controller {
    pub fn new(
        clients: ExternalClients,
        foo_informer: Informer<Foo>,
        deployment_informer: Informer<Deployment>,
        config: &ControllerConfig,
    ) -> Self {
        let ctx = Context::new(
            foo_informer.cache(),
            deployment_informer.cache(),
            clients.deployments,
            StatusReporter::new(clients.foos),
            clients.recorder,
        );
        Self {
            queue: WorkQueue::new(QUEUE_NAME, default_controller_rate_limiter()),
            foo_informer,
            deployment_informer,
            ctx: Arc::new(ctx),
            workers: config.workers.max(1),
            metrics: None,
            readiness: None,
        }
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Flip `readiness` on once workers start and off at shutdown
    pub fn with_readiness(mut self, readiness: ReadinessState) -> Self {
        self.readiness = Some(readiness);
        self
    }

    /// Handle to the work queue, mostly for observing depth
    pub fn queue(&self) -> WorkQueue<String> {
        self.queue.clone()
    }

    /// Run until `shutdown` fires
    ///
    /// Workers only start once both caches hold a full initial list. On
    /// shutdown the queue stops accepting keys, workers finish what is already
    /// queued, and this returns after all of them have exited.
    pub async fn run(self, shutdown: ShutdownSignal) -> Result<(), ControllerError> {
        let Controller {
            queue,
            foo_informer,
            deployment_informer,
            ctx,
            workers,
            metrics,
            readiness,
        } = self;

        info!("Starting Foo controller");
        let router = Arc::new(EventRouter::new(queue.clone(), ctx.foos.clone()));
        let foo_handler: Arc<dyn EventHandler<Foo>> = router.clone();
        let deployment_handler: Arc<dyn EventHandler<Deployment>> = router;
        let informers = vec![
            tokio::spawn(foo_informer.run(foo_handler, shutdown.clone())),
            tokio::spawn(deployment_informer.run(deployment_handler, shutdown.clone())),
        ];

        let caches: [&dyn CacheSync; 2] = [&ctx.foos, &ctx.deployments];
        if !wait_for_cache_sync(&caches, &shutdown).await {
            queue.shut_down();
            // A dead watch can fail the sync with shutdown still pending
            for informer in &informers {
                informer.abort();
            }
            join_all("informer", informers).await;
            return Err(ControllerError::CacheSyncFailed);
        }

        info!(workers, "Starting workers");
        let pool: Vec<JoinHandle<()>> = (0..workers)
            .map(|id| {
                let queue = queue.clone();
                let ctx = ctx.clone();
                let metrics = metrics.clone();
                tokio::spawn(async move {
                    debug!(worker = id, "Worker started");
                    while process_next_work_item(&queue, &ctx, metrics.as_ref()).await {}
                    debug!(worker = id, "Worker stopped");
                })
            })
            .collect();

        if let Some(ref readiness) = readiness {
            readiness.set_ready();
        }
        info!("Started workers");

        shutdown.wait().await;

        info!("Shutting down workers");
        if let Some(ref readiness) = readiness {
            readiness.set_not_ready();
        }
        queue.shut_down();
        join_all("worker", pool).await;
        join_all("informer", informers).await;
        Ok(())
    }
}

async fn join_all(what: &str, handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        match handle.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => debug!(task = what, "Task cancelled"),
            Err(e) => error!(task = what, error = %e, "Task failed"),
        }
    }
}

/// Take one key off the queue and sync it
///
/// Returns false once the queue is shut down and drained.
pub(crate) async fn process_next_work_item(
    queue: &WorkQueue<String>,
    ctx: &Context,
    metrics: Option<&SharedMetrics>,
) -> bool {
    let Some(key) = queue.get().await else {
        return false;
    };

    let start = Instant::now();
    let result = sync(&key, ctx).await;
    let elapsed = start.elapsed().as_secs_f64();

    let label = match &result {
        Ok(outcome) => {
            queue.forget(&key);
            info!(key = %key, outcome = ?outcome, "Successfully synced");
            outcome.metric_label()
        }
        Err(e) if !e.is_retryable() => {
            queue.forget(&key);
            error!(key = %key, error = %e, "Dropping work item");
            e.metric_label()
        }
        Err(e) => {
            warn!(
                key = %key,
                error = %e,
                retries = queue.num_requeues(&key),
                "Error syncing, requeuing"
            );
            queue.add_rate_limited(key.clone());
            if let Some(metrics) = metrics {
                metrics.record_retry();
            }
            e.metric_label()
        }
    };
    queue.done(&key);

    if let Some(metrics) = metrics {
        metrics.record_reconciliation(label, elapsed);
        metrics.set_queue_depth(queue.len());
    }
    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "worker_test.rs"]
mod tests;
