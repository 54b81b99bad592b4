use super::cache::WatchCache;
use super::client::DeploymentClient;
use super::deployment::{available_replicas, deployment_replicas, is_controlled_by, new_deployment};
use super::events::{
    message_resource_exists, EventRecorder, ERR_RESOURCE_EXISTS, MESSAGE_RESOURCE_SYNCED,
    SUCCESS_SYNCED,
};
use super::key::{split_key, KeyError};
use super::status::StatusReporter;
use crate::crd::{Foo, FooStatus};
use k8s_openapi::api::apps::v1::Deployment;
use kube::runtime::events::EventType;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Invalid resource key: {0}")]
    InvalidKey(#[from] KeyError),

    #[error("Resource {0:?} already exists and is not managed by Foo")]
    ResourceExists(String),

    #[error("Foo missing name")]
    MissingName,

    #[error("Foo missing uid")]
    MissingUid,
}

impl ReconcileError {
    /// Whether the failed key should be retried with backoff
    ///
    /// A key that cannot be parsed will never parse; everything else may
    /// clear up, including an ownership conflict someone resolves by hand.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ReconcileError::InvalidKey(_))
    }

    /// Short label for metrics
    pub fn metric_label(&self) -> &'static str {
        match self {
            ReconcileError::InvalidKey(_) => "malformed",
            _ => "error",
        }
    }
}

/// How a successful sync ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The Deployment matches the Foo and status is current
    Synced,
    /// The Foo is gone; nothing to do
    NotFound,
    /// The Foo cannot be acted on until a user fixes its spec
    InvalidSpec,
}

impl SyncOutcome {
    pub fn metric_label(&self) -> &'static str {
        match self {
            SyncOutcome::Synced => "synced",
            SyncOutcome::NotFound => "not_found",
            SyncOutcome::InvalidSpec => "invalid_spec",
        }
    }
}

/// Everything a sync reads from or writes to
pub struct Context {
    pub foos: WatchCache<Foo>,
    pub deployments: WatchCache<Deployment>,
    pub deployment_client: Arc<dyn DeploymentClient>,
    pub status_reporter: StatusReporter,
    pub recorder: Arc<dyn EventRecorder>,
}

impl Context {
    pub fn new(
        foos: WatchCache<Foo>,
        deployments: WatchCache<Deployment>,
        deployment_client: Arc<dyn DeploymentClient>,
        status_reporter: StatusReporter,
        recorder: Arc<dyn EventRecorder>,
    ) -> Self {
        Context {
            foos,
            deployments,
            deployment_client,
            status_reporter,
            recorder,
        }
    }
}

/// Drive the Deployment of the Foo at `key` toward its spec
///
/// Level-triggered: everything is read fresh from the caches, so calling
/// this for any key, any number of times, converges on the same state.
/// 1. Look up the Foo; a missing Foo is a no-op
/// 2. Reject an empty `deploymentName` without retry
/// 3. Create the Deployment if the cache has none
/// 4. Refuse to touch a Deployment this Foo does not control
/// 5. Replace the Deployment if its replica count drifted
/// 6. Mirror available replicas into the Foo's status
pub async fn sync(key: &str, ctx: &Context) -> Result<SyncOutcome, ReconcileError> {
    let (namespace, name) = split_key(key)?;

    let Some(foo) = ctx.foos.get(namespace, name) else {
        debug!(foo = %key, "Foo no longer exists, nothing to reconcile");
        return Ok(SyncOutcome::NotFound);
    };

    let deployment_name = foo.spec.deployment_name.as_str();
    if deployment_name.is_empty() {
        error!(foo = %key, "deploymentName must be specified");
        return Ok(SyncOutcome::InvalidSpec);
    }

    let deployment = match ctx.deployments.get(namespace, deployment_name) {
        Some(existing) => existing,
        None => {
            info!(foo = %key, deployment = %deployment_name, "Creating Deployment");
            let created = ctx
                .deployment_client
                .create(namespace, &new_deployment(&foo)?)
                .await?;
            Arc::new(created)
        }
    };

    if !is_controlled_by(&deployment, &foo) {
        let message = message_resource_exists(deployment_name);
        ctx.recorder
            .record(&foo, EventType::Warning, ERR_RESOURCE_EXISTS, message.clone())
            .await;
        info!(foo = %key, "{}", message);
        return Err(ReconcileError::ResourceExists(deployment_name.to_string()));
    }

    let deployment = match foo.spec.replicas {
        Some(desired) if deployment_replicas(&deployment) != Some(desired) => {
            info!(
                foo = %key,
                deployment = %deployment_name,
                current = ?deployment_replicas(&deployment),
                desired,
                "Scaling Deployment"
            );
            let updated = ctx
                .deployment_client
                .update(namespace, &new_deployment(&foo)?)
                .await?;
            Arc::new(updated)
        }
        _ => deployment,
    };

    update_foo_status(&foo, &deployment, ctx).await?;

    ctx.recorder
        .record(
            &foo,
            EventType::Normal,
            SUCCESS_SYNCED,
            MESSAGE_RESOURCE_SYNCED.to_string(),
        )
        .await;
    Ok(SyncOutcome::Synced)
}

/// Write the Deployment's availability onto the Foo, skipping no-op writes
async fn update_foo_status(
    foo: &Foo,
    deployment: &Deployment,
    ctx: &Context,
) -> Result<(), ReconcileError> {
    let status = FooStatus {
        available_replicas: available_replicas(deployment),
    };
    if foo.status.as_ref() == Some(&status) {
        debug!(status = ?status, "Foo status already current");
        return Ok(());
    }
    ctx.status_reporter.update_status(foo, status).await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "reconcile_test.rs"]
mod tests;
