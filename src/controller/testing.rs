//! Shared fixtures for controller tests

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::cache::WatchCache;
use super::client::{DeploymentClient, FooClient};
use super::events::MockEventRecorder;
use super::informer::{DeletedObject, EventHandler, WatchEvent};
use super::key::{key_for, object_key};
use super::reconcile::Context;
use super::status::StatusReporter;
use crate::crd::{Foo, FooSpec};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::ObjectMeta;
use kube::{Resource, ResourceExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub const NAMESPACE: &str = "default";

/// A Foo as the API server would return it: namespaced, with uid and resourceVersion
pub fn test_foo(name: &str, deployment_name: &str, replicas: Option<i32>) -> Foo {
    let mut foo = Foo::new(
        name,
        FooSpec {
            deployment_name: deployment_name.to_string(),
            replicas,
        },
    );
    foo.metadata.namespace = Some(NAMESPACE.to_string());
    foo.metadata.uid = Some(format!("uid-{}", name));
    foo.metadata.resource_version = Some("1".to_string());
    foo
}

/// A Deployment controlled by `foo`
pub fn owned_deployment(foo: &Foo, replicas: Option<i32>, available: i32) -> Deployment {
    Deployment {
        metadata: ObjectMeta {
            name: Some(foo.spec.deployment_name.clone()),
            namespace: foo.namespace(),
            resource_version: Some("1".to_string()),
            owner_references: Some(vec![foo.controller_owner_ref(&()).unwrap()]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas,
            ..Default::default()
        }),
        status: Some(DeploymentStatus {
            available_replicas: Some(available),
            ..Default::default()
        }),
    }
}

/// A Deployment with the given controller owner, or none
pub fn foreign_deployment(name: &str, controller: Option<(&str, &str)>) -> Deployment {
    let owner_references = controller.map(|(kind, owner)| {
        vec![OwnerReference {
            api_version: "apps/v1".to_string(),
            kind: kind.to_string(),
            name: owner.to_string(),
            uid: format!("uid-{}", owner),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }]
    });
    Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            resource_version: Some("1".to_string()),
            owner_references,
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            ..Default::default()
        }),
        status: None,
    }
}

/// Handler that keeps every event it is given
pub struct RecordingHandler<K> {
    events: Mutex<Vec<WatchEvent<K>>>,
}

/// Flattened view of a `WatchEvent` for assertions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seen {
    Added(String),
    Updated(String),
    Deleted(String),
    Tombstone(String),
}

impl<K: Resource> RecordingHandler<K> {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> Vec<Seen> {
        let name = |obj: &Arc<K>| obj.meta().name.clone().unwrap_or_default();
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| match e {
                WatchEvent::Added(o) => Seen::Added(name(o)),
                WatchEvent::Updated { new, .. } => Seen::Updated(name(new)),
                WatchEvent::Deleted(DeletedObject::Live(o)) => Seen::Deleted(name(o)),
                WatchEvent::Deleted(DeletedObject::Tombstone { last_known, .. }) => {
                    Seen::Tombstone(name(last_known))
                }
            })
            .collect()
    }

    pub fn take(&self) -> Vec<WatchEvent<K>> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

impl<K: Send + Sync> EventHandler<K> for RecordingHandler<K> {
    fn on_event(&self, event: WatchEvent<K>) {
        self.events.lock().unwrap().push(event);
    }
}

/// A mutating call made against `FakeCluster`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    CreateDeployment { name: String, replicas: Option<i32> },
    UpdateDeployment { name: String, replicas: Option<i32> },
    UpdateFooStatus { name: String, available: i32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOn {
    Create,
    Update,
    Status,
}

/// In-memory API server
///
/// Writes land in the same caches the controller reads, standing in for the
/// watch that would deliver them.
pub struct FakeCluster {
    pub foos: WatchCache<Foo>,
    pub deployments: WatchCache<Deployment>,
    calls: Mutex<Vec<ApiCall>>,
    fail_on: Mutex<Option<FailOn>>,
    version: AtomicU64,
}

impl FakeCluster {
    /// Cluster over fresh caches that count as synced
    pub fn new() -> Arc<Self> {
        let cluster = Self::with_caches(WatchCache::new(), WatchCache::new());
        cluster.foos.mark_synced();
        cluster.deployments.mark_synced();
        cluster
    }

    /// Cluster writing into caches an informer owns
    pub fn with_caches(foos: WatchCache<Foo>, deployments: WatchCache<Deployment>) -> Arc<Self> {
        Arc::new(Self {
            foos,
            deployments,
            calls: Mutex::new(Vec::new()),
            fail_on: Mutex::new(None),
            version: AtomicU64::new(100),
        })
    }

    pub fn add_foo(&self, foo: Foo) {
        self.foos.apply(foo).unwrap();
    }

    pub fn add_deployment(&self, deployment: Deployment) {
        self.deployments.apply(deployment).unwrap();
    }

    pub fn foo(&self, name: &str) -> Arc<Foo> {
        self.foos.get(NAMESPACE, name).expect("foo in cluster")
    }

    pub fn deployment(&self, name: &str) -> Option<Arc<Deployment>> {
        self.deployments.get(NAMESPACE, name)
    }

    /// Pretend the Deployment's pods became available
    pub fn set_available(&self, name: &str, available: i32) {
        let mut deployment = (*self.deployment(name).expect("deployment in cluster")).clone();
        deployment.status = Some(DeploymentStatus {
            available_replicas: Some(available),
            ..Default::default()
        });
        deployment.metadata.resource_version = Some(self.next_version());
        self.deployments.apply(deployment).unwrap();
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn fail_on(&self, op: Option<FailOn>) {
        *self.fail_on.lock().unwrap() = op;
    }

    /// Context wired to this cluster and the given recorder
    pub fn context(self: &Arc<Self>, recorder: Arc<MockEventRecorder>) -> Context {
        Context::new(
            self.foos.clone(),
            self.deployments.clone(),
            self.clone(),
            StatusReporter::new(self.clone()),
            recorder,
        )
    }

    fn next_version(&self) -> String {
        self.version.fetch_add(1, Ordering::SeqCst).to_string()
    }

    fn check(&self, op: FailOn) -> Result<(), kube::Error> {
        if *self.fail_on.lock().unwrap() == Some(op) {
            return Err(api_error(500, "InternalError", "injected failure"));
        }
        Ok(())
    }

    fn record(&self, call: ApiCall) {
        self.calls.lock().unwrap().push(call);
    }
}

pub fn api_error(code: u16, reason: &str, message: &str) -> kube::Error {
    kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: message.to_string(),
        reason: reason.to_string(),
        code,
    })
}

fn replicas_of(deployment: &Deployment) -> Option<i32> {
    deployment.spec.as_ref().and_then(|s| s.replicas)
}

#[async_trait]
impl DeploymentClient for FakeCluster {
    async fn create(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<Deployment, kube::Error> {
        self.check(FailOn::Create)?;
        let name = deployment.name_any();
        self.record(ApiCall::CreateDeployment {
            name: name.clone(),
            replicas: replicas_of(deployment),
        });
        if self.deployments.get(namespace, &name).is_some() {
            return Err(api_error(409, "AlreadyExists", "deployment already exists"));
        }
        let mut stored = deployment.clone();
        stored.metadata.namespace = Some(namespace.to_string());
        stored.metadata.resource_version = Some(self.next_version());
        self.deployments.apply(stored.clone()).unwrap();
        Ok(stored)
    }

    async fn update(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<Deployment, kube::Error> {
        self.check(FailOn::Update)?;
        let name = deployment.name_any();
        self.record(ApiCall::UpdateDeployment {
            name: name.clone(),
            replicas: replicas_of(deployment),
        });
        let Some(existing) = self.deployments.get(namespace, &name) else {
            return Err(api_error(404, "NotFound", "deployment not found"));
        };
        let mut stored = deployment.clone();
        stored.metadata.namespace = Some(namespace.to_string());
        stored.metadata.resource_version = Some(self.next_version());
        stored.status = existing.status.clone();
        self.deployments.apply(stored.clone()).unwrap();
        Ok(stored)
    }
}

#[async_trait]
impl FooClient for FakeCluster {
    async fn update_status(&self, foo: &Foo) -> Result<Foo, kube::Error> {
        self.check(FailOn::Status)?;
        let key = object_key(foo).unwrap();
        self.record(ApiCall::UpdateFooStatus {
            name: foo.name_any(),
            available: foo.status.as_ref().map_or(0, |s| s.available_replicas),
        });
        let Some(existing) = self.foos.get_by_key(&key) else {
            return Err(api_error(404, "NotFound", "foo not found"));
        };
        // Status subresource: only status is taken from the request
        let mut stored = (*existing).clone();
        stored.status = foo.status.clone();
        stored.metadata.resource_version = Some(self.next_version());
        self.foos.apply(stored.clone()).unwrap();
        Ok(stored)
    }
}

pub fn foo_key(name: &str) -> String {
    key_for(Some(NAMESPACE), name)
}
