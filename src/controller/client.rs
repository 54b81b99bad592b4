//! External API seams
//!
//! Reconciliation only ever mutates the cluster through these traits. The
//! production implementation talks to the Kubernetes API; tests substitute
//! an in-memory cluster.

use crate::crd::Foo;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use serde_json::json;

#[async_trait]
pub trait DeploymentClient: Send + Sync {
    async fn create(&self, namespace: &str, deployment: &Deployment)
        -> Result<Deployment, kube::Error>;

    /// Replace the whole Deployment with `deployment`
    async fn update(&self, namespace: &str, deployment: &Deployment)
        -> Result<Deployment, kube::Error>;
}

#[async_trait]
pub trait FooClient: Send + Sync {
    /// Persist `foo.status` through the status subresource
    ///
    /// Implementations must not write any other part of the object.
    async fn update_status(&self, foo: &Foo) -> Result<Foo, kube::Error>;
}

/// Merge patch carrying only the status of `foo`
pub fn status_patch(foo: &Foo) -> serde_json::Value {
    json!({ "status": foo.status })
}

/// Kubernetes-backed implementation of both client traits
#[derive(Clone)]
pub struct KubeClients {
    client: Client,
}

impl KubeClients {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn missing_name(kind: &str) -> kube::Error {
    kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{} has no name", kind),
        reason: "Invalid".to_string(),
        code: 422,
    })
}

#[async_trait]
impl DeploymentClient for KubeClients {
    async fn create(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<Deployment, kube::Error> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), deployment).await
    }

    async fn update(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<Deployment, kube::Error> {
        let name = deployment
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| missing_name("Deployment"))?;
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        api.replace(name, &PostParams::default(), deployment).await
    }
}

#[async_trait]
impl FooClient for KubeClients {
    async fn update_status(&self, foo: &Foo) -> Result<Foo, kube::Error> {
        let name = foo
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| missing_name("Foo"))?;
        let namespace = foo.namespace().unwrap_or_default();
        let api: Api<Foo> = Api::namespaced(self.client.clone(), &namespace);
        api.patch_status(
            name,
            &PatchParams::default(),
            &Patch::Merge(&status_patch(foo)),
        )
        .await
    }
}
