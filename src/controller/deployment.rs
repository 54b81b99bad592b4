//! Desired Deployment for a Foo, and ownership checks
//!
//! `new_deployment` is the only place the managed Deployment's shape is
//! defined. Create and update both send its output, so any drift converges
//! to the same target.

use super::reconcile::ReconcileError;
use crate::crd::Foo;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, OwnerReference};
use kube::api::ObjectMeta;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;

/// Value of the `app` label on every managed Deployment and its pods
pub const APP_LABEL: &str = "nginx";
pub const CONTAINER_NAME: &str = "nginx";
pub const CONTAINER_IMAGE: &str = "nginx:latest";

fn labels(foo: &Foo) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app".to_string(), APP_LABEL.to_string()),
        ("controller".to_string(), foo.name_any()),
    ])
}

/// Build the Deployment a Foo asks for
///
/// # Errors
/// Fails when the Foo has no name or uid, since no owner reference can be
/// made for it.
pub fn new_deployment(foo: &Foo) -> Result<Deployment, ReconcileError> {
    if foo.metadata.name.is_none() {
        return Err(ReconcileError::MissingName);
    }
    let owner = foo
        .controller_owner_ref(&())
        .ok_or(ReconcileError::MissingUid)?;
    let labels = labels(foo);

    Ok(Deployment {
        metadata: ObjectMeta {
            name: Some(foo.spec.deployment_name.clone()),
            namespace: foo.namespace(),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: foo.spec.replicas,
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: CONTAINER_NAME.to_string(),
                        image: Some(CONTAINER_IMAGE.to_string()),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    })
}

/// The owner reference marked as controller, if any
pub fn controller_of<K: Resource>(obj: &K) -> Option<&OwnerReference> {
    obj.meta()
        .owner_references
        .as_deref()
        .unwrap_or_default()
        .iter()
        .find(|r| r.controller == Some(true))
}

/// Whether `foo` is the controlling owner of `deployment`
///
/// Matching is by uid, so a Foo deleted and re-created under the same name
/// does not inherit the old one's Deployment.
pub fn is_controlled_by(deployment: &Deployment, foo: &Foo) -> bool {
    match (controller_of(deployment), foo.metadata.uid.as_deref()) {
        (Some(owner), Some(uid)) => owner.uid == uid,
        _ => false,
    }
}

/// Replica count currently requested on a Deployment
pub fn deployment_replicas(deployment: &Deployment) -> Option<i32> {
    deployment.spec.as_ref().and_then(|s| s.replicas)
}

/// Available replicas reported on a Deployment's status
pub fn available_replicas(deployment: &Deployment) -> i32 {
    deployment
        .status
        .as_ref()
        .and_then(|s| s.available_replicas)
        .unwrap_or(0)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "deployment_test.rs"]
mod tests;
