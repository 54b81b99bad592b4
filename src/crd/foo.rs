use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Foo declares a Deployment that the controller keeps in shape
///
/// The controller creates the named Deployment on first sight, scales it to
/// `spec.replicas` whenever it drifts, and mirrors the Deployment's available
/// replica count back into `status`.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[kube(
    group = "example.com",
    version = "v1alpha1",
    kind = "Foo",
    namespaced,
    status = "FooStatus",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Deployment", "type":"string", "jsonPath":".spec.deploymentName"}"#,
    printcolumn = r#"{"name":"Desired", "type":"integer", "jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Available", "type":"integer", "jsonPath":".status.availableReplicas"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct FooSpec {
    /// Name of the Deployment managed on behalf of this Foo
    #[serde(rename = "deploymentName")]
    #[schemars(length(min = 1))]
    pub deployment_name: String,

    /// Desired replica count. When unset the Deployment keeps whatever
    /// count it already has.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 0))]
    pub replicas: Option<i32>,
}

/// Status written by the controller only
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct FooStatus {
    /// Available replicas last observed on the managed Deployment
    #[serde(rename = "availableReplicas", default)]
    pub available_replicas: i32,
}
