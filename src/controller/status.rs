//! Writes observed state back onto a Foo

use super::client::FooClient;
use super::reconcile::ReconcileError;
use crate::crd::{Foo, FooStatus};
use kube::ResourceExt;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct StatusReporter {
    client: Arc<dyn FooClient>,
}

impl StatusReporter {
    pub fn new(client: Arc<dyn FooClient>) -> Self {
        Self { client }
    }

    /// Persist `status` for `foo`
    ///
    /// `foo` is usually a cache snapshot and is left untouched; the write goes
    /// out on a copy, and only its status portion is sent.
    pub async fn update_status(&self, foo: &Foo, status: FooStatus) -> Result<Foo, ReconcileError> {
        let mut copy = foo.clone();
        copy.status = Some(status);
        debug!(foo = %foo.name_any(), status = ?copy.status, "Updating Foo status");
        Ok(self.client.update_status(&copy).await?)
    }
}
