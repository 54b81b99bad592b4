//! Maps watch events to work queue keys
//!
//! Foo events enqueue the Foo itself. Deployment events enqueue the Foo that
//! controls the Deployment, if there is one and it is still cached.

use super::cache::WatchCache;
use super::deployment::controller_of;
use super::informer::{DeletedObject, EventHandler, WatchEvent};
use super::key::{key_for, object_key};
use super::queue::WorkQueue;
use crate::crd::Foo;
use k8s_openapi::api::apps::v1::Deployment;
use kube::{Resource, ResourceExt};
use tracing::{debug, error, info};

/// What the router did with an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Key added to the work queue
    Enqueued(String),
    /// Event type this controller does not act on
    Ignored,
    /// Resync re-delivery of an unchanged object
    Unchanged,
    /// Object has no controller owner reference
    NotControlled,
    /// Object is controlled by something other than a Foo
    NotOurKind { kind: String },
    /// Controlling Foo is not in the cache
    OwnerNotInCache { owner: String },
    /// Object has no usable key
    InvalidObject,
}

#[derive(Clone)]
pub struct EventRouter {
    queue: WorkQueue<String>,
    foos: WatchCache<Foo>,
}

impl EventRouter {
    pub fn new(queue: WorkQueue<String>, foos: WatchCache<Foo>) -> Self {
        Self { queue, foos }
    }

    /// Foo adds and updates enqueue the Foo; deletions are left to `sync`,
    /// which finds the Foo missing
    pub fn route_foo(&self, event: &WatchEvent<Foo>) -> RouteOutcome {
        match event {
            WatchEvent::Added(foo) | WatchEvent::Updated { new: foo, .. } => self.enqueue_foo(foo),
            WatchEvent::Deleted(_) => RouteOutcome::Ignored,
        }
    }

    pub fn route_deployment(&self, event: &WatchEvent<Deployment>) -> RouteOutcome {
        match event {
            WatchEvent::Added(deployment) => self.handle_object(deployment),
            WatchEvent::Updated { old, new } => {
                // Two versions of the same object always differ in resourceVersion
                if old.resource_version() == new.resource_version() {
                    return RouteOutcome::Unchanged;
                }
                self.handle_object(new)
            }
            WatchEvent::Deleted(deleted) => {
                if let DeletedObject::Tombstone { key, .. } = deleted {
                    info!(deployment = %key, "Recovered deleted object from tombstone");
                }
                self.handle_object(deleted.object())
            }
        }
    }

    /// Resolve a Deployment to its controlling Foo and enqueue it
    fn handle_object(&self, deployment: &Deployment) -> RouteOutcome {
        let Some(owner) = controller_of(deployment) else {
            return RouteOutcome::NotControlled;
        };
        if owner.kind != Foo::kind(&()) {
            return RouteOutcome::NotOurKind {
                kind: owner.kind.clone(),
            };
        }

        let namespace = deployment.namespace().unwrap_or_default();
        match self.foos.get(&namespace, &owner.name) {
            Some(foo) => self.enqueue_foo(&foo),
            None => {
                error!(
                    deployment = %deployment.name_any(),
                    foo = %key_for(Some(&namespace), &owner.name),
                    "Ignoring orphaned object"
                );
                RouteOutcome::OwnerNotInCache {
                    owner: owner.name.clone(),
                }
            }
        }
    }

    fn enqueue_foo(&self, foo: &Foo) -> RouteOutcome {
        match object_key(foo) {
            Ok(key) => {
                self.queue.add(key.clone());
                RouteOutcome::Enqueued(key)
            }
            Err(e) => {
                error!(error = %e, "Failed to get key for Foo");
                RouteOutcome::InvalidObject
            }
        }
    }
}

impl EventHandler<Foo> for EventRouter {
    fn on_event(&self, event: WatchEvent<Foo>) {
        let outcome = self.route_foo(&event);
        debug!(outcome = ?outcome, "Routed Foo event");
    }
}

impl EventHandler<Deployment> for EventRouter {
    fn on_event(&self, event: WatchEvent<Deployment>) {
        let outcome = self.route_deployment(&event);
        debug!(outcome = ?outcome, "Routed Deployment event");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "router_test.rs"]
mod tests;
