//! Kubernetes Events emitted while reconciling Foos
//!
//! Events are informational: a failed publish is logged and never fails the
//! sync that produced it.

use crate::crd::Foo;
use async_trait::async_trait;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource};
use tracing::warn;

/// Reporting component shown on every Event
pub const CONTROLLER_NAME: &str = "foo-controller";

/// Reason used when a Foo has been synced successfully
pub const SUCCESS_SYNCED: &str = "Synced";

/// Reason used when a Foo's Deployment name is taken by an object it does not control
pub const ERR_RESOURCE_EXISTS: &str = "ErrResourceExists";

pub const MESSAGE_RESOURCE_SYNCED: &str = "Foo synced successfully";

const ACTION_RECONCILE: &str = "Reconcile";

pub fn message_resource_exists(name: &str) -> String {
    format!("Resource {:?} already exists and is not managed by Foo", name)
}

#[async_trait]
pub trait EventRecorder: Send + Sync {
    async fn record(&self, foo: &Foo, type_: EventType, reason: &str, note: String);
}

/// Publishes through `kube::runtime::events::Recorder`
pub struct KubeEventRecorder {
    recorder: Recorder,
}

impl KubeEventRecorder {
    pub fn new(client: Client) -> Self {
        let reporter = Reporter {
            controller: CONTROLLER_NAME.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventRecorder for KubeEventRecorder {
    async fn record(&self, foo: &Foo, type_: EventType, reason: &str, note: String) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note: Some(note),
            action: ACTION_RECONCILE.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, &foo.object_ref(&())).await {
            warn!(reason, error = %e, "Failed to publish Kubernetes event");
        }
    }
}

/// An event captured by `MockEventRecorder`
#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub object: String,
    pub warning: bool,
    pub reason: String,
    pub note: String,
}

/// Mock recorder for testing - stores events in memory
#[cfg(test)]
#[derive(Default)]
pub struct MockEventRecorder {
    events: std::sync::Mutex<Vec<RecordedEvent>>,
}

#[cfg(test)]
impl MockEventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::unwrap_used)]
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn reasons(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.reason).collect()
    }
}

#[cfg(test)]
#[async_trait]
impl EventRecorder for MockEventRecorder {
    async fn record(&self, foo: &Foo, type_: EventType, reason: &str, note: String) {
        use kube::ResourceExt;

        #[allow(clippy::unwrap_used)]
        self.events.lock().unwrap().push(RecordedEvent {
            object: foo.name_any(),
            warning: matches!(type_, EventType::Warning),
            reason: reason.to_string(),
            note,
        });
    }
}
