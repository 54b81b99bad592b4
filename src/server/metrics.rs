//! Prometheus metrics for the controller
//!
//! Reconcile outcomes and durations are recorded by the workers; queue depth
//! and retry counts by the worker loop around the work queue.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

pub type SharedMetrics = Arc<ControllerMetrics>;

pub struct ControllerMetrics {
    registry: Registry,
    reconciliations: IntCounterVec,
    reconcile_duration: Histogram,
    queue_depth: IntGauge,
    queue_retries: IntCounter,
}

impl ControllerMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let reconciliations = IntCounterVec::new(
            Opts::new(
                "foo_controller_reconciliations_total",
                "Sync attempts by result",
            ),
            &["result"],
        )?;
        let reconcile_duration = Histogram::with_opts(
            HistogramOpts::new(
                "foo_controller_reconcile_duration_seconds",
                "Time spent in a single sync",
            )
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )?;
        let queue_depth = IntGauge::new(
            "foo_controller_workqueue_depth",
            "Keys waiting in the work queue",
        )?;
        let queue_retries = IntCounter::new(
            "foo_controller_workqueue_retries_total",
            "Keys re-queued with backoff after a failed sync",
        )?;

        registry.register(Box::new(reconciliations.clone()))?;
        registry.register(Box::new(reconcile_duration.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;
        registry.register(Box::new(queue_retries.clone()))?;

        Ok(Self {
            registry,
            reconciliations,
            reconcile_duration,
            queue_depth,
            queue_retries,
        })
    }

    /// Record one finished sync
    ///
    /// `result` is one of `synced`, `not_found`, `invalid_spec`, `error`, `malformed`.
    pub fn record_reconciliation(&self, result: &str, duration_secs: f64) {
        self.reconciliations.with_label_values(&[result]).inc();
        self.reconcile_duration.observe(duration_secs);
    }

    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.set(depth as i64);
    }

    pub fn record_retry(&self) {
        self.queue_retries.inc();
    }

    pub fn reconciliation_count(&self, result: &str) -> u64 {
        self.reconciliations.with_label_values(&[result]).get()
    }

    /// Render every registered metric in the Prometheus text format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub fn create_metrics() -> Result<SharedMetrics, prometheus::Error> {
    Ok(Arc::new(ControllerMetrics::new()?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_reconciliations_are_counted_by_result() {
        let metrics = create_metrics().unwrap();

        metrics.record_reconciliation("synced", 0.01);
        metrics.record_reconciliation("synced", 0.02);
        metrics.record_reconciliation("error", 0.5);

        assert_eq!(metrics.reconciliation_count("synced"), 2);
        assert_eq!(metrics.reconciliation_count("error"), 1);
        assert_eq!(metrics.reconciliation_count("not_found"), 0);
    }

    #[test]
    fn test_encode_contains_registered_series() {
        let metrics = create_metrics().unwrap();
        metrics.record_reconciliation("synced", 0.01);
        metrics.set_queue_depth(4);
        metrics.record_retry();

        let body = metrics.encode().unwrap();

        assert!(body.contains("foo_controller_reconciliations_total{result=\"synced\"} 1"));
        assert!(body.contains("foo_controller_workqueue_depth 4"));
        assert!(body.contains("foo_controller_workqueue_retries_total 1"));
        assert!(body.contains("foo_controller_reconcile_duration_seconds_bucket"));
    }
}
