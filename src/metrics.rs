//! Controller Metrics
//!
//! Prometheus counters for replication actions, connectivity probing and
//! registry reloads, exposed in text format on the operational API.

use crate::error::Result;
use prometheus::{IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Metrics published by the control plane
#[derive(Clone)]
pub struct ControllerMetrics {
    replication_actions: IntCounterVec,
    connectivity_checks: IntCounterVec,
    io_checks: IntCounterVec,
    probe_tasks: IntCounterVec,
    registry_reloads: IntCounterVec,
    registry: Arc<Registry>,
}

impl ControllerMetrics {
    /// Create metrics on a private registry
    pub fn new() -> Result<Arc<Self>> {
        Ok(Arc::new(Self::with_registry(Arc::new(Registry::new()))?))
    }

    /// Register all controller metrics with the provided registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let replication_actions = IntCounterVec::new(
            Opts::new(
                "array_replication_actions_total",
                "Replication session actions by action and outcome",
            ),
            &["action", "outcome"],
        )?;
        registry.register(Box::new(replication_actions.clone()))?;

        let connectivity_checks = IntCounterVec::new(
            Opts::new(
                "array_connectivity_checks_total",
                "Array reachability checks by result",
            ),
            &["result"],
        )?;
        registry.register(Box::new(connectivity_checks.clone()))?;

        let io_checks = IntCounterVec::new(
            Opts::new(
                "array_io_checks_total",
                "IO activity races by result",
            ),
            &["result"],
        )?;
        registry.register(Box::new(io_checks.clone()))?;

        let probe_tasks = IntCounterVec::new(
            Opts::new(
                "array_probe_tasks_total",
                "Terminal states of IO probe tasks",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(probe_tasks.clone()))?;

        let registry_reloads = IntCounterVec::new(
            Opts::new(
                "array_registry_reloads_total",
                "Array registry reloads by result",
            ),
            &["result"],
        )?;
        registry.register(Box::new(registry_reloads.clone()))?;

        Ok(Self {
            replication_actions,
            connectivity_checks,
            io_checks,
            probe_tasks,
            registry_reloads,
            registry,
        })
    }

    pub fn record_replication_action(&self, action: &str, outcome: &str) {
        self.replication_actions
            .with_label_values(&[action, outcome])
            .inc();
    }

    pub fn record_connectivity_check(&self, result: &str) {
        self.connectivity_checks.with_label_values(&[result]).inc();
    }

    pub fn record_io_check(&self, result: &str) {
        self.io_checks.with_label_values(&[result]).inc();
    }

    pub fn record_probe_task(&self, outcome: &str) {
        self.probe_tasks.with_label_values(&[outcome]).inc();
    }

    pub fn record_registry_reload(&self, result: &str) {
        self.registry_reloads.with_label_values(&[result]).inc();
    }

    /// Current value of a probe task counter
    pub fn probe_task_count(&self, outcome: &str) -> u64 {
        self.probe_tasks.with_label_values(&[outcome]).get()
    }

    /// Current value of a replication action counter
    pub fn replication_action_count(&self, action: &str, outcome: &str) -> u64 {
        self.replication_actions
            .with_label_values(&[action, outcome])
            .get()
    }

    /// Encode all metrics in the Prometheus text format
    pub fn gather_text(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        Ok(encoder.encode_to_string(&self.registry.gather())?)
    }
}

impl std::fmt::Debug for ControllerMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerMetrics").finish_non_exhaustive()
    }
}
