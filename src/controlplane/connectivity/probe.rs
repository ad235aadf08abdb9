//! Connectivity Probe
//!
//! Answers whether a node can still reach the arrays behind a set of volumes
//! and whether any of those volumes is still being written to.
//!
//! Every network call runs in its own task. All tasks of one request share a
//! [`Deadline`]; tasks check it before dispatching a call but never abort one
//! in flight. Once the collector has its answer it stops listening, and a
//! task finishing later lands in [`ProbeTaskOutcome::Discarded`].

use super::status::is_fresh;
use crate::array::{ipv4_addresses, Array};
use crate::controlplane::codec::{Protocol, VolumeHandle, VolumeHandleCodec};
use crate::domain::ports::{ArrayConnectivityStatus, MetricsInterval, NodeStatusClientRef, PerformanceSample};
use crate::error::{Error, Result};
use crate::metrics::ControllerMetrics;
use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Reply to a request that names neither volumes nor a node
pub const CAPABILITY_MESSAGE: &str = "ValidateVolumeHostConnectivity is implemented";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for connectivity probing
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Maximum age of a node's last successful array contact
    pub freshness_window: Duration,
    /// Number of most recent performance samples inspected
    pub io_sample_count: usize,
    /// Maximum age of a sample showing IO
    pub io_freshness: Duration,
    /// Interval requested from the metrics API
    pub metrics_interval: MetricsInterval,
    /// Deadline applied to a whole request
    pub timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            freshness_window: Duration::from_secs(60),
            io_sample_count: 4,
            io_freshness: Duration::from_secs(60),
            metrics_interval: MetricsInterval::TwentySec,
            timeout: Duration::from_secs(10),
        }
    }
}

// =============================================================================
// Request / Result
// =============================================================================

/// Host connectivity request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityRequest {
    #[serde(default)]
    pub array_id: Option<String>,
    #[serde(default)]
    pub volume_ids: Vec<String>,
    #[serde(default)]
    pub node_id: Option<String>,
}

impl ConnectivityRequest {
    fn array_id(&self) -> Option<&str> {
        self.array_id.as_deref().filter(|s| !s.is_empty())
    }

    fn node_id(&self) -> Option<&str> {
        self.node_id.as_deref().filter(|s| !s.is_empty())
    }
}

/// Host connectivity verdict
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityResult {
    /// At least one checked array is reachable from the node
    pub connected: bool,
    pub ios_in_progress: bool,
    /// Diagnostics in the order they were produced
    pub messages: Vec<String>,
}

impl ConnectivityResult {
    fn push(&mut self, message: String) {
        info!("{}", message);
        self.messages.push(message);
    }
}

// =============================================================================
// Deadline
// =============================================================================

/// Cancellation token paired with an absolute expiry
#[derive(Debug, Clone)]
pub struct Deadline {
    token: CancellationToken,
    expires_at: Instant,
}

impl Deadline {
    /// Deadline `timeout` from now
    pub fn after(timeout: Duration) -> Self {
        Self::with_token(CancellationToken::new(), timeout)
    }

    /// Deadline `timeout` from now that also fires when `token` is cancelled
    pub fn with_token(token: CancellationToken, timeout: Duration) -> Self {
        Self {
            token,
            expires_at: Instant::now() + timeout,
        }
    }

    /// Same expiry, cancellable on its own
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            expires_at: self.expires_at,
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_expired(&self) -> bool {
        self.token.is_cancelled() || Instant::now() >= self.expires_at
    }

    /// Resolves on cancellation or expiry, whichever comes first
    pub async fn expired(&self) {
        tokio::select! {
            _ = self.token.cancelled() => {}
            _ = tokio::time::sleep_until(self.expires_at) => {}
        }
    }
}

// =============================================================================
// IO Race
// =============================================================================

/// Terminal state of a single probe task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeTaskOutcome {
    /// Result handed to the collector
    Delivered,
    /// Collector had stopped listening; result dropped
    Discarded,
    /// Deadline passed before the call was dispatched
    Skipped,
}

impl ProbeTaskOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeTaskOutcome::Delivered => "delivered",
            ProbeTaskOutcome::Discarded => "discarded",
            ProbeTaskOutcome::Skipped => "skipped",
        }
    }
}

/// Verdict of an IO race
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoRaceOutcome {
    InProgress,
    Idle,
    DeadlineExceeded,
}

impl IoRaceOutcome {
    pub fn is_in_progress(&self) -> bool {
        matches!(self, IoRaceOutcome::InProgress)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IoRaceOutcome::InProgress => "in_progress",
            IoRaceOutcome::Idle => "idle",
            IoRaceOutcome::DeadlineExceeded => "deadline",
        }
    }
}

/// One volume to check for IO on one array
#[derive(Debug, Clone)]
pub struct IoCheck {
    pub array: Arc<Array>,
    pub volume_id: String,
    pub protocol: Protocol,
}

impl IoCheck {
    async fn run(&self, config: &ProbeConfig) -> Result<bool> {
        let client = self.array.client();
        let samples = match self.protocol {
            Protocol::Scsi => {
                client
                    .performance_metrics_by_volume(&self.volume_id, config.metrics_interval)
                    .await
            }
            Protocol::Nfs => {
                client
                    .performance_metrics_by_filesystem(&self.volume_id, config.metrics_interval)
                    .await
            }
        }
        .map_err(|e| Error::array_api(self.array.global_id(), "query performance metrics", e))?;

        Ok(io_in_progress_from_samples(
            &samples,
            Utc::now(),
            config.io_sample_count,
            config.io_freshness,
        ))
    }
}

/// Whether any of the last `count` samples shows IO within `window` of `now`
pub fn io_in_progress_from_samples(
    samples: &[PerformanceSample],
    now: DateTime<Utc>,
    count: usize,
    window: Duration,
) -> bool {
    let window = chrono::Duration::seconds(window.as_secs() as i64);
    samples.iter().rev().take(count).any(|sample| {
        sample.total_iops > 0.0
            && sample
                .timestamp
                .map(|ts| now.signed_duration_since(ts) < window)
                .unwrap_or(false)
    })
}

/// Collect task results until the first positive, the last negative or the
/// deadline.
///
/// A positive already queued when the deadline fires still wins.
pub async fn first_positive(mut rx: mpsc::Receiver<Result<bool>>, deadline: &Deadline) -> Result<IoRaceOutcome> {
    loop {
        tokio::select! {
            biased;
            received = rx.recv() => match received {
                Some(Ok(true)) => return Ok(IoRaceOutcome::InProgress),
                Some(Ok(false)) => {}
                Some(Err(e)) => return Err(e),
                None => return Ok(IoRaceOutcome::Idle),
            },
            _ = deadline.expired() => {
                while let Ok(received) = rx.try_recv() {
                    if matches!(received, Ok(true)) {
                        return Ok(IoRaceOutcome::InProgress);
                    }
                }
                return Ok(IoRaceOutcome::DeadlineExceeded);
            }
        }
    }
}

// =============================================================================
// Connectivity Probe
// =============================================================================

/// Fan-out liveness and IO activity checks
pub struct ConnectivityProbe {
    codec: VolumeHandleCodec,
    status_client: NodeStatusClientRef,
    config: ProbeConfig,
    metrics: Arc<ControllerMetrics>,
}

impl ConnectivityProbe {
    /// Create a new connectivity probe
    pub fn new(
        codec: VolumeHandleCodec,
        status_client: NodeStatusClientRef,
        config: ProbeConfig,
        metrics: Arc<ControllerMetrics>,
    ) -> Self {
        Self {
            codec,
            status_client,
            config,
            metrics,
        }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Deadline for one request using the configured timeout
    pub fn deadline(&self) -> Deadline {
        Deadline::after(self.config.timeout)
    }

    /// Check array reachability from a node and IO activity on volumes
    pub async fn validate_volume_host_connectivity(
        &self,
        request: &ConnectivityRequest,
        deadline: &Deadline,
    ) -> Result<ConnectivityResult> {
        info!(
            array_id = ?request.array_id,
            node_id = ?request.node_id,
            volumes = request.volume_ids.len(),
            "validating volume host connectivity"
        );
        let mut result = ConnectivityResult::default();

        if (request.volume_ids.is_empty() || request.array_id().is_none()) && request.node_id().is_none() {
            self.metrics.record_connectivity_check("capability");
            result.push(CAPABILITY_MESSAGE.to_string());
            return Ok(result);
        }

        let node_id = request
            .node_id()
            .ok_or_else(|| Error::Validation("the NodeID is a required field".into()))?;
        let node_ip = ipv4_addresses(node_id)
            .last()
            .map(|ip| ip.to_string())
            .ok_or_else(|| Error::Validation(format!("failed to parse node ID {:?}", node_id)))?;

        let mut handles = Vec::with_capacity(request.volume_ids.len());
        for raw in &request.volume_ids {
            handles.push(self.codec.decode(raw).await?);
        }

        let arrays = self.target_arrays(request.array_id(), &handles)?;
        let checks = self.io_checks(&handles)?;

        // Both share the caller deadline, so neither waits on the other
        let (_, ios_in_progress) = tokio::join!(
            self.check_reachability(&arrays, node_id, &node_ip, deadline, &mut result),
            self.is_io_in_progress(checks, deadline),
        );
        self.metrics.record_connectivity_check(if result.connected {
            "connected"
        } else {
            "disconnected"
        });
        result.ios_in_progress = ios_in_progress?;

        info!(
            connected = result.connected,
            ios_in_progress = result.ios_in_progress,
            "volume host connectivity validated"
        );
        Ok(result)
    }

    /// Arrays whose reachability is checked for a request
    fn target_arrays(&self, array_id: Option<&str>, handles: &[VolumeHandle]) -> Result<Vec<Arc<Array>>> {
        let registry = self.codec.registry();
        let mut ids = IndexSet::new();

        match array_id {
            Some(array_id) => {
                if let Some(handle) = handles.iter().find(|h| h.array_id != array_id) {
                    warn!(
                        requested = array_id,
                        actual = %handle.array_id,
                        "volume does not belong to the requested array"
                    );
                    return Err(Error::Validation(format!("invalid globalId {} is provided", array_id)));
                }
                ids.insert(array_id.to_string());
            }
            None if !handles.is_empty() => {
                for handle in handles {
                    ids.insert(handle.array_id.clone());
                    if let Some(remote) = &handle.remote {
                        ids.insert(remote.array_id.clone());
                    }
                }
            }
            None => {
                let default = registry
                    .default_array()
                    .ok_or_else(|| Error::Configuration("no default array configured".into()))?;
                ids.insert(default.global_id().to_string());
            }
        }

        ids.iter().map(|id| registry.get(id)).collect()
    }

    /// One check per local volume, plus one per remote half of a metro volume
    pub fn io_checks(&self, handles: &[VolumeHandle]) -> Result<Vec<IoCheck>> {
        let registry = self.codec.registry();
        let mut checks = Vec::with_capacity(handles.len());

        for handle in handles {
            checks.push(IoCheck {
                array: registry.get(&handle.array_id)?,
                volume_id: handle.local_id.clone(),
                protocol: handle.protocol,
            });
            if let Some(remote) = &handle.remote {
                // Metro pairs are block only
                checks.push(IoCheck {
                    array: registry.get(&remote.array_id)?,
                    volume_id: remote.volume_id.clone(),
                    protocol: remote.protocol.unwrap_or(Protocol::Scsi),
                });
            }
        }
        Ok(checks)
    }

    async fn check_reachability(
        &self,
        arrays: &[Arc<Array>],
        node_id: &str,
        node_ip: &str,
        deadline: &Deadline,
        result: &mut ConnectivityResult,
    ) {
        let mut tasks = JoinSet::new();
        for (index, array) in arrays.iter().enumerate() {
            let client = self.status_client.clone();
            let node_ip = node_ip.to_string();
            let global_id = array.global_id().to_string();
            tasks.spawn(async move { (index, client.array_status(&node_ip, &global_id).await) });
        }

        let mut statuses: Vec<Option<Result<ArrayConnectivityStatus>>> =
            arrays.iter().map(|_| None).collect();
        loop {
            tokio::select! {
                biased;
                joined = tasks.join_next() => match joined {
                    Some(Ok((index, status))) => statuses[index] = Some(status),
                    Some(Err(e)) => warn!(error = %e, "array status task failed"),
                    None => break,
                },
                _ = deadline.expired() => {
                    debug!(pending = tasks.len(), "deadline reached, detaching array status tasks");
                    tasks.detach_all();
                    break;
                }
            }
        }

        let now = Utc::now().timestamp();
        for (array, status) in arrays.iter().zip(statuses) {
            let global_id = array.global_id();
            let connected = match status {
                Some(Ok(status)) => is_fresh(&status, now, self.config.freshness_window),
                Some(Err(e)) => {
                    result.push(format!(
                        "connectivity unknown for array {} to node {} due to {}",
                        global_id, node_id, e
                    ));
                    false
                }
                None => {
                    result.push(format!(
                        "connectivity unknown for array {} to node {} due to deadline exceeded",
                        global_id, node_id
                    ));
                    false
                }
            };

            if connected {
                result.connected = true;
                result.push(format!("array {} is connected to node {}", global_id, node_id));
            } else {
                result.push(format!("array {} is not connected to node {}", global_id, node_id));
            }
        }
    }

    /// Race IO checks; true on the first positive.
    ///
    /// A deadline is a negative answer, not an error. The first failing
    /// check is surfaced as an error.
    pub async fn is_io_in_progress(&self, checks: Vec<IoCheck>, deadline: &Deadline) -> Result<bool> {
        if checks.is_empty() {
            return Ok(false);
        }

        let race = deadline.child();
        let (tx, rx) = mpsc::channel(checks.len());
        for check in checks {
            self.spawn_io_task(check, tx.clone(), race.token().clone());
        }
        drop(tx);

        let outcome = first_positive(rx, &race).await;
        race.cancel();

        match outcome {
            Ok(outcome) => {
                debug!(outcome = outcome.as_str(), "IO race finished");
                self.metrics.record_io_check(outcome.as_str());
                Ok(outcome.is_in_progress())
            }
            Err(e) => {
                warn!(error = %e, "IO check failed");
                self.metrics.record_io_check("error");
                Err(e)
            }
        }
    }

    fn spawn_io_task(&self, check: IoCheck, tx: mpsc::Sender<Result<bool>>, token: CancellationToken) {
        let config = self.config.clone();
        let metrics = self.metrics.clone();

        tokio::spawn(async move {
            let outcome = if token.is_cancelled() {
                ProbeTaskOutcome::Skipped
            } else {
                let result = check.run(&config).await;
                match tx.send(result).await {
                    Ok(()) => ProbeTaskOutcome::Delivered,
                    Err(_) => ProbeTaskOutcome::Discarded,
                }
            };

            debug!(
                array = check.array.global_id(),
                volume_id = %check.volume_id,
                outcome = outcome.as_str(),
                "IO probe task finished"
            );
            metrics.record_probe_task(outcome.as_str());
        });
    }
}
