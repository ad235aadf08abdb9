//! Node Status Client
//!
//! Queries the status endpoint served by the node plugin, which records when
//! the node last tried and last managed to reach each array.

use crate::domain::ports::{ArrayConnectivityStatus, NodeStatusClient};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Port the node plugin serves its status API on
pub const DEFAULT_NODE_STATUS_PORT: u16 = 8083;

/// Path prefix of the per-array status resource
pub const ARRAY_STATUS_PATH: &str = "/array-status";

/// HTTP implementation of [`NodeStatusClient`]
#[derive(Debug, Clone)]
pub struct HttpNodeStatusClient {
    http_client: reqwest::Client,
    port: u16,
}

impl HttpNodeStatusClient {
    /// Create a new client for nodes serving on `port`
    pub fn new(port: u16, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http_client, port })
    }

    pub fn status_url(&self, node_ip: &str, global_id: &str) -> String {
        format!(
            "http://{}:{}{}/{}",
            node_ip, self.port, ARRAY_STATUS_PATH, global_id
        )
    }
}

#[async_trait]
impl NodeStatusClient for HttpNodeStatusClient {
    async fn array_status(&self, node_ip: &str, global_id: &str) -> Result<ArrayConnectivityStatus> {
        let url = self.status_url(node_ip, global_id);
        debug!(url = %url, "querying node array status");

        let response = self.http_client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(format!("node status request to {}", url))
            } else {
                Error::Http(e)
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Internal(format!(
                "node status endpoint returned {}: {}",
                status, body
            )));
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Whether a node's view of an array counts as connected.
///
/// Both the last success and the gap between the last attempt and the last
/// success must fall within `window`.
pub fn is_fresh(status: &ArrayConnectivityStatus, now: i64, window: Duration) -> bool {
    let window = window.as_secs() as i64;
    now - status.last_success <= window && status.last_attempt - status.last_success <= window
}
