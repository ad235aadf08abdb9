//! Array Volume Control Plane
//!
//! Loads the array configuration, builds the shared registry and serves the
//! operational REST API until interrupted.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{filter::Directive, fmt, prelude::*, EnvFilter};

use array_volume_controlplane::{
    ApiServer, ApiServerConfig, AppState, ArrayConfigSource, ArrayRegistry, ConnectivityProbe,
    ControllerMetrics, Error, HttpNodeStatusClient, ProbeConfig, RegistryEvent, ReplicationConfig,
    ReplicationOrchestrator, RestClientConfig, RestClientFactory, Result, VolumeHandleCodec,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Array Volume Control Plane - volume lifecycle operations on storage arrays
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path of the YAML file listing the managed arrays
    #[arg(long, env = "ARRAY_CONFIG", default_value = "/etc/array-controlplane/arrays.yaml")]
    array_config: PathBuf,

    /// REST API bind address
    #[arg(long, env = "API_ADDR", default_value = "0.0.0.0:8090")]
    api_addr: String,

    /// Port of the node status endpoint
    #[arg(long, env = "NODE_STATUS_PORT", default_value = "8083")]
    node_status_port: u16,

    /// Deadline of a connectivity request in milliseconds
    #[arg(long, env = "PROBE_TIMEOUT_MS", default_value = "10000")]
    probe_timeout_ms: u64,

    /// Prefix of replication parameters and attributes
    #[arg(long, env = "REPLICATION_CONTEXT_PREFIX", default_value = "replication.storage/")]
    replication_context_prefix: String,

    /// Maximum concurrent requests per array, unlimited when unset
    #[arg(long, env = "THROTTLING_RATE_LIMIT")]
    throttling_rate_limit: Option<usize>,

    /// Array API request timeout in seconds
    #[arg(long, env = "ARRAY_API_TIMEOUT", default_value = "120")]
    array_api_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args)?;

    info!("Starting Array Volume Control Plane");
    info!("  Version: {}", array_volume_controlplane::VERSION);
    info!("  REST API: {}", args.api_addr);
    info!("  Array config: {}", args.array_config.display());

    let metrics = ControllerMetrics::new()?;

    // Build the array registry
    let factory = Arc::new(RestClientFactory::new(RestClientConfig {
        timeout: Duration::from_secs(args.array_api_timeout_secs),
        rate_limit: args.throttling_rate_limit,
        ..Default::default()
    }));
    let config_source = Arc::new(ArrayConfigSource::File(args.array_config.clone()));
    let registry = ArrayRegistry::new();
    let count = registry.reload(&config_source, factory.as_ref())?;
    metrics.record_registry_reload("success");
    info!("Array registry initialized with {} arrays", count);

    spawn_event_logger(registry.clone());

    // Wire the control plane
    let codec = VolumeHandleCodec::new(registry.clone());
    let status_client = Arc::new(HttpNodeStatusClient::new(
        args.node_status_port,
        Duration::from_millis(args.probe_timeout_ms),
    )?);
    let probe = ConnectivityProbe::new(
        codec.clone(),
        status_client,
        ProbeConfig {
            timeout: Duration::from_millis(args.probe_timeout_ms),
            ..Default::default()
        },
        metrics.clone(),
    );
    let replication = ReplicationOrchestrator::new(
        codec.clone(),
        ReplicationConfig {
            context_prefix: args.replication_context_prefix.clone(),
            ..Default::default()
        },
        metrics.clone(),
    );

    let state = AppState {
        registry,
        codec,
        probe: Arc::new(probe),
        replication: Arc::new(replication),
        metrics,
        config_source,
        client_factory: factory,
    };

    // Create and run API server
    let api_config = ApiServerConfig {
        rest_addr: args.api_addr.parse().map_err(|e| {
            Error::Configuration(format!("Invalid REST API address: {}", e))
        })?,
    };
    let api_server = Arc::new(ApiServer::new(api_config, state));

    let server = api_server.clone();
    let mut handle = tokio::spawn(async move { server.run().await });

    tokio::select! {
        joined = &mut handle => {
            return joined.map_err(|e| Error::Internal(format!("API server task failed: {}", e)))?;
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received");
            api_server.shutdown();
        }
    }

    handle
        .await
        .map_err(|e| Error::Internal(format!("API server task failed: {}", e)))??;

    info!("Control plane shutdown complete");
    Ok(())
}

// =============================================================================
// Registry Events
// =============================================================================

fn spawn_event_logger(registry: Arc<ArrayRegistry>) {
    let mut events = registry.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(RegistryEvent::Reloaded {
                    array_count,
                    default_array,
                }) => {
                    info!(array_count, default_array = ?default_array, "array registry reloaded");
                }
                Ok(RegistryEvent::DefaultChanged { global_id }) => {
                    info!(global_id = %global_id, "default array changed");
                }
                Ok(RegistryEvent::ReloadFailed { reason }) => {
                    warn!(reason = %reason, "array registry reload failed");
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "registry event logger lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let directive = |d: &str| -> Result<Directive> {
        d.parse()
            .map_err(|e| Error::Configuration(format!("Invalid log directive {}: {}", d, e)))
    };
    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive(directive("hyper=warn")?)
        .add_directive(directive("reqwest=info")?)
        .add_directive(directive("tower=warn")?)
        .add_directive(directive("axum=info")?);

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
    Ok(())
}
