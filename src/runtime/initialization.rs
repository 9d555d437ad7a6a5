//! # Initialization
//!
//! Process start-up: rustls, tracing, metrics, the Vault client, the health
//! server, the Kubernetes client and the sync engine.

use crate::cluster::KubeClusterClient;
use crate::config::ControllerConfig;
use crate::controller::reconciler::SyncEngine;
use crate::controller::server::{start_server, ServerState};
use crate::controller::writer::{RateLimitedWriter, WriterSettings};
use crate::observability;
use crate::provider::vault::VaultClient;
use crate::provider::SecretStoreProvider;
use crate::runtime::error_policy::ControllerContext;
use crate::runtime::watch_loop::WatchedKinds;
use anyhow::{Context, Result};
use kube::Client;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Everything the watch loop needs
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    /// Shared reconcile context
    pub context: Arc<ControllerContext>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
    /// Kinds to watch
    pub kinds: WatchedKinds,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_state", &self.server_state)
            .field("kinds", &self.kinds)
            .finish_non_exhaustive()
    }
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` controls filtering (default `vault_sync_controller=info`);
/// `log_format` selects `json` or human-readable output.
pub fn init_tracing(log_format: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("vault_sync_controller=info"));

    let result = if log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };

    if let Err(e) = result {
        eprintln!("Tracing subscriber already initialized: {e}");
    }
}

/// Initialize the controller runtime
///
/// # Errors
///
/// Fails when metrics cannot be registered, the Vault or Kubernetes client
/// cannot be built, or no target kind is enabled.
pub async fn initialize(config: ControllerConfig) -> Result<InitializationResult> {
    // rustls 0.23 needs a process-wide crypto provider before any TLS client is built
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("rustls crypto provider already installed");
    }

    init_tracing(&config.log_format);

    info!("Starting Vault Sync Controller v{}", env!("CARGO_PKG_VERSION"));
    info!(
        vault_addr = %config.vault_addr,
        cluster_name = %config.cluster_name,
        kv_version = %config.kv_version,
        "Loaded configuration"
    );

    observability::metrics::register_metrics()?;

    let vault = Arc::new(VaultClient::from_config(&config).context("Failed to create Vault client")?);

    // Eager login surfaces auth misconfiguration at start-up; reconciles retry lazily
    match vault.session().token().await {
        Ok(_) => info!("Initial Vault authentication succeeded"),
        Err(e) => warn!("Initial Vault authentication failed, will retry on first sync: {}", e),
    }

    let store: Arc<dyn SecretStoreProvider> = vault;
    let server_state = Arc::new(ServerState::new(Arc::clone(&store)));

    let server_port = config.metrics_port;
    let server_state_for_server = Arc::clone(&server_state);
    tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_for_server).await {
            error!("HTTP server error: {}", e);
        }
    });

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let cluster = Arc::new(KubeClusterClient::new(client.clone()));

    let writer = Arc::new(RateLimitedWriter::new(store, WriterSettings::from_config(&config)));
    let engine = Arc::new(SyncEngine::from_config(cluster, writer, &config));
    let context = Arc::new(ControllerContext::new(
        engine,
        config.backoff_start(),
        config.backoff_max(),
    ));

    let kinds = WatchedKinds {
        deployments: config.watch_deployments,
        statefulsets: config.watch_statefulsets,
        daemonsets: config.watch_daemonsets,
        secrets: config.watch_secrets,
    };

    server_state.set_ready(true);
    info!("Controller initialized, starting watch loop...");

    Ok(InitializationResult {
        client,
        context,
        server_state,
        kinds,
    })
}
