//! # Vault Sync Controller
//!
//! Watches Deployments, StatefulSets, DaemonSets and Secrets carrying
//! `vault-sync.io/*` annotations and mirrors the referenced Kubernetes secrets
//! into HashiCorp Vault.
//!
//! Configuration comes from the environment (see [`ControllerConfig::from_env`])
//! with command-line flags taking precedence.

use anyhow::Result;
use clap::Parser;
use vault_sync_controller::cli::Cli;
use vault_sync_controller::config::ControllerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = ControllerConfig::from_env();
    cli.apply(&mut config);

    vault_sync_controller::runtime::run(config).await
}
