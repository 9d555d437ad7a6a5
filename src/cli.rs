//! # Command Line
//!
//! Flags for the controller binary. Every flag is optional and, when given,
//! overrides the value loaded from the environment.
//!
//! ```bash
//! vault-sync-controller --vault-addr https://vault.internal:8200 --cluster-name prod-eu
//! ```

use crate::config::ControllerConfig;
use crate::controller::paths::KvVersion;
use clap::Parser;

/// Sync annotated Kubernetes secrets into HashiCorp Vault
#[derive(Debug, Parser)]
#[command(name = "vault-sync-controller", version, about, long_about = None)]
pub struct Cli {
    /// Vault server address (env: VAULT_ADDR)
    #[arg(long, value_name = "URL")]
    pub vault_addr: Option<String>,

    /// Vault Kubernetes auth role (env: VAULT_ROLE)
    #[arg(long, value_name = "ROLE")]
    pub vault_role: Option<String>,

    /// Vault Kubernetes auth mount path (env: VAULT_AUTH_PATH)
    #[arg(long, value_name = "PATH")]
    pub vault_auth_path: Option<String>,

    /// Cluster tag; store paths become clusters/<tag>/<path> (env: CLUSTER_NAME)
    #[arg(long, value_name = "NAME")]
    pub cluster_name: Option<String>,

    /// KV engine layout: auto, 1 or 2 (env: KV_VERSION)
    #[arg(long, value_name = "VERSION")]
    pub kv_version: Option<KvVersion>,

    /// Port for /metrics, /healthz and /readyz (env: METRICS_PORT)
    #[arg(long, value_name = "PORT")]
    pub metrics_port: Option<u16>,
}

impl Cli {
    /// Overlay the flags that were given on top of `config`
    pub fn apply(self, config: &mut ControllerConfig) {
        if let Some(addr) = self.vault_addr {
            config.vault_addr = addr;
        }
        if let Some(role) = self.vault_role {
            config.vault_role = role;
        }
        if let Some(path) = self.vault_auth_path {
            config.vault_auth_path = path;
        }
        if let Some(name) = self.cluster_name {
            config.cluster_name = name;
        }
        if let Some(kv) = self.kv_version {
            config.kv_version = kv;
        }
        if let Some(port) = self.metrics_port {
            config.metrics_port = port;
        }
    }
}
