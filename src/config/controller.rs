//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use crate::controller::paths::KvVersion;
use std::time::Duration;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Command-line flags (see `main.rs`) take precedence over the environment.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Vault server address
    pub vault_addr: String,
    /// Vault Kubernetes auth role
    pub vault_role: String,
    /// Vault Kubernetes auth mount path (without the `auth/` prefix)
    pub vault_auth_path: String,
    /// Service account JWT presented at login
    pub vault_token_path: String,
    /// Optional cluster tag; physical paths become `clusters/<tag>/<logical>`
    pub cluster_name: String,
    /// Store-wide KV engine layout, overridable per target
    pub kv_version: KvVersion,
    /// HTTP port for `/metrics`, `/healthz` and `/readyz`
    pub metrics_port: u16,
    /// Token bucket refill rate (operations per second)
    pub store_rate_limit_per_sec: f64,
    /// Token bucket capacity
    pub store_rate_limit_burst: u32,
    /// Operations per batch chunk
    pub batch_size: usize,
    /// Pause between batch chunks (milliseconds)
    pub batch_pause_ms: u64,
    /// Threshold above which a payload takes the large-payload path
    pub large_payload_bytes: usize,
    /// Minimum periodic reconcile interval (seconds)
    pub min_reconcile_interval_secs: u64,
    /// Upper bound for a single reconcile (seconds)
    pub reconcile_timeout_secs: u64,
    /// Exponential backoff starting value (milliseconds)
    pub backoff_start_ms: u64,
    /// Exponential backoff maximum value (milliseconds)
    pub backoff_max_ms: u64,
    /// Watch Deployments
    pub watch_deployments: bool,
    /// Watch StatefulSets
    pub watch_statefulsets: bool,
    /// Watch DaemonSets
    pub watch_daemonsets: bool,
    /// Watch standalone Secrets
    pub watch_secrets: bool,
    /// Log format (json, text)
    pub log_format: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            vault_addr: DEFAULT_VAULT_ADDR.to_string(),
            vault_role: DEFAULT_VAULT_ROLE.to_string(),
            vault_auth_path: DEFAULT_VAULT_AUTH_PATH.to_string(),
            vault_token_path: DEFAULT_SERVICE_ACCOUNT_TOKEN_PATH.to_string(),
            cluster_name: String::new(),
            kv_version: KvVersion::Auto,
            metrics_port: DEFAULT_METRICS_PORT,
            store_rate_limit_per_sec: DEFAULT_STORE_RATE_LIMIT_PER_SEC,
            store_rate_limit_burst: DEFAULT_STORE_RATE_LIMIT_BURST,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_pause_ms: DEFAULT_BATCH_PAUSE_MS,
            large_payload_bytes: DEFAULT_LARGE_PAYLOAD_BYTES,
            min_reconcile_interval_secs: MIN_RECONCILE_INTERVAL_SECS,
            reconcile_timeout_secs: DEFAULT_RECONCILE_TIMEOUT_SECS,
            backoff_start_ms: DEFAULT_BACKOFF_START_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            watch_deployments: true,
            watch_statefulsets: true,
            watch_daemonsets: true,
            watch_secrets: true,
            log_format: "text".to_string(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        use crate::constants::*;
        Self {
            vault_addr: env_var_or_default_str("VAULT_ADDR", DEFAULT_VAULT_ADDR),
            vault_role: env_var_or_default_str("VAULT_ROLE", DEFAULT_VAULT_ROLE),
            vault_auth_path: env_var_or_default_str("VAULT_AUTH_PATH", DEFAULT_VAULT_AUTH_PATH),
            vault_token_path: env_var_or_default_str(
                "VAULT_TOKEN_PATH",
                DEFAULT_SERVICE_ACCOUNT_TOKEN_PATH,
            ),
            cluster_name: env_var_or_default_str("CLUSTER_NAME", ""),
            kv_version: env_var_or_default("KV_VERSION", KvVersion::Auto),
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            store_rate_limit_per_sec: env_var_or_default(
                "STORE_RATE_LIMIT_PER_SEC",
                DEFAULT_STORE_RATE_LIMIT_PER_SEC,
            ),
            store_rate_limit_burst: env_var_or_default(
                "STORE_RATE_LIMIT_BURST",
                DEFAULT_STORE_RATE_LIMIT_BURST,
            ),
            batch_size: env_var_or_default("BATCH_SIZE", DEFAULT_BATCH_SIZE),
            batch_pause_ms: env_var_or_default("BATCH_PAUSE_MS", DEFAULT_BATCH_PAUSE_MS),
            large_payload_bytes: env_var_or_default(
                "LARGE_PAYLOAD_BYTES",
                DEFAULT_LARGE_PAYLOAD_BYTES,
            ),
            min_reconcile_interval_secs: env_var_or_default(
                "MIN_RECONCILE_INTERVAL_SECS",
                MIN_RECONCILE_INTERVAL_SECS,
            ),
            reconcile_timeout_secs: env_var_or_default(
                "RECONCILE_TIMEOUT_SECS",
                DEFAULT_RECONCILE_TIMEOUT_SECS,
            ),
            backoff_start_ms: env_var_or_default("BACKOFF_START_MS", DEFAULT_BACKOFF_START_MS),
            backoff_max_ms: env_var_or_default("BACKOFF_MAX_MS", DEFAULT_BACKOFF_MAX_MS),
            watch_deployments: env_var_or_default_bool("WATCH_DEPLOYMENTS", true),
            watch_statefulsets: env_var_or_default_bool("WATCH_STATEFULSETS", true),
            watch_daemonsets: env_var_or_default_bool("WATCH_DAEMONSETS", true),
            watch_secrets: env_var_or_default_bool("WATCH_SECRETS", true),
            log_format: env_var_or_default_str("LOG_FORMAT", "text"),
        }
    }

    /// Get minimum reconcile interval duration
    pub fn min_reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.min_reconcile_interval_secs)
    }

    /// Get reconcile timeout duration
    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_secs)
    }

    /// Get pause between batch chunks
    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }

    /// Get backoff start duration
    pub fn backoff_start(&self) -> Duration {
        Duration::from_millis(self.backoff_start_ms)
    }

    /// Get backoff max duration
    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as boolean or return default
fn env_var_or_default_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| {
            let v_lower = v.to_lowercase();
            v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
        })
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
