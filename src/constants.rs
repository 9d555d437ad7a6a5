//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! Annotation keys form the user-facing contract of the controller. Numeric
//! values are defaults and can be overridden through [`crate::config::ControllerConfig`].

/// Logical store path. Presence with a non-empty value enables sync.
pub const PATH_ANNOTATION: &str = "vault-sync.io/path";

/// Explicit secret selection (JSON array of `{name, keys, prefix?}`)
pub const SECRETS_ANNOTATION: &str = "vault-sync.io/secrets";

/// `"true"` keeps the store path when the target is deleted
pub const PRESERVE_ON_DELETE_ANNOTATION: &str = "vault-sync.io/preserve-on-delete";

/// Engine-managed `{secretName: versionToken}` snapshot
pub const SECRET_VERSIONS_ANNOTATION: &str = "vault-sync.io/secret-versions";

/// `"disabled"` forces a sync on every reconcile
pub const ROTATION_CHECK_ANNOTATION: &str = "vault-sync.io/rotation-check";

/// Periodic self-healing interval (`"5m"`, `"off"`)
pub const RECONCILE_ANNOTATION: &str = "vault-sync.io/reconcile";

/// Per-target KV engine layout override (`"1"`, `"2"`, `"auto"`)
pub const KV_VERSION_ANNOTATION: &str = "vault-sync.io/kv-version";

/// Finalizer guarding store cleanup
pub const FINALIZER: &str = "vault-sync.io/finalizer";

/// Field manager used for metadata patches
pub const FIELD_MANAGER: &str = "vault-sync-controller";

/// Value of [`ROTATION_CHECK_ANNOTATION`] that bypasses change detection
pub const ROTATION_CHECK_DISABLED: &str = "disabled";

/// Value of [`RECONCILE_ANNOTATION`] that disables periodic reconciliation
pub const RECONCILE_OFF: &str = "off";

/// Prefix applied to physical paths when a cluster tag is configured
pub const CLUSTER_PATH_PREFIX: &str = "clusters";

/// Default HTTP server port for metrics and health endpoints
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default Vault address
pub const DEFAULT_VAULT_ADDR: &str = "http://vault:8200";

/// Default Vault Kubernetes auth role
pub const DEFAULT_VAULT_ROLE: &str = "vault-sync-operator";

/// Default Vault Kubernetes auth mount path
pub const DEFAULT_VAULT_AUTH_PATH: &str = "kubernetes";

/// Service account token presented to the Vault Kubernetes auth method
pub const DEFAULT_SERVICE_ACCOUNT_TOKEN_PATH: &str =
    "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Store admission rate (operations per second)
pub const DEFAULT_STORE_RATE_LIMIT_PER_SEC: f64 = 10.0;

/// Store admission burst
pub const DEFAULT_STORE_RATE_LIMIT_BURST: u32 = 20;

/// Operations per batch chunk
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Pause between batch chunks (milliseconds)
pub const DEFAULT_BATCH_PAUSE_MS: u64 = 100;

/// Payloads above this many bytes (keys + values) take the large-payload path
pub const DEFAULT_LARGE_PAYLOAD_BYTES: usize = 1024 * 1024;

/// Minimum periodic reconcile interval (seconds)
pub const MIN_RECONCILE_INTERVAL_SECS: u64 = 30;

/// Upper bound for a single reconcile (seconds)
pub const DEFAULT_RECONCILE_TIMEOUT_SECS: u64 = 60;

/// Store health and readiness check timeout (seconds)
pub const STORE_CHECK_TIMEOUT_SECS: u64 = 5;

/// Default exponential backoff starting value (milliseconds)
pub const DEFAULT_BACKOFF_START_MS: u64 = 1000;

/// Default exponential backoff maximum value (milliseconds)
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 300_000;
