//! Error types for the sync engine
//!
//! Errors are grouped by where they originate so that logs and metrics can
//! classify them without string matching:
//!
//! - [`ConfigError`] - a malformed annotation on the target
//! - [`PlanError`] - a referenced secret or key is missing
//! - [`StoreError`] - the external secret store rejected or failed an operation
//! - [`ClusterError`] - reading or updating cluster objects failed
//!
//! [`ReconcileError`] is what a reconcile hands back to the work queue.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Malformed per-target configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("target has no vault-sync.io/path annotation")]
    MissingPath,

    #[error("failed to parse secrets annotation {raw:?}: {source}")]
    MalformedSecrets {
        raw: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("secrets annotation {raw:?} must list at least one secret")]
    EmptySecrets { raw: String },

    #[error("secrets annotation entry {index} is invalid: {message} (annotation {raw:?})")]
    InvalidSecretEntry {
        raw: String,
        index: usize,
        message: String,
    },

    #[error("invalid kv-version annotation {raw:?}: expected \"1\", \"2\" or \"auto\"")]
    InvalidKvVersion { raw: String },

    #[error("invalid reconcile interval {raw:?}: {message}")]
    InvalidInterval { raw: String, message: String },
}

impl ConfigError {
    /// Label used by the config parse error counter
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            ConfigError::MissingPath => "missing_path",
            ConfigError::MalformedSecrets { .. } => "json_parse_error",
            ConfigError::EmptySecrets { .. } => "empty_secrets",
            ConfigError::InvalidSecretEntry { .. } => "invalid_secret_entry",
            ConfigError::InvalidKvVersion { .. } => "invalid_kv_version",
            ConfigError::InvalidInterval { .. } => "invalid_interval",
        }
    }
}

/// Failure while resolving what to write
#[derive(Debug, Error)]
pub enum PlanError {
    #[error(
        "failed to get secret {namespace}/{name} (check if secret generators such as kustomize or helm have run)"
    )]
    SecretNotFound { namespace: String, name: String },

    #[error("key {key} not found in secret {secret} (available keys: [{}])", available.join(", "))]
    KeyNotFound {
        secret: String,
        key: String,
        available: Vec<String>,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

/// Store failure buckets, used for observability only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreErrorClass {
    PermissionDenied,
    InvalidPath,
    ConnectionFailed,
    Unknown,
}

impl StoreErrorClass {
    /// Classify an error message by known substrings
    #[must_use]
    pub fn classify(message: &str) -> Self {
        let message = message.to_lowercase();
        let contains_any = |needles: &[&str]| needles.iter().any(|n| message.contains(n));

        if contains_any(&["permission denied", "forbidden", "403"]) {
            StoreErrorClass::PermissionDenied
        } else if contains_any(&["invalid path", "not found", "404"]) {
            StoreErrorClass::InvalidPath
        } else if contains_any(&[
            "connection refused",
            "timeout",
            "timed out",
            "network",
            "error sending request",
        ]) {
            StoreErrorClass::ConnectionFailed
        } else {
            StoreErrorClass::Unknown
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreErrorClass::PermissionDenied => "permission_denied",
            StoreErrorClass::InvalidPath => "invalid_path",
            StoreErrorClass::ConnectionFailed => "connection_failed",
            StoreErrorClass::Unknown => "unknown",
        }
    }
}

impl fmt::Display for StoreErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External secret store failure
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to {operation} secret at path {path}: {message}")]
    Operation {
        operation: &'static str,
        path: String,
        message: String,
        class: StoreErrorClass,
    },

    #[error("store authentication failed: {0}")]
    Auth(String),

    #[error("store health check failed: {0}")]
    Unhealthy(String),
}

impl StoreError {
    /// Build an operation error, classifying the underlying message
    pub fn operation(
        operation: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        StoreError::Operation {
            operation,
            path: path.into(),
            class: StoreErrorClass::classify(&message),
            message,
        }
    }

    #[must_use]
    pub fn class(&self) -> StoreErrorClass {
        match self {
            StoreError::Operation { class, .. } => *class,
            StoreError::Auth(_) => StoreErrorClass::PermissionDenied,
            StoreError::Unhealthy(message) => StoreErrorClass::classify(message),
        }
    }
}

/// Cluster API failure
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    #[error("conflict updating {0}")]
    Conflict(String),
}

/// Error returned from a reconcile to the work queue
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error("reconcile of {target} timed out after {after:?}")]
    Timeout { target: String, after: Duration },
}

impl ReconcileError {
    /// Short label for logs and metrics
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ReconcileError::Plan(PlanError::Config(_)) => "config",
            ReconcileError::Plan(PlanError::Cluster(_)) | ReconcileError::Cluster(_) => "cluster",
            ReconcileError::Plan(_) => "reference",
            ReconcileError::Store(_) => "store",
            ReconcileError::Timeout { .. } => "timeout",
        }
    }
}
