//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `vault_sync_reconciliations_total` - Total number of reconciliations
//! - `vault_sync_reconciliation_errors_total` - Reconciliation errors by error kind
//! - `vault_sync_sync_attempts_total` - Sync attempts by result (success, failed, skipped)
//! - `vault_sync_sync_duration_seconds` - Duration of sync operations
//! - `vault_sync_secrets_discovered` - Secrets discovered per workload
//! - `vault_sync_store_operations_total` - Store operations by operation type
//! - `vault_sync_store_operation_duration_seconds` - Duration of store operations
//! - `vault_sync_store_errors_total` - Store errors by classification
//! - `vault_sync_large_payload_writes_total` - Writes that took the large-payload path
//! - `vault_sync_rate_limit_wait_seconds` - Time spent waiting for a rate-limit token
//! - `vault_sync_secret_not_found_total` - Referenced secrets that did not exist
//! - `vault_sync_secret_key_missing_total` - Requested keys missing from a secret
//! - `vault_sync_config_parse_errors_total` - Annotation parse errors
//! - `vault_sync_duration_parsing_errors_total` - Reconcile interval parse errors
//! - `vault_sync_snapshot_update_errors_total` - Failed version snapshot writes
//! - `vault_sync_auth_attempts_total` - Vault login attempts by result
//! - `vault_sync_requeues_total` - Requeues by trigger (periodic, error-backoff)

use anyhow::Result;
use prometheus::{
    Histogram, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Registry,
};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "vault_sync_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "vault_sync_reconciliation_errors_total",
            "Total number of reconciliation errors by error kind",
        ),
        &["error_type"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static SYNC_ATTEMPTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "vault_sync_sync_attempts_total",
            "Total number of sync attempts by result",
        ),
        &["result"],
    )
    .expect("Failed to create SYNC_ATTEMPTS_TOTAL metric - this should never happen")
});

static SYNC_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "vault_sync_sync_duration_seconds",
            "Duration of sync operations in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )
    .expect("Failed to create SYNC_DURATION metric - this should never happen")
});

static SECRETS_DISCOVERED: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    IntGaugeVec::new(
        prometheus::Opts::new(
            "vault_sync_secrets_discovered",
            "Number of secrets discovered in a workload pod template",
        ),
        &["namespace", "name"],
    )
    .expect("Failed to create SECRETS_DISCOVERED metric - this should never happen")
});

static STORE_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "vault_sync_store_operations_total",
            "Total number of store operations by operation type",
        ),
        &["operation"],
    )
    .expect("Failed to create STORE_OPERATIONS_TOTAL metric - this should never happen")
});

static STORE_OPERATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "vault_sync_store_operation_duration_seconds",
            "Duration of store operations in seconds by operation type",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0]),
        &["operation"],
    )
    .expect("Failed to create STORE_OPERATION_DURATION metric - this should never happen")
});

static STORE_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "vault_sync_store_errors_total",
            "Total number of store errors by classification",
        ),
        &["error_type"],
    )
    .expect("Failed to create STORE_ERRORS_TOTAL metric - this should never happen")
});

static LARGE_PAYLOAD_WRITES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "vault_sync_large_payload_writes_total",
        "Total number of writes above the large payload threshold",
    )
    .expect("Failed to create LARGE_PAYLOAD_WRITES_TOTAL metric - this should never happen")
});

static RATE_LIMIT_WAIT: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "vault_sync_rate_limit_wait_seconds",
            "Time spent waiting for a store rate-limit token in seconds",
        )
        .buckets(vec![0.0, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
    )
    .expect("Failed to create RATE_LIMIT_WAIT metric - this should never happen")
});

static SECRET_NOT_FOUND_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "vault_sync_secret_not_found_total",
            "Total number of referenced secrets that were not found",
        ),
        &["namespace"],
    )
    .expect("Failed to create SECRET_NOT_FOUND_TOTAL metric - this should never happen")
});

static SECRET_KEY_MISSING_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "vault_sync_secret_key_missing_total",
            "Total number of requested keys missing from a secret",
        ),
        &["namespace", "secret"],
    )
    .expect("Failed to create SECRET_KEY_MISSING_TOTAL metric - this should never happen")
});

static CONFIG_PARSE_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "vault_sync_config_parse_errors_total",
            "Total number of annotation parse errors by error type",
        ),
        &["error_type"],
    )
    .expect("Failed to create CONFIG_PARSE_ERRORS_TOTAL metric - this should never happen")
});

pub(crate) static DURATION_PARSING_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "vault_sync_duration_parsing_errors_total",
        "Total number of reconcile interval parsing errors",
    )
    .expect("Failed to create DURATION_PARSING_ERRORS_TOTAL metric - this should never happen")
});

pub(crate) static SNAPSHOT_UPDATE_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "vault_sync_snapshot_update_errors_total",
        "Total number of failed version snapshot annotation updates",
    )
    .expect("Failed to create SNAPSHOT_UPDATE_ERRORS_TOTAL metric - this should never happen")
});

static AUTH_ATTEMPTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "vault_sync_auth_attempts_total",
            "Total number of Vault authentication attempts by result",
        ),
        &["result"],
    )
    .expect("Failed to create AUTH_ATTEMPTS_TOTAL metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "vault_sync_requeues_total",
            "Total number of requeues by trigger",
        ),
        &["trigger"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SYNC_ATTEMPTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SYNC_DURATION.clone()))?;
    REGISTRY.register(Box::new(SECRETS_DISCOVERED.clone()))?;
    REGISTRY.register(Box::new(STORE_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STORE_OPERATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(STORE_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(LARGE_PAYLOAD_WRITES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RATE_LIMIT_WAIT.clone()))?;
    REGISTRY.register(Box::new(SECRET_NOT_FOUND_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SECRET_KEY_MISSING_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CONFIG_PARSE_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DURATION_PARSING_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SNAPSHOT_UPDATE_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(AUTH_ATTEMPTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors(error_type: &str) {
    RECONCILIATION_ERRORS_TOTAL
        .with_label_values(&[error_type])
        .inc();
}

/// `result` is one of `success`, `failed`, `skipped`
pub fn record_sync_attempt(result: &str) {
    SYNC_ATTEMPTS_TOTAL.with_label_values(&[result]).inc();
}

pub fn observe_sync_duration(duration: f64) {
    SYNC_DURATION.observe(duration);
}

pub fn set_secrets_discovered(namespace: &str, name: &str, count: i64) {
    SECRETS_DISCOVERED
        .with_label_values(&[namespace, name])
        .set(count);
}

pub fn record_store_operation(operation: &str, duration: f64) {
    STORE_OPERATIONS_TOTAL.with_label_values(&[operation]).inc();
    STORE_OPERATION_DURATION
        .with_label_values(&[operation])
        .observe(duration);
}

pub fn increment_store_errors(error_type: &str) {
    STORE_ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

pub fn increment_large_payload_writes() {
    LARGE_PAYLOAD_WRITES_TOTAL.inc();
}

pub fn observe_rate_limit_wait(duration: f64) {
    RATE_LIMIT_WAIT.observe(duration);
}

pub fn increment_secret_not_found(namespace: &str) {
    SECRET_NOT_FOUND_TOTAL.with_label_values(&[namespace]).inc();
}

pub fn increment_secret_key_missing(namespace: &str, secret: &str) {
    SECRET_KEY_MISSING_TOTAL
        .with_label_values(&[namespace, secret])
        .inc();
}

pub fn increment_config_parse_errors(error_type: &str) {
    CONFIG_PARSE_ERRORS_TOTAL
        .with_label_values(&[error_type])
        .inc();
}

pub fn increment_duration_parsing_errors() {
    DURATION_PARSING_ERRORS_TOTAL.inc();
}

pub fn increment_snapshot_update_errors() {
    SNAPSHOT_UPDATE_ERRORS_TOTAL.inc();
}

/// `result` is `success` or `failed`
pub fn increment_auth_attempts(result: &str) {
    AUTH_ATTEMPTS_TOTAL.with_label_values(&[result]).inc();
}

/// `trigger` is `periodic` or `error-backoff`
pub fn increment_requeues(trigger: &str) {
    REQUEUES_TOTAL.with_label_values(&[trigger]).inc();
}
