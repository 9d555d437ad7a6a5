//! # Reconciler
//!
//! [`SyncEngine`] ties the planner, change detector and writer together behind
//! a single entry point: `reconcile(target) -> requeue delay`.
//!
//! - `lifecycle`: finalizer state machine and per-state handlers
//! - `interval`: periodic requeue parsing with the minimum interval

pub mod interval;
pub mod lifecycle;

pub use lifecycle::LifecycleState;

use crate::cluster::ClusterClient;
use crate::config::ControllerConfig;
use crate::controller::paths::PathResolver;
use crate::controller::planner::SyncPlanner;
use crate::controller::writer::RateLimitedWriter;
use crate::error::ReconcileError;
use crate::observability::metrics;
use crate::target::TargetRef;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info_span, Instrument};

/// Engine shared by every watched kind
pub struct SyncEngine {
    cluster: Arc<dyn ClusterClient>,
    planner: SyncPlanner,
    writer: Arc<RateLimitedWriter>,
    min_interval: Duration,
    timeout: Duration,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("planner", &self.planner)
            .field("writer", &self.writer)
            .field("min_interval", &self.min_interval)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        writer: Arc<RateLimitedWriter>,
        resolver: PathResolver,
        min_interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            planner: SyncPlanner::new(Arc::clone(&cluster), resolver),
            cluster,
            writer,
            min_interval,
            timeout,
        }
    }

    pub fn from_config(
        cluster: Arc<dyn ClusterClient>,
        writer: Arc<RateLimitedWriter>,
        config: &ControllerConfig,
    ) -> Self {
        Self::new(
            cluster,
            writer,
            PathResolver::new(config.cluster_name.clone(), config.kv_version),
            config.min_reconcile_interval(),
            config.reconcile_timeout(),
        )
    }

    /// Reconcile one target
    ///
    /// Returns the periodic requeue delay, if the target asks for one.
    ///
    /// # Errors
    ///
    /// Any [`ReconcileError`]; the caller requeues with backoff.
    pub async fn reconcile(&self, id: &TargetRef) -> Result<Option<Duration>, ReconcileError> {
        let span = info_span!(
            "reconcile",
            kind = %id.kind,
            namespace = %id.namespace,
            name = %id.name
        );
        async move {
            metrics::increment_reconciliations();
            let result = self.reconcile_target(id).await;
            if let Err(e) = &result {
                metrics::increment_reconciliation_errors(e.kind());
                error!(target_ref = %id, error_type = e.kind(), error = %e, "❌ Reconciliation failed");
            }
            result
        }
        .instrument(span)
        .await
    }

    /// [`Self::reconcile`] bounded by the configured timeout
    ///
    /// Dropping the reconcile future cancels a pending rate-limit wait or batch pause.
    ///
    /// # Errors
    ///
    /// [`ReconcileError::Timeout`] when the deadline passes first.
    pub async fn reconcile_with_timeout(&self, id: &TargetRef) -> Result<Option<Duration>, ReconcileError> {
        match tokio::time::timeout(self.timeout, self.reconcile(id)).await {
            Ok(result) => result,
            Err(_elapsed) => {
                let err = ReconcileError::Timeout {
                    target: id.to_string(),
                    after: self.timeout,
                };
                metrics::increment_reconciliation_errors(err.kind());
                error!(target_ref = %id, timeout = ?self.timeout, "❌ Reconciliation timed out");
                Err(err)
            }
        }
    }

    async fn reconcile_target(&self, id: &TargetRef) -> Result<Option<Duration>, ReconcileError> {
        let Some(target) = self.cluster.get_target(id).await? else {
            debug!(target_ref = %id, "Target no longer exists");
            return Ok(None);
        };

        let state = LifecycleState::of(&target);
        debug!(target_ref = %id, state = %state, "Reconciling");
        self.handle_state(state, &target).await
    }
}
