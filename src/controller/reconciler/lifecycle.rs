//! # Lifecycle
//!
//! Finalizer state machine over a [`SyncTarget`], with one handler per state.
//!
//! Metadata mutations (finalizer, snapshot annotation) and store mutations are
//! never combined in one step. A crash between steps leaves a state the next
//! reconcile resumes from.

use super::{interval, SyncEngine};
use crate::constants::{FINALIZER, SECRET_VERSIONS_ANNOTATION};
use crate::controller::detector::{decide, SyncDecision, VersionSnapshot};
use crate::controller::paths::StorePath;
use crate::controller::planner::{SyncMode, SyncPlan};
use crate::controller::writer::BatchOperation;
use crate::error::ReconcileError;
use crate::observability::metrics;
use crate::target::{SyncTarget, TargetKind};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Where a target sits in its sync lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No logical path annotation
    Disabled { finalizer_present: bool },
    /// Sync enabled, finalizer not yet added
    ActiveUnprotected,
    /// Sync enabled and guarded by the finalizer
    ActiveProtected,
    /// Being deleted, store path must be removed
    DeletingCleanup,
    /// Being deleted, store path is preserved
    DeletingCleanupSkipped,
    /// Being deleted without our finalizer
    Detached,
}

impl LifecycleState {
    #[must_use]
    pub fn of(target: &SyncTarget) -> Self {
        let finalizer_present = target.has_finalizer(FINALIZER);
        let annotations = target.annotations();

        if target.deleting {
            return match (finalizer_present, annotations.preserve_on_delete()) {
                (false, _) => LifecycleState::Detached,
                (true, true) => LifecycleState::DeletingCleanupSkipped,
                (true, false) => LifecycleState::DeletingCleanup,
            };
        }

        match (annotations.logical_path().is_some(), finalizer_present) {
            (false, finalizer_present) => LifecycleState::Disabled { finalizer_present },
            (true, false) => LifecycleState::ActiveUnprotected,
            (true, true) => LifecycleState::ActiveProtected,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LifecycleState::Disabled { .. } => "disabled",
            LifecycleState::ActiveUnprotected => "active-unprotected",
            LifecycleState::ActiveProtected => "active-protected",
            LifecycleState::DeletingCleanup => "deleting-cleanup",
            LifecycleState::DeletingCleanupSkipped => "deleting-cleanup-skipped",
            LifecycleState::Detached => "detached",
        })
    }
}

impl SyncEngine {
    pub(super) async fn handle_state(
        &self,
        state: LifecycleState,
        target: &SyncTarget,
    ) -> Result<Option<Duration>, ReconcileError> {
        match state {
            LifecycleState::Disabled { finalizer_present } => {
                self.handle_disabled(target, finalizer_present).await?;
                Ok(None)
            }
            LifecycleState::ActiveUnprotected => {
                self.handle_unprotected(target).await?;
                Ok(None)
            }
            LifecycleState::ActiveProtected => self.handle_protected(target).await,
            LifecycleState::DeletingCleanup => {
                self.handle_cleanup(target).await?;
                Ok(None)
            }
            LifecycleState::DeletingCleanupSkipped => {
                self.handle_cleanup_skipped(target).await?;
                Ok(None)
            }
            LifecycleState::Detached => {
                debug!(target_ref = %target.id, "Target deleting without finalizer, nothing to do");
                Ok(None)
            }
        }
    }

    async fn handle_disabled(&self, target: &SyncTarget, finalizer_present: bool) -> Result<(), ReconcileError> {
        if !finalizer_present {
            debug!(target_ref = %target.id, "Sync not enabled");
            return Ok(());
        }
        info!(target_ref = %target.id, "Sync annotation removed, dropping finalizer");
        self.remove_finalizer(target).await
    }

    async fn handle_unprotected(&self, target: &SyncTarget) -> Result<(), ReconcileError> {
        info!(target_ref = %target.id, "Adding finalizer");
        self.cluster
            .set_finalizers(&target.id, target.finalizers_with(FINALIZER))
            .await
            .inspect_err(|e| {
                error!(target_ref = %target.id, error = %e, "Failed to add finalizer");
            })?;
        Ok(())
    }

    async fn handle_protected(&self, target: &SyncTarget) -> Result<Option<Duration>, ReconcileError> {
        let start = Instant::now();
        let annotations = target.annotations();

        let plan = match self.planner.plan(target).await {
            Ok(plan) => plan,
            Err(e) => {
                metrics::record_sync_attempt("failed");
                return Err(e.into());
            }
        };

        let last = VersionSnapshot::parse_or_empty(
            annotations.version_snapshot_raw(),
            &target.id.to_string(),
        );

        match decide(&last, &plan.versions, annotations.rotation_check_disabled()) {
            SyncDecision::Skip => {
                metrics::record_sync_attempt("skipped");
                info!(
                    target_ref = %target.id,
                    path = %plan.base_path,
                    "No secret changes detected, skipping sync"
                );
            }
            SyncDecision::Sync { reason, changed } => {
                info!(
                    target_ref = %target.id,
                    path = %plan.base_path,
                    mode = %plan.mode,
                    reason = %reason,
                    changed = ?changed,
                    "Syncing secrets to store"
                );
                if let Err(e) = self.write_plan(&plan).await {
                    metrics::record_sync_attempt("failed");
                    return Err(e.into());
                }
                metrics::record_sync_attempt("success");
                metrics::observe_sync_duration(start.elapsed().as_secs_f64());
                info!(
                    target_ref = %target.id,
                    path = %plan.base_path,
                    writes = plan.writes.len(),
                    keys = plan.key_count(),
                    "✅ Synced secrets to store ({:.2}s)",
                    start.elapsed().as_secs_f64()
                );
            }
        }

        self.persist_snapshot(target, &last, &plan.versions).await;

        let requeue = interval::effective_interval(
            annotations.reconcile_interval_raw(),
            self.min_interval,
            &target.id.to_string(),
        );
        if let Some(delay) = requeue {
            metrics::increment_requeues("periodic");
            info!(
                target_ref = %target.id,
                "📅 Next scheduled reconciliation: {} (in {}s, trigger source: periodic)",
                interval::scheduled_at_display(delay),
                delay.as_secs()
            );
        }
        Ok(requeue)
    }

    async fn handle_cleanup(&self, target: &SyncTarget) -> Result<(), ReconcileError> {
        match self.cleanup_paths(target) {
            Some(paths) if paths.len() == 1 => {
                info!(target_ref = %target.id, path = %paths[0], "Deleting store path");
                self.writer.delete(&paths[0]).await?;
            }
            Some(paths) => {
                info!(target_ref = %target.id, paths = paths.len(), "Deleting store paths");
                let ops: Vec<BatchOperation> =
                    paths.into_iter().map(|path| BatchOperation::Delete { path }).collect();
                self.writer.batch_write(&ops).await?;
            }
            None => {
                warn!(target_ref = %target.id, "No store path recorded on target, nothing to delete");
            }
        }

        self.remove_finalizer(target).await
    }

    async fn handle_cleanup_skipped(&self, target: &SyncTarget) -> Result<(), ReconcileError> {
        info!(
            target_ref = %target.id,
            "preserve-on-delete is set, keeping store data"
        );
        self.remove_finalizer(target).await
    }

    async fn remove_finalizer(&self, target: &SyncTarget) -> Result<(), ReconcileError> {
        self.cluster
            .set_finalizers(&target.id, target.finalizers_without(FINALIZER))
            .await
            .inspect_err(|e| {
                error!(target_ref = %target.id, error = %e, "Failed to remove finalizer");
            })?;
        info!(target_ref = %target.id, "Removed finalizer");
        Ok(())
    }

    /// Store paths owned by a target, `None` without a path annotation
    ///
    /// Auto-discovery owns one sub-path per secret recorded in the last snapshot
    /// besides the base path. Sub-paths of secrets the pod template stopped
    /// referencing before the last sync are not tracked and stay in the store.
    fn cleanup_paths(&self, target: &SyncTarget) -> Option<Vec<StorePath>> {
        let annotations = target.annotations();
        let logical = annotations.logical_path()?;
        // A bad KV override must not pin the finalizer, deletes fall back to Auto
        let kv = annotations.kv_version().unwrap_or_else(|e| {
            metrics::increment_config_parse_errors(e.error_type());
            warn!(
                target_ref = %target.id,
                error = %e,
                "Ignoring invalid KV version override during cleanup"
            );
            None
        });
        let resolver = self.planner.resolver();
        let base = resolver.resolve(logical, kv);

        let auto_discovery =
            target.id.kind != TargetKind::Secret && annotations.secrets_config_raw().is_none();
        if !auto_discovery {
            return Some(vec![base]);
        }

        let snapshot = VersionSnapshot::parse_or_empty(
            annotations.version_snapshot_raw(),
            &target.id.to_string(),
        );
        let mut paths: Vec<StorePath> = snapshot
            .iter()
            .map(|(name, _)| resolver.resolve(&format!("{}/{name}", base.logical()), kv))
            .collect();
        paths.push(base);
        Some(paths)
    }

    async fn write_plan(&self, plan: &SyncPlan) -> Result<(), crate::error::StoreError> {
        match plan.mode {
            SyncMode::AutoDiscovery => {
                let ops: Vec<BatchOperation> = plan
                    .writes
                    .iter()
                    .map(|w| BatchOperation::Write {
                        path: w.path.clone(),
                        data: w.data.clone(),
                    })
                    .collect();
                self.writer.batch_write(&ops).await
            }
            SyncMode::Explicit | SyncMode::StandaloneSecret => {
                for write in &plan.writes {
                    self.writer.write(&write.path, &write.data).await?;
                }
                Ok(())
            }
        }
    }

    /// Store the snapshot when it changed. Failures are logged and counted only.
    async fn persist_snapshot(
        &self,
        target: &SyncTarget,
        last: &VersionSnapshot,
        current: &VersionSnapshot,
    ) {
        if last == current {
            return;
        }

        let json = match current.to_json() {
            Ok(json) => json,
            Err(e) => {
                metrics::increment_snapshot_update_errors();
                warn!(target_ref = %target.id, error = %e, "Failed to encode secret versions");
                return;
            }
        };

        if let Err(e) = self
            .cluster
            .set_annotation(&target.id, SECRET_VERSIONS_ANNOTATION, &json)
            .await
        {
            metrics::increment_snapshot_update_errors();
            warn!(
                target_ref = %target.id,
                error = %e,
                "Failed to update secret versions annotation, next reconcile will resync"
            );
        } else {
            debug!(target_ref = %target.id, versions = %json, "Updated secret versions annotation");
        }
    }
}
