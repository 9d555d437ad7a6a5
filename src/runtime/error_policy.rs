//! # Error Policy
//!
//! Requeue decisions for reconcile outcomes. Failed reconciles retry with a
//! per-target exponential backoff; a success resets that target's backoff.

use crate::controller::backoff::BackoffState;
use crate::controller::reconciler::interval;
use crate::controller::reconciler::SyncEngine;
use crate::error::ReconcileError;
use crate::observability::metrics;
use crate::target::TargetRef;
use kube_runtime::controller::Action;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

/// Delay used when the backoff table cannot be locked
const FALLBACK_RETRY: Duration = Duration::from_secs(60);

/// Shared context handed to every watched kind's controller
pub struct ControllerContext {
    pub engine: Arc<SyncEngine>,
    backoff_states: Mutex<HashMap<String, BackoffState>>,
    backoff_start: Duration,
    backoff_max: Duration,
}

impl std::fmt::Debug for ControllerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerContext")
            .field("engine", &self.engine)
            .field("backoff_start", &self.backoff_start)
            .field("backoff_max", &self.backoff_max)
            .finish_non_exhaustive()
    }
}

impl ControllerContext {
    pub fn new(engine: Arc<SyncEngine>, backoff_start: Duration, backoff_max: Duration) -> Self {
        Self {
            engine,
            backoff_states: Mutex::new(HashMap::new()),
            backoff_start,
            backoff_max,
        }
    }

    /// Advance the target's backoff and return `(delay, error_count)`
    pub fn next_retry(&self, id: &TargetRef) -> (Duration, u32) {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states
                    .entry(id.to_string())
                    .or_insert_with(|| BackoffState::new(self.backoff_start, self.backoff_max));
                state.increment_error();
                (state.backoff.next_backoff(), state.error_count)
            }
            Err(e) => {
                warn!("Failed to lock backoff states: {}, using default backoff", e);
                (FALLBACK_RETRY, 0)
            }
        }
    }

    /// Forget the target's failures. Returns whether it was backing off.
    pub fn reset_backoff(&self, id: &TargetRef) -> bool {
        self.backoff_states
            .lock()
            .ok()
            .and_then(|mut states| states.remove(&id.to_string()))
            .is_some_and(|state| state.error_count > 0)
    }
}

/// Map a successful reconcile to an [`Action`]
pub fn handle_reconciliation_success(
    id: &TargetRef,
    requeue: Option<Duration>,
    ctx: &ControllerContext,
) -> Action {
    if ctx.reset_backoff(id) {
        info!(target_ref = %id, "🔄 Backoff reset after successful reconciliation");
    }
    match requeue {
        Some(delay) => Action::requeue(delay),
        None => Action::await_change(),
    }
}

/// Map a failed reconcile to a backoff requeue
pub fn handle_reconciliation_error(
    id: &TargetRef,
    error: &ReconcileError,
    ctx: &ControllerContext,
) -> Action {
    let (delay, error_count) = ctx.next_retry(id);

    info!(
        target_ref = %id,
        error_type = error.kind(),
        "🔄 Retrying with exponential backoff: {}s (error count: {}, trigger source: error-backoff)",
        delay.as_secs(),
        error_count
    );
    info!(
        target_ref = %id,
        "📅 Next retry scheduled: {} (in {}s, trigger source: error-backoff)",
        interval::scheduled_at_display(delay),
        delay.as_secs()
    );

    metrics::increment_requeues("error-backoff");
    Action::requeue(delay)
}
