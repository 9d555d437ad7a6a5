//! # Runtime
//!
//! Wiring between the sync engine and `kube-runtime`.
//!
//! - `initialization`: start-up of clients, server and engine
//! - `watch_loop`: one controller per watched kind
//! - `error_policy`: success and failure requeue decisions

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;

use crate::config::ControllerConfig;
use anyhow::Result;

/// Initialize and run the controller until shutdown
///
/// # Errors
///
/// Propagates initialization and watch loop failures.
pub async fn run(config: ControllerConfig) -> Result<()> {
    let init = initialization::initialize(config).await?;
    watch_loop::run_watch_loop(init.client, init.kinds, init.context, init.server_state).await
}
