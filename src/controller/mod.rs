//! # Controller
//!
//! Core sync engine.
//!
//! - `paths`: logical to physical store paths and KV payload shaping
//! - `writer`: rate-limited, batched store writes
//! - `detector`: version snapshot comparison
//! - `planner`: which payloads go to which paths
//! - `reconciler`: lifecycle state machine and the [`reconciler::SyncEngine`]
//! - `backoff`: per-target exponential retry delays
//! - `server`: metrics and health endpoints

pub mod backoff;
pub mod detector;
pub mod paths;
pub mod planner;
pub mod reconciler;
pub mod server;
pub mod writer;
