//! # Observability
//!
//! - `metrics`: Prometheus metrics collection
//!
//! Logging goes through `tracing`; the subscriber is installed in `main.rs`.

pub mod metrics;
