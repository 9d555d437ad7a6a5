//! # Configuration
//!
//! Process-level configuration. Per-target configuration lives in annotations
//! and is parsed by [`crate::target::annotations`].

pub mod controller;

pub use controller::ControllerConfig;
