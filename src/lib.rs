//! # Vault Sync Controller
//!
//! Annotation-driven sync of Kubernetes secrets into HashiCorp Vault.
//!
//! A target (Deployment, StatefulSet, DaemonSet or Secret) opts in with
//! `vault-sync.io/path`. Each reconcile plans the payloads, skips the write
//! when no referenced secret changed, writes through a rate-limited writer and
//! records the observed secret versions back on the target.
//!
//! ## Modules
//!
//! - [`target`]: cluster-agnostic target and secret views
//! - [`controller`]: path resolver, writer, change detector, planner and lifecycle
//! - [`cluster`]: Kubernetes access behind [`cluster::ClusterClient`]
//! - [`provider`]: secret stores behind [`provider::SecretStoreProvider`]
//! - [`runtime`]: `kube-runtime` controllers and start-up
//! - [`observability`]: Prometheus metrics

pub mod cli;
pub mod cluster;
pub mod config;
pub mod constants;
pub mod controller;
pub mod error;
pub mod observability;
pub mod prelude;
pub mod provider;
pub mod runtime;
pub mod target;
