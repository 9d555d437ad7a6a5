//! # Cluster Access
//!
//! The engine reads targets and secrets, and updates target metadata, through
//! [`ClusterClient`]. [`KubeClusterClient`] is the `kube` implementation; tests
//! substitute an in-memory one.
//!
//! Metadata updates are narrow on purpose: one call touches either the
//! finalizer list or a single annotation, never both, and never the spec.

pub mod kubernetes;

pub use kubernetes::KubeClusterClient;

use crate::error::ClusterError;
use crate::target::{SecretRef, SyncTarget, TargetRef};
use async_trait::async_trait;

#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Load a target, `None` when it no longer exists
    async fn get_target(&self, id: &TargetRef) -> Result<Option<SyncTarget>, ClusterError>;

    /// Load a secret, `None` when it does not exist
    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<SecretRef>, ClusterError>;

    /// Replace the target's finalizer list
    async fn set_finalizers(
        &self,
        id: &TargetRef,
        finalizers: Vec<String>,
    ) -> Result<(), ClusterError>;

    /// Set a single annotation on the target
    async fn set_annotation(
        &self,
        id: &TargetRef,
        key: &str,
        value: &str,
    ) -> Result<(), ClusterError>;
}
