//! # Prelude
//!
//! Commonly used types, importable with `use vault_sync_controller::prelude::*;`.

pub use crate::cluster::{ClusterClient, KubeClusterClient};
pub use crate::config::ControllerConfig;
pub use crate::controller::detector::{SyncDecision, VersionSnapshot};
pub use crate::controller::paths::{KvVersion, PathResolver, StorePath};
pub use crate::controller::planner::{SyncMode, SyncPlan, SyncPlanner};
pub use crate::controller::reconciler::{LifecycleState, SyncEngine};
pub use crate::controller::writer::{BatchOperation, RateLimitedWriter, WriterSettings};
pub use crate::error::{
    ClusterError, ConfigError, PlanError, ReconcileError, StoreError, StoreErrorClass,
};
pub use crate::provider::vault::{VaultClient, VaultSession};
pub use crate::provider::SecretStoreProvider;
pub use crate::target::{SecretData, SecretRef, SyncTarget, TargetKind, TargetRef};
