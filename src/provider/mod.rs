//! # Provider Modules
//!
//! The engine talks to the external secret store through [`SecretStoreProvider`].
//! Rate limiting, batching and error accounting are layered on top by
//! [`crate::controller::writer::RateLimitedWriter`]; a provider only moves bytes.
//!
//! - `vault`: HashiCorp Vault over its HTTP API with Kubernetes auth

use crate::error::StoreError;
use async_trait::async_trait;
use serde_json::Value;

/// Provider trait for external secret stores
#[async_trait]
pub trait SecretStoreProvider: Send + Sync {
    /// Write an already-shaped payload to a physical path
    async fn write_secret(&self, path: &str, payload: &Value) -> Result<(), StoreError>;

    /// Delete whatever lives at a physical path
    async fn delete_secret(&self, path: &str) -> Result<(), StoreError>;

    /// Store reachability (liveness)
    async fn health_check(&self) -> Result<(), StoreError>;

    /// Reachability plus a usable credential (readiness)
    async fn readiness_check(&self) -> Result<(), StoreError>;
}

pub mod vault;
