//! Common test utilities for engine integration tests
//!
//! In-memory implementations of the cluster and store seams plus builders for
//! targets and secrets.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use vault_sync_controller::cluster::ClusterClient;
use vault_sync_controller::constants::{FINALIZER, PATH_ANNOTATION};
use vault_sync_controller::controller::paths::{KvVersion, PathResolver};
use vault_sync_controller::controller::reconciler::SyncEngine;
use vault_sync_controller::controller::writer::{RateLimitedWriter, WriterSettings};
use vault_sync_controller::error::{ClusterError, StoreError};
use vault_sync_controller::provider::SecretStoreProvider;
use vault_sync_controller::target::{SecretRef, SyncTarget, TargetKind, TargetRef};

static RUSTLS_INIT: Once = Once::new();

/// Install the ring crypto provider once per test binary
pub fn init_rustls() {
    RUSTLS_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Cluster state held in memory
///
/// Mimics the API server where it matters to the engine: metadata patches bump
/// `resourceVersion`, and a deleting object disappears once its finalizers are gone.
#[derive(Default)]
pub struct MemoryCluster {
    targets: Mutex<HashMap<TargetRef, SyncTarget>>,
    secrets: Mutex<HashMap<(String, String), SecretRef>>,
    fail_annotations: Mutex<bool>,
    finalizer_patches: Mutex<u32>,
}

impl MemoryCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn put_target(&self, target: SyncTarget) {
        self.targets
            .lock()
            .unwrap()
            .insert(target.id.clone(), target);
    }

    pub fn target(&self, id: &TargetRef) -> Option<SyncTarget> {
        self.targets.lock().unwrap().get(id).cloned()
    }

    /// Add or replace a secret, bumping its version
    pub fn put_secret(&self, namespace: &str, name: &str, data: &[(&str, &str)]) {
        let mut secrets = self.secrets.lock().unwrap();
        let key = (namespace.to_string(), name.to_string());
        let version = secrets
            .get(&key)
            .map_or(1, |s| s.version.parse::<u64>().unwrap() + 1);
        secrets.insert(
            key,
            SecretRef {
                name: name.to_string(),
                namespace: namespace.to_string(),
                data: data
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), v.as_bytes().to_vec()))
                    .collect(),
                version: version.to_string(),
            },
        );
    }

    pub fn mark_deleting(&self, id: &TargetRef) {
        if let Some(target) = self.targets.lock().unwrap().get_mut(id) {
            target.deleting = true;
        }
    }

    pub fn set_user_annotation(&self, id: &TargetRef, key: &str, value: &str) {
        if let Some(target) = self.targets.lock().unwrap().get_mut(id) {
            target.annotations.insert(key.to_string(), value.to_string());
        }
    }

    pub fn fail_annotations(&self, fail: bool) {
        *self.fail_annotations.lock().unwrap() = fail;
    }

    pub fn finalizer_patches(&self) -> u32 {
        *self.finalizer_patches.lock().unwrap()
    }

    fn bump_own_version(target: &mut SyncTarget) {
        if let Some(own) = target.own_secret.as_mut() {
            let next = own.version.parse::<u64>().unwrap_or(0) + 1;
            own.version = next.to_string();
        }
    }
}

#[async_trait]
impl ClusterClient for MemoryCluster {
    async fn get_target(&self, id: &TargetRef) -> Result<Option<SyncTarget>, ClusterError> {
        Ok(self.target(id))
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<SecretRef>, ClusterError> {
        Ok(self
            .secrets
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn set_finalizers(&self, id: &TargetRef, finalizers: Vec<String>) -> Result<(), ClusterError> {
        *self.finalizer_patches.lock().unwrap() += 1;
        let mut targets = self.targets.lock().unwrap();
        let Some(target) = targets.get_mut(id) else {
            return Err(ClusterError::Conflict(format!("{id} no longer exists")));
        };
        if target.deleting && finalizers.is_empty() {
            targets.remove(id);
            return Ok(());
        }
        target.finalizers = finalizers;
        Self::bump_own_version(target);
        Ok(())
    }

    async fn set_annotation(&self, id: &TargetRef, key: &str, value: &str) -> Result<(), ClusterError> {
        if *self.fail_annotations.lock().unwrap() {
            return Err(ClusterError::Conflict(id.to_string()));
        }
        let mut targets = self.targets.lock().unwrap();
        let Some(target) = targets.get_mut(id) else {
            return Err(ClusterError::Conflict(format!("{id} no longer exists")));
        };
        target.annotations.insert(key.to_string(), value.to_string());
        Self::bump_own_version(target);
        Ok(())
    }
}

/// One recorded store call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Write(String),
    Delete(String),
}

/// Secret store held in memory
#[derive(Default)]
pub struct MemorySecretStore {
    data: Mutex<BTreeMap<String, Value>>,
    calls: Mutex<Vec<StoreCall>>,
    fail_with: Mutex<Option<String>>,
    hang: Mutex<bool>,
}

impl MemorySecretStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn read(&self, path: &str) -> Option<Value> {
        self.data.lock().unwrap().get(path).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        self.data.lock().unwrap().keys().cloned().collect()
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn write_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, StoreCall::Write(_)))
            .count()
    }

    /// Make every subsequent operation fail with `message`
    pub fn fail_with(&self, message: Option<&str>) {
        *self.fail_with.lock().unwrap() = message.map(str::to_string);
    }

    /// Make every subsequent operation wait forever
    pub fn hang(&self) {
        *self.hang.lock().unwrap() = true;
    }

    async fn before_call(&self, path: &str) -> Result<(), StoreError> {
        let hang = *self.hang.lock().unwrap();
        if hang {
            tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
        }
        let failure = self.fail_with.lock().unwrap().clone();
        match failure {
            Some(message) => Err(StoreError::operation("write", path, message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SecretStoreProvider for MemorySecretStore {
    async fn write_secret(&self, path: &str, payload: &Value) -> Result<(), StoreError> {
        self.before_call(path).await?;
        self.calls
            .lock()
            .unwrap()
            .push(StoreCall::Write(path.to_string()));
        self.data
            .lock()
            .unwrap()
            .insert(path.to_string(), payload.clone());
        Ok(())
    }

    async fn delete_secret(&self, path: &str) -> Result<(), StoreError> {
        self.before_call(path).await?;
        self.calls
            .lock()
            .unwrap()
            .push(StoreCall::Delete(path.to_string()));
        self.data.lock().unwrap().remove(path);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn readiness_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Writer settings without rate limiting and with a short batch pause
pub fn fast_writer_settings() -> WriterSettings {
    WriterSettings {
        rate_per_sec: 0.0,
        burst: 1,
        batch_size: 5,
        batch_pause: Duration::from_millis(1),
        large_payload_bytes: 1024 * 1024,
    }
}

pub fn engine_with(
    cluster: &Arc<MemoryCluster>,
    store: &Arc<MemorySecretStore>,
    cluster_tag: &str,
    timeout: Duration,
) -> SyncEngine {
    let writer = Arc::new(RateLimitedWriter::new(
        Arc::clone(store) as Arc<dyn SecretStoreProvider>,
        fast_writer_settings(),
    ));
    SyncEngine::new(
        Arc::clone(cluster) as Arc<dyn ClusterClient>,
        writer,
        PathResolver::new(cluster_tag, KvVersion::Auto),
        Duration::from_secs(30),
        timeout,
    )
}

pub fn engine(cluster: &Arc<MemoryCluster>, store: &Arc<MemorySecretStore>) -> SyncEngine {
    engine_with(cluster, store, "", Duration::from_secs(60))
}

/// Workload target in namespace `apps`
pub fn workload(kind: TargetKind, name: &str, path: &str, annotations: &[(&str, &str)]) -> SyncTarget {
    let mut map: BTreeMap<String, String> = annotations
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    map.insert(PATH_ANNOTATION.to_string(), path.to_string());
    SyncTarget {
        id: TargetRef::new(kind, "apps", name),
        annotations: map,
        finalizers: vec![],
        deleting: false,
        pod_template: None,
        own_secret: None,
    }
}

/// Same target with the finalizer already present
pub fn protected(mut target: SyncTarget) -> SyncTarget {
    target.finalizers.push(FINALIZER.to_string());
    target
}

/// Pod template referencing secrets by env var, envFrom and volume
pub fn pod_template(env_secret: &str, env_from_secret: &str, volume_secret: &str) -> k8s_openapi::api::core::v1::PodTemplateSpec {
    serde_json::from_value(serde_json::json!({
        "spec": {
            "containers": [{
                "name": "app",
                "env": [{
                    "name": "TOKEN",
                    "valueFrom": {"secretKeyRef": {"name": env_secret, "key": "token"}}
                }],
                "envFrom": [{"secretRef": {"name": env_from_secret}}],
                "volumeMounts": [{"name": "creds", "mountPath": "/creds"}]
            }],
            "volumes": [{"name": "creds", "secret": {"secretName": volume_secret}}]
        }
    }))
    .unwrap()
}
