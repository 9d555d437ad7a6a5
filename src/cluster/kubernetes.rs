//! Kubernetes-backed [`ClusterClient`]
//!
//! Reads Deployments, StatefulSets, DaemonSets and Secrets through typed
//! [`Api`]s and writes metadata back with JSON merge patches.

use super::ClusterClient;
use crate::constants::FIELD_MANAGER;
use crate::error::ClusterError;
use crate::target::{SecretRef, SyncTarget, TargetKind, TargetRef};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{PodTemplateSpec, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::debug;

/// Cluster access through a [`kube::Client`]
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl std::fmt::Debug for KubeClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterClient").finish_non_exhaustive()
    }
}

impl KubeClusterClient {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn patch_metadata<K>(
        &self,
        api: Api<K>,
        id: &TargetRef,
        patch: serde_json::Value,
    ) -> Result<(), ClusterError>
    where
        K: kube::Resource + Clone + DeserializeOwned + Debug,
    {
        let patch_params = PatchParams::apply(FIELD_MANAGER);
        match api.patch(&id.name, &patch_params, &Patch::Merge(patch)).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(api_err)) if api_err.code == 409 => {
                Err(ClusterError::Conflict(id.to_string()))
            }
            Err(e) => Err(ClusterError::Kube(e)),
        }
    }

    async fn patch(&self, id: &TargetRef, patch: serde_json::Value) -> Result<(), ClusterError> {
        match id.kind {
            TargetKind::Deployment => {
                self.patch_metadata(self.api::<Deployment>(&id.namespace), id, patch)
                    .await
            }
            TargetKind::StatefulSet => {
                self.patch_metadata(self.api::<StatefulSet>(&id.namespace), id, patch)
                    .await
            }
            TargetKind::DaemonSet => {
                self.patch_metadata(self.api::<DaemonSet>(&id.namespace), id, patch)
                    .await
            }
            TargetKind::Secret => {
                self.patch_metadata(self.api::<Secret>(&id.namespace), id, patch)
                    .await
            }
        }
    }
}

/// Build a [`SyncTarget`] from object metadata
fn target_from_meta(
    id: &TargetRef,
    meta: ObjectMeta,
    pod_template: Option<PodTemplateSpec>,
    own_secret: Option<SecretRef>,
) -> SyncTarget {
    SyncTarget {
        id: id.clone(),
        annotations: meta.annotations.unwrap_or_default(),
        finalizers: meta.finalizers.unwrap_or_default(),
        deleting: meta.deletion_timestamp.is_some(),
        pod_template,
        own_secret,
    }
}

/// Convert a Secret into the engine's view of it
#[must_use]
pub fn secret_ref(secret: &Secret) -> SecretRef {
    SecretRef {
        name: secret.metadata.name.clone().unwrap_or_default(),
        namespace: secret.metadata.namespace.clone().unwrap_or_default(),
        data: secret
            .data
            .as_ref()
            .map(|data| {
                data.iter()
                    .map(|(key, value)| (key.clone(), value.0.clone()))
                    .collect()
            })
            .unwrap_or_default(),
        version: secret.metadata.resource_version.clone().unwrap_or_default(),
    }
}

/// Convert a fetched object into a [`SyncTarget`]
pub trait IntoSyncTarget {
    fn into_sync_target(self, id: &TargetRef) -> SyncTarget;
}

impl IntoSyncTarget for Deployment {
    fn into_sync_target(self, id: &TargetRef) -> SyncTarget {
        target_from_meta(id, self.metadata, self.spec.map(|s| s.template), None)
    }
}

impl IntoSyncTarget for StatefulSet {
    fn into_sync_target(self, id: &TargetRef) -> SyncTarget {
        target_from_meta(id, self.metadata, self.spec.map(|s| s.template), None)
    }
}

impl IntoSyncTarget for DaemonSet {
    fn into_sync_target(self, id: &TargetRef) -> SyncTarget {
        target_from_meta(id, self.metadata, self.spec.map(|s| s.template), None)
    }
}

impl IntoSyncTarget for Secret {
    fn into_sync_target(self, id: &TargetRef) -> SyncTarget {
        let own = secret_ref(&self);
        target_from_meta(id, self.metadata, None, Some(own))
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get_target(&self, id: &TargetRef) -> Result<Option<SyncTarget>, ClusterError> {
        let target = match id.kind {
            TargetKind::Deployment => self
                .api::<Deployment>(&id.namespace)
                .get_opt(&id.name)
                .await?
                .map(|o| o.into_sync_target(id)),
            TargetKind::StatefulSet => self
                .api::<StatefulSet>(&id.namespace)
                .get_opt(&id.name)
                .await?
                .map(|o| o.into_sync_target(id)),
            TargetKind::DaemonSet => self
                .api::<DaemonSet>(&id.namespace)
                .get_opt(&id.name)
                .await?
                .map(|o| o.into_sync_target(id)),
            TargetKind::Secret => self
                .api::<Secret>(&id.namespace)
                .get_opt(&id.name)
                .await?
                .map(|o| o.into_sync_target(id)),
        };
        Ok(target)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<SecretRef>, ClusterError> {
        let secret = self.api::<Secret>(namespace).get_opt(name).await?;
        Ok(secret.as_ref().map(secret_ref))
    }

    async fn set_finalizers(&self, id: &TargetRef, finalizers: Vec<String>) -> Result<(), ClusterError> {
        debug!(target_ref = %id, finalizers = ?finalizers, "Patching finalizers");
        let patch = serde_json::json!({
            "metadata": {
                "finalizers": finalizers
            }
        });
        self.patch(id, patch).await
    }

    async fn set_annotation(&self, id: &TargetRef, key: &str, value: &str) -> Result<(), ClusterError> {
        debug!(target_ref = %id, annotation = %key, "Patching annotation");
        let patch = serde_json::json!({
            "metadata": {
                "annotations": {
                    key: value
                }
            }
        });
        self.patch(id, patch).await
    }
}
