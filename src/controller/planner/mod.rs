//! # Sync Planner
//!
//! Works out what a target wants written, without writing anything.
//!
//! ## Modes
//!
//! - **Explicit**: `vault-sync.io/secrets` lists secrets and keys. Selected keys
//!   (optionally prefixed) are merged into one flat payload at the logical path.
//! - **Auto-discovery**: no explicit config on a workload. Every secret the pod
//!   template references is written whole to `<logical path>/<secret name>`.
//! - **Standalone secret**: no explicit config on a Secret target. The secret's
//!   own keys are written whole to the logical path.
//!
//! The plan also carries the version snapshot to persist after a successful write.

pub mod config;
pub mod discovery;

pub use config::{SecretSelection, SecretSyncConfig};
pub use discovery::discover_secret_names;

use crate::cluster::ClusterClient;
use crate::controller::detector::VersionSnapshot;
use crate::controller::paths::{KvVersion, PathResolver, StorePath};
use crate::error::{ConfigError, PlanError};
use crate::observability::metrics;
use crate::target::{SecretData, SecretRef, SyncTarget, TargetKind};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Strategy chosen for a target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Explicit,
    AutoDiscovery,
    StandaloneSecret,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncMode::Explicit => "explicit",
            SyncMode::AutoDiscovery => "auto-discovery",
            SyncMode::StandaloneSecret => "standalone-secret",
        })
    }
}

/// One payload bound for one store path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedWrite {
    pub path: StorePath,
    pub data: SecretData,
}

/// Materialized result of planning
#[derive(Debug, Clone)]
pub struct SyncPlan {
    pub mode: SyncMode,
    /// Resolved logical path of the target (deletion target on cleanup)
    pub base_path: StorePath,
    pub writes: Vec<PlannedWrite>,
    pub versions: VersionSnapshot,
}

impl SyncPlan {
    /// Total number of keys across all writes
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.writes.iter().map(|w| w.data.len()).sum()
    }
}

/// Builds [`SyncPlan`]s from target annotations and referenced secrets
pub struct SyncPlanner {
    cluster: Arc<dyn ClusterClient>,
    resolver: PathResolver,
}

impl fmt::Debug for SyncPlanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncPlanner")
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

impl SyncPlanner {
    pub fn new(cluster: Arc<dyn ClusterClient>, resolver: PathResolver) -> Self {
        Self { cluster, resolver }
    }

    #[must_use]
    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Resolve the target's logical path with its KV override
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the path is missing or the KV override is invalid.
    pub fn base_path(&self, target: &SyncTarget) -> Result<StorePath, ConfigError> {
        let annotations = target.annotations();
        let logical = annotations.logical_path().ok_or(ConfigError::MissingPath)?;
        let kv = annotations.kv_version()?;
        Ok(self.resolver.resolve(logical, kv))
    }

    /// Build the plan for an active target
    ///
    /// # Errors
    ///
    /// - [`PlanError::Config`] for malformed annotations
    /// - [`PlanError::SecretNotFound`] / [`PlanError::KeyNotFound`] for dangling references
    /// - [`PlanError::Cluster`] when the cluster cannot be read
    pub async fn plan(&self, target: &SyncTarget) -> Result<SyncPlan, PlanError> {
        let base_path = self.base_path(target).inspect_err(|e| {
            metrics::increment_config_parse_errors(e.error_type());
            error!(target_ref = %target.id, error = %e, "Invalid sync annotations");
        })?;
        let annotations = target.annotations();
        let kv = annotations.kv_version()?;

        if let Some(raw) = annotations.secrets_config_raw() {
            let config = SecretSyncConfig::parse(raw).inspect_err(|e| {
                metrics::increment_config_parse_errors(e.error_type());
                error!(
                    target_ref = %target.id,
                    annotation = %raw,
                    error_type = e.error_type(),
                    error = %e,
                    "Failed to parse secrets annotation"
                );
            })?;
            info!(target_ref = %target.id, entries = config.entries().len(), "Using explicit secret configuration");
            return self.plan_explicit(target, base_path, &config).await;
        }

        if target.id.kind == TargetKind::Secret {
            return Ok(Self::plan_standalone(target, base_path));
        }

        info!(target_ref = %target.id, "Using auto-discovery mode");
        self.plan_auto_discovery(target, base_path, kv).await
    }

    async fn plan_explicit(
        &self,
        target: &SyncTarget,
        base_path: StorePath,
        config: &SecretSyncConfig,
    ) -> Result<SyncPlan, PlanError> {
        let mut data = SecretData::new();
        let mut versions = VersionSnapshot::new();

        for entry in config.entries() {
            let secret = self.fetch_secret(target, &entry.name).await?;
            versions.insert(entry.name.clone(), version_token(target, &secret));

            for key in &entry.keys {
                let Some(value) = secret.value(key) else {
                    let available = secret.keys();
                    metrics::increment_secret_key_missing(&target.id.namespace, &entry.name);
                    error!(
                        target_ref = %target.id,
                        secret = %entry.name,
                        key = %key,
                        available_keys = ?available,
                        "Key not found in secret"
                    );
                    return Err(PlanError::KeyNotFound {
                        secret: entry.name.clone(),
                        key: key.clone(),
                        available,
                    });
                };

                let output_key = entry.output_key(key);
                if data.insert(output_key.clone(), value).is_some() {
                    warn!(
                        target_ref = %target.id,
                        key = %output_key,
                        secret = %entry.name,
                        "Duplicate output key, later entry wins"
                    );
                }
            }
        }

        Ok(SyncPlan {
            mode: SyncMode::Explicit,
            writes: vec![PlannedWrite {
                path: base_path.clone(),
                data,
            }],
            base_path,
            versions,
        })
    }

    fn plan_standalone(target: &SyncTarget, base_path: StorePath) -> SyncPlan {
        let mut versions = VersionSnapshot::new();
        let data = match &target.own_secret {
            Some(own) => {
                versions.insert(own.name.clone(), own.content_version());
                own.string_data()
            }
            None => SecretData::new(),
        };
        debug!(target_ref = %target.id, keys = data.len(), "Syncing all keys of standalone secret");

        SyncPlan {
            mode: SyncMode::StandaloneSecret,
            writes: vec![PlannedWrite {
                path: base_path.clone(),
                data,
            }],
            base_path,
            versions,
        }
    }

    async fn plan_auto_discovery(
        &self,
        target: &SyncTarget,
        base_path: StorePath,
        kv: Option<KvVersion>,
    ) -> Result<SyncPlan, PlanError> {
        let names = target
            .pod_template
            .as_ref()
            .map(discover_secret_names)
            .unwrap_or_default();

        metrics::set_secrets_discovered(
            &target.id.namespace,
            &target.id.name,
            i64::try_from(names.len()).unwrap_or(i64::MAX),
        );
        if names.is_empty() {
            info!(target_ref = %target.id, "No secrets found in pod template");
        } else {
            info!(target_ref = %target.id, secrets = ?names, "Auto-discovered secrets");
        }

        let mut writes = Vec::with_capacity(names.len());
        let mut versions = VersionSnapshot::new();
        for name in &names {
            let secret = self.fetch_secret(target, name).await?;
            versions.insert(name.clone(), version_token(target, &secret));
            writes.push(PlannedWrite {
                path: self
                    .resolver
                    .resolve(&format!("{}/{name}", base_path.logical()), kv),
                data: secret.string_data(),
            });
        }

        Ok(SyncPlan {
            mode: SyncMode::AutoDiscovery,
            base_path,
            writes,
            versions,
        })
    }

    /// Load a referenced secret from the target's namespace
    async fn fetch_secret(&self, target: &SyncTarget, name: &str) -> Result<SecretRef, PlanError> {
        if let Some(own) = target
            .own_secret
            .as_ref()
            .filter(|own| own.name == name)
        {
            return Ok(own.clone());
        }

        match self.cluster.get_secret(&target.id.namespace, name).await? {
            Some(secret) => Ok(secret),
            None => {
                metrics::increment_secret_not_found(&target.id.namespace);
                error!(
                    target_ref = %target.id,
                    secret = %name,
                    suggestion = "ensure secret generators run before sync",
                    "Failed to get secret, it may be produced by kustomize, helm or a similar tool"
                );
                Err(PlanError::SecretNotFound {
                    namespace: target.id.namespace.clone(),
                    name: name.to_string(),
                })
            }
        }
    }
}

/// Version token for `secret` as referenced by `target`.
///
/// A Secret target referencing itself uses a content digest, since the
/// snapshot annotation written back to it changes its `resourceVersion`.
fn version_token(target: &SyncTarget, secret: &SecretRef) -> String {
    let self_reference = target.id.kind == TargetKind::Secret
        && target.id.name == secret.name
        && target.id.namespace == secret.namespace;
    if self_reference {
        secret.content_version()
    } else {
        secret.version.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{KV_VERSION_ANNOTATION, PATH_ANNOTATION, SECRETS_ANNOTATION};
    use crate::error::ClusterError;
    use crate::target::TargetRef;
    use async_trait::async_trait;
    use std::collections::{BTreeMap, HashMap};

    #[derive(Default)]
    struct SecretsOnly {
        secrets: HashMap<(String, String), SecretRef>,
    }

    impl SecretsOnly {
        fn with(mut self, name: &str, version: &str, data: &[(&str, &str)]) -> Self {
            self.secrets.insert(
                ("apps".to_string(), name.to_string()),
                SecretRef {
                    name: name.to_string(),
                    namespace: "apps".to_string(),
                    data: data
                        .iter()
                        .map(|(k, v)| ((*k).to_string(), v.as_bytes().to_vec()))
                        .collect(),
                    version: version.to_string(),
                },
            );
            self
        }
    }

    #[async_trait]
    impl ClusterClient for SecretsOnly {
        async fn get_target(&self, _id: &TargetRef) -> Result<Option<SyncTarget>, ClusterError> {
            Ok(None)
        }

        async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<SecretRef>, ClusterError> {
            Ok(self
                .secrets
                .get(&(namespace.to_string(), name.to_string()))
                .cloned())
        }

        async fn set_finalizers(&self, _id: &TargetRef, _f: Vec<String>) -> Result<(), ClusterError> {
            Ok(())
        }

        async fn set_annotation(&self, _id: &TargetRef, _k: &str, _v: &str) -> Result<(), ClusterError> {
            Ok(())
        }
    }

    fn planner(cluster: SecretsOnly) -> SyncPlanner {
        SyncPlanner::new(Arc::new(cluster), PathResolver::new("", KvVersion::Auto))
    }

    fn target(kind: TargetKind, annotations: &[(&str, &str)]) -> SyncTarget {
        SyncTarget {
            id: TargetRef::new(kind, "apps", "web"),
            annotations: annotations
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect::<BTreeMap<_, _>>(),
            finalizers: vec![],
            deleting: false,
            pod_template: None,
            own_secret: None,
        }
    }

    #[tokio::test]
    async fn test_explicit_prefix_round_trip() {
        let planner = planner(SecretsOnly::default().with(
            "db",
            "41",
            &[("username", "u"), ("password", "p"), ("host", "h")],
        ));
        let t = target(
            TargetKind::Deployment,
            &[
                (PATH_ANNOTATION, "secret/data/web"),
                (SECRETS_ANNOTATION, r#"[{"name":"db","keys":["username","password"],"prefix":"app_"}]"#),
            ],
        );

        let plan = planner.plan(&t).await.unwrap();
        assert_eq!(plan.mode, SyncMode::Explicit);
        assert_eq!(plan.writes.len(), 1);
        assert_eq!(plan.writes[0].path.physical(), "secret/data/web");
        let expected: SecretData = [("app_username", "u"), ("app_password", "p")]
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        assert_eq!(plan.writes[0].data, expected);
        assert_eq!(plan.versions.get("db"), Some("41"));
    }

    #[tokio::test]
    async fn test_explicit_missing_key_lists_available_keys() {
        let planner = planner(SecretsOnly::default().with("db", "1", &[("user", "u"), ("pass", "p")]));
        let t = target(
            TargetKind::Deployment,
            &[
                (PATH_ANNOTATION, "secret/data/web"),
                (SECRETS_ANNOTATION, r#"[{"name":"db","keys":["password"]}]"#),
            ],
        );

        let err = planner.plan(&t).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "key password not found in secret db (available keys: [pass, user])"
        );
    }

    #[tokio::test]
    async fn test_explicit_duplicate_output_key_later_wins() {
        let planner = planner(
            SecretsOnly::default()
                .with("a", "1", &[("token", "from-a")])
                .with("b", "2", &[("token", "from-b")]),
        );
        let t = target(
            TargetKind::Deployment,
            &[
                (PATH_ANNOTATION, "kv/web"),
                (SECRETS_ANNOTATION, r#"[{"name":"a","keys":["token"]},{"name":"b","keys":["token"]}]"#),
            ],
        );

        let plan = planner.plan(&t).await.unwrap();
        assert_eq!(plan.writes[0].data.get("token").map(String::as_str), Some("from-b"));
        assert_eq!(plan.versions.len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_config_is_config_error() {
        let planner = planner(SecretsOnly::default());
        let t = target(
            TargetKind::Deployment,
            &[(PATH_ANNOTATION, "kv/web"), (SECRETS_ANNOTATION, "not-json")],
        );
        assert!(matches!(
            planner.plan(&t).await,
            Err(PlanError::Config(ConfigError::MalformedSecrets { .. }))
        ));
    }

    #[tokio::test]
    async fn test_auto_discovery_writes_one_sub_path_per_secret() {
        let planner = planner(
            SecretsOnly::default()
                .with("A", "1", &[("a", "1")])
                .with("B", "2", &[("b", "2")])
                .with("C", "3", &[("c", "3"), ("d", "4")]),
        );
        let mut t = target(TargetKind::Deployment, &[(PATH_ANNOTATION, "secret/data/web")]);
        t.pod_template = Some(
            serde_json::from_value(serde_json::json!({"spec": {
                "containers": [{
                    "name": "app",
                    "env": [{"name": "X", "valueFrom": {"secretKeyRef": {"name": "A", "key": "a"}}}],
                    "envFrom": [{"secretRef": {"name": "B"}}]
                }],
                "volumes": [{"name": "v", "secret": {"secretName": "C"}}]
            }}))
            .unwrap(),
        );

        let plan = planner.plan(&t).await.unwrap();
        assert_eq!(plan.mode, SyncMode::AutoDiscovery);
        let paths: Vec<&str> = plan.writes.iter().map(|w| w.path.physical()).collect();
        assert_eq!(
            paths,
            vec!["secret/data/web/A", "secret/data/web/B", "secret/data/web/C"]
        );
        assert!(plan.writes.iter().all(|w| w.path.is_kv_v2()));
        assert_eq!(plan.writes[2].data.len(), 2);
        assert_eq!(plan.versions.get("C"), Some("3"));
    }

    #[tokio::test]
    async fn test_auto_discovery_missing_secret_suggests_generators() {
        let planner = planner(SecretsOnly::default());
        let mut t = target(TargetKind::Deployment, &[(PATH_ANNOTATION, "kv/web")]);
        t.pod_template = Some(
            serde_json::from_value(serde_json::json!({"spec": {
                "containers": [{"name": "app", "envFrom": [{"secretRef": {"name": "generated"}}]}]
            }}))
            .unwrap(),
        );

        let err = planner.plan(&t).await.unwrap_err();
        assert!(matches!(err, PlanError::SecretNotFound { ref name, .. } if name == "generated"));
        assert!(err.to_string().contains("secret generators"));
    }

    #[tokio::test]
    async fn test_standalone_secret_uses_content_digest() {
        let planner = planner(SecretsOnly::default());
        let mut t = target(TargetKind::Secret, &[(PATH_ANNOTATION, "kv/web")]);
        let own = SecretRef {
            name: "web".to_string(),
            namespace: "apps".to_string(),
            data: [("k".to_string(), b"v".to_vec())].into_iter().collect(),
            version: "100".to_string(),
        };
        t.own_secret = Some(own.clone());

        let plan = planner.plan(&t).await.unwrap();
        assert_eq!(plan.mode, SyncMode::StandaloneSecret);
        assert_eq!(plan.writes[0].path.physical(), "kv/web");
        assert_eq!(plan.versions.get("web"), Some(own.content_version().as_str()));
    }

    #[tokio::test]
    async fn test_kv_override_applies_to_sub_paths() {
        let planner = planner(SecretsOnly::default().with("A", "1", &[("a", "1")]));
        let mut t = target(
            TargetKind::Deployment,
            &[(PATH_ANNOTATION, "secret/web"), (KV_VERSION_ANNOTATION, "2")],
        );
        t.pod_template = Some(
            serde_json::from_value(serde_json::json!({"spec": {
                "containers": [{"name": "app", "envFrom": [{"secretRef": {"name": "A"}}]}]
            }}))
            .unwrap(),
        );

        let plan = planner.plan(&t).await.unwrap();
        assert_eq!(plan.base_path.physical(), "secret/data/web");
        assert_eq!(plan.writes[0].path.physical(), "secret/data/web/A");
    }
}
