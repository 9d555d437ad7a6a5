//! # Sync Targets
//!
//! Cluster-agnostic views of the resources the engine works on.
//!
//! - [`SyncTarget`] is a workload (owns a pod template) or a standalone Secret
//!   carrying the `vault-sync.io/*` annotations.
//! - [`SecretRef`] is a referenced Secret: opaque data plus a version token.
//!
//! Conversion from `k8s-openapi` types lives in [`crate::cluster::kubernetes`]; the
//! engine itself never sees Kubernetes API types except the pod template.

pub mod annotations;

use k8s_openapi::api::core::v1::PodTemplateSpec;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

pub use annotations::TargetAnnotations;

/// Flat key/value payload destined for a single store path
pub type SecretData = BTreeMap<String, String>;

/// Kind of resource being synced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Deployment,
    StatefulSet,
    DaemonSet,
    Secret,
}

impl TargetKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Deployment => "Deployment",
            TargetKind::StatefulSet => "StatefulSet",
            TargetKind::DaemonSet => "DaemonSet",
            TargetKind::Secret => "Secret",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity handed to the engine by the watch layer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetRef {
    pub kind: TargetKind,
    pub namespace: String,
    pub name: String,
}

impl TargetRef {
    pub fn new(kind: TargetKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

/// A resource participating (or formerly participating) in sync
#[derive(Debug, Clone)]
pub struct SyncTarget {
    pub id: TargetRef,
    pub annotations: BTreeMap<String, String>,
    pub finalizers: Vec<String>,
    /// `metadata.deletionTimestamp` is set
    pub deleting: bool,
    /// Pod template of a workload target
    pub pod_template: Option<PodTemplateSpec>,
    /// Own data and version of a Secret target
    pub own_secret: Option<SecretRef>,
}

impl SyncTarget {
    /// Typed accessor over the annotation map
    #[must_use]
    pub fn annotations(&self) -> TargetAnnotations<'_> {
        TargetAnnotations::new(&self.annotations)
    }

    #[must_use]
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.iter().any(|f| f == finalizer)
    }

    /// Finalizer list with `finalizer` appended (no duplicates)
    #[must_use]
    pub fn finalizers_with(&self, finalizer: &str) -> Vec<String> {
        let mut finalizers = self.finalizers.clone();
        if !self.has_finalizer(finalizer) {
            finalizers.push(finalizer.to_string());
        }
        finalizers
    }

    /// Finalizer list with every occurrence of `finalizer` removed
    #[must_use]
    pub fn finalizers_without(&self, finalizer: &str) -> Vec<String> {
        self.finalizers
            .iter()
            .filter(|f| f.as_str() != finalizer)
            .cloned()
            .collect()
    }
}

/// A platform secret: opaque key/bytes data plus a monotonically-changing version token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretRef {
    pub name: String,
    pub namespace: String,
    pub data: BTreeMap<String, Vec<u8>>,
    pub version: String,
}

impl SecretRef {
    /// Keys present in the secret, sorted
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.data.keys().cloned().collect()
    }

    /// Value of `key` as a string (lossy for non UTF-8 bytes)
    #[must_use]
    pub fn value(&self, key: &str) -> Option<String> {
        self.data
            .get(key)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Every key/value pair as strings
    #[must_use]
    pub fn string_data(&self) -> SecretData {
        self.data
            .iter()
            .map(|(k, v)| (k.clone(), String::from_utf8_lossy(v).into_owned()))
            .collect()
    }

    /// Version token derived from content instead of `resourceVersion`.
    ///
    /// Used when the secret is also the sync target: writing the snapshot
    /// annotation bumps its `resourceVersion`, so that token would never settle.
    #[must_use]
    pub fn content_version(&self) -> String {
        let mut hasher = Sha256::new();
        for (key, value) in &self.data {
            hasher.update((key.len() as u64).to_be_bytes());
            hasher.update(key.as_bytes());
            hasher.update((value.len() as u64).to_be_bytes());
            hasher.update(value);
        }
        format!("sha256:{:x}", hasher.finalize())
    }
}
