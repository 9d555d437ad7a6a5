//! # Path Resolver
//!
//! Maps a logical path from the `vault-sync.io/path` annotation to the
//! physical path used against the store, and shapes payloads for the
//! store's KV engine layout.
//!
//! KV v2 engines expose secrets under `<mount>/data/<path>` and expect the
//! payload wrapped under a `data` key. Detection is exact: only a logical
//! path whose second segment is literally `data` is treated as v2 in `Auto`
//! mode. Paths are never rewritten unless `V2` is configured explicitly.
//!
//! With a cluster tag, the physical path becomes `clusters/<tag>/<path>`.
//! KV handling is decided on the logical path before the prefix is applied.

use crate::constants::CLUSTER_PATH_PREFIX;
use crate::target::SecretData;
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

/// KV engine layout of the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KvVersion {
    /// Wrap only when the second path segment is exactly `data`
    #[default]
    Auto,
    /// Unversioned engine, no rewriting or wrapping
    V1,
    /// Versioned engine, `data` inserted after the mount when missing
    V2,
}

impl FromStr for KvVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(KvVersion::Auto),
            "1" | "v1" => Ok(KvVersion::V1),
            "2" | "v2" => Ok(KvVersion::V2),
            other => Err(format!(
                "invalid KV version '{other}', expected one of: auto, 1, 2"
            )),
        }
    }
}

impl fmt::Display for KvVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KvVersion::Auto => f.write_str("auto"),
            KvVersion::V1 => f.write_str("1"),
            KvVersion::V2 => f.write_str("2"),
        }
    }
}

/// Resolved store location. Computed per reconcile, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePath {
    logical: String,
    physical: String,
    kv_v2: bool,
}

impl StorePath {
    #[must_use]
    pub fn logical(&self) -> &str {
        &self.logical
    }

    #[must_use]
    pub fn physical(&self) -> &str {
        &self.physical
    }

    #[must_use]
    pub fn is_kv_v2(&self) -> bool {
        self.kv_v2
    }

    /// Payload body for a write to this path
    #[must_use]
    pub fn shape_for_write(&self, data: &SecretData) -> Value {
        let inner: Map<String, Value> = data
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        if self.kv_v2 {
            json!({ "data": inner })
        } else {
            Value::Object(inner)
        }
    }

    /// Path passed to a delete. Deletes carry no body, so nothing is wrapped.
    #[must_use]
    pub fn shape_for_delete(&self) -> &str {
        &self.physical
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.physical)
    }
}

/// Resolves logical paths for one store instance
#[derive(Debug, Clone)]
pub struct PathResolver {
    cluster_tag: Option<String>,
    default_kv: KvVersion,
}

impl PathResolver {
    pub fn new(cluster_tag: impl Into<String>, default_kv: KvVersion) -> Self {
        let tag = cluster_tag.into();
        let tag = tag.trim().trim_matches('/').to_string();
        Self {
            cluster_tag: (!tag.is_empty()).then_some(tag),
            default_kv,
        }
    }

    #[must_use]
    pub fn cluster_tag(&self) -> Option<&str> {
        self.cluster_tag.as_deref()
    }

    /// Resolve `logical` using the per-target KV override when present
    #[must_use]
    pub fn resolve(&self, logical: &str, kv_override: Option<KvVersion>) -> StorePath {
        let logical = logical.trim().trim_matches('/');
        let kv = kv_override.unwrap_or(self.default_kv);
        let second_is_data = logical.split('/').nth(1) == Some("data");

        let (path, kv_v2) = match kv {
            KvVersion::Auto => (logical.to_string(), second_is_data),
            KvVersion::V1 => (logical.to_string(), false),
            KvVersion::V2 if second_is_data => (logical.to_string(), true),
            KvVersion::V2 => (insert_data_segment(logical), true),
        };

        let physical = match &self.cluster_tag {
            Some(tag) => format!("{CLUSTER_PATH_PREFIX}/{tag}/{path}"),
            None => path,
        };

        StorePath {
            logical: logical.to_string(),
            physical,
            kv_v2,
        }
    }
}

fn insert_data_segment(logical: &str) -> String {
    match logical.split_once('/') {
        Some((mount, rest)) => format!("{mount}/data/{rest}"),
        None => format!("{logical}/data"),
    }
}
