//! # Target Annotations
//!
//! Typed, read-only view over the `vault-sync.io/*` annotations of a target.

use crate::constants::{
    KV_VERSION_ANNOTATION, PATH_ANNOTATION, PRESERVE_ON_DELETE_ANNOTATION,
    RECONCILE_ANNOTATION, ROTATION_CHECK_ANNOTATION, ROTATION_CHECK_DISABLED,
    SECRETS_ANNOTATION, SECRET_VERSIONS_ANNOTATION,
};
use crate::controller::paths::KvVersion;
use crate::error::ConfigError;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy)]
pub struct TargetAnnotations<'a> {
    map: &'a BTreeMap<String, String>,
}

impl<'a> TargetAnnotations<'a> {
    #[must_use]
    pub fn new(map: &'a BTreeMap<String, String>) -> Self {
        Self { map }
    }

    fn get(&self, key: &str) -> Option<&'a str> {
        self.map.get(key).map(String::as_str)
    }

    /// Logical store path, `None` when absent or empty (sync disabled)
    #[must_use]
    pub fn logical_path(&self) -> Option<&'a str> {
        self.get(PATH_ANNOTATION)
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }

    /// Raw explicit-config JSON, `None` when absent or blank
    #[must_use]
    pub fn secrets_config_raw(&self) -> Option<&'a str> {
        self.get(SECRETS_ANNOTATION).filter(|s| !s.trim().is_empty())
    }

    #[must_use]
    pub fn preserve_on_delete(&self) -> bool {
        self.get(PRESERVE_ON_DELETE_ANNOTATION) == Some("true")
    }

    #[must_use]
    pub fn rotation_check_disabled(&self) -> bool {
        self.get(ROTATION_CHECK_ANNOTATION) == Some(ROTATION_CHECK_DISABLED)
    }

    #[must_use]
    pub fn reconcile_interval_raw(&self) -> Option<&'a str> {
        self.get(RECONCILE_ANNOTATION)
    }

    #[must_use]
    pub fn version_snapshot_raw(&self) -> Option<&'a str> {
        self.get(SECRET_VERSIONS_ANNOTATION)
    }

    /// Per-target KV layout override
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidKvVersion`] for values other than `1`, `2`, `auto`.
    pub fn kv_version(&self) -> Result<Option<KvVersion>, ConfigError> {
        match self.get(KV_VERSION_ANNOTATION).map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => raw.parse::<KvVersion>().ok().map(Some).ok_or_else(|| {
                ConfigError::InvalidKvVersion {
                    raw: raw.to_string(),
                }
            }),
        }
    }
}
