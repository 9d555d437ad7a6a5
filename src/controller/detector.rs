//! # Change Detector
//!
//! Compares the version snapshot stored on a target with the versions observed
//! now. Tokens are opaque: only equality matters, never ordering.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// Secret name to last-synced version token
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionSnapshot(BTreeMap<String, String>);

impl VersionSnapshot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the annotation value. `null` and blank values are an empty snapshot.
    ///
    /// # Errors
    ///
    /// Returns the JSON error for anything that is not a flat string map.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let parsed: Option<BTreeMap<String, String>> = serde_json::from_str(raw)?;
        Ok(Self(parsed.unwrap_or_default()))
    }

    /// Parse a stored snapshot, treating a corrupt value as "never synced"
    #[must_use]
    pub fn parse_or_empty(raw: Option<&str>, target: &str) -> Self {
        let Some(raw) = raw else {
            return Self::default();
        };
        Self::parse(raw).unwrap_or_else(|e| {
            warn!(
                target_ref = %target,
                annotation = %raw,
                error = %e,
                "Failed to parse secret versions annotation, treating as first sync"
            );
            Self::default()
        })
    }

    /// Annotation value for this snapshot
    ///
    /// # Errors
    ///
    /// Only fails if serde_json cannot allocate.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.0)
    }

    pub fn insert(&mut self, name: impl Into<String>, version: impl Into<String>) {
        self.0.insert(name.into(), version.into());
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for VersionSnapshot {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// True when a sync is needed: no prior snapshot, a differing token, or a name
/// present on only one side.
#[must_use]
pub fn has_changed(last: &VersionSnapshot, current: &VersionSnapshot) -> bool {
    if last.is_empty() {
        return true;
    }
    last != current
}

/// Names that differ between the snapshots: changed and added names in name
/// order, then removed names with a `" (removed)"` suffix.
#[must_use]
pub fn diff(last: &VersionSnapshot, current: &VersionSnapshot) -> Vec<String> {
    let mut changed: Vec<String> = current
        .iter()
        .filter(|(name, version)| last.get(name) != Some(*version))
        .map(|(name, _)| name.to_string())
        .collect();

    changed.extend(
        last.iter()
            .filter(|(name, _)| current.get(name).is_none())
            .map(|(name, _)| format!("{name} (removed)")),
    );
    changed
}

/// Why a sync goes ahead
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncReason {
    FirstSync,
    VersionsChanged,
    RotationCheckDisabled,
}

impl fmt::Display for SyncReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncReason::FirstSync => "first-sync",
            SyncReason::VersionsChanged => "versions-changed",
            SyncReason::RotationCheckDisabled => "rotation-check-disabled",
        })
    }
}

/// Outcome of change detection for one reconcile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncDecision {
    Sync {
        reason: SyncReason,
        changed: Vec<String>,
    },
    Skip,
}

/// Decide whether to write. A disabled rotation check always syncs.
#[must_use]
pub fn decide(
    last: &VersionSnapshot,
    current: &VersionSnapshot,
    rotation_check_disabled: bool,
) -> SyncDecision {
    let changed = diff(last, current);
    if rotation_check_disabled {
        SyncDecision::Sync {
            reason: SyncReason::RotationCheckDisabled,
            changed,
        }
    } else if last.is_empty() {
        SyncDecision::Sync {
            reason: SyncReason::FirstSync,
            changed,
        }
    } else if has_changed(last, current) {
        SyncDecision::Sync {
            reason: SyncReason::VersionsChanged,
            changed,
        }
    } else {
        SyncDecision::Skip
    }
}
