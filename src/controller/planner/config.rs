//! Explicit secret selection parsed from `vault-sync.io/secrets`.
//!
//! ```json
//! [{"name": "db-credentials", "keys": ["username", "password"], "prefix": "db_"}]
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// One `{name, keys, prefix?}` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretSelection {
    pub name: String,
    pub keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

impl SecretSelection {
    /// Key written to the store for `key`
    #[must_use]
    pub fn output_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}{key}"),
            None => key.to_string(),
        }
    }
}

/// Validated, ordered list of selections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretSyncConfig {
    entries: Vec<SecretSelection>,
}

impl SecretSyncConfig {
    /// Parse and validate the annotation value
    ///
    /// # Errors
    ///
    /// - [`ConfigError::MalformedSecrets`] when the JSON does not match the schema
    /// - [`ConfigError::EmptySecrets`] for an empty list
    /// - [`ConfigError::InvalidSecretEntry`] for an entry without a name or keys
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut entries: Vec<SecretSelection> =
            serde_json::from_str(raw).map_err(|source| ConfigError::MalformedSecrets {
                raw: raw.to_string(),
                source,
            })?;

        if entries.is_empty() {
            return Err(ConfigError::EmptySecrets {
                raw: raw.to_string(),
            });
        }

        for (index, entry) in entries.iter_mut().enumerate() {
            let invalid = |message: &str| ConfigError::InvalidSecretEntry {
                raw: raw.to_string(),
                index,
                message: message.to_string(),
            };

            entry.name = entry.name.trim().to_string();
            if entry.name.is_empty() {
                return Err(invalid("name must not be empty"));
            }
            if entry.keys.is_empty() {
                return Err(invalid("keys must list at least one key"));
            }
            if entry.keys.iter().any(|k| k.is_empty()) {
                return Err(invalid("keys must not contain empty strings"));
            }
            if entry.prefix.as_deref() == Some("") {
                entry.prefix = None;
            }
        }

        Ok(Self { entries })
    }

    #[must_use]
    pub fn entries(&self) -> &[SecretSelection] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_and_without_prefix() {
        let config = SecretSyncConfig::parse(
            r#"[{"name":"db","keys":["username","password"],"prefix":"app_"},{"name":"api","keys":["token"]}]"#,
        )
        .unwrap();

        assert_eq!(config.entries().len(), 2);
        assert_eq!(config.entries()[0].output_key("username"), "app_username");
        assert_eq!(config.entries()[1].output_key("token"), "token");
    }

    #[test]
    fn test_malformed_json_keeps_raw_value() {
        let err = SecretSyncConfig::parse(r#"[{"name":"db""#).unwrap_err();
        assert_eq!(err.error_type(), "json_parse_error");
        assert!(err.to_string().contains(r#"[{\"name\":\"db\""#));
    }

    #[test]
    fn test_wrong_shape_is_malformed() {
        assert!(matches!(
            SecretSyncConfig::parse(r#"{"name":"db","keys":["a"]}"#),
            Err(ConfigError::MalformedSecrets { .. })
        ));
        assert!(matches!(
            SecretSyncConfig::parse(r#"[{"name":"db"}]"#),
            Err(ConfigError::MalformedSecrets { .. })
        ));
    }

    #[test]
    fn test_empty_list_rejected() {
        assert!(matches!(
            SecretSyncConfig::parse("[]"),
            Err(ConfigError::EmptySecrets { .. })
        ));
    }

    #[test]
    fn test_invalid_entries_rejected() {
        for raw in [
            r#"[{"name":" ","keys":["a"]}]"#,
            r#"[{"name":"db","keys":[]}]"#,
            r#"[{"name":"db","keys":[""]}]"#,
        ] {
            assert!(
                matches!(
                    SecretSyncConfig::parse(raw),
                    Err(ConfigError::InvalidSecretEntry { index: 0, .. })
                ),
                "{raw}"
            );
        }
    }

    #[test]
    fn test_empty_prefix_is_no_prefix() {
        let config = SecretSyncConfig::parse(r#"[{"name":"db","keys":["a"],"prefix":""}]"#).unwrap();
        assert_eq!(config.entries()[0].prefix, None);
    }
}
