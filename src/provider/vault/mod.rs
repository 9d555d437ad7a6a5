//! # Vault Provider
//!
//! HashiCorp Vault over its HTTP API (`<addr>/v1/<path>`, `X-Vault-Token` header).
//!
//! - [`VaultSession`] owns the client token and performs Kubernetes auth logins
//! - [`VaultClient`] implements [`crate::provider::SecretStoreProvider`]
//!
//! References:
//! - [Vault HTTP API](https://developer.hashicorp.com/vault/api-docs)
//! - [Kubernetes auth method](https://developer.hashicorp.com/vault/api-docs/auth/kubernetes)

mod auth;
mod client;

pub use auth::VaultSession;
pub use client::VaultClient;

use reqwest::StatusCode;
use serde::Deserialize;

/// Header carrying the client token
pub(crate) const TOKEN_HEADER: &str = "X-Vault-Token";

/// Vault API error body: `{"errors": ["..."]}`
#[derive(Debug, Deserialize)]
struct VaultErrorResponse {
    #[serde(default)]
    errors: Vec<String>,
}

/// Render a non-success response the way the Vault CLI does, keeping the status code
/// in the text so the error classifier can see it.
pub(crate) fn vault_error_message(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<VaultErrorResponse>(body) {
        Ok(response) if !response.errors.is_empty() => format!(
            "Code: {}. Errors: {}",
            status.as_u16(),
            response.errors.join("; ")
        ),
        _ => format!("Code: {}. {}", status.as_u16(), body.trim()),
    }
}

/// Flatten an error and its sources into one line.
///
/// `reqwest` reports "error sending request" at the top level; the useful part
/// ("Connection refused", "operation timed out") sits further down the chain.
pub(crate) fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vault_error_message_parses_errors_array() {
        let message = vault_error_message(
            StatusCode::FORBIDDEN,
            r#"{"errors":["1 error occurred:\n\t* permission denied\n\n"]}"#,
        );
        assert!(message.starts_with("Code: 403. Errors: "));
        assert!(message.contains("permission denied"));
    }

    #[test]
    fn test_vault_error_message_falls_back_to_body() {
        let message = vault_error_message(StatusCode::BAD_GATEWAY, "upstream failed\n");
        assert_eq!(message, "Code: 502. upstream failed");
    }
}
