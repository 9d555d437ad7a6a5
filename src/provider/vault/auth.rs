//! Vault Kubernetes auth session
//!
//! The client token is acquired lazily: the first store call after start-up
//! (or after [`VaultSession::invalidate`]) logs in with the pod's service
//! account JWT. Logins are serialized behind the session lock so concurrent
//! reconciles never race to refresh the same token.

use super::{error_chain, vault_error_message};
use crate::error::StoreError;
use crate::observability::metrics;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Request body for `POST auth/<path>/login`
#[derive(Serialize)]
struct LoginRequest<'a> {
    role: &'a str,
    jwt: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    auth: Option<LoginAuth>,
}

#[derive(Deserialize)]
struct LoginAuth {
    client_token: String,
    #[serde(default)]
    lease_duration: u64,
}

/// Shared Vault credential
pub struct VaultSession {
    http_client: Client,
    base_url: String,
    role: String,
    auth_path: String,
    jwt_path: PathBuf,
    token: Mutex<Option<Zeroizing<String>>>,
}

impl std::fmt::Debug for VaultSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultSession")
            .field("base_url", &self.base_url)
            .field("role", &self.role)
            .field("auth_path", &self.auth_path)
            .field("jwt_path", &self.jwt_path)
            .finish_non_exhaustive()
    }
}

impl VaultSession {
    pub fn new(
        http_client: Client,
        base_url: impl Into<String>,
        role: impl Into<String>,
        auth_path: impl Into<String>,
        jwt_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            role: role.into(),
            auth_path: auth_path.into().trim_matches('/').to_string(),
            jwt_path: jwt_path.into(),
            token: Mutex::new(None),
        }
    }

    /// Current token, logging in first when there is none
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Auth`] when the login fails.
    pub async fn token(&self) -> Result<Zeroizing<String>, StoreError> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref().filter(|t| !t.is_empty()) {
            return Ok(token.clone());
        }

        debug!("No Vault token cached, authenticating");
        let token = self.login().await?;
        *guard = Some(token.clone());
        Ok(token)
    }

    /// Whether a non-empty token is cached
    pub async fn is_authenticated(&self) -> bool {
        self.token
            .lock()
            .await
            .as_ref()
            .is_some_and(|t| !t.is_empty())
    }

    /// Drop the cached token so the next call logs in again
    pub async fn invalidate(&self) {
        if self.token.lock().await.take().is_some() {
            warn!("Vault token rejected, will re-authenticate on next request");
        }
    }

    async fn login(&self) -> Result<Zeroizing<String>, StoreError> {
        let result = self.try_login().await;
        match &result {
            Ok(_) => metrics::increment_auth_attempts("success"),
            Err(e) => {
                metrics::increment_auth_attempts("failed");
                warn!(role = %self.role, error = %e, "Vault authentication failed");
            }
        }
        result
    }

    async fn try_login(&self) -> Result<Zeroizing<String>, StoreError> {
        let jwt = tokio::fs::read_to_string(&self.jwt_path)
            .await
            .map(Zeroizing::new)
            .map_err(|e| {
                StoreError::Auth(format!(
                    "failed to read service account token {}: {e}",
                    self.jwt_path.display()
                ))
            })?;

        let url = format!("{}/v1/auth/{}/login", self.base_url, self.auth_path);
        let response = self
            .http_client
            .post(&url)
            .json(&LoginRequest {
                role: &self.role,
                jwt: jwt.trim(),
            })
            .send()
            .await
            .map_err(|e| StoreError::Auth(format!("failed to authenticate: {}", error_chain(&e))))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Auth(format!(
                "failed to authenticate: {}",
                vault_error_message(status, &body)
            )));
        }

        let login: LoginResponse = response.json().await.map_err(|e| {
            StoreError::Auth(format!("failed to parse login response: {e}"))
        })?;

        let auth = login
            .auth
            .filter(|a| !a.client_token.is_empty())
            .ok_or_else(|| StoreError::Auth("authentication response was empty".to_string()))?;

        info!(
            role = %self.role,
            auth_path = %self.auth_path,
            lease_seconds = auth.lease_duration,
            "Authenticated with Vault"
        );
        Ok(Zeroizing::new(auth.client_token))
    }
}
