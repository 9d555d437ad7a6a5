//! Vault REST client
//!
//! Writes go to `POST /v1/<path>` with the already-shaped JSON body, deletes to
//! `DELETE /v1/<path>`. A 403 that reports an invalid token or denied
//! permission drops the cached token; the error is still returned and the
//! next reconcile logs in again.

use super::{error_chain, vault_error_message, VaultSession, TOKEN_HEADER};
use crate::config::ControllerConfig;
use crate::constants::STORE_CHECK_TIMEOUT_SECS;
use crate::error::StoreError;
use crate::provider::SecretStoreProvider;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, debug_span, info, Instrument};

/// Vault client implementing [`SecretStoreProvider`]
pub struct VaultClient {
    http_client: Client,
    base_url: String,
    session: Arc<VaultSession>,
    check_timeout: Duration,
}

impl std::fmt::Debug for VaultClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultClient")
            .field("base_url", &self.base_url)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl VaultClient {
    pub fn new(http_client: Client, base_url: impl Into<String>, session: Arc<VaultSession>) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
            check_timeout: Duration::from_secs(STORE_CHECK_TIMEOUT_SECS),
        }
    }

    /// Build a client and its session from controller configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &ControllerConfig) -> Result<Self> {
        // Create HTTP client with rustls (configured in Cargo.toml)
        let http_client = Client::builder()
            .build()
            .context("Failed to create HTTP client")?;

        info!(
            "Initializing Vault client for {} (role: {}, auth path: {})",
            config.vault_addr, config.vault_role, config.vault_auth_path
        );

        let session = Arc::new(VaultSession::new(
            http_client.clone(),
            config.vault_addr.clone(),
            config.vault_role.clone(),
            config.vault_auth_path.clone(),
            config.vault_token_path.clone(),
        ));

        Ok(Self::new(http_client, config.vault_addr.clone(), session))
    }

    #[must_use]
    pub fn session(&self) -> &Arc<VaultSession> {
        &self.session
    }

    fn make_request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/v1/{}", self.base_url, path.trim_start_matches('/'));
        self.http_client.request(method, url)
    }

    /// Map a non-success response to a classified error, invalidating the session on token rejection
    async fn check_response(
        &self,
        operation: &'static str,
        path: &str,
        response: Response,
    ) -> Result<(), StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let message = vault_error_message(status, &body);

        if status == StatusCode::FORBIDDEN {
            let lower = message.to_lowercase();
            if lower.contains("invalid token") || lower.contains("permission denied") {
                self.session.invalidate().await;
            }
        }

        Err(StoreError::operation(operation, path, message))
    }
}

#[async_trait]
impl SecretStoreProvider for VaultClient {
    async fn write_secret(&self, path: &str, payload: &Value) -> Result<(), StoreError> {
        let span = debug_span!("vault.secret.write", secret.path = path);
        async move {
            let token = self.session.token().await?;
            let response = self
                .make_request(Method::POST, path)
                .header(TOKEN_HEADER, token.as_str())
                .json(payload)
                .send()
                .await
                .map_err(|e| StoreError::operation("write", path, error_chain(&e)))?;

            self.check_response("write", path, response).await?;
            debug!("Wrote Vault secret at {}", path);
            Ok(())
        }
        .instrument(span)
        .await
    }

    async fn delete_secret(&self, path: &str) -> Result<(), StoreError> {
        let span = debug_span!("vault.secret.delete", secret.path = path);
        async move {
            let token = self.session.token().await?;
            let response = self
                .make_request(Method::DELETE, path)
                .header(TOKEN_HEADER, token.as_str())
                .send()
                .await
                .map_err(|e| StoreError::operation("delete", path, error_chain(&e)))?;

            self.check_response("delete", path, response).await?;
            info!("Deleted Vault secret at {}", path);
            Ok(())
        }
        .instrument(span)
        .await
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        let response = self
            .make_request(Method::GET, "sys/health")
            .timeout(self.check_timeout)
            .send()
            .await
            .map_err(|e| {
                StoreError::Unhealthy(format!("vault health check failed: {}", error_chain(&e)))
            })?;

        // Standby (429) and sealed (503) still count as reachable
        match response.status() {
            StatusCode::OK | StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => {
                Ok(())
            }
            status => Err(StoreError::Unhealthy(format!(
                "vault health check returned unexpected status: {}",
                status.as_u16()
            ))),
        }
    }

    async fn readiness_check(&self) -> Result<(), StoreError> {
        self.health_check().await?;

        // Readiness reports the session, it never logs in
        if !self.session.is_authenticated().await {
            return Err(StoreError::Unhealthy(
                "vault client is not authenticated".to_string(),
            ));
        }
        let token = self.session.token().await?;
        let response = self
            .make_request(Method::GET, "auth/token/lookup-self")
            .header(TOKEN_HEADER, token.as_str())
            .timeout(self.check_timeout)
            .send()
            .await
            .map_err(|e| {
                StoreError::Unhealthy(format!(
                    "vault authentication check failed: {}",
                    error_chain(&e)
                ))
            })?;

        self.check_response("lookup", "auth/token/lookup-self", response)
            .await
            .map_err(|e| StoreError::Unhealthy(format!("vault authentication check failed: {e}")))
    }
}
