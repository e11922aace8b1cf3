//! Credential lifecycle management.
//!
//! [`AuthManager`] decides whether the stored credential can be used as is,
//! refreshes it when it has expired, and falls back to the interactive
//! authorization flow when neither works.

use crate::config::OAuthConfig;
use crate::credentials::{Credential, CredentialStore};
use crate::oauth::{AuthorizationFlow, BrowserPresenter, ConsentPresenter, TokenClient};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

#[cfg(test)]
mod tests;

/// Placebo endpoint response
#[derive(Deserialize)]
struct PlaceboResponse {
    #[serde(default)]
    status: Option<String>,
}

/// Keeps the platform credential usable.
///
/// One manager serializes its own operations with an internal lock. It does
/// not coordinate with other managers sharing the same store.
pub struct AuthManager {
    config: OAuthConfig,
    store: Arc<dyn CredentialStore>,
    tokens: TokenClient,
    presenter: Arc<dyn ConsentPresenter>,
    http: reqwest::Client,
    lock: Mutex<()>,
}

impl AuthManager {
    /// Creates a manager that presents consent in the default browser.
    pub fn new(config: OAuthConfig, store: Arc<dyn CredentialStore>) -> Self {
        let http = reqwest::Client::new();
        Self {
            tokens: TokenClient::with_http(http.clone(), &config),
            config,
            store,
            presenter: Arc::new(BrowserPresenter),
            http,
            lock: Mutex::new(()),
        }
    }

    /// Replaces the consent presenter (headless runs, tests).
    pub fn with_presenter(mut self, presenter: Arc<dyn ConsentPresenter>) -> Self {
        self.presenter = presenter;
        self
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Make sure a working credential is stored, authorizing interactively if
    /// needed.
    ///
    /// 1. A stored, unexpired (or freshly refreshed) token that passes
    ///    [`validate`](Self::validate) is accepted.
    /// 2. A token that fails validation gets one refresh attempt, unless this
    ///    call already refreshed it.
    /// 3. Otherwise the full authorization flow runs.
    ///
    /// An empty store goes straight to step 3.
    pub async fn ensure_authenticated(&self) -> bool {
        let _guard = self.lock.lock().await;

        let mut refreshed = false;
        if let Some(credential) = self.valid_token_locked(&mut refreshed).await {
            if self.validate(&credential.access_token).await {
                info!(expires_at = %credential.expires_at, "Stored token is valid");
                return true;
            }

            if refreshed {
                warn!("Refreshed token failed validation");
            } else {
                warn!("Stored token failed validation, refreshing");
                if self.refresh(&credential).await.is_some() {
                    return true;
                }
            }
        }

        info!("Starting interactive authorization");
        let mut flow = AuthorizationFlow::new(
            &self.config,
            &self.tokens,
            self.store.as_ref(),
            self.presenter.as_ref(),
        );
        flow.run().await.is_ok()
    }

    /// Returns the stored credential, refreshing it first if it has expired.
    ///
    /// Returns `None` when the store is empty or the refresh fails. Never
    /// starts the interactive flow.
    pub async fn get_valid_token(&self) -> Option<Credential> {
        let _guard = self.lock.lock().await;
        let mut refreshed = false;
        self.valid_token_locked(&mut refreshed).await
    }

    /// Ask the placebo endpoint whether `access_token` is live.
    ///
    /// Only an HTTP success with `status == "success"` counts; everything
    /// else, transport failures included, is treated as invalid.
    pub async fn validate(&self, access_token: &str) -> bool {
        let response = match self
            .http
            .get(&self.config.placebo_url)
            .query(&[("access_token", access_token)])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Token validation request failed");
                return false;
            }
        };

        let status = response.status();
        if !status.is_success() {
            debug!(%status, "Token rejected by placebo endpoint");
            return false;
        }

        match response.json::<PlaceboResponse>().await {
            Ok(body) => body.status.as_deref() == Some("success"),
            Err(e) => {
                warn!(error = %e, "Failed to parse placebo response");
                false
            }
        }
    }

    async fn valid_token_locked(&self, refreshed: &mut bool) -> Option<Credential> {
        let credential = match self.store.get() {
            Ok(Some(credential)) => credential,
            Ok(None) => {
                debug!("No stored credential");
                return None;
            }
            Err(e) => {
                error!(error = %format!("{:#}", e), "Failed to read credential store");
                return None;
            }
        };

        if !credential.is_expired() {
            return Some(credential);
        }

        info!(expired_at = %credential.expires_at, "Access token expired, refreshing");
        *refreshed = true;
        self.refresh(&credential).await
    }

    async fn refresh(&self, credential: &Credential) -> Option<Credential> {
        if !credential.has_refresh_token() {
            warn!("Stored credential has no refresh token");
            return None;
        }

        let token = match self.tokens.exchange_refresh(&credential.refresh_token).await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                return None;
            }
        };

        match self.store.save(&token) {
            Ok(credential) => {
                info!(expires_at = %credential.expires_at, "OAuth token refreshed successfully");
                Some(credential)
            }
            Err(e) => {
                error!(error = %format!("{:#}", e), "Failed to persist refreshed credential");
                None
            }
        }
    }
}
