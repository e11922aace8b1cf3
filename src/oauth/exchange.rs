//! Token endpoint client.
//!
//! Handles the two grants the platform supports: exchanging an authorization
//! code and exchanging a refresh token. Each call makes exactly one request.

use super::error::ExchangeError;
use crate::config::OAuthConfig;
use crate::credentials::{IssuedToken, MAX_TOKEN_LIFETIME_SECS};
use serde::Deserialize;
use tracing::debug;

/// Token endpoint response.
///
/// Every field is optional; which ones are required depends on the grant.
#[derive(Deserialize, Debug, Default)]
struct TokenResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

impl TokenResponse {
    fn is_success(&self) -> bool {
        self.status.as_deref() == Some("success") || self.access_token.is_some()
    }

    fn rejection_reason(&self) -> String {
        self.error_description
            .clone()
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| "response has neither status nor access_token".to_string())
    }
}

/// Client for the platform token endpoint
#[derive(Clone)]
pub struct TokenClient {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl TokenClient {
    pub fn new(config: &OAuthConfig) -> Self {
        Self::with_http(reqwest::Client::new(), config)
    }

    /// Creates a client that shares an existing connection pool.
    pub fn with_http(http: reqwest::Client, config: &OAuthConfig) -> Self {
        Self {
            http,
            token_url: config.token_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
        }
    }

    /// Exchange an authorization code for a token.
    ///
    /// The platform must return an access token, a refresh token and a
    /// lifetime; anything less is an error.
    pub async fn exchange_code(&self, code: &str) -> Result<IssuedToken, ExchangeError> {
        debug!(token_url = %self.token_url, "Exchanging authorization code");

        let form = [
            ("grant_type", "authorization_code"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];
        let response = self.request(&form).await?;
        let refresh_token = response
            .refresh_token
            .clone()
            .ok_or(ExchangeError::MissingField("refresh_token"))?;

        into_issued(response, refresh_token)
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// If the platform does not rotate the refresh token, the presented one is
    /// kept so the resulting credential stays refreshable.
    pub async fn exchange_refresh(&self, refresh_token: &str) -> Result<IssuedToken, ExchangeError> {
        debug!(token_url = %self.token_url, "Exchanging refresh token");

        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ];
        let response = self.request(&form).await?;
        let rotated = response
            .refresh_token
            .clone()
            .unwrap_or_else(|| refresh_token.to_string());

        into_issued(response, rotated)
    }

    async fn request(&self, form: &[(&str, &str)]) -> Result<TokenResponse, ExchangeError> {
        let response = self
            .http
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ExchangeError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let token_response: TokenResponse =
            serde_json::from_str(&body).map_err(|e| ExchangeError::Parse(e.to_string()))?;

        if !token_response.is_success() {
            return Err(ExchangeError::Rejected(token_response.rejection_reason()));
        }

        debug!(
            has_refresh_token = token_response.refresh_token.is_some(),
            expires_in = ?token_response.expires_in,
            "Token exchange successful"
        );

        Ok(token_response)
    }
}

fn into_issued(response: TokenResponse, refresh_token: String) -> Result<IssuedToken, ExchangeError> {
    let access_token = response
        .access_token
        .ok_or(ExchangeError::MissingField("access_token"))?;
    let expires_in = response
        .expires_in
        .ok_or(ExchangeError::MissingField("expires_in"))?;
    if expires_in <= 0 || expires_in > MAX_TOKEN_LIFETIME_SECS {
        return Err(ExchangeError::InvalidLifetime(expires_in));
    }

    Ok(IssuedToken {
        access_token,
        refresh_token,
        expires_in,
        token_type: response.token_type.unwrap_or_else(|| "Bearer".to_string()),
        scope: response.scope,
    })
}
