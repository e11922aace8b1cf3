//! Error types for the authorization flow and token exchanges.

use thiserror::Error;

/// Errors from the token endpoint.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// The request never produced a response.
    #[error("Token request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a non-success HTTP status.
    #[error("Token endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The body carried neither `status == "success"` nor an access token.
    #[error("Token endpoint rejected the request: {0}")]
    Rejected(String),

    /// A success-shaped response is missing a required field.
    #[error("Token response is missing {0}")]
    MissingField(&'static str),

    /// `expires_in` is not a positive lifetime within range.
    #[error("Token response has an invalid lifetime of {0}s")]
    InvalidLifetime(i64),

    #[error("Failed to parse token response: {0}")]
    Parse(String),
}

/// Errors from the local redirect listener.
#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("Invalid redirect URI {uri}: {reason}")]
    InvalidRedirect { uri: String, reason: String },

    #[error("Failed to bind callback listener on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// The platform redirected back with an `error` parameter.
    #[error("Authorization denied: {error}{}", .description.as_deref().map(|d| format!(" ({d})")).unwrap_or_default())]
    Denied {
        error: String,
        description: Option<String>,
    },

    #[error("Timed out waiting for authorization callback")]
    Timeout,

    #[error("Callback server error: {0}")]
    Server(String),
}

/// Everything that ends an authorization flow in the failed state.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error(transparent)]
    Callback(#[from] CallbackError),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error("Failed to store credential: {0:#}")]
    Store(anyhow::Error),

    #[error("Authorization flow has already been started")]
    AlreadyStarted,
}

impl CallbackError {
    /// Returns true if the user (or platform) refused consent.
    pub fn is_denied(&self) -> bool {
        matches!(self, CallbackError::Denied { .. })
    }
}
