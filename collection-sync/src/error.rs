use thiserror::Error;

/// Errors from platform API requests.
///
/// None of these are retried; a failed page aborts the whole fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("API request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// HTTP 429 or a `user_api_threshold` error body.
    #[error("API rate limit reached: {0}")]
    RateLimited(String),

    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode API response: {0}")]
    Decode(String),
}

impl FetchError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::RateLimited(_))
    }
}
