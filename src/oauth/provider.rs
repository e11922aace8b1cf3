//! Consent URL construction.

use crate::config::OAuthConfig;

/// Build the URL the user visits to grant access.
pub fn build_consent_url(config: &OAuthConfig) -> String {
    format!(
        "{}?response_type=code&client_id={}&redirect_uri={}&scope={}",
        config.authorize_url,
        urlencoding::encode(&config.client_id),
        urlencoding::encode(&config.redirect_uri),
        urlencoding::encode(&config.scope_string()),
    )
}
