//! Persistent storage for the platform OAuth credential.
//!
//! Exactly one credential is active at a time. Every successful token exchange
//! replaces it wholesale; nothing in this crate deletes it.
//!
//! # Lifecycle
//!
//! ```text
//!   token endpoint ──► IssuedToken (expires_in)
//!                           │
//!                   CredentialStore::save     (stamps expires_at = now + expires_in)
//!                           │
//!                           ▼
//!                      Credential ──► get / is_expired
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use artsync::credentials::{CredentialStore, IssuedToken, SqliteCredentialStore};
//!
//! # fn main() -> anyhow::Result<()> {
//! let store = SqliteCredentialStore::new("data/artsync.db")?;
//!
//! store.save(&IssuedToken {
//!     access_token: "access".to_string(),
//!     refresh_token: "refresh".to_string(),
//!     expires_in: 3600,
//!     token_type: "Bearer".to_string(),
//!     scope: Some("browse".to_string()),
//! })?;
//!
//! if let Some(credential) = store.get()? {
//!     println!("expires at {}", credential.expires_at);
//! }
//! # Ok(())
//! # }
//! ```

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

mod storage;

pub use storage::SqliteCredentialStore;

/// The active OAuth credential.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    /// Access token sent with every API request
    pub access_token: String,

    /// Refresh token used to obtain a new access token
    pub refresh_token: String,

    /// When the access token expires (UTC), derived at save time
    pub expires_at: DateTime<Utc>,

    /// Token type reported by the platform (usually "Bearer")
    pub token_type: String,

    /// Granted scopes, space separated
    pub scope: Option<String>,
}

impl Credential {
    /// Returns true if the access token is expired at `now`.
    ///
    /// The expiry instant itself counts as expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Returns true if the access token is expired right now.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Returns true if a non-empty refresh token is available.
    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.is_empty()
    }
}

/// Longest access token lifetime accepted from a token endpoint (ten years).
pub const MAX_TOKEN_LIFETIME_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Token material as returned by the token endpoint, before it is stored.
#[derive(Clone, Debug, PartialEq)]
pub struct IssuedToken {
    pub access_token: String,
    pub refresh_token: String,
    /// Lifetime of the access token in seconds
    pub expires_in: i64,
    pub token_type: String,
    pub scope: Option<String>,
}

impl IssuedToken {
    /// Turns the issued token into a credential issued at `issued_at`.
    ///
    /// Fails when `expires_in` exceeds [`MAX_TOKEN_LIFETIME_SECS`] or the
    /// expiry cannot be represented.
    pub fn into_credential(self, issued_at: DateTime<Utc>) -> Result<Credential> {
        if self.expires_in > MAX_TOKEN_LIFETIME_SECS {
            return Err(anyhow!("Token lifetime of {}s is out of range", self.expires_in));
        }
        let expires_at = Duration::try_seconds(self.expires_in)
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
            .ok_or_else(|| anyhow!("Token lifetime of {}s is out of range", self.expires_in))?;

        Ok(Credential {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            token_type: self.token_type,
            scope: self.scope,
        })
    }
}

/// Storage for the single active credential.
///
/// Implementations must replace the stored credential atomically on `save`;
/// a reader never observes a mix of old and new fields.
pub trait CredentialStore: Send + Sync {
    /// Returns the active credential, if any.
    fn get(&self) -> Result<Option<Credential>>;

    /// Replaces the active credential with `token`, stamping `expires_at`
    /// from the current time. Returns the stored credential.
    fn save(&self, token: &IssuedToken) -> Result<Credential>;

    /// Returns true if there is no credential or the stored one is expired.
    fn is_expired(&self) -> Result<bool> {
        Ok(match self.get()? {
            Some(credential) => credential.is_expired(),
            None => true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential_expiring_at(expires_at: DateTime<Utc>) -> Credential {
        Credential {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            expires_at,
            token_type: "Bearer".to_string(),
            scope: None,
        }
    }

    #[test]
    fn test_boundary_instant_is_expired() {
        let expires_at = Utc::now();
        let credential = credential_expiring_at(expires_at);

        assert!(credential.is_expired_at(expires_at));
        assert!(credential.is_expired_at(expires_at + Duration::milliseconds(1)));
        assert!(!credential.is_expired_at(expires_at - Duration::milliseconds(1)));
    }

    #[test]
    fn test_into_credential_derives_expiry() {
        let issued_at = Utc::now();
        let token = IssuedToken {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            expires_in: 3600,
            token_type: "Bearer".to_string(),
            scope: Some("browse".to_string()),
        };

        let credential = token.into_credential(issued_at).unwrap();
        assert_eq!(credential.expires_at, issued_at + Duration::seconds(3600));
        assert_eq!(credential.scope.as_deref(), Some("browse"));
    }

    #[test]
    fn test_into_credential_rejects_unrepresentable_lifetime() {
        let token = |expires_in| IssuedToken {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            expires_in,
            token_type: "Bearer".to_string(),
            scope: None,
        };

        assert!(token(10_000_000_000_000).into_credential(Utc::now()).is_err());
        assert!(token(i64::MAX).into_credential(Utc::now()).is_err());
        assert!(token(i64::MIN).into_credential(Utc::now()).is_err());
        assert!(token(MAX_TOKEN_LIFETIME_SECS).into_credential(Utc::now()).is_ok());
    }

    #[test]
    fn test_has_refresh_token() {
        let mut credential = credential_expiring_at(Utc::now());
        assert!(credential.has_refresh_token());

        credential.refresh_token.clear();
        assert!(!credential.has_refresh_token());
    }
}
