//! OAuth 2.0 authorization code flow against the platform.
//!
//! 1. Bind a loopback listener on the redirect URI's port
//! 2. Show the consent URL (browser + log)
//! 3. User authorizes on the platform's site
//! 4. Platform redirects to the listener with `code` (or `error`)
//! 5. Exchange the code at the token endpoint and save the credential
//!
//! Refreshing an existing credential goes through the same [`TokenClient`].

pub mod callback;
pub mod error;
mod exchange;
mod flow;
mod provider;

pub use callback::{AuthorizationGrant, CallbackListener};
pub use error::{CallbackError, ExchangeError, FlowError};
pub use exchange::TokenClient;
pub use flow::{AuthorizationFlow, BrowserPresenter, ConsentPresenter, FlowState};
pub use provider::build_consent_url;
