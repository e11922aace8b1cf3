//! Interactive authorization code flow.
//!
//! ```text
//! Idle ──► AwaitingCallback ──► CodeReceived ──► Done
//!               │                    │
//!               └──────► Failed ◄────┘
//! ```

use super::callback::CallbackListener;
use super::error::FlowError;
use super::exchange::TokenClient;
use super::provider::build_consent_url;
use crate::config::OAuthConfig;
use crate::credentials::{Credential, CredentialStore};
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Where an authorization flow currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    AwaitingCallback,
    CodeReceived,
    Done,
    Failed,
}

/// Shows the consent URL to the user.
#[async_trait]
pub trait ConsentPresenter: Send + Sync {
    async fn present(&self, consent_url: &str);
}

/// Opens the consent URL in the default browser and logs it for manual use.
pub struct BrowserPresenter;

#[async_trait]
impl ConsentPresenter for BrowserPresenter {
    async fn present(&self, consent_url: &str) {
        info!(url = %consent_url, "Open this URL to authorize artsync");
        if let Err(e) = open::that(consent_url) {
            warn!(error = %e, "Could not open a browser, visit the URL manually");
        }
    }
}

/// A single-use run of the authorization code flow.
pub struct AuthorizationFlow<'a> {
    config: &'a OAuthConfig,
    tokens: &'a TokenClient,
    store: &'a dyn CredentialStore,
    presenter: &'a dyn ConsentPresenter,
    state: FlowState,
}

impl<'a> AuthorizationFlow<'a> {
    pub fn new(
        config: &'a OAuthConfig,
        tokens: &'a TokenClient,
        store: &'a dyn CredentialStore,
        presenter: &'a dyn ConsentPresenter,
    ) -> Self {
        Self {
            config,
            tokens,
            store,
            presenter,
            state: FlowState::Idle,
        }
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    /// Drive the flow to `Done` or `Failed`.
    ///
    /// On success the exchanged credential has been saved and is returned.
    /// There is no retry; a failed flow cannot be run again.
    pub async fn run(&mut self) -> Result<Credential, FlowError> {
        if self.state != FlowState::Idle {
            return Err(FlowError::AlreadyStarted);
        }

        match self.drive().await {
            Ok(credential) => {
                self.transition(FlowState::Done);
                info!(expires_at = %credential.expires_at, "Authorization complete");
                Ok(credential)
            }
            Err(e) => {
                self.transition(FlowState::Failed);
                warn!(error = %e, "Authorization failed");
                Err(e)
            }
        }
    }

    /// The listener is bound on entering `AwaitingCallback`, so a bind
    /// failure fails the flow from that state.
    async fn drive(&mut self) -> Result<Credential, FlowError> {
        self.transition(FlowState::AwaitingCallback);
        let listener = CallbackListener::bind(&self.config.redirect_uri).await?;

        let consent_url = build_consent_url(self.config);
        self.presenter.present(&consent_url).await;

        let grant = listener
            .wait_for_grant(self.config.callback_timeout())
            .await?;
        self.transition(FlowState::CodeReceived);

        let token = self.tokens.exchange_code(&grant.authorization_code).await?;
        self.store.save(&token).map_err(FlowError::Store)
    }

    fn transition(&mut self, next: FlowState) {
        debug!(from = ?self.state, to = ?next, "Authorization flow transition");
        self.state = next;
    }
}
