//! Local redirect listener for the authorization code flow.
//!
//! The listener binds the port of the configured redirect URI, serves exactly
//! the redirect path and hands the first authorization outcome back over a
//! oneshot channel. It is torn down on every exit path.

use super::error::CallbackError;
use axum::{
    extract::{Query, State},
    http::{StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use url::Host;

/// How long in-flight responses get to flush before the server task is aborted.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Authorization code received on the redirect, valid for a single exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizationGrant {
    pub authorization_code: String,
    pub received_at: DateTime<Utc>,
}

/// Query parameters of the redirect request.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

enum CallbackOutcome {
    Code(String),
    Error {
        error: String,
        description: Option<String>,
    },
    Invalid,
}

impl CallbackParams {
    fn outcome(self) -> CallbackOutcome {
        if let Some(code) = self.code.filter(|c| !c.is_empty()) {
            return CallbackOutcome::Code(code);
        }
        match self.error.filter(|e| !e.is_empty()) {
            Some(error) => CallbackOutcome::Error {
                error,
                description: self.error_description,
            },
            None => CallbackOutcome::Invalid,
        }
    }
}

type GrantSender = oneshot::Sender<Result<AuthorizationGrant, CallbackError>>;

/// Shared state for the callback handler
struct CallbackState {
    tx: Mutex<Option<GrantSender>>,
}

impl CallbackState {
    fn new(tx: GrantSender) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
        }
    }

    /// Delivers the first outcome; later ones are dropped.
    fn deliver(&self, result: Result<AuthorizationGrant, CallbackError>) {
        let sender = match self.tx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match sender {
            Some(tx) => {
                let _ = tx.send(result);
            }
            None => debug!("Ignoring callback after the flow already resolved"),
        }
    }
}

/// A bound, not yet serving, redirect listener.
pub struct CallbackListener {
    listener: TcpListener,
    path: String,
    addr: SocketAddr,
}

impl CallbackListener {
    /// Bind the loopback host and port named by `redirect_uri`.
    ///
    /// `localhost` binds the first address it resolves to, which is the one
    /// the browser tries first. Non-loopback hosts are rejected. Binding
    /// happens before the consent URL is shown so that a port clash fails the
    /// flow up front.
    pub async fn bind(redirect_uri: &str) -> Result<Self, CallbackError> {
        let invalid = |reason: &str| CallbackError::InvalidRedirect {
            uri: redirect_uri.to_string(),
            reason: reason.to_string(),
        };

        let url = url::Url::parse(redirect_uri).map_err(|e| invalid(&e.to_string()))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| invalid("no port"))?;
        let path = match url.path() {
            "" => "/".to_string(),
            p => p.to_string(),
        };

        let bound = match url.host() {
            Some(Host::Domain(domain)) if domain.eq_ignore_ascii_case("localhost") => {
                TcpListener::bind((domain, port)).await
            }
            Some(Host::Ipv4(ip)) if ip.is_loopback() => TcpListener::bind((ip, port)).await,
            Some(Host::Ipv6(ip)) if ip.is_loopback() => TcpListener::bind((ip, port)).await,
            _ => return Err(invalid("host is not a loopback address")),
        };
        let listener = bound.map_err(|source| CallbackError::Bind { port, source })?;
        let addr = listener
            .local_addr()
            .map_err(|source| CallbackError::Bind { port, source })?;

        debug!(%addr, path = %path, "Callback listener bound");

        Ok(Self {
            listener,
            path,
            addr,
        })
    }

    /// The port actually bound (differs from the URI only when it named port 0).
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Serve the redirect path until an outcome arrives or `timeout` elapses.
    ///
    /// Requests without `code` or `error` are answered with 400 and the
    /// listener keeps waiting.
    pub async fn wait_for_grant(
        self,
        timeout: Duration,
    ) -> Result<AuthorizationGrant, CallbackError> {
        let (tx, rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let app = router(&self.path, Arc::new(CallbackState::new(tx)));
        let listener = self.listener;

        info!(
            addr = %self.addr,
            path = %self.path,
            timeout_secs = timeout.as_secs(),
            "Waiting for authorization callback"
        );

        let mut server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        let outcome = tokio::select! {
            result = rx => {
                result.unwrap_or_else(|_| {
                    Err(CallbackError::Server("Callback channel closed unexpectedly".into()))
                })
            }
            _ = tokio::time::sleep(timeout) => Err(CallbackError::Timeout),
            result = &mut server => match result {
                Ok(Ok(())) => Err(CallbackError::Server("Server shut down unexpectedly".into())),
                Ok(Err(e)) => Err(CallbackError::Server(format!("Server error: {}", e))),
                Err(e) => Err(CallbackError::Server(format!("Server task failed: {}", e))),
            },
        };

        let _ = shutdown_tx.send(());
        if !server.is_finished() && tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await.is_err()
        {
            warn!("Callback server did not stop in time, aborting");
            server.abort();
        }
        debug!(addr = %self.addr, "Callback listener released");

        outcome
    }
}

fn router(path: &str, state: Arc<CallbackState>) -> Router {
    Router::new()
        .route(path, get(handle_callback))
        .fallback(handle_unknown)
        .with_state(state)
}

async fn handle_callback(
    State(state): State<Arc<CallbackState>>,
    Query(params): Query<CallbackParams>,
) -> Response {
    match params.outcome() {
        CallbackOutcome::Code(authorization_code) => {
            info!("Authorization code received");
            state.deliver(Ok(AuthorizationGrant {
                authorization_code,
                received_at: Utc::now(),
            }));
            (StatusCode::OK, Html(SUCCESS_HTML)).into_response()
        }
        CallbackOutcome::Error { error, description } => {
            warn!(error = %error, description = ?description, "Authorization denied");
            let page = error_page(&error, description.as_deref());
            state.deliver(Err(CallbackError::Denied { error, description }));
            (StatusCode::BAD_REQUEST, Html(page)).into_response()
        }
        CallbackOutcome::Invalid => {
            debug!("Callback without code or error");
            (StatusCode::BAD_REQUEST, Html(INVALID_HTML)).into_response()
        }
    }
}

async fn handle_unknown(uri: Uri) -> impl IntoResponse {
    debug!(path = %uri.path(), "Ignoring request outside the redirect path");
    (StatusCode::NOT_FOUND, Html(NOT_FOUND_HTML))
}

fn error_page(error: &str, description: Option<&str>) -> String {
    let description = description
        .map(|d| format!("<p>{}</p>", escape_html(d)))
        .unwrap_or_default();
    format!(
        "<!DOCTYPE html><html><head><title>Authorization failed</title></head>\
         <body><h1>Authorization failed</h1><p>Error: {}</p>{}\
         <p>You can close this window.</p></body></html>",
        escape_html(error),
        description
    )
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

const SUCCESS_HTML: &str = "<!DOCTYPE html><html><head><title>Authorization complete</title></head>\
<body><h1>Authorization complete</h1><p>You can close this window and return to the terminal.</p></body></html>";

const INVALID_HTML: &str = "<!DOCTYPE html><html><head><title>Invalid request</title></head>\
<body><h1>Invalid request</h1><p>The callback carried neither an authorization code nor an error.</p></body></html>";

const NOT_FOUND_HTML: &str = "<!DOCTYPE html><html><body><h1>Not found</h1></body></html>";
