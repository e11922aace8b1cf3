use super::*;
use crate::credentials::{IssuedToken, SqliteCredentialStore};
use async_trait::async_trait;
use mockito::{Matcher, Mock, Server, ServerGuard};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Counts how often the interactive flow got as far as showing consent.
#[derive(Default)]
struct CountingPresenter {
    calls: AtomicUsize,
}

#[async_trait]
impl ConsentPresenter for CountingPresenter {
    async fn present(&self, _consent_url: &str) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

struct Fixture {
    server: ServerGuard,
    store: Arc<SqliteCredentialStore>,
    presenter: Arc<CountingPresenter>,
    manager: AuthManager,
}

/// A manager whose interactive flow times out immediately.
async fn fixture() -> Fixture {
    let server = Server::new_async().await;
    let config = OAuthConfig {
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        redirect_uri: "http://127.0.0.1:0/callback".to_string(),
        token_url: format!("{}/oauth2/token", server.url()),
        placebo_url: format!("{}/placebo", server.url()),
        callback_timeout_secs: 0,
        ..OAuthConfig::default()
    };
    let store = Arc::new(SqliteCredentialStore::new(":memory:").unwrap());
    let presenter = Arc::new(CountingPresenter::default());
    let manager = AuthManager::new(config, store.clone()).with_presenter(presenter.clone());

    Fixture {
        server,
        store,
        presenter,
        manager,
    }
}

fn seed(store: &SqliteCredentialStore, access: &str, refresh: &str, expires_in: i64) {
    store
        .save(&IssuedToken {
            access_token: access.to_string(),
            refresh_token: refresh.to_string(),
            expires_in,
            token_type: "Bearer".to_string(),
            scope: Some("browse".to_string()),
        })
        .unwrap();
}

async fn mock_placebo(server: &mut ServerGuard, token: &str, status: usize, body: &str) -> Mock {
    server
        .mock("GET", "/placebo")
        .match_query(Matcher::UrlEncoded("access_token".into(), token.into()))
        .with_status(status)
        .with_header("content-type", "application/json")
        .with_body(body)
        .create_async()
        .await
}

async fn mock_refresh(server: &mut ServerGuard, refresh: &str, body: &str) -> Mock {
    server
        .mock("POST", "/oauth2/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
            Matcher::UrlEncoded("refresh_token".into(), refresh.into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
        .create_async()
        .await
}

const SUCCESS: &str = r#"{"status": "success"}"#;

#[cfg(test)]
mod ensure_authenticated_tests {
    use super::*;

    #[tokio::test]
    async fn valid_stored_token_is_accepted() {
        let mut f = fixture().await;
        seed(&f.store, "live", "refresh", 3600);

        let placebo = mock_placebo(&mut f.server, "live", 200, SUCCESS).await;
        let token = f
            .server
            .mock("POST", "/oauth2/token")
            .expect(0)
            .create_async()
            .await;

        assert!(f.manager.ensure_authenticated().await);
        assert_eq!(f.presenter.calls.load(Ordering::SeqCst), 0);

        placebo.assert_async().await;
        token.assert_async().await;
    }

    #[tokio::test]
    async fn failed_validation_triggers_one_refresh() {
        let mut f = fixture().await;
        seed(&f.store, "revoked", "refresh-1", 3600);

        let _placebo = mock_placebo(&mut f.server, "revoked", 401, r#"{"error":"invalid_token"}"#).await;
        let refresh = mock_refresh(
            &mut f.server,
            "refresh-1",
            r#"{"status":"success","access_token":"fresh","refresh_token":"refresh-2","expires_in":3600}"#,
        )
        .await;

        assert!(f.manager.ensure_authenticated().await);
        assert_eq!(f.presenter.calls.load(Ordering::SeqCst), 0);

        let stored = f.store.get().unwrap().unwrap();
        assert_eq!(stored.access_token, "fresh");
        assert_eq!(stored.refresh_token, "refresh-2");

        refresh.assert_async().await;
    }

    #[tokio::test]
    async fn refreshed_token_is_not_refreshed_again() {
        let mut f = fixture().await;
        seed(&f.store, "old", "refresh-1", -60);

        let refresh = mock_refresh(
            &mut f.server,
            "refresh-1",
            r#"{"access_token":"fresh","refresh_token":"refresh-2","expires_in":3600}"#,
        )
        .await;
        let _placebo = mock_placebo(&mut f.server, "fresh", 200, r#"{"status":"error"}"#).await;

        // Validation of the refreshed token fails, so the interactive flow
        // runs (and times out) instead of a second refresh
        assert!(!f.manager.ensure_authenticated().await);
        assert_eq!(f.presenter.calls.load(Ordering::SeqCst), 1);

        refresh.assert_async().await;
    }

    #[tokio::test]
    async fn empty_store_goes_straight_to_authorization() {
        let mut f = fixture().await;

        let placebo = f
            .server
            .mock("GET", "/placebo")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;
        let token = f
            .server
            .mock("POST", "/oauth2/token")
            .expect(0)
            .create_async()
            .await;

        assert!(!f.manager.ensure_authenticated().await);
        assert_eq!(f.presenter.calls.load(Ordering::SeqCst), 1);
        assert!(f.store.get().unwrap().is_none());

        placebo.assert_async().await;
        token.assert_async().await;
    }

    #[tokio::test]
    async fn failed_refresh_falls_back_to_authorization() {
        let mut f = fixture().await;
        seed(&f.store, "revoked", "refresh-1", 3600);

        let _placebo = mock_placebo(&mut f.server, "revoked", 401, "{}").await;
        let refresh = f
            .server
            .mock("POST", "/oauth2/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .expect(1)
            .create_async()
            .await;

        assert!(!f.manager.ensure_authenticated().await);
        assert_eq!(f.presenter.calls.load(Ordering::SeqCst), 1);

        // The old credential is left in place
        assert_eq!(f.store.get().unwrap().unwrap().access_token, "revoked");
        refresh.assert_async().await;
    }

    #[tokio::test]
    async fn absurd_refreshed_lifetime_fails_without_panicking() {
        let mut f = fixture().await;
        seed(&f.store, "old", "refresh-1", -60);

        let refresh = mock_refresh(
            &mut f.server,
            "refresh-1",
            r#"{"access_token":"a","refresh_token":"r","expires_in":10000000000000}"#,
        )
        .await;

        assert!(!f.manager.ensure_authenticated().await);
        assert_eq!(f.store.get().unwrap().unwrap().access_token, "old");
        refresh.assert_async().await;
    }
}

#[cfg(test)]
mod get_valid_token_tests {
    use super::*;

    #[tokio::test]
    async fn unexpired_token_is_returned_without_network() {
        let mut f = fixture().await;
        seed(&f.store, "live", "refresh", 3600);

        let token = f
            .server
            .mock("POST", "/oauth2/token")
            .expect(0)
            .create_async()
            .await;

        let credential = f.manager.get_valid_token().await.unwrap();
        assert_eq!(credential.access_token, "live");
        token.assert_async().await;
    }

    #[tokio::test]
    async fn expired_token_is_refreshed() {
        let mut f = fixture().await;
        seed(&f.store, "old", "refresh-1", -1);

        let refresh = mock_refresh(
            &mut f.server,
            "refresh-1",
            r#"{"access_token":"fresh","refresh_token":"refresh-2","expires_in":3600}"#,
        )
        .await;

        let credential = f.manager.get_valid_token().await.unwrap();
        assert_eq!(credential.access_token, "fresh");
        assert!(!credential.is_expired());

        let stored = f.store.get().unwrap().unwrap();
        assert_eq!(stored.refresh_token, "refresh-2");
        refresh.assert_async().await;
    }

    #[tokio::test]
    async fn empty_store_returns_none() {
        let f = fixture().await;
        assert!(f.manager.get_valid_token().await.is_none());
        assert_eq!(f.presenter.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn expired_without_refresh_token_returns_none() {
        let mut f = fixture().await;
        seed(&f.store, "old", "", -1);

        let token = f
            .server
            .mock("POST", "/oauth2/token")
            .expect(0)
            .create_async()
            .await;

        assert!(f.manager.get_valid_token().await.is_none());
        token.assert_async().await;
    }
}

#[cfg(test)]
mod validate_tests {
    use super::*;

    #[tokio::test]
    async fn success_status_is_valid() {
        let mut f = fixture().await;
        let _m = mock_placebo(&mut f.server, "tok", 200, SUCCESS).await;
        assert!(f.manager.validate("tok").await);
    }

    #[tokio::test]
    async fn non_success_status_field_is_invalid() {
        let mut f = fixture().await;
        let _m = mock_placebo(&mut f.server, "tok", 200, r#"{"status":"error"}"#).await;
        assert!(!f.manager.validate("tok").await);
    }

    #[tokio::test]
    async fn http_error_is_invalid() {
        let mut f = fixture().await;
        let _m = mock_placebo(&mut f.server, "tok", 401, SUCCESS).await;
        assert!(!f.manager.validate("tok").await);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_invalid() {
        let config = OAuthConfig {
            placebo_url: "http://127.0.0.1:9/placebo".to_string(),
            ..OAuthConfig::default()
        };
        let store = Arc::new(SqliteCredentialStore::new(":memory:").unwrap());
        let manager = AuthManager::new(config, store);

        assert!(!manager.validate("tok").await);
    }
}
