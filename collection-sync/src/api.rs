use crate::error::FetchError;
use crate::pagination::{CollectionQuery, FixedPacer, Pacer, PaginatedClient};
use artsync::config::ApiConfig;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

/// Authenticated user, as returned by `/user/whoami`.
#[derive(Debug, Clone, Deserialize)]
pub struct WhoAmI {
    pub userid: String,
    pub username: String,
    pub usericon: String,
    #[serde(rename = "type")]
    pub user_type: String,
}

/// Counters attached to a profile.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileStats {
    pub user_deviations: Option<i64>,
    pub user_favourites: Option<i64>,
    pub user_comments: Option<i64>,
    pub profile_pageviews: Option<i64>,
    pub profile_comments: Option<i64>,
}

/// Extended profile, as returned by `/user/profile/{username}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Profile {
    pub is_watching: Option<bool>,
    pub profile_url: Option<String>,
    pub user_is_artist: Option<bool>,
    pub artist_level: Option<String>,
    pub artist_specialty: Option<String>,
    pub real_name: Option<String>,
    pub tagline: Option<String>,
    pub countryid: Option<i64>,
    pub country: Option<String>,
    pub website: Option<String>,
    pub bio: Option<String>,
    #[serde(default)]
    pub stats: Option<ProfileStats>,
}

/// Gallery folder from `/gallery/folders`.
#[derive(Debug, Clone, Deserialize)]
pub struct GalleryFolder {
    pub folderid: String,
    pub name: String,
    pub parent: Option<String>,
    pub size: Option<i64>,
}

/// Filters for the gallery folder listing.
#[derive(Debug, Clone)]
pub struct GalleryFolderOptions {
    /// Whose galleries to list; the authenticated user when absent
    pub username: Option<String>,
    pub calculate_size: bool,
    pub filter_empty: bool,
}

impl Default for GalleryFolderOptions {
    fn default() -> Self {
        Self {
            username: None,
            calculate_size: true,
            filter_empty: false,
        }
    }
}

/// HTTP client for the platform REST API.
///
/// The access token goes in the `access_token` query parameter on every call.
pub struct PlatformClient {
    http: Client,
    base_url: String,
    page_limit: u32,
    pages: PaginatedClient,
}

impl PlatformClient {
    /// Create a client that paces pages with the configured delay.
    pub fn new(config: &ApiConfig) -> Self {
        Self::with_pacer(config, Arc::new(FixedPacer::new(config.page_delay())))
    }

    pub fn with_pacer(config: &ApiConfig, pacer: Arc<dyn Pacer>) -> Self {
        let http = Client::new();
        Self {
            pages: PaginatedClient::new(http.clone(), config.base_url.clone(), pacer),
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            page_limit: config.page_limit,
        }
    }

    /// Fetch the authenticated user.
    pub async fn whoami(&self, access_token: &str) -> Result<WhoAmI, FetchError> {
        self.get_json("/user/whoami", access_token, &[]).await
    }

    /// Fetch a user's extended profile, without collection or gallery details.
    pub async fn profile(&self, access_token: &str, username: &str) -> Result<Profile, FetchError> {
        let path = format!("/user/profile/{}", urlencoding::encode(username));
        self.get_json(
            &path,
            access_token,
            &[("ext_collections", "0"), ("ext_galleries", "0")],
        )
        .await
    }

    /// Fetch every gallery folder across all pages.
    pub async fn gallery_folders(
        &self,
        access_token: &str,
        options: &GalleryFolderOptions,
    ) -> Result<Vec<GalleryFolder>, FetchError> {
        let mut query = CollectionQuery::new("/gallery/folders")
            .limit(self.page_limit)
            .param("calculate_size", bool_param(options.calculate_size))
            .param("filter_empty_folder", bool_param(options.filter_empty));
        if let Some(username) = &options.username {
            query = query.param("username", username.clone());
        }

        self.pages.fetch_collection(access_token, &query).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        access_token: &str,
        params: &[(&str, &str)],
    ) -> Result<T, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(path, "Platform API request");

        let response = self
            .http
            .get(&url)
            .query(&[("access_token", access_token)])
            .query(params)
            .send()
            .await?;
        read_json(response).await
    }
}

fn bool_param(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// Read a response body and decode it, mapping failures to [`FetchError`].
///
/// - 429, or an error body naming `user_api_threshold` → rate limited
/// - Other non-2xx → status error carrying the body
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, FetchError> {
    let status = response.status();
    let body = response.text().await?;

    if status == StatusCode::TOO_MANY_REQUESTS || is_threshold_error(&body) {
        return Err(FetchError::RateLimited(body));
    }
    if !status.is_success() {
        return Err(FetchError::Status {
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))
}

fn is_threshold_error(body: &str) -> bool {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<String>,
    }

    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .is_some_and(|e| e == "user_api_threshold")
}
