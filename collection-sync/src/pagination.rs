//! Offset-based pagination over platform collections.
//!
//! A collection endpoint answers `{results, has_more, next_offset}`. The
//! client walks pages from the query's initial offset until `has_more` is
//! false, pausing between requests. Any failed page aborts the walk.

use crate::api::read_json;
use crate::error::FetchError;
use async_trait::async_trait;
use futures::stream::{self, Stream, TryStreamExt};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One page of a remote collection.
#[derive(Debug, Deserialize)]
pub struct RemotePage<T> {
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub next_offset: Option<u64>,
}

/// What to fetch and how far to walk.
#[derive(Debug, Clone)]
pub struct CollectionQuery {
    /// Endpoint path relative to the API base URL (e.g. `/gallery/folders`)
    pub path: String,
    pub limit: u32,
    pub initial_offset: u64,
    /// Stop after this many pages even if the server reports more
    pub max_pages: Option<usize>,
    /// Extra query parameters sent with every page
    pub params: Vec<(String, String)>,
}

impl CollectionQuery {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            limit: 50,
            initial_offset: 0,
            max_pages: None,
            params: Vec::new(),
        }
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.initial_offset = offset;
        self
    }

    pub fn max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = Some(max_pages);
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }
}

/// Delay applied between successive page requests.
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn pause(&self);
}

/// Sleeps for a fixed duration.
pub struct FixedPacer {
    delay: Duration,
}

impl FixedPacer {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Pacer for FixedPacer {
    async fn pause(&self) {
        if !self.delay.is_zero() {
            debug!(delay_ms = self.delay.as_millis() as u64, "Waiting before next page");
            tokio::time::sleep(self.delay).await;
        }
    }
}

enum NextPage {
    At(u64),
    Stop,
}

/// Decide where the walk continues after the page fetched at `offset`.
fn next_page<T>(offset: u64, page: &RemotePage<T>) -> NextPage {
    if !page.has_more {
        debug!("No more pages available");
        return NextPage::Stop;
    }
    match page.next_offset {
        None => {
            warn!(offset, "Server reported more pages but no next_offset, stopping");
            NextPage::Stop
        }
        Some(next) if next <= offset => {
            warn!(offset, next_offset = next, "next_offset does not advance, stopping");
            NextPage::Stop
        }
        Some(next) => NextPage::At(next),
    }
}

struct Walk {
    offset: u64,
    pages: usize,
    done: bool,
}

/// Fetches collections page by page.
pub struct PaginatedClient {
    http: reqwest::Client,
    base_url: String,
    pacer: Arc<dyn Pacer>,
}

impl PaginatedClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, pacer: Arc<dyn Pacer>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            pacer,
        }
    }

    /// Fetch a single page at `offset`.
    pub async fn fetch_page<T: DeserializeOwned>(
        &self,
        access_token: &str,
        query: &CollectionQuery,
        offset: u64,
    ) -> Result<RemotePage<T>, FetchError> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), query.path);

        let mut params: Vec<(&str, String)> = vec![
            ("access_token", access_token.to_string()),
            ("limit", query.limit.to_string()),
            ("offset", offset.to_string()),
        ];
        params.extend(query.params.iter().map(|(k, v)| (k.as_str(), v.clone())));

        debug!(path = %query.path, offset, limit = query.limit, "Fetching page");

        let response = self.http.get(&url).query(&params).send().await?;
        read_json(response).await
    }

    /// Lazily yield every record of the collection in server order.
    ///
    /// The stream ends after the last page, or with the first error.
    pub fn stream_collection<'a, T>(
        &'a self,
        access_token: &'a str,
        query: &'a CollectionQuery,
    ) -> impl Stream<Item = Result<T, FetchError>> + 'a
    where
        T: DeserializeOwned + 'a,
    {
        let start = Walk {
            offset: query.initial_offset,
            pages: 0,
            done: false,
        };

        stream::try_unfold(start, move |walk| self.advance::<T>(access_token, query, walk))
            .map_ok(|results| stream::iter(results.into_iter().map(Ok::<T, FetchError>)))
            .try_flatten()
    }

    /// Fetch the next page of a walk, or finish it.
    async fn advance<T: DeserializeOwned>(
        &self,
        access_token: &str,
        query: &CollectionQuery,
        mut walk: Walk,
    ) -> Result<Option<(Vec<T>, Walk)>, FetchError> {
        if walk.done {
            return Ok(None);
        }
        if let Some(max) = query.max_pages {
            if walk.pages >= max {
                info!(pages = walk.pages, "Reached page limit");
                return Ok(None);
            }
        }
        if walk.pages > 0 {
            self.pacer.pause().await;
        }

        let page: RemotePage<T> = self.fetch_page(access_token, query, walk.offset).await?;
        walk.pages += 1;
        debug!(
            page = walk.pages,
            results = page.results.len(),
            has_more = page.has_more,
            "Fetched page"
        );

        match next_page(walk.offset, &page) {
            NextPage::At(next) => walk.offset = next,
            NextPage::Stop => walk.done = true,
        }
        Ok(Some((page.results, walk)))
    }

    /// Fetch the whole collection. Either every page succeeds or nothing is
    /// returned.
    pub async fn fetch_collection<T: DeserializeOwned>(
        &self,
        access_token: &str,
        query: &CollectionQuery,
    ) -> Result<Vec<T>, FetchError> {
        let records: Vec<T> = self
            .stream_collection(access_token, query)
            .try_collect()
            .await?;
        info!(path = %query.path, total = records.len(), "Collection fetched");
        Ok(records)
    }
}
