//! Core YouTube API client functionality and authentication management.

use crate::credential::{Credential, TokenStore};
use crate::oauth::OAuthManager;
use crate::youtube_api::{
    playlist_items::{PlaylistItem, PlaylistItemListResponse},
    playlists::{Playlist, PlaylistListResponse},
    types::{MAX_PAGE_SIZE, PagedStream, collect_all},
};
use eyre::Context;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_stream::Stream;
use tracing::instrument;

/// How requests made by a [`YouTubeClient`] prove who they are on behalf of.
#[derive(Clone)]
pub enum Authorization {
    /// An OAuth credential sent as `Authorization: Bearer <token>`.
    Bearer(Arc<BearerAuth>),
    /// A developer API key appended to every request as `key=<key>`.
    ///
    /// Only public data can be read this way.
    ApiKey(String),
}

impl fmt::Debug for Authorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bearer(bearer) => f.debug_tuple("Bearer").field(bearer).finish(),
            Self::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
        }
    }
}

/// The user's credential, plus what is needed to refresh it once it is about to expire.
#[derive(Debug)]
pub struct BearerAuth {
    /// Held across a refresh so concurrent requests don't refresh twice.
    credential: Mutex<Credential>,
    refresher: Option<Refresher>,
}

#[derive(Debug)]
struct Refresher {
    oauth_manager: OAuthManager,
    store: TokenStore,
}

impl Authorization {
    /// Bearer authorization with a credential that is never refreshed.
    pub fn bearer(credential: Credential) -> Self {
        Self::Bearer(Arc::new(BearerAuth {
            credential: Mutex::new(credential),
            refresher: None,
        }))
    }

    /// Bearer authorization that refreshes `credential` through `oauth_manager` shortly before
    /// it expires, writing the refreshed credential back to `store`.
    pub fn refreshing(
        credential: Credential,
        oauth_manager: OAuthManager,
        store: TokenStore,
    ) -> Self {
        Self::Bearer(Arc::new(BearerAuth {
            credential: Mutex::new(credential),
            refresher: Some(Refresher {
                oauth_manager,
                store,
            }),
        }))
    }

    pub fn api_key(key: impl Into<String>) -> Self {
        Self::ApiKey(key.into())
    }
}

impl BearerAuth {
    /// Returns the current credential.
    pub async fn credential(&self) -> Credential {
        self.credential.lock().await.clone()
    }

    /// Gets an access token, refreshing the credential first if it is about to expire.
    ///
    /// A credential that cannot be refreshed is used as-is; if it has expired, the API call
    /// made with it fails and that failure is what the caller sees.
    #[instrument(skip(self), level = tracing::Level::TRACE)]
    async fn fresh_access_token(&self) -> eyre::Result<String> {
        let mut credential = self.credential.lock().await;
        if !credential.needs_refresh() {
            return Ok(credential.access_token.clone());
        }

        let Some(refresher) = &self.refresher else {
            tracing::warn!("access token is about to expire and cannot be refreshed");
            return Ok(credential.access_token.clone());
        };

        tracing::debug!("access token is about to expire, attempting refresh");
        match refresher
            .oauth_manager
            .refresh_token(&credential)
            .await
            .context("refresh OAuth token")?
        {
            Some(refreshed) => {
                tracing::debug!("access token successfully refreshed");
                if let Err(e) = refresher.store.save(&refreshed).await {
                    tracing::warn!(error = %e, "could not persist refreshed credential");
                }
                *credential = refreshed;
            }
            None => {
                tracing::warn!("access token could not be refreshed, using it as-is");
            }
        }

        Ok(credential.access_token.clone())
    }
}

/// Client for reading playlists through the YouTube Data API v3.
///
/// Cloning is cheap and clones share the same credential, so a refresh performed through one
/// clone is seen by all of them.
#[derive(Debug, Clone)]
pub struct YouTubeClient {
    authorization: Authorization,
    /// HTTP client for API requests
    client: reqwest::Client,
    /// Base URL of the API, without a trailing slash.
    api_base_url: String,
}

impl YouTubeClient {
    /// Creates a client that sends its requests to `api_base_url` using `client`.
    ///
    /// # Arguments
    ///
    /// * `authorization` - How each request is authorized
    /// * `client` - Shared HTTP client for making API requests
    /// * `api_base_url` - Usually [`crate::config::DEFAULT_API_BASE_URL`]
    pub fn new(
        authorization: Authorization,
        client: reqwest::Client,
        api_base_url: impl Into<String>,
    ) -> Self {
        Self {
            authorization,
            client,
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn authorization(&self) -> &Authorization {
        &self.authorization
    }

    /// Makes an authorized GET request to the `resource` endpoint of the API.
    ///
    /// Non-2xx responses are turned into errors carrying the status and the response body.
    ///
    /// # Returns
    ///
    /// The raw [`reqwest::Response`] for endpoint-specific JSON parsing.
    #[instrument(skip(self), level = tracing::Level::TRACE)]
    pub(crate) async fn make_authenticated_request(
        &self,
        resource: &str,
        query_params: &[(&str, &str)],
    ) -> eyre::Result<reqwest::Response> {
        let url = format!("{}/{resource}", self.api_base_url);
        let mut request = self.client.get(&url).query(query_params);
        request = match &self.authorization {
            Authorization::Bearer(bearer) => {
                request.bearer_auth(bearer.fresh_access_token().await?)
            }
            Authorization::ApiKey(key) => request.query(&[("key", key.as_str())]),
        };

        let response = request
            .send()
            .await
            .with_context(|| format!("send request to YouTube API: {url}"))?;

        let status_code = response.status();
        if !status_code.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(eyre::eyre!(
                "YouTube API request to {url} failed with status {status_code}: {error_text}"
            ));
        }

        Ok(response)
    }

    /// Returns a paginated stream of the playlists owned by the authenticated user.
    ///
    /// Uses the `playlists.list` API with `mine=true`, so it needs bearer authorization; with an
    /// API key the first request fails.
    ///
    /// # Required Scopes
    ///
    /// * `https://www.googleapis.com/auth/youtube.readonly`
    ///
    /// # API Reference
    ///
    /// <https://developers.google.com/youtube/v3/docs/playlists/list>
    #[instrument(skip(self))]
    pub fn my_playlists(&self) -> impl Stream<Item = eyre::Result<Playlist>> + use<'_> {
        PagedStream::new(move |page_token| async move {
            let response = self
                .list_playlists_internal(MAX_PAGE_SIZE, page_token)
                .await?;
            Ok((response.items, response.next_page_token))
        })
    }

    /// Fetches every playlist owned by the authenticated user, following pagination to the end.
    ///
    /// Any failed page fails the whole call; nothing fetched before the failure is returned.
    #[instrument(skip(self))]
    pub async fn list_my_playlists(&self) -> eyre::Result<Vec<Playlist>> {
        let playlists = collect_all(self.my_playlists())
            .await
            .context("list the user's playlists")?;
        tracing::info!(count = playlists.len(), "listed playlists");
        Ok(playlists)
    }

    /// Returns a paginated stream of the items in the playlist `playlist_id`, in playlist order.
    ///
    /// # API Reference
    ///
    /// <https://developers.google.com/youtube/v3/docs/playlistItems/list>
    #[instrument(skip(self))]
    pub fn playlist_items<'a>(
        &'a self,
        playlist_id: &'a str,
    ) -> impl Stream<Item = eyre::Result<PlaylistItem>> + use<'a> {
        PagedStream::new(move |page_token| async move {
            let response = self
                .list_playlist_items_internal(playlist_id, MAX_PAGE_SIZE, page_token)
                .await?;
            Ok((response.items, response.next_page_token))
        })
    }

    /// Fetches every item in the playlist `playlist_id`, following pagination to the end.
    ///
    /// Any failed page fails the whole call; nothing fetched before the failure is returned.
    #[instrument(skip(self))]
    pub async fn list_playlist_items(&self, playlist_id: &str) -> eyre::Result<Vec<PlaylistItem>> {
        let items = collect_all(self.playlist_items(playlist_id))
            .await
            .with_context(|| format!("list items of playlist {playlist_id}"))?;
        tracing::info!(count = items.len(), playlist_id, "listed playlist items");
        Ok(items)
    }

    async fn list_playlists_internal(
        &self,
        max_results: u32,
        page_token: Option<String>,
    ) -> eyre::Result<PlaylistListResponse> {
        let max_results_string = max_results.to_string();
        let mut query_params = vec![
            ("part", "snippet,contentDetails"),
            ("mine", "true"),
            ("maxResults", max_results_string.as_str()),
        ];

        if let Some(ref token) = page_token {
            query_params.push(("pageToken", token.as_str()));
        }

        let response = self
            .make_authenticated_request("playlists", &query_params)
            .await?;

        let playlists: PlaylistListResponse = response
            .json()
            .await
            .context("parse YouTube playlists API response as JSON")?;

        tracing::debug!(
            total_results = playlists.page_info.total_results,
            returned_items = playlists.items.len(),
            has_next_page = playlists.next_page_token.is_some(),
            "fetched playlists"
        );

        Ok(playlists)
    }

    async fn list_playlist_items_internal(
        &self,
        playlist_id: &str,
        max_results: u32,
        page_token: Option<String>,
    ) -> eyre::Result<PlaylistItemListResponse> {
        let max_results_string = max_results.to_string();
        let mut query_params = vec![
            ("part", "snippet,contentDetails"),
            ("playlistId", playlist_id),
            ("maxResults", max_results_string.as_str()),
        ];

        if let Some(ref token) = page_token {
            query_params.push(("pageToken", token.as_str()));
        }

        let response = self
            .make_authenticated_request("playlistItems", &query_params)
            .await?;

        let items: PlaylistItemListResponse = response
            .json()
            .await
            .context("parse YouTube playlistItems API response as JSON")?;

        tracing::debug!(
            playlist_id,
            total_results = items.page_info.total_results,
            returned_items = items.items.len(),
            has_next_page = items.next_page_token.is_some(),
            "fetched playlist items"
        );

        Ok(items)
    }
}
