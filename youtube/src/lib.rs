use crate::config::{ClientSecrets, Config};
use crate::credential::TokenStore;
use crate::youtube_api::{Authorization, Playlist, PlaylistItem, YouTubeClient};
use eyre::Context;

pub mod callback;
pub mod config;
pub mod credential;
pub mod oauth;
pub mod youtube_api;

/// How [`obtain_client`] authorizes the client it returns.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthMode {
    /// Use the cached user credential, or ask the user for consent in their browser if there is
    /// none.
    Interactive,
    /// Use a developer API key. Only public data is readable.
    ApiKey(String),
}

impl std::fmt::Debug for AuthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Interactive => f.write_str("Interactive"),
            Self::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
        }
    }
}

/// Produces an authorized YouTube client.
///
/// With [`AuthMode::ApiKey`] nothing is read from disk and no request is made.
///
/// With [`AuthMode::Interactive`] the OAuth client secrets at `config.credentials_path` are
/// required. A credential cached at `config.token_path` is used as-is, without checking that it
/// still works. Otherwise the user is sent through the consent flow and the credential it yields
/// is written to `config.token_path` before the client is returned.
#[tracing::instrument(skip(config))]
pub async fn obtain_client(mode: AuthMode, config: &Config) -> eyre::Result<YouTubeClient> {
    let http_client = reqwest::Client::new();

    let secrets = match mode {
        AuthMode::ApiKey(key) => {
            tracing::debug!("using API key authorization");
            return Ok(YouTubeClient::new(
                Authorization::api_key(key),
                http_client,
                config.api_base_url.clone(),
            ));
        }
        AuthMode::Interactive => ClientSecrets::from_file(&config.credentials_path)
            .await
            .context("load OAuth client secrets")?,
    };

    let oauth_manager = oauth::OAuthManager::new(secrets)?;
    let store = TokenStore::new(config.token_path.clone());

    let credential = match store.load().await? {
        Some(credential) => {
            tracing::info!(path = %store.path().display(), "using cached credential");
            credential
        }
        None => {
            tracing::info!("no cached credential, asking the user for access");
            let credential = oauth_manager
                .authenticate(config)
                .await
                .context("authorize user to YouTube")?;
            store.save(&credential).await?;
            tracing::info!(path = %store.path().display(), "saved credential");
            credential
        }
    };

    Ok(YouTubeClient::new(
        Authorization::refreshing(credential, oauth_manager, store),
        http_client,
        config.api_base_url.clone(),
    ))
}

/// Every playlist owned by the user `client` is authorized as.
pub async fn list_my_playlists(client: &YouTubeClient) -> eyre::Result<Vec<Playlist>> {
    client.list_my_playlists().await
}

/// Every item of the playlist `playlist_id`, in playlist order.
pub async fn list_playlist_items(
    client: &YouTubeClient,
    playlist_id: &str,
) -> eyre::Result<Vec<PlaylistItem>> {
    client.list_playlist_items(playlist_id).await
}
