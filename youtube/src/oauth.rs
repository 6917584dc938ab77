//! OAuth 2.0 management for YouTube API authentication.
//!
//! This module covers the interactive authorization-code flow with a loopback redirect, and
//! refreshing an existing credential with its refresh token.

use crate::callback::{self, CALLBACK_PATH, CallbackSession, CodeExchange};
use crate::config::{ClientSecrets, Config};
use crate::credential::Credential;
use eyre::Context;
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, RefreshToken, Scope, TokenUrl, reqwest,
};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Read-only access to the user's YouTube account.
pub const YOUTUBE_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/youtube.readonly";

type ConfiguredClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Manages OAuth 2.0 authentication flows for YouTube API access.
///
/// Holds the OAuth client identity and the HTTP client used to talk to the token endpoint.
#[derive(Debug, Clone)]
pub struct OAuthManager {
    secrets: ClientSecrets,
    http_client: reqwest::Client,
}

impl OAuthManager {
    pub fn new(secrets: ClientSecrets) -> eyre::Result<Self> {
        let http_client = reqwest::ClientBuilder::new()
            // SSRF no thank you.
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("build OAuth HTTP client")?;
        Ok(Self {
            secrets,
            http_client,
        })
    }

    fn client(&self) -> eyre::Result<ConfiguredClient> {
        let auth_url = AuthUrl::new(self.secrets.auth_uri.clone())
            .context("parse authorization endpoint URL")?;
        let token_url =
            TokenUrl::new(self.secrets.token_uri.clone()).context("parse token endpoint URL")?;
        Ok(BasicClient::new(ClientId::new(self.secrets.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.secrets.client_secret.clone()))
            .set_auth_uri(auth_url)
            .set_token_uri(token_url))
    }

    /// Runs the interactive authorization-code flow and returns the resulting credential.
    ///
    /// Binds the loopback listener on `config.callback_port`, prints the authorization URL
    /// (and opens it if `config.open_browser` is set), then waits up to
    /// `config.consent_timeout` for the provider to redirect back with a code. The listener is
    /// shut down before this returns.
    pub async fn authenticate(&self, config: &Config) -> eyre::Result<Credential> {
        let listener = TcpListener::bind(("127.0.0.1", config.callback_port))
            .await
            .with_context(|| {
                format!("bind OAuth callback listener on port {}", config.callback_port)
            })?;
        let port = listener
            .local_addr()
            .context("get callback listener address")?
            .port();
        let redirect_url = RedirectUrl::new(format!("http://localhost:{port}{CALLBACK_PATH}"))
            .context("construct redirect url")?;
        let client = self.client()?.set_redirect_uri(redirect_url);

        let csrf = CsrfToken::new_random();
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let (auth_url, _csrf_token) = client
            // We never re-use the CSRF since we only go through the flow exactly once.
            .authorize_url(|| csrf.clone())
            .add_scope(Scope::new(YOUTUBE_READONLY_SCOPE.to_string()))
            .add_extra_param("access_type", "offline")
            .set_pkce_challenge(pkce_challenge)
            .url();

        let exchange = CodeExchanger {
            client,
            pkce_verifier: pkce_verifier.secret().clone(),
            http_client: self.http_client.clone(),
        };
        let (session, credential) = CallbackSession::new(csrf, exchange);

        eprintln!("Visit the URL for the auth dialog:\n{auth_url}");
        tracing::info!(url = %auth_url, port, "asking user to follow OAuth flow");
        if config.open_browser {
            if let Err(e) = webbrowser::open(auth_url.as_str()) {
                tracing::warn!(error = %e, "could not open the system browser");
            }
        }

        callback::await_authorization(
            listener,
            Arc::new(session),
            credential,
            config.consent_timeout,
        )
        .await
        .context("await user authorization")
    }

    /// Attempts to refresh `credential` using its refresh token.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(new))` - refresh succeeded; `new` keeps the old refresh token if the provider
    ///   did not issue a new one
    /// * `Ok(None)` - there is no refresh token, or the provider rejected it
    /// * `Err(_)` - network or other error occurred during the refresh attempt
    pub async fn refresh_token(&self, credential: &Credential) -> eyre::Result<Option<Credential>> {
        let Some(refresh_token) = credential.refresh_token.as_deref() else {
            tracing::warn!("no refresh token available, cannot refresh");
            return Ok(None);
        };

        tracing::debug!("attempting to refresh OAuth token");
        let client = self.client()?;
        match client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http_client)
            .await
        {
            Ok(token) => {
                tracing::debug!("successfully refreshed OAuth token");
                let mut refreshed = Credential::from_token_response(&token);
                if refreshed.refresh_token.is_none() {
                    tracing::trace!("new token lacks refresh token, preserving original");
                    refreshed.refresh_token = Some(refresh_token.to_string());
                }
                Ok(Some(refreshed))
            }
            Err(ref e @ oauth2::RequestTokenError::ServerResponse(ref sr))
                if matches!(
                    sr.error(),
                    oauth2::basic::BasicErrorResponseType::InvalidGrant
                ) =>
            {
                tracing::warn!("OAuth refresh token considered invalid grant: {}", e);
                Ok(None)
            }
            Err(e) => Err(e).context("exchange refresh token"),
        }
    }
}

/// Trades the code from the redirect for a credential, proving possession of this flow's PKCE
/// verifier.
struct CodeExchanger {
    client: ConfiguredClient,
    pkce_verifier: String,
    http_client: reqwest::Client,
}

impl CodeExchange for CodeExchanger {
    async fn exchange(&self, code: AuthorizationCode) -> eyre::Result<Credential> {
        let token = self
            .client
            .exchange_code(code)
            .set_pkce_verifier(PkceCodeVerifier::new(self.pkce_verifier.clone()))
            .request_async(&self.http_client)
            .await
            .context("exchange authorization code with access token")?;
        Ok(Credential::from_token_response(&token))
    }
}
