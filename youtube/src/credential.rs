//! The user's OAuth credential and its on-disk cache.

use eyre::Context;
use jiff::{SignedDuration, Timestamp};
use oauth2::TokenResponse;
use oauth2::basic::BasicTokenResponse;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// Refresh this long before the provider-reported expiry.
const REFRESH_MARGIN: SignedDuration = SignedDuration::from_secs(300);

/// A bearer token authorizing API calls on the user's behalf.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<Timestamp>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expiry", &self.expiry)
            .finish()
    }
}

impl Credential {
    /// A credential with no refresh token and no known expiry.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: default_token_type(),
            refresh_token: None,
            expiry: None,
        }
    }

    /// Converts a token endpoint response, turning the relative `expires_in` into an absolute
    /// expiry.
    pub fn from_token_response(token: &BasicTokenResponse) -> Self {
        let expiry = token
            .expires_in()
            .and_then(|expires_in| SignedDuration::try_from(expires_in).ok())
            .and_then(|expires_in| Timestamp::now().checked_add(expires_in).ok());

        Self {
            access_token: token.access_token().secret().to_string(),
            token_type: default_token_type(),
            refresh_token: token.refresh_token().map(|t| t.secret().to_string()),
            expiry,
        }
    }

    /// Whether the access token expires within the refresh margin.
    ///
    /// A missing expiry, or the zero timestamp some tools write instead, means the token is
    /// assumed to be valid indefinitely.
    pub fn needs_refresh(&self) -> bool {
        match self.expiry {
            Some(expiry) if expiry > Timestamp::UNIX_EPOCH => Timestamp::now()
                .checked_add(REFRESH_MARGIN)
                .map_or(true, |soon| soon >= expiry),
            _ => false,
        }
    }
}

/// Persists a [`Credential`] as JSON at a fixed path.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the cached credential.
    ///
    /// Returns `Ok(None)` when there is no cache, or when the file exists but does not parse. The
    /// credential is not checked for validity.
    pub async fn load(&self) -> eyre::Result<Option<Credential>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no cached credential");
                return Ok(None);
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("read cached credential {}", self.path.display()));
            }
        };

        match serde_json::from_str(&contents) {
            Ok(credential) => Ok(Some(credential)),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "ignoring unparsable cached credential"
                );
                Ok(None)
            }
        }
    }

    /// Writes the credential, replacing any previous cache.
    pub async fn save(&self, credential: &Credential) -> eyre::Result<()> {
        tracing::info!(path = %self.path.display(), "saving credential");
        let json = serde_json::to_string_pretty(credential).context("serialize credential")?;
        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("write credential to {}", self.path.display()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use oauth2::basic::BasicTokenType;
    use oauth2::{AccessToken, EmptyExtraTokenFields, RefreshToken};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    /// A fresh, empty scratch directory unique to this test.
    pub(crate) fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "youtube-playlists-{}-{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn token_response_expiry_is_absolute() {
        let mut token = BasicTokenResponse::new(
            AccessToken::new("at".to_string()),
            BasicTokenType::Bearer,
            EmptyExtraTokenFields {},
        );
        token.set_expires_in(Some(&Duration::from_secs(3600)));
        token.set_refresh_token(Some(RefreshToken::new("rt".to_string())));

        let before = Timestamp::now();
        let credential = Credential::from_token_response(&token);
        assert_eq!(credential.access_token, "at");
        assert_eq!(credential.refresh_token.as_deref(), Some("rt"));

        let expiry = credential.expiry.unwrap();
        assert!(expiry >= before + SignedDuration::from_secs(3600));
        assert!(!credential.needs_refresh());
    }

    #[test]
    fn refresh_is_needed_close_to_expiry() {
        let mut credential = Credential::new("at");
        assert!(!credential.needs_refresh());

        credential.expiry = Some(Timestamp::now() + SignedDuration::from_secs(60));
        assert!(credential.needs_refresh());

        credential.expiry = Some(Timestamp::now() - SignedDuration::from_hours(1));
        assert!(credential.needs_refresh());

        credential.expiry = Some(Timestamp::UNIX_EPOCH);
        assert!(!credential.needs_refresh());
    }

    #[test]
    fn reads_token_file_with_rfc3339_expiry() {
        let json = r#"{
            "access_token": "ya29.a0",
            "token_type": "Bearer",
            "refresh_token": "1//0g",
            "expiry": "2024-05-01T10:00:00Z"
        }"#;
        let credential: Credential = serde_json::from_str(json).unwrap();
        assert_eq!(credential.refresh_token.as_deref(), Some("1//0g"));
        assert_eq!(
            credential.expiry,
            Some("2024-05-01T10:00:00Z".parse::<Timestamp>().unwrap())
        );
    }

    #[test]
    fn debug_output_hides_tokens() {
        let mut credential = Credential::new("very-secret");
        credential.refresh_token = Some("also-secret".to_string());
        let debug = format!("{credential:?}");
        assert!(!debug.contains("secret"), "{debug}");
    }

    #[tokio::test]
    async fn store_round_trip_overwrites() {
        let dir = scratch_dir("store-round-trip");
        let store = TokenStore::new(dir.join("token.json"));
        assert_eq!(store.load().await.unwrap(), None);

        let mut credential = Credential::new("first");
        store.save(&credential).await.unwrap();
        credential.access_token = "second".to_string();
        credential.refresh_token = Some("refresh".to_string());
        store.save(&credential).await.unwrap();

        assert_eq!(store.load().await.unwrap(), Some(credential));
    }

    #[tokio::test]
    async fn unparsable_cache_is_treated_as_missing() {
        let dir = scratch_dir("store-garbage");
        let path = dir.join("token.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = TokenStore::new(&path);
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn unreadable_cache_is_an_error() {
        // a directory where the file should be
        let dir = scratch_dir("store-dir");
        let store = TokenStore::new(&dir);
        assert!(store.load().await.is_err());
    }
}
