//! Runtime configuration and OAuth client secrets.

use eyre::Context;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the cached credential file inside the user's home directory.
pub const TOKEN_FILE_NAME: &str = ".youtube_token.json";

/// Default location of the OAuth client secrets, relative to the working directory.
pub const DEFAULT_CREDENTIALS_PATH: &str = "credentials.json";

/// Local port the OAuth redirect listener binds to by default.
///
/// Must match the redirect URI registered for the OAuth client.
pub const DEFAULT_CALLBACK_PORT: u16 = 8080;

pub const DEFAULT_API_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Settings for authenticating against and talking to the YouTube Data API.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the OAuth client secrets downloaded from the Google Cloud console.
    pub credentials_path: PathBuf,
    /// Where the user's credential is cached between runs.
    pub token_path: PathBuf,
    /// Port for the loopback redirect listener. `0` picks a free port.
    pub callback_port: u16,
    /// How long to wait for the user to finish the consent step in their browser.
    pub consent_timeout: Duration,
    /// Whether to try opening the authorization URL in the system browser.
    pub open_browser: bool,
    /// Base URL of the YouTube Data API, without a trailing slash.
    pub api_base_url: String,
}

impl Config {
    /// Default configuration, caching the credential in the current user's home directory.
    pub fn new() -> eyre::Result<Self> {
        Ok(Self::with_token_path(default_token_path()?))
    }

    /// Default configuration with an explicit credential cache location.
    pub fn with_token_path(token_path: impl Into<PathBuf>) -> Self {
        Self {
            credentials_path: PathBuf::from(DEFAULT_CREDENTIALS_PATH),
            token_path: token_path.into(),
            callback_port: DEFAULT_CALLBACK_PORT,
            consent_timeout: Duration::from_secs(300),
            open_browser: true,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
        }
    }
}

/// `~/.youtube_token.json` for the current user.
pub fn default_token_path() -> eyre::Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(TOKEN_FILE_NAME))
        .ok_or_else(|| eyre::eyre!("could not determine the current user's home directory"))
}

/// OAuth client identity, as found in a Google `credentials.json`.
#[derive(Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl fmt::Debug for ClientSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSecrets")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("auth_uri", &self.auth_uri)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

/// The downloaded file nests the secrets under the application type.
#[derive(Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    pub fn from_json(json: &str) -> eyre::Result<Self> {
        let file: ClientSecretsFile =
            serde_json::from_str(json).context("parse client secrets JSON")?;
        file.installed
            .or(file.web)
            .ok_or_else(|| {
                eyre::eyre!("client secrets contain neither an `installed` nor a `web` entry")
            })
    }

    pub async fn from_file(path: &Path) -> eyre::Result<Self> {
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("read client secrets from {}", path.display()))?;
        Self::from_json(&json)
            .with_context(|| format!("parse client secrets in {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn installed_app_secrets() {
        let json = r#"
        {
            "installed": {
                "client_id": "123.apps.googleusercontent.com",
                "project_id": "playlists",
                "auth_uri": "https://accounts.google.com/o/oauth2/auth",
                "token_uri": "https://oauth2.googleapis.com/token",
                "client_secret": "shh",
                "redirect_uris": ["http://localhost"]
            }
        }"#;

        let secrets = ClientSecrets::from_json(json).unwrap();
        assert_eq!(secrets.client_id, "123.apps.googleusercontent.com");
        assert_eq!(secrets.client_secret, "shh");
        assert_eq!(secrets.token_uri, "https://oauth2.googleapis.com/token");
    }

    #[test]
    fn web_secrets_fill_in_default_endpoints() {
        let json = r#"{"web": {"client_id": "abc", "client_secret": "def"}}"#;

        let secrets = ClientSecrets::from_json(json).unwrap();
        assert_eq!(secrets.client_id, "abc");
        assert_eq!(secrets.auth_uri, DEFAULT_AUTH_URI);
        assert_eq!(secrets.token_uri, DEFAULT_TOKEN_URI);
    }

    #[test]
    fn secrets_without_application_type_are_rejected() {
        let err = ClientSecrets::from_json(r#"{"other": {}}"#).unwrap_err();
        assert!(err.to_string().contains("neither"), "{err}");

        assert!(ClientSecrets::from_json("not json").is_err());
    }

    #[test]
    fn debug_output_hides_the_secret() {
        let json = r#"{"web": {"client_id": "abc", "client_secret": "def"}}"#;
        let secrets = ClientSecrets::from_json(json).unwrap();
        let debug = format!("{secrets:?}");
        assert!(debug.contains("abc"));
        assert!(!debug.contains("def"));
    }

    #[tokio::test]
    async fn missing_secrets_file_is_an_error() {
        let path = std::env::temp_dir().join("youtube-playlists-no-such-credentials.json");
        let err = ClientSecrets::from_file(&path).await.unwrap_err();
        assert!(format!("{err:#}").contains("read client secrets"), "{err:#}");
    }
}
