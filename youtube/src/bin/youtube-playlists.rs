use clap::{Parser, Subcommand};
use eyre::Context;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use youtube_playlists::config::{self, Config};
use youtube_playlists::{AuthMode, list_my_playlists, list_playlist_items, obtain_client};

#[derive(Parser)]
#[command(name = "youtube-playlists")]
#[command(about = "List YouTube playlists and their contents as JSON", long_about = None)]
struct Cli {
    /// Use a developer API key instead of signing in. Only public playlists can be read.
    #[arg(long, env = "YOUTUBE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// OAuth client secrets downloaded from the Google Cloud console
    #[arg(long, env = "YOUTUBE_CREDENTIALS", default_value = config::DEFAULT_CREDENTIALS_PATH)]
    credentials: PathBuf,

    /// Where the signed-in credential is cached [default: ~/.youtube_token.json]
    #[arg(long, env = "YOUTUBE_TOKEN_FILE")]
    token_file: Option<PathBuf>,

    /// Local port for the OAuth redirect; must match the client's registered redirect URI
    #[arg(long, env = "YOUTUBE_CALLBACK_PORT", default_value_t = config::DEFAULT_CALLBACK_PORT)]
    port: u16,

    /// Seconds to wait for the sign-in to complete in the browser
    #[arg(long, env = "YOUTUBE_CONSENT_TIMEOUT", default_value_t = 300)]
    timeout: u64,

    /// Only print the sign-in URL; don't open it
    #[arg(long)]
    no_browser: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the playlists of the signed-in user
    Playlists,
    /// Lists every item of a playlist
    Items {
        #[arg(value_name = "PLAYLIST_ID")]
        playlist_id: String,
    },
}

impl Cli {
    fn config(&self) -> eyre::Result<Config> {
        let token_path = match &self.token_file {
            Some(path) => path.clone(),
            None => config::default_token_path()?,
        };
        let mut config = Config::with_token_path(token_path);
        config.credentials_path = self.credentials.clone();
        config.callback_port = self.port;
        config.consent_timeout = Duration::from_secs(self.timeout);
        config.open_browser = !self.no_browser;
        Ok(config)
    }

    fn auth_mode(&self) -> AuthMode {
        match &self.api_key {
            Some(key) => AuthMode::ApiKey(key.clone()),
            None => AuthMode::Interactive,
        }
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();

    let cli = Cli::parse();
    let config = cli.config()?;
    let client = obtain_client(cli.auth_mode(), &config)
        .await
        .context("set up YouTube client")?;

    let json = match &cli.command {
        Commands::Playlists => {
            let playlists = list_my_playlists(&client).await?;
            serde_json::to_string_pretty(&playlists)
        }
        Commands::Items { playlist_id } => {
            let items = list_playlist_items(&client, playlist_id).await?;
            serde_json::to_string_pretty(&items)
        }
    }
    .context("serialize listing as JSON")?;
    println!("{json}");

    Ok(())
}
