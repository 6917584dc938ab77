//! YouTube Data API v3 client library.
//!
//! Read-only access to playlists: the authenticated user's own playlists, and the items of any
//! playlist the caller is allowed to see.
//!
//! Every list endpoint is paginated. The `*_items`/`my_*` methods on [`YouTubeClient`] return a
//! [`PagedStream`] that fetches pages lazily as it is polled; the `list_*` methods drain such a
//! stream into a `Vec` and fail as a whole if any page fails.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use tokio_stream::StreamExt;
//! use youtube_playlists::youtube_api::{Authorization, YouTubeClient};
//!
//! # async fn example() -> eyre::Result<()> {
//! let client = YouTubeClient::new(
//!     Authorization::api_key("AIza..."),
//!     reqwest::Client::new(),
//!     youtube_playlists::config::DEFAULT_API_BASE_URL,
//! );
//!
//! let mut items = std::pin::pin!(client.playlist_items("PLBCF2DAC6FFB574DE"));
//! while let Some(item) = items.next().await {
//!     let item = item?;
//!     println!("{}", item.id);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
#[cfg(test)]
pub(crate) mod fake;
pub mod playlist_items;
pub mod playlists;
pub mod types;

pub use client::{Authorization, BearerAuth, YouTubeClient};
pub use types::{PageInfo, PagedStream};

pub use playlist_items::{PlaylistItem, PlaylistItemContentDetails, PlaylistItemSnippet, ResourceId};
pub use playlists::{Playlist, PlaylistContentDetails, PlaylistSnippet};
