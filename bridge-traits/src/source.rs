//! Collection Source Abstraction
//!
//! A source is any external system holding a user's collection: a streaming
//! service, a self-hosted media server, a local music folder. Adapters expose
//! paginated reads of the three container kinds (liked songs, playlists,
//! albums) and batched writes back to them.
//!
//! ## Error contract
//!
//! Adapters signal rate limiting with [`BridgeError::RateLimited`] carrying
//! the retry-after seconds. Credentials problems surface as
//! [`BridgeError::Authentication`] or [`BridgeError::MissingConfiguration`].
//! Any other failure is treated as a per-call failure by the engine.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{BridgeError, Result};

/// Track as reported by (or pushed to) a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SourceTrack {
    /// Source-specific id. `None` when pushing a track the source has never
    /// reported; the adapter is expected to look it up.
    pub id: Option<String>,
    pub name: String,
    /// Artist names, primary first.
    pub artists: Vec<String>,
    pub duration_ms: Option<u64>,
    pub album: Option<String>,
    pub cover: Option<String>,
}

impl SourceTrack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artists.push(artist.into());
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }
}

/// Playlist or album header as listed by a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SourceContainer {
    pub id: String,
    pub name: String,
    /// Album artists; empty for playlists.
    pub artists: Vec<String>,
    pub cover: Option<String>,
}

impl SourceContainer {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artists.push(artist.into());
        self
    }
}

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourcePage {
    pub items: Vec<SourceTrack>,
    /// Opaque cursor for the following page; `None` on the last page.
    pub next_cursor: Option<String>,
}

impl SourcePage {
    pub fn new(items: Vec<SourceTrack>, next_cursor: Option<String>) -> Self {
        Self { items, next_cursor }
    }

    /// Last page: no items or no follow-up cursor.
    pub fn is_last(&self) -> bool {
        self.items.is_empty() || self.next_cursor.is_none()
    }
}

/// Which remote container an operation targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ContainerRef {
    LikedSongs,
    Playlist(String),
    Album(String),
}

impl fmt::Display for ContainerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerRef::LikedSongs => write!(f, "liked_songs"),
            ContainerRef::Playlist(id) => write!(f, "playlist:{}", id),
            ContainerRef::Album(id) => write!(f, "album:{}", id),
        }
    }
}

/// External collection source.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::source::{ContainerRef, SourceAdapter};
///
/// async fn count_liked(source: &dyn SourceAdapter) -> Result<usize> {
///     let mut cursor = None;
///     let mut total = 0;
///     loop {
///         let page = source.fetch_liked_songs(cursor.clone()).await?;
///         total += page.items.len();
///         if page.is_last() {
///             return Ok(total);
///         }
///         cursor = page.next_cursor;
///     }
/// }
/// ```
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable source key, used as the key of `Song::ids` (e.g. `"spotify"`).
    fn name(&self) -> &str;

    /// Largest batch accepted by `add_items` / `remove_items`.
    fn batch_size(&self) -> usize {
        50
    }

    /// Whether `create_playlist` is implemented.
    fn supports_playlist_creation(&self) -> bool {
        false
    }

    async fn fetch_liked_songs(&self, cursor: Option<String>) -> Result<SourcePage>;

    async fn fetch_playlists(&self) -> Result<Vec<SourceContainer>>;

    async fn fetch_playlist_items(&self, id: &str, cursor: Option<String>) -> Result<SourcePage>;

    async fn fetch_albums(&self) -> Result<Vec<SourceContainer>>;

    async fn fetch_album_items(&self, id: &str, cursor: Option<String>) -> Result<SourcePage>;

    /// Add up to `batch_size` items to a container.
    async fn add_items(&self, container: &ContainerRef, items: &[SourceTrack]) -> Result<()>;

    /// Remove up to `batch_size` items from a container.
    async fn remove_items(&self, container: &ContainerRef, items: &[SourceTrack]) -> Result<()>;

    /// Create an empty playlist and return its source id.
    async fn create_playlist(&self, name: &str) -> Result<String> {
        Err(BridgeError::NotAvailable(format!(
            "{} cannot create playlist '{}'",
            self.name(),
            name
        )))
    }
}
