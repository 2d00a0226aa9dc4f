//! Page dispatch over the three remote container kinds.

use bridge_traits::error::Result;
use bridge_traits::source::{ContainerRef, SourceAdapter, SourcePage};

/// Fetches one page of `container`, starting at `cursor`.
pub async fn fetch_page(
    source: &dyn SourceAdapter,
    container: &ContainerRef,
    cursor: Option<String>,
) -> Result<SourcePage> {
    match container {
        ContainerRef::LikedSongs => source.fetch_liked_songs(cursor).await,
        ContainerRef::Playlist(id) => source.fetch_playlist_items(id, cursor).await,
        ContainerRef::Album(id) => source.fetch_album_items(id, cursor).await,
    }
}
