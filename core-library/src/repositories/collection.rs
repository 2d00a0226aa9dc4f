//! Database repository for the canonical collection
//!
//! Liked songs, playlists and albums are stored as one JSON payload row
//! each, ordered by position. Resume cursors travel inside the payloads so
//! an interrupted fetch survives a restart.

use crate::collection::Collection;
use crate::error::Result;
use crate::models::{Album, LikedSongs, Playlist};
use crate::repositories::get_string;
use bridge_traits::database::{DatabaseAdapter, QueryValue};
use core_runtime::config::IdentityConfig;
use std::sync::Arc;
use tracing::{debug, info, instrument};

const KIND_LIKED: &str = "liked_songs";
const KIND_PLAYLIST: &str = "playlist";
const KIND_ALBUM: &str = "album";

const INSERT_SQL: &str =
    "INSERT INTO collection_entries (kind, position, name, payload) VALUES (?, ?, ?, ?)";

#[async_trait::async_trait]
pub trait CollectionRepository: Send + Sync {
    async fn initialize(&self) -> Result<()>;

    /// Replaces the stored collection atomically. Returns the rows written.
    async fn save(&self, collection: &Collection) -> Result<usize>;

    /// Loads the stored collection; empty when nothing was saved yet.
    async fn load(&self, identity: IdentityConfig) -> Result<Collection>;

    async fn clear(&self) -> Result<()>;
}

pub struct SqliteCollectionRepository {
    db: Arc<dyn DatabaseAdapter>,
}

impl SqliteCollectionRepository {
    pub fn new(db: Arc<dyn DatabaseAdapter>) -> Self {
        Self { db }
    }
}

fn entry(kind: &str, position: usize, name: &str, payload: String) -> [QueryValue; 4] {
    [
        QueryValue::from(kind),
        QueryValue::Integer(position as i64),
        QueryValue::from(name),
        QueryValue::Text(payload),
    ]
}

#[async_trait::async_trait]
impl CollectionRepository for SqliteCollectionRepository {
    #[instrument(skip(self))]
    async fn initialize(&self) -> Result<()> {
        self.db
            .execute(
                "CREATE TABLE IF NOT EXISTS collection_entries (
                    kind TEXT NOT NULL,
                    position INTEGER NOT NULL,
                    name TEXT NOT NULL,
                    payload TEXT NOT NULL,
                    PRIMARY KEY (kind, position)
                )",
                &[],
            )
            .await?;
        debug!("Collection repository initialized");
        Ok(())
    }

    #[instrument(skip(self, collection))]
    async fn save(&self, collection: &Collection) -> Result<usize> {
        let mut rows = Vec::with_capacity(1 + collection.playlists().len() + collection.albums().len());

        let liked = collection.liked_songs();
        rows.push(entry(
            KIND_LIKED,
            0,
            &liked.name,
            serde_json::to_string(liked)?,
        ));
        for (position, playlist) in collection.playlists().iter().enumerate() {
            rows.push(entry(
                KIND_PLAYLIST,
                position,
                &playlist.name,
                serde_json::to_string(playlist)?,
            ));
        }
        for (position, album) in collection.albums().iter().enumerate() {
            rows.push(entry(
                KIND_ALBUM,
                position,
                &album.name,
                serde_json::to_string(album)?,
            ));
        }

        let mut statements: Vec<(&str, &[QueryValue])> = Vec::with_capacity(rows.len() + 1);
        statements.push(("DELETE FROM collection_entries", &[]));
        statements.extend(rows.iter().map(|row| (INSERT_SQL, row.as_slice())));

        self.db.execute_batch(&statements).await?;

        info!(
            rows = rows.len(),
            tracks = collection.track_count(),
            "Collection saved"
        );
        Ok(rows.len())
    }

    #[instrument(skip(self, identity))]
    async fn load(&self, identity: IdentityConfig) -> Result<Collection> {
        let rows = self
            .db
            .query(
                "SELECT kind, payload FROM collection_entries ORDER BY kind, position",
                &[],
            )
            .await?;

        let mut liked = LikedSongs::default();
        let mut playlists = Vec::new();
        let mut albums = Vec::new();

        for row in &rows {
            let kind = get_string(row, "kind")?;
            let payload = get_string(row, "payload")?;
            match kind.as_str() {
                KIND_LIKED => liked = serde_json::from_str(&payload)?,
                KIND_PLAYLIST => playlists.push(serde_json::from_str::<Playlist>(&payload)?),
                KIND_ALBUM => albums.push(serde_json::from_str::<Album>(&payload)?),
                other => debug!(kind = other, "Skipping unknown collection row"),
            }
        }

        debug!(
            playlists = playlists.len(),
            albums = albums.len(),
            "Collection loaded"
        );
        Ok(Collection::from_parts(identity, liked, playlists, albums))
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> Result<()> {
        self.db.execute("DELETE FROM collection_entries", &[]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::SqliteAdapter;
    use crate::models::{ResumeState, Song};
    use bridge_traits::database::DatabaseConfig;
    use bridge_traits::source::ContainerRef;

    async fn repository() -> SqliteCollectionRepository {
        let mut adapter = SqliteAdapter::new(DatabaseConfig::in_memory()).await.unwrap();
        adapter.initialize().await.unwrap();
        let repo = SqliteCollectionRepository::new(Arc::new(adapter));
        repo.initialize().await.unwrap();
        repo
    }

    fn sample() -> Collection {
        let mut collection = Collection::default().with_liked_songs_name("Favorites");
        collection.add_song(
            Song::new("Hey Jude")
                .with_artist("The Beatles")
                .with_duration_secs(431)
                .with_id("spotify", "s1"),
        );

        let mut playlist = Playlist::new("Road Trip").with_id("spotify", "p1");
        playlist.songs.push(Song::new("Come Together").with_artist("The Beatles"));
        collection.add_playlist(playlist);
        collection.set_resume_state(
            "spotify",
            &ContainerRef::Playlist("p1".into()),
            ResumeState {
                cursor: Some("offset=100".into()),
                fetched: vec![Song::new("Something").with_artist("The Beatles")],
            },
        );

        let mut album = Album::new("Abbey Road").with_artist("The Beatles");
        album.songs.push(Song::new("Octopus's Garden").with_artist("The Beatles"));
        collection.add_album(album);
        collection
    }

    #[core_async::test]
    async fn test_save_and_load_round_trip() {
        let repo = repository().await;
        let original = sample();

        assert_eq!(repo.save(&original).await.unwrap(), 3);
        let loaded = repo.load(IdentityConfig::default()).await.unwrap();

        assert_eq!(loaded.liked_songs(), original.liked_songs());
        assert_eq!(loaded.playlists(), original.playlists());
        assert_eq!(loaded.albums(), original.albums());
        assert_eq!(
            loaded
                .resume_state("spotify", &ContainerRef::Playlist("p1".into()))
                .and_then(|s| s.cursor.as_deref()),
            Some("offset=100")
        );
    }

    #[core_async::test]
    async fn test_save_replaces_previous_state() {
        let repo = repository().await;
        repo.save(&sample()).await.unwrap();

        let mut smaller = Collection::default();
        smaller.add_song(Song::new("Yesterday").with_artist("The Beatles"));
        repo.save(&smaller).await.unwrap();

        let loaded = repo.load(IdentityConfig::default()).await.unwrap();
        assert_eq!(loaded.liked_songs().len(), 1);
        assert!(loaded.playlists().is_empty());
        assert!(loaded.albums().is_empty());
    }

    #[core_async::test]
    async fn test_load_empty_and_clear() {
        let repo = repository().await;
        assert!(repo.load(IdentityConfig::default()).await.unwrap().is_empty());

        repo.save(&sample()).await.unwrap();
        repo.clear().await.unwrap();
        assert!(repo.load(IdentityConfig::default()).await.unwrap().is_empty());
    }
}
