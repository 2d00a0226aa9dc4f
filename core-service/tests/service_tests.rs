//! Integration tests for the collection service facade
//!
//! These tests verify:
//! - A failing source does not stop the others in `sync_all`
//! - The collection survives a restart through SQLite
//! - Cancellation only affects operations already running

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::source::{ContainerRef, SourceAdapter, SourceContainer, SourcePage, SourceTrack};
use core_library::models::Song;
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, LibraryEvent};
use core_service::{CollectionService, CoreError};
use core_sync::SyncError;
use mockall::mock;
use std::sync::{Arc, Mutex};

mock! {
    pub Source {}

    #[async_trait]
    impl SourceAdapter for Source {
        fn name(&self) -> &str;
        async fn fetch_liked_songs(&self, cursor: Option<String>) -> BridgeResult<SourcePage>;
        async fn fetch_playlists(&self) -> BridgeResult<Vec<SourceContainer>>;
        async fn fetch_playlist_items(&self, id: &str, cursor: Option<String>) -> BridgeResult<SourcePage>;
        async fn fetch_albums(&self) -> BridgeResult<Vec<SourceContainer>>;
        async fn fetch_album_items(&self, id: &str, cursor: Option<String>) -> BridgeResult<SourcePage>;
        async fn add_items(&self, container: &ContainerRef, items: &[SourceTrack]) -> BridgeResult<()>;
        async fn remove_items(&self, container: &ContainerRef, items: &[SourceTrack]) -> BridgeResult<()>;
    }
}

/// Liked songs only, held in memory.
struct MemorySource {
    name: &'static str,
    liked: Mutex<Vec<SourceTrack>>,
}

impl MemorySource {
    fn new(name: &'static str, songs: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            name,
            liked: Mutex::new(
                songs
                    .iter()
                    .map(|s| {
                        SourceTrack::new(*s)
                            .with_id(s.to_lowercase())
                            .with_artist("Fleetwood Mac")
                            .with_duration_ms(240_000)
                    })
                    .collect(),
            ),
        })
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.liked.lock().unwrap().iter().map(|t| t.name.clone()).collect();
        names.sort();
        names
    }
}

#[async_trait]
impl SourceAdapter for MemorySource {
    fn name(&self) -> &str {
        self.name
    }

    async fn fetch_liked_songs(&self, _cursor: Option<String>) -> BridgeResult<SourcePage> {
        Ok(SourcePage::new(self.liked.lock().unwrap().clone(), None))
    }

    async fn fetch_playlists(&self) -> BridgeResult<Vec<SourceContainer>> {
        Ok(Vec::new())
    }

    async fn fetch_playlist_items(&self, id: &str, _cursor: Option<String>) -> BridgeResult<SourcePage> {
        Err(BridgeError::QueryFailed(format!("no playlist {}", id)))
    }

    async fn fetch_albums(&self) -> BridgeResult<Vec<SourceContainer>> {
        Ok(Vec::new())
    }

    async fn fetch_album_items(&self, id: &str, _cursor: Option<String>) -> BridgeResult<SourcePage> {
        Err(BridgeError::QueryFailed(format!("no album {}", id)))
    }

    async fn add_items(&self, _container: &ContainerRef, items: &[SourceTrack]) -> BridgeResult<()> {
        self.liked.lock().unwrap().extend(items.iter().cloned());
        Ok(())
    }

    async fn remove_items(&self, _container: &ContainerRef, items: &[SourceTrack]) -> BridgeResult<()> {
        self.liked
            .lock()
            .unwrap()
            .retain(|t| !items.iter().any(|i| i.name == t.name));
        Ok(())
    }
}

fn broken_source() -> Arc<MockSource> {
    let mut source = MockSource::new();
    source.expect_name().return_const("broken".to_string());
    source
        .expect_fetch_liked_songs()
        .times(1)
        .returning(|_| Err(BridgeError::Authentication("refresh token expired".into())));
    source.expect_add_items().never();
    source.expect_remove_items().never();
    Arc::new(source)
}

async fn service_at(url: &str) -> anyhow::Result<CollectionService> {
    let config = CoreConfig::builder().database_url(url).build()?;
    Ok(CollectionService::bootstrap(config).await?)
}

#[core_async::test]
async fn test_sync_all_isolates_failing_source() -> anyhow::Result<()> {
    let service = service_at("sqlite::memory:").await?;
    let healthy = MemorySource::new("memory", &["Dreams"]);
    service.register_source(healthy.clone()).await;
    service.register_source(broken_source()).await;
    {
        let collection = service.collection();
        let mut collection = collection.write().await;
        collection.add_song(Song::new("Dreams").with_artist("Fleetwood Mac").with_duration_secs(240));
        collection.add_song(Song::new("Landslide").with_artist("Fleetwood Mac").with_duration_secs(240));
    }

    let outcomes = service.sync_all().await;

    assert_eq!(outcomes.len(), 2);
    assert!(matches!(
        outcomes.get("broken"),
        Some(Err(CoreError::Sync(SyncError::AuthenticationFailure(_))))
    ));
    let report = outcomes.get("memory").unwrap().as_ref().unwrap();
    assert_eq!(report.added, 1);
    assert_eq!(healthy.names(), vec!["Dreams", "Landslide"]);
    assert_eq!(service.collection().read().await.track_count(), 2);
    Ok(())
}

#[core_async::test]
async fn test_collection_survives_restart() -> anyhow::Result<()> {
    let path = std::env::temp_dir().join(format!(
        "collection-sync-{}-{}.db",
        std::process::id(),
        chrono_free_stamp()
    ));
    let url = format!("sqlite:{}", path.display());

    let first = service_at(&url).await?;
    first
        .register_source(MemorySource::new("memory", &["Dreams", "Rhiannon"]))
        .await;
    let mut events = first.events().subscribe();
    let report = first.import_from("memory").await?;
    assert_eq!(report.liked_songs, 2);
    first.shutdown().await?;

    let mut persisted = false;
    while let Ok(event) = events.try_recv() {
        if let CoreEvent::Library(LibraryEvent::Persisted { tracks }) = event {
            assert_eq!(tracks, 2);
            persisted = true;
        }
    }
    assert!(persisted);
    drop(first);

    let second = service_at(&url).await?;
    let collection = second.collection();
    let collection = collection.read().await;
    assert_eq!(collection.track_count(), 2);
    assert_eq!(collection.liked_songs().songs[0].id_for("memory"), Some("dreams"));

    let _ = std::fs::remove_file(&path);
    Ok(())
}

fn chrono_free_stamp() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
}

#[core_async::test]
async fn test_unknown_source_is_reported() -> anyhow::Result<()> {
    let service = service_at("sqlite::memory:").await?;
    let err = service.sync_liked_songs("nowhere").await.unwrap_err();
    assert!(matches!(err, CoreError::UnknownSource(name) if name == "nowhere"));
    Ok(())
}

#[core_async::test]
async fn test_cancel_does_not_poison_later_operations() -> anyhow::Result<()> {
    let service = service_at("sqlite::memory:").await?;
    service
        .register_source(MemorySource::new("memory", &["Go Your Own Way"]))
        .await;

    service.cancel();
    let report = service.import_from("memory").await?;

    assert_eq!(report.liked_songs, 1);
    Ok(())
}

#[core_async::test]
async fn test_clear_collection_empties_memory_and_storage() -> anyhow::Result<()> {
    let service = service_at("sqlite::memory:").await?;
    service
        .register_source(MemorySource::new("memory", &["Everywhere"]))
        .await;
    service.import_from("memory").await?;
    service.persist().await?;

    service.clear_collection().await?;

    assert!(service.collection().read().await.is_empty());
    assert_eq!(service.persist().await?, 0);
    Ok(())
}
