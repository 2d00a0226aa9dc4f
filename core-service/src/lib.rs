//! Core service facade and bootstrap helpers.
//!
//! Wires configuration, SQLite persistence, the authority resolver, the
//! canonical collection and the reconciliation engines together. Hosts
//! register their source adapters and drive imports and syncs through
//! [`CollectionService`].
//!
//! Desktop hosts typically enable the `desktop-shims` feature, which lets
//! [`CoreConfig`] fall back to the default data directory and a
//! `reqwest`-backed HTTP client.
//!
//! ```ignore
//! let config = CoreConfig::builder().build()?;
//! let service = CollectionService::bootstrap(config).await?;
//! service.register_source(Arc::new(SpotifyAdapter::new(token))).await;
//!
//! service.import_from("spotify").await?;
//! for (source, outcome) in service.sync_all().await {
//!     println!("{}: {:?}", source, outcome);
//! }
//! service.shutdown().await?;
//! ```

pub mod error;

pub use core_runtime::config::CoreConfig;
pub use error::{CoreError, Result};

use bridge_traits::database::{DatabaseAdapter, DatabaseConfig};
use bridge_traits::source::SourceAdapter;
use core_async::sync::{CancellationToken, RwLock};
use core_library::adapters::SqliteAdapter;
use core_library::export::Exporter;
use core_library::repositories::{
    CollectionRepository, ResolverCacheRepository, SqliteCollectionRepository,
    SqliteResolverCacheRepository,
};
use core_library::Collection;
use core_metadata::providers::client_from_config;
use core_metadata::{AuthorityResolver, CacheSizes};
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent, ResolverEvent};
use core_sync::{CollectionImporter, ImportReport, ReconcileEngine, SyncReport};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument, warn};

const EVENT_CAPACITY: usize = 256;

/// Connection settings for a configured database URL.
fn database_config(url: &str) -> DatabaseConfig {
    if url.contains(":memory:") {
        return DatabaseConfig::in_memory();
    }
    DatabaseConfig {
        database_url: url.to_string(),
        min_connections: 1,
        max_connections: 5,
        acquire_timeout_secs: 30,
    }
}

/// Primary facade exposed to host applications.
pub struct CollectionService {
    config: CoreConfig,
    collection: Arc<RwLock<Collection>>,
    resolver: Arc<AuthorityResolver>,
    repository: Arc<dyn CollectionRepository>,
    sources: RwLock<BTreeMap<String, Arc<dyn SourceAdapter>>>,
    events: EventBus,
    cancel: std::sync::Mutex<CancellationToken>,
}

impl CollectionService {
    /// Opens storage, hydrates the resolver cache and loads the collection.
    #[instrument(skip(config))]
    pub async fn bootstrap(config: CoreConfig) -> Result<Self> {
        let mut adapter = SqliteAdapter::new(database_config(&config.database_url)).await?;
        adapter.initialize().await?;
        let database: Arc<dyn DatabaseAdapter> = Arc::new(adapter);

        let repository = Arc::new(SqliteCollectionRepository::new(Arc::clone(&database)));
        repository.initialize().await?;
        let cache_repository = Arc::new(SqliteResolverCacheRepository::new(database));
        cache_repository.initialize().await?;

        let mut resolver =
            AuthorityResolver::new(config.resolver.clone()).with_repository(cache_repository);
        match &config.http_client {
            Some(http) => match client_from_config(&config.metadata_api, Arc::clone(http)) {
                Some(client) => resolver = resolver.with_client(client),
                None => warn!("No metadata authority configured; candidates pass through unverified"),
            },
            None => warn!("No HTTP client available; metadata authority disabled"),
        }

        let events = EventBus::new(EVENT_CAPACITY);
        let sizes = resolver.hydrate().await?;
        emit_hydrated(&events, sizes);

        let collection = repository
            .load(config.identity.clone())
            .await?
            .with_liked_songs_name(config.library.liked_songs_name.clone());
        info!(
            tracks = collection.track_count(),
            cached = sizes.total(),
            authority = resolver.authority_name().unwrap_or("none"),
            "Collection service ready"
        );

        Ok(Self {
            config,
            collection: Arc::new(RwLock::new(collection)),
            resolver: Arc::new(resolver),
            repository,
            sources: RwLock::new(BTreeMap::new()),
            events,
            cancel: std::sync::Mutex::new(CancellationToken::new()),
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Shared handle to the canonical collection.
    pub fn collection(&self) -> Arc<RwLock<Collection>> {
        Arc::clone(&self.collection)
    }

    pub fn resolver(&self) -> Arc<AuthorityResolver> {
        Arc::clone(&self.resolver)
    }

    // =========================================================================
    // Sources
    // =========================================================================

    /// Registers a source under its own name, replacing any previous one.
    pub async fn register_source(&self, source: Arc<dyn SourceAdapter>) {
        let name = source.name().to_string();
        info!(source = %name, "Source registered");
        self.sources.write().await.insert(name, source);
    }

    pub async fn source_names(&self) -> Vec<String> {
        self.sources.read().await.keys().cloned().collect()
    }

    async fn source(&self, name: &str) -> Result<Arc<dyn SourceAdapter>> {
        self.sources
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::UnknownSource(name.to_string()))
    }

    // =========================================================================
    // Cancellation
    // =========================================================================

    /// Token for the next operation. A cancelled token is replaced, so a
    /// cancellation only unwinds the operations running when it was raised.
    fn operation_token(&self) -> CancellationToken {
        let mut token = match self.cancel.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if token.is_cancelled() {
            *token = CancellationToken::new();
        }
        token.clone()
    }

    /// Cancels every running import and sync at its next safe point.
    pub fn cancel(&self) {
        let token = match self.cancel.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        info!("Cancellation requested");
        token.cancel();
    }

    // =========================================================================
    // Import and sync
    // =========================================================================

    /// One-shot import of a source into the collection.
    #[instrument(skip(self))]
    pub async fn import_from(&self, source: &str) -> Result<ImportReport> {
        let adapter = self.source(source).await?;
        let report = CollectionImporter::new(adapter, Arc::clone(&self.resolver))
            .with_config(self.config.reconcile.clone())
            .with_runner_config(self.config.runner.clone())
            .with_event_bus(self.events.clone())
            .with_cancellation_token(self.operation_token())
            .import_into(&self.collection)
            .await?;
        Ok(report)
    }

    fn engine(&self, adapter: Arc<dyn SourceAdapter>) -> ReconcileEngine {
        ReconcileEngine::new(adapter, Arc::clone(&self.collection))
            .with_config(self.config.reconcile.clone())
            .with_runner_config(self.config.runner.clone())
            .with_event_bus(self.events.clone())
            .with_cancellation_token(self.operation_token())
    }

    pub async fn sync_liked_songs(&self, source: &str) -> Result<SyncReport> {
        let adapter = self.source(source).await?;
        Ok(self.engine(adapter).sync_liked_songs().await?)
    }

    pub async fn sync_playlists(&self, source: &str) -> Result<SyncReport> {
        let adapter = self.source(source).await?;
        Ok(self.engine(adapter).sync_playlists().await?)
    }

    pub async fn sync_playlist(&self, source: &str, playlist: &str) -> Result<SyncReport> {
        let adapter = self.source(source).await?;
        Ok(self.engine(adapter).sync_playlist(playlist).await?)
    }

    pub async fn sync_albums(&self, source: &str) -> Result<SyncReport> {
        let adapter = self.source(source).await?;
        Ok(self.engine(adapter).sync_albums().await?)
    }

    /// Syncs the album keyed by title and main artist.
    pub async fn sync_album(
        &self,
        source: &str,
        album: &str,
        artist: Option<&str>,
    ) -> Result<SyncReport> {
        let adapter = self.source(source).await?;
        Ok(self.engine(adapter).sync_album(album, artist).await?)
    }

    /// Liked songs, playlists and albums of one source.
    #[instrument(skip(self))]
    pub async fn sync_source(&self, source: &str) -> Result<SyncReport> {
        let engine = self.engine(self.source(source).await?);
        let mut total = engine.sync_liked_songs().await?;
        total.absorb(engine.sync_playlists().await?);
        total.absorb(engine.sync_albums().await?);
        info!(source = %source, report = %total, "Source synced");
        Ok(total)
    }

    /// Syncs every registered source. A failing source does not stop the
    /// others; each outcome is reported by source name.
    pub async fn sync_all(&self) -> BTreeMap<String, Result<SyncReport>> {
        let mut outcomes = BTreeMap::new();
        for name in self.source_names().await {
            let outcome = self.sync_source(&name).await;
            if let Err(e) = &outcome {
                warn!(source = %name, error = %e, "Source sync failed; continuing with the next");
            }
            outcomes.insert(name, outcome);
        }
        outcomes
    }

    // =========================================================================
    // Collection maintenance
    // =========================================================================

    /// Cleans album names and merges the albums that collide.
    pub async fn clean_albums(&self) -> usize {
        let merged = self.collection.write().await.clean_albums();
        self.emit(CoreEvent::Library(LibraryEvent::AlbumsCleaned {
            merged: merged as u64,
        }));
        merged
    }

    /// Empties the collection in memory and in storage.
    pub async fn clear_collection(&self) -> Result<()> {
        self.collection.write().await.clear();
        self.repository.clear().await?;
        self.emit(CoreEvent::Library(LibraryEvent::Cleared));
        Ok(())
    }

    pub async fn clear_resolver_cache(&self) -> Result<()> {
        self.resolver.clear().await?;
        self.emit(CoreEvent::Resolver(ResolverEvent::CacheCleared));
        Ok(())
    }

    pub async fn resolver_cache_sizes(&self) -> CacheSizes {
        self.resolver.sizes().await
    }

    /// Writes the collection to storage. Returns the number of tracks saved.
    pub async fn persist(&self) -> Result<usize> {
        let collection = self.collection.read().await;
        self.repository.save(&collection).await?;
        let tracks = collection.track_count();
        self.emit(CoreEvent::Library(LibraryEvent::Persisted {
            tracks: tracks as u64,
        }));
        Ok(tracks)
    }

    /// Writes M3U playlists and album NFO files under `root`, or the
    /// configured export directory.
    pub async fn export(&self, root: Option<PathBuf>) -> Result<Vec<PathBuf>> {
        let root = root
            .or_else(|| self.config.library.export_dir.clone())
            .ok_or_else(|| {
                CoreError::Config(core_runtime::Error::Config(
                    "No export directory configured".to_string(),
                ))
            })?;
        let collection = self.collection.read().await;
        let exporter = Exporter::new(root);
        let playlists = std::iter::once(&collection.liked_songs().0).chain(collection.playlists());
        Ok(exporter.write_all(playlists, collection.albums())?)
    }

    /// Persists the collection and flushes the resolver cache.
    pub async fn shutdown(&self) -> Result<()> {
        self.persist().await?;
        let flushed = self.resolver.persist().await?;
        info!(cache_entries = flushed, "Collection service stopped");
        Ok(())
    }

    fn emit(&self, event: CoreEvent) {
        self.events.emit(event).ok();
    }
}

fn emit_hydrated(events: &EventBus, sizes: CacheSizes) {
    events
        .emit(CoreEvent::Resolver(ResolverEvent::CacheHydrated {
            artists: sizes.artists as u64,
            songs: sizes.songs as u64,
            albums: sizes.albums as u64,
            ids: sizes.ids as u64,
        }))
        .ok();
}
