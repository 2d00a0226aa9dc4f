//! # One-shot Import
//!
//! Pulls liked songs, playlists and albums from a source, runs every
//! candidate through the authority resolver and its admission policy, and
//! builds a collection from what survives. Nothing is written back to the
//! source.
//!
//! Resolution runs on a [`TaskRunner`], one page of candidates at a time,
//! so a slow authority is queried with bounded concurrency while the order
//! of each page is kept.
//!
//! A playlist whose every candidate was rejected is dropped rather than
//! imported empty. A playlist that is empty on the source is kept.
//!
//! A container that fails with a query error is logged and skipped.
//! Authentication or configuration failures abort the import for this
//! source; the canonical collection is only touched once everything has
//! been pulled.

use crate::pager::fetch_page;
use crate::runner::TaskRunner;
use crate::{Result, SyncError};
use bridge_traits::source::{ContainerRef, SourceAdapter};
use core_async::sync::{CancellationToken, Mutex, RwLock};
use core_async::time::{timeout, Duration};
use core_library::collection::Collection;
use core_library::models::{Album, Playlist, Song};
use core_metadata::AuthorityResolver;
use core_runtime::config::{IdentityConfig, ReconcileConfig, RunnerConfig};
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Counts of what an import admitted and rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub liked_songs: u64,
    pub playlists: u64,
    pub albums: u64,
    /// Candidates dropped by the admission policy
    pub rejected: u64,
}

pub struct CollectionImporter {
    source: Arc<dyn SourceAdapter>,
    resolver: Arc<AuthorityResolver>,
    config: ReconcileConfig,
    runner_config: RunnerConfig,
    events: Option<EventBus>,
    cancel: CancellationToken,
}

impl CollectionImporter {
    pub fn new(source: Arc<dyn SourceAdapter>, resolver: Arc<AuthorityResolver>) -> Self {
        Self {
            source,
            resolver,
            config: ReconcileConfig::default(),
            runner_config: RunnerConfig::default(),
            events: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, config: ReconcileConfig) -> Self {
        self.config = config;
        self
    }

    /// Bounds how many songs are resolved at once.
    pub fn with_runner_config(mut self, config: RunnerConfig) -> Self {
        self.runner_config = config;
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Imports the source and merges the result into `collection`.
    pub async fn import_into(&self, collection: &RwLock<Collection>) -> Result<ImportReport> {
        let identity = collection.read().await.identity().clone();
        let (imported, report) = self.import(identity).await?;
        collection.write().await.merge(imported);

        if let Some(events) = &self.events {
            events
                .emit(CoreEvent::Library(LibraryEvent::Imported {
                    source: self.source.name().to_string(),
                    liked_songs: report.liked_songs,
                    playlists: report.playlists,
                    albums: report.albums,
                    rejected: report.rejected,
                }))
                .ok();
        }
        Ok(report)
    }

    /// Builds a fresh collection from the source.
    #[instrument(skip(self, identity), fields(source = %self.source.name()))]
    pub async fn import(&self, identity: IdentityConfig) -> Result<(Collection, ImportReport)> {
        let mut collection = Collection::new(identity);
        let mut report = ImportReport::default();

        match self.songs(&ContainerRef::LikedSongs, &mut report).await {
            Ok(songs) => {
                for song in songs {
                    if collection.add_song(song) {
                        report.liked_songs += 1;
                    }
                }
            }
            Err(e) => self.skip_or_abort("liked songs", e)?,
        }

        match self.source.fetch_playlists().await.map_err(SyncError::from) {
            Ok(containers) => {
                for container in containers {
                    let Some(mut playlist) = Playlist::from_source(self.source.name(), &container)
                    else {
                        continue;
                    };
                    let reference = ContainerRef::Playlist(container.id.clone());
                    let rejected_before = report.rejected;
                    match self.songs(&reference, &mut report).await {
                        Ok(songs) => playlist.songs = songs,
                        Err(e) => {
                            self.skip_or_abort(&playlist.name, e)?;
                            continue;
                        }
                    }
                    if playlist.songs.is_empty() && report.rejected > rejected_before {
                        debug!(playlist = %playlist.name, "Every song rejected; dropping playlist");
                        continue;
                    }
                    if collection.add_playlist(playlist) {
                        report.playlists += 1;
                    }
                }
            }
            Err(e) => self.skip_or_abort("playlists", e)?,
        }

        match self.source.fetch_albums().await.map_err(SyncError::from) {
            Ok(containers) => {
                for container in containers {
                    let Some(album) = Album::from_source(self.source.name(), &container) else {
                        continue;
                    };
                    let name = album.name.clone();
                    let Some(mut album) = self.resolver.canonical_album(album).await else {
                        debug!(album = %name, "Album rejected by admission policy");
                        report.rejected += 1;
                        continue;
                    };
                    let reference = ContainerRef::Album(container.id.clone());
                    match self.songs(&reference, &mut report).await {
                        Ok(songs) => album.songs = songs,
                        Err(e) => {
                            self.skip_or_abort(&name, e)?;
                            continue;
                        }
                    }
                    if collection.add_album(album) {
                        report.albums += 1;
                    }
                }
            }
            Err(e) => self.skip_or_abort("albums", e)?,
        }

        info!(
            liked_songs = report.liked_songs,
            playlists = report.playlists,
            albums = report.albums,
            rejected = report.rejected,
            "Import finished"
        );
        Ok((collection, report))
    }

    /// Every admitted song of one remote container.
    async fn songs(&self, container: &ContainerRef, report: &mut ImportReport) -> Result<Vec<Song>> {
        let source = self.source.name();
        let mut cursor = None;
        let mut retries = 0;
        let mut songs = Vec::new();

        loop {
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            let page = match fetch_page(self.source.as_ref(), container, cursor.take()).await {
                Ok(page) => page,
                Err(e) => match SyncError::from_bridge(e) {
                    SyncError::TransientRateLimit { retry_after_secs }
                        if retries < self.config.max_rate_limit_retries =>
                    {
                        retries += 1;
                        self.wait(retry_after_secs).await?;
                        continue;
                    }
                    other => return Err(other),
                },
            };
            retries = 0;
            if page.items.is_empty() {
                break;
            }

            let candidates: Vec<Song> = page
                .items
                .iter()
                .filter_map(|track| Song::from_source(source, track))
                .collect();
            for resolved in self.resolve_page(candidates).await? {
                match resolved {
                    Some(song) => songs.push(song),
                    None => report.rejected += 1,
                }
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(songs)
    }

    /// Resolves one page of candidates on the task runner, in page order.
    async fn resolve_page(&self, candidates: Vec<Song>) -> Result<Vec<Option<Song>>> {
        let resolved: Arc<Mutex<Vec<(usize, Option<Song>)>>> =
            Arc::new(Mutex::new(Vec::with_capacity(candidates.len())));
        let runner = TaskRunner::new(self.runner_config.clone(), self.cancel.clone());

        for (position, candidate) in candidates.into_iter().enumerate() {
            let resolver = Arc::clone(&self.resolver);
            let resolved = Arc::clone(&resolved);
            let label = format!("resolve {}", candidate.name);
            let submitted = runner
                .submit(label, async move {
                    let song = resolver.canonical_song(candidate).await;
                    resolved.lock().await.push((position, song));
                })
                .await;

            if let Err(e) = submitted {
                runner.drain(self.runner_config.drain_timeout).await.ok();
                return Err(e);
            }
        }
        runner.drain(self.runner_config.drain_timeout).await?;
        if self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let mut resolved = std::mem::take(&mut *resolved.lock().await);
        resolved.sort_by_key(|(position, _)| *position);
        Ok(resolved.into_iter().map(|(_, song)| song).collect())
    }

    async fn wait(&self, retry_after_secs: u64) -> Result<()> {
        debug!(retry_after_secs, "Source rate limited during import");
        let delay = Duration::from_secs(retry_after_secs);
        match timeout(delay, self.cancel.cancelled()).await {
            Ok(()) => Err(SyncError::Cancelled),
            Err(_) => Ok(()),
        }
    }

    fn skip_or_abort(&self, what: &str, error: SyncError) -> Result<()> {
        if error.is_source_fatal() || matches!(error, SyncError::Cancelled) {
            return Err(error);
        }
        warn!(container = %what, error = %error, "Skipping container after failure");
        Ok(())
    }
}
