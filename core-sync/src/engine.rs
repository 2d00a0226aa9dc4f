//! # Reconciliation Engine
//!
//! Converges one remote container (liked songs, a playlist or an album) to
//! the canonical collection.
//!
//! ## Workflow
//!
//! 1. **Fetching**: pull remote items page by page. After every page the
//!    cursor and the items fetched so far are stored on the owning container
//!    so an interrupted pass resumes instead of restarting.
//! 2. **Diffing**: `to_remove = remote - canonical`, `to_add = canonical - remote`
//!    by song identity.
//! 3. **Applying**: all removals, then all additions, in batches of the
//!    source's declared size, run on the bounded [`TaskRunner`].
//!
//! A rate-limited fetch or batch moves the pass to `Backoff`, sleeps for
//! exactly the requested duration and returns to the phase it left, keeping
//! every cursor and applied batch.
//!
//! ## Failures
//!
//! - One failed batch is logged and counted as skipped; the pass continues.
//! - Authentication or missing configuration aborts this source only.
//! - Cancellation is observed before each page fetch and each batch
//!   submission. Work already applied stays applied; re-running is safe.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let engine = ReconcileEngine::new(adapter, collection)
//!     .with_event_bus(events.clone())
//!     .with_cancellation_token(token.clone());
//!
//! let report = engine.sync_liked_songs().await?;
//! println!("{}", report);
//! ```

use crate::diff::{compute_diff, Diff};
use crate::job::{ReconcileJob, SyncPhase};
use crate::pager::fetch_page;
use crate::report::SyncReport;
use crate::runner::TaskRunner;
use crate::{Result, SyncError};
use bridge_traits::source::{ContainerRef, SourceAdapter, SourceContainer, SourceTrack};
use core_async::sync::{CancellationToken, Mutex, RwLock};
use core_async::time::{timeout, Duration};
use core_library::collection::Collection;
use core_library::identity::normalize;
use core_library::models::{ResumeState, Song};
use core_runtime::config::{ReconcileConfig, RunnerConfig};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Remote write kind, applied in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Remove,
    Add,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Remove => f.write_str("remove"),
            Operation::Add => f.write_str("add"),
        }
    }
}

struct BatchOutcome {
    batch: Vec<SourceTrack>,
    result: bridge_traits::error::Result<()>,
}

/// Totals for one operation over a whole diff list.
#[derive(Default)]
struct Applied {
    applied: u64,
    skipped: u64,
}

pub struct ReconcileEngine {
    source: Arc<dyn SourceAdapter>,
    collection: Arc<RwLock<Collection>>,
    config: ReconcileConfig,
    runner_config: RunnerConfig,
    events: Option<EventBus>,
    cancel: CancellationToken,
}

impl ReconcileEngine {
    pub fn new(source: Arc<dyn SourceAdapter>, collection: Arc<RwLock<Collection>>) -> Self {
        Self {
            source,
            collection,
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

    pub fn with_runner_config(mut self, config: RunnerConfig) -> Self {
        self.runner_config = config;
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Token observed at every safe point of a pass.
    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    // =========================================================================
    // Operations
    // =========================================================================

    pub async fn sync_liked_songs(&self) -> Result<SyncReport> {
        self.reconcile(&ContainerRef::LikedSongs).await
    }

    /// Syncs one canonical playlist, linking or creating its remote copy
    /// first when the collection has no id for this source.
    ///
    /// Returns an empty report when the remote playlist is missing and the
    /// source cannot create playlists.
    pub async fn sync_playlist(&self, name: &str) -> Result<SyncReport> {
        let remote = self.source.fetch_playlists().await?;
        self.sync_playlist_with(name, &remote).await
    }

    /// Syncs every canonical playlist. A failing playlist is logged and
    /// skipped unless the failure ends the whole source.
    #[instrument(skip(self), fields(source = %self.source.name()))]
    pub async fn sync_playlists(&self) -> Result<SyncReport> {
        let names: Vec<String> = {
            let collection = self.collection.read().await;
            collection.playlists().iter().map(|p| p.name.clone()).collect()
        };
        let remote = self.source.fetch_playlists().await?;

        let mut total = SyncReport::default();
        for name in names {
            match self.sync_playlist_with(&name, &remote).await {
                Ok(report) => total.absorb(report),
                Err(e) if e.is_source_fatal() || matches!(e, SyncError::Cancelled) => {
                    return Err(e)
                }
                Err(e) => warn!(playlist = %name, error = %e, "Playlist sync failed; continuing"),
            }
        }
        info!(playlists = %total, "Playlists synced");
        Ok(total)
    }

    /// Syncs one canonical album, identified by name and main artist.
    /// Albums are linked to remote ones by the same key; they are never
    /// created remotely.
    pub async fn sync_album(&self, name: &str, artist: Option<&str>) -> Result<SyncReport> {
        let remote = self.source.fetch_albums().await?;
        self.sync_album_with(name, artist, &remote).await
    }

    #[instrument(skip(self), fields(source = %self.source.name()))]
    pub async fn sync_albums(&self) -> Result<SyncReport> {
        let keys: Vec<(String, Option<String>)> = {
            let collection = self.collection.read().await;
            collection
                .albums()
                .iter()
                .map(|a| (a.name.clone(), a.main_artist().map(|x| x.name.clone())))
                .collect()
        };
        let remote = self.source.fetch_albums().await?;

        let mut total = SyncReport::default();
        for (name, artist) in keys {
            match self.sync_album_with(&name, artist.as_deref(), &remote).await {
                Ok(report) => total.absorb(report),
                Err(e) if e.is_source_fatal() || matches!(e, SyncError::Cancelled) => {
                    return Err(e)
                }
                Err(e) => warn!(album = %name, error = %e, "Album sync failed; continuing"),
            }
        }
        info!(albums = %total, "Albums synced");
        Ok(total)
    }

    async fn sync_playlist_with(&self, name: &str, remote: &[SourceContainer]) -> Result<SyncReport> {
        let source = self.source.name();
        let known_id = {
            let collection = self.collection.read().await;
            let playlist = collection
                .playlist(name)
                .ok_or_else(|| SyncError::UnknownContainer(format!("playlist:{}", name)))?;
            playlist.id_for(source).map(str::to_string)
        };

        let id = match known_id {
            Some(id) => id,
            None => {
                let wanted = normalize(name);
                let linked = remote
                    .iter()
                    .find(|c| normalize(&c.name) == wanted)
                    .map(|c| c.id.clone());
                let id = match linked {
                    Some(id) => id,
                    None if self.source.supports_playlist_creation() => {
                        let id = self.source.create_playlist(name).await?;
                        info!(playlist = %name, id = %id, "Created remote playlist");
                        id
                    }
                    None => {
                        debug!(playlist = %name, "Source cannot create playlists; skipping");
                        return Ok(SyncReport::default());
                    }
                };
                self.collection
                    .write()
                    .await
                    .set_playlist_source_id(name, source, &id);
                id
            }
        };

        self.reconcile(&ContainerRef::Playlist(id)).await
    }

    async fn sync_album_with(
        &self,
        name: &str,
        artist: Option<&str>,
        remote: &[SourceContainer],
    ) -> Result<SyncReport> {
        let source = self.source.name();
        let (known_id, main_artist) = {
            let collection = self.collection.read().await;
            let album = collection
                .album(name, artist)
                .ok_or_else(|| SyncError::UnknownContainer(format!("album:{}", name)))?;
            (
                album.id_for(source).map(str::to_string),
                album.main_artist().map(|a| normalize(&a.name)),
            )
        };

        let id = match known_id {
            Some(id) => id,
            None => {
                let wanted = normalize(name);
                let mut collection = self.collection.write().await;
                let linked = remote.iter().find(|c| {
                    normalize(&c.name) == wanted
                        && collection.album_by_source_id(source, &c.id).is_none()
                        && match (&main_artist, c.artists.first()) {
                            (Some(ours), Some(theirs)) => *ours == normalize(theirs),
                            _ => true,
                        }
                });
                match linked {
                    Some(container) => {
                        collection.set_album_source_id(name, artist, source, &container.id);
                        container.id.clone()
                    }
                    None => {
                        debug!(album = %name, "Album not saved on source; skipping");
                        return Ok(SyncReport::default());
                    }
                }
            }
        };

        self.reconcile(&ContainerRef::Album(id)).await
    }

    // =========================================================================
    // Reconciliation pass
    // =========================================================================

    /// Runs fetch, diff and apply for one container.
    #[instrument(skip(self), fields(source = %self.source.name(), container = %container))]
    pub async fn reconcile(&self, container: &ContainerRef) -> Result<SyncReport> {
        let mut job = ReconcileJob::new(self.source.name(), container.clone());
        self.emit(SyncEvent::Started {
            job_id: job.id.to_string(),
            source: job.source.clone(),
            container: container.to_string(),
        });

        let limit = self.config.sync_timeout_secs;
        let outcome = match timeout(Duration::from_secs(limit), self.run(&mut job)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(SyncError::Timeout(limit)),
        };

        match outcome {
            Ok(report) => {
                info!(job_id = %job.id, %report, "Reconciliation completed");
                self.emit(SyncEvent::Completed {
                    job_id: job.id.to_string(),
                    source: job.source.clone(),
                    fetched: report.fetched,
                    added: report.added,
                    removed: report.removed,
                    skipped: report.skipped,
                    duration_secs: job.duration_secs(),
                });
                Ok(report)
            }
            Err(SyncError::Cancelled) => {
                job.transition(SyncPhase::Cancelled).ok();
                info!(job_id = %job.id, "Reconciliation cancelled");
                self.emit(SyncEvent::Cancelled {
                    job_id: job.id.to_string(),
                    source: job.source.clone(),
                });
                Err(SyncError::Cancelled)
            }
            Err(e) => {
                job.transition(SyncPhase::Failed).ok();
                warn!(job_id = %job.id, error = %e, "Reconciliation failed");
                self.emit(SyncEvent::Failed {
                    job_id: job.id.to_string(),
                    source: job.source.clone(),
                    message: e.to_string(),
                    recoverable: e.is_recoverable(),
                });
                Err(e)
            }
        }
    }

    async fn run(&self, job: &mut ReconcileJob) -> Result<SyncReport> {
        let source = self.source.name().to_string();
        if self
            .collection
            .read()
            .await
            .container_songs(&source, &job.container)
            .is_none()
        {
            return Err(SyncError::UnknownContainer(job.container.to_string()));
        }

        let remote = self.fetch(job).await?;
        // Saved pages only describe an unfinished fetch. Once every page is
        // in hand a later failure must restart from the first page.
        self.collection
            .write()
            .await
            .clear_resume_state(&source, &job.container);
        let mut report = SyncReport {
            fetched: remote.len() as u64,
            ..Default::default()
        };

        self.advance(job, SyncPhase::Diffing)?;
        let diff = {
            let collection = self.collection.read().await;
            let canonical = collection
                .container_songs(&source, &job.container)
                .ok_or_else(|| SyncError::UnknownContainer(job.container.to_string()))?;
            compute_diff(canonical, &remote, collection.identity())
        };
        debug!(
            to_remove = diff.to_remove.len(),
            to_add = diff.to_add.len(),
            "Diff computed"
        );

        self.advance(job, SyncPhase::Applying)?;
        self.apply(job, &diff, &mut report).await?;

        self.advance(job, SyncPhase::Done)?;
        Ok(report)
    }

    /// Pulls every remote page, resuming from saved progress.
    async fn fetch(&self, job: &mut ReconcileJob) -> Result<Vec<Song>> {
        let source = self.source.name().to_string();
        let saved = self
            .collection
            .read()
            .await
            .resume_state(&source, &job.container)
            .cloned();
        let (mut cursor, mut fetched) = match saved {
            Some(state) => {
                info!(
                    cursor = ?state.cursor,
                    already_fetched = state.fetched.len(),
                    "Resuming interrupted fetch"
                );
                (state.cursor, state.fetched)
            }
            None => (None, Vec::new()),
        };

        let mut retries = 0;
        loop {
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let page = match fetch_page(self.source.as_ref(), &job.container, cursor.clone()).await {
                Ok(page) => page,
                Err(e) => match SyncError::from_bridge(e) {
                    SyncError::TransientRateLimit { retry_after_secs } => {
                        self.backoff(job, retry_after_secs, &mut retries).await?;
                        continue;
                    }
                    other => return Err(other),
                },
            };
            retries = 0;

            if page.items.is_empty() {
                break;
            }
            fetched.extend(
                page.items
                    .iter()
                    .filter_map(|track| Song::from_source(&source, track)),
            );
            self.emit(SyncEvent::Progress {
                job_id: job.id.to_string(),
                fetched: fetched.len() as u64,
                pending: 0,
                phase: SyncPhase::Fetching.to_string(),
            });

            match page.next_cursor {
                Some(next) => {
                    cursor = Some(next);
                    let state = ResumeState {
                        cursor: cursor.clone(),
                        fetched: fetched.clone(),
                    };
                    self.collection
                        .write()
                        .await
                        .set_resume_state(&source, &job.container, state);
                }
                None => break,
            }
        }

        debug!(fetched = fetched.len(), "Fetch finished");
        Ok(fetched)
    }

    async fn apply(&self, job: &mut ReconcileJob, diff: &Diff, report: &mut SyncReport) -> Result<()> {
        let source = self.source.name().to_string();
        let to_tracks = |songs: &[Song]| -> Vec<SourceTrack> {
            songs.iter().map(|s| s.to_source_track(&source)).collect()
        };

        let removed = self
            .apply_operation(job, Operation::Remove, to_tracks(&diff.to_remove))
            .await?;
        report.removed += removed.applied;
        report.skipped += removed.skipped;

        let added = self
            .apply_operation(job, Operation::Add, to_tracks(&diff.to_add))
            .await?;
        report.added += added.applied;
        report.skipped += added.skipped;
        Ok(())
    }

    /// Applies one operation over all its items in waves of batches. A wave
    /// that hit rate limiting is followed by a backoff and a retry of only
    /// the limited batches.
    async fn apply_operation(
        &self,
        job: &mut ReconcileJob,
        operation: Operation,
        items: Vec<SourceTrack>,
    ) -> Result<Applied> {
        let batch_size = self.source.batch_size().max(1);
        let mut pending: Vec<Vec<SourceTrack>> =
            items.chunks(batch_size).map(|chunk| chunk.to_vec()).collect();
        let mut totals = Applied::default();
        let mut retries = 0;

        while !pending.is_empty() {
            let outcomes: Arc<Mutex<Vec<BatchOutcome>>> = Arc::new(Mutex::new(Vec::new()));
            let runner = TaskRunner::new(self.runner_config.clone(), self.cancel.clone());

            for (index, batch) in std::mem::take(&mut pending).into_iter().enumerate() {
                let source = Arc::clone(&self.source);
                let container = job.container.clone();
                let outcomes = Arc::clone(&outcomes);
                let label = format!("{} {} batch {}", operation, container, index);
                let submitted = runner
                    .submit(label, async move {
                        let result = match operation {
                            Operation::Remove => source.remove_items(&container, &batch).await,
                            Operation::Add => source.add_items(&container, &batch).await,
                        };
                        outcomes.lock().await.push(BatchOutcome { batch, result });
                    })
                    .await;

                if let Err(e) = submitted {
                    // Let accepted batches finish before unwinding.
                    runner.drain(self.runner_config.drain_timeout).await.ok();
                    return Err(e);
                }
            }
            runner.drain(self.runner_config.drain_timeout).await?;

            let mut retry_after: Option<u64> = None;
            for BatchOutcome { batch, result } in std::mem::take(&mut *outcomes.lock().await) {
                let size = batch.len() as u64;
                match result {
                    Ok(()) => totals.applied += size,
                    Err(e) => match SyncError::from_bridge(e) {
                        SyncError::TransientRateLimit { retry_after_secs } => {
                            retry_after = Some(retry_after.unwrap_or(0).max(retry_after_secs));
                            pending.push(batch);
                        }
                        fatal if fatal.is_source_fatal() => return Err(fatal),
                        other => {
                            warn!(
                                operation = %operation,
                                items = size,
                                error = %other,
                                "Batch failed; skipping"
                            );
                            totals.skipped += size;
                        }
                    },
                }
            }

            self.emit(SyncEvent::Progress {
                job_id: job.id.to_string(),
                fetched: 0,
                pending: pending.iter().map(|b| b.len() as u64).sum(),
                phase: SyncPhase::Applying.to_string(),
            });

            if let Some(secs) = retry_after {
                match self.backoff(job, secs, &mut retries).await {
                    Ok(()) => {}
                    Err(SyncError::TransientRateLimit { .. }) => {
                        let left: u64 = pending.iter().map(|b| b.len() as u64).sum();
                        warn!(
                            operation = %operation,
                            items = left,
                            "Rate limit retries exhausted; skipping remaining batches"
                        );
                        totals.skipped += left;
                        pending.clear();
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(totals)
    }

    // =========================================================================
    // Phase handling
    // =========================================================================

    /// Sleeps out a rate limit in the `Backoff` phase, then returns to the
    /// phase that was interrupted.
    ///
    /// Fails with `TransientRateLimit` once the retry budget is spent.
    async fn backoff(&self, job: &mut ReconcileJob, retry_after_secs: u64, retries: &mut u32) -> Result<()> {
        if *retries >= self.config.max_rate_limit_retries {
            return Err(SyncError::TransientRateLimit { retry_after_secs });
        }
        *retries += 1;

        self.advance(job, SyncPhase::Backoff)?;
        info!(
            retry_after_secs,
            attempt = *retries,
            "Source rate limited; backing off"
        );

        let delay = Duration::from_secs(retry_after_secs);
        if timeout(delay, self.cancel.cancelled()).await.is_ok() {
            return Err(SyncError::Cancelled);
        }

        let resumed = job.resume_from_backoff()?;
        self.emit(SyncEvent::PhaseChanged {
            job_id: job.id.to_string(),
            from: SyncPhase::Backoff.to_string(),
            to: resumed.to_string(),
        });
        Ok(())
    }

    fn advance(&self, job: &mut ReconcileJob, to: SyncPhase) -> Result<SyncPhase> {
        let from = job.transition(to)?;
        debug!(job_id = %job.id, %from, %to, "Phase changed");
        self.emit(SyncEvent::PhaseChanged {
            job_id: job.id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        });
        Ok(from)
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(events) = &self.events {
            events.emit(CoreEvent::Sync(event)).ok();
        }
    }
}
