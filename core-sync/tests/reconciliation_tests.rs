//! Integration tests for reconciliation and import
//!
//! These tests verify:
//! - A second pass with no external change applies nothing
//! - Removals are applied before additions
//! - An interrupted fetch resumes from the stored cursor
//! - Rate limits back off and keep progress
//! - Per-batch failures are skipped, per-source failures stay isolated
//! - Imports honor the admission policy and resolve on the task runner

use async_trait::async_trait;
use bridge_traits::authority::{AuthorityClient, AuthorityKind, AuthorityQuery, AuthorityRecord};
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::source::{ContainerRef, SourceAdapter, SourceContainer, SourcePage, SourceTrack};
use core_async::sync::{CancellationToken, RwLock};
use core_library::models::{Album, Playlist, Song};
use core_library::Collection;
use core_metadata::AuthorityResolver;
use core_runtime::config::{IdentityConfig, ReconcileConfig, ResolverConfig, RunnerConfig};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use core_sync::{CollectionImporter, ReconcileEngine, SyncError};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Mock source
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Fault {
    RateLimited,
    Auth,
    Query,
}

impl Fault {
    fn into_error(self) -> BridgeError {
        match self {
            Fault::RateLimited => BridgeError::RateLimited { retry_after_secs: 0 },
            Fault::Auth => BridgeError::Authentication("token revoked".into()),
            Fault::Query => BridgeError::QueryFailed("bad gateway".into()),
        }
    }
}

/// In-memory source that applies writes to its own state.
struct MockSource {
    name: String,
    page_size: usize,
    batch_size: usize,
    can_create: bool,
    liked: Mutex<Vec<SourceTrack>>,
    playlists: Mutex<Vec<(SourceContainer, Vec<SourceTrack>)>>,
    albums: Mutex<Vec<(SourceContainer, Vec<SourceTrack>)>>,
    /// Faults returned before serving a given page number (1-based)
    fetch_faults: Mutex<HashMap<usize, VecDeque<Fault>>>,
    /// Outcomes of the next add/remove calls; `None` lets a call through
    write_faults: Mutex<VecDeque<Option<Fault>>>,
    cursors_seen: Mutex<Vec<Option<String>>>,
    writes: Mutex<Vec<String>>,
    cancel_on_page: Mutex<Option<(usize, CancellationToken)>>,
}

impl MockSource {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            page_size: 50,
            batch_size: 50,
            can_create: false,
            liked: Mutex::new(Vec::new()),
            playlists: Mutex::new(Vec::new()),
            albums: Mutex::new(Vec::new()),
            fetch_faults: Mutex::new(HashMap::new()),
            write_faults: Mutex::new(VecDeque::new()),
            cursors_seen: Mutex::new(Vec::new()),
            writes: Mutex::new(Vec::new()),
            cancel_on_page: Mutex::new(None),
        }
    }

    fn with_liked(self, names: &[&str]) -> Self {
        *self.liked.lock().unwrap() = names.iter().map(|n| track(n)).collect();
        self
    }

    fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    fn with_playlist_creation(mut self) -> Self {
        self.can_create = true;
        self
    }

    fn with_playlist(self, id: &str, name: &str, names: &[&str]) -> Self {
        self.playlists.lock().unwrap().push((
            SourceContainer::new(id, name),
            names.iter().map(|n| track(n)).collect(),
        ));
        self
    }

    fn with_album(self, id: &str, name: &str, artist: &str, names: &[&str]) -> Self {
        self.albums.lock().unwrap().push((
            SourceContainer::new(id, name).with_artist(artist),
            names.iter().map(|n| track(n)).collect(),
        ));
        self
    }

    fn fail_fetch(&self, page: usize, fault: Fault) {
        self.fetch_faults
            .lock()
            .unwrap()
            .entry(page)
            .or_default()
            .push_back(fault);
    }

    fn fail_write(&self, fault: Fault) {
        self.write_faults.lock().unwrap().push_back(Some(fault));
    }

    /// Lets `passes` writes through, then fails the next one.
    fn fail_write_after(&self, passes: usize, fault: Fault) {
        let mut faults = self.write_faults.lock().unwrap();
        faults.extend(std::iter::repeat(None).take(passes));
        faults.push_back(Some(fault));
    }

    fn cancel_on_page(&self, page: usize, token: CancellationToken) {
        *self.cancel_on_page.lock().unwrap() = Some((page, token));
    }

    fn liked_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .liked
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.name.clone())
            .collect();
        names.sort();
        names
    }

    fn playlist_names(&self, id: &str) -> Vec<String> {
        let playlists = self.playlists.lock().unwrap();
        let mut names: Vec<String> = playlists
            .iter()
            .find(|(c, _)| c.id == id)
            .map(|(_, items)| items.iter().map(|t| t.name.clone()).collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    fn cursors_seen(&self) -> Vec<Option<String>> {
        self.cursors_seen.lock().unwrap().clone()
    }

    fn page(&self, items: &[SourceTrack], cursor: Option<String>) -> BridgeResult<SourcePage> {
        self.cursors_seen.lock().unwrap().push(cursor.clone());
        let number = cursor
            .as_deref()
            .and_then(|c| c.strip_prefix('p'))
            .and_then(|n| n.parse::<usize>().ok())
            .unwrap_or(1);

        if let Some(fault) = self
            .fetch_faults
            .lock()
            .unwrap()
            .get_mut(&number)
            .and_then(VecDeque::pop_front)
        {
            return Err(fault.into_error());
        }

        if let Some((page, token)) = self.cancel_on_page.lock().unwrap().as_ref() {
            if *page == number {
                token.cancel();
            }
        }

        let start = (number - 1) * self.page_size;
        let end = (start + self.page_size).min(items.len());
        let slice = if start < items.len() {
            items[start..end].to_vec()
        } else {
            Vec::new()
        };
        let next = (end < items.len()).then(|| format!("p{}", number + 1));
        Ok(SourcePage::new(slice, next))
    }

    fn write(&self, op: &str, container: &ContainerRef, items: &[SourceTrack]) -> BridgeResult<()> {
        if let Some(Some(fault)) = self.write_faults.lock().unwrap().pop_front() {
            return Err(fault.into_error());
        }
        self.writes
            .lock()
            .unwrap()
            .push(format!("{}:{}", op, items.len()));

        let apply = |target: &mut Vec<SourceTrack>| {
            if op == "add" {
                target.extend(items.iter().cloned());
            } else {
                target.retain(|t| !items.iter().any(|i| same_track(t, i)));
            }
        };
        match container {
            ContainerRef::LikedSongs => apply(&mut *self.liked.lock().unwrap()),
            ContainerRef::Playlist(id) => {
                let mut playlists = self.playlists.lock().unwrap();
                let (_, items) = playlists
                    .iter_mut()
                    .find(|(c, _)| &c.id == id)
                    .ok_or_else(|| BridgeError::QueryFailed(format!("no playlist {}", id)))?;
                apply(items);
            }
            ContainerRef::Album(id) => {
                let mut albums = self.albums.lock().unwrap();
                let (_, items) = albums
                    .iter_mut()
                    .find(|(c, _)| &c.id == id)
                    .ok_or_else(|| BridgeError::QueryFailed(format!("no album {}", id)))?;
                apply(items);
            }
        }
        Ok(())
    }
}

fn same_track(a: &SourceTrack, b: &SourceTrack) -> bool {
    match (&a.id, &b.id) {
        (Some(x), Some(y)) => x == y,
        _ => a.name.eq_ignore_ascii_case(&b.name),
    }
}

#[async_trait]
impl SourceAdapter for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn supports_playlist_creation(&self) -> bool {
        self.can_create
    }

    async fn fetch_liked_songs(&self, cursor: Option<String>) -> BridgeResult<SourcePage> {
        let items = self.liked.lock().unwrap().clone();
        self.page(&items, cursor)
    }

    async fn fetch_playlists(&self) -> BridgeResult<Vec<SourceContainer>> {
        Ok(self
            .playlists
            .lock()
            .unwrap()
            .iter()
            .map(|(c, _)| c.clone())
            .collect())
    }

    async fn fetch_playlist_items(&self, id: &str, cursor: Option<String>) -> BridgeResult<SourcePage> {
        let items = self
            .playlists
            .lock()
            .unwrap()
            .iter()
            .find(|(c, _)| c.id == id)
            .map(|(_, items)| items.clone())
            .ok_or_else(|| BridgeError::QueryFailed(format!("no playlist {}", id)))?;
        self.page(&items, cursor)
    }

    async fn fetch_albums(&self) -> BridgeResult<Vec<SourceContainer>> {
        Ok(self
            .albums
            .lock()
            .unwrap()
            .iter()
            .map(|(c, _)| c.clone())
            .collect())
    }

    async fn fetch_album_items(&self, id: &str, cursor: Option<String>) -> BridgeResult<SourcePage> {
        let items = self
            .albums
            .lock()
            .unwrap()
            .iter()
            .find(|(c, _)| c.id == id)
            .map(|(_, items)| items.clone())
            .ok_or_else(|| BridgeError::QueryFailed(format!("no album {}", id)))?;
        self.page(&items, cursor)
    }

    async fn add_items(&self, container: &ContainerRef, items: &[SourceTrack]) -> BridgeResult<()> {
        self.write("add", container, items)
    }

    async fn remove_items(&self, container: &ContainerRef, items: &[SourceTrack]) -> BridgeResult<()> {
        self.write("remove", container, items)
    }

    async fn create_playlist(&self, name: &str) -> BridgeResult<String> {
        let id = format!("pl-{}", self.playlists.lock().unwrap().len() + 1);
        self.playlists
            .lock()
            .unwrap()
            .push((SourceContainer::new(id.clone(), name), Vec::new()));
        Ok(id)
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn track(name: &str) -> SourceTrack {
    SourceTrack::new(name)
        .with_id(format!("t-{}", name.to_lowercase()))
        .with_artist("The Beatles")
        .with_duration_ms(200_000)
}

fn song(name: &str) -> Song {
    Song::new(name).with_artist("The Beatles").with_duration_secs(200)
}

fn collection_with_liked(names: &[&str]) -> Arc<RwLock<Collection>> {
    let mut collection = Collection::default();
    for name in names {
        collection.add_song(song(name));
    }
    Arc::new(RwLock::new(collection))
}

fn engine(source: Arc<MockSource>, collection: Arc<RwLock<Collection>>) -> ReconcileEngine {
    ReconcileEngine::new(source, collection)
        .with_runner_config(
            RunnerConfig::default()
                .with_concurrency(2)
                .with_submit_retry_delay(Duration::from_millis(1)),
        )
        .with_config(ReconcileConfig::default().with_max_rate_limit_retries(3))
}

fn drain_events(receiver: &mut core_async::sync::broadcast::Receiver<CoreEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        if let CoreEvent::Sync(event) = event {
            events.push(event);
        }
    }
    events
}

/// Authority that knows nothing.
struct NullAuthority;

#[async_trait]
impl AuthorityClient for NullAuthority {
    fn name(&self) -> &str {
        "musicbrainz"
    }

    async fn query(
        &self,
        _kind: AuthorityKind,
        _query: &AuthorityQuery,
    ) -> BridgeResult<Option<AuthorityRecord>> {
        Ok(None)
    }
}

/// Authority that knows nothing, slowly, and records overlapping queries.
#[derive(Default)]
struct SlowAuthority {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    queries: AtomicUsize,
}

#[async_trait]
impl AuthorityClient for SlowAuthority {
    fn name(&self) -> &str {
        "musicbrainz"
    }

    async fn query(
        &self,
        _kind: AuthorityKind,
        _query: &AuthorityQuery,
    ) -> BridgeResult<Option<AuthorityRecord>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.queries.fetch_add(1, Ordering::SeqCst);
        core_async::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(None)
    }
}

// ============================================================================
// Reconciliation
// ============================================================================

#[core_async::test]
async fn test_second_pass_is_idempotent() {
    let source = Arc::new(MockSource::new("spotify").with_liked(&["Bravo", "Charlie", "Delta"]));
    let collection = collection_with_liked(&["Alpha", "Bravo", "Charlie"]);
    let engine = engine(source.clone(), collection);

    let first = engine.sync_liked_songs().await.unwrap();
    assert_eq!(first.fetched, 3);
    assert_eq!(first.removed, 1);
    assert_eq!(first.added, 1);
    assert_eq!(source.liked_names(), vec!["Alpha", "Bravo", "Charlie"]);

    let writes_after_first = source.writes().len();
    let second = engine.sync_liked_songs().await.unwrap();
    assert_eq!(second.added, 0);
    assert_eq!(second.removed, 0);
    assert_eq!(second.skipped, 0);
    assert_eq!(source.writes().len(), writes_after_first);
}

#[core_async::test]
async fn test_removals_precede_additions() {
    let source = Arc::new(
        MockSource::new("spotify")
            .with_liked(&["Delta", "Echo", "Foxtrot"])
            .with_batch_size(1),
    );
    let collection = collection_with_liked(&["Alpha", "Bravo", "Charlie"]);

    let report = engine(source.clone(), collection).sync_liked_songs().await.unwrap();

    assert_eq!(report.removed, 3);
    assert_eq!(report.added, 3);
    let writes = source.writes();
    let last_remove = writes.iter().rposition(|w| w.starts_with("remove")).unwrap();
    let first_add = writes.iter().position(|w| w.starts_with("add")).unwrap();
    assert!(last_remove < first_add, "writes out of order: {:?}", writes);
}

#[core_async::test]
async fn test_interrupted_fetch_resumes_from_cursor() {
    let remote = [
        "Help", "Something", "Yesterday", "Michelle", "Girl", "Rain", "Julia", "Helter Skelter",
        "Penny Lane", "Revolution",
    ];
    let canonical = [
        "Help", "Something", "Yesterday", "Michelle", "Girl", "Rain", "Julia", "Helter Skelter",
        "Penny Lane", "Taxman",
    ];

    // Uninterrupted reference run
    let reference = Arc::new(MockSource::new("spotify").with_liked(&remote).with_page_size(2));
    let expected = engine(reference.clone(), collection_with_liked(&canonical))
        .sync_liked_songs()
        .await
        .unwrap();

    let source = Arc::new(MockSource::new("spotify").with_liked(&remote).with_page_size(2));
    let collection = collection_with_liked(&canonical);
    let token = CancellationToken::new();
    source.cancel_on_page(2, token.clone());

    let interrupted = engine(source.clone(), collection.clone())
        .with_cancellation_token(token)
        .sync_liked_songs()
        .await;
    assert!(matches!(interrupted, Err(SyncError::Cancelled)));
    {
        let stored = collection.read().await;
        let state = stored
            .resume_state("spotify", &ContainerRef::LikedSongs)
            .unwrap();
        assert_eq!(state.cursor.as_deref(), Some("p3"));
        assert_eq!(state.fetched.len(), 4);
    }
    assert!(source.writes().is_empty());

    *source.cancel_on_page.lock().unwrap() = None;
    let seen_before = source.cursors_seen().len();
    let resumed = engine(source.clone(), collection.clone())
        .sync_liked_songs()
        .await
        .unwrap();

    assert_eq!(source.cursors_seen()[seen_before], Some("p3".to_string()));
    assert_eq!(resumed, expected);
    assert_eq!(source.liked_names(), reference.liked_names());
    assert!(collection
        .read()
        .await
        .resume_state("spotify", &ContainerRef::LikedSongs)
        .is_none());
}

#[core_async::test]
async fn test_apply_failure_after_full_fetch_restarts_fetch() {
    let source = Arc::new(
        MockSource::new("spotify")
            .with_liked(&["Julia", "Girl", "Rain"])
            .with_page_size(2)
            .with_batch_size(1),
    );
    let collection = collection_with_liked(&["Girl", "Rain", "Help", "Something"]);
    // remove Julia, add one of Help/Something, then the token is revoked
    source.fail_write_after(2, Fault::Auth);

    let first = engine(source.clone(), collection.clone())
        .sync_liked_songs()
        .await;
    assert!(matches!(first, Err(SyncError::AuthenticationFailure(_))));
    assert!(collection
        .read()
        .await
        .resume_state("spotify", &ContainerRef::LikedSongs)
        .is_none());

    let seen_before = source.cursors_seen().len();
    let second = engine(source.clone(), collection.clone())
        .sync_liked_songs()
        .await
        .unwrap();

    assert_eq!(source.cursors_seen()[seen_before], None);
    assert_eq!(second.fetched, 3);
    assert_eq!(second.added, 1);
    assert_eq!(second.removed, 0);
    assert_eq!(source.liked_names(), vec!["Girl", "Help", "Rain", "Something"]);
}

#[core_async::test]
async fn test_rate_limit_backs_off_and_keeps_cursor() {
    let source = Arc::new(
        MockSource::new("spotify")
            .with_liked(&["Help", "Something", "Yesterday", "Michelle"])
            .with_page_size(2),
    );
    source.fail_fetch(2, Fault::RateLimited);
    let events = EventBus::new(256);
    let mut receiver = events.subscribe();

    let report = engine(
        source.clone(),
        collection_with_liked(&["Help", "Something", "Yesterday", "Michelle"]),
    )
        .with_event_bus(events)
        .sync_liked_songs()
        .await
        .unwrap();

    assert_eq!(report.fetched, 4);
    assert_eq!(
        source.cursors_seen(),
        vec![None, Some("p2".to_string()), Some("p2".to_string())]
    );

    let phases: Vec<(String, String)> = drain_events(&mut receiver)
        .into_iter()
        .filter_map(|e| match e {
            SyncEvent::PhaseChanged { from, to, .. } => Some((from, to)),
            _ => None,
        })
        .collect();
    assert_eq!(phases[0], ("fetching".to_string(), "backoff".to_string()));
    assert_eq!(phases[1], ("backoff".to_string(), "fetching".to_string()));
    assert_eq!(phases.last().unwrap().1, "done");
}

#[core_async::test]
async fn test_rate_limited_batch_is_retried() {
    let source = Arc::new(MockSource::new("spotify").with_batch_size(1));
    source.fail_write(Fault::RateLimited);

    let report = engine(source.clone(), collection_with_liked(&["Help", "Something", "Yesterday"]))
        .sync_liked_songs()
        .await
        .unwrap();

    assert_eq!(report.added, 3);
    assert_eq!(report.skipped, 0);
    assert_eq!(source.liked_names(), vec!["Help", "Something", "Yesterday"]);
}

#[core_async::test]
async fn test_failed_batch_is_skipped_not_fatal() {
    let source = Arc::new(MockSource::new("spotify").with_batch_size(1));
    source.fail_write(Fault::Query);

    let report = engine(source.clone(), collection_with_liked(&["Help", "Something", "Yesterday"]))
        .sync_liked_songs()
        .await
        .unwrap();

    assert_eq!(report.added, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(source.liked_names().len(), 2);
}

#[core_async::test]
async fn test_auth_failure_aborts_only_that_source() {
    let collection = collection_with_liked(&["Help", "Something"]);
    let before = collection.read().await.liked_songs().songs.clone();

    let broken = Arc::new(MockSource::new("tidal").with_liked(&["Girl"]));
    broken.fail_fetch(1, Fault::Auth);
    let healthy = Arc::new(MockSource::new("spotify").with_liked(&["Something"]));

    let events = EventBus::new(64);
    let mut receiver = events.subscribe();
    let err = engine(broken.clone(), collection.clone())
        .with_event_bus(events)
        .sync_liked_songs()
        .await
        .unwrap_err();
    assert!(err.is_source_fatal());
    assert!(broken.writes().is_empty());
    assert_eq!(collection.read().await.liked_songs().songs, before);
    assert!(drain_events(&mut receiver)
        .iter()
        .any(|e| matches!(e, SyncEvent::Failed { recoverable: false, .. })));

    let report = engine(healthy.clone(), collection.clone())
        .sync_liked_songs()
        .await
        .unwrap();
    assert_eq!(report.added, 1);
    assert_eq!(healthy.liked_names(), vec!["Help", "Something"]);
}

#[core_async::test]
async fn test_unknown_container_is_reported() {
    let source = Arc::new(MockSource::new("spotify"));
    let err = engine(source, collection_with_liked(&[]))
        .reconcile(&ContainerRef::Playlist("missing".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::UnknownContainer(_)));
    assert!(!err.is_recoverable());
}

#[core_async::test]
async fn test_sync_playlists_links_creates_and_skips() {
    let mut canonical = Collection::default();
    let mut road_trip = Playlist::new("Road Trip");
    road_trip.songs = vec![song("Drive My Car"), song("Taxman")];
    canonical.add_playlist(road_trip);
    let mut chill = Playlist::new("chill");
    chill.songs = vec![song("Blackbird")];
    canonical.add_playlist(chill);
    let collection = Arc::new(RwLock::new(canonical));

    // "Chill" exists remotely under a different case; "Road Trip" does not.
    let source = Arc::new(
        MockSource::new("spotify")
            .with_playlist("pl-chill", "Chill", &["Blackbird", "Yesterday"])
            .with_playlist_creation(),
    );

    let report = engine(source.clone(), collection.clone())
        .sync_playlists()
        .await
        .unwrap();

    assert_eq!(report.added, 2);
    assert_eq!(report.removed, 1);
    assert_eq!(source.playlist_names("pl-chill"), vec!["Blackbird"]);
    let created = collection
        .read()
        .await
        .playlist("Road Trip")
        .and_then(|p| p.id_for("spotify").map(str::to_string))
        .unwrap();
    assert_eq!(source.playlist_names(&created), vec!["Drive My Car", "Taxman"]);

    // A source that cannot create playlists leaves them alone.
    let mut only_local = Collection::default();
    only_local.add_playlist(Playlist::new("Local Only"));
    let readonly = Arc::new(MockSource::new("jellyfin"));
    let report = engine(readonly.clone(), Arc::new(RwLock::new(only_local)))
        .sync_playlist("Local Only")
        .await
        .unwrap();
    assert_eq!(report, Default::default());
    assert!(readonly.writes().is_empty());
}

#[core_async::test]
async fn test_sync_album_links_by_name_and_artist() {
    let mut canonical = Collection::default();
    let mut album = Album::new("Abbey Road").with_artist("The Beatles");
    album.songs = vec![song("Come Together"), song("Something")];
    canonical.add_album(album);
    let collection = Arc::new(RwLock::new(canonical));

    let source = Arc::new(MockSource::new("spotify").with_album(
        "al-1",
        "abbey road",
        "The Beatles",
        &["Come Together"],
    ));

    let report = engine(source.clone(), collection.clone())
        .sync_albums()
        .await
        .unwrap();
    assert_eq!(report.added, 1);
    assert_eq!(
        collection
            .read()
            .await
            .album("Abbey Road", Some("The Beatles"))
            .and_then(|a| a.id_for("spotify").map(str::to_string)),
        Some("al-1".to_string())
    );
}

#[core_async::test]
async fn test_same_titled_albums_sync_to_their_own_remote() {
    let mut canonical = Collection::default();
    let mut queen = Album::new("Greatest Hits").with_artist("Queen");
    queen.songs = vec![Song::new("Bohemian Rhapsody").with_artist("Queen").with_duration_secs(354)];
    canonical.add_album(queen);
    let mut abba = Album::new("Greatest Hits").with_artist("ABBA");
    abba.songs = vec![
        Song::new("Waterloo").with_artist("ABBA").with_duration_secs(167),
        Song::new("Dancing Queen").with_artist("ABBA").with_duration_secs(231),
    ];
    canonical.add_album(abba);
    let collection = Arc::new(RwLock::new(canonical));

    let source = Arc::new(MockSource::new("spotify"));
    source.albums.lock().unwrap().extend([
        (
            SourceContainer::new("al-queen", "Greatest Hits").with_artist("Queen"),
            vec![SourceTrack::new("Bohemian Rhapsody")
                .with_id("t-bohemian")
                .with_artist("Queen")
                .with_duration_ms(354_000)],
        ),
        (
            SourceContainer::new("al-abba", "Greatest Hits").with_artist("ABBA"),
            vec![SourceTrack::new("Waterloo")
                .with_id("t-waterloo")
                .with_artist("ABBA")
                .with_duration_ms(167_000)],
        ),
    ]);

    let report = engine(source.clone(), collection.clone())
        .sync_albums()
        .await
        .unwrap();

    assert_eq!(report.added, 1);
    assert_eq!(report.removed, 0);
    let stored = collection.read().await;
    assert_eq!(
        stored
            .album("Greatest Hits", Some("Queen"))
            .and_then(|a| a.id_for("spotify")),
        Some("al-queen")
    );
    assert_eq!(
        stored
            .album("Greatest Hits", Some("ABBA"))
            .and_then(|a| a.id_for("spotify")),
        Some("al-abba")
    );
    let albums = source.albums.lock().unwrap();
    let abba_remote: Vec<&str> = albums
        .iter()
        .find(|(c, _)| c.id == "al-abba")
        .map(|(_, items)| items.iter().map(|t| t.name.as_str()).collect())
        .unwrap_or_default();
    assert_eq!(abba_remote, vec!["Waterloo", "Dancing Queen"]);
    let queen_remote = albums.iter().find(|(c, _)| c.id == "al-queen").map(|(_, items)| items.len());
    assert_eq!(queen_remote, Some(1));
}

// ============================================================================
// Import
// ============================================================================

#[core_async::test]
async fn test_import_verified_only_with_null_authority_admits_nothing() {
    let source = Arc::new(
        MockSource::new("spotify")
            .with_liked(&["Michelle", "Girl"])
            .with_playlist("pl-1", "Mix", &["Rain"])
            .with_album("al-1", "Help!", "The Beatles", &["Help!"]),
    );
    let resolver = Arc::new(
        AuthorityResolver::new(ResolverConfig::default().with_verified_only(true))
            .with_client(Arc::new(NullAuthority)),
    );

    let (collection, report) = CollectionImporter::new(source, resolver)
        .import(IdentityConfig::default())
        .await
        .unwrap();

    assert_eq!(collection.track_count(), 0);
    assert!(collection.liked_songs().songs.is_empty());
    assert!(collection.albums().is_empty());
    assert!(collection.playlists().is_empty());
    assert_eq!(report.liked_songs, 0);
    assert_eq!(report.playlists, 0);
    // two liked songs, one playlist song, one album
    assert_eq!(report.rejected, 4);
}

#[core_async::test]
async fn test_import_keeps_playlist_that_is_empty_on_source() {
    let source = Arc::new(
        MockSource::new("spotify")
            .with_playlist("pl-1", "Mix", &["Rain"])
            .with_playlist("pl-2", "Someday", &[]),
    );
    let resolver = Arc::new(
        AuthorityResolver::new(ResolverConfig::default().with_verified_only(true))
            .with_client(Arc::new(NullAuthority)),
    );

    let (collection, report) = CollectionImporter::new(source, resolver)
        .import(IdentityConfig::default())
        .await
        .unwrap();

    assert_eq!(report.playlists, 1);
    assert!(collection.playlist("Mix").is_none());
    assert_eq!(collection.playlist("Someday").map(|p| p.songs.len()), Some(0));
}

#[core_async::test]
async fn test_import_resolves_through_bounded_runner() {
    let names = ["Michelle", "Girl", "Rain", "Julia", "Help", "Taxman"];
    let source = Arc::new(MockSource::new("spotify").with_liked(&names));
    let authority = Arc::new(SlowAuthority::default());
    let resolver = Arc::new(
        AuthorityResolver::new(ResolverConfig::default().with_verified_only(false))
            .with_client(authority.clone()),
    );

    let (collection, report) = CollectionImporter::new(source, resolver)
        .with_runner_config(
            RunnerConfig::default()
                .with_concurrency(2)
                .with_submit_retry_delay(Duration::from_millis(1)),
        )
        .import(IdentityConfig::default())
        .await
        .unwrap();

    assert_eq!(report.liked_songs, 6);
    assert_eq!(authority.queries.load(Ordering::SeqCst), 6);
    assert_eq!(authority.peak.load(Ordering::SeqCst), 2);
    let imported: Vec<&str> = collection
        .liked_songs()
        .songs
        .iter()
        .map(|s| s.name.as_str())
        .collect();
    assert_eq!(imported, names);
}

#[core_async::test]
async fn test_import_without_authority_merges_candidates() {
    let source = Arc::new(
        MockSource::new("spotify")
            .with_liked(&["Michelle", "Girl"])
            .with_playlist("pl-1", "Mix", &["Michelle", "Rain"])
            .with_album("al-1", "Help!", "The Beatles", &["Help!"]),
    );
    let resolver = Arc::new(AuthorityResolver::new(ResolverConfig::default()));
    let collection = Arc::new(RwLock::new(Collection::default()));
    collection.write().await.add_song(song("michelle").with_cover("cover.png"));

    let report = CollectionImporter::new(source, resolver)
        .import_into(&collection)
        .await
        .unwrap();

    assert_eq!(report.liked_songs, 2);
    assert_eq!(report.playlists, 1);
    assert_eq!(report.albums, 1);
    let merged = collection.read().await;
    assert_eq!(merged.liked_songs().songs.len(), 2);
    assert_eq!(merged.liked_songs().songs[0].cover.as_deref(), Some("cover.png"));
    assert_eq!(merged.liked_songs().songs[0].id_for("spotify"), Some("t-michelle"));
    assert_eq!(merged.playlist("Mix").map(|p| p.songs.len()), Some(2));
}

#[core_async::test]
async fn test_import_skips_failing_container_but_not_auth() {
    let source = Arc::new(
        MockSource::new("spotify")
            .with_liked(&["Michelle"])
            .with_playlist("pl-1", "Mix", &["Rain"]),
    );
    // Page 1 of liked songs fails once with a query error; the playlist's
    // page 1 is served normally afterwards.
    source.fail_fetch(1, Fault::Query);
    let resolver = Arc::new(AuthorityResolver::new(ResolverConfig::default()));
    let importer = CollectionImporter::new(source.clone(), resolver.clone());

    let (collection, report) = importer.import(IdentityConfig::default()).await.unwrap();
    assert_eq!(report.liked_songs, 0);
    assert_eq!(report.playlists, 1);
    assert_eq!(collection.playlist("Mix").map(|p| p.songs.len()), Some(1));

    source.fail_fetch(1, Fault::Auth);
    let err = CollectionImporter::new(source, resolver)
        .import(IdentityConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::AuthenticationFailure(_)));
}
