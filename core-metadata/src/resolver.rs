//! # Authority Resolver
//!
//! Resolves loosely typed artists, songs and albums against a metadata
//! authority, with a cache in front of it.
//!
//! ## Overview
//!
//! `resolve` answers from the cache when it can. Otherwise it asks the
//! authority once, caches the top result and persists the new rows right
//! away. Misses and failures come back as `None`; nothing here is fatal to
//! the caller:
//!
//! - no match or a malformed response is logged at `debug`
//! - rate limiting sleeps for the advertised retry-after, then retries
//! - authentication or configuration problems are logged at `warn`
//!
//! The `canonical_*` helpers combine resolution with the
//! [`AdmissionPolicy`]. When no authority client is configured, candidates
//! that miss the cache pass through unchanged.
//!
//! ## Usage
//!
//! ```ignore
//! let resolver = AuthorityResolver::new(config.resolver.clone())
//!     .with_client(client)
//!     .with_repository(cache_repo);
//! resolver.hydrate().await?;
//!
//! if let Some(song) = resolver.canonical_song(candidate).await {
//!     collection.add_song(song);
//! }
//! resolver.persist().await?;
//! ```

use crate::cache::{CacheSizes, ResolverCache};
use crate::error::Result;
use crate::policy::{
    album_from_record, album_query, artist_from_record, artist_query, song_from_record, song_query,
    AdmissionPolicy,
};
use bridge_traits::authority::{AuthorityClient, AuthorityKind, AuthorityQuery, AuthorityRecord};
use core_async::sync::Mutex;
use core_async::time::sleep;
use core_library::models::{Album, Artist, Song};
use core_library::repositories::{CacheRow, ResolverCacheRepository};
use core_runtime::config::ResolverConfig;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub struct AuthorityResolver {
    client: Option<Arc<dyn AuthorityClient>>,
    repository: Option<Arc<dyn ResolverCacheRepository>>,
    cache: Mutex<ResolverCache>,
    config: ResolverConfig,
    policy: AdmissionPolicy,
}

impl AuthorityResolver {
    pub fn new(config: ResolverConfig) -> Self {
        let policy = AdmissionPolicy::new(config.verified_only);
        Self {
            client: None,
            repository: None,
            cache: Mutex::new(ResolverCache::new()),
            config,
            policy,
        }
    }

    pub fn with_client(mut self, client: Arc<dyn AuthorityClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Persist new cache entries through `repository`.
    pub fn with_repository(mut self, repository: Arc<dyn ResolverCacheRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn has_client(&self) -> bool {
        self.client.is_some()
    }

    /// Name of the configured authority, used as the id key on resolved songs.
    pub fn authority_name(&self) -> Option<&str> {
        self.client.as_deref().map(|client| client.name())
    }

    pub fn policy(&self) -> AdmissionPolicy {
        self.policy
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Top authority record for a query, or `None`.
    #[instrument(skip(self, kind, query), fields(kind = %kind, query = %query))]
    pub async fn resolve(&self, kind: AuthorityKind, query: &AuthorityQuery) -> Option<AuthorityRecord> {
        if query.name.trim().is_empty() {
            return None;
        }

        if let Some(record) = self.cache.lock().await.get(kind, query).cloned() {
            debug!(id = %record.id, "Resolver cache hit");
            return Some(record);
        }

        let client = self.client.as_deref()?;
        let record = self.query_authority(client, kind, query).await?;
        if record.kind != kind {
            debug!(returned = %record.kind, "Authority returned a record of another kind");
            return None;
        }

        let rows = match self.cache.lock().await.insert(query, record.clone()) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "Failed to encode resolved record");
                Vec::new()
            }
        };
        self.persist_rows(&rows).await;

        Some(record)
    }

    async fn query_authority(
        &self,
        client: &dyn AuthorityClient,
        kind: AuthorityKind,
        query: &AuthorityQuery,
    ) -> Option<AuthorityRecord> {
        let mut retries = 0;
        loop {
            match client.query(kind, query).await {
                Ok(Some(record)) => return Some(record),
                Ok(None) => {
                    debug!(authority = client.name(), "No authority match");
                    return None;
                }
                Err(e) => {
                    if let Some(delay) = e.retry_after() {
                        if retries >= self.config.max_rate_limit_retries {
                            warn!(authority = client.name(), retries, "Giving up after repeated rate limiting");
                            return None;
                        }
                        retries += 1;
                        debug!(authority = client.name(), delay_secs = delay.as_secs(), "Authority rate limited, backing off");
                        sleep(delay).await;
                    } else if e.is_source_fatal() {
                        warn!(authority = client.name(), error = %e, "Authority unavailable");
                        return None;
                    } else {
                        debug!(authority = client.name(), error = %e, "Authority query failed");
                        return None;
                    }
                }
            }
        }
    }

    async fn persist_rows(&self, rows: &[CacheRow]) {
        if let Some(repository) = &self.repository {
            if let Err(e) = repository.upsert(rows).await {
                warn!(error = %e, rows = rows.len(), "Failed to persist resolver cache entries");
            }
        }
    }

    pub async fn resolve_song(&self, song: &Song) -> Option<AuthorityRecord> {
        self.resolve(AuthorityKind::Song, &song_query(song)).await
    }

    pub async fn resolve_album(&self, album: &Album) -> Option<AuthorityRecord> {
        self.resolve(AuthorityKind::Album, &album_query(album)).await
    }

    pub async fn resolve_artist(&self, artist: &Artist) -> Option<AuthorityRecord> {
        self.resolve(AuthorityKind::Artist, &artist_query(artist)).await
    }

    fn admit<T>(&self, candidate: T, resolved: Option<T>) -> Option<T> {
        if resolved.is_none() && self.client.is_none() {
            return Some(candidate);
        }
        self.policy.admit(candidate, resolved)
    }

    fn id_key(&self) -> &str {
        self.authority_name().unwrap_or("authority")
    }

    /// Resolved form of a song, keeping the candidate's source ids.
    pub async fn canonical_song(&self, candidate: Song) -> Option<Song> {
        let resolved = self.resolve_song(&candidate).await.map(|record| {
            let mut song = song_from_record(self.id_key(), &record);
            for (source, id) in &candidate.ids {
                song.ids.entry(source.clone()).or_insert_with(|| id.clone());
            }
            if song.duration.is_none() {
                song.duration = candidate.duration;
            }
            if song.album.is_none() {
                song.album = candidate.album.clone();
            }
            if song.cover.is_none() {
                song.cover = candidate.cover.clone();
            }
            song
        });
        self.admit(candidate, resolved)
    }

    /// Resolved form of an album. Tracks, source ids and resume state come
    /// from the candidate.
    pub async fn canonical_album(&self, candidate: Album) -> Option<Album> {
        let resolved = self.resolve_album(&candidate).await.map(|record| {
            let mut album = album_from_record(self.id_key(), &record);
            album.songs = candidate.songs.clone();
            album.resume = candidate.resume.clone();
            for (source, id) in &candidate.ids {
                album.ids.entry(source.clone()).or_insert_with(|| id.clone());
            }
            if album.cover.is_none() {
                album.cover = candidate.cover.clone();
            }
            album
        });
        self.admit(candidate, resolved)
    }

    pub async fn canonical_artist(&self, candidate: Artist) -> Option<Artist> {
        let resolved = self.resolve_artist(&candidate).await.map(|record| {
            let mut artist = artist_from_record(&record);
            if artist.image.is_none() {
                artist.image = candidate.image.clone();
            }
            artist
        });
        self.admit(candidate, resolved)
    }

    // =========================================================================
    // Cache management
    // =========================================================================

    /// Loads persisted entries into memory.
    #[instrument(skip(self))]
    pub async fn hydrate(&self) -> Result<CacheSizes> {
        let Some(repository) = &self.repository else {
            return Ok(self.sizes().await);
        };

        let rows = repository.load_all().await?;
        let mut cache = self.cache.lock().await;
        let accepted = cache.hydrate(rows);
        let sizes = cache.sizes();
        info!(
            accepted,
            ids = sizes.ids,
            artists = sizes.artists,
            songs = sizes.songs,
            albums = sizes.albums,
            "Resolver cache hydrated"
        );
        Ok(sizes)
    }

    /// Writes every cached entry. Returns the number of rows written.
    #[instrument(skip(self))]
    pub async fn persist(&self) -> Result<usize> {
        let Some(repository) = &self.repository else {
            return Ok(0);
        };
        let rows = self.cache.lock().await.to_rows()?;
        repository.upsert(&rows).await?;
        debug!(rows = rows.len(), "Resolver cache flushed");
        Ok(rows.len())
    }

    pub async fn sizes(&self) -> CacheSizes {
        self.cache.lock().await.sizes()
    }

    /// Empties the in-memory cache and its persisted copy.
    pub async fn clear(&self) -> Result<()> {
        self.cache.lock().await.clear();
        if let Some(repository) = &self.repository {
            repository.clear().await?;
        }
        info!("Resolver cache cleared");
        Ok(())
    }
}
