//! Admission policy and record conversion
//!
//! A candidate coming from a source is either replaced by its verified
//! authority form, dropped (verified-only), or admitted as-is.

use bridge_traits::authority::{AuthorityQuery, AuthorityRecord};
use core_library::models::{Album, Artist, Song};
use std::time::Duration;

/// Decides what enters the collection after resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionPolicy {
    verified_only: bool,
}

impl AdmissionPolicy {
    pub fn new(verified_only: bool) -> Self {
        Self { verified_only }
    }

    pub fn verified_only(&self) -> bool {
        self.verified_only
    }

    /// The resolved entity when there is one; otherwise the candidate,
    /// unless only verified entities may be admitted.
    pub fn admit<T>(&self, candidate: T, resolved: Option<T>) -> Option<T> {
        match resolved {
            Some(entity) => Some(entity),
            None if self.verified_only => None,
            None => Some(candidate),
        }
    }
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self::new(true)
    }
}

// =============================================================================
// Queries from candidates
// =============================================================================

pub fn song_query(song: &Song) -> AuthorityQuery {
    let mut query = AuthorityQuery::new(song.name.trim());
    if let Some(artist) = song.primary_artist() {
        query = query.with_artist(artist.name.trim());
    }
    if let Some(album) = song.album.as_deref() {
        query = query.with_album(album);
    }
    if let Some(duration) = song.duration {
        query = query.with_duration_secs(duration.as_secs());
    }
    query
}

pub fn album_query(album: &Album) -> AuthorityQuery {
    let query = AuthorityQuery::new(album.name.trim());
    match album.main_artist() {
        Some(artist) => query.with_artist(artist.name.trim()),
        None => query,
    }
}

pub fn artist_query(artist: &Artist) -> AuthorityQuery {
    AuthorityQuery::new(artist.name.trim())
}

// =============================================================================
// Entities from records
// =============================================================================

fn record_artists(record: &AuthorityRecord) -> Vec<Artist> {
    record
        .artists
        .iter()
        .map(|credit| {
            let artist = Artist::new(&credit.name);
            match &credit.id {
                Some(id) => artist.with_authority_id(id),
                None => artist,
            }
        })
        .collect()
}

/// Authority song, keyed under `authority` in the song's id map.
pub fn song_from_record(authority: &str, record: &AuthorityRecord) -> Song {
    let mut song = Song::new(&record.name).with_id(authority, &record.id);
    song.artists = record_artists(record);
    song.duration = record.duration_ms.map(Duration::from_millis);
    song.album = record.album.clone();
    song.cover = record.cover.clone();
    song
}

pub fn album_from_record(authority: &str, record: &AuthorityRecord) -> Album {
    let mut album = Album::new(&record.name).with_id(authority, &record.id);
    album.artists = record_artists(record);
    album.authority_id = Some(record.id.clone());
    album.cover = record.cover.clone();
    album
}

pub fn artist_from_record(record: &AuthorityRecord) -> Artist {
    let artist = Artist::new(&record.name).with_authority_id(&record.id);
    match &record.cover {
        Some(image) => artist.with_image(image),
        None => artist,
    }
}
