//! Domain models for the canonical collection
//!
//! Songs, albums and playlists are plain data. Identity is decided by the
//! [`identity`](crate::identity) tiers, never by `PartialEq`, so two values
//! can be the "same song" without being structurally equal.

use bridge_traits::source::{SourceContainer, SourceTrack};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

// =============================================================================
// Artist
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub name: String,
    /// Authority id once the artist has been resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl Artist {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            authority_id: None,
            image: None,
        }
    }

    pub fn with_authority_id(mut self, id: impl Into<String>) -> Self {
        self.authority_id = Some(id.into());
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Backfills missing fields from `other`. Existing values win.
    pub fn merge_from(&mut self, other: &Artist) {
        if self.authority_id.is_none() {
            self.authority_id = other.authority_id.clone();
        }
        if self.image.is_none() {
            self.image = other.image.clone();
        }
    }
}

impl fmt::Display for Artist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name.trim())
    }
}

/// Appends every artist of `incoming` not already present (by identity).
pub(crate) fn union_artists(existing: &mut Vec<Artist>, incoming: &[Artist]) {
    for artist in incoming {
        match existing
            .iter_mut()
            .find(|known| crate::identity::artists_equal(known, artist))
        {
            Some(known) => known.merge_from(artist),
            None => existing.push(artist.clone()),
        }
    }
}

// =============================================================================
// Song
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    pub name: String,
    /// First entry is the primary artist
    #[serde(default)]
    pub artists: Vec<Artist>,
    /// `None` when no source reported a duration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    /// Source name to source-specific id (e.g. `"spotify" -> "abc123"`)
    #[serde(default)]
    pub ids: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
}

impl Song {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            artists: Vec::new(),
            duration: None,
            album: None,
            ids: BTreeMap::new(),
            cover: None,
        }
    }

    /// Converts a raw source record, tagging its id with `source`.
    ///
    /// Returns `None` for records without a usable name.
    pub fn from_source(source: &str, track: &SourceTrack) -> Option<Self> {
        if track.name.trim().is_empty() {
            return None;
        }

        let mut song = Song::new(track.name.trim());
        for artist in track.artists.iter().filter(|a| !a.trim().is_empty()) {
            song.add_artist(Artist::new(artist.trim()));
        }
        song.duration = track.duration_ms.map(Duration::from_millis);
        song.album = track.album.clone().filter(|a| !a.trim().is_empty());
        song.cover = track.cover.clone();
        if let Some(id) = track.id.as_deref().filter(|id| !id.is_empty()) {
            song.ids.insert(source.to_string(), id.to_string());
        }
        Some(song)
    }

    /// Builds the record a source needs to add or remove this song.
    pub fn to_source_track(&self, source: &str) -> SourceTrack {
        SourceTrack {
            id: self.ids.get(source).cloned(),
            name: self.name.clone(),
            artists: self.artists.iter().map(|a| a.name.clone()).collect(),
            duration_ms: self.duration.map(|d| d.as_millis() as u64),
            album: self.album.clone(),
            cover: self.cover.clone(),
        }
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.add_artist(Artist::new(artist));
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_duration_secs(self, secs: u64) -> Self {
        self.with_duration(Duration::from_secs(secs))
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    pub fn with_id(mut self, source: impl Into<String>, id: impl Into<String>) -> Self {
        self.ids.insert(source.into(), id.into());
        self
    }

    pub fn with_cover(mut self, cover: impl Into<String>) -> Self {
        self.cover = Some(cover.into());
        self
    }

    pub fn add_artist(&mut self, artist: Artist) {
        union_artists(&mut self.artists, std::slice::from_ref(&artist));
    }

    pub fn primary_artist(&self) -> Option<&Artist> {
        self.artists.first()
    }

    pub fn id_for(&self, source: &str) -> Option<&str> {
        self.ids.get(source).map(String::as_str)
    }

    /// Folds an identity-equal song into this one.
    ///
    /// Artists are unioned; missing duration, album, cover and per-source ids
    /// are backfilled. Values already present are never overwritten.
    pub fn merge_from(&mut self, other: &Song) {
        union_artists(&mut self.artists, &other.artists);
        if self.duration.is_none() {
            self.duration = other.duration;
        }
        if self.album.is_none() {
            self.album = other.album.clone();
        }
        if self.cover.is_none() {
            self.cover = other.cover.clone();
        }
        for (source, id) in &other.ids {
            self.ids.entry(source.clone()).or_insert_with(|| id.clone());
        }
    }
}

impl fmt::Display for Song {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name.trim())?;
        if let Some(artist) = self.primary_artist() {
            write!(f, " - {}", artist)?;
        }
        Ok(())
    }
}

// =============================================================================
// Resume state
// =============================================================================

/// Progress of an interrupted paginated fetch.
///
/// `fetched` holds the items already pulled so a resumed fetch ends with the
/// same item set as an uninterrupted one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeState {
    pub cursor: Option<String>,
    #[serde(default)]
    pub fetched: Vec<Song>,
}

// =============================================================================
// Playlist / LikedSongs
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub name: String,
    #[serde(default)]
    pub songs: Vec<Song>,
    /// Source name to the remote container id
    #[serde(default)]
    pub ids: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
    /// Per-source resume state for interrupted fetches
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resume: BTreeMap<String, ResumeState>,
}

impl Playlist {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            songs: Vec::new(),
            ids: BTreeMap::new(),
            cover: None,
            resume: BTreeMap::new(),
        }
    }

    pub fn from_source(source: &str, container: &SourceContainer) -> Option<Self> {
        if container.name.trim().is_empty() {
            return None;
        }
        let mut playlist = Playlist::new(container.name.trim());
        playlist.cover = container.cover.clone();
        if !container.id.is_empty() {
            playlist.ids.insert(source.to_string(), container.id.clone());
        }
        Some(playlist)
    }

    pub fn with_id(mut self, source: impl Into<String>, id: impl Into<String>) -> Self {
        self.ids.insert(source.into(), id.into());
        self
    }

    pub fn with_cover(mut self, cover: impl Into<String>) -> Self {
        self.cover = Some(cover.into());
        self
    }

    pub fn id_for(&self, source: &str) -> Option<&str> {
        self.ids.get(source).map(String::as_str)
    }

    pub fn resume_for(&self, source: &str) -> Option<&ResumeState> {
        self.resume.get(source)
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    /// Folds an identity-equal playlist into this one.
    pub(crate) fn merge_meta(&mut self, other: &Playlist) {
        if self.cover.is_none() {
            self.cover = other.cover.clone();
        }
        for (source, id) in &other.ids {
            self.ids.entry(source.clone()).or_insert_with(|| id.clone());
        }
        for (source, state) in &other.resume {
            self.resume
                .entry(source.clone())
                .or_insert_with(|| state.clone());
        }
    }
}

impl fmt::Display for Playlist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name.trim())
    }
}

/// The distinguished favorites playlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LikedSongs(pub Playlist);

impl LikedSongs {
    pub fn new(name: impl Into<String>) -> Self {
        Self(Playlist::new(name))
    }
}

impl Default for LikedSongs {
    fn default() -> Self {
        Self::new(DEFAULT_LIKED_SONGS_NAME)
    }
}

impl std::ops::Deref for LikedSongs {
    type Target = Playlist;

    fn deref(&self) -> &Playlist {
        &self.0
    }
}

impl std::ops::DerefMut for LikedSongs {
    fn deref_mut(&mut self) -> &mut Playlist {
        &mut self.0
    }
}

pub const DEFAULT_LIKED_SONGS_NAME: &str = "liked songs";

// =============================================================================
// Album
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub name: String,
    /// First entry is the main artist
    #[serde(default)]
    pub artists: Vec<Artist>,
    #[serde(default)]
    pub songs: Vec<Song>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority_id: Option<String>,
    #[serde(default)]
    pub ids: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resume: BTreeMap<String, ResumeState>,
}

impl Album {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            artists: Vec::new(),
            songs: Vec::new(),
            authority_id: None,
            ids: BTreeMap::new(),
            cover: None,
            resume: BTreeMap::new(),
        }
    }

    pub fn from_source(source: &str, container: &SourceContainer) -> Option<Self> {
        if container.name.trim().is_empty() {
            return None;
        }
        let mut album = Album::new(container.name.trim());
        for artist in container.artists.iter().filter(|a| !a.trim().is_empty()) {
            union_artists(&mut album.artists, &[Artist::new(artist.trim())]);
        }
        album.cover = container.cover.clone();
        if !container.id.is_empty() {
            album.ids.insert(source.to_string(), container.id.clone());
        }
        Some(album)
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        union_artists(&mut self.artists, &[Artist::new(artist)]);
        self
    }

    pub fn with_id(mut self, source: impl Into<String>, id: impl Into<String>) -> Self {
        self.ids.insert(source.into(), id.into());
        self
    }

    pub fn with_cover(mut self, cover: impl Into<String>) -> Self {
        self.cover = Some(cover.into());
        self
    }

    pub fn main_artist(&self) -> Option<&Artist> {
        self.artists.first()
    }

    pub fn id_for(&self, source: &str) -> Option<&str> {
        self.ids.get(source).map(String::as_str)
    }

    pub fn resume_for(&self, source: &str) -> Option<&ResumeState> {
        self.resume.get(source)
    }

    pub(crate) fn merge_meta(&mut self, other: &Album) {
        union_artists(&mut self.artists, &other.artists);
        if self.authority_id.is_none() {
            self.authority_id = other.authority_id.clone();
        }
        if self.cover.is_none() {
            self.cover = other.cover.clone();
        }
        for (source, id) in &other.ids {
            self.ids.entry(source.clone()).or_insert_with(|| id.clone());
        }
        for (source, state) in &other.resume {
            self.resume
                .entry(source.clone())
                .or_insert_with(|| state.clone());
        }
    }
}

impl fmt::Display for Album {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name.trim())?;
        if let Some(artist) = self.main_artist() {
            write!(f, " - {}", artist)?;
        }
        Ok(())
    }
}
