//! # Collection Aggregate
//!
//! The canonical, deduplicated store of liked songs, playlists and albums.
//!
//! ## Overview
//!
//! All mutation goes through the aggregate. Inserting an entity that is
//! identity-equal to an existing one never creates a second entry; the
//! existing entry absorbs the newcomer instead:
//!
//! - artist lists are unioned
//! - missing duration, cover, album name and per-source ids are backfilled
//! - values already present are kept (first write wins)
//!
//! Records without a usable name are ignored rather than rejected.
//!
//! Every song list is paired with a [`SongIndex`] so an insert only compares
//! against plausible candidates instead of the whole list.
//!
//! ## Usage
//!
//! ```ignore
//! use core_library::collection::Collection;
//! use core_library::models::Song;
//!
//! let mut collection = Collection::new(IdentityConfig::default());
//! collection.add_song(Song::new("Hey Jude").with_artist("The Beatles"));
//! collection.add_song(Song::new("hey jude ").with_artist("the beatles").with_duration_secs(431));
//! assert_eq!(collection.liked_songs().len(), 1);
//! ```

use crate::identity::{albums_equal, normalize, playlists_equal, songs_equal};
use crate::index::SongIndex;
use crate::models::{Album, LikedSongs, Playlist, ResumeState, Song};
use bridge_traits::source::ContainerRef;
use core_runtime::config::IdentityConfig;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct Collection {
    identity: IdentityConfig,
    liked_songs: LikedSongs,
    playlists: Vec<Playlist>,
    albums: Vec<Album>,
    liked_index: SongIndex,
    /// Parallel to `playlists`
    playlist_indexes: Vec<SongIndex>,
    /// Parallel to `albums`
    album_indexes: Vec<SongIndex>,
}

impl Default for Collection {
    fn default() -> Self {
        Self::new(IdentityConfig::default())
    }
}

/// Inserts `song` into `songs`, merging into an identity-equal entry.
///
/// Returns `true` when a new entry was appended.
fn insert_song(
    songs: &mut Vec<Song>,
    index: &mut SongIndex,
    song: Song,
    identity: &IdentityConfig,
) -> bool {
    if song.name.trim().is_empty() {
        debug!("Ignoring song without a name");
        return false;
    }
    match index.find(songs.as_slice(), &song, identity) {
        Some(position) => {
            if let Some(known) = songs.get_mut(position) {
                known.merge_from(&song);
                index.insert(position, known);
            }
            false
        }
        None => {
            index.insert(songs.len(), &song);
            songs.push(song);
            true
        }
    }
}

fn remove_song_from(
    songs: &mut Vec<Song>,
    index: &mut SongIndex,
    song: &Song,
    identity: &IdentityConfig,
) -> bool {
    let before = songs.len();
    songs.retain(|known| !songs_equal(known, song, identity));
    if songs.len() == before {
        return false;
    }
    *index = SongIndex::build(songs.iter());
    true
}

/// Deduplicates `songs` into a fresh list and its index.
fn dedup_songs(songs: Vec<Song>, identity: &IdentityConfig) -> (Vec<Song>, SongIndex) {
    let mut deduped = Vec::with_capacity(songs.len());
    let mut index = SongIndex::new();
    for song in songs {
        insert_song(&mut deduped, &mut index, song, identity);
    }
    (deduped, index)
}

/// Normalized name plus, when both sides know one, the main artist.
fn album_key_matches(album: &Album, name: &str, artist: Option<&str>) -> bool {
    if normalize(&album.name) != normalize(name) {
        return false;
    }
    match (artist.map(normalize), album.main_artist()) {
        (Some(wanted), Some(known)) => normalize(&known.name) == wanted,
        _ => true,
    }
}

/// Strips bracketed qualifiers (`(..)`, `[..]`) and collapses whitespace.
///
/// A name consisting only of a bracketed part is returned trimmed instead of
/// emptied.
pub fn remove_brackets(name: &str) -> String {
    let mut depth = 0usize;
    let mut stripped = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' if depth > 0 => depth -= 1,
            _ if depth == 0 => stripped.push(c),
            _ => {}
        }
    }

    let cleaned = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        name.trim().to_string()
    } else {
        cleaned
    }
}

impl Collection {
    pub fn new(identity: IdentityConfig) -> Self {
        Self {
            identity,
            liked_songs: LikedSongs::default(),
            playlists: Vec::new(),
            albums: Vec::new(),
            liked_index: SongIndex::new(),
            playlist_indexes: Vec::new(),
            album_indexes: Vec::new(),
        }
    }

    /// Rebuilds a collection from persisted parts, re-applying dedup.
    pub fn from_parts(
        identity: IdentityConfig,
        liked_songs: LikedSongs,
        playlists: Vec<Playlist>,
        albums: Vec<Album>,
    ) -> Self {
        let mut collection = Self::new(identity);
        collection.liked_songs.name = liked_songs.name.clone();
        collection.absorb_liked(liked_songs);
        for playlist in playlists {
            collection.add_playlist(playlist);
        }
        for album in albums {
            collection.add_album(album);
        }
        collection
    }

    pub fn with_liked_songs_name(mut self, name: impl Into<String>) -> Self {
        self.liked_songs.name = name.into();
        self
    }

    pub fn identity(&self) -> &IdentityConfig {
        &self.identity
    }

    pub fn liked_songs(&self) -> &LikedSongs {
        &self.liked_songs
    }

    pub fn playlists(&self) -> &[Playlist] {
        &self.playlists
    }

    pub fn albums(&self) -> &[Album] {
        &self.albums
    }

    pub fn is_empty(&self) -> bool {
        self.liked_songs.is_empty() && self.playlists.is_empty() && self.albums.is_empty()
    }

    // =========================================================================
    // Liked songs
    // =========================================================================

    /// Adds a liked song. Returns `true` if it was not already present.
    pub fn add_song(&mut self, song: Song) -> bool {
        insert_song(
            &mut self.liked_songs.songs,
            &mut self.liked_index,
            song,
            &self.identity,
        )
    }

    pub fn remove_song(&mut self, song: &Song) -> bool {
        remove_song_from(
            &mut self.liked_songs.songs,
            &mut self.liked_index,
            song,
            &self.identity,
        )
    }

    fn absorb_liked(&mut self, liked: LikedSongs) {
        let LikedSongs(playlist) = liked;
        self.liked_songs.merge_meta(&playlist);
        for song in playlist.songs {
            insert_song(
                &mut self.liked_songs.songs,
                &mut self.liked_index,
                song,
                &self.identity,
            );
        }
    }

    // =========================================================================
    // Playlists
    // =========================================================================

    /// Adds a playlist, merging into an identity-equal one if present.
    ///
    /// Returns `true` when a new playlist was created.
    pub fn add_playlist(&mut self, playlist: Playlist) -> bool {
        if playlist.name.trim().is_empty() {
            debug!("Ignoring playlist without a name");
            return false;
        }

        let identity = &self.identity;
        if let Some(position) = self
            .playlists
            .iter()
            .position(|known| playlists_equal(known, &playlist))
        {
            if let (Some(known), Some(index)) = (
                self.playlists.get_mut(position),
                self.playlist_indexes.get_mut(position),
            ) {
                known.merge_meta(&playlist);
                for song in playlist.songs {
                    insert_song(&mut known.songs, index, song, identity);
                }
            }
            return false;
        }

        let mut fresh = playlist;
        let (songs, index) = dedup_songs(std::mem::take(&mut fresh.songs), identity);
        fresh.songs = songs;
        self.playlists.push(fresh);
        self.playlist_indexes.push(index);
        true
    }

    pub fn remove_playlist(&mut self, playlist: &Playlist) -> bool {
        let before = self.playlists.len();
        let (playlists, indexes): (Vec<Playlist>, Vec<SongIndex>) = std::mem::take(&mut self.playlists)
            .into_iter()
            .zip(std::mem::take(&mut self.playlist_indexes))
            .filter(|(known, _)| !playlists_equal(known, playlist))
            .unzip();
        self.playlists = playlists;
        self.playlist_indexes = indexes;
        self.playlists.len() != before
    }

    /// Adds a song to the named playlist. Returns `false` if the playlist is
    /// unknown or the song was already present.
    pub fn add_song_to_playlist(&mut self, playlist_name: &str, song: Song) -> bool {
        let wanted_playlist = Playlist::new(playlist_name);
        let identity = &self.identity;
        let Some(position) = self
            .playlists
            .iter()
            .position(|known| playlists_equal(known, &wanted_playlist))
        else {
            return false;
        };
        match (
            self.playlists.get_mut(position),
            self.playlist_indexes.get_mut(position),
        ) {
            (Some(playlist), Some(index)) => insert_song(&mut playlist.songs, index, song, identity),
            _ => false,
        }
    }

    pub fn playlist(&self, name: &str) -> Option<&Playlist> {
        let wanted_playlist = Playlist::new(name);
        self.playlists.iter().find(|p| playlists_equal(p, &wanted_playlist))
    }

    pub fn playlist_by_source_id(&self, source: &str, id: &str) -> Option<&Playlist> {
        self.playlists.iter().find(|p| p.id_for(source) == Some(id))
    }

    /// Records the remote id of the named playlist on `source`.
    pub fn set_playlist_source_id(&mut self, name: &str, source: &str, id: &str) -> bool {
        let wanted_playlist = Playlist::new(name);
        match self.playlists.iter_mut().find(|p| playlists_equal(p, &wanted_playlist)) {
            Some(playlist) => {
                playlist.ids.insert(source.to_string(), id.to_string());
                true
            }
            None => false,
        }
    }

    // =========================================================================
    // Albums
    // =========================================================================

    /// Adds an album, merging into an identity-equal one if present.
    pub fn add_album(&mut self, album: Album) -> bool {
        if album.name.trim().is_empty() {
            debug!("Ignoring album without a name");
            return false;
        }

        let identity = &self.identity;
        if let Some(position) = self
            .albums
            .iter()
            .position(|known| albums_equal(known, &album, identity))
        {
            if let (Some(known), Some(index)) = (
                self.albums.get_mut(position),
                self.album_indexes.get_mut(position),
            ) {
                known.merge_meta(&album);
                for song in album.songs {
                    insert_song(&mut known.songs, index, song, identity);
                }
            }
            return false;
        }

        let mut fresh = album;
        let (songs, index) = dedup_songs(std::mem::take(&mut fresh.songs), identity);
        fresh.songs = songs;
        self.albums.push(fresh);
        self.album_indexes.push(index);
        true
    }

    pub fn remove_album(&mut self, album: &Album) -> bool {
        let identity = &self.identity;
        let before = self.albums.len();
        let (albums, indexes): (Vec<Album>, Vec<SongIndex>) = std::mem::take(&mut self.albums)
            .into_iter()
            .zip(std::mem::take(&mut self.album_indexes))
            .filter(|(known, _)| !albums_equal(known, album, identity))
            .unzip();
        self.albums = albums;
        self.album_indexes = indexes;
        self.albums.len() != before
    }

    pub fn album_by_source_id(&self, source: &str, id: &str) -> Option<&Album> {
        self.albums.iter().find(|a| a.id_for(source) == Some(id))
    }

    /// Album with this name and main artist, ignoring case.
    ///
    /// Two albums may share a title ("Greatest Hits"); the artist tells them
    /// apart. Without an artist the first album of that name is returned.
    pub fn album(&self, name: &str, artist: Option<&str>) -> Option<&Album> {
        self.albums
            .iter()
            .find(|a| album_key_matches(a, name, artist))
    }

    /// Records the remote id of the album keyed by name and main artist.
    pub fn set_album_source_id(
        &mut self,
        name: &str,
        artist: Option<&str>,
        source: &str,
        id: &str,
    ) -> bool {
        match self
            .albums
            .iter_mut()
            .find(|a| album_key_matches(a, name, artist))
        {
            Some(album) => {
                album.ids.insert(source.to_string(), id.to_string());
                true
            }
            None => false,
        }
    }

    /// Strips bracketed qualifiers from album names and re-merges albums
    /// that become identity-equal. Returns how many albums were folded away.
    pub fn clean_albums(&mut self) -> usize {
        let before = self.albums.len();
        let albums = std::mem::take(&mut self.albums);
        self.album_indexes.clear();
        for mut album in albums {
            let cleaned = remove_brackets(&album.name);
            if cleaned != album.name {
                debug!(from = %album.name, to = %cleaned, "Cleaned album name");
                album.name = cleaned;
            }
            if !self.add_album(album) {
                debug!("Album merged into an existing entry");
            }
        }

        let merged = before - self.albums.len();
        if merged > 0 {
            info!(merged, remaining = self.albums.len(), "Merged duplicate albums");
        }
        merged
    }

    // =========================================================================
    // Whole-collection operations
    // =========================================================================

    /// Folds every liked song, playlist and album of `other` into this
    /// collection using the insert rules.
    pub fn merge(&mut self, other: Collection) {
        let Collection {
            liked_songs,
            playlists,
            albums,
            ..
        } = other;

        self.absorb_liked(liked_songs);
        for playlist in playlists {
            self.add_playlist(playlist);
        }
        for album in albums {
            self.add_album(album);
        }
    }

    /// Liked songs that appear in no playlist and no album.
    pub fn standalone_liked_songs(&self) -> Vec<&Song> {
        let contained: Vec<&Song> = self
            .playlists
            .iter()
            .flat_map(|p| p.songs.iter())
            .chain(self.albums.iter().flat_map(|a| a.songs.iter()))
            .collect();
        let index = SongIndex::build(contained.iter().copied());

        self.liked_songs
            .songs
            .iter()
            .filter(|song| index.find_ref(&contained, song, &self.identity).is_none())
            .collect()
    }

    /// Every distinct song across liked songs, playlists and albums.
    pub fn all_songs(&self) -> Vec<&Song> {
        let mut songs: Vec<&Song> = Vec::new();
        let mut index = SongIndex::new();
        let candidates = self
            .liked_songs
            .songs
            .iter()
            .chain(self.playlists.iter().flat_map(|p| p.songs.iter()))
            .chain(self.albums.iter().flat_map(|a| a.songs.iter()));
        for song in candidates {
            if index.find_ref(&songs, song, &self.identity).is_none() {
                index.insert(songs.len(), song);
                songs.push(song);
            }
        }
        songs
    }

    pub fn track_count(&self) -> usize {
        self.all_songs().len()
    }

    pub fn clear(&mut self) {
        let name = self.liked_songs.name.clone();
        self.liked_songs = LikedSongs::new(name);
        self.playlists.clear();
        self.albums.clear();
        self.liked_index = SongIndex::new();
        self.playlist_indexes.clear();
        self.album_indexes.clear();
    }

    // =========================================================================
    // Container access for reconciliation
    // =========================================================================

    /// Canonical songs of a remote container, if the collection knows it.
    pub fn container_songs(&self, source: &str, container: &ContainerRef) -> Option<&[Song]> {
        match container {
            ContainerRef::LikedSongs => Some(&self.liked_songs.songs),
            ContainerRef::Playlist(id) => self
                .playlist_by_source_id(source, id)
                .map(|p| p.songs.as_slice()),
            ContainerRef::Album(id) => self
                .album_by_source_id(source, id)
                .map(|a| a.songs.as_slice()),
        }
    }

    fn container_resume_mut(
        &mut self,
        source: &str,
        container: &ContainerRef,
    ) -> Option<&mut std::collections::BTreeMap<String, ResumeState>> {
        match container {
            ContainerRef::LikedSongs => Some(&mut self.liked_songs.resume),
            ContainerRef::Playlist(id) => self
                .playlists
                .iter_mut()
                .find(|p| p.id_for(source) == Some(id.as_str()))
                .map(|p| &mut p.resume),
            ContainerRef::Album(id) => self
                .albums
                .iter_mut()
                .find(|a| a.id_for(source) == Some(id.as_str()))
                .map(|a| &mut a.resume),
        }
    }

    pub fn resume_state(&self, source: &str, container: &ContainerRef) -> Option<&ResumeState> {
        match container {
            ContainerRef::LikedSongs => self.liked_songs.resume_for(source),
            ContainerRef::Playlist(id) => self
                .playlist_by_source_id(source, id)
                .and_then(|p| p.resume_for(source)),
            ContainerRef::Album(id) => self
                .album_by_source_id(source, id)
                .and_then(|a| a.resume_for(source)),
        }
    }

    /// Persists fetch progress on the owning container.
    ///
    /// Returns `false` when the container is unknown to the collection.
    pub fn set_resume_state(
        &mut self,
        source: &str,
        container: &ContainerRef,
        state: ResumeState,
    ) -> bool {
        match self.container_resume_mut(source, container) {
            Some(resume) => {
                resume.insert(source.to_string(), state);
                true
            }
            None => false,
        }
    }

    pub fn clear_resume_state(&mut self, source: &str, container: &ContainerRef) {
        if let Some(resume) = self.container_resume_mut(source, container) {
            resume.remove(source);
        }
    }
}
