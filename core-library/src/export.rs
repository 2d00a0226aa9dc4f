//! # Playlist and album export
//!
//! Renders M3U playlists and album NFO documents and writes them under an
//! export directory. Song paths are relative: `<album>/<song>.<ext>` when
//! the album is known, `<song>.<ext>` otherwise.

use crate::error::Result;
use crate::models::{Album, Playlist, Song};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

const MAX_FILE_NAME_LEN: usize = 255;

/// Keeps ASCII letters, digits, spaces, `-` and `_`; trims and truncates.
///
/// Names with nothing printable left fall back to a short content hash so
/// the result is never empty.
pub fn sanitize_file_name(name: &str) -> String {
    let mut sanitized: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    sanitized = sanitized.trim().to_string();
    sanitized.truncate(MAX_FILE_NAME_LEN);

    if !sanitized.chars().any(|c| c.is_ascii_alphanumeric()) {
        let digest = Sha256::digest(name.as_bytes());
        return digest[..6].iter().map(|b| format!("{:02x}", b)).collect();
    }
    sanitized
}

pub fn cover_file_name(name: &str) -> String {
    format!("{}.png", sanitize_file_name(name))
}

pub fn relative_song_path(song: &Song, extension: &str) -> PathBuf {
    let file = format!("{}.{}", sanitize_file_name(&song.name), extension);
    match song.album.as_deref() {
        Some(album) => Path::new(&sanitize_file_name(album)).join(file),
        None => PathBuf::from(file),
    }
}

/// Renders an extended M3U playlist.
pub fn playlist_m3u(playlist: &Playlist, extension: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "#EXTM3U");
    let _ = writeln!(out, "#PLAYLIST:{}", playlist);
    if playlist.cover.is_some() {
        let _ = writeln!(out, "#EXTIMG:{}", cover_file_name(&playlist.name));
    }
    for song in &playlist.songs {
        let secs = song.duration.map(|d| d.as_secs() as i64).unwrap_or(-1);
        let _ = writeln!(out, "#EXTINF:{},{}", secs, song);
        let path = relative_song_path(song, extension);
        let _ = writeln!(out, "{}", path.to_string_lossy().replace('\\', "/"));
    }
    out
}

fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Renders an album NFO document.
pub fn album_nfo(album: &Album) -> String {
    let mut out = String::new();
    let _ = writeln!(out, r#"<?xml version="1.0" encoding="UTF-8" standalone="no"?>"#);
    let _ = writeln!(out, "<album>");
    let _ = writeln!(out, "  <title>{}</title>", escape_xml(album.name.trim()));
    let _ = writeln!(out, "  <artists>");
    for artist in &album.artists {
        let _ = writeln!(out, "    <artist>{}</artist>", escape_xml(artist.name.trim()));
    }
    let _ = writeln!(out, "  </artists>");
    let _ = writeln!(out, "  <tracks>");
    for song in &album.songs {
        let _ = writeln!(out, "    <track>");
        let _ = writeln!(out, "      <title>{}</title>", escape_xml(song.name.trim()));
        if let Some(duration) = song.duration {
            let _ = writeln!(out, "      <duration>{}</duration>", duration.as_secs());
        }
        let _ = writeln!(out, "    </track>");
    }
    let _ = writeln!(out, "  </tracks>");
    if album.cover.is_some() {
        let _ = writeln!(out, "  <thumb>{}</thumb>", escape_xml(&cover_file_name(&album.name)));
    }
    let _ = writeln!(out, "</album>");
    out
}

/// Writes exports below a root directory.
#[derive(Debug, Clone)]
pub struct Exporter {
    root: PathBuf,
    extension: String,
}

impl Exporter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extension: "mp3".to_string(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    #[instrument(skip(self, playlist), fields(playlist = %playlist.name))]
    pub fn write_playlist(&self, playlist: &Playlist) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.root)?;
        let path = self
            .root
            .join(format!("{}.m3u", sanitize_file_name(&playlist.name)));
        std::fs::write(&path, playlist_m3u(playlist, &self.extension))?;
        debug!(songs = playlist.len(), "Wrote playlist");
        Ok(path)
    }

    /// Writes `<root>/<album>/album.nfo`.
    #[instrument(skip(self, album), fields(album = %album.name))]
    pub fn write_album(&self, album: &Album) -> Result<PathBuf> {
        let dir = self.root.join(sanitize_file_name(&album.name));
        std::fs::create_dir_all(&dir)?;
        let path = dir.join("album.nfo");
        std::fs::write(&path, album_nfo(album))?;
        debug!(songs = album.songs.len(), "Wrote album NFO");
        Ok(path)
    }

    /// Writes every playlist (liked songs included) and every album.
    pub fn write_all<'a>(
        &self,
        playlists: impl IntoIterator<Item = &'a Playlist>,
        albums: impl IntoIterator<Item = &'a Album>,
    ) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for playlist in playlists {
            written.push(self.write_playlist(playlist)?);
        }
        for album in albums {
            written.push(self.write_album(album)?);
        }
        info!(files = written.len(), root = %self.root.display(), "Export finished");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("AC/DC: Back in Black!"), "ACDC Back in Black");
        assert_eq!(sanitize_file_name("  road_trip-2024 "), "road_trip-2024");
        let fallback = sanitize_file_name("???");
        assert_eq!(fallback.len(), 12);
        assert_eq!(fallback, sanitize_file_name("???"));
    }

    #[test]
    fn test_playlist_m3u() {
        let mut playlist = Playlist::new("Road Trip").with_cover("https://img/cover.jpg");
        playlist.songs.push(
            Song::new("Hey Jude")
                .with_artist("The Beatles")
                .with_duration_secs(431)
                .with_album("Hey Jude"),
        );
        playlist.songs.push(Song::new("Intro"));

        let m3u = playlist_m3u(&playlist, "flac");
        let lines: Vec<_> = m3u.lines().collect();
        assert_eq!(
            lines,
            vec![
                "#EXTM3U",
                "#PLAYLIST:Road Trip",
                "#EXTIMG:Road Trip.png",
                "#EXTINF:431,Hey Jude - The Beatles",
                "Hey Jude/Hey Jude.flac",
                "#EXTINF:-1,Intro",
                "Intro.flac",
            ]
        );
    }

    #[test]
    fn test_album_nfo_escapes() {
        let mut album = Album::new("Rock & Roll").with_artist("Led <Zeppelin>");
        album.songs.push(Song::new("Four Sticks").with_duration_secs(284));
        let nfo = album_nfo(&album);
        assert!(nfo.contains("<title>Rock &amp; Roll</title>"));
        assert!(nfo.contains("<artist>Led &lt;Zeppelin&gt;</artist>"));
        assert!(nfo.contains("<duration>284</duration>"));
        assert!(!nfo.contains("<thumb>"));
    }

    #[test]
    fn test_exporter_writes_files() {
        let root = std::env::temp_dir().join(format!(
            "collection-export-{}",
            std::process::id()
        ));
        let exporter = Exporter::new(&root);

        let playlist = Playlist::new("Mix");
        let album = Album::new("Abbey Road").with_artist("The Beatles");
        let written = exporter.write_all([&playlist], [&album]).unwrap();

        assert_eq!(written.len(), 2);
        assert!(root.join("Mix.m3u").exists());
        assert!(root.join("Abbey Road").join("album.nfo").exists());
        std::fs::remove_dir_all(&root).unwrap();
    }
}
