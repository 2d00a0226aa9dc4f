//! Metadata Authority Abstraction
//!
//! An authority is a trusted metadata database (MusicBrainz, Last.fm) used to
//! canonicalize loosely typed names into verified records.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{BridgeError, Result};

/// Entity kind being resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorityKind {
    Artist,
    Song,
    Album,
}

impl AuthorityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthorityKind::Artist => "artist",
            AuthorityKind::Song => "song",
            AuthorityKind::Album => "album",
        }
    }
}

impl fmt::Display for AuthorityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthorityKind {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "artist" => Ok(AuthorityKind::Artist),
            "song" => Ok(AuthorityKind::Song),
            "album" => Ok(AuthorityKind::Album),
            other => Err(BridgeError::OperationFailed(format!(
                "Unknown authority kind: {}",
                other
            ))),
        }
    }
}

/// Search input for an authority lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AuthorityQuery {
    pub name: String,
    /// Primary artist, when known
    pub artist: Option<String>,
    /// Album name, songs only
    pub album: Option<String>,
    pub duration_secs: Option<u64>,
}

impl AuthorityQuery {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    pub fn with_duration_secs(mut self, secs: u64) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    /// Normalized search text: `"name | artist"`, lower-cased with collapsed
    /// whitespace. Also serves as the resolver cache key.
    pub fn search_text(&self) -> String {
        let mut text = normalize(&self.name);
        if let Some(artist) = self.artist.as_deref().map(normalize) {
            if !artist.is_empty() {
                text.push_str(" | ");
                text.push_str(&artist);
            }
        }
        text
    }
}

impl fmt::Display for AuthorityQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.search_text())
    }
}

fn normalize(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Artist credit on a resolved record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordArtist {
    pub name: String,
    pub id: Option<String>,
}

/// Top result of an authority lookup, already mapped into a neutral shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityRecord {
    pub kind: AuthorityKind,
    /// Authority-assigned identifier (MBID, Last.fm url/mbid)
    pub id: String,
    pub name: String,
    pub artists: Vec<RecordArtist>,
    pub album: Option<String>,
    pub duration_ms: Option<u64>,
    pub cover: Option<String>,
}

impl AuthorityRecord {
    pub fn new(kind: AuthorityKind, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            name: name.into(),
            artists: Vec::new(),
            album: None,
            duration_ms: None,
            cover: None,
        }
    }

    pub fn with_artist(mut self, name: impl Into<String>, id: Option<String>) -> Self {
        self.artists.push(RecordArtist {
            name: name.into(),
            id,
        });
        self
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

/// Metadata authority client.
///
/// `Ok(None)` means the authority has no match. Rate limiting is reported as
/// [`BridgeError::RateLimited`]; malformed responses as
/// [`BridgeError::QueryFailed`].
#[async_trait]
pub trait AuthorityClient: Send + Sync {
    /// Short authority name for logs (e.g. `"musicbrainz"`)
    fn name(&self) -> &str;

    async fn query(
        &self,
        kind: AuthorityKind,
        query: &AuthorityQuery,
    ) -> Result<Option<AuthorityRecord>>;
}
