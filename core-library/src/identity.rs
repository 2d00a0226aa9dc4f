//! # Identity & Similarity
//!
//! Decides when two records from different sources denote the same entity.
//!
//! ## Overview
//!
//! Song equality runs three ordered tiers, each usable on its own:
//!
//! 1. [`id_match`]: both songs carry the same id for a shared source key.
//!    Authoritative, checked first.
//! 2. [`fingerprint_match`]: case-folded name, primary artist and a
//!    compatible duration.
//! 3. [`fuzzy_match`]: edit-distance similarity of `"name | artist"` against
//!    [`IdentityConfig::fuzzy_threshold`].
//!
//! [`match_songs`] reports which tier matched; [`songs_equal`] is the
//! boolean form used by the collection.
//!
//! ## Unknown durations
//!
//! A missing duration is `None`, never zero. How it compares is decided by
//! [`UnknownDurationPolicy`].

use crate::models::{Album, Artist, Playlist, Song};
use core_runtime::config::{IdentityConfig, UnknownDurationPolicy};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;

/// Which equality tier matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    SourceId,
    Fingerprint,
    Fuzzy,
}

/// Deterministic composite key of a song (name, primary artist, duration).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

const UNKNOWN_DURATION: &str = "?";

/// Lower-cases and collapses whitespace.
pub fn normalize(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn normalized_primary(song: &Song) -> Option<String> {
    song.primary_artist()
        .map(|a| normalize(&a.name))
        .filter(|name| !name.is_empty())
}

/// Computes the song fingerprint.
///
/// Durations are folded to whole seconds; an unknown duration hashes to a
/// dedicated sentinel.
///
/// The fingerprint is an exact-match shortcut for tier 2 and the storage key,
/// not a hash of [`songs_equal`]: songs within
/// [`IdentityConfig::duration_tolerance`] of each other, or matched by the
/// fuzzy tier, can carry different fingerprints. Lookups that must agree
/// with [`songs_equal`] go through [`crate::index::SongIndex`].
pub fn fingerprint(song: &Song) -> Fingerprint {
    let duration = song
        .duration
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|| UNKNOWN_DURATION.to_string());

    let mut hasher = Sha256::new();
    hasher.update(normalize(&song.name).as_bytes());
    hasher.update([0u8]);
    hasher.update(normalized_primary(song).unwrap_or_default().as_bytes());
    hasher.update([0u8]);
    hasher.update(duration.as_bytes());

    let digest = hasher.finalize();
    Fingerprint(digest.iter().map(|b| format!("{:02x}", b)).collect())
}

/// Whether two durations may belong to the same recording.
pub fn durations_compatible(a: Option<Duration>, b: Option<Duration>, config: &IdentityConfig) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => {
            let delta = if a > b { a - b } else { b - a };
            delta <= config.duration_tolerance
        }
        (None, None) => true,
        _ => config.unknown_duration == UnknownDurationPolicy::Wildcard,
    }
}

/// Tier 1: same id under any shared source key.
pub fn id_match(a: &Song, b: &Song) -> bool {
    a.ids
        .iter()
        .any(|(source, id)| b.ids.get(source).is_some_and(|other| other == id))
}

/// Tier 2: same case-folded name and primary artist, compatible duration.
///
/// Songs without an artist compare by name and duration only.
pub fn fingerprint_match(a: &Song, b: &Song, config: &IdentityConfig) -> bool {
    if a.duration.is_some() && b.duration.is_some() && fingerprint(a) == fingerprint(b) {
        return true;
    }

    if normalize(&a.name) != normalize(&b.name) {
        return false;
    }

    let artists_agree = match (normalized_primary(a), normalized_primary(b)) {
        (Some(x), Some(y)) => x == y,
        _ => true,
    };

    artists_agree && durations_compatible(a.duration, b.duration, config)
}

fn similarity_text(name: &str, artist: Option<String>) -> String {
    match artist {
        Some(artist) => format!("{} | {}", normalize(name), artist),
        None => normalize(name),
    }
}

/// Edit-distance similarity in percent (`0.0..=100.0`).
pub fn similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b) * 100.0
}

/// Similarity of two songs' `"name | primary artist"` representations.
///
/// When either song has no artist both sides are reduced to the name.
pub fn song_similarity(a: &Song, b: &Song) -> f64 {
    let (artist_a, artist_b) = match (normalized_primary(a), normalized_primary(b)) {
        (Some(x), Some(y)) => (Some(x), Some(y)),
        _ => (None, None),
    };
    similarity(
        &similarity_text(&a.name, artist_a),
        &similarity_text(&b.name, artist_b),
    )
}

/// Tier 3: similarity at or above the configured threshold.
///
/// Durations must still be compatible, so a radio edit and a live cut of
/// the same title by the same artist stay distinct songs.
pub fn fuzzy_match(a: &Song, b: &Song, config: &IdentityConfig) -> bool {
    durations_compatible(a.duration, b.duration, config)
        && song_similarity(a, b) >= config.fuzzy_threshold
}

/// Runs the tiers in order and reports the first that matched.
pub fn match_songs(a: &Song, b: &Song, config: &IdentityConfig) -> Option<MatchTier> {
    if id_match(a, b) {
        Some(MatchTier::SourceId)
    } else if fingerprint_match(a, b, config) {
        Some(MatchTier::Fingerprint)
    } else if fuzzy_match(a, b, config) {
        Some(MatchTier::Fuzzy)
    } else {
        None
    }
}

pub fn songs_equal(a: &Song, b: &Song, config: &IdentityConfig) -> bool {
    match_songs(a, b, config).is_some()
}

/// Authority ids decide when both are resolved; otherwise the names do.
pub fn artists_equal(a: &Artist, b: &Artist) -> bool {
    match (&a.authority_id, &b.authority_id) {
        (Some(x), Some(y)) => x == y,
        _ => normalize(&a.name) == normalize(&b.name),
    }
}

/// Name plus main artist, exact or fuzzy.
pub fn albums_equal(a: &Album, b: &Album, config: &IdentityConfig) -> bool {
    let shared_id = a
        .ids
        .iter()
        .any(|(source, id)| b.ids.get(source).is_some_and(|other| other == id));
    if shared_id {
        return true;
    }
    if let (Some(x), Some(y)) = (&a.authority_id, &b.authority_id) {
        return x == y;
    }

    let main_a = a.main_artist().map(|x| normalize(&x.name));
    let main_b = b.main_artist().map(|x| normalize(&x.name));
    let (main_a, main_b) = match (main_a, main_b) {
        (Some(x), Some(y)) => (Some(x), Some(y)),
        _ => (None, None),
    };

    if normalize(&a.name) == normalize(&b.name) && main_a == main_b {
        return true;
    }

    similarity(
        &similarity_text(&a.name, main_a),
        &similarity_text(&b.name, main_b),
    ) >= config.fuzzy_threshold
}

/// Playlists are equal by shared remote id or by case-folded name.
pub fn playlists_equal(a: &Playlist, b: &Playlist) -> bool {
    a.ids
        .iter()
        .any(|(source, id)| b.ids.get(source).is_some_and(|other| other == id))
        || normalize(&a.name) == normalize(&b.name)
}
