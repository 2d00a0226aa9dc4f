//! # Song Candidate Index
//!
//! [`songs_equal`] is tolerant (durations within a window, fuzzy names) and
//! therefore not hashable. The index never decides equality itself: it
//! narrows a lookup to the positions that could match under some tier and
//! the caller confirms each one with [`songs_equal`].
//!
//! - Tier 1 candidates come from every `(source, id)` pair.
//! - Tier 2 candidates share the normalized name.
//! - Tier 3 requires compatible durations, so candidates come from the
//!   duration window around the song plus, under
//!   [`UnknownDurationPolicy::Wildcard`], songs with no duration.
//!
//! A song whose own duration is unknown under the wildcard policy is
//! compatible with everything and falls back to a full scan.

use crate::identity::{normalize, songs_equal};
use crate::models::Song;
use core_runtime::config::{IdentityConfig, UnknownDurationPolicy};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct SongIndex {
    by_id: HashMap<(String, String), Vec<usize>>,
    by_name: HashMap<String, Vec<usize>>,
    by_duration: BTreeMap<Duration, Vec<usize>>,
    unknown_duration: Vec<usize>,
    len: usize,
}

fn push_unique(positions: &mut Vec<usize>, position: usize) {
    if !positions.contains(&position) {
        positions.push(position);
    }
}

impl SongIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes `songs` by their iteration position.
    pub fn build<'a>(songs: impl IntoIterator<Item = &'a Song>) -> Self {
        let mut index = Self::new();
        for (position, song) in songs.into_iter().enumerate() {
            index.insert(position, song);
        }
        index
    }

    /// Number of positions covered.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Records `song` at `position`.
    ///
    /// Calling it again for a position after a merge adds the new keys; keys
    /// a merge cannot remove are left in place.
    pub fn insert(&mut self, position: usize, song: &Song) {
        for (source, id) in &song.ids {
            push_unique(
                self.by_id.entry((source.clone(), id.clone())).or_default(),
                position,
            );
        }
        push_unique(self.by_name.entry(normalize(&song.name)).or_default(), position);
        match song.duration {
            Some(duration) => push_unique(self.by_duration.entry(duration).or_default(), position),
            None => push_unique(&mut self.unknown_duration, position),
        }
        self.len = self.len.max(position + 1);
    }

    /// Positions that may be identity-equal to `song`, ascending.
    pub fn candidates(&self, song: &Song, config: &IdentityConfig) -> Vec<usize> {
        let wildcard = config.unknown_duration == UnknownDurationPolicy::Wildcard;
        if song.duration.is_none() && wildcard {
            return (0..self.len).collect();
        }

        let mut positions = Vec::new();
        for (source, id) in &song.ids {
            if let Some(hits) = self.by_id.get(&(source.clone(), id.clone())) {
                positions.extend_from_slice(hits);
            }
        }
        if let Some(hits) = self.by_name.get(&normalize(&song.name)) {
            positions.extend_from_slice(hits);
        }
        match song.duration {
            Some(duration) => {
                let low = duration.saturating_sub(config.duration_tolerance);
                let high = duration.saturating_add(config.duration_tolerance);
                for (_, hits) in self.by_duration.range(low..=high) {
                    positions.extend_from_slice(hits);
                }
                if wildcard {
                    positions.extend_from_slice(&self.unknown_duration);
                }
            }
            None => positions.extend_from_slice(&self.unknown_duration),
        }

        positions.sort_unstable();
        positions.dedup();
        positions
    }

    /// First position in `songs` holding a song equal to `song`.
    ///
    /// `songs` must be the sequence this index was built over.
    pub fn find(&self, songs: &[Song], song: &Song, config: &IdentityConfig) -> Option<usize> {
        self.candidates(song, config).into_iter().find(|&position| {
            songs
                .get(position)
                .is_some_and(|known| songs_equal(known, song, config))
        })
    }

    /// Same as [`SongIndex::find`] over borrowed songs.
    pub fn find_ref(&self, songs: &[&Song], song: &Song, config: &IdentityConfig) -> Option<usize> {
        self.candidates(song, config).into_iter().find(|&position| {
            songs
                .get(position)
                .is_some_and(|known| songs_equal(known, song, config))
        })
    }
}
