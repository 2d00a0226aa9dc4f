//! Minimal add/remove diff between the canonical collection and a remote
//! container, computed with song identity rather than reference equality.

use core_library::index::SongIndex;
use core_library::models::Song;
use core_runtime::config::IdentityConfig;

/// Changes that bring a remote container in line with the canonical one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diff {
    /// Remote songs with no canonical counterpart
    pub to_remove: Vec<Song>,
    /// Canonical songs missing remotely
    pub to_add: Vec<Song>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.to_remove.is_empty() && self.to_add.is_empty()
    }

    pub fn len(&self) -> usize {
        self.to_remove.len() + self.to_add.len()
    }
}

/// `to_remove = remote - canonical`, `to_add = canonical - remote`.
///
/// Each side keeps its original order, and an entry repeated on one side is
/// reported once.
pub fn compute_diff(canonical: &[Song], remote: &[Song], identity: &IdentityConfig) -> Diff {
    Diff {
        to_remove: difference(remote, canonical, identity),
        to_add: difference(canonical, remote, identity),
    }
}

fn difference(from: &[Song], other: &[Song], identity: &IdentityConfig) -> Vec<Song> {
    let other_index = SongIndex::build(other);
    let mut out: Vec<Song> = Vec::new();
    let mut out_index = SongIndex::new();
    for song in from {
        let present = other_index.find(other, song, identity).is_some();
        let reported = out_index.find(&out, song, identity).is_some();
        if !present && !reported {
            out_index.insert(out.len(), song);
            out.push(song.clone());
        }
    }
    out
}
