//! # Resolver Cache
//!
//! In-memory store of authority results, keyed two ways:
//!
//! - an **ids** map from `"<kind>:<normalized query text>"` to authority id,
//!   so a repeated search short-circuits before any entity lookup
//! - one **entity** map per kind (artists, songs, albums) from authority id
//!   to the resolved [`AuthorityRecord`]
//!
//! The cache converts to and from [`CacheRow`]s for persistence. It never
//! talks to storage itself; the resolver owns that.

use crate::error::Result;
use bridge_traits::authority::{AuthorityKind, AuthorityQuery, AuthorityRecord};
use core_library::repositories::{CacheRow, CacheTable};
use std::collections::HashMap;
use tracing::warn;

/// Number of entries per map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheSizes {
    pub ids: usize,
    pub artists: usize,
    pub songs: usize,
    pub albums: usize,
}

impl CacheSizes {
    pub fn total(&self) -> usize {
        self.ids + self.artists + self.songs + self.albums
    }
}

#[derive(Debug, Default, Clone)]
pub struct ResolverCache {
    ids: HashMap<String, String>,
    artists: HashMap<String, AuthorityRecord>,
    songs: HashMap<String, AuthorityRecord>,
    albums: HashMap<String, AuthorityRecord>,
}

fn table_for(kind: AuthorityKind) -> CacheTable {
    match kind {
        AuthorityKind::Artist => CacheTable::Artists,
        AuthorityKind::Song => CacheTable::Songs,
        AuthorityKind::Album => CacheTable::Albums,
    }
}

/// Cache key of the ids map.
pub fn query_key(kind: AuthorityKind, query: &AuthorityQuery) -> String {
    format!("{}:{}", kind.as_str(), query.search_text())
}

/// The query a record would answer, used to match records that were cached
/// under a different search text.
pub fn record_query(record: &AuthorityRecord) -> AuthorityQuery {
    let query = AuthorityQuery::new(&record.name);
    match (record.kind, record.artists.first()) {
        (AuthorityKind::Artist, _) | (_, None) => query,
        (_, Some(artist)) => query.with_artist(&artist.name),
    }
}

impl ResolverCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entities(&self, kind: AuthorityKind) -> &HashMap<String, AuthorityRecord> {
        match kind {
            AuthorityKind::Artist => &self.artists,
            AuthorityKind::Song => &self.songs,
            AuthorityKind::Album => &self.albums,
        }
    }

    fn entities_mut(&mut self, kind: AuthorityKind) -> &mut HashMap<String, AuthorityRecord> {
        match kind {
            AuthorityKind::Artist => &mut self.artists,
            AuthorityKind::Song => &mut self.songs,
            AuthorityKind::Album => &mut self.albums,
        }
    }

    /// Cached record for a query.
    ///
    /// The ids map is consulted first. Failing that, a record whose own
    /// name and artist normalize to the same search text is returned.
    pub fn get(&self, kind: AuthorityKind, query: &AuthorityQuery) -> Option<&AuthorityRecord> {
        let entities = self.entities(kind);
        if let Some(id) = self.ids.get(&query_key(kind, query)) {
            if let Some(record) = entities.get(id) {
                return Some(record);
            }
        }

        let wanted = query.search_text();
        entities
            .values()
            .find(|record| record_query(record).search_text() == wanted)
    }

    pub fn get_by_id(&self, kind: AuthorityKind, id: &str) -> Option<&AuthorityRecord> {
        self.entities(kind).get(id)
    }

    /// Stores a record and remembers which query produced it.
    ///
    /// Returns the rows that changed so callers can persist them.
    pub fn insert(&mut self, query: &AuthorityQuery, record: AuthorityRecord) -> Result<Vec<CacheRow>> {
        let kind = record.kind;
        let key = query_key(kind, query);
        let rows = vec![
            CacheRow::new(CacheTable::Ids, &key, &record.id),
            CacheRow::new(table_for(kind), &record.id, serde_json::to_string(&record)?),
        ];

        self.ids.insert(key, record.id.clone());
        self.entities_mut(kind).insert(record.id.clone(), record);
        Ok(rows)
    }

    /// Loads persisted rows. Rows that no longer parse are skipped.
    ///
    /// Returns the number of rows accepted.
    pub fn hydrate(&mut self, rows: Vec<CacheRow>) -> usize {
        let mut accepted = 0;
        for row in rows {
            match row.table {
                CacheTable::Ids => {
                    self.ids.insert(row.key, row.payload);
                    accepted += 1;
                }
                table => match serde_json::from_str::<AuthorityRecord>(&row.payload) {
                    Ok(record) if table_for(record.kind) == table => {
                        self.entities_mut(record.kind).insert(row.key, record);
                        accepted += 1;
                    }
                    Ok(record) => {
                        warn!(key = %row.key, kind = %record.kind, table = %table, "Cached record stored under wrong table");
                    }
                    Err(e) => {
                        warn!(key = %row.key, table = %table, error = %e, "Skipping unreadable cache row");
                    }
                },
            }
        }
        accepted
    }

    /// Every entry as persistence rows.
    pub fn to_rows(&self) -> Result<Vec<CacheRow>> {
        let mut rows = Vec::with_capacity(self.sizes().total());
        for (key, id) in &self.ids {
            rows.push(CacheRow::new(CacheTable::Ids, key, id));
        }
        for kind in [AuthorityKind::Artist, AuthorityKind::Song, AuthorityKind::Album] {
            for (id, record) in self.entities(kind) {
                rows.push(CacheRow::new(table_for(kind), id, serde_json::to_string(record)?));
            }
        }
        Ok(rows)
    }

    pub fn sizes(&self) -> CacheSizes {
        CacheSizes {
            ids: self.ids.len(),
            artists: self.artists.len(),
            songs: self.songs.len(),
            albums: self.albums.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sizes().total() == 0
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.artists.clear();
        self.songs.clear();
        self.albums.clear();
    }
}
