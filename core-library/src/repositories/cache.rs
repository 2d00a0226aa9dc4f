//! Database repository for the resolver cache
//!
//! Authority results are treated as immutable once fetched, so rows are
//! only ever inserted or replaced, and removed by an explicit clear.

use crate::error::{LibraryError, Result};
use crate::repositories::{get_i64, get_string};
use bridge_traits::database::{DatabaseAdapter, QueryValue};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, instrument};

/// Which cache map a row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheTable {
    /// Normalized query text to authority id
    Ids,
    Artists,
    Songs,
    Albums,
}

impl CacheTable {
    pub const ALL: [CacheTable; 4] = [
        CacheTable::Ids,
        CacheTable::Artists,
        CacheTable::Songs,
        CacheTable::Albums,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheTable::Ids => "ids",
            CacheTable::Artists => "artists",
            CacheTable::Songs => "songs",
            CacheTable::Albums => "albums",
        }
    }
}

impl fmt::Display for CacheTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheTable {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ids" => Ok(CacheTable::Ids),
            "artists" => Ok(CacheTable::Artists),
            "songs" => Ok(CacheTable::Songs),
            "albums" => Ok(CacheTable::Albums),
            other => Err(LibraryError::InvalidInput {
                field: "cache_table".to_string(),
                message: format!("unknown cache table '{}'", other),
            }),
        }
    }
}

/// One persisted cache entry. `payload` is opaque to the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRow {
    pub table: CacheTable,
    pub key: String,
    pub payload: String,
}

impl CacheRow {
    pub fn new(table: CacheTable, key: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            table,
            key: key.into(),
            payload: payload.into(),
        }
    }
}

#[async_trait::async_trait]
pub trait ResolverCacheRepository: Send + Sync {
    /// Create tables if needed.
    async fn initialize(&self) -> Result<()>;

    /// Insert or replace a batch of entries atomically.
    async fn upsert(&self, rows: &[CacheRow]) -> Result<()>;

    async fn load_all(&self) -> Result<Vec<CacheRow>>;

    async fn count(&self, table: CacheTable) -> Result<u64>;

    async fn clear(&self) -> Result<()>;
}

pub struct SqliteResolverCacheRepository {
    db: Arc<dyn DatabaseAdapter>,
}

impl SqliteResolverCacheRepository {
    pub fn new(db: Arc<dyn DatabaseAdapter>) -> Self {
        Self { db }
    }
}

const UPSERT_SQL: &str = "INSERT INTO resolver_cache (cache_table, cache_key, payload, updated_at)
     VALUES (?, ?, ?, ?)
     ON CONFLICT(cache_table, cache_key) DO UPDATE SET
        payload = excluded.payload,
        updated_at = excluded.updated_at";

#[async_trait::async_trait]
impl ResolverCacheRepository for SqliteResolverCacheRepository {
    #[instrument(skip(self))]
    async fn initialize(&self) -> Result<()> {
        self.db
            .execute(
                "CREATE TABLE IF NOT EXISTS resolver_cache (
                    cache_table TEXT NOT NULL,
                    cache_key TEXT NOT NULL,
                    payload TEXT NOT NULL,
                    updated_at INTEGER NOT NULL,
                    PRIMARY KEY (cache_table, cache_key)
                )",
                &[],
            )
            .await
            .map_err(|e| {
                error!("Failed to create resolver_cache table: {}", e);
                LibraryError::from(e)
            })?;

        debug!("Resolver cache repository initialized");
        Ok(())
    }

    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    async fn upsert(&self, rows: &[CacheRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let now = chrono::Utc::now().timestamp();
        let params: Vec<[QueryValue; 4]> = rows
            .iter()
            .map(|row| {
                [
                    QueryValue::from(row.table.as_str()),
                    QueryValue::from(row.key.as_str()),
                    QueryValue::from(row.payload.as_str()),
                    QueryValue::Integer(now),
                ]
            })
            .collect();
        let statements: Vec<(&str, &[QueryValue])> = params
            .iter()
            .map(|p| (UPSERT_SQL, p.as_slice()))
            .collect();

        self.db.execute_batch(&statements).await?;
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<CacheRow>> {
        let rows = self
            .db
            .query(
                "SELECT cache_table, cache_key, payload FROM resolver_cache
                 ORDER BY cache_table, cache_key",
                &[],
            )
            .await?;

        rows.iter()
            .map(|row| {
                Ok(CacheRow {
                    table: get_string(row, "cache_table")?.parse()?,
                    key: get_string(row, "cache_key")?,
                    payload: get_string(row, "payload")?,
                })
            })
            .collect()
    }

    async fn count(&self, table: CacheTable) -> Result<u64> {
        let row = self
            .db
            .query_one_optional(
                "SELECT COUNT(*) AS count FROM resolver_cache WHERE cache_table = ?",
                &[QueryValue::from(table.as_str())],
            )
            .await?;

        match row {
            Some(row) => Ok(get_i64(&row, "count")? as u64),
            None => Ok(0),
        }
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> Result<()> {
        let removed = self.db.execute("DELETE FROM resolver_cache", &[]).await?;
        debug!(removed, "Resolver cache cleared");
        Ok(())
    }
}
