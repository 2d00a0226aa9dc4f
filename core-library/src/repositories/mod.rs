//! # Repository Pattern Implementation
//!
//! Persistence for the collection and the resolver cache. Each repository
//! is a trait with a SQLite implementation over the
//! [`DatabaseAdapter`](bridge_traits::database::DatabaseAdapter) bridge.
//!
//! ## Available Repositories
//!
//! - `CollectionRepository` - liked songs, playlists and albums as JSON rows
//! - `ResolverCacheRepository` - authority lookups keyed by kind and query

pub mod cache;
pub mod collection;

pub use cache::{CacheRow, CacheTable, ResolverCacheRepository, SqliteResolverCacheRepository};
pub use collection::{CollectionRepository, SqliteCollectionRepository};

use crate::error::{LibraryError, Result};
use bridge_traits::database::QueryRow;

pub(crate) fn get_string(row: &QueryRow, key: &str) -> Result<String> {
    row.get(key)
        .and_then(|value| value.as_string())
        .ok_or_else(|| LibraryError::InvalidInput {
            field: key.to_string(),
            message: "missing or non-text column".to_string(),
        })
}

pub(crate) fn get_i64(row: &QueryRow, key: &str) -> Result<i64> {
    row.get(key)
        .and_then(|value| value.as_i64())
        .ok_or_else(|| LibraryError::InvalidInput {
            field: key.to_string(),
            message: "missing or non-integer column".to_string(),
        })
}
