//! Database Abstraction Layer
//!
//! A small trait over a SQL store so repositories can persist the collection
//! and the resolver cache without depending on a concrete driver.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_traits::database::{DatabaseAdapter, DatabaseConfig, QueryValue};
//!
//! let mut adapter = SqliteAdapter::from_config(&DatabaseConfig::in_memory()).await?;
//! adapter.initialize().await?;
//! adapter
//!     .execute(
//!         "INSERT INTO resolver_cache (kind, cache_key, payload) VALUES (?, ?, ?)",
//!         &["song".into(), "hey jude | the beatles".into(), payload.into()],
//!     )
//!     .await?;
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database file path or connection string
    pub database_url: String,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Maximum time to wait for a connection (seconds)
    pub acquire_timeout_secs: u64,
}

impl DatabaseConfig {
    /// Create a new database configuration with the given file path
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        let path = database_path.into();
        let database_url = format!("sqlite:{}", path.display());

        Self {
            database_url,
            min_connections: 1,
            max_connections: 5,
            acquire_timeout_secs: 30,
        }
    }

    /// Configuration for an in-memory database.
    ///
    /// Pinned to a single connection: every SQLite in-memory connection owns
    /// a separate database.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            min_connections: 1,
            max_connections: 1,
            acquire_timeout_secs: 30,
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:")
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

// =============================================================================
// Query Result Types
// =============================================================================

/// A single row keyed by column name
pub type QueryRow = std::collections::HashMap<String, QueryValue>;

/// A database value that can be null, integer, real, text, or blob
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl QueryValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            QueryValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            QueryValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<String> {
        self.as_str().map(str::to_string)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, QueryValue::Null)
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::Text(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::Text(value)
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        QueryValue::Integer(value)
    }
}

impl<T: Into<QueryValue>> From<Option<T>> for QueryValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(QueryValue::Null)
    }
}

// =============================================================================
// Database Adapter Trait
// =============================================================================

/// Async SQL adapter.
///
/// Implementations must use parameterized statements; callers never splice
/// values into SQL text.
#[async_trait::async_trait]
pub trait DatabaseAdapter: Send + Sync {
    /// Establish connections and apply connection pragmas.
    async fn initialize(&mut self) -> Result<()>;

    /// Check if the database connection is healthy
    async fn health_check(&self) -> Result<()>;

    /// Close all database connections
    async fn close(&mut self) -> Result<()>;

    /// Execute a query and return all rows
    async fn query(&self, query: &str, params: &[QueryValue]) -> Result<Vec<QueryRow>>;

    /// Execute a statement and return the number of affected rows
    async fn execute(&self, statement: &str, params: &[QueryValue]) -> Result<u64>;

    /// Execute a query that returns zero or one row
    async fn query_one_optional(
        &self,
        query: &str,
        params: &[QueryValue],
    ) -> Result<Option<QueryRow>>;

    /// Execute several statements atomically. Either all apply or none do.
    async fn execute_batch(&self, statements: &[(&str, &[QueryValue])]) -> Result<Vec<u64>>;
}
