//! Native SQLite Database Adapter
//!
//! Implements the `DatabaseAdapter` trait using `sqlx` with the native
//! SQLite driver.
//!
//! ## Features
//!
//! - Connection pooling with configurable limits
//! - WAL mode for file databases
//! - Atomic batches through a pooled transaction

use async_trait::async_trait;
use bridge_traits::database::{DatabaseAdapter, DatabaseConfig, QueryRow, QueryValue};
use bridge_traits::error::{BridgeError, Result};
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{Column, Pool, Row, Sqlite};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// Native SQLite implementation of DatabaseAdapter
pub struct SqliteAdapter {
    pool: Pool<Sqlite>,
    config: DatabaseConfig,
}

impl SqliteAdapter {
    /// Create a new SqliteAdapter with the given configuration
    ///
    /// # Errors
    ///
    /// Returns error if the URL is invalid or the pool cannot connect.
    pub async fn new(config: DatabaseConfig) -> Result<Self> {
        info!(
            database_url = %config.database_url,
            min_connections = config.min_connections,
            max_connections = config.max_connections,
            "Creating SQLite database adapter"
        );

        let mut connect_options = SqliteConnectOptions::from_str(&config.database_url)
            .map_err(|e| BridgeError::DatabaseError(format!("Invalid database URL: {}", e)))?
            .synchronous(SqliteSynchronous::Normal)
            .create_if_missing(true);

        if !config.is_in_memory() {
            connect_options = connect_options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool = SqlitePoolOptions::new()
            .min_connections(config.min_connections)
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect_with(connect_options)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to create connection pool");
                BridgeError::DatabaseError(format!("Connection pool creation failed: {}", e))
            })?;

        Ok(Self { pool, config })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: Pool<Sqlite>) -> Self {
        Self {
            pool,
            config: DatabaseConfig::default(),
        }
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    fn row_to_query_row(row: &SqliteRow) -> QueryRow {
        let mut result = HashMap::new();

        for column in row.columns() {
            let ordinal = column.ordinal();
            let value = if let Ok(v) = row.try_get::<Option<i64>, _>(ordinal) {
                v.map(QueryValue::Integer).unwrap_or(QueryValue::Null)
            } else if let Ok(v) = row.try_get::<Option<f64>, _>(ordinal) {
                v.map(QueryValue::Real).unwrap_or(QueryValue::Null)
            } else if let Ok(v) = row.try_get::<Option<String>, _>(ordinal) {
                v.map(QueryValue::Text).unwrap_or(QueryValue::Null)
            } else if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(ordinal) {
                v.map(QueryValue::Blob).unwrap_or(QueryValue::Null)
            } else {
                QueryValue::Null
            };

            result.insert(column.name().to_string(), value);
        }

        result
    }

    fn bind_params<'q>(mut query: SqliteQuery<'q>, params: &'q [QueryValue]) -> SqliteQuery<'q> {
        for param in params {
            query = match param {
                QueryValue::Null => query.bind(None::<i64>),
                QueryValue::Integer(i) => query.bind(*i),
                QueryValue::Real(r) => query.bind(*r),
                QueryValue::Text(s) => query.bind(s.as_str()),
                QueryValue::Blob(b) => query.bind(b.as_slice()),
            };
        }
        query
    }
}

#[async_trait]
impl DatabaseAdapter for SqliteAdapter {
    async fn initialize(&mut self) -> Result<()> {
        debug!("Initializing database adapter");
        self.health_check().await?;
        info!("Database adapter initialized");
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, "Database health check failed");
                BridgeError::DatabaseError(format!("Health check failed: {}", e))
            })?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        info!("Closing database connection pool");
        self.pool.close().await;
        Ok(())
    }

    async fn query(&self, query: &str, params: &[QueryValue]) -> Result<Vec<QueryRow>> {
        debug!(query = %query, param_count = params.len(), "Executing query");

        let rows = Self::bind_params(sqlx::query(query), params)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Query failed: {}", e)))?;

        Ok(rows.iter().map(Self::row_to_query_row).collect())
    }

    async fn execute(&self, statement: &str, params: &[QueryValue]) -> Result<u64> {
        debug!(statement = %statement, param_count = params.len(), "Executing statement");

        let result = Self::bind_params(sqlx::query(statement), params)
            .execute(&self.pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Execute failed: {}", e)))?;

        Ok(result.rows_affected())
    }

    async fn query_one_optional(
        &self,
        query: &str,
        params: &[QueryValue],
    ) -> Result<Option<QueryRow>> {
        let row = Self::bind_params(sqlx::query(query), params)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Query one optional failed: {}", e)))?;

        Ok(row.as_ref().map(Self::row_to_query_row))
    }

    async fn execute_batch(&self, statements: &[(&str, &[QueryValue])]) -> Result<Vec<u64>> {
        debug!(batch_size = statements.len(), "Executing batch");

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Begin transaction failed: {}", e)))?;

        let mut results = Vec::with_capacity(statements.len());
        for (statement, params) in statements {
            let result = Self::bind_params(sqlx::query(*statement), *params)
                .execute(&mut *tx)
                .await
                .map_err(|e| BridgeError::DatabaseError(format!("Batch statement failed: {}", e)))?;
            results.push(result.rows_affected());
        }

        tx.commit()
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Commit failed: {}", e)))?;

        Ok(results)
    }
}
