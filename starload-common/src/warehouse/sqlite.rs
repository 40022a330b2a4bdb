//! SQLite warehouse backend

use super::{Dialect, Warehouse};
use crate::config::ConnectionConfig;
use crate::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Local warehouse backed by a SQLite file or an in-memory database
///
/// SQLite has no bulk-copy command, so a workflow that stages from object
/// storage cannot run against it. It serves schema creation and tests that
/// fill the staging tables themselves.
pub struct SqliteWarehouse {
    pool: SqlitePool,
}

impl SqliteWarehouse {
    /// Open the database named by a connection config, creating the file if needed
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);
        let mut pool_options = SqlitePoolOptions::new()
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs));

        // Every connection to ":memory:" is a separate database; pin a single
        // connection for the lifetime of the pool.
        if is_memory_url(&config.url) {
            pool_options = pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        } else {
            pool_options = pool_options.max_connections(config.max_connections);
        }

        let pool = pool_options.connect_with(options).await?;
        Ok(Self { pool })
    }

    /// Open a fresh private in-memory warehouse
    pub async fn in_memory() -> Result<Self> {
        Self::connect(&ConnectionConfig::new("sqlite::memory:")).await
    }
}

fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

#[async_trait]
impl Warehouse for SqliteWarehouse {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        debug!(sql, "Executing statement");
        let result = sqlx::raw_sql(sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn execute_atomic(&self, statements: &[String]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut affected = 0;
        for sql in statements {
            debug!(sql = sql.as_str(), "Executing statement in transaction");
            let conn: &mut sqlx::SqliteConnection = &mut tx;
            affected += sqlx::Executor::execute(conn, sqlx::raw_sql(sql.as_str()))
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(affected)
    }

    async fn query_scalar(&self, sql: &str) -> Result<Option<i64>> {
        let value = sqlx::query_scalar::<_, Option<i64>>(sql)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value.flatten())
    }
}
