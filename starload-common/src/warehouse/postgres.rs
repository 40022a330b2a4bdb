//! Redshift / Postgres warehouse backend

use super::{Dialect, Warehouse};
use crate::config::ConnectionConfig;
use crate::Result;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::debug;

/// Warehouse reached over the Postgres wire protocol
///
/// Statements are sent through the simple query protocol (`raw_sql`) because
/// Redshift's `COPY ... FROM 's3://...'` cannot be prepared.
pub struct PostgresWarehouse {
    pool: PgPool,
}

impl PostgresWarehouse {
    /// Build a lazily-connecting pool from a connection config
    pub fn connect_lazy(config: &ConnectionConfig) -> Result<Self> {
        let url = normalize_url(&config.url);
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect_lazy(&url)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// sqlx only understands the `postgres`/`postgresql` schemes
fn normalize_url(url: &str) -> String {
    match url.strip_prefix("redshift://") {
        Some(rest) => format!("postgres://{}", rest),
        None => url.to_string(),
    }
}

#[async_trait]
impl Warehouse for PostgresWarehouse {
    fn dialect(&self) -> Dialect {
        Dialect::Redshift
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
            let conn: &mut sqlx::PgConnection = &mut tx;
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
