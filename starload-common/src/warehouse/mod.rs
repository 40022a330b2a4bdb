//! Warehouse client abstraction
//!
//! Tasks never talk to sqlx directly; they receive a [`Warehouse`] trait object
//! from a [`crate::ConnectionProvider`]. Two backends exist:
//! - [`PostgresWarehouse`]: Redshift (and plain Postgres) over the Postgres wire protocol
//! - [`SqliteWarehouse`]: local file or in-memory warehouse for development and tests

use crate::config::ConnectionConfig;
use crate::{Error, Identifier, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

mod postgres;
mod sqlite;

pub use postgres::PostgresWarehouse;
pub use sqlite::SqliteWarehouse;

/// SQL dialect spoken by a warehouse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Amazon Redshift (Postgres wire protocol, `COPY ... FROM 's3://...'`)
    Redshift,
    /// SQLite
    Sqlite,
}

impl Dialect {
    /// Infer the dialect from a connection URL scheme
    pub fn from_url(url: &str) -> Result<Self> {
        let scheme = url.split(':').next().unwrap_or_default();
        match scheme {
            "postgres" | "postgresql" | "redshift" => Ok(Dialect::Redshift),
            "sqlite" => Ok(Dialect::Sqlite),
            other => Err(Error::Config(format!(
                "Unsupported connection scheme '{}' in '{}'",
                other, url
            ))),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Redshift => f.write_str("redshift"),
            Dialect::Sqlite => f.write_str("sqlite"),
        }
    }
}

/// A SQL endpoint the workflow tasks write to
///
/// Every statement either succeeds or returns an error; implementations never
/// swallow failures reported by the engine.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Dialect of the underlying engine
    fn dialect(&self) -> Dialect;

    /// Execute arbitrary SQL text, returning the number of affected rows
    async fn execute(&self, sql: &str) -> Result<u64>;

    /// Execute statements in order inside a single transaction
    ///
    /// Either every statement takes effect or none does.
    async fn execute_atomic(&self, statements: &[String]) -> Result<u64>;

    /// Fetch the first column of the first row as an integer
    ///
    /// Returns `None` when the query yields no rows or a NULL value.
    async fn query_scalar(&self, sql: &str) -> Result<Option<i64>>;

    /// Count the rows of a table
    async fn row_count(&self, table: &Identifier) -> Result<Option<i64>> {
        self.query_scalar(&format!("SELECT COUNT(*) FROM {}", table.quoted()))
            .await
    }
}

/// Open a warehouse for a configured connection
///
/// Pools connect lazily, so an unreachable warehouse surfaces as an error on
/// the first statement rather than here.
pub async fn open(config: &ConnectionConfig) -> Result<Arc<dyn Warehouse>> {
    match Dialect::from_url(&config.url)? {
        Dialect::Redshift => Ok(Arc::new(PostgresWarehouse::connect_lazy(config)?)),
        Dialect::Sqlite => Ok(Arc::new(SqliteWarehouse::connect(config).await?)),
    }
}
