//! Post-load data-quality checks
//!
//! Every listed table must hold at least one row; configured scalar checks
//! must return their expected value. All checks run even after a failure so
//! the report names every problem at once.

use super::{Task, TaskKind};
use crate::context::RunContext;
use crate::error::TaskError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use starload_common::{ConnectionProvider, Identifier, Warehouse};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info};

/// A query returning one integer that must equal `expected`
///
/// e.g. `SELECT COUNT(*) FROM users WHERE userid IS NULL` expecting `0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalarCheck {
    pub name: String,
    pub sql: String,
    pub expected: i64,
}

/// Parameters of the quality task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQualityConfig {
    pub connection_id: String,
    /// Tables that must be non-empty, checked in order
    pub tables: Vec<Identifier>,
    #[serde(default)]
    pub checks: Vec<ScalarCheck>,
}

/// One failed check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckFailure {
    /// The table has zero rows
    Empty { table: Identifier },
    /// The row count query returned nothing
    NoResult { table: Identifier },
    /// The check query itself failed
    QueryFailed { check: String, message: String },
    /// A scalar check returned an unexpected value
    Mismatch {
        check: String,
        expected: i64,
        actual: Option<i64>,
    },
}

impl fmt::Display for CheckFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckFailure::Empty { table } => write!(f, "table {} contains 0 rows", table),
            CheckFailure::NoResult { table } => {
                write!(f, "table {} returned no row count", table)
            }
            CheckFailure::QueryFailed { check, message } => {
                write!(f, "check {} could not run: {}", check, message)
            }
            CheckFailure::Mismatch {
                check,
                expected,
                actual: Some(actual),
            } => write!(f, "check {} returned {}, expected {}", check, actual, expected),
            CheckFailure::Mismatch {
                check,
                expected,
                actual: None,
            } => write!(f, "check {} returned nothing, expected {}", check, expected),
        }
    }
}

/// Validates the loaded tables
pub struct DataQuality {
    config: DataQualityConfig,
    connections: Arc<dyn ConnectionProvider>,
}

impl DataQuality {
    pub fn new(config: DataQualityConfig, connections: Arc<dyn ConnectionProvider>) -> Self {
        Self {
            config,
            connections,
        }
    }

    /// Run every check against a warehouse and collect the failures
    pub async fn evaluate(&self, warehouse: &dyn Warehouse) -> Vec<CheckFailure> {
        let mut failures = Vec::new();

        for table in &self.config.tables {
            match warehouse.row_count(table).await {
                Ok(Some(count)) if count >= 1 => {
                    info!(table = %table, records = count, "Data quality check passed");
                }
                Ok(Some(_)) => failures.push(CheckFailure::Empty {
                    table: table.clone(),
                }),
                Ok(None) => failures.push(CheckFailure::NoResult {
                    table: table.clone(),
                }),
                Err(e) => failures.push(CheckFailure::QueryFailed {
                    check: format!("row count of {}", table),
                    message: e.to_string(),
                }),
            }
        }

        for check in &self.config.checks {
            match warehouse.query_scalar(&check.sql).await {
                Ok(Some(value)) if value == check.expected => {
                    info!(check = %check.name, value, "Data quality check passed");
                }
                Ok(actual) => failures.push(CheckFailure::Mismatch {
                    check: check.name.clone(),
                    expected: check.expected,
                    actual,
                }),
                Err(e) => failures.push(CheckFailure::QueryFailed {
                    check: check.name.clone(),
                    message: e.to_string(),
                }),
            }
        }

        failures
    }
}

#[async_trait]
impl Task for DataQuality {
    fn kind(&self) -> TaskKind {
        TaskKind::QualityCheck
    }

    fn describe(&self) -> String {
        let tables: Vec<&str> = self.config.tables.iter().map(|t| t.as_str()).collect();
        format!(
            "non-empty [{}] + {} scalar check(s)",
            tables.join(", "),
            self.config.checks.len()
        )
    }

    async fn execute(&self, _ctx: &RunContext) -> Result<(), TaskError> {
        let warehouse = self.connections.warehouse(&self.config.connection_id).await?;
        let failures = self.evaluate(warehouse.as_ref()).await;

        if failures.is_empty() {
            info!(
                tables = self.config.tables.len(),
                checks = self.config.checks.len(),
                "All data quality checks passed"
            );
            return Ok(());
        }

        for failure in &failures {
            error!("Data quality check failed: {}", failure);
        }
        Err(TaskError::Quality(failures))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use starload_common::warehouse::SqliteWarehouse;
    use starload_common::ConnectionRegistry;
    use uuid::Uuid;

    fn tables(names: &[&str]) -> Vec<Identifier> {
        names.iter().map(|n| Identifier::parse(n).unwrap()).collect()
    }

    async fn task(config_tables: &[&str], checks: Vec<ScalarCheck>) -> DataQuality {
        let warehouse = Arc::new(SqliteWarehouse::in_memory().await.unwrap());
        warehouse
            .execute(
                "CREATE TABLE songs (song_id TEXT);
                 CREATE TABLE users (userid INTEGER);
                 CREATE TABLE artists (artist_id TEXT);
                 INSERT INTO songs VALUES ('SO1'), ('SO2');
                 INSERT INTO users VALUES (1), (NULL);",
            )
            .await
            .unwrap();
        let registry = ConnectionRegistry::default().with("local", warehouse);
        DataQuality::new(
            DataQualityConfig {
                connection_id: "local".to_string(),
                tables: tables(config_tables),
                checks,
            },
            Arc::new(registry),
        )
    }

    fn ctx() -> RunContext {
        RunContext::with_run_id(Uuid::nil(), chrono::Utc::now())
    }

    #[tokio::test]
    async fn test_passes_when_every_table_has_rows() {
        let task = task(&["songs", "users"], vec![]).await;
        assert!(task.execute(&ctx()).await.is_ok());
    }

    #[tokio::test]
    async fn test_reports_every_failure_without_short_circuit() {
        let task = task(&["artists", "songs", "songplays"], vec![]).await;
        let err = task.execute(&ctx()).await.unwrap_err();

        let TaskError::Quality(failures) = err else {
            panic!("expected quality failure");
        };
        assert_eq!(failures.len(), 2);
        assert_eq!(
            failures[0],
            CheckFailure::Empty {
                table: Identifier::parse("artists").unwrap()
            }
        );
        assert!(matches!(&failures[1], CheckFailure::QueryFailed { check, .. } if check.contains("songplays")));
    }

    #[tokio::test]
    async fn test_scalar_checks() {
        let checks = vec![
            ScalarCheck {
                name: "songs_have_ids".to_string(),
                sql: "SELECT COUNT(*) FROM songs WHERE song_id IS NULL".to_string(),
                expected: 0,
            },
            ScalarCheck {
                name: "users_have_ids".to_string(),
                sql: "SELECT COUNT(*) FROM users WHERE userid IS NULL".to_string(),
                expected: 0,
            },
        ];
        let task = task(&["songs"], checks).await;
        let err = task.execute(&ctx()).await.unwrap_err();

        let TaskError::Quality(failures) = err else {
            panic!("expected quality failure");
        };
        assert_eq!(
            failures,
            vec![CheckFailure::Mismatch {
                check: "users_have_ids".to_string(),
                expected: 0,
                actual: Some(1),
            }]
        );
        assert_eq!(
            failures[0].to_string(),
            "check users_have_ids returned 1, expected 0"
        );
    }

    #[tokio::test]
    async fn test_unknown_connection_is_a_task_error() {
        let task = DataQuality::new(
            DataQualityConfig {
                connection_id: "missing".to_string(),
                tables: tables(&["songs"]),
                checks: vec![],
            },
            Arc::new(ConnectionRegistry::default()),
        );
        assert!(matches!(
            task.execute(&ctx()).await,
            Err(TaskError::Common(starload_common::Error::UnknownConnection(_)))
        ));
    }
}
