//! Fact and dimension table loads

use super::{Task, TaskKind};
use crate::context::RunContext;
use crate::error::TaskError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use starload_common::{ConnectionProvider, Identifier};
use std::sync::Arc;
use tracing::info;

/// Whether a load fills the fact table or a dimension table
///
/// Both roles run the same statements; the role only labels the graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadRole {
    Fact,
    Dimension,
}

/// Parameters of one load task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadTableConfig {
    pub table: Identifier,
    pub connection_id: String,
    /// `INSERT ... SELECT` statement filling the table
    pub sql: String,
    /// Keep existing rows instead of replacing the table contents
    #[serde(default)]
    pub append_only: bool,
}

/// Runs an insert statement against the warehouse, optionally clearing the
/// target table first
///
/// The delete and the insert share one transaction: a failed insert leaves the
/// previous contents in place.
pub struct LoadTable {
    role: LoadRole,
    config: LoadTableConfig,
    connections: Arc<dyn ConnectionProvider>,
}

impl LoadTable {
    pub fn new(
        role: LoadRole,
        config: LoadTableConfig,
        connections: Arc<dyn ConnectionProvider>,
    ) -> Self {
        Self {
            role,
            config,
            connections,
        }
    }

    pub fn fact(config: LoadTableConfig, connections: Arc<dyn ConnectionProvider>) -> Self {
        Self::new(LoadRole::Fact, config, connections)
    }

    pub fn dimension(config: LoadTableConfig, connections: Arc<dyn ConnectionProvider>) -> Self {
        Self::new(LoadRole::Dimension, config, connections)
    }

    /// Statements issued by one execution, in order
    pub fn statements(&self) -> Vec<String> {
        let mut statements = Vec::with_capacity(2);
        if !self.config.append_only {
            statements.push(format!("DELETE FROM {}", self.config.table.quoted()));
        }
        statements.push(self.config.sql.clone());
        statements
    }
}

#[async_trait]
impl Task for LoadTable {
    fn kind(&self) -> TaskKind {
        match self.role {
            LoadRole::Fact => TaskKind::LoadFact,
            LoadRole::Dimension => TaskKind::LoadDimension,
        }
    }

    fn describe(&self) -> String {
        let mode = if self.config.append_only {
            "append"
        } else {
            "replace"
        };
        format!("insert into {} ({})", self.config.table, mode)
    }

    async fn execute(&self, _ctx: &RunContext) -> Result<(), TaskError> {
        let table = &self.config.table;
        let warehouse = self.connections.warehouse(&self.config.connection_id).await?;

        if self.config.append_only {
            info!(table = %table, role = ?self.role, "Appending to table");
        } else {
            info!(table = %table, role = ?self.role, "Clearing data from table before insert");
        }

        let affected = warehouse.execute_atomic(&self.statements()).await?;
        info!(table = %table, rows_affected = affected, "Load finished");
        Ok(())
    }
}
