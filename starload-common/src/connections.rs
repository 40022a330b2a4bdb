//! Warehouse connection lookup
//!
//! Tasks hold a connection id and an `Arc<dyn ConnectionProvider>`; the id is
//! resolved to a live [`Warehouse`] only when the task executes.

use crate::config::ConnectionConfig;
use crate::warehouse::{self, Dialect, Warehouse};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Resolves a connection id to a warehouse client at execution time
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    async fn warehouse(&self, id: &str) -> Result<Arc<dyn Warehouse>>;
}

/// Connections declared in the `[connections.<id>]` config sections
///
/// Each connection is opened on first use and shared by every task that names
/// it afterwards.
#[derive(Default)]
pub struct ConnectionRegistry {
    configs: BTreeMap<String, ConnectionConfig>,
    fixed: HashMap<String, Arc<dyn Warehouse>>,
    opened: Mutex<HashMap<String, Arc<dyn Warehouse>>>,
}

impl ConnectionRegistry {
    pub fn new(configs: BTreeMap<String, ConnectionConfig>) -> Self {
        Self {
            configs,
            ..Default::default()
        }
    }

    /// Register an already-open warehouse under an id
    pub fn with(mut self, id: impl Into<String>, warehouse: Arc<dyn Warehouse>) -> Self {
        self.fixed.insert(id.into(), warehouse);
        self
    }

    /// Dialect of a connection, known without opening it
    pub fn dialect(&self, id: &str) -> Result<Dialect> {
        if let Some(warehouse) = self.fixed.get(id) {
            return Ok(warehouse.dialect());
        }
        let config = self
            .configs
            .get(id)
            .ok_or_else(|| Error::UnknownConnection(id.to_string()))?;
        Dialect::from_url(&config.url)
    }
}

#[async_trait]
impl ConnectionProvider for ConnectionRegistry {
    async fn warehouse(&self, id: &str) -> Result<Arc<dyn Warehouse>> {
        if let Some(warehouse) = self.fixed.get(id) {
            return Ok(warehouse.clone());
        }

        let mut opened = self.opened.lock().await;
        if let Some(warehouse) = opened.get(id) {
            return Ok(warehouse.clone());
        }

        let config = self
            .configs
            .get(id)
            .ok_or_else(|| Error::UnknownConnection(id.to_string()))?;
        let warehouse = warehouse::open(config).await?;
        info!(connection = id, dialect = %warehouse.dialect(), "Opened warehouse connection");
        opened.insert(id.to_string(), warehouse.clone());
        Ok(warehouse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::SqliteWarehouse;

    #[tokio::test]
    async fn test_fixed_warehouse_is_returned() {
        let warehouse: Arc<dyn Warehouse> = Arc::new(SqliteWarehouse::in_memory().await.unwrap());
        let registry = ConnectionRegistry::default().with("local", warehouse.clone());

        let resolved = registry.warehouse("local").await.unwrap();
        assert!(Arc::ptr_eq(&resolved, &warehouse));
        assert_eq!(registry.dialect("local").unwrap(), Dialect::Sqlite);
    }

    #[tokio::test]
    async fn test_configured_connection_is_opened_once() {
        let mut configs = BTreeMap::new();
        configs.insert("mem".to_string(), ConnectionConfig::new("sqlite::memory:"));
        let registry = ConnectionRegistry::new(configs);

        let first = registry.warehouse("mem").await.unwrap();
        first.execute("CREATE TABLE users (userid INTEGER)").await.unwrap();

        // Same in-memory database: the table created above must be visible.
        let second = registry.warehouse("mem").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(
            second.query_scalar("SELECT COUNT(*) FROM users").await.unwrap(),
            Some(0)
        );
    }

    #[tokio::test]
    async fn test_unknown_connection() {
        let registry = ConnectionRegistry::default();
        assert!(matches!(
            registry.warehouse("redshift").await,
            Err(Error::UnknownConnection(id)) if id == "redshift"
        ));
        assert!(registry.dialect("redshift").is_err());
    }
}
