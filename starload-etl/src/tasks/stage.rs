//! Stage raw JSON objects from object storage into a staging table

use super::{Task, TaskKind};
use crate::context::RunContext;
use crate::error::TaskError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use starload_common::{AccessKeyPair, ConnectionProvider, CredentialProvider, Identifier};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// How the warehouse maps JSON fields onto staging columns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JsonFormat {
    /// Match top-level keys to column names (`'auto'` sentinel)
    #[default]
    Auto,
    /// Location of a JSONPaths mapping file, used verbatim
    Paths(String),
}

impl JsonFormat {
    pub fn as_str(&self) -> &str {
        match self {
            JsonFormat::Auto => "auto",
            JsonFormat::Paths(path) => path,
        }
    }
}

impl From<String> for JsonFormat {
    fn from(value: String) -> Self {
        if value == "auto" {
            JsonFormat::Auto
        } else {
            JsonFormat::Paths(value)
        }
    }
}

impl From<&str> for JsonFormat {
    fn from(value: &str) -> Self {
        JsonFormat::from(value.to_string())
    }
}

impl From<JsonFormat> for String {
    fn from(value: JsonFormat) -> Self {
        value.as_str().to_string()
    }
}

/// Parameters of one stage task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    pub table: Identifier,
    pub bucket: String,
    /// Key or prefix inside the bucket; may contain `{name}` run placeholders
    pub key: String,
    #[serde(default)]
    pub json: JsonFormat,
    pub connection_id: String,
    pub credentials_id: String,
    /// Keep existing staging rows instead of clearing the table first
    #[serde(default)]
    pub append_only: bool,
    #[serde(default)]
    pub region: Option<String>,
}

/// A fully resolved bulk-copy statement
///
/// `Display` renders the statement with the secret key masked; use
/// [`CopyCommand::to_sql`] for the executable text.
#[derive(Clone)]
pub struct CopyCommand {
    pub table: Identifier,
    pub source: String,
    pub credentials: AccessKeyPair,
    pub json: JsonFormat,
    pub region: Option<String>,
}

impl CopyCommand {
    /// Executable statement text
    pub fn to_sql(&self) -> String {
        self.render(&self.credentials.secret_access_key)
    }

    fn render(&self, secret: &str) -> String {
        let mut sql = format!(
            "COPY {}\nFROM '{}'\nACCESS_KEY_ID '{}'\nSECRET_ACCESS_KEY '{}'\n",
            self.table.quoted(),
            literal(&self.source),
            literal(&self.credentials.access_key_id),
            literal(secret),
        );
        if let Some(region) = &self.region {
            sql.push_str(&format!("REGION '{}'\n", literal(region)));
        }
        sql.push_str(&format!("FORMAT AS JSON '{}'", literal(self.json.as_str())));
        sql
    }
}

impl fmt::Display for CopyCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render("***"))
    }
}

impl fmt::Debug for CopyCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CopyCommand({})", self)
    }
}

/// Escape a value for use inside a single-quoted SQL literal
fn literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// Build the `s3://bucket/key` source URL
pub fn object_url(bucket: &str, key: &str) -> String {
    let bucket = bucket.trim_start_matches("s3://").trim_end_matches('/');
    format!("s3://{}/{}", bucket, key.trim_start_matches('/'))
}

/// Copies JSON objects from object storage into a staging table
pub struct StageToWarehouse {
    config: StageConfig,
    connections: Arc<dyn ConnectionProvider>,
    credentials: Arc<dyn CredentialProvider>,
}

impl StageToWarehouse {
    pub fn new(
        config: StageConfig,
        connections: Arc<dyn ConnectionProvider>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            config,
            connections,
            credentials,
        }
    }

    /// Resolve the key template and assemble the copy statement
    pub fn copy_command(
        &self,
        ctx: &RunContext,
        credentials: AccessKeyPair,
    ) -> Result<CopyCommand, TaskError> {
        let key = ctx.render(&self.config.key)?;
        Ok(CopyCommand {
            table: self.config.table.clone(),
            source: object_url(&self.config.bucket, &key),
            credentials,
            json: self.config.json.clone(),
            region: self.config.region.clone(),
        })
    }
}

#[async_trait]
impl Task for StageToWarehouse {
    fn kind(&self) -> TaskKind {
        TaskKind::Stage
    }

    fn describe(&self) -> String {
        format!(
            "copy {} <- {} (json {}{})",
            self.config.table,
            object_url(&self.config.bucket, &self.config.key),
            self.config.json.as_str(),
            if self.config.append_only { ", append" } else { "" }
        )
    }

    async fn execute(&self, ctx: &RunContext) -> Result<(), TaskError> {
        let table = &self.config.table;
        let warehouse = self.connections.warehouse(&self.config.connection_id).await?;
        let credentials = self
            .credentials
            .credentials(&self.config.credentials_id)
            .await?;
        let command = self.copy_command(ctx, credentials)?;

        let mut statements = Vec::with_capacity(2);
        if !self.config.append_only {
            info!(table = %table, "Clearing data from staging table");
            statements.push(format!("DELETE FROM {}", table.quoted()));
        }
        info!(table = %table, source = %command.source, "Copying data from object storage");
        info!("Executing COPY command: {}", command);
        statements.push(command.to_sql());

        warehouse.execute_atomic(&statements).await?;
        info!(table = %table, "Staging finished");
        Ok(())
    }
}
