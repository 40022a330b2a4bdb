//! Workflow task behaviors
//!
//! Each task is a small parameter holder plus one or two statements issued
//! through a [`starload_common::Warehouse`]:
//! - [`StageToWarehouse`]: bulk-copy JSON objects from storage into a staging table
//! - [`LoadTable`]: fact and dimension loads (`INSERT ... SELECT`)
//! - [`DataQuality`]: row-count and scalar assertions after the load
//! - [`Marker`]: no-op boundary node

use crate::context::RunContext;
use crate::error::TaskError;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

pub mod load;
pub mod marker;
pub mod quality;
pub mod stage;

pub use load::{LoadRole, LoadTable, LoadTableConfig};
pub use marker::Marker;
pub use quality::{CheckFailure, DataQuality, DataQualityConfig, ScalarCheck};
pub use stage::{CopyCommand, JsonFormat, StageConfig, StageToWarehouse};

/// What a task does, for display and graph assertions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Marker,
    Stage,
    LoadFact,
    LoadDimension,
    QualityCheck,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskKind::Marker => "marker",
            TaskKind::Stage => "stage",
            TaskKind::LoadFact => "load_fact",
            TaskKind::LoadDimension => "load_dimension",
            TaskKind::QualityCheck => "quality_check",
        };
        f.write_str(label)
    }
}

/// A unit of work in the workflow graph
///
/// An execution either completes or returns an error; a task never retries
/// by itself.
#[async_trait]
pub trait Task: Send + Sync {
    fn kind(&self) -> TaskKind;

    /// One-line summary of the task's parameters (no secrets)
    fn describe(&self) -> String;

    async fn execute(&self, ctx: &RunContext) -> Result<(), TaskError>;
}
