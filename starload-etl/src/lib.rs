//! # starload ETL
//!
//! Stages song and event JSON from object storage into a warehouse, loads a
//! song-play star schema from the staging tables, then validates the result.
//!
//! - [`tasks`]: stage, load and quality-check behaviors
//! - [`graph`]: validated task DAG
//! - [`runner`]: single-run executor with retries
//! - [`workflow`]: the song-play workflow wiring

pub mod config;
pub mod context;
pub mod error;
pub mod graph;
pub mod queries;
pub mod runner;
pub mod schedule;
pub mod tasks;
pub mod workflow;

pub use config::EtlConfig;
pub use context::{RunContext, TemplateError};
pub use error::TaskError;
pub use graph::{GraphError, TaskId, WorkflowBuilder, WorkflowGraph};
pub use runner::{RunReport, TaskOutcome, TaskState, WorkflowRunner};
pub use schedule::{RetryPolicy, Schedule, ScheduleInterval};
pub use tasks::{Task, TaskKind};
pub use workflow::build_workflow;
