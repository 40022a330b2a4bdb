//! Error types for workflow tasks

use crate::context::TemplateError;
use crate::tasks::quality::CheckFailure;
use thiserror::Error;

/// Failure of a single task attempt
///
/// Every variant is fatal for the attempt; the runner decides whether another
/// attempt follows.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Connection, credential or SQL failure reported by the common layer
    #[error(transparent)]
    Common(#[from] starload_common::Error),

    /// Key template could not be rendered against the run context
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    /// One or more data-quality checks failed
    #[error("{} data quality check(s) failed: {}", .0.len(), describe(.0))]
    Quality(Vec<CheckFailure>),
}

fn describe(failures: &[CheckFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
