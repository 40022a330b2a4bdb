use super::{Task, TaskKind};
use crate::context::RunContext;
use crate::error::TaskError;
use async_trait::async_trait;

/// No-op node marking the start or end of a workflow
#[derive(Debug, Clone, Copy, Default)]
pub struct Marker;

#[async_trait]
impl Task for Marker {
    fn kind(&self) -> TaskKind {
        TaskKind::Marker
    }

    fn describe(&self) -> String {
        "no-op".to_string()
    }

    async fn execute(&self, _ctx: &RunContext) -> Result<(), TaskError> {
        Ok(())
    }
}
