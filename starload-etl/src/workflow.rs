//! The song-play load workflow
//!
//! ```text
//! Begin_execution
//!   -> Stage_events, Stage_songs
//!   -> Load_songplays_fact_table
//!   -> Load_user_dim_table, Load_song_dim_table, Load_artist_dim_table, Load_time_dim_table
//!   -> Run_data_quality_checks
//!   -> Stop_execution
//! ```

use crate::config::{PipelineConfig, StagingSource};
use crate::graph::{GraphError, TaskId, WorkflowBuilder, WorkflowGraph};
use crate::queries::{self, StarSchemaSql};
use crate::tasks::{
    DataQuality, DataQualityConfig, LoadTable, LoadTableConfig, Marker, StageConfig,
    StageToWarehouse,
};
use starload_common::{ConnectionProvider, CredentialProvider, Dialect, Identifier};
use std::sync::Arc;

pub const WORKFLOW_NAME: &str = "song_play_etl";
pub const DESCRIPTION: &str = "Load and transform song play data in the warehouse";

pub const BEGIN: &str = "Begin_execution";
pub const STAGE_EVENTS: &str = "Stage_events";
pub const STAGE_SONGS: &str = "Stage_songs";
pub const LOAD_SONGPLAYS: &str = "Load_songplays_fact_table";
pub const LOAD_USERS: &str = "Load_user_dim_table";
pub const LOAD_SONGS: &str = "Load_song_dim_table";
pub const LOAD_ARTISTS: &str = "Load_artist_dim_table";
pub const LOAD_TIME: &str = "Load_time_dim_table";
pub const QUALITY_CHECKS: &str = "Run_data_quality_checks";
pub const STOP: &str = "Stop_execution";

pub const STAGE_TASKS: [&str; 2] = [STAGE_EVENTS, STAGE_SONGS];
pub const DIMENSION_TASKS: [&str; 4] = [LOAD_USERS, LOAD_SONGS, LOAD_ARTISTS, LOAD_TIME];

fn table(task: &str, name: &str) -> Result<Identifier, GraphError> {
    Identifier::parse(name).map_err(|e| GraphError::InvalidTask {
        task: TaskId::from(task),
        reason: e.to_string(),
    })
}

/// Assemble the workflow graph from pipeline settings
pub fn build_workflow(
    pipeline: &PipelineConfig,
    dialect: Dialect,
    connections: Arc<dyn ConnectionProvider>,
    credentials: Arc<dyn CredentialProvider>,
) -> Result<WorkflowGraph, GraphError> {
    let sql = StarSchemaSql::for_dialect(dialect);
    let mut builder = WorkflowBuilder::new(WORKFLOW_NAME);

    let stage = |task: &str, name: &str, source: &StagingSource| -> Result<_, GraphError> {
        let config = StageConfig {
            table: table(task, name)?,
            bucket: pipeline.bucket.clone(),
            key: source.key.clone(),
            json: source.json.clone(),
            connection_id: pipeline.connection_id.clone(),
            credentials_id: pipeline.credentials_id.clone(),
            append_only: source.append_only,
            region: pipeline.region.clone(),
        };
        Ok(Arc::new(StageToWarehouse::new(
            config,
            connections.clone(),
            credentials.clone(),
        )))
    };

    let load = |task: &str, name: &str, statement: &str| -> Result<_, GraphError> {
        Ok(LoadTableConfig {
            table: table(task, name)?,
            connection_id: pipeline.connection_id.clone(),
            sql: statement.to_string(),
            append_only: pipeline.append_dimensions,
        })
    };

    let mut fact = load(LOAD_SONGPLAYS, queries::SONGPLAYS, &sql.songplays)?;
    fact.append_only = pipeline.append_fact;

    let quality = DataQualityConfig {
        connection_id: pipeline.connection_id.clone(),
        tables: pipeline.quality_tables.clone(),
        checks: pipeline.checks.clone(),
    };

    builder
        .add_task(BEGIN, Arc::new(Marker))?
        .add_task(
            STAGE_EVENTS,
            stage(STAGE_EVENTS, queries::STAGING_EVENTS, &pipeline.events)?,
        )?
        .add_task(
            STAGE_SONGS,
            stage(STAGE_SONGS, queries::STAGING_SONGS, &pipeline.songs)?,
        )?
        .add_task(
            LOAD_SONGPLAYS,
            Arc::new(LoadTable::fact(fact, connections.clone())),
        )?;

    for (task, name, statement) in [
        (LOAD_USERS, queries::USERS, &sql.users),
        (LOAD_SONGS, queries::SONGS, &sql.songs),
        (LOAD_ARTISTS, queries::ARTISTS, &sql.artists),
        (LOAD_TIME, queries::TIME, &sql.time),
    ] {
        let config = load(task, name, statement)?;
        builder.add_task(task, Arc::new(LoadTable::dimension(config, connections.clone())))?;
    }

    builder
        .add_task(
            QUALITY_CHECKS,
            Arc::new(DataQuality::new(quality, connections.clone())),
        )?
        .add_task(STOP, Arc::new(Marker))?;

    builder
        .fan_out(BEGIN, STAGE_TASKS)?
        .fan_in(STAGE_TASKS, LOAD_SONGPLAYS)?
        .fan_out(LOAD_SONGPLAYS, DIMENSION_TASKS)?
        .fan_in(DIMENSION_TASKS, QUALITY_CHECKS)?
        .add_edge(QUALITY_CHECKS, STOP)?;

    builder.build()
}
