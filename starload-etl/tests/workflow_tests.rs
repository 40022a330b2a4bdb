//! Shape of the song-play workflow graph

use starload_common::{ConnectionRegistry, CredentialStore, Dialect};
use starload_etl::config::PipelineConfig;
use starload_etl::workflow::*;
use starload_etl::{TaskId, TaskKind, WorkflowGraph};
use std::sync::Arc;

fn graph(dialect: Dialect) -> WorkflowGraph {
    build_workflow(
        &PipelineConfig::default(),
        dialect,
        Arc::new(ConnectionRegistry::default()),
        Arc::new(CredentialStore::default()),
    )
    .unwrap()
}

fn names(ids: Vec<&TaskId>) -> Vec<&str> {
    let mut names: Vec<&str> = ids.into_iter().map(TaskId::as_str).collect();
    names.sort_unstable();
    names
}

fn sorted<const N: usize>(ids: [&'static str; N]) -> Vec<&'static str> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids
}

#[test]
fn test_stage_tasks_only_wait_for_the_start_marker() {
    let graph = graph(Dialect::Redshift);
    for id in STAGE_TASKS {
        assert_eq!(names(graph.upstream(id)), vec![BEGIN]);
        assert_eq!(names(graph.downstream(id)), vec![LOAD_SONGPLAYS]);
    }
    assert_eq!(names(graph.downstream(BEGIN)), sorted(STAGE_TASKS));
}

#[test]
fn test_fact_load_waits_for_both_stages() {
    let graph = graph(Dialect::Redshift);
    assert_eq!(names(graph.upstream(LOAD_SONGPLAYS)), sorted(STAGE_TASKS));
    assert_eq!(names(graph.downstream(LOAD_SONGPLAYS)), sorted(DIMENSION_TASKS));
}

#[test]
fn test_dimensions_depend_only_on_the_fact_load() {
    let graph = graph(Dialect::Redshift);
    for id in DIMENSION_TASKS {
        assert_eq!(names(graph.upstream(id)), vec![LOAD_SONGPLAYS]);
        assert_eq!(names(graph.downstream(id)), vec![QUALITY_CHECKS]);
        assert_eq!(graph.kind(id), Some(TaskKind::LoadDimension));
    }
}

#[test]
fn test_quality_checks_run_last() {
    let graph = graph(Dialect::Redshift);
    assert_eq!(names(graph.upstream(QUALITY_CHECKS)), sorted(DIMENSION_TASKS));
    assert_eq!(names(graph.downstream(QUALITY_CHECKS)), vec![STOP]);
    assert!(graph.downstream(STOP).is_empty());
}

#[test]
fn test_topological_order_respects_every_edge() {
    let graph = graph(Dialect::Sqlite);
    let order: Vec<&str> = graph
        .topological_order()
        .into_iter()
        .map(TaskId::as_str)
        .collect();
    let position = |id: &str| order.iter().position(|o| *o == id).unwrap();

    for (from, to) in graph.edges() {
        assert!(position(from.as_str()) < position(to.as_str()), "{from} -> {to}");
    }
    assert_eq!(order.first(), Some(&BEGIN));
    assert_eq!(order.last(), Some(&STOP));
    assert_eq!(graph.edges().len(), 2 + 2 + 4 + 4 + 1);
}

#[test]
fn test_descriptions_name_targets_without_secrets() {
    let graph = graph(Dialect::Redshift);
    let stage = graph.task(STAGE_EVENTS).unwrap().describe();
    assert!(stage.contains("staging_events"));
    assert!(stage.contains("s3://udacity-pipeline/log-data/"));

    let quality = graph.task(QUALITY_CHECKS).unwrap().describe();
    assert!(quality.contains("songplays, songs, artists, time, users"));
}

#[test]
fn test_append_flags_reach_the_load_tasks() {
    let pipeline = PipelineConfig {
        append_fact: true,
        ..PipelineConfig::default()
    };
    let graph = build_workflow(
        &pipeline,
        Dialect::Redshift,
        Arc::new(ConnectionRegistry::default()),
        Arc::new(CredentialStore::default()),
    )
    .unwrap();
    assert!(graph.task(LOAD_SONGPLAYS).unwrap().describe().ends_with("(append)"));
    assert!(graph.task(LOAD_USERS).unwrap().describe().ends_with("(replace)"));
}
