//! Single-run workflow executor
//!
//! A task starts once every upstream task has succeeded. Independent tasks
//! run concurrently on a [`JoinSet`]. Each task gets `retries + 1` attempts
//! separated by the fixed retry delay; a task that exhausts its attempts
//! marks everything downstream of it as `upstream_failed`, while unrelated
//! branches keep running.

use crate::context::RunContext;
use crate::graph::{TaskId, WorkflowGraph};
use crate::schedule::RetryPolicy;
use crate::tasks::Task;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Final state of one task in a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskState {
    Success,
    Failed { error: String },
    /// Never started because a dependency failed
    UpstreamFailed,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskOutcome {
    pub task_id: TaskId,
    #[serde(flatten)]
    pub state: TaskState,
    pub attempts: u32,
    pub duration_ms: u64,
}

/// Summary of one workflow run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub workflow: String,
    pub run_id: Uuid,
    pub logical_date: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// One entry per task, in topological order
    pub tasks: Vec<TaskOutcome>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.tasks.iter().all(|t| t.state == TaskState::Success)
    }

    pub fn outcome(&self, id: &str) -> Option<&TaskOutcome> {
        self.tasks.iter().find(|t| t.task_id.as_str() == id)
    }

    /// Tasks that ran and failed
    pub fn failed(&self) -> Vec<&TaskOutcome> {
        self.tasks
            .iter()
            .filter(|t| matches!(t.state, TaskState::Failed { .. }))
            .collect()
    }
}

struct Finished {
    index: usize,
    state: TaskState,
    attempts: u32,
    elapsed: Duration,
}

/// Executes one run of a workflow graph
pub struct WorkflowRunner {
    graph: Arc<WorkflowGraph>,
    retry: RetryPolicy,
}

impl WorkflowRunner {
    pub fn new(graph: Arc<WorkflowGraph>, retry: RetryPolicy) -> Self {
        Self { graph, retry }
    }

    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    /// Run every task once (with retries) for the given context
    pub async fn run(&self, ctx: RunContext) -> RunReport {
        let started_at = Utc::now();
        let run_id = ctx.run_id();
        let logical_date = ctx.logical_date();
        let ctx = Arc::new(ctx);
        let graph = &self.graph;
        let n = graph.len();

        info!(
            workflow = graph.name(),
            run_id = %run_id,
            logical_date = %logical_date,
            tasks = n,
            "Starting workflow run"
        );

        let mut pending: Vec<usize> = (0..n).map(|i| graph.upstream_of(i).len()).collect();
        let mut results: Vec<Option<(TaskState, u32, Duration)>> = vec![None; n];
        let mut started = vec![false; n];
        let mut running = JoinSet::new();

        for i in (0..n).filter(|&i| pending[i] == 0) {
            self.spawn(&mut running, i, &ctx);
            started[i] = true;
        }

        while let Some(joined) = running.join_next().await {
            let finished = match joined {
                Ok(finished) => finished,
                Err(e) => {
                    // The lost task is the started one without a result; see below.
                    error!("Task runner aborted: {}", e);
                    continue;
                }
            };
            let succeeded = finished.state == TaskState::Success;
            let index = finished.index;
            results[index] = Some((finished.state, finished.attempts, finished.elapsed));

            for &next in graph.downstream_of(index) {
                if results[next].is_some() {
                    continue;
                }
                if succeeded {
                    pending[next] -= 1;
                    if pending[next] == 0 {
                        self.spawn(&mut running, next, &ctx);
                        started[next] = true;
                    }
                } else {
                    self.mark_upstream_failed(next, &mut results);
                }
            }
        }

        let lost: Vec<usize> = (0..n)
            .filter(|&i| started[i] && results[i].is_none())
            .collect();
        for index in lost {
            error!(task = %graph.node(index).0, "Task aborted before reporting a result");
            results[index] = Some((
                TaskState::Failed {
                    error: "task runner aborted before reporting a result".to_string(),
                },
                0,
                Duration::ZERO,
            ));
            for &next in graph.downstream_of(index) {
                self.mark_upstream_failed(next, &mut results);
            }
        }

        let tasks: Vec<TaskOutcome> = graph
            .topological_order()
            .into_iter()
            .filter_map(|id| graph.index_of(id))
            .map(|i| {
                let (state, attempts, elapsed) = results[i]
                    .take()
                    .unwrap_or((TaskState::UpstreamFailed, 0, Duration::ZERO));
                TaskOutcome {
                    task_id: graph.node(i).0.clone(),
                    state,
                    attempts,
                    duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                }
            })
            .collect();

        let report = RunReport {
            workflow: graph.name().to_string(),
            run_id,
            logical_date,
            started_at,
            finished_at: Utc::now(),
            tasks,
        };

        if report.is_success() {
            info!(run_id = %run_id, "Workflow run succeeded");
        } else {
            error!(
                run_id = %run_id,
                failed = report.failed().len(),
                "Workflow run failed"
            );
        }
        report
    }

    fn spawn(&self, running: &mut JoinSet<Finished>, index: usize, ctx: &Arc<RunContext>) {
        let (id, task) = self.graph.node(index);
        let id = id.clone();
        let task = Arc::clone(task);
        let ctx = Arc::clone(ctx);
        let retry = self.retry;
        running.spawn(async move {
            let started = Instant::now();
            let (state, attempts) = run_with_retries(&id, task, ctx, retry).await;
            Finished {
                index,
                state,
                attempts,
                elapsed: started.elapsed(),
            }
        });
    }

    fn mark_upstream_failed(
        &self,
        from: usize,
        results: &mut [Option<(TaskState, u32, Duration)>],
    ) {
        let mut queue = VecDeque::from([from]);
        while let Some(i) = queue.pop_front() {
            if results[i].is_some() {
                continue;
            }
            warn!(task = %self.graph.node(i).0, "Skipping task, upstream failed");
            results[i] = Some((TaskState::UpstreamFailed, 0, Duration::ZERO));
            queue.extend(self.graph.downstream_of(i).iter().copied());
        }
    }
}

async fn run_with_retries(
    id: &TaskId,
    task: Arc<dyn Task>,
    ctx: Arc<RunContext>,
    retry: RetryPolicy,
) -> (TaskState, u32) {
    let max_attempts = retry.max_attempts();
    let kind = task.kind();
    let mut attempt = 0;

    loop {
        attempt += 1;
        info!(task = %id, kind = %kind, attempt, max_attempts, "Starting task");

        // Each attempt runs on its own task so a panic fails the attempt only
        let attempt_task = Arc::clone(&task);
        let attempt_ctx = Arc::clone(&ctx);
        let outcome = tokio::spawn(async move { attempt_task.execute(&attempt_ctx).await }).await;
        let failure = match outcome {
            Ok(Ok(())) => {
                info!(task = %id, attempt, "Task succeeded");
                return (TaskState::Success, attempt);
            }
            Ok(Err(e)) => e.to_string(),
            Err(e) => format!("task panicked: {}", e),
        };

        if attempt >= max_attempts {
            error!(task = %id, attempts = attempt, error = %failure, "Task failed");
            return (TaskState::Failed { error: failure }, attempt);
        }

        warn!(
            task = %id,
            attempt,
            error = %failure,
            retry_in_secs = retry.delay.as_secs(),
            "Task attempt failed, retrying"
        );
        tokio::time::sleep(retry.delay).await;
    }
}
