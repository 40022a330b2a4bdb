//! starload-etl - command-line entry point
//!
//! Runs the song-play workflow once, prints its graph, or creates the
//! warehouse tables.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use starload_common::{ConnectionProvider, Dialect, Warehouse};
use starload_etl::queries;
use starload_etl::workflow::{self, build_workflow};
use starload_etl::{EtlConfig, RunContext, RunReport, WorkflowRunner};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for starload-etl
#[derive(Parser, Debug)]
#[command(name = "starload-etl")]
#[command(about = "Load song play data into a warehouse star schema")]
#[command(version)]
struct Args {
    /// Configuration file
    #[arg(short, long, env = "STARLOAD_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute the workflow
    Run {
        /// Logical date of the run (RFC 3339); defaults to the latest completed interval
        #[arg(long, value_parser = parse_datetime, conflicts_with = "last_run")]
        logical_date: Option<DateTime<Utc>>,

        /// Logical date of the last completed run; with catch-up enabled every
        /// interval missed since then is run in order
        #[arg(long, value_parser = parse_datetime)]
        last_run: Option<DateTime<Utc>>,
    },
    /// Print the schedule and the task graph
    Show,
    /// Create the staging and star-schema tables
    CreateTables {
        /// Drop existing tables first
        #[arg(long)]
        drop: bool,
    },
}

fn parse_datetime(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {}", e))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "starload_etl=info,starload_common=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = EtlConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    match args.command {
        Command::Run {
            logical_date,
            last_run,
        } => run(&config, logical_date, last_run).await,
        Command::Show => show(&config),
        Command::CreateTables { drop } => create_tables(&config, drop).await,
    }
}

async fn run(
    config: &EtlConfig,
    logical_date: Option<DateTime<Utc>>,
    last_run: Option<DateTime<Utc>>,
) -> Result<()> {
    config.validate_run().context("Invalid configuration")?;
    let schedule = config.schedule();

    let dates = match logical_date {
        Some(date) => vec![date],
        None => schedule.due_runs(last_run, Utc::now()),
    };
    if dates.is_empty() {
        info!("No interval is due, nothing to run");
        return Ok(());
    }

    let graph = build_workflow(
        &config.pipeline,
        config.dialect()?,
        Arc::new(config.connection_registry()),
        Arc::new(config.credential_store()),
    )
    .context("Failed to build workflow")?;
    let runner = WorkflowRunner::new(Arc::new(graph), schedule.retry);

    for date in dates {
        let report = tokio::select! {
            report = runner.run(RunContext::new(date)) => report,
            _ = shutdown_signal() => bail!("Interrupted during run for {}", date),
        };
        print_report(&report)?;
        if !report.is_success() {
            let failed: Vec<&str> = report.failed().iter().map(|t| t.task_id.as_str()).collect();
            bail!(
                "Workflow run for {} failed (failed tasks: {})",
                date,
                failed.join(", ")
            );
        }
    }
    Ok(())
}

fn print_report(report: &RunReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize run report")?;
    println!("{}", json);
    Ok(())
}

fn show(config: &EtlConfig) -> Result<()> {
    let schedule = config.schedule();
    let dialect = config.dialect().unwrap_or_else(|e| {
        warn!("{}; showing {} statements", e, Dialect::Redshift);
        Dialect::Redshift
    });
    let graph = build_workflow(
        &config.pipeline,
        dialect,
        Arc::new(config.connection_registry()),
        Arc::new(config.credential_store()),
    )
    .context("Failed to build workflow")?;

    println!("{}: {}", workflow::WORKFLOW_NAME, workflow::DESCRIPTION);
    println!(
        "schedule: {} (catchup {}), retries: {}, retry delay: {}s",
        schedule.interval,
        if schedule.catchup { "on" } else { "off" },
        schedule.retry.retries,
        schedule.retry.delay.as_secs()
    );
    println!("next run: {}", schedule.next_run_after(Utc::now()).to_rfc3339());
    println!("dialect: {}", dialect);

    for (depth, layer) in graph.layers().into_iter().enumerate() {
        println!();
        println!("[{}]", depth);
        for id in layer {
            let Some(task) = graph.task(id.as_str()) else {
                continue;
            };
            let upstream: Vec<&str> = graph
                .upstream(id.as_str())
                .into_iter()
                .map(|u| u.as_str())
                .collect();
            println!("  {} ({}): {}", id, task.kind(), task.describe());
            if !upstream.is_empty() {
                println!("    after: {}", upstream.join(", "));
            }
        }
    }
    Ok(())
}

async fn create_tables(config: &EtlConfig, drop: bool) -> Result<()> {
    config.validate().context("Invalid configuration")?;
    let dialect = config.dialect()?;
    let registry = config.connection_registry();
    let warehouse = registry
        .warehouse(&config.pipeline.connection_id)
        .await
        .context("Failed to open warehouse connection")?;

    if drop {
        info!("Dropping existing tables");
        warehouse
            .execute_atomic(&queries::drop_tables())
            .await
            .context("Failed to drop tables")?;
    }

    let statements: Vec<String> = queries::create_tables(dialect)
        .iter()
        .map(|s| s.to_string())
        .collect();
    warehouse
        .execute_atomic(&statements)
        .await
        .context("Failed to create tables")?;
    info!(
        tables = queries::ALL_TABLES.len(),
        dialect = %dialect,
        "Warehouse tables ready"
    );
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
