//! jobmill - durable background job queue and cron scheduler.
//!
//! Runs the queue, worker pool and scheduler as a single foreground daemon
//! with the built-in `notification` and `sleep` handlers registered.

mod config;
mod handlers;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;

use jobmill_scheduler::{MemoryScheduleStore, ScheduleStore, Scheduler, SqliteScheduleStore};
use jobmill_workqueue::{
    HandlerRegistry, JobQueue, JobStore, MemoryJobStore, SqliteJobStore, WorkerPool,
};

use crate::config::AppConfig;

/// jobmill CLI.
#[derive(Parser)]
#[command(name = "jobmill")]
#[command(about = "Durable background job queue and cron scheduler")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon in foreground (default)
    Run {
        /// Override the configured worker count
        #[arg(long)]
        workers: Option<u32>,

        /// Keep all state in memory (no database files)
        #[arg(long)]
        ephemeral: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let mut config = AppConfig::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Commands::Run {
        workers: None,
        ephemeral: false,
    }) {
        Commands::Run { workers, ephemeral } => {
            if let Some(workers) = workers {
                config.queue.max_workers = workers;
            }
            if ephemeral {
                config.queue.db_path = None;
                config.scheduler.db_path = None;
            }
            run(config).await
        }
    }
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    let job_store: Arc<dyn JobStore> = match &config.queue.db_path {
        Some(path) => {
            info!("Job store: {}", path.display());
            Arc::new(SqliteJobStore::open(path).await?)
        }
        None => {
            info!("Job store: in-memory");
            Arc::new(MemoryJobStore::new())
        }
    };
    let schedule_store: Arc<dyn ScheduleStore> = match &config.scheduler.db_path {
        Some(path) => {
            info!("Schedule store: {}", path.display());
            Arc::new(SqliteScheduleStore::open(path).await?)
        }
        None => {
            info!("Schedule store: in-memory");
            Arc::new(MemoryScheduleStore::new())
        }
    };

    let queue = Arc::new(JobQueue::new(config.queue.clone(), job_store));
    queue.load_from_store().await?;

    let registry: Arc<HandlerRegistry> = Arc::new(handlers::builtin_registry());
    info!("Registered handlers: {:?}", registry.job_types());

    let pool = Arc::new(WorkerPool::new(config.queue.clone()));
    let scheduler = Arc::new(Scheduler::new(
        config.scheduler.clone(),
        schedule_store,
        queue.clone(),
    ));

    let (shutdown_tx, _) = broadcast::channel(1);
    let pool_task = tokio::spawn(pool.clone().run_loop(
        queue.clone(),
        registry,
        shutdown_tx.subscribe(),
    ));
    let scheduler_task = tokio::spawn(scheduler.clone().run_loop(shutdown_tx.subscribe()));

    info!("jobmill running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    let _ = shutdown_tx.send(());
    let _ = pool_task.await;
    let _ = scheduler_task.await;

    // In-flight handlers finish; no forced termination.
    pool.drain().await;
    info!("Shutdown complete");
    Ok(())
}
