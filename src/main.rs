//! Ticket Dispatch binary entry point

use chrono::Local;
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::sync::Arc;
use ticket_dispatch::queue::{RESULTS_QUEUE, TASKS_QUEUE};
use ticket_dispatch::service::ResultOutcome;
use ticket_dispatch::task::executor::TaskExecutor;
use ticket_dispatch::task::handler::HandlerRegistry;
use ticket_dispatch::{
    store, Config, LoadBalancer, SubmissionService, Task, TaskQueueManager, TaskResult, Worker,
    WorkerPool,
};
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "ticket-dispatch", about = "Queue-based dispatch of customer-service tasks")]
struct Cli {
    /// Config file (YAML or TOML); falls back to DISPATCH_* variables and defaults
    #[arg(short, long, env = "DISPATCH_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the configured number of workers until Ctrl-C
    Pool,
    /// Run a single worker with the given identity until Ctrl-C
    Worker {
        /// Worker identity
        id: usize,
    },
    /// Submit one task through the load balancer
    Submit {
        /// Task type tag, e.g. sentiment_analysis or routing
        #[arg(long = "type")]
        task_type: String,
        /// JSON payload
        #[arg(long, default_value = "{}")]
        data: String,
        /// Task id (generated when omitted)
        #[arg(long)]
        id: Option<String>,
        /// Wait for the result
        #[arg(long)]
        wait: bool,
    },
    /// Print queue depths, worker health and recent activity
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };
    config.validate()?;

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level()?)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!(
        "Using {:?} store with {} workers",
        config.store_backend, config.worker_count
    );

    // Every command talks to workers or submitters in other processes.
    config.ensure_shared_store()?;

    let queues = TaskQueueManager::new(store::open(&config).await?);
    if !queues.ping().await {
        error!("Queue store is not reachable");
        return Err("queue store is not reachable".into());
    }

    match cli.command {
        Command::Pool => run_pool(&config, queues).await?,
        Command::Worker { id } => run_worker(&config, queues, id).await?,
        Command::Submit {
            task_type,
            data,
            id,
            wait,
        } => {
            let data: Value = serde_json::from_str(&data)?;
            let task = Task::with_id(id.unwrap_or_default(), task_type, data);
            submit(&config, queues, task, wait).await?;
        }
        Command::Status => status(&config, queues).await,
    }

    Ok(())
}

fn executor(config: &Config) -> TaskExecutor {
    TaskExecutor::new(HandlerRegistry::with_defaults(), config.handler_timeout())
}

async fn run_pool(config: &Config, queues: TaskQueueManager) -> ticket_dispatch::Result<()> {
    let mut pool = WorkerPool::new(config.worker_count)
        .with_source(config.worker_source)
        .with_poll(config.poll_config());
    pool.start(queues, executor(config))?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
    }
    pool.shutdown(config.shutdown_timeout()).await
}

async fn run_worker(config: &Config, queues: TaskQueueManager, id: usize) -> ticket_dispatch::Result<()> {
    let worker = Arc::new(
        Worker::new(id, queues, executor(config))
            .with_source(config.worker_source)
            .with_poll(config.poll_config()),
    );
    let control = worker.control();

    let runner = Arc::clone(&worker);
    let handle = tokio::spawn(async move { runner.run().await });

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
    }
    info!("Worker {} shutting down...", id);
    control.stop();

    match handle.await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Worker {} task failed: {}", id, e);
            Err(ticket_dispatch::DispatchError::WorkerCrashed(id))
        }
    }
}

fn service(config: &Config, queues: TaskQueueManager) -> SubmissionService {
    let balancer = LoadBalancer::new(queues.clone(), config.worker_count)
        .with_health_threshold(config.health_threshold);
    SubmissionService::new(queues, balancer)
        .with_result_stash(config.result_stash_capacity, config.result_stash_ttl())
}

async fn submit(
    config: &Config,
    queues: TaskQueueManager,
    task: Task,
    wait: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let service = service(config, queues);
    let receipt = service.submit(task).await?;
    println!("{}", serde_json::to_string_pretty(&receipt)?);

    if wait {
        match service
            .await_result(&receipt.task_id, config.result_timeout())
            .await
        {
            ResultOutcome::Completed(result) => {
                println!("{}", serde_json::to_string_pretty(&result)?)
            }
            ResultOutcome::TimedOut => println!(
                "No result for task {} within {:?}",
                receipt.task_id,
                config.result_timeout()
            ),
        }
    }
    Ok(())
}

async fn status(config: &Config, queues: TaskQueueManager) {
    let service = service(config, queues.clone());

    println!(
        "=== System Status Check ({}) ===",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    );

    let metrics = service.metrics().await;
    let health = service.health().await;
    println!("Tasks queue size: {}", metrics.tasks_pending);
    println!("Results queue size: {}", metrics.results_pending);
    for (id, (depth, healthy)) in metrics
        .worker_queues
        .iter()
        .zip(health.worker_status.iter())
        .enumerate()
    {
        println!(
            "worker_{} queue size: {} ({})",
            id,
            depth,
            if *healthy { "ok" } else { "over threshold" }
        );
    }
    println!("Overall: {:?}", health.status);

    let tasks: Vec<Task> = queues.recent(TASKS_QUEUE, 10).await;
    if !tasks.is_empty() {
        println!("\nRecent Tasks:");
        for task in tasks {
            println!("- Task ID: {} ({})", task.id, task.task_type);
        }
    }

    let results: Vec<TaskResult> = queues.recent(RESULTS_QUEUE, 10).await;
    if !results.is_empty() {
        println!("\nRecent Results:");
        for result in results {
            println!("- Worker {}: Task {}", result.worker_id, result.task_id);
        }
    }
}
