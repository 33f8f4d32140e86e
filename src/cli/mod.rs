//! Command-line interface for hablaflow.
//!
//! Provides commands for running a worker, starting content-generation
//! workflows, and inspecting executions and their history.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use crate::activities;
use crate::adapters::{GameStore, OpenAiProvider, SqliteGameStore, SupabaseGameStore};
use crate::config::{self, ResolvedConfig};
use crate::core::{
    ClientError, ExecutionStore, StartOptions, Worker, WorkerOptions, Workflow, WorkflowClient,
};
use crate::domain::{Difficulty, GrammarRequest, VocabularyRequest};
use crate::workflows::{self, GenerateGrammarWorkflow, GenerateVocabularyWorkflow};

/// hablaflow - Durable content-generation workflows for Spanish practice games
#[derive(Parser, Debug)]
#[command(name = "hablaflow")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Orchestration store address (sqlite://<path>)
    #[arg(long, global = true, env = "HABLA_ORCHESTRATOR_ADDRESS")]
    pub address: Option<String>,

    /// Task queue name
    #[arg(long, global = true, env = "HABLA_TASK_QUEUE")]
    pub task_queue: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a worker until interrupted (Ctrl-C)
    Worker {
        /// Maximum executions run concurrently
        #[arg(long)]
        max_concurrent: Option<usize>,
    },

    /// Start a content-generation workflow
    Start {
        #[command(subcommand)]
        workflow: StartCommand,
    },

    /// Show the status of an execution
    Status {
        /// Execution ID
        execution_id: String,
    },

    /// Show the result of an execution
    Result {
        /// Execution ID
        execution_id: String,

        /// Seconds to wait for the execution to finish
        #[arg(short, long, default_value = "0")]
        wait: u64,
    },

    /// List recent executions
    Executions {
        /// Maximum number of executions to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show the history of an execution
    History {
        /// Execution ID
        execution_id: String,
    },

    /// Show resolved configuration (debug)
    Config,
}

#[derive(Subcommand, Debug)]
pub enum StartCommand {
    /// Fill-in-the-blank grammar game
    Grammar {
        /// Grammar topic (e.g. "ser vs estar")
        topic: String,

        #[command(flatten)]
        args: StartArgs,
    },

    /// Multiple-choice vocabulary game
    Vocabulary {
        /// Vocabulary theme (e.g. "food")
        theme: String,

        #[command(flatten)]
        args: StartArgs,
    },
}

#[derive(clap::Args, Debug)]
pub struct StartArgs {
    #[arg(short, long, value_enum, default_value = "beginner")]
    pub difficulty: DifficultyArg,

    /// Number of questions to generate
    #[arg(short = 'n', long, default_value = "5")]
    pub count: u32,

    /// Author recorded on the saved game
    #[arg(long)]
    pub created_by: Option<String>,

    /// Execution ID (random if not specified)
    #[arg(long)]
    pub id: Option<String>,

    /// Overall execution deadline in seconds
    #[arg(long)]
    pub execution_timeout: Option<u64>,

    /// Seconds to wait for the result after starting
    #[arg(short, long)]
    pub wait: Option<u64>,
}

/// Difficulty for CLI (maps to Difficulty)
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DifficultyArg {
    Beginner,
    Intermediate,
    Advanced,
}

impl From<DifficultyArg> for Difficulty {
    fn from(d: DifficultyArg) -> Self {
        match d {
            DifficultyArg::Beginner => Difficulty::Beginner,
            DifficultyArg::Intermediate => Difficulty::Intermediate,
            DifficultyArg::Advanced => Difficulty::Advanced,
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let mut cfg = config::config()?.clone();
        if let Some(address) = self.address {
            cfg.orchestrator.address = address;
        }
        if let Some(task_queue) = self.task_queue {
            cfg.orchestrator.task_queue = task_queue;
        }

        match self.command {
            Commands::Worker { max_concurrent } => run_worker(cfg, max_concurrent).await,
            Commands::Start { workflow } => start_workflow(&cfg, workflow).await,
            Commands::Status { execution_id } => show_status(&cfg, &execution_id).await,
            Commands::Result { execution_id, wait } => {
                show_result(&connect_client(&cfg)?, &execution_id, wait).await
            }
            Commands::Executions { limit } => list_executions(&cfg, limit).await,
            Commands::History { execution_id } => show_history(&cfg, &execution_id).await,
            Commands::Config => show_config(&cfg),
        }
    }
}

fn connect_client(cfg: &ResolvedConfig) -> Result<WorkflowClient> {
    cfg.require_client()?;
    WorkflowClient::connect(&cfg.orchestrator.address)
}

/// Run a worker on the configured task queue until Ctrl-C
pub async fn run_worker(cfg: ResolvedConfig, max_concurrent: Option<usize>) -> Result<()> {
    let api_key = cfg.require_worker()?;

    let store = ExecutionStore::connect(&cfg.orchestrator.address)?;

    let provider = Arc::new(
        OpenAiProvider::new(api_key)
            .with_base_url(&cfg.provider.base_url)
            .with_model(&cfg.provider.model)
            .with_temperature(cfg.provider.temperature),
    );

    let games: Arc<dyn GameStore> = match cfg.supabase {
        Some(ref supabase) => Arc::new(SupabaseGameStore::new(
            &supabase.url,
            &supabase.service_key,
        )),
        None => Arc::new(SqliteGameStore::open(&cfg.games_db)?),
    };

    let options = WorkerOptions::new(&cfg.orchestrator.task_queue)
        .with_max_concurrent_executions(
            max_concurrent.unwrap_or(cfg.orchestrator.max_concurrent_executions),
        )
        .with_poll_interval(cfg.orchestrator.poll_interval)
        .with_lease(cfg.orchestrator.lease);

    let worker = Worker::builder(store, options)
        .activities(activities::registry(provider.clone(), Arc::clone(&games)))
        .workflows(workflows::registry(&cfg.activities))
        .build()?;

    info!(
        task_queue = worker.task_queue(),
        identity = worker.identity(),
        address = %cfg.orchestrator.address,
        model = provider.model(),
        games = games.name(),
        "Worker connected"
    );

    worker
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            }
        })
        .await
}

/// Start a workflow and optionally wait for its result
async fn start_workflow(cfg: &ResolvedConfig, command: StartCommand) -> Result<()> {
    let client = connect_client(cfg)?;
    let task_queue = &cfg.orchestrator.task_queue;

    let (args, id) = match command {
        StartCommand::Grammar { topic, args } => {
            let request = GrammarRequest {
                topic,
                difficulty: args.difficulty.into(),
                question_count: args.count,
                created_by: args.created_by.clone(),
            };
            let id = client
                .start_workflow::<GenerateGrammarWorkflow>(task_queue, &request, start_options(&args))
                .await?;
            (args, id)
        }
        StartCommand::Vocabulary { theme, args } => {
            let request = VocabularyRequest {
                theme,
                difficulty: args.difficulty.into(),
                question_count: args.count,
                created_by: args.created_by.clone(),
            };
            let id = client
                .start_workflow::<GenerateVocabularyWorkflow>(
                    task_queue,
                    &request,
                    start_options(&args),
                )
                .await?;
            (args, id)
        }
    };

    println!("{}", id);

    match args.wait {
        Some(wait) => show_result(&client, &id, wait).await,
        None => Ok(()),
    }
}

fn start_options(args: &StartArgs) -> StartOptions {
    let mut options = StartOptions::default();
    if let Some(ref id) = args.id {
        options = options.with_execution_id(id);
    }
    if let Some(secs) = args.execution_timeout {
        options = options.with_execution_timeout(Duration::from_secs(secs));
    }
    options
}

/// Show the status of an execution
async fn show_status(cfg: &ResolvedConfig, execution_id: &str) -> Result<()> {
    let client = connect_client(cfg)?;
    let execution = client.describe(execution_id).await?;

    println!("Execution ID: {}", execution.id);
    println!("Workflow: {}", execution.workflow_type);
    println!("Task queue: {}", execution.task_queue);
    println!("Status: {}", execution.status);
    println!("Started: {}", execution.created_at);
    if let Some(completed) = execution.completed_at {
        println!("Completed: {}", completed);
    }
    if let Some(ref owner) = execution.lease_owner {
        println!("Worker: {}", owner);
    }
    if let Some(ref reason) = execution.failure_reason {
        let kind = execution
            .failure_kind
            .map(|k| k.to_string())
            .unwrap_or_default();
        println!("Failure ({}): {}", kind, reason);
    }

    Ok(())
}

/// Wait up to `wait` seconds for an execution and print its result
async fn show_result(client: &WorkflowClient, execution_id: &str, wait: u64) -> Result<()> {
    match client
        .result(execution_id, Duration::from_secs(wait))
        .await
    {
        Ok(result) => {
            let pretty = serde_json::to_string_pretty(&result)
                .context("Failed to format execution result")?;
            println!("{}", pretty);
            Ok(())
        }
        Err(ClientError::WaitTimeout { .. }) => {
            eprintln!("[Execution {} is still running]", execution_id);
            Ok(())
        }
        Err(ClientError::ExecutionFailed {
            id, status, reason, ..
        }) => {
            eprintln!("[Execution {} {}: {}]", id, status, reason);
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}

/// List recent executions
async fn list_executions(cfg: &ResolvedConfig, limit: usize) -> Result<()> {
    let client = connect_client(cfg)?;
    let executions = client.list(limit).await?;

    if executions.is_empty() {
        println!("No executions found");
        return Ok(());
    }

    println!("{:<38} {:<28} {:<10}", "EXECUTION ID", "WORKFLOW", "STATUS");
    println!("{}", "-".repeat(78));

    for execution in executions {
        println!(
            "{:<38} {:<28} {:<10}",
            execution.id, execution.workflow_type, execution.status
        );
    }

    Ok(())
}

/// Show the history of an execution
async fn show_history(cfg: &ResolvedConfig, execution_id: &str) -> Result<()> {
    let client = connect_client(cfg)?;
    let events = client.history(execution_id).await?;

    for event in events {
        let activity = match (event.activity_seq, event.activity_type.as_deref()) {
            (Some(seq), Some(name)) => format!("#{} {}", seq, name),
            _ => String::new(),
        };
        println!(
            "{}  {:<20} {:<32} {}",
            event.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            format!("{:?}", event.event_type),
            activity,
            event.payload_summary
        );
    }

    Ok(())
}

/// Show resolved configuration
fn show_config(cfg: &ResolvedConfig) -> Result<()> {
    println!("hablaflow configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!("Home:        {}", cfg.home.display());
    println!();
    println!("Orchestrator:");
    println!("  Address:        {}", cfg.orchestrator.address);
    println!("  Task queue:     {}", cfg.orchestrator.task_queue);
    println!("  Max concurrent: {}", cfg.orchestrator.max_concurrent_executions);
    println!("  Poll interval:  {:?}", cfg.orchestrator.poll_interval);
    println!("  Lease:          {:?}", cfg.orchestrator.lease);
    println!();
    println!("Provider:");
    println!("  Base URL:    {}", cfg.provider.base_url);
    println!("  Model:       {}", cfg.provider.model);
    println!("  Temperature: {}", cfg.provider.temperature);
    println!(
        "  API key:     {}",
        if cfg.provider.api_key.is_some() { "(set)" } else { "(not set)" }
    );
    println!();
    println!("Activities:");
    println!(
        "  Start-to-close timeout: {:?}",
        cfg.activities.start_to_close_timeout()
    );
    println!("  Maximum attempts:       {}", cfg.activities.retry.maximum_attempts);
    println!("  Initial interval:       {}ms", cfg.activities.retry.initial_interval_ms);
    println!("  Backoff coefficient:    {}", cfg.activities.retry.backoff_coefficient);
    println!();
    println!("Games store:");
    match cfg.supabase {
        Some(ref supabase) => println!("  Supabase: {}", supabase.url),
        None => println!("  SQLite:   {}", cfg.games_db.display()),
    }
    println!();
    println!(
        "Workflows: {}, {}",
        GenerateGrammarWorkflow::NAME,
        GenerateVocabularyWorkflow::NAME
    );

    Ok(())
}
