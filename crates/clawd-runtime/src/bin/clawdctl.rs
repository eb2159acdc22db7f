//! Clawd operations CLI.
//!
//! `clawdctl` inspects and repairs the shared coordination state: store
//! health, queue depths, failed and stuck jobs, limiter budgets and cache
//! entries.

use std::io;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use clawd_runtime::ctl::{self, GlobalOptions};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "clawdctl")]
#[command(about = "Operations CLI for the Clawd coordination layer")]
#[command(version)]
struct Args {
    /// Configuration directory
    #[arg(long, short = 'c', default_value = "./config", env = "CLAWD_CONFIG_DIR", global = true)]
    config_dir: String,

    /// Output in JSON format instead of human-readable text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    fn to_global_options(&self) -> GlobalOptions {
        GlobalOptions {
            config_dir: self.config_dir.clone(),
            json: self.json,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Probe the shared store
    Health,
    /// Job queue operations
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
    /// Rate limiter operations
    Limiter {
        #[command(subcommand)]
        action: LimiterAction,
    },
    /// Cache operations
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug)]
enum QueueAction {
    /// Show pending, processing and failed counts
    Stats {
        /// Queue name
        name: String,
    },
    /// List failed jobs, newest first
    Failed {
        /// Queue name
        name: String,
        /// Maximum number of jobs to show
        #[arg(long, short = 'l', default_value = "10")]
        limit: usize,
    },
    /// List jobs claimed and not yet acknowledged
    Processing {
        /// Queue name
        name: String,
        /// Maximum number of jobs to show
        #[arg(long, short = 'l', default_value = "10")]
        limit: usize,
    },
    /// Enqueue a job
    Push {
        /// Queue name
        name: String,
        /// Job payload as JSON
        job: String,
    },
    /// Move a stuck job from processing back to pending
    Requeue {
        /// Queue name
        name: String,
        /// Job payload as JSON, exactly as listed by `processing`
        job: String,
    },
}

#[derive(Subcommand, Debug)]
enum LimiterAction {
    /// Show remaining budget and wait time
    Status {
        /// Configured limiter name (e.g. garmin_api)
        name: String,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Print a cached value
    Get {
        /// Cache key without the `cache:` prefix
        key: String,
    },
    /// Remove a cached value
    Delete {
        /// Cache key without the `cache:` prefix
        key: String,
    },
}

async fn run(args: Args) -> anyhow::Result<()> {
    let opts = args.to_global_options();
    let coordinator = ctl::connect(&opts).await?;
    let mut stdout = io::stdout();

    match &args.command {
        Command::Health => ctl::health(&coordinator, &opts, &mut stdout).await,
        Command::Queue { action } => match action {
            QueueAction::Stats { name } => {
                ctl::queue_stats(&coordinator, &opts, &mut stdout, name).await
            }
            QueueAction::Failed { name, limit } => {
                ctl::queue_failed(&coordinator, &opts, &mut stdout, name, *limit).await
            }
            QueueAction::Processing { name, limit } => {
                ctl::queue_processing(&coordinator, &opts, &mut stdout, name, *limit).await
            }
            QueueAction::Push { name, job } => {
                ctl::queue_push(&coordinator, &opts, &mut stdout, name, job).await
            }
            QueueAction::Requeue { name, job } => {
                ctl::queue_requeue(&coordinator, &opts, &mut stdout, name, job).await
            }
        },
        Command::Limiter { action } => match action {
            LimiterAction::Status { name } => {
                ctl::limiter_status(&coordinator, &opts, &mut stdout, name).await
            }
        },
        Command::Cache { action } => match action {
            CacheAction::Get { key } => ctl::cache_get(&coordinator, &opts, &mut stdout, key).await,
            CacheAction::Delete { key } => {
                ctl::cache_delete(&coordinator, &opts, &mut stdout, key).await
            }
        },
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so `--json` output stays parseable.
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
