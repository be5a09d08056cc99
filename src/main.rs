use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use mtce_queue::config::{EvaluatorConfig, ServerConfig};
use mtce_queue::dashboard::{run_dashboard, DashboardState};
use mtce_queue::error::QueueError;
use mtce_queue::scheduler::{ConfigRef, EvalResult, JobRequest};
use mtce_queue::shutdown::install_shutdown_handler;
use mtce_queue::JobRunner;

#[derive(Parser, Debug)]
#[command(name = "mtce-queue")]
#[command(version)]
#[command(about = "Serialized job queue for the mtce charm evaluator")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the job runner with its HTTP API
    Server(ServerArgs),

    /// Evaluate a charm file once and print the result
    Eval(EvalArgs),
}

// =============================================================================
// Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct EvaluatorArgs {
    /// Path to the evaluator binary
    #[arg(long, default_value = "./mtce")]
    evaluator: PathBuf,

    /// Evaluator wall-clock timeout in seconds
    #[arg(long, default_value = "30")]
    timeout_secs: u64,
}

impl EvaluatorArgs {
    fn to_config(&self) -> EvaluatorConfig {
        EvaluatorConfig::new(self.evaluator.clone())
            .with_timeout(Duration::from_secs(self.timeout_secs))
    }
}

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Port for the HTTP API
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Address to bind the HTTP API on
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[command(flatten)]
    evaluator: EvaluatorArgs,
}

#[derive(Parser, Debug)]
struct EvalArgs {
    /// Charm data file, one charm per line
    #[arg(long)]
    charms: PathBuf,

    /// Charm power
    #[arg(long, default_value = "15")]
    cp: u32,

    /// Effect weight, repeatable (e.g. --weight attack_speed=10)
    #[arg(long = "weight", value_name = "NAME=VALUE")]
    weights: Vec<String>,

    #[command(flatten)]
    evaluator: EvaluatorArgs,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Serialize)]
struct EvalOutput {
    success: bool,
    weight: Option<String>,
    charms: Vec<String>,
    error: Option<String>,
}

// =============================================================================
// Helper Functions
// =============================================================================

fn parse_weights(raw: &[String]) -> Result<BTreeMap<String, String>, QueueError> {
    raw.iter()
        .map(|entry| {
            entry
                .split_once('=')
                .map(|(name, value)| (name.trim(), value.trim()))
                .filter(|(name, value)| !name.is_empty() && !value.is_empty())
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .ok_or_else(|| QueueError::InvalidWeight(entry.clone()))
        })
        .collect()
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

// =============================================================================
// Command Handlers
// =============================================================================

async fn run_server(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let dashboard_addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let config = ServerConfig {
        dashboard_addr,
        evaluator: args.evaluator.to_config(),
    };

    tracing::info!(
        dashboard_addr = %config.dashboard_addr,
        evaluator = %config.evaluator.binary.display(),
        timeout_secs = config.evaluator.timeout.as_secs(),
        "Starting mtce-queue"
    );

    let shutdown = install_shutdown_handler()?;
    let runner = JobRunner::with_evaluator(config.evaluator);
    run_dashboard(config.dashboard_addr, DashboardState { runner }, shutdown).await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn run_eval(args: EvalArgs) -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let weights = parse_weights(&args.weights)?;
    let text = tokio::fs::read_to_string(&args.charms).await?;
    let charms: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    let runner = JobRunner::with_evaluator(args.evaluator.to_config());
    let result = runner
        .submit(JobRequest {
            creator: "cli".to_string(),
            config: ConfigRef {
                owner: "cli".to_string(),
                name: "inline".to_string(),
            },
            weights,
            charms: charms.clone(),
            charm_power: args.cp,
        })
        .await;

    let output = match result {
        EvalResult::Success { weight, selected } => EvalOutput {
            success: true,
            weight: Some(weight.to_string()),
            charms: selected
                .iter()
                .map(|&i| {
                    charms
                        .get(i)
                        .cloned()
                        .unwrap_or_else(|| format!("<unknown charm #{}>", i))
                })
                .collect(),
            error: None,
        },
        EvalResult::Failure { message } => EvalOutput {
            success: false,
            weight: None,
            charms: Vec::new(),
            error: Some(message),
        },
    };

    match args.output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            if let Some(error) = &output.error {
                eprintln!("Error: {}", error);
                std::process::exit(1);
            }
            if let Some(weight) = &output.weight {
                println!("Weight: {}", weight);
            }
            println!("Charms:");
            for charm in &output.charms {
                println!("  {}", charm);
            }
        }
    }

    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Server(server_args) => run_server(server_args).await?,
        Commands::Eval(eval_args) => run_eval(eval_args).await?,
    }

    Ok(())
}
