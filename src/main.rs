//! Stagehand CLI
//!
//! Classify a task, run its stage pipeline, resume it after interruption.

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use stagehand::config::{self, ExecutionMode};
use stagehand::workflow::{
    registry_from_config, AgentResult, AgentStatus, Payload, RunStatus, StageObserver,
    WorkflowContext, WorkflowRunner,
};
use stagehand::{EngineConfig, Error, Result};

#[derive(Parser)]
#[command(name = "stagehand")]
#[command(author, version, about = "Classify a task and run it through a stage pipeline")]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "STAGEHAND_CONFIG")]
    config: Option<std::path::PathBuf>,

    /// Override the checkpoint file
    #[arg(long, global = true)]
    state: Option<std::path::PathBuf>,

    /// Override the rule document
    #[arg(long, global = true)]
    rules: Option<std::path::PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a task and run its pipeline
    Run {
        /// Task description
        description: String,

        /// Metadata passed to every handler (key=value, repeatable)
        #[arg(long = "meta", short)]
        meta: Vec<String>,

        /// Execution mode (sequential, parallel)
        #[arg(long)]
        mode: Option<ExecutionMode>,
    },

    /// Resume the interrupted run
    Resume,

    /// Show the checkpointed run
    Status,

    /// Delete the checkpointed run
    Clear,

    /// Show how a description would be classified
    Classify {
        /// Task description
        description: String,
    },

    /// Show the effective rule table
    Rules,

    /// Initialize .stagehand directory
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },
}

/// Prints stage progress as it happens
struct ConsoleObserver;

impl StageObserver for ConsoleObserver {
    fn on_stage_start(&mut self, stage: &str, _context: &WorkflowContext) {
        println!("▶ {}", stage);
    }

    fn on_stage_complete(&mut self, stage: &str, result: &AgentResult, _context: &WorkflowContext) {
        let icon = match result.status {
            AgentStatus::Success => "✅",
            AgentStatus::Skipped => "⏭️",
            AgentStatus::Error => "❌",
        };
        let mut line = format!("{} {} ({}ms)", icon, stage, result.duration.as_millis());
        if let Some(ref message) = result.error {
            line.push_str(&format!(": {}", message));
        }
        println!("{}", line);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // Load config
    let mut config = EngineConfig::load(cli.config.as_deref())?;
    if let Some(state) = cli.state {
        config.state_path = state;
    }
    if let Some(rules) = cli.rules {
        config.rules_path = Some(rules);
    }

    match cli.command {
        Commands::Run {
            description,
            meta,
            mode,
        } => {
            mode.unwrap_or(config.mode).ensure_supported()?;
            let metadata = parse_metadata(&meta)?;

            let runner = WorkflowRunner::new(&config, registry_from_config(&config)?)?;
            let context = runner.create_context(&description, metadata);
            let context = runner.run_with(context, &mut ConsoleObserver).await;

            finish(&context);
        }

        Commands::Resume => {
            config.mode.ensure_supported()?;
            let runner = WorkflowRunner::new(&config, registry_from_config(&config)?)?;

            match runner.resume_with(&mut ConsoleObserver).await {
                Some(context) => finish(&context),
                None => println!("No interrupted run"),
            }
        }

        Commands::Status => {
            let runner = WorkflowRunner::new(&config, Default::default())?;
            match runner.store().load() {
                Some(context) => println!("{}", context.summary()),
                None => println!("No run recorded at {}", config.state_path().display()),
            }
        }

        Commands::Clear => {
            let runner = WorkflowRunner::new(&config, Default::default())?;
            runner.store().clear()?;
            info!("Removed {}", config.state_path().display());
        }

        Commands::Classify { description } => {
            let runner = WorkflowRunner::new(&config, Default::default())?;
            let task_type = runner.classify(&description);

            println!("Type: {}", task_type);
            println!("Pipeline: {}", runner.build_pipeline(task_type).join(" → "));
        }

        Commands::Rules => {
            let runner = WorkflowRunner::new(&config, Default::default())?;
            for (task_type, stages) in runner.rules().iter() {
                println!("{:<16} {}", task_type.as_str(), stages.join(" → "));
            }
        }

        Commands::Init { force } => {
            let path = config::init(force)?;
            info!("Created default config at {}", path.display());
        }
    }

    Ok(())
}

/// Parse `key=value` pairs into run metadata
fn parse_metadata(pairs: &[String]) -> Result<Payload> {
    let mut metadata = Payload::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| Error::Config(format!("Metadata must be key=value, got {:?}", pair)))?;
        metadata.insert(key.trim().to_string(), Value::String(value.to_string()));
    }
    Ok(metadata)
}

/// Print the final state; a failed run exits non-zero
fn finish(context: &WorkflowContext) {
    println!("\n{}", context.summary());
    if context.status == RunStatus::Failed {
        std::process::exit(1);
    }
}
