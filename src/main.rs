use anyhow::{Context, Result};
use campaign_orchestrator::campaign::Mode;
use campaign_orchestrator::config::{CampaignToml, get_campaign_dir};
use campaign_orchestrator::logging;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "campaign")]
#[command(version, about = "Dependency-aware marketing campaign orchestrator")]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Also write JSON logs to this directory (rotated daily)
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the campaign until every phase is settled or a human is needed
    Run {
        /// Playbook file (JSON or YAML); the built-in playbook by default
        #[arg(long)]
        playbook: Option<PathBuf>,

        /// Execution mode: guided, semi_auto, auto
        #[arg(long)]
        mode: Option<Mode>,

        /// Maximum concurrent phases
        #[arg(long)]
        concurrency: Option<usize>,

        /// JSON object merged into the campaign context before the run
        #[arg(long)]
        context: Option<PathBuf>,

        /// Ignore any saved state and start over
        #[arg(long)]
        fresh: bool,

        /// UI output mode: full, minimal, json
        #[arg(long, default_value = "full")]
        ui: String,

        /// Simulated agent latency per attempt
        #[arg(long, default_value = "0")]
        agent_delay_ms: u64,
    },
    /// Validate the playbook and print its execution waves
    Plan {
        #[arg(long)]
        playbook: Option<PathBuf>,
    },
    /// Show the saved campaign state
    Status,
    /// Approve a phase awaiting validation
    Approve {
        phase: String,

        /// JSON object merged into the context on approval
        #[arg(long)]
        data: Option<String>,
    },
    /// Reject a phase awaiting validation so it runs again
    Reject {
        phase: String,

        #[arg(long)]
        reason: Option<String>,
    },
    /// Walk through every phase awaiting validation
    Review,
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default campaign.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    // The file is read again by each command; a broken file is reported there.
    let file_logging = CampaignToml::load_or_default(&get_campaign_dir(&project_dir))
        .map(|toml| toml.logging)
        .unwrap_or_default();
    let level = logging::default_level(cli.verbose, file_logging.level.as_deref())?;
    let log_dir = cli
        .log_dir
        .clone()
        .or_else(|| file_logging.dir.map(|d| project_dir.join(d)));
    let _log_guard = logging::init(level, log_dir.as_deref())?;

    match &cli.command {
        Commands::Run {
            playbook,
            mode,
            concurrency,
            context,
            fresh,
            ui,
            agent_delay_ms,
        } => {
            cmd::cmd_run(
                &cli,
                &project_dir,
                cmd::RunArgs {
                    playbook: playbook.clone(),
                    mode: *mode,
                    concurrency: *concurrency,
                    context: context.clone(),
                    fresh: *fresh,
                    ui: ui.clone(),
                    agent_delay_ms: *agent_delay_ms,
                },
            )
            .await?;
        }
        Commands::Plan { playbook } => cmd::cmd_plan(&project_dir, playbook.as_deref())?,
        Commands::Status => cmd::cmd_status(&project_dir)?,
        Commands::Approve { phase, data } => {
            cmd::cmd_approve(&project_dir, phase, data.as_deref()).await?
        }
        Commands::Reject { phase, reason } => {
            cmd::cmd_reject(&project_dir, phase, reason.as_deref()).await?
        }
        Commands::Review => cmd::cmd_review(&project_dir).await?,
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
    }

    Ok(())
}
