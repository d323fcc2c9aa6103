//! Campaign execution: `campaign run`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use campaign_orchestrator::agent::SimulatedAgent;
use campaign_orchestrator::audit::TimelineRecorder;
use campaign_orchestrator::campaign::{CampaignState, Context as CampaignContext, Mode, PhaseStatus};
use campaign_orchestrator::config::CampaignConfig;
use campaign_orchestrator::dag::Orchestrator;
use campaign_orchestrator::errors::OrchestratorError;
use campaign_orchestrator::events::FanoutEvents;
use campaign_orchestrator::ui::{CampaignUI, UiMode};

use super::phase::load_project_playbook;
use crate::Cli;

pub struct RunArgs {
    pub playbook: Option<PathBuf>,
    pub mode: Option<Mode>,
    pub concurrency: Option<usize>,
    pub context: Option<PathBuf>,
    pub fresh: bool,
    pub ui: String,
    pub agent_delay_ms: u64,
}

fn load_context(path: &Path) -> Result<CampaignContext> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read context file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Context file must hold a JSON object: {}", path.display()))
}

pub async fn cmd_run(cli: &Cli, project_dir: &Path, args: RunArgs) -> Result<()> {
    let config = CampaignConfig::new(project_dir.to_path_buf())?
        .with_cli_overrides(args.mode, args.concurrency);
    for warning in config.validate() {
        warn!(warning = %warning, "Configuration warning");
    }

    let playbook = load_project_playbook(&config, args.playbook.as_deref())?;
    let state_file = config.state_file();

    let mut state = if !args.fresh && state_file.exists() {
        let mut state = CampaignState::load(&state_file)?;
        if let Some(mode) = args.mode {
            state.mode = mode;
        }
        info!(
            campaign_id = %state.campaign_id,
            completed = state.count(PhaseStatus::Completed),
            "Resuming saved campaign"
        );
        state
    } else {
        CampaignState::for_playbook(config.campaign_id(), config.mode(), &playbook)
    };
    if let Some(path) = &args.context {
        state.merge_context(load_context(path)?);
    }

    let ui = Arc::new(CampaignUI::new(
        playbook.len(),
        UiMode::parse(&args.ui),
        cli.verbose > 0,
    ));
    let recorder = Arc::new(TimelineRecorder::new(&state.campaign_id));
    let events = FanoutEvents::new()
        .with(ui.clone())
        .with(recorder.clone());
    let adapter = Arc::new(SimulatedAgent::new(Duration::from_millis(args.agent_delay_ms)));

    let orchestrator = Orchestrator::new(playbook, state, adapter, Arc::new(events))?
        .with_config(config.scheduler_config());
    ui.print_plan(&orchestrator.waves());

    let run = orchestrator.spawn();
    let handle = run.handle().clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });
    let result = run.wait().await;
    interrupt.abort();

    let (state, failure) = match result {
        Ok(state) => (state, None),
        Err(err) => match err.state().cloned() {
            Some(state) => (state, Some(err)),
            None => return Err(err.into()),
        },
    };

    state.save(&state_file)?;
    let timeline = recorder.finish(&state);
    recorder.save(&config.timeline_file())?;
    ui.print_summary(&state, &timeline.metrics.unwrap_or_default(), failure.is_none());

    match failure {
        None => Ok(()),
        Some(err) => {
            if let OrchestratorError::Stalled { awaiting, .. } = &err
                && !awaiting.is_empty()
                && ui.mode() != UiMode::Json
            {
                eprintln!(
                    "Review with 'campaign review' or 'campaign approve <phase>', then run again."
                );
            }
            Err(err.into())
        }
    }
}
