//! Playbook plan, saved-state status, and the offline validation gate.

use anyhow::{Context, Result};
use console::style;
use std::path::Path;

use campaign_orchestrator::campaign::{CampaignState, Context as CampaignContext, PhaseStatus};
use campaign_orchestrator::config::CampaignConfig;
use campaign_orchestrator::dag::{DagScheduler, PhaseGraph};
use campaign_orchestrator::events::NoopEvents;
use campaign_orchestrator::gates::{self, ReviewDecision, ReviewGate};
use campaign_orchestrator::phase::{Playbook, load_playbook_or_default};
use campaign_orchestrator::ui::status_label;

/// Playbook from `explicit`, the configured path, or the built-in one, with
/// config overrides applied.
pub fn load_project_playbook(config: &CampaignConfig, explicit: Option<&Path>) -> Result<Playbook> {
    let path = explicit.map(Path::to_path_buf).or_else(|| config.playbook_path());
    let mut playbook = load_playbook_or_default(path.as_deref())?;
    config.toml.apply_to_playbook(&mut playbook);
    Ok(playbook)
}

fn load_saved_state(config: &CampaignConfig) -> Result<CampaignState> {
    let state_file = config.state_file();
    if !state_file.exists() {
        anyhow::bail!(
            "No campaign state found at {}. Run 'campaign run' first.",
            state_file.display()
        );
    }
    CampaignState::load(&state_file)
}

pub fn cmd_plan(project_dir: &Path, playbook: Option<&Path>) -> Result<()> {
    let config = CampaignConfig::new(project_dir.to_path_buf())?;
    let playbook = load_project_playbook(&config, playbook)?;
    let graph = PhaseGraph::from_playbook(&playbook).context("Invalid playbook")?;
    let waves = DagScheduler::new(graph).compute_waves();

    println!();
    println!(
        "Playbook {}: {} phases in {} waves",
        style(&playbook.name).bold(),
        playbook.len(),
        waves.len()
    );
    println!();

    for (i, wave) in waves.iter().enumerate() {
        println!("Wave {}:", style(i).cyan());
        for id in wave {
            let Some(phase) = playbook.get(id) else {
                continue;
            };
            let deps = if phase.depends_on.is_empty() {
                String::new()
            } else {
                format!(" after {}", phase.depends_on.join(", "))
            };
            println!(
                "  {:<14} {:<16} {}{}",
                phase.id,
                style(&phase.agent_id).dim(),
                style(format!("[{}]", phase.validation)).dim(),
                deps
            );
        }
    }
    println!();
    Ok(())
}

pub fn cmd_status(project_dir: &Path) -> Result<()> {
    let config = CampaignConfig::new(project_dir.to_path_buf())?;
    let state_file = config.state_file();
    if !state_file.exists() {
        println!();
        println!("No campaign state found. Run 'campaign run' to start.");
        println!();
        return Ok(());
    }

    let state = CampaignState::load(&state_file)?;
    let playbook = load_project_playbook(&config, None)?;

    println!();
    println!(
        "Campaign {} ({} mode)",
        style(&state.campaign_id).bold(),
        state.mode
    );
    println!();
    println!("{:<17} {:<16} Tries", "Status", "Phase");

    // Playbook order first, then anything only the state knows about.
    let mut ids: Vec<&str> = playbook
        .ids()
        .into_iter()
        .filter(|id| state.status_by_phase.contains_key(*id))
        .collect();
    for id in state.status_by_phase.keys() {
        if playbook.get(id).is_none() {
            ids.push(id.as_str());
        }
    }

    for id in ids {
        println!(
            "{} {:<16} {}",
            status_label(state.status(id)),
            id,
            state.tries(id)
        );
    }

    let scheduler = DagScheduler::new(PhaseGraph::from_playbook(&playbook)?);
    println!();
    println!(
        "{}/{} completed ({:.0}% of playbook)",
        state.count(PhaseStatus::Completed),
        state.status_by_phase.len(),
        scheduler.completion_percentage(&state)
    );
    if !state.awaiting_human_approval.is_empty() {
        let awaiting: Vec<&str> = state
            .awaiting_human_approval
            .iter()
            .map(String::as_str)
            .collect();
        println!("Awaiting approval: {}", style(awaiting.join(", ")).yellow());
    }
    println!();
    Ok(())
}

pub async fn cmd_approve(project_dir: &Path, phase_id: &str, data: Option<&str>) -> Result<()> {
    let config = CampaignConfig::new(project_dir.to_path_buf())?;
    let playbook = load_project_playbook(&config, None)?;
    let mut state = load_saved_state(&config)?;

    let data = data
        .map(|raw| {
            serde_json::from_str::<CampaignContext>(raw).context("--data must be a JSON object")
        })
        .transpose()?;

    let changes = gates::approve_phase(&playbook, &mut state, &NoopEvents, phase_id, data).await;
    if changes.is_empty() {
        println!("Phase '{}' is not awaiting approval; nothing to do.", phase_id);
        return Ok(());
    }

    state.save(&config.state_file())?;
    println!("Approved {}", style(phase_id).green().bold());
    for change in changes.iter().skip(1) {
        println!("  {} is now {}", change.phase_id, change.status);
    }
    Ok(())
}

pub async fn cmd_reject(project_dir: &Path, phase_id: &str, reason: Option<&str>) -> Result<()> {
    let config = CampaignConfig::new(project_dir.to_path_buf())?;
    let playbook = load_project_playbook(&config, None)?;
    let mut state = load_saved_state(&config)?;

    let changes = gates::reject_phase(&playbook, &mut state, &NoopEvents, phase_id, reason).await;
    if changes.is_empty() {
        println!("Phase '{}' is not awaiting approval; nothing to do.", phase_id);
        return Ok(());
    }

    state.save(&config.state_file())?;
    println!(
        "Rejected {}; it will run again on the next 'campaign run'",
        style(phase_id).yellow().bold()
    );
    Ok(())
}

pub async fn cmd_review(project_dir: &Path) -> Result<()> {
    let config = CampaignConfig::new(project_dir.to_path_buf())?;
    let playbook = load_project_playbook(&config, None)?;
    let mut state = load_saved_state(&config)?;

    let awaiting: Vec<String> = playbook
        .ids()
        .into_iter()
        .filter(|id| state.is_awaiting(id))
        .map(str::to_string)
        .collect();
    if awaiting.is_empty() {
        println!("Nothing is awaiting approval.");
        return Ok(());
    }

    let gate = ReviewGate::default();
    let mut decided = 0;

    for phase_id in awaiting {
        let Some(phase) = playbook.get(&phase_id) else {
            continue;
        };
        let keys = phase.output_keys();
        let outputs: Vec<_> = keys.iter().map(|k| (*k, state.context.get(*k))).collect();

        match gate.review(phase, state.tries(&phase_id), &outputs)? {
            ReviewDecision::Approved => {
                gates::approve_phase(&playbook, &mut state, &NoopEvents, &phase_id, None).await;
                decided += 1;
            }
            ReviewDecision::Rejected { reason } => {
                gates::reject_phase(&playbook, &mut state, &NoopEvents, &phase_id, reason.as_deref())
                    .await;
                decided += 1;
            }
            ReviewDecision::Skipped => {}
            ReviewDecision::Quit => break,
        }
    }

    if decided > 0 {
        state.save(&config.state_file())?;
    }
    println!();
    println!("{} decision(s) recorded.", decided);
    Ok(())
}
