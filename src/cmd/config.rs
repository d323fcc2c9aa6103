//! Configuration view and validation commands: `campaign config`.

use anyhow::{Context, Result};
use std::path::Path;

use campaign_orchestrator::config::{CONFIG_FILE, CampaignConfig, CampaignToml, get_campaign_dir};

use super::super::ConfigCommands;

fn print_toml(toml: &CampaignToml) {
    println!("[campaign]");
    println!("  mode = \"{}\"", toml.campaign.mode);
    if let Some(id) = &toml.campaign.campaign_id {
        println!("  campaign_id = \"{}\"", id);
    }
    if let Some(playbook) = &toml.campaign.playbook {
        println!("  playbook = \"{}\"", playbook.display());
    }
    println!();

    println!("[scheduler]");
    println!("  concurrency = {}", toml.scheduler.concurrency);
    println!("  pause_poll_ms = {}", toml.scheduler.pause_poll_ms);
    println!("  approval_wait_ms = {}", toml.scheduler.approval_wait_ms);
    println!();

    println!("[retry]");
    println!("  base_delay_ms = {}", toml.retry.base_delay_ms);
    println!("  max_delay_ms = {}", toml.retry.max_delay_ms);
    println!();

    println!("[defaults]");
    println!("  max_retries = {}", toml.defaults.max_retries);
    println!("  timeout_ms = {}", toml.defaults.timeout_ms);
    println!();

    if !toml.phases.overrides.is_empty() {
        println!("[phases.overrides]");
        for (pattern, override_cfg) in &toml.phases.overrides {
            println!("  \"{}\":", pattern);
            if let Some(max_retries) = override_cfg.max_retries {
                println!("    max_retries = {}", max_retries);
            }
            if let Some(timeout_ms) = override_cfg.timeout_ms {
                println!("    timeout_ms = {}", timeout_ms);
            }
        }
        println!();
    }
}

pub fn cmd_config(project_dir: &Path, command: Option<ConfigCommands>) -> Result<()> {
    let campaign_dir = get_campaign_dir(project_dir);
    let config_path = campaign_dir.join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Campaign Configuration");
            println!("======================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No campaign.toml found at {}", config_path.display());
                println!("Using default configuration:");
            }
            println!();

            let config = CampaignConfig::new(project_dir.to_path_buf())?;
            print_toml(&config.toml);

            println!("Effective values (with env overrides):");
            println!("  campaign_id = \"{}\"", config.campaign_id());
            println!("  mode = \"{}\"", config.mode());
            println!("  concurrency = {}", config.concurrency());
            println!();

            if !config_path.exists() {
                println!("Run 'campaign config init' to create a campaign.toml file.");
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No campaign.toml found. Using defaults (valid).");
                return Ok(());
            }

            let toml = CampaignToml::load(&config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("campaign.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            std::fs::create_dir_all(&campaign_dir).with_context(|| {
                format!("Failed to create directory: {}", campaign_dir.display())
            })?;
            CampaignToml::default().save(&config_path)?;

            println!("Created campaign.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [campaign] mode, campaign_id, playbook");
            println!("  - [scheduler] concurrency, pause_poll_ms, approval_wait_ms");
            println!("  - [phases.overrides.\"pattern-*\"] for phase-specific settings");
            println!();
        }
    }

    Ok(())
}
