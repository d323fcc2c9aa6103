//! Mutable campaign state shared by the scheduler and the human validation gate.
//!
//! `CampaignState` is owned by the caller. The orchestrator borrows it for the
//! duration of one run and hands it back (inside `Ok` or inside the run error)
//! when the run ends, so it can be persisted between runs with [`CampaignState::save`].

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::phase::Playbook;

/// Shared key-value accumulator of phase outputs.
pub type Context = serde_json::Map<String, Value>;

/// Autonomy level of a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Every phase output is reviewed by a human (default)
    #[default]
    Guided,
    /// Mode-dependent phases are reviewed, failures wait for a human
    SemiAuto,
    /// Only `required` phases are reviewed; failures do not stop the run
    Auto,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Guided => write!(f, "guided"),
            Mode::SemiAuto => write!(f, "semi_auto"),
            Mode::Auto => write!(f, "auto"),
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "guided" => Ok(Mode::Guided),
            "semi_auto" | "semiauto" => Ok(Mode::SemiAuto),
            "auto" => Ok(Mode::Auto),
            _ => anyhow::bail!(
                "Invalid mode '{}'. Valid values: guided, semi_auto, auto",
                s
            ),
        }
    }
}

/// Status of a phase within a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    /// Not yet evaluated
    #[default]
    Pending,
    /// Dependencies satisfied, eligible for dispatch
    Ready,
    /// An attempt is in flight
    Running,
    /// Output accepted
    Completed,
    /// Attempts exhausted
    Failed,
    /// Suspended until a human approves or rejects
    AwaitingApproval,
    /// Left out of the run until unlocked
    Skipped,
}

impl PhaseStatus {
    /// Statuses the scheduler may dispatch from.
    pub fn is_dispatchable(&self) -> bool {
        matches!(self, PhaseStatus::Pending | PhaseStatus::Ready)
    }
}

impl std::fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PhaseStatus::Pending => "pending",
            PhaseStatus::Ready => "ready",
            PhaseStatus::Running => "running",
            PhaseStatus::Completed => "completed",
            PhaseStatus::Failed => "failed",
            PhaseStatus::AwaitingApproval => "awaiting_approval",
            PhaseStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Per-campaign mutable record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignState {
    pub campaign_id: String,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub status_by_phase: BTreeMap<String, PhaseStatus>,
    #[serde(default)]
    pub tries_by_phase: BTreeMap<String, u32>,
    #[serde(default)]
    pub awaiting_human_approval: BTreeSet<String>,
    #[serde(default)]
    pub context: Context,
}

impl CampaignState {
    pub fn new(campaign_id: impl Into<String>, mode: Mode) -> Self {
        Self {
            campaign_id: campaign_id.into(),
            mode,
            status_by_phase: BTreeMap::new(),
            tries_by_phase: BTreeMap::new(),
            awaiting_human_approval: BTreeSet::new(),
            context: Context::new(),
        }
    }

    /// New state with every playbook phase `pending`.
    pub fn for_playbook(campaign_id: impl Into<String>, mode: Mode, playbook: &Playbook) -> Self {
        let mut state = Self::new(campaign_id, mode);
        state.ensure_phases(playbook);
        state
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// Register playbook phases the state does not know about yet as `pending`.
    pub fn ensure_phases(&mut self, playbook: &Playbook) {
        for phase in playbook.phases() {
            self.status_by_phase
                .entry(phase.id.clone())
                .or_insert(PhaseStatus::Pending);
            self.tries_by_phase.entry(phase.id.clone()).or_insert(0);
        }
    }

    /// Return phases left `running` by an interrupted run to `pending`.
    ///
    /// Returns the ids that were reset.
    pub fn reset_interrupted(&mut self) -> Vec<String> {
        let mut reset = Vec::new();
        for (id, status) in self.status_by_phase.iter_mut() {
            if *status == PhaseStatus::Running {
                *status = PhaseStatus::Pending;
                reset.push(id.clone());
            }
        }
        reset
    }

    pub fn status(&self, phase_id: &str) -> PhaseStatus {
        self.status_by_phase
            .get(phase_id)
            .copied()
            .unwrap_or_default()
    }

    pub fn set_status(&mut self, phase_id: &str, status: PhaseStatus) {
        self.status_by_phase.insert(phase_id.to_string(), status);
    }

    pub fn tries(&self, phase_id: &str) -> u32 {
        self.tries_by_phase.get(phase_id).copied().unwrap_or(0)
    }

    /// Count one more execution attempt and return the new total.
    pub fn record_attempt(&mut self, phase_id: &str) -> u32 {
        let tries = self.tries_by_phase.entry(phase_id.to_string()).or_insert(0);
        *tries += 1;
        *tries
    }

    pub fn is_awaiting(&self, phase_id: &str) -> bool {
        self.awaiting_human_approval.contains(phase_id)
    }

    /// Suspend a phase pending human review.
    pub fn mark_awaiting(&mut self, phase_id: &str) {
        self.set_status(phase_id, PhaseStatus::AwaitingApproval);
        self.awaiting_human_approval.insert(phase_id.to_string());
    }

    /// Remove a phase from the awaiting set. Returns false if it was not there.
    pub fn clear_awaiting(&mut self, phase_id: &str) -> bool {
        self.awaiting_human_approval.remove(phase_id)
    }

    /// Shallow-merge `data` into the context; incoming keys overwrite.
    pub fn merge_context(&mut self, data: Context) {
        for (key, value) in data {
            self.context.insert(key, value);
        }
    }

    pub fn missing_inputs(&self, required: &[String]) -> Vec<String> {
        required
            .iter()
            .filter(|key| !self.context.contains_key(key.as_str()))
            .cloned()
            .collect()
    }

    pub fn has_inputs(&self, required: &[String]) -> bool {
        required
            .iter()
            .all(|key| self.context.contains_key(key.as_str()))
    }

    pub fn all_completed(&self) -> bool {
        self.status_by_phase
            .values()
            .all(|s| *s == PhaseStatus::Completed)
    }

    pub fn count(&self, status: PhaseStatus) -> usize {
        self.status_by_phase.values().filter(|s| **s == status).count()
    }

    /// Load state from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read campaign state: {}", path.display()))?;
        let state: CampaignState = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse campaign state: {}", path.display()))?;
        Ok(state)
    }

    /// Save state to a JSON file, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize campaign state")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write campaign state: {}", path.display()))?;
        Ok(())
    }
}
