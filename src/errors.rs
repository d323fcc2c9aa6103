//! Typed error hierarchy for the campaign orchestrator.
//!
//! Two enums cover the two levels of failure:
//! - `OrchestratorError` - run-level outcomes surfaced to the caller of `Orchestrator::run`
//! - `PhaseError` - a single phase attempt that did not produce an accepted output
//!
//! Every run-level variant that ends a run carries the final `CampaignState` so the
//! caller can persist it regardless of how the run ended.

use crate::campaign::CampaignState;
use thiserror::Error;

/// Errors ending an orchestration run.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Campaign run was cancelled")]
    Cancelled { state: Box<CampaignState> },

    #[error(
        "Campaign incomplete: failed phases [{}]; blocked phases [{}]",
        .failed.join(", "),
        .blocked.join(", ")
    )]
    PhasesFailed {
        failed: Vec<String>,
        blocked: Vec<String>,
        state: Box<CampaignState>,
    },

    #[error(
        "Campaign stalled: awaiting approval [{}]; blocked phases [{}]",
        .awaiting.join(", "),
        .blocked.join(", ")
    )]
    Stalled {
        awaiting: Vec<String>,
        blocked: Vec<String>,
        state: Box<CampaignState>,
    },

    #[error("Invalid playbook: {0}")]
    InvalidPlaybook(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OrchestratorError {
    /// Final campaign state captured when the run ended, if the run got that far.
    pub fn state(&self) -> Option<&CampaignState> {
        match self {
            OrchestratorError::Cancelled { state }
            | OrchestratorError::PhasesFailed { state, .. }
            | OrchestratorError::Stalled { state, .. } => Some(state),
            OrchestratorError::InvalidPlaybook(_) | OrchestratorError::Other(_) => None,
        }
    }

    pub fn into_state(self) -> Option<CampaignState> {
        match self {
            OrchestratorError::Cancelled { state }
            | OrchestratorError::PhasesFailed { state, .. }
            | OrchestratorError::Stalled { state, .. } => Some(*state),
            OrchestratorError::InvalidPlaybook(_) | OrchestratorError::Other(_) => None,
        }
    }

    /// True for stalled runs, which are incomplete rather than failed.
    pub fn is_stalled(&self) -> bool {
        matches!(self, OrchestratorError::Stalled { .. })
    }
}

/// Errors from a single phase attempt.
#[derive(Debug, Error)]
pub enum PhaseError {
    #[error("Phase '{phase}' is missing required inputs: {}", .keys.join(", "))]
    MissingInput { phase: String, keys: Vec<String> },

    #[error("Phase '{phase}' timed out after {timeout_ms}ms")]
    Timeout { phase: String, timeout_ms: u64 },

    #[error("Agent failed on phase '{phase}': {message}")]
    Agent { phase: String, message: String },

    #[error("Phase '{phase}' produced invalid output: {reason}")]
    InvalidOutput { phase: String, reason: String },
}

impl PhaseError {
    /// Whether another attempt could succeed. Missing inputs are configuration
    /// errors and never are.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, PhaseError::MissingInput { .. })
    }

    pub fn phase(&self) -> &str {
        match self {
            PhaseError::MissingInput { phase, .. }
            | PhaseError::Timeout { phase, .. }
            | PhaseError::Agent { phase, .. }
            | PhaseError::InvalidOutput { phase, .. } => phase,
        }
    }
}
