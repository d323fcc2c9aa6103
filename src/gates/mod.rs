//! Human validation gate.
//!
//! Approval and rejection only mutate `CampaignState` and report what changed;
//! the scheduler's next round picks up any phase they made ready. Each
//! operation comes in two forms:
//! - `apply_*` mutates the state and returns the [`StatusChange`]s, for callers
//!   that must release a lock before notifying
//! - `approve_phase` / `reject_phase` apply and then emit through an `EventSink`
//!
//! The scheduler settles finished phases through [`settle_success`] and
//! [`settle_failure`] so the mode rules live in one place.

mod review;

pub use review::{ReviewDecision, ReviewGate};

use serde_json::Value;
use tracing::{info, warn};

use crate::campaign::{CampaignState, Context, Mode, PhaseStatus};
use crate::events::{EventSink, emit_status};
use crate::phase::{PhaseDefinition, Playbook, ValidationPolicy};

/// One status transition to report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub phase_id: String,
    pub status: PhaseStatus,
}

impl StatusChange {
    pub fn new(phase_id: &str, status: PhaseStatus) -> Self {
        Self {
            phase_id: phase_id.to_string(),
            status,
        }
    }
}

fn transition(state: &mut CampaignState, phase_id: &str, status: PhaseStatus) -> StatusChange {
    state.set_status(phase_id, status);
    StatusChange::new(phase_id, status)
}

/// Whether a successful output of `phase` must wait for a human in `mode`.
///
/// `required` phases always wait, except those the human operator performs
/// themselves, which follow the mode rule. `optional` phases never wait.
pub fn needs_human_validation(phase: &PhaseDefinition, mode: Mode) -> bool {
    match phase.validation {
        ValidationPolicy::Required if !phase.is_human() => true,
        ValidationPolicy::Optional => false,
        _ => mode != Mode::Auto,
    }
}

/// Move every `pending` or `skipped` phase whose dependencies are `completed`
/// and whose required inputs are in the context to `ready`.
pub fn unlock_dependents(phases: &[PhaseDefinition], state: &mut CampaignState) -> Vec<StatusChange> {
    let mut changes = Vec::new();
    for phase in phases {
        if !matches!(
            state.status(&phase.id),
            PhaseStatus::Pending | PhaseStatus::Skipped
        ) {
            continue;
        }
        let deps_done = phase
            .depends_on
            .iter()
            .all(|dep| state.status(dep) == PhaseStatus::Completed);
        if deps_done && state.has_inputs(&phase.required_inputs) {
            changes.push(transition(state, &phase.id, PhaseStatus::Ready));
        }
    }
    changes
}

/// Approve an awaiting phase: merge `data`, complete it, unlock dependents.
///
/// Returns no changes, and leaves the state untouched, when the phase is not awaiting.
pub fn apply_approval(
    playbook: &Playbook,
    state: &mut CampaignState,
    phase_id: &str,
    data: Option<Context>,
) -> Vec<StatusChange> {
    if !state.is_awaiting(phase_id) {
        return Vec::new();
    }
    if let Some(data) = data {
        state.merge_context(data);
    }
    state.clear_awaiting(phase_id);

    let mut changes = vec![transition(state, phase_id, PhaseStatus::Completed)];
    changes.extend(unlock_dependents(playbook.phases(), state));
    changes
}

/// Reject an awaiting phase, returning it to `ready` for regeneration.
pub fn apply_rejection(state: &mut CampaignState, phase_id: &str) -> Vec<StatusChange> {
    if !state.clear_awaiting(phase_id) {
        return Vec::new();
    }
    vec![transition(state, phase_id, PhaseStatus::Ready)]
}

/// Store a successful output and settle the phase as `completed` or `awaiting_approval`.
///
/// The whole output goes under `output_key`; each `publishes` field present
/// in an object output is copied under its own name.
pub fn settle_success(
    phases: &[PhaseDefinition],
    state: &mut CampaignState,
    phase: &PhaseDefinition,
    output: &Value,
) -> Vec<StatusChange> {
    if let Some(key) = &phase.output_key {
        state.context.insert(key.clone(), output.clone());
    }
    if let Some(object) = output.as_object() {
        for key in &phase.publishes {
            match object.get(key) {
                Some(value) => {
                    state.context.insert(key.clone(), value.clone());
                }
                None => warn!(phase_id = %phase.id, key = %key, "Output lacks published key"),
            }
        }
    }

    if needs_human_validation(phase, state.mode) {
        state.mark_awaiting(&phase.id);
        return vec![StatusChange::new(&phase.id, PhaseStatus::AwaitingApproval)];
    }

    let mut changes = vec![transition(state, &phase.id, PhaseStatus::Completed)];
    changes.extend(unlock_dependents(phases, state));
    changes
}

/// Mark an exhausted phase `failed`; outside auto mode also suspend it for a human.
pub fn settle_failure(state: &mut CampaignState, phase: &PhaseDefinition) -> Vec<StatusChange> {
    let mut changes = vec![transition(state, &phase.id, PhaseStatus::Failed)];
    if state.mode != Mode::Auto {
        state.mark_awaiting(&phase.id);
        changes.push(StatusChange::new(&phase.id, PhaseStatus::AwaitingApproval));
    }
    changes
}

pub async fn emit_changes(events: &dyn EventSink, changes: &[StatusChange]) {
    for change in changes {
        emit_status(events, &change.phase_id, change.status).await;
    }
}

/// Approve `phase_id` and notify `events`. No-op unless the phase is awaiting.
pub async fn approve_phase(
    playbook: &Playbook,
    state: &mut CampaignState,
    events: &dyn EventSink,
    phase_id: &str,
    data: Option<Context>,
) -> Vec<StatusChange> {
    let changes = apply_approval(playbook, state, phase_id, data);
    if !changes.is_empty() {
        info!(campaign_id = %state.campaign_id, phase_id, unlocked = changes.len() - 1, "Phase approved");
        emit_changes(events, &changes).await;
    }
    changes
}

/// Reject `phase_id` and notify `events`. No-op unless the phase is awaiting.
///
/// `reason` is recorded in the log only.
pub async fn reject_phase(
    playbook: &Playbook,
    state: &mut CampaignState,
    events: &dyn EventSink,
    phase_id: &str,
    reason: Option<&str>,
) -> Vec<StatusChange> {
    if playbook.get(phase_id).is_none() {
        warn!(phase_id, "Rejection for a phase outside the playbook");
    }
    let changes = apply_rejection(state, phase_id);
    if !changes.is_empty() {
        info!(
            campaign_id = %state.campaign_id,
            phase_id,
            reason = reason.unwrap_or(""),
            "Phase rejected"
        );
        emit_changes(events, &changes).await;
    }
    changes
}
