//! Agent execution boundary.
//!
//! The orchestrator never knows how a phase is produced. It hands the phase
//! definition and a snapshot of the campaign context to an [`AgentAdapter`] and
//! treats an `Err` or a timeout as a failed attempt. Outputs can additionally be
//! checked by an [`OutputValidator`] registered for the phase.

mod simulated;
mod validator;

pub use simulated::SimulatedAgent;
pub use validator::{OutputValidator, RequiredFields};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::campaign::Context;
use crate::phase::PhaseDefinition;

/// Executes one attempt of a phase.
///
/// Implementations must be cheap to share across tasks; the orchestrator holds
/// them behind an `Arc` and may call `execute` for several phases concurrently.
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    async fn execute(&self, phase: &PhaseDefinition, context: &Context) -> Result<Value>;
}
