//! Dependency-aware phase orchestration.
//!
//! ## Architecture
//!
//! 1. **Builder** - validates a playbook into a phase graph
//! 2. **Scheduler** - pure readiness: what may run now, waves, run outcome
//! 3. **Executor** - the run loop, phase attempts and the control handle
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use campaign_orchestrator::agent::SimulatedAgent;
//! use campaign_orchestrator::campaign::{CampaignState, Mode};
//! use campaign_orchestrator::dag::{Orchestrator, SchedulerConfig};
//! use campaign_orchestrator::events::NoopEvents;
//! use campaign_orchestrator::phase::default_playbook;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let playbook = default_playbook();
//! let state = CampaignState::for_playbook("spring-launch", Mode::Auto, &playbook);
//!
//! let orchestrator = Orchestrator::new(
//!     playbook,
//!     state,
//!     Arc::new(SimulatedAgent::default()),
//!     Arc::new(NoopEvents),
//! )?
//! .with_config(SchedulerConfig::default().with_concurrency(2));
//!
//! let run = orchestrator.spawn();
//! run.handle().pause();
//! run.handle().resume();
//! let final_state = run.wait().await;
//! # let _ = final_state;
//! # Ok(())
//! # }
//! ```

mod builder;
mod executor;
mod scheduler;
mod state;

pub use builder::{DagBuilder, PhaseGraph, PhaseIndex};
pub use executor::{CampaignRun, Orchestrator, OrchestratorHandle, SharedState, run_campaign};
pub use scheduler::{DagScheduler, RetryPolicy, RunOutcome, SchedulerConfig};
pub use scheduler::{
    DEFAULT_CONCURRENCY, DEFAULT_PAUSE_POLL_MS, DEFAULT_RETRY_BASE_MS, DEFAULT_RETRY_MAX_MS,
    DEFAULT_TIMEOUT_MS,
};
pub use state::{PhaseOutcome, PhaseResult, RunSummary};
