pub mod agent;
pub mod audit;
pub mod campaign;
pub mod config;
pub mod dag;
pub mod errors;
pub mod events;
pub mod gates;
pub mod logging;
pub mod phase;
pub mod ui;

pub use campaign::{CampaignState, Context, Mode, PhaseStatus};
pub use errors::{OrchestratorError, PhaseError};
pub use phase::{PhaseDefinition, Playbook};
