pub mod campaign_progress;
pub mod icons;

pub use campaign_progress::{CampaignUI, UiMode, format_duration, status_label};
