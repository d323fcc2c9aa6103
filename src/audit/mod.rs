//! Campaign timeline and run metrics.
//!
//! [`TimelineRecorder`] is an `EventSink` that turns orchestration callbacks into a
//! timestamped [`CampaignTimeline`]; it is created per run and saved by the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::campaign::PhaseStatus;

pub mod recorder;
pub use recorder::TimelineRecorder;

/// What happened to a phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TimelineEvent {
    Status { status: PhaseStatus },
    /// Keys of an object output, or empty for scalar outputs
    Output { keys: Vec<String> },
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub at: DateTime<Utc>,
    pub phase_id: String,
    #[serde(flatten)]
    pub event: TimelineEvent,
    /// Time since the phase entered `running`, on settling statuses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CampaignMetrics {
    pub total_phases: usize,
    pub completed: usize,
    pub failed: usize,
    pub awaiting_approval: usize,
    /// Mean running→settled latency over settled dispatches
    pub avg_latency_ms: u64,
    pub total_duration_ms: u64,
}

impl CampaignMetrics {
    pub fn compute(
        statuses: &BTreeMap<String, PhaseStatus>,
        latencies: &[u64],
        total_duration_ms: u64,
    ) -> Self {
        let count = |status: PhaseStatus| statuses.values().filter(|s| **s == status).count();
        let avg_latency_ms = if latencies.is_empty() {
            0
        } else {
            latencies.iter().sum::<u64>() / latencies.len() as u64
        };

        Self {
            total_phases: statuses.len(),
            completed: count(PhaseStatus::Completed),
            failed: count(PhaseStatus::Failed),
            awaiting_approval: count(PhaseStatus::AwaitingApproval),
            avg_latency_ms,
            total_duration_ms,
        }
    }
}

/// Everything recorded for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignTimeline {
    pub run_id: Uuid,
    pub campaign_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub entries: Vec<TimelineEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<CampaignMetrics>,
}

impl CampaignTimeline {
    pub fn new(campaign_id: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            campaign_id: campaign_id.to_string(),
            started_at: Utc::now(),
            ended_at: None,
            entries: Vec::new(),
            metrics: None,
        }
    }

    /// Last reported status of every phase seen so far.
    pub fn latest_statuses(&self) -> BTreeMap<String, PhaseStatus> {
        let mut statuses = BTreeMap::new();
        for entry in &self.entries {
            if let TimelineEvent::Status { status } = entry.event {
                statuses.insert(entry.phase_id.clone(), status);
            }
        }
        statuses
    }

    pub fn latencies(&self) -> Vec<u64> {
        self.entries.iter().filter_map(|e| e.latency_ms).collect()
    }

    pub fn entries_for<'a>(&'a self, phase_id: &'a str) -> impl Iterator<Item = &'a TimelineEntry> {
        self.entries.iter().filter(move |e| e.phase_id == phase_id)
    }

    pub fn elapsed_ms(&self) -> u64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds().max(0) as u64
    }
}
