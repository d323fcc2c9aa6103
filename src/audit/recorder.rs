use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{CampaignMetrics, CampaignTimeline, TimelineEntry, TimelineEvent};
use crate::campaign::{CampaignState, PhaseStatus};
use crate::events::EventSink;

struct Recording {
    timeline: CampaignTimeline,
    running_since: HashMap<String, DateTime<Utc>>,
}

/// Records orchestration events into a [`CampaignTimeline`].
pub struct TimelineRecorder {
    inner: Mutex<Recording>,
}

impl TimelineRecorder {
    pub fn new(campaign_id: &str) -> Self {
        Self {
            inner: Mutex::new(Recording {
                timeline: CampaignTimeline::new(campaign_id),
                running_since: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Recording> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, phase_id: &str, event: TimelineEvent) {
        let mut rec = self.lock();
        let now = Utc::now();

        let latency_ms = match &event {
            TimelineEvent::Status {
                status: PhaseStatus::Running,
            } => {
                rec.running_since.insert(phase_id.to_string(), now);
                None
            }
            TimelineEvent::Status { status }
                if matches!(
                    status,
                    PhaseStatus::Completed | PhaseStatus::Failed | PhaseStatus::AwaitingApproval
                ) =>
            {
                rec.running_since
                    .remove(phase_id)
                    .map(|since| (now - since).num_milliseconds().max(0) as u64)
            }
            _ => None,
        };

        rec.timeline.entries.push(TimelineEntry {
            at: now,
            phase_id: phase_id.to_string(),
            event,
            latency_ms,
        });
    }

    /// Copy of everything recorded so far.
    pub fn timeline(&self) -> CampaignTimeline {
        self.lock().timeline.clone()
    }

    /// Metrics from the statuses reported so far.
    pub fn metrics(&self) -> CampaignMetrics {
        let rec = self.lock();
        CampaignMetrics::compute(
            &rec.timeline.latest_statuses(),
            &rec.timeline.latencies(),
            rec.timeline.elapsed_ms(),
        )
    }

    /// Close the timeline against the final state and return it.
    pub fn finish(&self, state: &CampaignState) -> CampaignTimeline {
        let mut rec = self.lock();
        if rec.timeline.ended_at.is_none() {
            rec.timeline.ended_at = Some(Utc::now());
        }
        let metrics = CampaignMetrics::compute(
            &state.status_by_phase,
            &rec.timeline.latencies(),
            rec.timeline.elapsed_ms(),
        );
        rec.timeline.metrics = Some(metrics);
        rec.timeline.clone()
    }

    /// Write the timeline as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let timeline = self.timeline();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let content =
            serde_json::to_string_pretty(&timeline).context("Failed to serialize timeline")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write timeline: {}", path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl EventSink for TimelineRecorder {
    async fn on_phase_status(&self, phase_id: &str, status: PhaseStatus) -> Result<()> {
        self.record(phase_id, TimelineEvent::Status { status });
        Ok(())
    }

    async fn on_phase_output(&self, phase_id: &str, output: &Value) -> Result<()> {
        let keys = output
            .as_object()
            .map(|o| o.keys().cloned().collect())
            .unwrap_or_default();
        self.record(phase_id, TimelineEvent::Output { keys });
        Ok(())
    }

    async fn on_phase_error(&self, phase_id: &str, error: &str) -> Result<()> {
        self.record(
            phase_id,
            TimelineEvent::Error {
                message: error.to_string(),
            },
        );
        Ok(())
    }

    async fn on_all_done(&self, state: &CampaignState) -> Result<()> {
        self.finish(state);
        Ok(())
    }
}
