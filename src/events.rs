//! Outbound notifications for persistence and UI collaborators.
//!
//! The orchestrator and the validation gate report every transition through an
//! [`EventSink`]. Callbacks are best-effort: a failing sink is logged and never
//! interrupts scheduling. Use the `emit_*` helpers rather than calling the sink
//! directly so that rule holds everywhere.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

use crate::campaign::{CampaignState, PhaseStatus};

/// Receiver of orchestration callbacks. Every method defaults to a no-op.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn on_phase_status(&self, _phase_id: &str, _status: PhaseStatus) -> Result<()> {
        Ok(())
    }

    async fn on_phase_output(&self, _phase_id: &str, _output: &Value) -> Result<()> {
        Ok(())
    }

    async fn on_phase_error(&self, _phase_id: &str, _error: &str) -> Result<()> {
        Ok(())
    }

    async fn on_all_done(&self, _state: &CampaignState) -> Result<()> {
        Ok(())
    }
}

/// Events in serializable form, for channels and JSON output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CampaignEvent {
    PhaseStatus { phase: String, status: PhaseStatus },
    PhaseOutput { phase: String, output: Value },
    PhaseError { phase: String, error: String },
    AllDone { state: Box<CampaignState> },
}

/// Sink that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEvents;

impl EventSink for NoopEvents {}

/// Sink forwarding every callback as a [`CampaignEvent`] over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelEvents {
    tx: mpsc::UnboundedSender<CampaignEvent>,
}

impl ChannelEvents {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<CampaignEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: CampaignEvent) -> Result<()> {
        self.tx
            .send(event)
            .map_err(|_| anyhow!("campaign event receiver dropped"))
    }
}

#[async_trait]
impl EventSink for ChannelEvents {
    async fn on_phase_status(&self, phase_id: &str, status: PhaseStatus) -> Result<()> {
        self.send(CampaignEvent::PhaseStatus {
            phase: phase_id.to_string(),
            status,
        })
    }

    async fn on_phase_output(&self, phase_id: &str, output: &Value) -> Result<()> {
        self.send(CampaignEvent::PhaseOutput {
            phase: phase_id.to_string(),
            output: output.clone(),
        })
    }

    async fn on_phase_error(&self, phase_id: &str, error: &str) -> Result<()> {
        self.send(CampaignEvent::PhaseError {
            phase: phase_id.to_string(),
            error: error.to_string(),
        })
    }

    async fn on_all_done(&self, state: &CampaignState) -> Result<()> {
        self.send(CampaignEvent::AllDone {
            state: Box::new(state.clone()),
        })
    }
}

/// Sink delivering each callback to several sinks.
#[derive(Clone, Default)]
pub struct FanoutEvents {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

/// Every sink is called; failures are folded into one error.
fn collect_failures(results: Vec<Result<()>>) -> Result<()> {
    let failures: Vec<String> = results
        .into_iter()
        .filter_map(|r| r.err())
        .map(|e| format!("{e:#}"))
        .collect();
    if failures.is_empty() {
        Ok(())
    } else {
        Err(anyhow!("{} event sink(s) failed: {}", failures.len(), failures.join("; ")))
    }
}

#[async_trait]
impl EventSink for FanoutEvents {
    async fn on_phase_status(&self, phase_id: &str, status: PhaseStatus) -> Result<()> {
        collect_failures(
            join_all(self.sinks.iter().map(|s| s.on_phase_status(phase_id, status))).await,
        )
    }

    async fn on_phase_output(&self, phase_id: &str, output: &Value) -> Result<()> {
        collect_failures(
            join_all(self.sinks.iter().map(|s| s.on_phase_output(phase_id, output))).await,
        )
    }

    async fn on_phase_error(&self, phase_id: &str, error: &str) -> Result<()> {
        collect_failures(
            join_all(self.sinks.iter().map(|s| s.on_phase_error(phase_id, error))).await,
        )
    }

    async fn on_all_done(&self, state: &CampaignState) -> Result<()> {
        collect_failures(join_all(self.sinks.iter().map(|s| s.on_all_done(state))).await)
    }
}

pub async fn emit_status(sink: &dyn EventSink, phase_id: &str, status: PhaseStatus) {
    if let Err(e) = sink.on_phase_status(phase_id, status).await {
        warn!(phase_id, %status, error = %e, "Event sink failed on phase status");
    }
}

pub async fn emit_output(sink: &dyn EventSink, phase_id: &str, output: &Value) {
    if let Err(e) = sink.on_phase_output(phase_id, output).await {
        warn!(phase_id, error = %e, "Event sink failed on phase output");
    }
}

pub async fn emit_error(sink: &dyn EventSink, phase_id: &str, error: &str) {
    if let Err(e) = sink.on_phase_error(phase_id, error).await {
        warn!(phase_id, error = %e, "Event sink failed on phase error");
    }
}

pub async fn emit_all_done(sink: &dyn EventSink, state: &CampaignState) {
    if let Err(e) = sink.on_all_done(state).await {
        warn!(campaign_id = %state.campaign_id, error = %e, "Event sink failed on completion");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::Mode;
    use serde_json::json;

    struct FailingSink;

    #[async_trait]
    impl EventSink for FailingSink {
        async fn on_phase_status(&self, _phase_id: &str, _status: PhaseStatus) -> Result<()> {
            Err(anyhow!("websocket closed"))
        }
    }

    #[test]
    fn test_event_tagged_serialization() {
        let event = CampaignEvent::PhaseStatus {
            phase: "seo".into(),
            status: PhaseStatus::AwaitingApproval,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(
            json,
            r#"{"type":"phase_status","phase":"seo","status":"awaiting_approval"}"#
        );
    }

    #[tokio::test]
    async fn test_channel_events_forward_in_order() {
        let (sink, mut rx) = ChannelEvents::new();
        sink.on_phase_status("a", PhaseStatus::Running).await.unwrap();
        sink.on_phase_output("a", &json!({"k": 1})).await.unwrap();
        sink.on_phase_error("a", "boom").await.unwrap();
        sink.on_all_done(&CampaignState::new("c", Mode::Auto))
            .await
            .unwrap();

        assert!(matches!(rx.recv().await, Some(CampaignEvent::PhaseStatus { .. })));
        assert!(matches!(rx.recv().await, Some(CampaignEvent::PhaseOutput { .. })));
        assert_eq!(
            rx.recv().await,
            Some(CampaignEvent::PhaseError {
                phase: "a".into(),
                error: "boom".into()
            })
        );
        assert!(matches!(rx.recv().await, Some(CampaignEvent::AllDone { .. })));
    }

    #[tokio::test]
    async fn test_channel_events_error_when_receiver_dropped() {
        let (sink, rx) = ChannelEvents::new();
        drop(rx);
        assert!(sink.on_phase_status("a", PhaseStatus::Ready).await.is_err());
    }

    #[tokio::test]
    async fn test_fanout_reaches_all_sinks_despite_failure() {
        let (channel, mut rx) = ChannelEvents::new();
        let fanout = FanoutEvents::new()
            .with(Arc::new(FailingSink))
            .with(Arc::new(channel));
        assert_eq!(fanout.len(), 2);

        let err = fanout
            .on_phase_status("a", PhaseStatus::Completed)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("websocket closed"));
        assert!(matches!(
            rx.recv().await,
            Some(CampaignEvent::PhaseStatus { status: PhaseStatus::Completed, .. })
        ));
    }

    #[tokio::test]
    async fn test_emit_helpers_swallow_sink_errors() {
        emit_status(&FailingSink, "a", PhaseStatus::Failed).await;
        emit_output(&NoopEvents, "a", &json!(null)).await;
        emit_error(&NoopEvents, "a", "x").await;
        emit_all_done(&NoopEvents, &CampaignState::new("c", Mode::Auto)).await;
    }
}
