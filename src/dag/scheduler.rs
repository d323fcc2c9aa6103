//! Readiness computation over a validated phase graph.
//!
//! The scheduler is pure: given the graph and a `CampaignState` it answers
//! which phases may be dispatched, how the playbook splits into waves, and how
//! a run that can make no further progress should be reported.

use crate::campaign::{CampaignState, PhaseStatus};
use crate::dag::builder::{PhaseGraph, PhaseIndex};
use crate::phase::PhaseDefinition;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

pub const DEFAULT_CONCURRENCY: usize = 3;
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_PAUSE_POLL_MS: u64 = 1_000;
pub const DEFAULT_RETRY_BASE_MS: u64 = 1_000;
pub const DEFAULT_RETRY_MAX_MS: u64 = 10_000;

/// Exponential backoff between attempts of one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_MS),
            max_delay: Duration::from_millis(DEFAULT_RETRY_MAX_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
        }
    }

    /// Delay after the failed attempt with zero-based index `attempt`:
    /// `min(base * 2^attempt, max)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Scheduler tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum phases in flight at once
    pub concurrency: usize,
    /// How often a paused run re-checks the pause flag
    pub pause_poll_interval: Duration,
    pub retry: RetryPolicy,
    /// Attempt timeout for phases without their own
    pub default_timeout: Duration,
    /// How long a stalled run waits for approvals before giving up
    pub approval_wait: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            pause_poll_interval: Duration::from_millis(DEFAULT_PAUSE_POLL_MS),
            retry: RetryPolicy::default(),
            default_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            approval_wait: Duration::ZERO,
        }
    }
}

impl SchedulerConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_pause_poll_interval(mut self, interval: Duration) -> Self {
        self.pause_poll_interval = interval;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_approval_wait(mut self, wait: Duration) -> Self {
        self.approval_wait = wait;
        self
    }

    /// Concurrency actually used; zero is treated as one.
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.max(1)
    }

    pub fn timeout_for(&self, phase: &PhaseDefinition) -> Duration {
        phase
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.default_timeout)
    }
}

/// How a run that can make no more progress ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every phase completed
    Completed,
    /// At least one phase failed
    Failed {
        failed: Vec<String>,
        blocked: Vec<String>,
    },
    /// Nothing failed but phases are stuck behind approvals or unresolved dependencies
    Stalled {
        awaiting: Vec<String>,
        blocked: Vec<String>,
    },
}

/// Dependency-aware readiness over a phase graph.
#[derive(Debug, Clone)]
pub struct DagScheduler {
    graph: PhaseGraph,
}

impl DagScheduler {
    pub fn new(graph: PhaseGraph) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &PhaseGraph {
        &self.graph
    }

    fn dependencies_completed(&self, index: PhaseIndex, state: &CampaignState) -> bool {
        self.graph.dependencies(index).iter().all(|&dep| {
            self.graph
                .get_phase(dep)
                .is_some_and(|p| state.status(&p.id) == PhaseStatus::Completed)
        })
    }

    /// Phases that may start now, in playbook order.
    ///
    /// A phase qualifies when it is `pending` or `ready`, is not already in
    /// flight, and every dependency is `completed`. Required inputs are not
    /// checked here; the run loop fails a phase missing inputs before it
    /// would be marked `running`.
    pub fn dispatchable<'a>(
        &'a self,
        state: &CampaignState,
        in_flight: &HashSet<String>,
    ) -> Vec<&'a PhaseDefinition> {
        self.graph
            .phases()
            .iter()
            .enumerate()
            .filter(|(_, phase)| state.status(&phase.id).is_dispatchable())
            .filter(|(_, phase)| !in_flight.contains(&phase.id))
            .filter(|(i, _)| self.dependencies_completed(*i, state))
            .map(|(_, phase)| phase)
            .collect()
    }

    /// Group phases into waves that could run in parallel, ignoring state.
    pub fn compute_waves(&self) -> Vec<Vec<String>> {
        let mut waves = Vec::new();
        let mut placed: HashSet<PhaseIndex> = HashSet::new();

        loop {
            let wave: Vec<PhaseIndex> = (0..self.graph.len())
                .filter(|i| !placed.contains(i))
                .filter(|&i| {
                    self.graph
                        .dependencies(i)
                        .iter()
                        .all(|dep| placed.contains(dep))
                })
                .collect();

            if wave.is_empty() {
                break;
            }

            placed.extend(wave.iter().copied());
            waves.push(
                wave.into_iter()
                    .filter_map(|i| self.graph.get_phase(i).map(|p| p.id.clone()))
                    .collect(),
            );
        }

        waves
    }

    /// Classify a run with nothing dispatchable and nothing in flight.
    pub fn outcome(&self, state: &CampaignState) -> RunOutcome {
        let mut failed = Vec::new();
        let mut awaiting = Vec::new();
        let mut blocked = Vec::new();

        for phase in self.graph.phases() {
            match state.status(&phase.id) {
                PhaseStatus::Completed => {}
                PhaseStatus::Failed => failed.push(phase.id.clone()),
                PhaseStatus::AwaitingApproval => awaiting.push(phase.id.clone()),
                _ => blocked.push(phase.id.clone()),
            }
        }

        if failed.is_empty() && awaiting.is_empty() && blocked.is_empty() {
            RunOutcome::Completed
        } else if !failed.is_empty() {
            blocked.extend(awaiting);
            RunOutcome::Failed { failed, blocked }
        } else {
            RunOutcome::Stalled { awaiting, blocked }
        }
    }

    /// Percentage of playbook phases that are `completed`.
    pub fn completion_percentage(&self, state: &CampaignState) -> f64 {
        if self.graph.is_empty() {
            return 100.0;
        }
        let done = self
            .graph
            .phases()
            .iter()
            .filter(|p| state.status(&p.id) == PhaseStatus::Completed)
            .count();
        (done as f64 / self.graph.len() as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::Mode;
    use crate::dag::builder::DagBuilder;

    fn phase(id: &str, deps: &[&str]) -> PhaseDefinition {
        PhaseDefinition::new(id, "Agent").depends_on(deps)
    }

    fn scheduler(phases: Vec<PhaseDefinition>) -> DagScheduler {
        DagScheduler::new(DagBuilder::new(phases).build().unwrap())
    }

    fn state_for(s: &DagScheduler) -> CampaignState {
        let mut state = CampaignState::new("c", Mode::Auto);
        for p in s.graph().phases() {
            state.set_status(&p.id, PhaseStatus::Pending);
        }
        state
    }

    fn ids(phases: Vec<&PhaseDefinition>) -> Vec<&str> {
        phases.into_iter().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(8000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(10000));
        assert_eq!(policy.delay_for(40), Duration::from_millis(10000));
    }

    #[test]
    fn test_config_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.default_timeout, Duration::from_secs(60));
        assert_eq!(config.pause_poll_interval, Duration::from_secs(1));
        assert_eq!(config.approval_wait, Duration::ZERO);
        assert_eq!(config.with_concurrency(0).effective_concurrency(), 1);
    }

    #[test]
    fn test_timeout_prefers_phase_setting() {
        let config = SchedulerConfig::default().with_default_timeout(Duration::from_millis(50));
        assert_eq!(
            config.timeout_for(&phase("a", &[])),
            Duration::from_millis(50)
        );
        assert_eq!(
            config.timeout_for(&phase("a", &[]).with_timeout_ms(7)),
            Duration::from_millis(7)
        );
    }

    #[test]
    fn test_dispatchable_respects_dependencies() {
        let s = scheduler(vec![phase("a", &[]), phase("b", &["a"]), phase("c", &[])]);
        let mut state = state_for(&s);
        let none = HashSet::new();

        assert_eq!(ids(s.dispatchable(&state, &none)), vec!["a", "c"]);

        state.set_status("a", PhaseStatus::Completed);
        assert_eq!(ids(s.dispatchable(&state, &none)), vec!["b", "c"]);
    }

    #[test]
    fn test_dispatchable_skips_in_flight_and_resting() {
        let s = scheduler(vec![phase("a", &[]), phase("b", &[]), phase("c", &[]), phase("d", &[])]);
        let mut state = state_for(&s);
        state.set_status("b", PhaseStatus::AwaitingApproval);
        state.set_status("c", PhaseStatus::Skipped);
        state.set_status("d", PhaseStatus::Ready);
        let in_flight: HashSet<String> = ["a".to_string()].into_iter().collect();

        assert_eq!(ids(s.dispatchable(&state, &in_flight)), vec!["d"]);
    }

    #[test]
    fn test_dependency_awaiting_approval_blocks() {
        let s = scheduler(vec![phase("a", &[]), phase("b", &["a"])]);
        let mut state = state_for(&s);
        state.mark_awaiting("a");
        assert!(s.dispatchable(&state, &HashSet::new()).is_empty());
    }

    #[test]
    fn test_compute_waves() {
        let s = scheduler(vec![
            phase("strategy", &[]),
            phase("seo", &["strategy"]),
            phase("copy", &["strategy"]),
            phase("content", &["seo"]),
            phase("visuals", &["copy"]),
            phase("distribution", &["content", "visuals"]),
        ]);
        assert_eq!(
            s.compute_waves(),
            vec![
                vec!["strategy".to_string()],
                vec!["seo".to_string(), "copy".to_string()],
                vec!["content".to_string(), "visuals".to_string()],
                vec!["distribution".to_string()],
            ]
        );
    }

    #[test]
    fn test_outcome_completed() {
        let s = scheduler(vec![phase("a", &[]), phase("b", &["a"])]);
        let mut state = state_for(&s);
        state.set_status("a", PhaseStatus::Completed);
        state.set_status("b", PhaseStatus::Completed);
        assert_eq!(s.outcome(&state), RunOutcome::Completed);
        assert_eq!(s.completion_percentage(&state), 100.0);
    }

    #[test]
    fn test_outcome_failed_names_blocked() {
        let s = scheduler(vec![phase("a", &[]), phase("b", &["a"]), phase("c", &[])]);
        let mut state = state_for(&s);
        state.set_status("a", PhaseStatus::Failed);
        state.set_status("c", PhaseStatus::Completed);
        assert_eq!(
            s.outcome(&state),
            RunOutcome::Failed {
                failed: vec!["a".into()],
                blocked: vec!["b".into()],
            }
        );
    }

    #[test]
    fn test_outcome_stalled_on_approval() {
        let s = scheduler(vec![phase("a", &[]), phase("b", &["a"])]);
        let mut state = state_for(&s);
        state.mark_awaiting("a");
        assert_eq!(
            s.outcome(&state),
            RunOutcome::Stalled {
                awaiting: vec!["a".into()],
                blocked: vec!["b".into()],
            }
        );
        assert_eq!(s.completion_percentage(&state), 0.0);
    }
}
