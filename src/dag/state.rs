//! Per-dispatch results and the run tally built from them.

/// Where a dispatched phase came to rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseOutcome {
    /// Output accepted without review
    Completed,
    /// Output produced, or attempts exhausted outside auto mode; waiting for a human
    AwaitingApproval,
    /// Attempts exhausted (or required inputs missing)
    Failed { error: String },
    /// The run was cancelled before the phase settled; the phase is left `running`
    Cancelled,
}

/// Result of one dispatch of one phase.
#[derive(Debug, Clone)]
pub struct PhaseResult {
    pub phase_id: String,
    pub outcome: PhaseOutcome,
    /// Attempts made during this dispatch
    pub attempts: u32,
}

impl PhaseResult {
    pub fn new(phase_id: &str, outcome: PhaseOutcome, attempts: u32) -> Self {
        Self {
            phase_id: phase_id.to_string(),
            outcome,
            attempts,
        }
    }
}

/// Dispatch and attempt counters for one run, reported when the run ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub dispatched: usize,
    pub failed: usize,
    pub attempts: u32,
}

impl RunSummary {
    pub fn add_result(&mut self, result: &PhaseResult) {
        self.dispatched += 1;
        self.attempts += result.attempts;
        if matches!(result.outcome, PhaseOutcome::Failed { .. }) {
            self.failed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_tallies() {
        let mut summary = RunSummary::default();
        summary.add_result(&PhaseResult::new("a", PhaseOutcome::Completed, 1));
        summary.add_result(&PhaseResult::new("b", PhaseOutcome::AwaitingApproval, 2));
        summary.add_result(&PhaseResult::new(
            "c",
            PhaseOutcome::Failed { error: "x".into() },
            3,
        ));

        assert_eq!(summary.dispatched, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.attempts, 6);
    }

    #[test]
    fn test_cancelled_dispatch_is_not_a_failure() {
        let mut summary = RunSummary::default();
        summary.add_result(&PhaseResult::new("video", PhaseOutcome::Cancelled, 1));
        assert_eq!(summary.dispatched, 1);
        assert_eq!(summary.failed, 0);
    }
}
