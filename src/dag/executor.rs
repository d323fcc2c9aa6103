//! Campaign run loop.
//!
//! One coordinating loop per run dispatches ready phases onto a `JoinSet`,
//! bounded by the configured concurrency, and waits for the first completion
//! before re-evaluating readiness. Each phase task owns its attempt loop
//! (timeout, retry with backoff) and settles its own status under the shared
//! state lock; the loop only tracks what is in flight.
//!
//! Control arrives through an [`OrchestratorHandle`]:
//! - pause is polled every `pause_poll_interval`; in-flight phases keep running
//! - cancel is raced against every wait, so `run` returns promptly; in-flight
//!   tasks are detached and may still write to the state afterward
//! - approve/reject go through the validation gate and wake the loop

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::anyhow;
use serde_json::Value;
use tokio::sync::{Mutex, Notify};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::agent::{AgentAdapter, OutputValidator};
use crate::campaign::{CampaignState, Context, Mode, PhaseStatus};
use crate::dag::builder::PhaseGraph;
use crate::dag::scheduler::{DagScheduler, RunOutcome, SchedulerConfig};
use crate::dag::state::{PhaseOutcome, PhaseResult, RunSummary};
use crate::errors::{OrchestratorError, PhaseError};
use crate::events::{EventSink, emit_all_done, emit_error, emit_output, emit_status};
use crate::gates::{self, StatusChange};
use crate::phase::{PhaseDefinition, Playbook};

/// Campaign state shared between the run loop, phase tasks and handles.
pub type SharedState = Arc<Mutex<CampaignState>>;

/// Cloneable control surface for a run.
#[derive(Clone)]
pub struct OrchestratorHandle {
    playbook: Arc<Playbook>,
    state: SharedState,
    events: Arc<dyn EventSink>,
    cancel: CancellationToken,
    paused: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl OrchestratorHandle {
    /// Stop dispatching new phases until [`resume`](Self::resume).
    pub fn pause(&self) {
        if !self.paused.swap(true, Ordering::SeqCst) {
            info!("Campaign paused");
        }
    }

    pub fn resume(&self) {
        if self.paused.swap(false, Ordering::SeqCst) {
            info!("Campaign resumed");
        }
    }

    /// Stop dispatching and make `run` return `Cancelled`.
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            info!("Campaign cancellation requested");
        }
        self.cancel.cancel();
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Approve an awaiting phase. Returns the transitions applied; empty if it was not awaiting.
    pub async fn approve(&self, phase_id: &str, data: Option<Context>) -> Vec<StatusChange> {
        let changes = {
            let mut state = self.state.lock().await;
            gates::apply_approval(&self.playbook, &mut state, phase_id, data)
        };
        if !changes.is_empty() {
            info!(phase_id, unlocked = changes.len() - 1, "Phase approved");
            gates::emit_changes(self.events.as_ref(), &changes).await;
            self.wake.notify_one();
        }
        changes
    }

    /// Reject an awaiting phase so it is executed again.
    pub async fn reject(&self, phase_id: &str, reason: Option<&str>) -> Vec<StatusChange> {
        let changes = {
            let mut state = self.state.lock().await;
            gates::apply_rejection(&mut state, phase_id)
        };
        if !changes.is_empty() {
            info!(phase_id, reason = reason.unwrap_or(""), "Phase rejected");
            gates::emit_changes(self.events.as_ref(), &changes).await;
            self.wake.notify_one();
        }
        changes
    }

    /// Copy of the current state.
    pub async fn snapshot(&self) -> CampaignState {
        self.state.lock().await.clone()
    }

    pub fn shared_state(&self) -> SharedState {
        Arc::clone(&self.state)
    }
}

/// Drives one campaign run.
pub struct Orchestrator {
    playbook: Arc<Playbook>,
    scheduler: DagScheduler,
    state: SharedState,
    adapter: Arc<dyn AgentAdapter>,
    events: Arc<dyn EventSink>,
    validators: HashMap<String, Arc<dyn OutputValidator>>,
    config: SchedulerConfig,
    cancel: CancellationToken,
    paused: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl Orchestrator {
    /// Validate the playbook graph and prepare a run over `state`.
    ///
    /// Phases the state does not know yet are added as `pending`; phases left
    /// `running` by an interrupted run go back to `pending`.
    pub fn new(
        playbook: Playbook,
        mut state: CampaignState,
        adapter: Arc<dyn AgentAdapter>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, OrchestratorError> {
        let graph = PhaseGraph::from_playbook(&playbook)
            .map_err(|e| OrchestratorError::InvalidPlaybook(format!("{e:#}")))?;

        state.ensure_phases(&playbook);
        let reset = state.reset_interrupted();
        if !reset.is_empty() {
            warn!(phases = ?reset, "Reset phases left running by an interrupted run");
        }

        Ok(Self {
            playbook: Arc::new(playbook),
            scheduler: DagScheduler::new(graph),
            state: Arc::new(Mutex::new(state)),
            adapter,
            events,
            validators: HashMap::new(),
            config: SchedulerConfig::default(),
            cancel: CancellationToken::new(),
            paused: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
        })
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Check outputs of `phase_id` before they are accepted.
    pub fn with_validator(mut self, phase_id: &str, validator: Arc<dyn OutputValidator>) -> Self {
        self.validators.insert(phase_id.to_string(), validator);
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Execution waves of the playbook, for display.
    pub fn waves(&self) -> Vec<Vec<String>> {
        self.scheduler.compute_waves()
    }

    pub fn handle(&self) -> OrchestratorHandle {
        OrchestratorHandle {
            playbook: Arc::clone(&self.playbook),
            state: Arc::clone(&self.state),
            events: Arc::clone(&self.events),
            cancel: self.cancel.clone(),
            paused: Arc::clone(&self.paused),
            wake: Arc::clone(&self.wake),
        }
    }

    /// Run on a background task, keeping a handle for control.
    pub fn spawn(self) -> CampaignRun {
        let handle = self.handle();
        let task = tokio::spawn(self.run());
        CampaignRun { handle, task }
    }

    /// Run until every phase is settled, the run stalls, or it is cancelled.
    pub async fn run(self) -> Result<CampaignState, OrchestratorError> {
        let timer = Instant::now();
        let concurrency = self.config.effective_concurrency();
        let (campaign_id, mode) = {
            let state = self.state.lock().await;
            (state.campaign_id.clone(), state.mode)
        };
        info!(
            campaign_id = %campaign_id,
            %mode,
            phases = self.scheduler.graph().len(),
            concurrency,
            "Starting campaign orchestration"
        );

        let runner = Arc::new(PhaseRunner {
            playbook: Arc::clone(&self.playbook),
            state: Arc::clone(&self.state),
            adapter: Arc::clone(&self.adapter),
            events: Arc::clone(&self.events),
            validators: self.validators.clone(),
            config: self.config.clone(),
            cancel: self.cancel.clone(),
        });

        let mut join_set: JoinSet<PhaseResult> = JoinSet::new();
        let mut in_flight: HashSet<String> = HashSet::new();
        let mut summary = RunSummary::default();
        let mut approval_deadline: Option<Instant> = None;

        loop {
            if self.cancel.is_cancelled() {
                join_set.detach_all();
                let state = self.state.lock().await.clone();
                info!(
                    campaign_id = %campaign_id,
                    in_flight = in_flight.len(),
                    dispatched = summary.dispatched,
                    attempts = summary.attempts,
                    "Campaign run cancelled"
                );
                return Err(OrchestratorError::Cancelled {
                    state: Box::new(state),
                });
            }

            if self.paused.load(Ordering::SeqCst) {
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.config.pause_poll_interval) => {}
                }
                continue;
            }

            let (launch, unstartable) = {
                let mut state = self.state.lock().await;
                let capacity = concurrency.saturating_sub(in_flight.len());
                let mut launch: Vec<PhaseDefinition> = Vec::new();
                let mut unstartable = Vec::new();

                for phase in self.scheduler.dispatchable(&state, &in_flight) {
                    let missing = state.missing_inputs(&phase.required_inputs);
                    if !missing.is_empty() {
                        let err = PhaseError::MissingInput {
                            phase: phase.id.clone(),
                            keys: missing,
                        };
                        let changes = gates::settle_failure(&mut state, phase);
                        unstartable.push((err, changes));
                        continue;
                    }
                    if launch.len() < capacity {
                        state.set_status(&phase.id, PhaseStatus::Running);
                        launch.push(phase.clone());
                    }
                }
                (launch, unstartable)
            };

            let progressed = !launch.is_empty() || !unstartable.is_empty();
            if progressed {
                approval_deadline = None;
            }

            for (err, changes) in unstartable {
                let phase_id = err.phase();
                error!(campaign_id = %campaign_id, phase_id = %phase_id, error = %err, "Phase cannot start");
                let message = err.to_string();
                report_failure(self.events.as_ref(), phase_id, &message, &changes).await;
                summary.add_result(&PhaseResult::new(
                    phase_id,
                    PhaseOutcome::Failed { error: message },
                    0,
                ));
            }

            for phase in launch {
                debug!(phase_id = %phase.id, "Dispatching phase");
                in_flight.insert(phase.id.clone());
                let runner = Arc::clone(&runner);
                join_set.spawn(async move { runner.execute(phase).await });
            }

            if in_flight.is_empty() {
                if progressed {
                    continue;
                }

                let state = self.state.lock().await.clone();
                match self.scheduler.outcome(&state) {
                    RunOutcome::Completed => {
                        info!(
                            campaign_id = %campaign_id,
                            dispatched = summary.dispatched,
                            attempts = summary.attempts,
                            duration_ms = timer.elapsed().as_millis() as u64,
                            "Campaign completed"
                        );
                        emit_all_done(self.events.as_ref(), &state).await;
                        return Ok(state);
                    }
                    RunOutcome::Failed { failed, blocked } => {
                        error!(
                            campaign_id = %campaign_id,
                            failed = ?failed,
                            blocked = ?blocked,
                            dispatched = summary.dispatched,
                            attempts = summary.attempts,
                            "Campaign finished with failed phases"
                        );
                        return Err(OrchestratorError::PhasesFailed {
                            failed,
                            blocked,
                            state: Box::new(state),
                        });
                    }
                    RunOutcome::Stalled { awaiting, blocked } => {
                        if !awaiting.is_empty() && !self.config.approval_wait.is_zero() {
                            let deadline = *approval_deadline
                                .get_or_insert_with(|| Instant::now() + self.config.approval_wait);
                            if Instant::now() < deadline {
                                debug!(awaiting = ?awaiting, "Waiting for approvals");
                                tokio::select! {
                                    _ = self.cancel.cancelled() => {}
                                    _ = self.wake.notified() => {}
                                    _ = tokio::time::sleep_until(deadline) => {}
                                }
                                continue;
                            }
                        }
                        error!(
                            campaign_id = %campaign_id,
                            awaiting = ?awaiting,
                            blocked = ?blocked,
                            dispatched = summary.dispatched,
                            attempts = summary.attempts,
                            "Deadlock detected: no phase can run and none is in flight"
                        );
                        return Err(OrchestratorError::Stalled {
                            awaiting,
                            blocked,
                            state: Box::new(state),
                        });
                    }
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {}
                _ = self.wake.notified() => {}
                joined = join_set.join_next() => match joined {
                    Some(Ok(result)) => {
                        in_flight.remove(&result.phase_id);
                        summary.add_result(&result);
                    }
                    Some(Err(join_err)) => {
                        error!(campaign_id = %campaign_id, error = %join_err, "Phase task aborted");
                        return Err(OrchestratorError::Other(anyhow!(
                            "Phase task aborted: {join_err}"
                        )));
                    }
                    None => in_flight.clear(),
                },
            }
        }
    }
}

/// A run on a background task.
pub struct CampaignRun {
    handle: OrchestratorHandle,
    task: JoinHandle<Result<CampaignState, OrchestratorError>>,
}

impl CampaignRun {
    pub fn handle(&self) -> &OrchestratorHandle {
        &self.handle
    }

    pub async fn wait(self) -> Result<CampaignState, OrchestratorError> {
        self.task
            .await
            .map_err(|e| OrchestratorError::Other(anyhow!("Orchestrator task failed: {e}")))?
    }
}

/// Run `playbook` over `state` with default settings and the given concurrency.
pub async fn run_campaign(
    playbook: Playbook,
    state: CampaignState,
    adapter: Arc<dyn AgentAdapter>,
    events: Arc<dyn EventSink>,
    concurrency: usize,
) -> Result<CampaignState, OrchestratorError> {
    Orchestrator::new(playbook, state, adapter, events)?
        .with_config(SchedulerConfig::default().with_concurrency(concurrency))
        .run()
        .await
}

/// Per-phase execution shared by every task of a run.
struct PhaseRunner {
    playbook: Arc<Playbook>,
    state: SharedState,
    adapter: Arc<dyn AgentAdapter>,
    events: Arc<dyn EventSink>,
    validators: HashMap<String, Arc<dyn OutputValidator>>,
    config: SchedulerConfig,
    cancel: CancellationToken,
}

impl PhaseRunner {
    /// Attempt loop for one dispatch. The phase is already `running`.
    ///
    /// Cancellation between attempts abandons the dispatch without settling
    /// the phase: it stays `running` and the next run resets it.
    async fn execute(&self, phase: PhaseDefinition) -> PhaseResult {
        let max_attempts = phase.max_attempts();
        let timeout = self.config.timeout_for(&phase);

        info!(phase_id = %phase.id, agent = %phase.agent_id, max_attempts, "Starting phase");
        emit_status(self.events.as_ref(), &phase.id, PhaseStatus::Running).await;

        let mut attempts = 0;
        let mut last_error: Option<PhaseError> = None;

        while attempts < max_attempts {
            if attempts > 0 && self.cancel.is_cancelled() {
                return self.abandon(&phase, attempts);
            }

            let context = {
                let mut state = self.state.lock().await;
                state.record_attempt(&phase.id);
                state.context.clone()
            };
            attempts += 1;

            match self.attempt(&phase, &context, timeout).await {
                Ok(output) => return self.succeed(&phase, output, attempts).await,
                Err(err) => {
                    warn!(
                        phase_id = %phase.id,
                        attempt = attempts,
                        max_attempts,
                        error = %err,
                        "Phase attempt failed"
                    );
                    let retryable = err.is_retryable();
                    last_error = Some(err);
                    if !retryable {
                        break;
                    }
                }
            }

            if attempts < max_attempts {
                let delay = self.config.retry.delay_for(attempts - 1);
                debug!(phase_id = %phase.id, delay_ms = delay.as_millis() as u64, "Backing off before retry");
                tokio::select! {
                    _ = self.cancel.cancelled() => return self.abandon(&phase, attempts),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        let error = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| format!("Phase '{}' made no attempt", phase.id));
        self.fail(&phase, error, attempts).await
    }

    fn abandon(&self, phase: &PhaseDefinition, attempts: u32) -> PhaseResult {
        info!(phase_id = %phase.id, attempts, "Retry abandoned after cancellation");
        PhaseResult::new(&phase.id, PhaseOutcome::Cancelled, attempts)
    }

    async fn attempt(
        &self,
        phase: &PhaseDefinition,
        context: &Context,
        timeout: Duration,
    ) -> Result<Value, PhaseError> {
        let output = match tokio::time::timeout(timeout, self.adapter.execute(phase, context)).await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                // Adapters may report a typed phase error, e.g. a missing input.
                return Err(match e.downcast::<PhaseError>() {
                    Ok(phase_error) => phase_error,
                    Err(e) => PhaseError::Agent {
                        phase: phase.id.clone(),
                        message: format!("{e:#}"),
                    },
                });
            }
            Err(_) => {
                return Err(PhaseError::Timeout {
                    phase: phase.id.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
        };

        if let Some(validator) = self.validators.get(&phase.id) {
            validator
                .validate(&output)
                .map_err(|reason| PhaseError::InvalidOutput {
                    phase: phase.id.clone(),
                    reason,
                })?;
        }

        Ok(output)
    }

    async fn succeed(
        &self,
        phase: &PhaseDefinition,
        output: Value,
        attempts: u32,
    ) -> PhaseResult {
        let changes = {
            let mut state = self.state.lock().await;
            gates::settle_success(self.playbook.phases(), &mut state, phase, &output)
        };

        emit_output(self.events.as_ref(), &phase.id, &output).await;
        gates::emit_changes(self.events.as_ref(), &changes).await;

        let outcome = if changes
            .first()
            .is_some_and(|c| c.status == PhaseStatus::AwaitingApproval)
        {
            info!(phase_id = %phase.id, attempts, "Phase output awaiting approval");
            PhaseOutcome::AwaitingApproval
        } else {
            info!(phase_id = %phase.id, attempts, "Phase completed");
            PhaseOutcome::Completed
        };

        PhaseResult::new(&phase.id, outcome, attempts)
    }

    async fn fail(
        &self,
        phase: &PhaseDefinition,
        error: String,
        attempts: u32,
    ) -> PhaseResult {
        let (changes, mode) = {
            let mut state = self.state.lock().await;
            (gates::settle_failure(&mut state, phase), state.mode)
        };

        error!(phase_id = %phase.id, attempts, error = %error, "Phase failed");
        report_failure(self.events.as_ref(), &phase.id, &error, &changes).await;

        if mode == Mode::Auto {
            warn!(phase_id = %phase.id, "Auto mode: continuing with independent phases");
        } else {
            info!(phase_id = %phase.id, %mode, "Phase awaiting human intervention");
        }

        PhaseResult::new(&phase.id, PhaseOutcome::Failed { error }, attempts)
    }
}

/// `failed` status, then the error, then any follow-up transition.
async fn report_failure(
    events: &dyn EventSink,
    phase_id: &str,
    error: &str,
    changes: &[StatusChange],
) {
    let (first, rest) = match changes.split_first() {
        Some((first, rest)) => (Some(first), rest),
        None => (None, changes),
    };
    if let Some(first) = first {
        emit_status(events, &first.phase_id, first.status).await;
    }
    emit_error(events, phase_id, error).await;
    gates::emit_changes(events, rest).await;
}
