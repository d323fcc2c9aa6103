//! Campaign progress UI.
//!
//! Renders orchestration callbacks in one of three modes:
//! - `full`: header bar plus one spinner per running phase
//! - `minimal`: one line per settled phase
//! - `json`: one [`CampaignEvent`] per line for machine consumption

use anyhow::Result;
use async_trait::async_trait;
use console::{StyledObject, Term, style};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::audit::CampaignMetrics;
use crate::campaign::{CampaignState, PhaseStatus};
use crate::events::{CampaignEvent, EventSink};
use crate::ui::icons::{CHECK, CLOCK, CROSS, REVIEW, RUNNING, SPARKLE, WARN, WAVE};

/// Output mode for the campaign UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UiMode {
    /// Progress bars and colors
    #[default]
    Full,
    /// Single-line status updates
    Minimal,
    /// JSON-formatted events
    Json,
}

impl std::str::FromStr for UiMode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "json" => Self::Json,
            "minimal" => Self::Minimal,
            _ => Self::Full,
        })
    }
}

impl UiMode {
    pub fn parse(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }
}

/// Terminal UI fed by orchestration callbacks.
///
/// Spinners live in `phase_bars` between `running` and the next settling
/// status; the lock is only held to insert or remove a bar.
pub struct CampaignUI {
    mode: UiMode,
    multi: MultiProgress,
    header_bar: ProgressBar,
    phase_bars: Mutex<HashMap<String, ProgressBar>>,
    verbose: bool,
    term: Term,
}

impl CampaignUI {
    pub fn new(total_phases: usize, mode: UiMode, verbose: bool) -> Self {
        let multi = if mode == UiMode::Full {
            MultiProgress::new()
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };

        let header_style = ProgressStyle::default_bar()
            .template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let header_bar = multi.add(ProgressBar::new(total_phases as u64));
        header_bar.set_style(header_style);
        header_bar.set_prefix("Campaign");
        header_bar.set_message("Starting...");

        Self {
            mode,
            multi,
            header_bar,
            phase_bars: Mutex::new(HashMap::new()),
            verbose,
            term: Term::stdout(),
        }
    }

    pub fn mode(&self) -> UiMode {
        self.mode
    }

    fn bars(&self) -> MutexGuard<'_, HashMap<String, ProgressBar>> {
        self.phase_bars
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn println(&self, line: String) {
        if self.mode == UiMode::Full {
            if self.multi.println(&line).is_err() {
                eprintln!("{line}");
            }
        } else {
            let _ = writeln!(&self.term, "{}", line);
        }
    }

    pub fn handle_event(&self, event: &CampaignEvent) {
        match self.mode {
            UiMode::Json => self.handle_json(event),
            UiMode::Minimal => self.handle_minimal(event),
            UiMode::Full => self.handle_full(event),
        }
    }

    fn handle_json(&self, event: &CampaignEvent) {
        if let Ok(line) = serde_json::to_string(event) {
            let _ = writeln!(&self.term, "{}", line);
        }
    }

    fn handle_minimal(&self, event: &CampaignEvent) {
        match event {
            CampaignEvent::PhaseStatus { phase, status } => match status {
                PhaseStatus::Completed => self.println(format!("✓ {}", phase)),
                PhaseStatus::Failed => self.println(format!("✗ {}", phase)),
                PhaseStatus::AwaitingApproval => {
                    self.println(format!("? {} awaiting approval", phase))
                }
                PhaseStatus::Running if self.verbose => self.println(format!("> {}", phase)),
                _ => {}
            },
            CampaignEvent::PhaseError { phase, error } => {
                self.println(format!("  {}: {}", phase, error))
            }
            CampaignEvent::PhaseOutput { .. } => {}
            CampaignEvent::AllDone { state } => self.println(format!(
                "Done: {}/{} ✓",
                state.count(PhaseStatus::Completed),
                state.status_by_phase.len()
            )),
        }
    }

    fn handle_full(&self, event: &CampaignEvent) {
        match event {
            CampaignEvent::PhaseStatus { phase, status } => self.on_phase_status(phase, *status),
            CampaignEvent::PhaseOutput { phase, output } => self.on_phase_output(phase, output),
            CampaignEvent::PhaseError { phase, error } => {
                self.println(format!(
                    "  {} Phase {} {}: {}",
                    CROSS,
                    style(phase).red().bold(),
                    style("error").red(),
                    error
                ));
            }
            CampaignEvent::AllDone { state } => {
                self.header_bar.set_position(state.count(PhaseStatus::Completed) as u64);
                self.header_bar
                    .finish_with_message(format!("{}all phases completed", SPARKLE));
            }
        }
    }

    fn on_phase_status(&self, phase: &str, status: PhaseStatus) {
        match status {
            PhaseStatus::Running => {
                let bar_style = ProgressStyle::default_spinner()
                    .template("  {spinner} {prefix:.bold} {msg} {elapsed:.dim}")
                    .expect("progress bar template is a valid static string");
                let bar = self.multi.add(ProgressBar::new_spinner());
                bar.set_style(bar_style);
                bar.set_prefix(format!("[{}]", phase));
                bar.set_message(format!("{}running", RUNNING));
                bar.enable_steady_tick(Duration::from_millis(100));
                if let Some(previous) = self.bars().insert(phase.to_string(), bar) {
                    previous.finish_and_clear();
                }
                self.header_bar.set_message(format!("{} running", phase));
            }
            PhaseStatus::Completed => {
                if let Some(bar) = self.bars().remove(phase) {
                    bar.finish_with_message(format!("{}complete", CHECK));
                } else {
                    self.println(format!(
                        "  {} Phase {} {}",
                        CHECK,
                        style(phase).green().bold(),
                        style("approved").green()
                    ));
                }
                self.header_bar.inc(1);
            }
            PhaseStatus::Failed => {
                if let Some(bar) = self.bars().remove(phase) {
                    bar.finish_with_message(format!("{}{}", CROSS, style("failed").red()));
                }
            }
            PhaseStatus::AwaitingApproval => {
                let line = format!(
                    "  {} Phase {} {}",
                    REVIEW,
                    style(phase).yellow().bold(),
                    style("awaiting approval").yellow()
                );
                match self.bars().remove(phase) {
                    Some(bar) => bar.finish_with_message(format!(
                        "{}{}",
                        REVIEW,
                        style("awaiting approval").yellow()
                    )),
                    None => self.println(line),
                }
            }
            PhaseStatus::Ready if self.verbose => {
                self.println(format!("  {} Phase {} ready", WAVE, style(phase).cyan()));
            }
            _ => {}
        }
    }

    fn on_phase_output(&self, phase: &str, output: &Value) {
        if !self.verbose {
            return;
        }
        let keys: Vec<&str> = output
            .as_object()
            .map(|o| o.keys().map(String::as_str).collect())
            .unwrap_or_default();
        self.println(format!(
            "    {} output: {}",
            style(phase).dim(),
            style(keys.join(", ")).dim()
        ));
    }

    /// Print the execution plan before the run starts.
    pub fn print_plan(&self, waves: &[Vec<String>]) {
        if self.mode != UiMode::Full {
            return;
        }

        self.println(format!("\n{} Campaign plan", style("═".repeat(60)).cyan()));
        for (i, wave) in waves.iter().enumerate() {
            let parallel = if wave.len() > 1 {
                format!(" {}", style("(parallel)").dim())
            } else {
                String::new()
            };
            self.println(format!(
                "  Wave {}: [{}]{}",
                style(i).cyan(),
                style(wave.join(", ")).yellow(),
                parallel
            ));
        }
        self.println(format!("{}\n", style("═".repeat(60)).cyan()));
    }

    /// Print the end-of-run summary, whatever the outcome.
    pub fn print_summary(&self, state: &CampaignState, metrics: &CampaignMetrics, success: bool) {
        for (_, bar) in self.bars().drain() {
            bar.finish_and_clear();
        }
        if !self.header_bar.is_finished() {
            self.header_bar.finish_and_clear();
        }

        match self.mode {
            UiMode::Json => {
                let summary = json!({
                    "type": "summary",
                    "success": success,
                    "campaign_id": state.campaign_id,
                    "metrics": metrics,
                });
                let _ = writeln!(&self.term, "{}", summary);
            }
            UiMode::Minimal => {
                self.println(format!(
                    "{} {}/{} completed, {} failed, {} awaiting approval ({})",
                    if success { "✓" } else { "✗" },
                    metrics.completed,
                    metrics.total_phases,
                    metrics.failed,
                    metrics.awaiting_approval,
                    format_duration(Duration::from_millis(metrics.total_duration_ms))
                ));
            }
            UiMode::Full => {
                self.println(format!("\n{}", style("═".repeat(60)).cyan()));
                if success {
                    self.println(format!(
                        "{} Campaign {} {}",
                        SPARKLE,
                        style("COMPLETE").green().bold(),
                        SPARKLE
                    ));
                } else {
                    self.println(format!(
                        "{} Campaign {}",
                        WARN,
                        style("INCOMPLETE").yellow().bold()
                    ));
                }
                self.println(format!("{}", style("═".repeat(60)).cyan()));
                self.println(format!(
                    "{}Phases: {}/{} completed",
                    CLOCK,
                    style(metrics.completed).green().bold(),
                    metrics.total_phases
                ));
                if metrics.failed > 0 {
                    self.println(format!("   {} failed", style(metrics.failed).red().bold()));
                }
                if metrics.awaiting_approval > 0 {
                    self.println(format!(
                        "   {} awaiting approval: {}",
                        style(metrics.awaiting_approval).yellow().bold(),
                        state
                            .awaiting_human_approval
                            .iter()
                            .cloned()
                            .collect::<Vec<_>>()
                            .join(", ")
                    ));
                }
                self.println(format!(
                    "   Duration: {}",
                    style(format_duration(Duration::from_millis(metrics.total_duration_ms)))
                        .cyan()
                ));

                if self.verbose {
                    self.println(format!("\n{}", style("Phase breakdown:").underlined()));
                    for (phase, status) in &state.status_by_phase {
                        self.println(format!(
                            "  {} {} (tries: {})",
                            status_label(*status),
                            phase,
                            state.tries(phase)
                        ));
                    }
                }
                self.println(String::new());
            }
        }
    }
}

#[async_trait]
impl EventSink for CampaignUI {
    async fn on_phase_status(&self, phase_id: &str, status: PhaseStatus) -> Result<()> {
        self.handle_event(&CampaignEvent::PhaseStatus {
            phase: phase_id.to_string(),
            status,
        });
        Ok(())
    }

    async fn on_phase_output(&self, phase_id: &str, output: &Value) -> Result<()> {
        self.handle_event(&CampaignEvent::PhaseOutput {
            phase: phase_id.to_string(),
            output: output.clone(),
        });
        Ok(())
    }

    async fn on_phase_error(&self, phase_id: &str, error: &str) -> Result<()> {
        self.handle_event(&CampaignEvent::PhaseError {
            phase: phase_id.to_string(),
            error: error.to_string(),
        });
        Ok(())
    }

    async fn on_all_done(&self, state: &CampaignState) -> Result<()> {
        self.handle_event(&CampaignEvent::AllDone {
            state: Box::new(state.clone()),
        });
        Ok(())
    }
}

/// Colored fixed-width label for a phase status.
pub fn status_label(status: PhaseStatus) -> StyledObject<String> {
    let label = format!("{:<17}", status.to_string());
    match status {
        PhaseStatus::Completed => style(label).green(),
        PhaseStatus::Failed => style(label).red(),
        PhaseStatus::AwaitingApproval => style(label).yellow(),
        PhaseStatus::Running => style(label).cyan(),
        PhaseStatus::Ready => style(label).blue(),
        PhaseStatus::Pending | PhaseStatus::Skipped => style(label).dim(),
    }
}

pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 3600 {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs > 0 {
        format!("{}s", secs)
    } else {
        format!("{}ms", d.as_millis())
    }
}
