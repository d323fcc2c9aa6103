//! Integration tests for the `campaign` CLI.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use campaign_orchestrator::campaign::{CampaignState, Mode, PhaseStatus};
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn campaign(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("campaign");
    cmd.current_dir(dir.path())
        .env_remove("CAMPAIGN_MODE")
        .env_remove("CAMPAIGN_CONCURRENCY")
        .env_remove("RUST_LOG");
    cmd
}

fn create_temp_project() -> TempDir {
    TempDir::new().unwrap()
}

/// Context file with every input the built-in briefing asks for.
fn write_brief(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("brief.json");
    fs::write(
        &path,
        r#"{
  "brandProfile": "Nordic outdoor apparel",
  "goals": "Grow newsletter signups 20%",
  "persona": "Weekend hikers, 25-40",
  "budget": 15000,
  "timeline": "6 weeks"
}"#,
    )
    .unwrap();
    path
}

fn saved_state(dir: &TempDir) -> CampaignState {
    CampaignState::load(&dir.path().join(".campaign/state.json")).unwrap()
}

mod cli_basics {
    use super::*;

    #[test]
    fn test_campaign_help() {
        let dir = create_temp_project();
        campaign(&dir)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("approve"));
    }

    #[test]
    fn test_campaign_version() {
        let dir = create_temp_project();
        campaign(&dir).arg("--version").assert().success();
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        let dir = create_temp_project();
        campaign(&dir)
            .args(["run", "--mode", "reckless"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid mode"));
    }
}

mod plan {
    use super::*;

    #[test]
    fn test_plan_prints_default_waves() {
        let dir = create_temp_project();
        campaign(&dir)
            .arg("plan")
            .assert()
            .success()
            .stdout(predicate::str::contains("11 phases in 8 waves"))
            .stdout(predicate::str::contains("briefing"))
            .stdout(predicate::str::contains("after seo, scriptwriting"));
    }

    #[test]
    fn test_plan_rejects_cyclic_playbook() {
        let dir = create_temp_project();
        let path = dir.path().join("loop.yaml");
        fs::write(
            &path,
            r#"
name: loop
phases:
  - id: a
    agent_id: x
    depends_on: [b]
  - id: b
    agent_id: x
    depends_on: [a]
"#,
        )
        .unwrap();

        campaign(&dir)
            .args(["plan", "--playbook"])
            .arg(&path)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Cycle detected"));
    }
}

mod run {
    use super::*;

    #[test]
    fn test_auto_run_completes_and_persists() {
        let dir = create_temp_project();
        let brief = write_brief(&dir);

        campaign(&dir)
            .args(["run", "--mode", "auto", "--ui", "minimal", "--context"])
            .arg(&brief)
            .assert()
            .success()
            .stdout(predicate::str::contains("✓ analytics"));

        let state = saved_state(&dir);
        assert_eq!(state.mode, Mode::Auto);
        assert!(state.all_completed());
        assert_eq!(state.status_by_phase.len(), 11);
        assert!(state.context.contains_key("liveCampaign"));
        assert!(dir.path().join(".campaign/timeline.json").exists());
    }

    #[test]
    fn test_json_ui_streams_events() {
        let dir = create_temp_project();
        let brief = write_brief(&dir);

        campaign(&dir)
            .args(["run", "--mode", "auto", "--ui", "json", "--context"])
            .arg(&brief)
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""type":"phase_status""#))
            .stdout(predicate::str::contains(r#""type":"all_done""#))
            .stdout(predicate::str::contains(r#""type":"summary""#));
    }

    #[test]
    fn test_guided_run_stops_for_approval() {
        let dir = create_temp_project();
        let brief = write_brief(&dir);

        campaign(&dir)
            .args(["run", "--ui", "minimal", "--context"])
            .arg(&brief)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Campaign stalled"));

        let state = saved_state(&dir);
        assert_eq!(state.mode, Mode::Guided);
        assert_eq!(state.status("briefing"), PhaseStatus::AwaitingApproval);
        assert!(state.is_awaiting("briefing"));
        assert_eq!(state.status("research"), PhaseStatus::Pending);
    }

    #[test]
    fn test_missing_inputs_are_reported_without_attempt() {
        let dir = create_temp_project();

        campaign(&dir)
            .args(["run", "--mode", "auto", "--ui", "minimal"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("failed phases [briefing]"));

        let state = saved_state(&dir);
        assert_eq!(state.status("briefing"), PhaseStatus::Failed);
        assert_eq!(state.tries("briefing"), 0);
    }

    #[test]
    fn test_mode_from_environment() {
        let dir = create_temp_project();
        let brief = write_brief(&dir);

        campaign(&dir)
            .env("CAMPAIGN_MODE", "auto")
            .args(["run", "--ui", "minimal", "--context"])
            .arg(&brief)
            .assert()
            .success();

        assert_eq!(saved_state(&dir).mode, Mode::Auto);
    }

    #[test]
    fn test_invalid_concurrency_env_fails() {
        let dir = create_temp_project();
        campaign(&dir)
            .env("CAMPAIGN_CONCURRENCY", "lots")
            .args(["run", "--ui", "minimal"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("CAMPAIGN_CONCURRENCY"));
    }

    #[test]
    fn test_resume_after_approval() {
        let dir = create_temp_project();
        let brief = write_brief(&dir);

        campaign(&dir)
            .args(["run", "--ui", "minimal", "--context"])
            .arg(&brief)
            .assert()
            .failure();

        campaign(&dir)
            .args(["approve", "briefing"])
            .assert()
            .success();

        campaign(&dir)
            .args(["run", "--ui", "minimal"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("awaiting approval [research]"));

        let state = saved_state(&dir);
        assert_eq!(state.status("briefing"), PhaseStatus::Completed);
        assert_eq!(state.status("research"), PhaseStatus::AwaitingApproval);
        assert_eq!(state.tries("briefing"), 1);
    }
}

mod gate {
    use super::*;

    fn stalled_project() -> TempDir {
        let dir = create_temp_project();
        let brief = write_brief(&dir);
        campaign(&dir)
            .args(["run", "--ui", "minimal", "--context"])
            .arg(&brief)
            .assert()
            .failure();
        dir
    }

    #[test]
    fn test_approve_unlocks_dependents() {
        let dir = stalled_project();

        campaign(&dir)
            .args(["approve", "briefing", "--data", r#"{"tone": "playful"}"#])
            .assert()
            .success()
            .stdout(predicate::str::contains("Approved briefing"))
            .stdout(predicate::str::contains("research is now ready"));

        let state = saved_state(&dir);
        assert_eq!(state.status("briefing"), PhaseStatus::Completed);
        assert_eq!(state.status("research"), PhaseStatus::Ready);
        assert_eq!(state.context["tone"], "playful");
    }

    #[test]
    fn test_approve_twice_is_noop() {
        let dir = stalled_project();
        campaign(&dir).args(["approve", "briefing"]).assert().success();
        let before = saved_state(&dir);

        campaign(&dir)
            .args(["approve", "briefing"])
            .assert()
            .success()
            .stdout(predicate::str::contains("nothing to do"));
        assert_eq!(saved_state(&dir), before);
    }

    #[test]
    fn test_approve_rejects_non_object_data() {
        let dir = stalled_project();
        campaign(&dir)
            .args(["approve", "briefing", "--data", "[1, 2]"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--data must be a JSON object"));
    }

    #[test]
    fn test_reject_makes_phase_ready_again() {
        let dir = stalled_project();
        campaign(&dir)
            .args(["reject", "briefing", "--reason", "wrong persona"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Rejected briefing"));

        let state = saved_state(&dir);
        assert_eq!(state.status("briefing"), PhaseStatus::Ready);
        assert!(!state.is_awaiting("briefing"));
    }

    #[test]
    fn test_approve_without_state_fails() {
        let dir = create_temp_project();
        campaign(&dir)
            .args(["approve", "briefing"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No campaign state found"));
    }

    #[test]
    fn test_review_with_nothing_awaiting() {
        let dir = create_temp_project();
        let brief = write_brief(&dir);
        campaign(&dir)
            .args(["run", "--mode", "auto", "--ui", "minimal", "--context"])
            .arg(&brief)
            .assert()
            .success();

        campaign(&dir)
            .arg("review")
            .assert()
            .success()
            .stdout(predicate::str::contains("Nothing is awaiting approval."));
    }
}

mod status {
    use super::*;

    #[test]
    fn test_status_without_state() {
        let dir = create_temp_project();
        campaign(&dir)
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("No campaign state found"));
    }

    #[test]
    fn test_status_lists_phases_and_awaiting() {
        let dir = create_temp_project();
        let brief = write_brief(&dir);
        campaign(&dir)
            .args(["run", "--ui", "minimal", "--context"])
            .arg(&brief)
            .assert()
            .failure();

        campaign(&dir)
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("guided mode"))
            .stdout(predicate::str::contains("distribution"))
            .stdout(predicate::str::contains("Awaiting approval: briefing"));
    }
}

mod config {
    use super::*;

    #[test]
    fn test_config_init_creates_file() {
        let dir = create_temp_project();
        campaign(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created campaign.toml"));

        let content = fs::read_to_string(dir.path().join(".campaign/campaign.toml")).unwrap();
        assert!(content.contains("concurrency = 3"));

        campaign(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn test_config_validate_reports_warnings() {
        let dir = create_temp_project();
        fs::create_dir_all(dir.path().join(".campaign")).unwrap();
        fs::write(
            dir.path().join(".campaign/campaign.toml"),
            "[scheduler]\nconcurrency = 0\n",
        )
        .unwrap();

        campaign(&dir)
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration warnings"))
            .stdout(predicate::str::contains("scheduler.concurrency is 0"));
    }

    #[test]
    fn test_config_show_reports_effective_mode() {
        let dir = create_temp_project();
        campaign(&dir)
            .env("CAMPAIGN_MODE", "semi-auto")
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("mode = \"semi_auto\""));
    }

    #[test]
    fn test_config_mode_applies_to_new_runs() {
        let dir = create_temp_project();
        let brief = write_brief(&dir);
        fs::create_dir_all(dir.path().join(".campaign")).unwrap();
        fs::write(
            dir.path().join(".campaign/campaign.toml"),
            "[campaign]\nmode = \"auto\"\ncampaign_id = \"spring\"\n",
        )
        .unwrap();

        campaign(&dir)
            .args(["run", "--ui", "minimal", "--context"])
            .arg(&brief)
            .assert()
            .success();

        let state = saved_state(&dir);
        assert_eq!(state.campaign_id, "spring");
        assert!(state.all_completed());
    }
}
