//! Campaign configuration from `.campaign/campaign.toml`.
//!
//! Settings are layered file → environment → CLI. Phase overrides match phase
//! ids with glob patterns and only fill values the playbook leaves unset.
//!
//! # Configuration File Format
//!
//! ```toml
//! [campaign]
//! mode = "semi_auto"
//! campaign_id = "spring-launch"
//!
//! [scheduler]
//! concurrency = 3
//! pause_poll_ms = 1000
//! approval_wait_ms = 0
//!
//! [retry]
//! base_delay_ms = 1000
//! max_delay_ms = 10000
//!
//! [defaults]
//! max_retries = 1
//! timeout_ms = 60000
//!
//! [phases.overrides."video*"]
//! max_retries = 3
//! timeout_ms = 180000
//!
//! [logging]
//! dir = ".campaign/logs"
//! level = "info"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::campaign::Mode;
use crate::dag::{
    DEFAULT_CONCURRENCY, DEFAULT_PAUSE_POLL_MS, DEFAULT_RETRY_BASE_MS, DEFAULT_RETRY_MAX_MS,
    DEFAULT_TIMEOUT_MS, RetryPolicy, SchedulerConfig,
};
use crate::phase::{DEFAULT_MAX_RETRIES, Playbook};

/// Directory holding configuration, state and logs inside a project.
pub const CAMPAIGN_DIR: &str = ".campaign";
pub const CONFIG_FILE: &str = "campaign.toml";

pub const ENV_MODE: &str = "CAMPAIGN_MODE";
pub const ENV_CONCURRENCY: &str = "CAMPAIGN_CONCURRENCY";

pub fn get_campaign_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(CAMPAIGN_DIR)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CampaignSection {
    #[serde(default)]
    pub mode: Mode,
    /// Defaults to the project directory name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,
    /// Playbook file; the built-in playbook when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playbook: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSection {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_pause_poll_ms")]
    pub pause_poll_ms: u64,
    #[serde(default)]
    pub approval_wait_ms: u64,
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_pause_poll_ms() -> u64 {
    DEFAULT_PAUSE_POLL_MS
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            pause_poll_ms: default_pause_poll_ms(),
            approval_wait_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_base_delay_ms() -> u64 {
    DEFAULT_RETRY_BASE_MS
}

fn default_max_delay_ms() -> u64 {
    DEFAULT_RETRY_MAX_MS
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsSection {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Values applied to phases whose id matches the pattern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhasesSection {
    #[serde(default)]
    pub overrides: BTreeMap<String, PhaseOverride>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Directory for the rolling JSON log; no file log when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    /// Default filter directive when RUST_LOG is unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

/// Contents of `campaign.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CampaignToml {
    #[serde(default)]
    pub campaign: CampaignSection,
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub defaults: DefaultsSection,
    #[serde(default)]
    pub phases: PhasesSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Resolved per-phase settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseSettings {
    pub max_retries: u32,
    pub timeout_ms: u64,
}

impl CampaignToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid campaign.toml")
    }

    pub fn load_or_default(campaign_dir: &Path) -> Result<Self> {
        let config_path = campaign_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize campaign.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig::default()
            .with_concurrency(self.scheduler.concurrency)
            .with_pause_poll_interval(Duration::from_millis(self.scheduler.pause_poll_ms))
            .with_approval_wait(Duration::from_millis(self.scheduler.approval_wait_ms))
            .with_default_timeout(Duration::from_millis(self.defaults.timeout_ms))
            .with_retry(RetryPolicy::new(
                Duration::from_millis(self.retry.base_delay_ms),
                Duration::from_millis(self.retry.max_delay_ms),
            ))
    }

    /// Defaults with every matching override applied, in pattern order.
    pub fn phase_settings(&self, phase_id: &str) -> PhaseSettings {
        let mut settings = PhaseSettings {
            max_retries: self.defaults.max_retries,
            timeout_ms: self.defaults.timeout_ms,
        };

        for (pattern, override_cfg) in &self.phases.overrides {
            if pattern_matches(pattern, phase_id) {
                if let Some(max_retries) = override_cfg.max_retries {
                    settings.max_retries = max_retries;
                }
                if let Some(timeout_ms) = override_cfg.timeout_ms {
                    settings.timeout_ms = timeout_ms;
                }
            }
        }

        settings
    }

    /// Fill `max_retries` and `timeout_ms` on phases that leave them unset.
    pub fn apply_to_playbook(&self, playbook: &mut Playbook) {
        for phase in playbook.phases_mut() {
            let settings = self.phase_settings(&phase.id);
            phase.max_retries.get_or_insert(settings.max_retries);
            phase.timeout_ms.get_or_insert(settings.timeout_ms);
        }
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.scheduler.concurrency == 0 {
            warnings.push("scheduler.concurrency is 0; one phase will run at a time".to_string());
        }
        if self.defaults.max_retries == 0 {
            warnings.push("defaults.max_retries is 0; phases still get one attempt".to_string());
        }
        if self.defaults.timeout_ms == 0 {
            warnings.push("defaults.timeout_ms is 0; every attempt will time out".to_string());
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            warnings.push(format!(
                "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({}); every delay is capped",
                self.retry.base_delay_ms, self.retry.max_delay_ms
            ));
        }

        for (pattern, override_cfg) in &self.phases.overrides {
            if pattern.trim().is_empty() {
                warnings.push("Empty pattern in [phases.overrides]".to_string());
            }
            if override_cfg.timeout_ms == Some(0) {
                warnings.push(format!(
                    "timeout_ms = 0 in override for pattern '{}'",
                    pattern
                ));
            }
        }

        warnings
    }
}

/// Environment overrides, read through `lookup`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub mode: Option<Mode>,
    pub concurrency: Option<usize>,
}

impl EnvOverrides {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mode = lookup(ENV_MODE)
            .map(|v| v.parse::<Mode>())
            .transpose()
            .with_context(|| format!("Invalid {}", ENV_MODE))?;
        let concurrency = lookup(ENV_CONCURRENCY)
            .map(|v| v.trim().parse::<usize>())
            .transpose()
            .with_context(|| format!("Invalid {}", ENV_CONCURRENCY))?;
        Ok(Self { mode, concurrency })
    }
}

/// Configuration for one project directory: file, environment and CLI merged.
#[derive(Debug, Clone)]
pub struct CampaignConfig {
    pub project_dir: PathBuf,
    pub campaign_dir: PathBuf,
    pub toml: CampaignToml,
    pub env: EnvOverrides,
    pub cli_mode: Option<Mode>,
    pub cli_concurrency: Option<usize>,
}

impl CampaignConfig {
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        Self::with_env(project_dir, EnvOverrides::from_env()?)
    }

    pub fn with_env(project_dir: PathBuf, env: EnvOverrides) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let campaign_dir = get_campaign_dir(&project_dir);
        let toml = CampaignToml::load_or_default(&campaign_dir)?;

        Ok(Self {
            project_dir,
            campaign_dir,
            toml,
            env,
            cli_mode: None,
            cli_concurrency: None,
        })
    }

    pub fn with_cli_overrides(mut self, mode: Option<Mode>, concurrency: Option<usize>) -> Self {
        self.cli_mode = mode;
        self.cli_concurrency = concurrency;
        self
    }

    /// Mode (CLI → env → file).
    pub fn mode(&self) -> Mode {
        self.cli_mode
            .or(self.env.mode)
            .unwrap_or(self.toml.campaign.mode)
    }

    /// Concurrency (CLI → env → file).
    pub fn concurrency(&self) -> usize {
        self.cli_concurrency
            .or(self.env.concurrency)
            .unwrap_or(self.toml.scheduler.concurrency)
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        self.toml
            .scheduler_config()
            .with_concurrency(self.concurrency())
    }

    pub fn campaign_id(&self) -> String {
        self.toml.campaign.campaign_id.clone().unwrap_or_else(|| {
            self.project_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "campaign".to_string())
        })
    }

    /// Configured playbook path, resolved against the project directory.
    pub fn playbook_path(&self) -> Option<PathBuf> {
        self.toml
            .campaign
            .playbook
            .as_ref()
            .map(|p| self.project_dir.join(p))
    }

    pub fn config_file(&self) -> PathBuf {
        self.campaign_dir.join(CONFIG_FILE)
    }

    pub fn state_file(&self) -> PathBuf {
        self.campaign_dir.join("state.json")
    }

    pub fn timeline_file(&self) -> PathBuf {
        self.campaign_dir.join("timeline.json")
    }

    pub fn log_dir(&self) -> Option<PathBuf> {
        self.toml
            .logging
            .dir
            .as_ref()
            .map(|d| self.project_dir.join(d))
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}

/// Case-insensitive glob match of a phase id (`*` and `?` wildcards).
pub fn pattern_matches(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
    let name: Vec<char> = name.to_lowercase().chars().collect();
    glob_match(&pattern, &name)
}

fn glob_match(pattern: &[char], text: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some(('*', rest)) => (0..=text.len()).any(|i| glob_match(rest, &text[i..])),
        Some(('?', rest)) => !text.is_empty() && glob_match(rest, &text[1..]),
        Some((c, rest)) => text.first() == Some(c) && glob_match(rest, &text[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::{PhaseDefinition, default_playbook};
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let toml = CampaignToml::default();
        assert_eq!(toml.campaign.mode, Mode::Guided);
        assert_eq!(toml.scheduler.concurrency, 3);
        assert_eq!(toml.retry.base_delay_ms, 1000);
        assert_eq!(toml.retry.max_delay_ms, 10000);
        assert_eq!(toml.defaults.max_retries, 1);
        assert_eq!(toml.defaults.timeout_ms, 60000);
        assert!(toml.validate().is_empty());
    }

    #[test]
    fn test_parse_partial_file() {
        let toml = CampaignToml::parse(
            r#"
[campaign]
mode = "auto"

[scheduler]
concurrency = 5

[phases.overrides."video*"]
max_retries = 3
"#,
        )
        .unwrap();
        assert_eq!(toml.campaign.mode, Mode::Auto);
        assert_eq!(toml.scheduler.concurrency, 5);
        assert_eq!(toml.scheduler.pause_poll_ms, 1000);
        assert_eq!(toml.defaults.timeout_ms, 60000);
        assert_eq!(toml.phases.overrides["video*"].max_retries, Some(3));
    }

    #[test]
    fn test_parse_rejects_unknown_mode() {
        let err = CampaignToml::parse("[campaign]\nmode = \"yolo\"\n").unwrap_err();
        assert!(format!("{err:#}").contains("Invalid campaign.toml"));
    }

    #[test]
    fn test_scheduler_config_from_file() {
        let mut toml = CampaignToml::default();
        toml.scheduler.concurrency = 2;
        toml.retry.base_delay_ms = 10;
        toml.defaults.timeout_ms = 500;
        let config = toml.scheduler_config();
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.retry.delay_for(0), Duration::from_millis(10));
        assert_eq!(config.default_timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_phase_settings_with_overrides() {
        let toml = CampaignToml::parse(
            r#"
[defaults]
max_retries = 2

[phases.overrides."vid*"]
timeout_ms = 180000

[phases.overrides."video"]
max_retries = 4
"#,
        )
        .unwrap();

        let video = toml.phase_settings("VIDEO");
        assert_eq!(video.max_retries, 4);
        assert_eq!(video.timeout_ms, 180000);

        let seo = toml.phase_settings("seo");
        assert_eq!(seo.max_retries, 2);
        assert_eq!(seo.timeout_ms, 60000);
    }

    #[test]
    fn test_apply_to_playbook_fills_unset_only() {
        let toml = CampaignToml::parse("[defaults]\nmax_retries = 3\ntimeout_ms = 100\n").unwrap();
        let mut playbook = Playbook::new(
            "t",
            vec![
                PhaseDefinition::new("a", "x"),
                PhaseDefinition::new("b", "x").with_max_retries(1).with_timeout_ms(5),
            ],
        );
        toml.apply_to_playbook(&mut playbook);

        let a = playbook.get("a").unwrap();
        assert_eq!((a.max_retries, a.timeout_ms), (Some(3), Some(100)));
        let b = playbook.get("b").unwrap();
        assert_eq!((b.max_retries, b.timeout_ms), (Some(1), Some(5)));
    }

    #[test]
    fn test_validate_warnings() {
        let mut toml = CampaignToml::default();
        toml.scheduler.concurrency = 0;
        toml.retry.base_delay_ms = 20000;
        toml.phases
            .overrides
            .insert(" ".to_string(), PhaseOverride::default());
        let warnings = toml.validate();
        assert_eq!(warnings.len(), 3, "{warnings:?}");
    }

    #[test]
    fn test_env_overrides() {
        let env = EnvOverrides::from_lookup(|key| match key {
            ENV_MODE => Some("semi_auto".to_string()),
            ENV_CONCURRENCY => Some(" 6 ".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(env.mode, Some(Mode::SemiAuto));
        assert_eq!(env.concurrency, Some(6));

        assert!(EnvOverrides::from_lookup(|_| Some("many".to_string())).is_err());
        assert_eq!(EnvOverrides::from_lookup(|_| None).unwrap(), EnvOverrides::default());
    }

    #[test]
    fn test_layering_cli_over_env_over_file() {
        let dir = tempdir().unwrap();
        let campaign_dir = get_campaign_dir(dir.path());
        std::fs::create_dir_all(&campaign_dir).unwrap();
        std::fs::write(
            campaign_dir.join(CONFIG_FILE),
            "[campaign]\nmode = \"auto\"\ncampaign_id = \"launch\"\n[scheduler]\nconcurrency = 4\n",
        )
        .unwrap();

        let config = CampaignConfig::with_env(dir.path().to_path_buf(), EnvOverrides::default())
            .unwrap();
        assert_eq!(config.mode(), Mode::Auto);
        assert_eq!(config.concurrency(), 4);
        assert_eq!(config.campaign_id(), "launch");

        let env = EnvOverrides {
            mode: Some(Mode::Guided),
            concurrency: Some(2),
        };
        let config = CampaignConfig::with_env(dir.path().to_path_buf(), env)
            .unwrap()
            .with_cli_overrides(None, Some(1));
        assert_eq!(config.mode(), Mode::Guided);
        assert_eq!(config.concurrency(), 1);
        assert_eq!(config.scheduler_config().concurrency, 1);
    }

    #[test]
    fn test_paths_and_default_campaign_id() {
        let dir = tempdir().unwrap();
        let config =
            CampaignConfig::with_env(dir.path().to_path_buf(), EnvOverrides::default()).unwrap();
        assert!(config.state_file().ends_with(".campaign/state.json"));
        assert!(config.timeline_file().ends_with(".campaign/timeline.json"));
        assert!(config.log_dir().is_none());
        assert!(config.playbook_path().is_none());
        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(
            config.campaign_id(),
            expected.file_name().unwrap().to_string_lossy()
        );
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let mut toml = CampaignToml::default();
        toml.campaign.campaign_id = Some("x".into());
        toml.phases.overrides.insert(
            "seo".into(),
            PhaseOverride {
                max_retries: Some(2),
                timeout_ms: None,
            },
        );
        toml.save(&path).unwrap();
        let loaded = CampaignToml::load(&path).unwrap();
        assert_eq!(loaded.campaign.campaign_id.as_deref(), Some("x"));
        assert_eq!(loaded.phases.overrides["seo"].max_retries, Some(2));
    }

    #[test]
    fn test_pattern_matches() {
        assert!(pattern_matches("*", "anything"));
        assert!(pattern_matches("video*", "video-shorts"));
        assert!(pattern_matches("SEO", "seo"));
        assert!(pattern_matches("c?py", "copy"));
        assert!(pattern_matches("*-final", "draft-final"));
        assert!(pattern_matches("stratégie*", "Stratégie-v2"));
        assert!(!pattern_matches("video*", "visuals"));
        assert!(!pattern_matches("c?py", "cpy"));
        assert!(!pattern_matches("seo", "seo-audit"));
    }

    #[test]
    fn test_default_playbook_takes_overrides() {
        let toml = CampaignToml::parse("[phases.overrides.\"video\"]\nmax_retries = 5\n").unwrap();
        let mut playbook = default_playbook();
        toml.apply_to_playbook(&mut playbook);
        assert_eq!(playbook.get("video").unwrap().max_attempts(), 5);
        assert_eq!(playbook.get("seo").unwrap().max_attempts(), 1);
    }
}
