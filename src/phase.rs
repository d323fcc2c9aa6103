//! Phase definitions and playbook loading.
//!
//! This module provides:
//! - `PhaseDefinition`, one unit of campaign work bound to an agent
//! - `ValidationPolicy`, whether a phase output waits for a human
//! - `Playbook`, the ordered phase set, loadable from JSON or YAML
//! - `default_playbook()`, the built-in marketing pipeline

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Attempt budget for phases that do not set `max_retries`.
pub const DEFAULT_MAX_RETRIES: u32 = 1;

/// Agent id of the human operator.
pub const HUMAN_AGENT: &str = "Human";

/// Whether a successful phase output must be reviewed by a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationPolicy {
    /// Always reviewed
    Required,
    /// Reviewed unless the campaign runs in `auto` mode (default)
    #[default]
    ModeDependent,
    /// Never reviewed
    #[serde(alias = "skippable")]
    Optional,
}

impl std::fmt::Display for ValidationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationPolicy::Required => write!(f, "required"),
            ValidationPolicy::ModeDependent => write!(f, "mode_dependent"),
            ValidationPolicy::Optional => write!(f, "optional"),
        }
    }
}

/// A single phase of a campaign playbook.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhaseDefinition {
    /// Unique identifier (e.g., "research")
    pub id: String,
    /// Human-readable name
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Agent that performs the phase
    pub agent_id: String,
    /// Phase ids that must be `completed` first
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Context keys that must exist before dispatch
    #[serde(default)]
    pub required_inputs: Vec<String>,
    /// Context key receiving the whole output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,
    /// Fields of an object output copied to context under their own names
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub publishes: Vec<String>,
    /// Attempts per dispatch (defaults to 1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    /// Per-attempt timeout in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Informational grouping tag, no scheduling effect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default)]
    pub validation: ValidationPolicy,
}

impl PhaseDefinition {
    pub fn new(id: &str, agent_id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            agent_id: agent_id.to_string(),
            depends_on: Vec::new(),
            required_inputs: Vec::new(),
            output_key: None,
            publishes: Vec::new(),
            max_retries: None,
            timeout_ms: None,
            group: None,
            validation: ValidationPolicy::default(),
        }
    }

    pub fn named(mut self, name: &str, description: &str) -> Self {
        self.name = name.to_string();
        self.description = description.to_string();
        self
    }

    pub fn depends_on(mut self, deps: &[&str]) -> Self {
        self.depends_on = deps.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn with_inputs(mut self, keys: &[&str]) -> Self {
        self.required_inputs = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_output_key(mut self, key: &str) -> Self {
        self.output_key = Some(key.to_string());
        self
    }

    pub fn with_publishes(mut self, keys: &[&str]) -> Self {
        self.publishes = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_group(mut self, group: &str) -> Self {
        self.group = Some(group.to_string());
        self
    }

    pub fn with_validation(mut self, validation: ValidationPolicy) -> Self {
        self.validation = validation;
        self
    }

    /// Attempts allowed per dispatch, never less than one.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES).max(1)
    }

    pub fn is_human(&self) -> bool {
        self.agent_id == HUMAN_AGENT
    }

    /// Every context key this phase writes on success.
    pub fn output_keys(&self) -> Vec<&str> {
        self.output_key
            .iter()
            .map(String::as_str)
            .chain(self.publishes.iter().map(String::as_str))
            .collect()
    }
}

/// Ordered set of phase definitions for one campaign type.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Playbook {
    #[serde(default)]
    pub name: String,
    pub phases: Vec<PhaseDefinition>,
}

impl Playbook {
    pub fn new(name: &str, phases: Vec<PhaseDefinition>) -> Self {
        Self {
            name: name.to_string(),
            phases,
        }
    }

    /// Load a playbook from a `.json`, `.yaml` or `.yml` file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read playbook: {}", path.display()))?;

        let playbook: Playbook = if is_yaml(path) {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse playbook YAML: {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse playbook JSON: {}", path.display()))?
        };

        Ok(playbook)
    }

    /// Save the playbook, picking the format from the file extension.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = if is_yaml(path) {
            serde_yaml::to_string(self).context("Failed to serialize playbook to YAML")?
        } else {
            serde_json::to_string_pretty(self).context("Failed to serialize playbook to JSON")?
        };

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write playbook: {}", path.display()))?;

        Ok(())
    }

    pub fn phases(&self) -> &[PhaseDefinition] {
        &self.phases
    }

    pub fn phases_mut(&mut self) -> &mut [PhaseDefinition] {
        &mut self.phases
    }

    pub fn get(&self, id: &str) -> Option<&PhaseDefinition> {
        self.phases.iter().find(|p| p.id == id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.phases.iter().map(|p| p.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Load the playbook at `path`, or the built-in one when no path is given.
pub fn load_playbook_or_default(path: Option<&Path>) -> Result<Playbook> {
    match path {
        Some(path) => Playbook::load(path),
        None => Ok(default_playbook()),
    }
}

/// The built-in marketing pipeline.
///
/// briefing → research → strategy → {scriptwriting, seo, copy} → {content, visuals}
/// → video → distribution → analytics
pub fn default_playbook() -> Playbook {
    use ValidationPolicy::{ModeDependent, Optional, Required};

    let phases = vec![
        PhaseDefinition::new("briefing", HUMAN_AGENT)
            .named("Briefing", "Collect brand, goals, persona, budget and timeline")
            .with_inputs(&["brandProfile", "goals", "persona", "budget", "timeline"])
            .with_output_key("briefContext")
            .with_validation(Required),
        PhaseDefinition::new("research", "MarketAnalyst")
            .named("Market research", "Analyse market, competitors and audience")
            .depends_on(&["briefing"])
            .with_inputs(&["briefContext"])
            .with_output_key("marketAnalysisReport")
            .with_validation(ModeDependent),
        PhaseDefinition::new("strategy", "CMO")
            .named("Strategy", "Positioning, channels and messaging strategy")
            .depends_on(&["research"])
            .with_inputs(&["briefContext", "marketAnalysisReport"])
            .with_output_key("strategyReport")
            .with_validation(ModeDependent),
        PhaseDefinition::new("scriptwriting", "Scriptwriter")
            .named("Scriptwriting", "Creative briefs and scripts")
            .depends_on(&["strategy"])
            .with_inputs(&["strategyReport"])
            .with_output_key("creativeBriefs")
            .with_group("production")
            .with_validation(ModeDependent),
        PhaseDefinition::new("seo", "SEO")
            .named("SEO", "Keywords, clusters and opportunities")
            .depends_on(&["strategy"])
            .with_inputs(&["briefContext", "strategyReport"])
            .with_publishes(&["keywordsList", "clusters", "seoOpportunities"])
            .with_group("production")
            .with_validation(ModeDependent),
        PhaseDefinition::new("copy", "Copywriter")
            .named("Copywriting", "Headlines, calls to action and channel copy")
            .depends_on(&["strategy"])
            .with_inputs(&["briefContext", "strategyReport"])
            .with_publishes(&["headlines", "ctaList", "copyByChannel"])
            .with_group("production")
            .with_validation(ModeDependent),
        PhaseDefinition::new("content", "ContentWriter")
            .named("Content", "Long-form article and A/B variants")
            .depends_on(&["seo", "scriptwriting"])
            .with_inputs(&["briefContext", "keywordsList", "creativeBriefs", "strategyReport"])
            .with_publishes(&["articleMarkdown", "metaDescription", "altTexts", "ABVariants"])
            .with_group("production")
            .with_validation(ModeDependent),
        PhaseDefinition::new("visuals", "Designer")
            .named("Visuals", "Key visuals for the campaign")
            .depends_on(&["copy", "scriptwriting"])
            .with_inputs(&["strategyReport", "headlines", "creativeBriefs"])
            .with_publishes(&["visuals", "validatedVisual"])
            .with_group("production")
            .with_validation(ModeDependent),
        PhaseDefinition::new("video", "VideoProducer")
            .named("Video", "Short-form videos from the validated visual")
            .depends_on(&["visuals"])
            .with_inputs(&["validatedVisual", "visuals", "creativeBriefs"])
            .with_output_key("videos")
            .with_group("production")
            .with_validation(ModeDependent),
        PhaseDefinition::new("distribution", "Social")
            .named("Distribution", "Schedule posts and launch the campaign")
            .depends_on(&["content", "visuals", "video"])
            .with_inputs(&["articleMarkdown", "headlines", "ctaList", "visuals", "videos"])
            .with_publishes(&["scheduledPosts", "liveCampaign"])
            .with_validation(ModeDependent),
        PhaseDefinition::new("analytics", "Analytics")
            .named("Analytics", "KPIs, insights and recommendations")
            .depends_on(&["distribution"])
            .with_inputs(&["liveCampaign", "goals"])
            .with_publishes(&["kpiTable", "insights", "recommendations"])
            .with_validation(Optional),
    ];

    Playbook::new("marketing-campaign", phases)
}
