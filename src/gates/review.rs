use anyhow::Result;
use console::style;
use dialoguer::{Input, Select, theme::ColorfulTheme};
use serde_json::Value;

use crate::phase::PhaseDefinition;

/// What a reviewer decided for one awaiting phase.
#[derive(Debug, Clone, PartialEq)]
pub enum ReviewDecision {
    Approved,
    Rejected { reason: Option<String> },
    Skipped,
    Quit,
}

/// Interactive terminal review of phases awaiting approval.
pub struct ReviewGate {
    preview_chars: usize,
}

impl Default for ReviewGate {
    fn default() -> Self {
        Self { preview_chars: 600 }
    }
}

impl ReviewGate {
    pub fn new(preview_chars: usize) -> Self {
        Self { preview_chars }
    }

    /// Show the phase and whatever it wrote to the context, then ask.
    pub fn review(
        &self,
        phase: &PhaseDefinition,
        tries: u32,
        outputs: &[(&str, Option<&Value>)],
    ) -> Result<ReviewDecision> {
        println!();
        println!(
            "{} {} {}",
            style("Review").bold().cyan(),
            style(&phase.id).bold(),
            style(format!("({}, agent {}, {} attempt(s))", phase.name, phase.agent_id, tries)).dim()
        );
        if !phase.description.is_empty() {
            println!("  {}", phase.description);
        }

        if outputs.is_empty() {
            println!("  {}", style("phase writes no context keys").dim());
        }
        for (key, value) in outputs {
            match value {
                Some(value) => println!("  {} {}", style(format!("{key}:")).bold(), self.preview(value)),
                None => println!("  {} {}", style(format!("{key}:")).bold(), style("<missing>").red()),
            }
        }

        let options = &[
            "Approve",
            "Reject and regenerate",
            "Skip for now",
            "Quit review",
        ];

        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("Decision")
            .items(options)
            .default(0)
            .interact()?;

        match selection {
            0 => Ok(ReviewDecision::Approved),
            1 => {
                let reason: String = Input::with_theme(&ColorfulTheme::default())
                    .with_prompt("Reason (optional)")
                    .allow_empty(true)
                    .interact_text()?;
                let reason = Some(reason.trim().to_string()).filter(|r| !r.is_empty());
                Ok(ReviewDecision::Rejected { reason })
            }
            2 => Ok(ReviewDecision::Skipped),
            _ => Ok(ReviewDecision::Quit),
        }
    }

    fn preview(&self, value: &Value) -> String {
        let text = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        truncate(&text, self.preview_chars)
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{cut}…")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("stratégie", 20), "stratégie");
        assert_eq!(truncate("stratégie", 6), "straté…");
    }

    #[test]
    fn test_preview_unquotes_strings() {
        let gate = ReviewGate::new(10);
        assert_eq!(gate.preview(&json!("plain text")), "plain text");
        assert_eq!(gate.preview(&json!({"a": 1})), r#"{"a":1}"#);
    }
}
