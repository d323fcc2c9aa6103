use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use std::time::Duration;

use super::AgentAdapter;
use crate::campaign::Context;
use crate::phase::PhaseDefinition;

/// Placeholder agent producing a canned output after a fixed delay.
///
/// The output carries every key the phase publishes, so downstream phases of
/// a playbook find their required inputs.
#[derive(Debug, Clone, Default)]
pub struct SimulatedAgent {
    delay: Duration,
}

impl SimulatedAgent {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl AgentAdapter for SimulatedAgent {
    async fn execute(&self, phase: &PhaseDefinition, context: &Context) -> Result<Value> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let inputs: Vec<&str> = phase
            .required_inputs
            .iter()
            .filter(|key| context.contains_key(key.as_str()))
            .map(String::as_str)
            .collect();

        let mut output = json!({
            "phaseId": phase.id,
            "agentId": phase.agent_id,
            "timestamp": Utc::now().to_rfc3339(),
            "result": format!("Simulated output of {}", phase.name),
            "metadata": {
                "simulated": true,
                "inputs": inputs,
            },
        });

        if let Some(object) = output.as_object_mut() {
            for key in &phase.publishes {
                object.insert(key.clone(), json!(format!("{} ({})", key, phase.id)));
            }
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_output_carries_published_keys() {
        let phase = PhaseDefinition::new("copy", "Copywriter")
            .with_inputs(&["strategyReport", "briefContext"])
            .with_publishes(&["headlines", "ctaList"]);
        let mut context = Context::new();
        context.insert("strategyReport".into(), json!("plan"));

        let output = SimulatedAgent::default().execute(&phase, &context).await.unwrap();

        assert_eq!(output["phaseId"], "copy");
        assert_eq!(output["agentId"], "Copywriter");
        assert_eq!(output["metadata"]["inputs"], json!(["strategyReport"]));
        assert_eq!(output["headlines"], "headlines (copy)");
        assert!(output["ctaList"].is_string());
    }
}
