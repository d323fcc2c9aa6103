//! Dependency graph construction and validation for playbooks.
//!
//! The builder indexes playbook phases and rejects graphs the scheduler
//! cannot drive: duplicate ids, dependencies on unknown phases, and cycles.

use crate::phase::{PhaseDefinition, Playbook};
use anyhow::{Result, bail};
use std::collections::HashMap;

/// Index into the phase list.
pub type PhaseIndex = usize;

/// A validated directed acyclic graph of phases.
#[derive(Debug, Clone)]
pub struct PhaseGraph {
    phases: Vec<PhaseDefinition>,
    /// index -> phases that depend on it
    forward_edges: Vec<Vec<PhaseIndex>>,
    /// index -> phases it depends on
    reverse_edges: Vec<Vec<PhaseIndex>>,
}

impl PhaseGraph {
    /// Build and validate the graph for a playbook.
    pub fn from_playbook(playbook: &Playbook) -> Result<Self> {
        DagBuilder::new(playbook.phases().to_vec()).build()
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn get_phase(&self, index: PhaseIndex) -> Option<&PhaseDefinition> {
        self.phases.get(index)
    }

    /// Phases in playbook order.
    pub fn phases(&self) -> &[PhaseDefinition] {
        &self.phases
    }

    pub fn dependents(&self, index: PhaseIndex) -> &[PhaseIndex] {
        self.forward_edges.get(index).map_or(&[], |v| v.as_slice())
    }

    pub fn dependencies(&self, index: PhaseIndex) -> &[PhaseIndex] {
        self.reverse_edges.get(index).map_or(&[], |v| v.as_slice())
    }
}

/// Builder for constructing phase graphs.
pub struct DagBuilder {
    phases: Vec<PhaseDefinition>,
}

impl DagBuilder {
    pub fn new(phases: Vec<PhaseDefinition>) -> Self {
        Self { phases }
    }

    /// Build the phase graph.
    ///
    /// Fails when an id is empty or repeated, a dependency names no phase,
    /// or the dependencies form a cycle.
    pub fn build(self) -> Result<PhaseGraph> {
        let mut index_map = HashMap::new();
        for (i, phase) in self.phases.iter().enumerate() {
            if phase.id.trim().is_empty() {
                bail!("Phase at position {} has an empty id", i);
            }
            if index_map.insert(phase.id.clone(), i).is_some() {
                bail!("Duplicate phase id: {}", phase.id);
            }
        }

        let mut forward_edges: Vec<Vec<PhaseIndex>> = vec![Vec::new(); self.phases.len()];
        let mut reverse_edges: Vec<Vec<PhaseIndex>> = vec![Vec::new(); self.phases.len()];

        for (to_idx, phase) in self.phases.iter().enumerate() {
            for dep in &phase.depends_on {
                let from_idx = *index_map.get(dep).ok_or_else(|| {
                    anyhow::anyhow!(
                        "Unknown dependency '{}' in phase '{}': no phase with that id exists",
                        dep,
                        phase.id
                    )
                })?;

                if reverse_edges[to_idx].contains(&from_idx) {
                    continue;
                }
                forward_edges[from_idx].push(to_idx);
                reverse_edges[to_idx].push(from_idx);
            }
        }

        let graph = PhaseGraph {
            phases: self.phases,
            forward_edges,
            reverse_edges,
        };

        Self::validate_no_cycles(&graph)?;

        Ok(graph)
    }

    /// Kahn's algorithm; whatever never reaches in-degree zero sits on a cycle.
    fn validate_no_cycles(graph: &PhaseGraph) -> Result<()> {
        let mut in_degree: Vec<usize> = graph.reverse_edges.iter().map(|deps| deps.len()).collect();

        let mut queue: Vec<PhaseIndex> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, deg)| *deg == 0)
            .map(|(i, _)| i)
            .collect();

        let mut processed = 0;

        while let Some(node) = queue.pop() {
            processed += 1;
            for &dependent in graph.dependents(node) {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    queue.push(dependent);
                }
            }
        }

        if processed != graph.len() {
            let involved: Vec<&str> = in_degree
                .iter()
                .enumerate()
                .filter(|&(_, deg)| *deg > 0)
                .filter_map(|(i, _)| graph.get_phase(i).map(|p| p.id.as_str()))
                .collect();
            bail!(
                "Cycle detected in phase dependencies. Involved phases: {:?}",
                involved
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phase(id: &str, deps: &[&str]) -> PhaseDefinition {
        PhaseDefinition::new(id, "Agent").depends_on(deps)
    }

    #[test]
    fn test_empty_graph() {
        let graph = DagBuilder::new(vec![]).build().unwrap();
        assert!(graph.is_empty());
    }

    #[test]
    fn test_linear_chain() {
        let graph = DagBuilder::new(vec![
            phase("brief", &[]),
            phase("research", &["brief"]),
            phase("strategy", &["research"]),
        ])
        .build()
        .unwrap();

        assert_eq!(graph.len(), 3);
        assert!(graph.dependencies(0).is_empty());
        assert_eq!(graph.dependencies(2), &[1]);
        assert_eq!(graph.dependents(0), &[1]);
        assert_eq!(graph.get_phase(1).unwrap().id, "research");
    }

    #[test]
    fn test_diamond() {
        let graph = DagBuilder::new(vec![
            phase("strategy", &[]),
            phase("seo", &["strategy"]),
            phase("copy", &["strategy"]),
            phase("content", &["seo", "copy"]),
        ])
        .build()
        .unwrap();

        assert_eq!(graph.dependents(0).len(), 2);
        assert_eq!(graph.dependencies(3).len(), 2);
        assert_eq!(graph.dependents(1), &[3]);
        assert!(graph.dependents(3).is_empty());
    }

    #[test]
    fn test_repeated_dependency_is_collapsed() {
        let graph = DagBuilder::new(vec![phase("a", &[]), phase("b", &["a", "a"])])
            .build()
            .unwrap();
        assert_eq!(graph.dependencies(1), &[0]);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let err = DagBuilder::new(vec![phase("seo", &[]), phase("seo", &[])])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Duplicate phase id: seo"));
    }

    #[test]
    fn test_empty_id_rejected() {
        let err = DagBuilder::new(vec![phase(" ", &[])]).build().unwrap_err();
        assert!(err.to_string().contains("empty id"));
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let err = DagBuilder::new(vec![phase("copy", &["strategy"])])
            .build()
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Unknown dependency 'strategy'"));
        assert!(msg.contains("'copy'"));
    }

    #[test]
    fn test_cycle_rejected() {
        let err = DagBuilder::new(vec![
            phase("a", &["c"]),
            phase("b", &["a"]),
            phase("c", &["b"]),
            phase("d", &[]),
        ])
        .build()
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Cycle detected"));
        assert!(msg.contains("\"a\""));
        assert!(!msg.contains("\"d\""));
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let err = DagBuilder::new(vec![phase("a", &["a"])]).build().unwrap_err();
        assert!(err.to_string().contains("Cycle detected"));
    }

    #[test]
    fn test_default_playbook_is_acyclic() {
        let graph = PhaseGraph::from_playbook(&crate::phase::default_playbook()).unwrap();
        let roots: Vec<&str> = (0..graph.len())
            .filter(|&i| graph.dependencies(i).is_empty())
            .filter_map(|i| graph.get_phase(i).map(|p| p.id.as_str()))
            .collect();
        assert_eq!(roots, vec!["briefing"]);
    }
}
