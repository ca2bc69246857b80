//! Step dependency graph validation.
//!
//! Uses `petgraph` to model step dependencies as a directed graph. A
//! topological sort detects cycles; strongly connected components name every
//! step that takes part in one.

use std::collections::HashMap;

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use stepwise_types::error::TemplateError;
use stepwise_types::template::StepDefinition;

/// Build a directed graph with an edge from each dependency to its dependent.
fn build_graph(steps: &[StepDefinition]) -> Result<DiGraph<&str, ()>, TemplateError> {
    let mut graph = DiGraph::<&str, ()>::new();
    let mut id_to_node: HashMap<&str, NodeIndex> = HashMap::with_capacity(steps.len());

    for step in steps {
        let node = graph.add_node(step.id.as_str());
        if id_to_node.insert(step.id.as_str(), node).is_some() {
            return Err(TemplateError::Schema(format!(
                "duplicate step id '{}'",
                step.id
            )));
        }
    }

    for step in steps {
        let to = id_to_node[step.id.as_str()];
        for dep in &step.depends_on {
            let from = id_to_node.get(dep.as_str()).ok_or_else(|| {
                TemplateError::Schema(format!(
                    "step '{}' depends on unknown step '{}'",
                    step.id, dep
                ))
            })?;
            graph.add_edge(*from, to, ());
        }
    }

    Ok(graph)
}

/// Every step that sits on a cycle, in declaration order.
fn cycle_members(graph: &DiGraph<&str, ()>) -> Vec<String> {
    let mut nodes: Vec<NodeIndex> = tarjan_scc(graph)
        .into_iter()
        .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
        .flatten()
        .collect();
    nodes.sort();
    nodes.into_iter().map(|n| graph[n].to_string()).collect()
}

/// Validate that steps form a DAG: unique ids, known dependencies, no cycles.
///
/// A cycle is reported as `TemplateError::Cycle` naming all steps on it.
pub fn validate_dag(steps: &[StepDefinition]) -> Result<(), TemplateError> {
    let graph = build_graph(steps)?;

    if toposort(&graph, None).is_err() {
        return Err(TemplateError::Cycle {
            step_ids: cycle_members(&graph),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use stepwise_types::template::StepValidation;

    /// Helper: build a step with given ID and dependencies.
    fn step(id: &str, depends_on: Vec<&str>) -> StepDefinition {
        StepDefinition {
            id: id.to_string(),
            title: id.to_string(),
            description: None,
            actions: vec![],
            depends_on: depends_on.into_iter().map(String::from).collect::<BTreeSet<_>>(),
            validation: StepValidation::default(),
        }
    }

    #[test]
    fn test_linear_chain_is_valid() {
        let steps = vec![step("a", vec![]), step("b", vec!["a"]), step("c", vec!["b"])];
        assert!(validate_dag(&steps).is_ok());
    }

    #[test]
    fn test_diamond_is_valid() {
        // A -> {B, C} -> D
        let steps = vec![
            step("a", vec![]),
            step("b", vec!["a"]),
            step("c", vec!["a"]),
            step("d", vec!["b", "c"]),
        ];
        assert!(validate_dag(&steps).is_ok());
    }

    #[test]
    fn test_empty_steps_is_valid_graph() {
        assert!(validate_dag(&[]).is_ok());
    }

    #[test]
    fn test_cycle_names_all_members() {
        // a -> c -> b -> a, with d hanging off the cycle
        let steps = vec![
            step("a", vec!["c"]),
            step("b", vec!["a"]),
            step("c", vec!["b"]),
            step("d", vec!["a"]),
        ];
        match validate_dag(&steps).unwrap_err() {
            TemplateError::Cycle { step_ids } => assert_eq!(step_ids, vec!["a", "b", "c"]),
            other => panic!("expected cycle error, got {other}"),
        }
    }

    #[test]
    fn test_two_step_cycle() {
        let steps = vec![step("a", vec!["b"]), step("b", vec!["a"])];
        let err = validate_dag(&steps).unwrap_err();
        assert_eq!(err.to_string(), "dependency cycle between steps: a, b");
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let steps = vec![step("root", vec![]), step("loop", vec!["loop"])];
        match validate_dag(&steps).unwrap_err() {
            TemplateError::Cycle { step_ids } => assert_eq!(step_ids, vec!["loop"]),
            other => panic!("expected cycle error, got {other}"),
        }
    }

    #[test]
    fn test_unknown_dependency_is_schema_error() {
        let steps = vec![step("a", vec!["missing"])];
        let err = validate_dag(&steps).unwrap_err();
        assert!(matches!(err, TemplateError::Schema(_)));
        assert!(err.to_string().contains("unknown step 'missing'"));
    }

    #[test]
    fn test_duplicate_id_is_schema_error() {
        let steps = vec![step("a", vec![]), step("a", vec![])];
        let err = validate_dag(&steps).unwrap_err();
        assert!(err.to_string().contains("duplicate step id 'a'"));
    }
}
