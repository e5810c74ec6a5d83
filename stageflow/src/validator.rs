// /////////////////////////////////////////////////////////////////////////////
// Stageflow
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////
//! The three ordered checks a pipeline must pass before it can run.

use crate::stage::StageSpec;
use stageflow_domain::StageflowError;
use std::collections::{HashMap, HashSet};

#[derive(Clone, Copy, Eq, PartialEq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Validates a pipeline's stages in order: non-empty, then dependency
/// reference integrity, then acyclicity.
///
/// # Errors
/// - [`StageflowError::EmptyPipeline`] if `stages` is empty.
/// - [`StageflowError::MissingDependency`] if any stage depends on a name
///   that was never registered.
/// - [`StageflowError::CycleDetected`] if the dependency graph has a cycle,
///   carrying the cycle path starting from the lexicographically smallest
///   stage name that participates in a cycle, for a deterministic report.
pub fn validate(pipeline_name: &str, stages: &HashMap<String, StageSpec>) -> Result<(), StageflowError> {
    if stages.is_empty() {
        return Err(StageflowError::EmptyPipeline { pipeline: pipeline_name.to_string() });
    }

    check_references(stages)?;
    check_acyclic(stages)?;
    Ok(())
}

fn check_references(stages: &HashMap<String, StageSpec>) -> Result<(), StageflowError> {
    let mut names: Vec<&String> = stages.keys().collect();
    names.sort();
    for name in names {
        let spec = &stages[name];
        let mut deps: Vec<&String> = spec.dependencies.iter().collect();
        deps.sort();
        for dep in deps {
            if !stages.contains_key(dep) {
                return Err(StageflowError::MissingDependency {
                    stage: name.clone(),
                    missing: dep.clone(),
                });
            }
        }
    }
    Ok(())
}

fn check_acyclic(stages: &HashMap<String, StageSpec>) -> Result<(), StageflowError> {
    let mut colors: HashMap<&str, Color> = stages.keys().map(|k| (k.as_str(), Color::White)).collect();
    let mut sorted_names: Vec<&str> = stages.keys().map(String::as_str).collect();
    sorted_names.sort();

    // A DFS rooted at one node only ever reports the first cycle it trips
    // over, and stops descending past it; nodes outside that cycle's path
    // stay White and are picked up as fresh roots later in this loop. So a
    // single pass over every unvisited node finds one cycle per disjoint
    // cyclic component. We keep all of them and report whichever contains
    // the lexicographically smallest participant, rather than whichever one
    // the traversal happened to reach first.
    let mut cycles: Vec<Vec<String>> = Vec::new();
    for start in &sorted_names {
        if colors[start] == Color::White {
            let mut path = Vec::new();
            if let Some(cycle) = visit(start, stages, &mut colors, &mut path) {
                cycles.push(cycle);
            }
        }
    }

    if let Some(cycle) = cycles.into_iter().min_by(|a, b| a.iter().min().cmp(&b.iter().min())) {
        return Err(StageflowError::CycleDetected { path: cycle });
    }
    Ok(())
}

fn visit<'a>(
    node: &'a str,
    stages: &'a HashMap<String, StageSpec>,
    colors: &mut HashMap<&'a str, Color>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    colors.insert(node, Color::Gray);
    path.push(node);

    let mut deps: Vec<&str> = stages[node].dependencies.iter().map(String::as_str).collect();
    deps.sort();

    for dep in deps {
        match colors.get(dep).copied() {
            Some(Color::White) => {
                if let Some(cycle) = visit(dep, stages, colors, path) {
                    return Some(cycle);
                }
            }
            Some(Color::Gray) => {
                let start_idx = path.iter().position(|n| *n == dep).unwrap_or(0);
                let mut cycle: Vec<String> = path[start_idx..].iter().map(|s| s.to_string()).collect();
                cycle.push(dep.to_string());
                return Some(cycle);
            }
            _ => {}
        }
    }

    path.pop();
    colors.insert(node, Color::Black);
    None
}

/// Returns the set of stage names in `stages` that are reachable from the
/// given cycle path, for diagnostic logging alongside a `CycleDetected`
/// error.
pub fn reachable_from_cycle(path: &[String], stages: &HashMap<String, StageSpec>) -> HashSet<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut stack: Vec<String> = path.to_vec();
    while let Some(name) = stack.pop() {
        if !seen.insert(name.clone()) {
            continue;
        }
        if let Some(spec) = stages.get(&name) {
            stack.extend(spec.dependencies.iter().cloned());
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StageContext;
    use crate::stage::Stage;
    use async_trait::async_trait;
    use stageflow_domain::StageOutput;
    use std::collections::HashMap as Map;
    use std::sync::Arc;

    struct NoOp;
    #[async_trait]
    impl Stage for NoOp {
        async fn execute(&self, _ctx: &StageContext) -> StageOutput {
            StageOutput::ok(Map::new(), 0)
        }
    }

    fn spec(name: &str, deps: &[&str]) -> StageSpec {
        StageSpec::new(name, Arc::new(NoOp)).depends_on(deps.iter().map(|d| d.to_string()))
    }

    #[test]
    fn empty_graph_is_rejected() {
        let err = validate("p", &Map::new()).unwrap_err();
        assert_eq!(err.code(), "EMPTY_PIPELINE");
    }

    #[test]
    fn undeclared_dependency_is_rejected() {
        let mut stages = HashMap::new();
        stages.insert("b".to_string(), spec("b", &["a"]));
        let err = validate("p", &stages).unwrap_err();
        assert_eq!(err.code(), "MISSING_DEPENDENCY");
    }

    #[test]
    fn self_cycle_is_detected() {
        let mut stages = HashMap::new();
        stages.insert("a".to_string(), spec("a", &["a"]));
        let err = validate("p", &stages).unwrap_err();
        match err {
            StageflowError::CycleDetected { path } => assert_eq!(path, vec!["a", "a"]),
            other => panic!("expected CycleDetected, got {other:?}"),
        }
    }

    #[test]
    fn three_node_cycle_reports_a_deterministic_path() {
        let mut stages = HashMap::new();
        stages.insert("a".to_string(), spec("a", &["b"]));
        stages.insert("b".to_string(), spec("b", &["c"]));
        stages.insert("c".to_string(), spec("c", &["a"]));
        let err = validate("p", &stages).unwrap_err();
        match err {
            StageflowError::CycleDetected { path } => {
                assert_eq!(path.first(), path.last());
                assert_eq!(path.len(), 4);
            }
            other => panic!("expected CycleDetected, got {other:?}"),
        }
    }

    #[test]
    fn disjoint_cycles_report_the_one_with_the_smallest_participant() {
        let mut stages = HashMap::new();
        stages.insert("a".to_string(), spec("a", &["c"]));
        stages.insert("c".to_string(), spec("c", &["d"]));
        stages.insert("d".to_string(), spec("d", &["c"]));
        stages.insert("b".to_string(), spec("b", &["b"]));
        let err = validate("p", &stages).unwrap_err();
        match err {
            StageflowError::CycleDetected { path } => assert_eq!(path, vec!["b", "b"]),
            other => panic!("expected CycleDetected, got {other:?}"),
        }
    }

    #[test]
    fn acyclic_diamond_passes() {
        let mut stages = HashMap::new();
        stages.insert("a".to_string(), spec("a", &[]));
        stages.insert("b".to_string(), spec("b", &["a"]));
        stages.insert("c".to_string(), spec("c", &["a"]));
        stages.insert("d".to_string(), spec("d", &["b", "c"]));
        assert!(validate("p", &stages).is_ok());
    }
}
