// /////////////////////////////////////////////////////////////////////////////
// Stageflow
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////
//! A stage's read-only view over the outputs of its declared dependencies.

use crate::stage_output::StageOutput;
use serde_json::Value;
use std::collections::HashMap;

/// The outputs of a stage's declared dependencies, scoped so a stage can
/// only see what it depends on. Stages that want visibility into arbitrary
/// upstream output must declare that dependency explicitly; there is no
/// back door into the rest of the run's results.
#[derive(Debug, Clone)]
pub struct StageInputs {
    outputs: HashMap<String, StageOutput>,
}

impl StageInputs {
    /// Builds the input view for a stage, keeping only the entries named in
    /// `dependencies` out of the full `completed` map.
    pub fn new(completed: &HashMap<String, StageOutput>, dependencies: &[String]) -> Self {
        let outputs = dependencies
            .iter()
            .filter_map(|dep| completed.get(dep).map(|out| (dep.clone(), out.clone())))
            .collect();
        Self { outputs }
    }

    /// The full output of a named dependency, if it ran.
    pub fn output_of(&self, dependency: &str) -> Option<&StageOutput> {
        self.outputs.get(dependency)
    }

    /// A single data value written by a named dependency.
    pub fn value_of(&self, dependency: &str, key: &str) -> Option<&Value> {
        self.outputs.get(dependency)?.data.get(key)
    }

    /// Searches `dependencies_in_order` for the first one whose output
    /// carries `key`, returning that value. Unlike [`value_of`](Self::value_of),
    /// the caller does not pick which dependency to read from; this is for
    /// stages that accept a value from whichever of several upstream stages
    /// happened to produce it, preferring earlier entries in the given order.
    pub fn get(&self, key: &str, dependencies_in_order: &[String]) -> Option<&Value> {
        dependencies_in_order.iter().find_map(|dep| self.value_of(dep, key))
    }

    /// Whether a named dependency produced output visible to this stage (it
    /// both ran and was declared as a dependency).
    pub fn has_output(&self, dependency: &str) -> bool {
        self.outputs.contains_key(dependency)
    }

    /// Names of dependencies this view actually has output for (a
    /// dependency that was skipped or never scheduled is absent).
    pub fn available_dependencies(&self) -> impl Iterator<Item = &str> {
        self.outputs.keys().map(String::as_str)
    }

    /// Whether every named dependency produced an `Ok` status.
    pub fn all_ok(&self) -> bool {
        self.outputs.values().all(StageOutput::is_ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_declared_dependencies_are_visible() {
        let mut completed = HashMap::new();
        completed.insert("a".to_string(), StageOutput::ok(HashMap::new(), 1));
        completed.insert("b".to_string(), StageOutput::ok(HashMap::new(), 1));
        let inputs = StageInputs::new(&completed, &["a".to_string()]);
        assert!(inputs.output_of("a").is_some());
        assert!(inputs.output_of("b").is_none());
    }

    #[test]
    fn all_ok_is_false_when_a_dependency_failed() {
        let mut completed = HashMap::new();
        completed.insert("a".to_string(), StageOutput::fail("bad", 1));
        let inputs = StageInputs::new(&completed, &["a".to_string()]);
        assert!(!inputs.all_ok());
    }

    #[test]
    fn get_searches_dependencies_in_order_and_returns_the_first_match() {
        let mut a_data = HashMap::new();
        a_data.insert("text".to_string(), Value::String("from-a".into()));
        let mut b_data = HashMap::new();
        b_data.insert("text".to_string(), Value::String("from-b".into()));
        let mut completed = HashMap::new();
        completed.insert("a".to_string(), StageOutput::ok(a_data, 1));
        completed.insert("b".to_string(), StageOutput::ok(b_data, 1));
        let deps = vec!["a".to_string(), "b".to_string()];
        let inputs = StageInputs::new(&completed, &deps);

        assert_eq!(inputs.get("text", &deps), Some(&Value::String("from-a".into())));
        assert_eq!(inputs.get("text", &["b".to_string()]), Some(&Value::String("from-b".into())));
        assert_eq!(inputs.get("missing", &deps), None);
    }

    #[test]
    fn has_output_reflects_whether_a_dependency_actually_ran() {
        let mut completed = HashMap::new();
        completed.insert("a".to_string(), StageOutput::ok(HashMap::new(), 1));
        let inputs = StageInputs::new(&completed, &["a".to_string()]);
        assert!(inputs.has_output("a"));
        assert!(!inputs.has_output("b"));
    }
}
