// /////////////////////////////////////////////////////////////////////////////
// Stageflow
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////
//! The validated, immutable dependency graph a pipeline runs from.

use crate::stage::StageSpec;
use std::collections::HashMap;

/// A validated set of stages and their dependency edges, ready to execute.
///
/// `StageGraph` is produced only by [`crate::builder::PipelineBuilder::build`]
/// after validation succeeds, so by construction it is non-empty, every
/// dependency name resolves, and it contains no cycles.
#[derive(Clone)]
pub struct StageGraph {
    name: String,
    stages: HashMap<String, StageSpec>,
}

impl std::fmt::Debug for StageGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageGraph")
            .field("name", &self.name)
            .field("stages", &self.stages.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl StageGraph {
    pub(crate) fn new(name: impl Into<String>, stages: HashMap<String, StageSpec>) -> Self {
        Self { name: name.into(), stages }
    }

    /// This pipeline's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up a stage spec by name.
    pub fn stage(&self, name: &str) -> Option<&StageSpec> {
        self.stages.get(name)
    }

    /// All stage specs, unordered.
    pub fn stages(&self) -> impl Iterator<Item = &StageSpec> {
        self.stages.values()
    }

    /// Number of stages in the graph.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the graph has no stages (never true for a built graph, but
    /// useful for pre-build introspection callers may perform on a clone).
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Names of stages that depend on `name`.
    pub fn dependents_of<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.stages
            .values()
            .filter(move |spec| spec.dependencies.iter().any(|d| d == name))
            .map(|spec| spec.name.as_str())
    }
}
