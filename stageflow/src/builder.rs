// /////////////////////////////////////////////////////////////////////////////
// Stageflow
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////
//! The fluent API for assembling a [`StageGraph`].

use crate::graph::StageGraph;
use crate::stage::{Stage, StageSpec};
use crate::validator::validate;
use stageflow_domain::StageflowError;
use std::collections::HashMap;
use std::sync::Arc;

/// Builds a [`StageGraph`] one stage at a time, validating the whole graph
/// on [`build`](Self::build).
pub struct PipelineBuilder {
    name: String,
    stages: HashMap<String, StageSpec>,
    order: Vec<String>,
}

impl PipelineBuilder {
    /// Starts a new, empty pipeline builder.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), stages: HashMap::new(), order: Vec::new() }
    }

    /// Registers a stage with no dependencies.
    #[must_use]
    pub fn stage(self, name: impl Into<String>, stage: Arc<dyn Stage>) -> Self {
        let name = name.into();
        self.add(StageSpec::new(name, stage))
    }

    /// Registers a stage with the given dependency names.
    #[must_use]
    pub fn stage_with_deps(
        self,
        name: impl Into<String>,
        stage: Arc<dyn Stage>,
        dependencies: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let name = name.into();
        self.add(StageSpec::new(name, stage).depends_on(dependencies))
    }

    /// Registers a pre-built [`StageSpec`] (for factory-constructed stages,
    /// conditional stages, or stages carrying a version tag).
    #[must_use]
    pub fn add(mut self, spec: StageSpec) -> Self {
        if !self.stages.contains_key(&spec.name) {
            self.order.push(spec.name.clone());
        }
        self.stages.insert(spec.name.clone(), spec);
        self
    }

    /// Names of stages registered so far, in registration order.
    pub fn stage_names(&self) -> &[String] {
        &self.order
    }

    /// Number of stages registered so far.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether no stages have been registered yet.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Merges `other`'s stages into this builder, returning the union. On a
    /// name collision, `other`'s spec replaces this builder's, the same way
    /// a second [`add`](Self::add) call for an existing name would.
    /// Registration order for any name first seen in `other` is appended
    /// after this builder's own order.
    #[must_use]
    pub fn compose(mut self, other: Self) -> Self {
        for name in other.order {
            let spec = other.stages.get(&name).cloned().expect("order and stages stay in sync");
            self = self.add(spec);
        }
        self
    }

    /// Validates the graph and, if it passes, produces an immutable
    /// [`StageGraph`].
    ///
    /// # Errors
    /// Returns [`StageflowError::EmptyPipeline`],
    /// [`StageflowError::MissingDependency`], or
    /// [`StageflowError::CycleDetected`] per [`crate::validator::validate`].
    pub fn build(self) -> Result<StageGraph, StageflowError> {
        validate(&self.name, &self.stages)?;
        Ok(StageGraph::new(self.name, self.stages))
    }
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut list = f.debug_list();
        for name in &self.order {
            let deps = self.stages.get(name).map(|s| s.dependencies.clone()).unwrap_or_default();
            list.entry(&format!("{name} <- {deps:?}"));
        }
        list.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StageContext;
    use async_trait::async_trait;
    use stageflow_domain::StageOutput;
    use std::collections::HashMap as Map;

    struct NoOp;
    #[async_trait]
    impl Stage for NoOp {
        async fn execute(&self, _ctx: &StageContext) -> StageOutput {
            StageOutput::ok(Map::new(), 0)
        }
    }

    #[test]
    fn empty_builder_fails_to_build() {
        let err = PipelineBuilder::new("p").build().unwrap_err();
        assert_eq!(err.code(), "EMPTY_PIPELINE");
    }

    #[test]
    fn missing_dependency_is_rejected() {
        let err = PipelineBuilder::new("p")
            .stage_with_deps("b", Arc::new(NoOp), ["a"])
            .build()
            .unwrap_err();
        assert_eq!(err.code(), "MISSING_DEPENDENCY");
    }

    #[test]
    fn compose_unions_stages_with_right_hand_winning_on_collision() {
        let left = PipelineBuilder::new("left").stage("a", Arc::new(NoOp)).stage("shared", Arc::new(NoOp));
        let right = PipelineBuilder::new("right")
            .stage_with_deps("shared", Arc::new(NoOp), ["a"])
            .stage("b", Arc::new(NoOp));

        let merged = left.compose(right);
        assert_eq!(merged.stage_names(), &["a", "shared", "b"]);
        let shared = merged.stages.get("shared").unwrap();
        assert_eq!(shared.dependencies, vec!["a".to_string()]);
    }

    #[test]
    fn valid_graph_builds() {
        let graph = PipelineBuilder::new("p")
            .stage("a", Arc::new(NoOp))
            .stage_with_deps("b", Arc::new(NoOp), ["a"])
            .build()
            .unwrap();
        assert_eq!(graph.len(), 2);
    }
}
