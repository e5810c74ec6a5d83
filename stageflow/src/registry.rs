// /////////////////////////////////////////////////////////////////////////////
// Stageflow
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////
//! A process-wide (or per-instance) keyed store of validated pipelines.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use stageflow_domain::StageflowError;

use crate::graph::StageGraph;

/// A name-keyed store of [`StageGraph`]s.
///
/// Registration is idempotent for the same name mapping to an equivalent
/// graph identity; registering a different graph under a name that is
/// already taken is rejected unless the caller explicitly asks to
/// overwrite via [`Registry::replace`].
#[derive(Default)]
pub struct Registry {
    pipelines: RwLock<HashMap<String, Arc<StageGraph>>>,
}

impl Registry {
    /// Creates an empty, independent registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `graph` under its own name.
    ///
    /// # Errors
    /// Returns [`StageflowError::Internal`] if a *different* graph is
    /// already registered under this name; re-registering the exact same
    /// `Arc` is a no-op.
    pub fn register(&self, graph: Arc<StageGraph>) -> Result<(), StageflowError> {
        let name = graph.name().to_string();
        let mut pipelines = self.pipelines.write();
        if let Some(existing) = pipelines.get(&name) {
            if !Arc::ptr_eq(existing, &graph) {
                return Err(StageflowError::Internal(format!(
                    "pipeline '{name}' is already registered; use replace() to overwrite it"
                )));
            }
            return Ok(());
        }
        pipelines.insert(name, graph);
        Ok(())
    }

    /// Registers `graph` under its own name, overwriting any existing
    /// registration with that name.
    pub fn replace(&self, graph: Arc<StageGraph>) {
        let name = graph.name().to_string();
        self.pipelines.write().insert(name, graph);
    }

    /// Looks up a pipeline by name.
    ///
    /// # Errors
    /// Returns [`StageflowError::PipelineNotFound`] if no pipeline is
    /// registered under `name`.
    pub fn get(&self, name: &str) -> Result<Arc<StageGraph>, StageflowError> {
        self.pipelines
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StageflowError::PipelineNotFound { name: name.to_string() })
    }

    /// Names of every registered pipeline.
    pub fn names(&self) -> Vec<String> {
        self.pipelines.read().keys().cloned().collect()
    }
}

static GLOBAL: OnceLock<Registry> = OnceLock::new();

/// The process-wide registry instance, lazily created on first use.
pub fn global() -> &'static Registry {
    GLOBAL.get_or_init(Registry::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PipelineBuilder;
    use crate::context::StageContext;
    use crate::stage::Stage;
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

    fn graph(name: &str) -> Arc<StageGraph> {
        Arc::new(PipelineBuilder::new(name).stage("a", Arc::new(NoOp)).build().unwrap())
    }

    #[test]
    fn lookup_of_unregistered_name_fails() {
        let registry = Registry::new();
        let err = registry.get("missing").unwrap_err();
        assert_eq!(err.code(), "PIPELINE_NOT_FOUND");
    }

    #[test]
    fn registering_a_different_graph_under_the_same_name_is_rejected() {
        let registry = Registry::new();
        registry.register(graph("p")).unwrap();
        let err = registry.register(graph("p")).unwrap_err();
        assert!(err.to_string().contains("already registered"));
    }

    #[test]
    fn replace_overwrites_without_error() {
        let registry = Registry::new();
        registry.register(graph("p")).unwrap();
        registry.replace(graph("p"));
        assert!(registry.get("p").is_ok());
    }
}
