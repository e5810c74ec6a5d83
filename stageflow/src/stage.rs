// /////////////////////////////////////////////////////////////////////////////
// Stageflow
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////
//! The stage contract and the declarative stage specification a pipeline
//! is built from.

use crate::context::StageContext;
use async_trait::async_trait;
use stageflow_domain::{StageKind, StageOutput};
use std::sync::Arc;

/// The contract every stage implementation satisfies.
///
/// `execute` receives only this run's declared-dependency outputs (via
/// [`StageContext::inputs`]) and the shared context bag/capabilities; it
/// must not assume anything about which other stages exist or in what
/// order they ran beyond its declared dependencies.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Runs this stage for one invocation.
    async fn execute(&self, ctx: &StageContext) -> StageOutput;

    /// This stage's broad kind, used for capability routing and
    /// compatibility checks. Defaults to [`StageKind::Work`].
    fn kind(&self) -> StageKind {
        StageKind::Work
    }
}

/// How a stage is constructed for each run: either a single shared
/// instance reused across runs, or a factory invoked fresh per run.
#[derive(Clone)]
pub enum StageRunner {
    /// A single `Stage` instance, shared and invoked concurrently across
    /// runs. Must tolerate concurrent `execute` calls.
    Shared(Arc<dyn Stage>),
    /// A factory that builds a fresh `Stage` instance for each run.
    Factory(Arc<dyn Fn() -> Arc<dyn Stage> + Send + Sync>),
}

impl StageRunner {
    /// Resolves this runner to the `Stage` instance to invoke for a run.
    pub fn resolve(&self) -> Arc<dyn Stage> {
        match self {
            Self::Shared(stage) => stage.clone(),
            Self::Factory(factory) => factory(),
        }
    }
}

/// A declarative description of one stage in a pipeline: its name, its
/// dependencies, whether it is conditional, and how to construct it.
#[derive(Clone)]
pub struct StageSpec {
    /// This stage's unique name within its pipeline.
    pub name: String,
    /// Names of stages this stage depends on.
    pub dependencies: Vec<String>,
    /// Whether this stage tolerates a declared dependency finishing with
    /// [`stageflow_domain::StageStatus::Skip`] (it still runs). A
    /// non-conditional stage is itself suppressed with reason
    /// `"upstream_unavailable"` the moment any dependency is anything but
    /// [`stageflow_domain::StageStatus::Ok`].
    pub conditional: bool,
    /// How to construct the `Stage` instance to run.
    pub runner: StageRunner,
    /// Caller-assigned version tag for this stage, for bookkeeping only;
    /// the engine does not maintain a central version registry.
    pub version: Option<String>,
}

impl StageSpec {
    /// Builds a stage spec for a shared stage instance with no
    /// dependencies.
    pub fn new(name: impl Into<String>, stage: Arc<dyn Stage>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            conditional: false,
            runner: StageRunner::Shared(stage),
            version: None,
        }
    }

    /// Builds a stage spec from a per-run factory closure.
    pub fn from_factory(
        name: impl Into<String>,
        factory: impl Fn() -> Arc<dyn Stage> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            conditional: false,
            runner: StageRunner::Factory(Arc::new(factory)),
            version: None,
        }
    }

    /// Declares dependencies for this stage.
    #[must_use]
    pub fn depends_on(mut self, dependencies: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    /// Marks this stage as tolerant of a skipped dependency: it still runs
    /// when a dependency finished with `Skip` rather than being suppressed
    /// with reason `"upstream_unavailable"`.
    #[must_use]
    pub fn conditional(mut self) -> Self {
        self.conditional = true;
        self
    }

    /// Attaches a version tag.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}
