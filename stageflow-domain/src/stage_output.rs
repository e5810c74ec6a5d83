// /////////////////////////////////////////////////////////////////////////////
// Stageflow
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////
//! The result a stage produces for one run.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Broad category of work a stage performs, used for capability routing and
/// compatibility checks between adjacent stages. The engine never branches
/// scheduling behavior on this value beyond what dependencies already
/// express; it exists for introspection and for interceptors that key off
/// stage kind (e.g. a circuit breaker scoped to `Agent` stages only).
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum StageKind {
    /// Transforms data already present in the context bag.
    Transform,
    /// Adds derived or supplementary data without replacing what is there.
    Enrich,
    /// Decides which of several downstream paths a run should take.
    Route,
    /// Validates or gates progress; may reject or skip what follows.
    Guard,
    /// General-purpose work not covered by the other kinds.
    Work,
    /// Calls out to a large language model or other agentic capability.
    Agent,
}

/// The terminal status of a single stage's execution.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum StageStatus {
    /// The stage ran and produced usable output.
    Ok,
    /// The stage did not run because a conditional dependency suppressed it,
    /// or because the stage itself chose to skip.
    Skip,
    /// The stage ran and reported a failure.
    Fail,
    /// The stage was cancelled before or during execution.
    Cancel,
}

/// A named payload a stage produces alongside its `data`, ordered by
/// production order within the stage's execution. Unlike `data`, artifacts
/// are not merged into the shared context bag; they travel only on the
/// `StageOutput` itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageArtifact {
    /// The artifact's kind (e.g. `"summary"`, `"image"`, `"trace"`).
    pub r#type: String,
    /// The artifact's payload.
    pub payload: Value,
}

impl StageArtifact {
    /// Builds an artifact.
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self { r#type: kind.into(), payload }
    }
}

/// One event recorded during a stage's execution. Distinct from the wide
/// events an [`stageflow_domain`]-external `EventSink` receives: these are
/// annotations an interceptor's `after_stage` hook attaches directly to the
/// output, for callers that inspect a run's results rather than subscribe
/// to its event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageEvent {
    /// The event's kind.
    pub r#type: String,
    /// The event's data.
    pub data: Value,
}

impl StageEvent {
    /// Builds an event.
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self { r#type: kind.into(), data }
    }
}

/// What a stage returns from its `execute` method.
///
/// `data` is the set of context-bag keys this stage is contributing for
/// this run; `error` is populated only when `status` is [`StageStatus::Fail`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageOutput {
    /// How the stage finished.
    pub status: StageStatus,
    /// Keys and values this stage is writing into the shared context bag.
    pub data: HashMap<String, Value>,
    /// Ordered artifacts this stage produced, distinct from `data`.
    pub artifacts: Vec<StageArtifact>,
    /// Ordered events recorded during this stage's execution, distinct from
    /// whatever the ambient `EventSink` observed; interceptors may append
    /// to this list from `after_stage`, but must not otherwise change
    /// `status`.
    pub events: Vec<StageEvent>,
    /// Failure message, present only when `status` is `Fail`.
    pub error: Option<String>,
    /// Reason the stage was skipped or cancelled, if applicable.
    pub reason: Option<String>,
    /// Wall-clock duration of the stage's execution, in milliseconds.
    pub duration_ms: u64,
    /// Optional caller-assigned version tag for this stage's output shape.
    pub version: Option<String>,
}

impl StageOutput {
    /// Builds a successful output.
    pub fn ok(data: HashMap<String, Value>, duration_ms: u64) -> Self {
        Self {
            status: StageStatus::Ok,
            data,
            artifacts: Vec::new(),
            events: Vec::new(),
            error: None,
            reason: None,
            duration_ms,
            version: None,
        }
    }

    /// Builds a skipped output, carrying the reason the stage did not run.
    pub fn skip(reason: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Skip,
            data: HashMap::new(),
            artifacts: Vec::new(),
            events: Vec::new(),
            error: None,
            reason: Some(reason.into()),
            duration_ms: 0,
            version: None,
        }
    }

    /// Builds a failed output.
    pub fn fail(message: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            status: StageStatus::Fail,
            data: HashMap::new(),
            artifacts: Vec::new(),
            events: Vec::new(),
            error: Some(message.into()),
            reason: None,
            duration_ms,
            version: None,
        }
    }

    /// Builds a cancelled output.
    pub fn cancel(reason: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            status: StageStatus::Cancel,
            data: HashMap::new(),
            artifacts: Vec::new(),
            events: Vec::new(),
            error: None,
            reason: Some(reason.into()),
            duration_ms,
            version: None,
        }
    }

    /// Attaches a version tag.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Appends an artifact.
    #[must_use]
    pub fn with_artifact(mut self, artifact: StageArtifact) -> Self {
        self.artifacts.push(artifact);
        self
    }

    /// Appends an event annotation. Used by interceptors' `after_stage`
    /// hooks to record an observation without mutating `data` or `status`.
    #[must_use]
    pub fn with_event(mut self, event: StageEvent) -> Self {
        self.events.push(event);
        self
    }

    /// Whether this output represents a successful run.
    pub fn is_ok(&self) -> bool {
        matches!(self.status, StageStatus::Ok)
    }
}
