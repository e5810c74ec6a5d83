// /////////////////////////////////////////////////////////////////////////////
// Stageflow
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////
//! Error taxonomy for the pipeline engine.
//!
//! `StageflowError` enumerates every failure kind the engine itself can
//! raise (as opposed to errors a stage implementation chooses to surface
//! through its own `StageOutput`). Each variant carries enough detail to
//! reconstruct a `ContractErrorInfo` without re-parsing the message string.

use std::collections::HashMap;
use thiserror::Error;

/// Errors raised by the pipeline engine itself.
#[derive(Debug, Error)]
pub enum StageflowError {
    /// A pipeline was built with zero stages.
    #[error("pipeline '{pipeline}' has no stages")]
    EmptyPipeline {
        /// Name of the offending pipeline.
        pipeline: String,
    },

    /// A stage declared a dependency on a stage name that was never registered.
    #[error("stage '{stage}' depends on undeclared stage '{missing}'")]
    MissingDependency {
        /// The stage that declared the bad dependency.
        stage: String,
        /// The dependency name that does not exist.
        missing: String,
    },

    /// The dependency graph contains a cycle.
    #[error("cycle detected in pipeline graph: {}", path.join(" -> "))]
    CycleDetected {
        /// The cycle, starting and ending at the same stage name.
        path: Vec<String>,
    },

    /// A stage returned a failing `StageOutput` and aborted the run.
    #[error("stage '{stage}' failed: {message}")]
    StageExecutionFailed {
        /// Name of the failing stage.
        stage: String,
        /// The failure message the stage reported.
        message: String,
    },

    /// Two stages wrote distinct values to the same context bag key.
    #[error("context key '{key}' written by both '{first_writer}' and '{second_writer}'")]
    ContractConflict {
        /// The conflicting key.
        key: String,
        /// The stage that wrote the key first.
        first_writer: String,
        /// The stage that attempted to write the key again.
        second_writer: String,
    },

    /// The executor's ready set and running set both emptied out while
    /// stages remained unfinished; the graph cannot make progress.
    #[error("pipeline deadlocked with stages still pending: {}", pending.join(", "))]
    Deadlock {
        /// Stage names that never became ready.
        pending: Vec<String>,
    },

    /// A stage did not complete within its interceptor-enforced deadline.
    #[error("stage '{stage}' timed out after {elapsed_ms}ms")]
    Timeout {
        /// Name of the stage that timed out.
        stage: String,
        /// How long the stage ran before being timed out, in milliseconds.
        elapsed_ms: u64,
    },

    /// A circuit breaker interceptor refused to let a stage run.
    #[error("circuit open for '{operation}'")]
    CircuitOpen {
        /// The operation key the circuit breaker tracks.
        operation: String,
    },

    /// A subrun attempted to write into its frozen parent-data view.
    #[error("cannot write through an immutable parent-data view (key '{key}')")]
    ImmutableViewWrite {
        /// The key the subrun attempted to write.
        key: String,
    },

    /// A token presented to an auth interceptor failed validation.
    #[error("invalid token: {reason}")]
    InvalidToken {
        /// Why validation failed.
        reason: String,
    },

    /// A token presented to an auth interceptor was well-formed but expired.
    #[error("token expired")]
    TokenExpired,

    /// A token was valid but missing claims the pipeline requires.
    #[error("token is missing required claims: {}", missing.join(", "))]
    MissingClaims {
        /// The claim names that were absent.
        missing: Vec<String>,
    },

    /// The caller's organization did not match the resource's organization.
    #[error("cross-tenant access denied: caller org '{caller_org}' does not match resource org '{resource_org}'")]
    CrossTenantAccess {
        /// The org id carried by the caller's token.
        caller_org: String,
        /// The org id the resource belongs to.
        resource_org: String,
    },

    /// A pipeline name was looked up in the registry but never registered.
    #[error("pipeline '{name}' is not registered")]
    PipelineNotFound {
        /// The name that was looked up.
        name: String,
    },

    /// Something went wrong that does not fit any named category.
    #[error("internal error: {0}")]
    Internal(String),
}

impl StageflowError {
    /// Short, stable machine-readable code for this error, suitable for
    /// keying a [`suggestion_for`] lookup or for structured logging.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyPipeline { .. } => "EMPTY_PIPELINE",
            Self::MissingDependency { .. } => "MISSING_DEPENDENCY",
            Self::CycleDetected { .. } => "CYCLE_DETECTED",
            Self::StageExecutionFailed { .. } => "STAGE_EXECUTION_FAILED",
            Self::ContractConflict { .. } => "CONTRACT_CONFLICT",
            Self::Deadlock { .. } => "DEADLOCK",
            Self::Timeout { .. } => "TIMEOUT",
            Self::CircuitOpen { .. } => "CIRCUIT_OPEN",
            Self::ImmutableViewWrite { .. } => "IMMUTABLE_VIEW_WRITE",
            Self::InvalidToken { .. } => "INVALID_TOKEN",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::MissingClaims { .. } => "MISSING_CLAIMS",
            Self::CrossTenantAccess { .. } => "CROSS_TENANT_ACCESS",
            Self::PipelineNotFound { .. } => "PIPELINE_NOT_FOUND",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Whether this error represents a run that can be retried as-is
    /// (no structural change to the pipeline needed).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::CircuitOpen { .. })
    }

    /// Builds the [`ContractErrorInfo`] for this error, filling `context`
    /// with the error's own fields.
    pub fn info(&self) -> ContractErrorInfo {
        let mut info = suggestion_for(self.code());
        info.summary = self.to_string();
        info.context = self.context_map();
        info
    }

    fn context_map(&self) -> HashMap<String, String> {
        let mut ctx = HashMap::new();
        match self {
            Self::EmptyPipeline { pipeline } => {
                ctx.insert("pipeline".into(), pipeline.clone());
            }
            Self::MissingDependency { stage, missing } => {
                ctx.insert("stage".into(), stage.clone());
                ctx.insert("missing".into(), missing.clone());
            }
            Self::CycleDetected { path } => {
                ctx.insert("path".into(), path.join(" -> "));
            }
            Self::StageExecutionFailed { stage, message } => {
                ctx.insert("stage".into(), stage.clone());
                ctx.insert("message".into(), message.clone());
            }
            Self::ContractConflict { key, first_writer, second_writer } => {
                ctx.insert("key".into(), key.clone());
                ctx.insert("first_writer".into(), first_writer.clone());
                ctx.insert("second_writer".into(), second_writer.clone());
            }
            Self::Deadlock { pending } => {
                ctx.insert("pending".into(), pending.join(", "));
            }
            Self::Timeout { stage, elapsed_ms } => {
                ctx.insert("stage".into(), stage.clone());
                ctx.insert("elapsed_ms".into(), elapsed_ms.to_string());
            }
            Self::CircuitOpen { operation } => {
                ctx.insert("operation".into(), operation.clone());
            }
            Self::ImmutableViewWrite { key } => {
                ctx.insert("key".into(), key.clone());
            }
            Self::InvalidToken { reason } => {
                ctx.insert("reason".into(), reason.clone());
            }
            Self::MissingClaims { missing } => {
                ctx.insert("missing".into(), missing.join(", "));
            }
            Self::CrossTenantAccess { caller_org, resource_org } => {
                ctx.insert("caller_org".into(), caller_org.clone());
                ctx.insert("resource_org".into(), resource_org.clone());
            }
            Self::PipelineNotFound { name } => {
                ctx.insert("name".into(), name.clone());
            }
            Self::TokenExpired | Self::Internal(_) => {}
        }
        ctx
    }
}

impl From<serde_json::Error> for StageflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("serialization error: {err}"))
    }
}

/// A structured, user-facing description of an error: a stable code, a
/// human summary, a suggested fix, optional documentation link, and
/// free-form context for the specific occurrence.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ContractErrorInfo {
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable summary of what went wrong.
    pub summary: String,
    /// A suggestion for how to fix or work around the error.
    pub fix_hint: String,
    /// Link to documentation describing this error in more detail, if any.
    pub doc_url: Option<String>,
    /// Free-form key/value context describing this specific occurrence.
    pub context: HashMap<String, String>,
}

/// Looks up the static part of a [`ContractErrorInfo`] (summary template,
/// fix hint, doc url) for a known error code. Unknown codes get a generic
/// fallback rather than panicking, since this registry may be queried with
/// codes coined by a future error variant.
pub fn suggestion_for(code: &str) -> ContractErrorInfo {
    let (fix_hint, doc_url): (&str, Option<&str>) = match code {
        "EMPTY_PIPELINE" => (
            "Add at least one stage to the builder before calling build().",
            None,
        ),
        "MISSING_DEPENDENCY" => (
            "Register the dependency's stage before build(), or fix the typo in the dependency name.",
            None,
        ),
        "CYCLE_DETECTED" => (
            "Break the cycle by removing or reordering one of the listed dependencies.",
            None,
        ),
        "STAGE_EXECUTION_FAILED" => (
            "Inspect the failing stage's error message; the run stopped and downstream stages did not execute.",
            None,
        ),
        "CONTRACT_CONFLICT" => (
            "Only one stage may write a given context key; rename one of the two keys or remove the duplicate write.",
            None,
        ),
        "DEADLOCK" => (
            "This indicates a scheduler bug or a graph that passed validation but cannot converge; file a report with the pending stage list.",
            None,
        ),
        "TIMEOUT" => (
            "Increase the stage's timeout budget or investigate why the stage is running long.",
            None,
        ),
        "CIRCUIT_OPEN" => (
            "Wait for the circuit breaker's cooldown window to elapse, or investigate the upstream failures that tripped it.",
            None,
        ),
        "IMMUTABLE_VIEW_WRITE" => (
            "Write to the subrun's own context bag instead of the frozen parent-data view.",
            None,
        ),
        "INVALID_TOKEN" | "TOKEN_EXPIRED" | "MISSING_CLAIMS" => (
            "Re-authenticate and supply a fresh, complete token.",
            None,
        ),
        "CROSS_TENANT_ACCESS" => (
            "Confirm the caller's organization matches the resource being accessed.",
            None,
        ),
        "PIPELINE_NOT_FOUND" => (
            "Register the pipeline under this name before looking it up.",
            None,
        ),
        _ => ("No specific guidance is available for this error.", None),
    };
    ContractErrorInfo {
        code: code.to_string(),
        summary: String::new(),
        fix_hint: fix_hint.to_string(),
        doc_url: doc_url.map(str::to_string),
        context: HashMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_is_stable_per_variant() {
        let err = StageflowError::EmptyPipeline { pipeline: "p".into() };
        assert_eq!(err.code(), "EMPTY_PIPELINE");
    }

    #[test]
    fn info_fills_context_from_variant_fields() {
        let err = StageflowError::MissingDependency {
            stage: "b".into(),
            missing: "a".into(),
        };
        let info = err.info();
        assert_eq!(info.code, "MISSING_DEPENDENCY");
        assert_eq!(info.context.get("stage").unwrap(), "b");
        assert_eq!(info.context.get("missing").unwrap(), "a");
        assert!(!info.fix_hint.is_empty());
    }

    #[test]
    fn unknown_code_falls_back_gracefully() {
        let info = suggestion_for("SOMETHING_NEW");
        assert_eq!(info.code, "SOMETHING_NEW");
        assert!(!info.fix_hint.is_empty());
    }

    #[test]
    fn timeout_is_recoverable_but_missing_dependency_is_not() {
        assert!(StageflowError::Timeout { stage: "s".into(), elapsed_ms: 10 }.is_recoverable());
        assert!(!StageflowError::MissingDependency { stage: "a".into(), missing: "b".into() }.is_recoverable());
    }
}
