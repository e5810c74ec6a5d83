// /////////////////////////////////////////////////////////////////////////////
// Stageflow
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////
//! Error taxonomy for tool-calling stages.
//!
//! No tool registry or approval workflow is implemented here: those are
//! concerns of a concrete tool-calling stage, which lives outside this
//! crate. This module exists so that taxonomy is complete and ready for a
//! future concrete implementation to adopt without inventing its own error
//! shape.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Failures a tool-calling stage may report.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The named tool is not known to whatever executor is handling it.
    #[error("tool '{0}' not found")]
    NotFound(String),
    /// The caller is not permitted to invoke this tool.
    #[error("tool '{0}' denied")]
    Denied(String),
    /// A human-in-the-loop approval request was explicitly denied.
    #[error("approval denied for tool '{0}'")]
    ApprovalDenied(String),
    /// A human-in-the-loop approval request timed out waiting for a
    /// response.
    #[error("approval for tool '{0}' timed out")]
    ApprovalTimeout(String),
    /// A tool call's compensating (undo) action failed.
    #[error("undo failed for tool '{0}': {1}")]
    UndoFailed(String, String),
}

/// The minimal surface a concrete tool executor must satisfy. Not invoked
/// by anything in this crate; provided so callers have a stable interface
/// to implement against.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Invokes `tool_name` with `input`, returning its raw output.
    async fn call(&self, tool_name: &str, input: Value) -> Result<Value, ToolError>;
}
