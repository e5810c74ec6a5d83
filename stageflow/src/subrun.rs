// /////////////////////////////////////////////////////////////////////////////
// Stageflow
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////
//! Forking a child pipeline run from within a running stage.

use std::sync::Arc;

use crate::context::PipelineContext;
use stageflow_domain::RunId;

/// Lineage linking a subrun back to the run and stage that spawned it.
#[derive(Debug, Clone)]
pub struct SubrunLineage {
    /// The new run's own identifier.
    pub run_id: RunId,
    /// The parent run's identifier.
    pub parent_run_id: RunId,
    /// The name of the stage in the parent run that forked this subrun.
    pub parent_stage_id: String,
    /// An identifier correlating this subrun with its ancestry, for
    /// observability systems that want to group a whole tree of runs.
    pub correlation_id: String,
}

/// Forks `parent` into a fresh child [`PipelineContext`] for a subpipeline
/// run, along with the lineage describing how the child relates to its
/// parent.
///
/// The child starts with its own empty context bag and its own
/// cancellation state; cancelling the parent does not retroactively cancel
/// an already-running child unless the caller also observes and forwards
/// `parent.cancellation()` into the child's execution — subruns are linked,
/// not automatically failing, by design.
pub fn fork(parent: &Arc<PipelineContext>, parent_stage_id: impl Into<String>) -> (Arc<PipelineContext>, SubrunLineage) {
    let parent_stage_id = parent_stage_id.into();
    let correlation_id = parent.correlation_id().map(str::to_string).unwrap_or_else(|| parent.run_id().to_string());
    let child_run_id = RunId::new();
    let child_ctx = parent.fork_for_subpipeline(child_run_id, parent_stage_id.clone(), correlation_id.clone());
    let lineage = SubrunLineage {
        run_id: child_run_id,
        parent_run_id: parent.run_id(),
        parent_stage_id,
        correlation_id,
    };
    (child_ctx, lineage)
}

/// Spawns a task that cancels `child` whenever `parent` is cancelled,
/// giving a forked subrun linked (rather than inherited) cancellation: the
/// child keeps running if it was already past the point where cancellation
/// matters, but a still-in-flight child observes the parent's cancellation
/// at its own next suspension point.
pub fn link_cancellation(parent: Arc<PipelineContext>, child: Arc<PipelineContext>) -> tokio::task::JoinHandle<()> {
    let mut parent_cancel = parent.cancellation();
    tokio::spawn(async move {
        if parent_cancel.changed().await.is_ok() && *parent_cancel.borrow() {
            let reason = parent.cancel_reason().unwrap_or_else(|| "parent run cancelled".to_string());
            child.mark_cancelled_with_reason(format!("parent cancelled: {reason}"));
        }
    })
}
