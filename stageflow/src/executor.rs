// /////////////////////////////////////////////////////////////////////////////
// Stageflow
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////
//! The concurrent DAG executor.
//!
//! Stages become ready the moment every dependency has finished (not just
//! started); the executor launches every ready stage concurrently via a
//! [`tokio::task::JoinSet`] and reacts to whichever finishes first, rather
//! than running a fixed topological order one stage at a time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock as SyncRwLock;
use serde_json::json;
use stageflow_domain::{StageInputs, StageOutput, StageStatus, StageflowError};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::context::{PipelineContext, StageContext};
use crate::graph::StageGraph;
use crate::interceptor::InterceptorChain;

const SKIP_REASON_UPSTREAM_UNAVAILABLE: &str = "upstream_unavailable";

/// Default time cancellation gives running stages to finish on their own
/// before they are forcibly aborted.
pub const DEFAULT_CANCELLATION_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// How a run's options tune the executor without changing its semantics.
#[derive(Clone)]
pub struct RunOptions {
    /// Caps how many stages may run concurrently. `None` means unbounded
    /// (limited only by how many stages are simultaneously ready).
    pub max_concurrency: Option<usize>,
    /// How long cancellation waits for already-running stages to finish on
    /// their own before abandoning them. Stages that miss this window are
    /// aborted and contribute no output to the cancelled outcome.
    pub cancellation_grace_period: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { max_concurrency: None, cancellation_grace_period: DEFAULT_CANCELLATION_GRACE_PERIOD }
    }
}

/// The terminal result of running a [`StageGraph`] to completion.
#[derive(Debug)]
pub enum ExecutionOutcome {
    /// Every stage finished (with `Ok` or `Skip` status); no stage failed
    /// and the run was not cancelled.
    Completed(HashMap<String, StageOutput>),
    /// The run was cancelled before every stage finished.
    Cancelled {
        /// Outputs of whichever stages finished before cancellation.
        partial: HashMap<String, StageOutput>,
        /// Why the run was cancelled.
        reason: String,
    },
    /// A stage failed (or the executor hit an internal error), aborting the
    /// run.
    Failed {
        /// The stage whose failure aborted the run.
        stage: String,
        /// The error that aborted the run.
        error: StageflowError,
    },
}

/// Runs `graph` to completion under `ctx`, honoring `options`.
///
/// Emits exactly one `pipeline.started` event before any stage runs and
/// exactly one `pipeline.{completed,cancelled,failed}` terminal event once
/// the run settles, regardless of which of the loop's several return paths
/// produced the outcome.
pub async fn execute(
    graph: &StageGraph,
    ctx: Arc<PipelineContext>,
    chain: &InterceptorChain,
    options: RunOptions,
) -> ExecutionOutcome {
    ctx.emit("pipeline.started", json!({})).await;
    let outcome = run_to_completion(graph, ctx.clone(), chain, options).await;
    match &outcome {
        ExecutionOutcome::Completed(_) => ctx.emit("pipeline.completed", json!({})).await,
        ExecutionOutcome::Cancelled { reason, .. } => {
            ctx.emit("pipeline.cancelled", json!({ "reason": reason })).await
        }
        ExecutionOutcome::Failed { stage, error } => {
            ctx.emit("pipeline.failed", json!({ "stage": stage, "code": error.code() })).await
        }
    }
    outcome
}

async fn run_to_completion(
    graph: &StageGraph,
    ctx: Arc<PipelineContext>,
    chain: &InterceptorChain,
    options: RunOptions,
) -> ExecutionOutcome {
    let total = graph.len();
    let semaphore = options.max_concurrency.map(|n| Arc::new(Semaphore::new(n.max(1))));

    let mut in_degree: HashMap<String, usize> =
        graph.stages().map(|s| (s.name.clone(), s.dependencies.len())).collect();

    let completed: Arc<SyncRwLock<HashMap<String, StageOutput>>> = Arc::new(SyncRwLock::new(HashMap::new()));
    let mut finalized: std::collections::HashSet<String> = std::collections::HashSet::new();
    let mut tasks: JoinSet<(String, StageOutput)> = JoinSet::new();

    let mut ready: Vec<String> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(name, _)| name.clone())
        .collect();
    ready.sort();

    for name in ready {
        spawn_stage(&mut tasks, graph, &name, ctx.clone(), chain.clone(), completed.clone(), semaphore.clone());
    }

    let mut cancel_rx = ctx.cancellation();

    while finalized.len() < total {
        if ctx.is_cancelled() {
            abort_all(&mut tasks, &completed, options.cancellation_grace_period).await;
            return ExecutionOutcome::Cancelled {
                partial: completed.read().clone(),
                reason: ctx.cancel_reason().unwrap_or_else(|| "cancelled".to_string()),
            };
        }

        if tasks.is_empty() {
            let pending: Vec<String> =
                graph.stages().map(|s| s.name.clone()).filter(|n| !finalized.contains(n)).collect();
            let mut pending = pending;
            pending.sort();
            return ExecutionOutcome::Failed {
                stage: pending.first().cloned().unwrap_or_default(),
                error: StageflowError::Deadlock { pending },
            };
        }

        tokio::select! {
            biased;
            changed = cancel_rx.changed() => {
                if changed.is_ok() && *cancel_rx.borrow() {
                    abort_all(&mut tasks, &completed, options.cancellation_grace_period).await;
                    return ExecutionOutcome::Cancelled {
                        partial: completed.read().clone(),
                        reason: ctx.cancel_reason().unwrap_or_else(|| "cancelled".to_string()),
                    };
                }
            }
            joined = tasks.join_next() => {
                let (stage_name, output) = match joined {
                    Some(Ok(pair)) => pair,
                    Some(Err(join_err)) => {
                        abort_all(&mut tasks, &completed, Duration::ZERO).await;
                        return ExecutionOutcome::Failed {
                            stage: "<unknown>".to_string(),
                            error: StageflowError::Internal(format!("stage task panicked or was cancelled: {join_err}")),
                        };
                    }
                    None => continue,
                };

                match output.status {
                    StageStatus::Fail => {
                        abort_all(&mut tasks, &completed, Duration::ZERO).await;
                        return ExecutionOutcome::Failed {
                            stage: stage_name.clone(),
                            error: StageflowError::StageExecutionFailed {
                                stage: stage_name,
                                message: output.error.clone().unwrap_or_default(),
                            },
                        };
                    }
                    StageStatus::Cancel => {
                        let reason = output.reason.clone().unwrap_or_else(|| "cancelled".to_string());
                        ctx.mark_cancelled_with_reason(reason.clone());
                        abort_all(&mut tasks, &completed, options.cancellation_grace_period).await;
                        return ExecutionOutcome::Cancelled { partial: completed.read().clone(), reason };
                    }
                    StageStatus::Ok if output.reason.is_none() => {
                        if let Err(conflict) = write_outputs_to_bag(&ctx, &stage_name, &output) {
                            abort_all(&mut tasks, &completed, Duration::ZERO).await;
                            return ExecutionOutcome::Failed { stage: stage_name, error: conflict };
                        }
                    }
                    _ => {}
                }

                finalized.insert(stage_name.clone());
                completed.write().insert(stage_name.clone(), output);

                let mut newly_ready: Vec<String> = graph
                    .dependents_of(&stage_name)
                    .filter(|dep| !finalized.contains(*dep))
                    .filter_map(|dep| {
                        let degree = in_degree.get_mut(dep)?;
                        *degree -= 1;
                        (*degree == 0).then(|| dep.to_string())
                    })
                    .collect();
                newly_ready.sort();

                for name in newly_ready {
                    spawn_stage(&mut tasks, graph, &name, ctx.clone(), chain.clone(), completed.clone(), semaphore.clone());
                }
            }
        }
    }

    let completed_outputs = completed.read().clone();
    ExecutionOutcome::Completed(completed_outputs)
}

fn write_outputs_to_bag(ctx: &PipelineContext, stage_name: &str, output: &StageOutput) -> Result<(), StageflowError> {
    for (key, value) in &output.data {
        ctx.data.insert(key.clone(), value.clone(), stage_name)?;
    }
    Ok(())
}

/// Signals cancellation is underway and gives already-running stages
/// `grace_period` to finish and contribute their output before abandoning
/// whatever is left.
async fn abort_all(
    tasks: &mut JoinSet<(String, StageOutput)>,
    completed: &Arc<SyncRwLock<HashMap<String, StageOutput>>>,
    grace_period: Duration,
) {
    if !tasks.is_empty() {
        let _ = tokio::time::timeout(grace_period, async {
            while let Some(joined) = tasks.join_next().await {
                if let Ok((name, output)) = joined {
                    completed.write().insert(name, output);
                }
            }
        })
        .await;
    }
    tasks.abort_all();
}

fn spawn_stage(
    tasks: &mut JoinSet<(String, StageOutput)>,
    graph: &StageGraph,
    name: &str,
    ctx: Arc<PipelineContext>,
    chain: InterceptorChain,
    completed: Arc<SyncRwLock<HashMap<String, StageOutput>>>,
    semaphore: Option<Arc<Semaphore>>,
) {
    let Some(spec) = graph.stage(name) else { return };
    let spec = spec.clone();
    let name = name.to_string();

    tasks.spawn(async move {
        let _permit = match &semaphore {
            Some(sem) => sem.clone().acquire_owned().await.ok(),
            None => None,
        };

        let snapshot = completed.read().clone();
        let inputs = StageInputs::new(&snapshot, &spec.dependencies);

        // A dependency that finished OK never blocks; one that was SKIPped
        // only blocks a non-conditional dependent. FAIL/CANCEL upstream
        // outputs never reach here because those statuses already abort
        // the whole run before any dependent is spawned.
        let blocked_on_upstream = spec.dependencies.iter().any(|dep| match snapshot.get(dep).map(|o| o.status) {
            Some(StageStatus::Ok) => false,
            Some(StageStatus::Skip) => !spec.conditional,
            _ => true,
        });

        if blocked_on_upstream {
            let stage_ctx = StageContext::new(ctx.clone(), name.clone(), inputs);
            stage_ctx
                .emit(&format!("stage.{name}.skipped"), json!({ "reason": SKIP_REASON_UPSTREAM_UNAVAILABLE }))
                .await;
            return (name, StageOutput::skip(SKIP_REASON_UPSTREAM_UNAVAILABLE));
        }

        let stage_ctx = StageContext::new(ctx.clone(), name.clone(), inputs);
        stage_ctx.emit(&format!("stage.{name}.started"), json!({})).await;

        let started = ctx.elapsed_ms();
        let stage = spec.runner.resolve();
        let mut output = chain.run(stage.as_ref(), &stage_ctx).await;
        if output.duration_ms == 0 {
            output.duration_ms = ctx.elapsed_ms().saturating_sub(started);
        }

        let suffix = match output.status {
            StageStatus::Ok => "completed",
            StageStatus::Skip => "skipped",
            StageStatus::Fail => "failed",
            StageStatus::Cancel => "cancelled",
        };
        stage_ctx
            .emit(&format!("stage.{name}.{suffix}"), json!({ "status": suffix, "duration_ms": output.duration_ms }))
            .await;

        (name, output)
    });
}
