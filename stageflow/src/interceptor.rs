// /////////////////////////////////////////////////////////////////////////////
// Stageflow
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////
//! Priority-ordered middleware wrapping stage execution.
//!
//! Interceptors compose like Russian dolls: `before_stage` hooks run
//! outward-in, in ascending priority order (lower priority numbers run
//! first, ties broken by registration order); `after_stage` hooks run the
//! reverse of whatever order their matching `before_stage` ran in.

use async_trait::async_trait;
use stageflow_domain::StageOutput;
use std::sync::Arc;
use std::time::Duration;

use crate::context::StageContext;
use crate::stage::Stage;

/// What a `before_stage` hook decides should happen next.
#[derive(Debug, Clone)]
pub enum BeforeDecision {
    /// Let the chain (and eventually the stage) continue.
    Continue,
    /// Skip the stage entirely with the given reason.
    Skip(String),
    /// Fail the stage entirely with the given message, without running it.
    Fail(String),
    /// Replace the stage's execution outright with a precomputed output.
    Replace(StageOutput),
}

/// What an `after_stage` hook decides about a completed output.
#[derive(Debug, Clone)]
pub enum AfterDecision {
    /// Keep the output (possibly annotated) and continue unwinding the chain.
    Continue(StageOutput),
    /// Replace the output outright.
    Replace(StageOutput),
}

impl AfterDecision {
    fn into_output(self) -> StageOutput {
        match self {
            Self::Continue(out) | Self::Replace(out) => out,
        }
    }
}

/// What an `on_error` hook decides about a failed output.
#[derive(Debug, Clone)]
pub enum ErrorDecision {
    /// Let the failure propagate unchanged.
    Propagate,
    /// Retry the stage after `delay`, up to `max` additional attempts.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Maximum number of additional attempts.
        max: usize,
    },
    /// Replace the failed output with a different one (e.g. a fallback
    /// value), stopping further retries.
    Replace(StageOutput),
}

/// One piece of cross-cutting middleware.
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// A short, stable name for logging and diagnostics.
    fn name(&self) -> &str;

    /// Lower values run their `before_stage` hook earlier and their
    /// `after_stage` hook later. Defaults to `0`.
    fn priority(&self) -> i32 {
        0
    }

    /// Called before the stage (or a later interceptor) runs.
    async fn before_stage(&self, _ctx: &StageContext) -> BeforeDecision {
        BeforeDecision::Continue
    }

    /// Called after the stage produced a non-failing output.
    async fn after_stage(&self, _ctx: &StageContext, output: StageOutput) -> AfterDecision {
        AfterDecision::Continue(output)
    }

    /// Called when the stage (or a retry of it) produced a failing output.
    async fn on_error(&self, _ctx: &StageContext, _output: &StageOutput) -> ErrorDecision {
        ErrorDecision::Propagate
    }

    /// An optional deadline for this single invocation (including retries).
    /// When more than one triggered interceptor declares a deadline, the
    /// chain honors the shortest one. Returning `None` (the default) means
    /// this interceptor has no opinion on timing.
    fn timeout(&self) -> Option<Duration> {
        None
    }
}

struct Entry {
    order: usize,
    interceptor: Arc<dyn Interceptor>,
}

/// An ordered collection of interceptors wrapping stage execution.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    entries: Arc<Vec<Entry>>,
}

impl InterceptorChain {
    /// An empty chain: stages run with no middleware at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a chain from a list of interceptors, ordering by
    /// `priority()` and, for ties, by position in `interceptors`.
    pub fn new(interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        let mut entries: Vec<Entry> = interceptors
            .into_iter()
            .enumerate()
            .map(|(order, interceptor)| Entry { order, interceptor })
            .collect();
        entries.sort_by_key(|e| (e.interceptor.priority(), e.order));
        Self { entries: Arc::new(entries) }
    }

    /// Runs `stage` through the full chain for one invocation.
    pub async fn run(&self, stage: &dyn Stage, ctx: &StageContext) -> StageOutput {
        let mut triggered = Vec::new();
        let mut short_circuit = None;

        for entry in self.entries.iter() {
            match entry.interceptor.before_stage(ctx).await {
                BeforeDecision::Continue => triggered.push(entry),
                BeforeDecision::Skip(reason) => {
                    short_circuit = Some(StageOutput::skip(reason));
                    break;
                }
                BeforeDecision::Fail(message) => {
                    short_circuit = Some(StageOutput::fail(message, 0));
                    break;
                }
                BeforeDecision::Replace(output) => {
                    short_circuit = Some(output);
                    break;
                }
            }
        }

        let deadline = triggered.iter().filter_map(|e| e.interceptor.timeout()).min();

        let mut output = match short_circuit {
            Some(output) => output,
            None => match deadline {
                Some(limit) => match tokio::time::timeout(limit, self.run_with_retries(stage, ctx, &triggered)).await {
                    Ok(output) => output,
                    Err(_) => StageOutput::fail(
                        format!("stage '{}' exceeded its {}ms timeout", ctx.stage_name(), limit.as_millis()),
                        limit.as_millis() as u64,
                    ),
                },
                None => self.run_with_retries(stage, ctx, &triggered).await,
            },
        };

        for entry in triggered.iter().rev() {
            output = entry.interceptor.after_stage(ctx, output).await.into_output();
        }

        output
    }

    async fn run_with_retries(&self, stage: &dyn Stage, ctx: &StageContext, entries: &[&Entry]) -> StageOutput {
        let mut output = stage.execute(ctx).await;
        let mut attempt: u64 = 0;
        loop {
            if !matches!(output.status, stageflow_domain::StageStatus::Fail) {
                return output;
            }
            let mut decision = ErrorDecision::Propagate;
            for entry in entries {
                decision = entry.interceptor.on_error(ctx, &output).await;
                if !matches!(decision, ErrorDecision::Propagate) {
                    break;
                }
            }
            match decision {
                ErrorDecision::Propagate => return output,
                ErrorDecision::Replace(replacement) => return replacement,
                ErrorDecision::Retry { delay, .. } => {
                    attempt += 1;
                    ctx.emit(&format!("stage.{}.retried", ctx.stage_name()), serde_json::json!({ "attempt": attempt }))
                        .await;
                    tokio::time::sleep(delay).await;
                    output = stage.execute(ctx).await;
                }
            }
        }
    }
}
