// /////////////////////////////////////////////////////////////////////////////
// Stageflow
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! End-to-end scenarios exercising a full build -> execute cycle through the
//! public API: a linear chain, parallel fan-in, cycle detection, mid-run
//! cancellation, and write-conflict detection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use stageflow::prelude::*;

fn snapshot_with(input_text: &str) -> ContextSnapshot {
    ContextSnapshot::new(RunId::new(), CallerIdentity::default(), input_text)
}

fn run_ctx(snapshot: ContextSnapshot, sink: Arc<RecordingEventSink>) -> Arc<PipelineContext> {
    PipelineContext::new(snapshot, sink)
}

struct Echo;
#[async_trait]
impl Stage for Echo {
    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        let text = ctx.snapshot().input_text.as_str();
        let mut data = HashMap::new();
        data.insert("echo".to_string(), Value::String(text.to_string()));
        StageOutput::ok(data, 0)
    }
}

#[tokio::test]
async fn single_stage_echoes_input() {
    let graph = PipelineBuilder::new("echo-pipeline").stage("echo", Arc::new(Echo)).build().unwrap();
    let sink = Arc::new(RecordingEventSink::new());
    let ctx = run_ctx(snapshot_with("Hello"), sink.clone());

    let outcome = execute(&graph, ctx, &InterceptorChain::empty(), RunOptions::default()).await;

    let results = match outcome {
        ExecutionOutcome::Completed(results) => results,
        other => panic!("expected Completed, got {other:?}"),
    };
    assert_eq!(results["echo"].status, StageStatus::Ok);
    assert_eq!(results["echo"].data["echo"], json!("Hello"));

    assert_eq!(
        sink.event_types(),
        vec!["pipeline.started", "stage.echo.started", "stage.echo.completed", "pipeline.completed"]
    );
}

struct Upper;
#[async_trait]
impl Stage for Upper {
    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        let text = ctx.snapshot().input_text.as_str();
        let mut data = HashMap::new();
        data.insert("text".to_string(), Value::String(text.to_uppercase()));
        StageOutput::ok(data, 0)
    }
}

struct Reverse;
#[async_trait]
impl Stage for Reverse {
    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        let text = ctx.inputs().value_of("upper", "text").and_then(Value::as_str).unwrap_or_default();
        let mut data = HashMap::new();
        data.insert("text".to_string(), Value::String(text.chars().rev().collect()));
        StageOutput::ok(data, 0)
    }
}

struct Summarize;
#[async_trait]
impl Stage for Summarize {
    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        let text = ctx.inputs().value_of("reverse", "text").and_then(Value::as_str).unwrap_or_default();
        let mut data = HashMap::new();
        data.insert("text".to_string(), Value::String(format!("{text} (summary)")));
        StageOutput::ok(data, 0)
    }
}

#[tokio::test]
async fn linear_chain_runs_in_strict_dependency_order() {
    let graph = PipelineBuilder::new("transform-chain")
        .stage("upper", Arc::new(Upper))
        .stage_with_deps("reverse", Arc::new(Reverse), ["upper"])
        .stage_with_deps("summarize", Arc::new(Summarize), ["reverse"])
        .build()
        .unwrap();
    let sink = Arc::new(RecordingEventSink::new());
    let ctx = run_ctx(snapshot_with("abcDEF"), sink.clone());

    let outcome = execute(&graph, ctx, &InterceptorChain::empty(), RunOptions::default()).await;

    let results = match outcome {
        ExecutionOutcome::Completed(results) => results,
        other => panic!("expected Completed, got {other:?}"),
    };
    assert_eq!(results["upper"].data["text"], json!("ABCDEF"));
    assert_eq!(results["reverse"].data["text"], json!("FEDCBA"));
    assert!(results["summarize"].data["text"].as_str().unwrap().starts_with("FEDCBA"));

    let event_types = sink.event_types();
    let starts: Vec<&str> = event_types
        .iter()
        .filter_map(|e| e.strip_suffix(".started").and_then(|e| e.strip_prefix("stage.")))
        .map(|name| match name {
            "upper" => "upper",
            "reverse" => "reverse",
            "summarize" => "summarize",
            other => other,
        })
        .collect();
    assert_eq!(starts, vec!["upper", "reverse", "summarize"]);
}

struct SleepAndWrite {
    key: &'static str,
    millis: u64,
}
#[async_trait]
impl Stage for SleepAndWrite {
    async fn execute(&self, _ctx: &StageContext) -> StageOutput {
        tokio::time::sleep(Duration::from_millis(self.millis)).await;
        let mut data = HashMap::new();
        data.insert(self.key.to_string(), json!(self.millis));
        StageOutput::ok(data, 0)
    }
}

struct FanIn;
#[async_trait]
impl Stage for FanIn {
    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        let mut seen: Vec<&str> = ctx.inputs().available_dependencies().collect();
        seen.sort();
        let mut data = HashMap::new();
        data.insert("seen".to_string(), json!(seen));
        StageOutput::ok(data, 0)
    }
}

#[tokio::test]
async fn independent_branches_fan_in_and_run_in_parallel() {
    let graph = PipelineBuilder::new("fan-in")
        .add(StageSpec::new("a", Arc::new(SleepAndWrite { key: "a", millis: 300 })))
        .add(StageSpec::new("b", Arc::new(SleepAndWrite { key: "b", millis: 250 })))
        .add(StageSpec::new("c", Arc::new(FanIn)).depends_on(["a", "b"]))
        .build()
        .unwrap();
    let sink = Arc::new(RecordingEventSink::new());
    let ctx = run_ctx(snapshot_with(""), sink);

    let start = std::time::Instant::now();
    let outcome = execute(&graph, ctx, &InterceptorChain::empty(), RunOptions::default()).await;
    let elapsed = start.elapsed();

    assert!(elapsed < Duration::from_millis(400), "fan-in took {elapsed:?}, expected parallel execution");
    let results = match outcome {
        ExecutionOutcome::Completed(results) => results,
        other => panic!("expected Completed, got {other:?}"),
    };
    assert_eq!(results["c"].data["seen"], json!(["a", "b"]));
}

struct NoOp;
#[async_trait]
impl Stage for NoOp {
    async fn execute(&self, _ctx: &StageContext) -> StageOutput {
        StageOutput::ok(HashMap::new(), 0)
    }
}

#[test]
fn cycle_is_detected_with_a_deterministic_path() {
    let err = PipelineBuilder::new("cyclic")
        .add(StageSpec::new("a", Arc::new(NoOp)).depends_on(["c"]))
        .add(StageSpec::new("b", Arc::new(NoOp)).depends_on(["a"]))
        .add(StageSpec::new("c", Arc::new(NoOp)).depends_on(["b"]))
        .build()
        .unwrap_err();

    assert_eq!(err.code(), "CYCLE_DETECTED");
    match err {
        StageflowError::CycleDetected { path } => {
            assert_eq!(path.first(), path.last());
            assert_eq!(path.len(), 4);
            for edge in path.windows(2) {
                assert!(["a", "b", "c"].contains(&edge[0].as_str()));
                assert!(["a", "b", "c"].contains(&edge[1].as_str()));
            }
        }
        other => panic!("expected CycleDetected, got {other:?}"),
    }
}

struct QuickFinish;
#[async_trait]
impl Stage for QuickFinish {
    async fn execute(&self, _ctx: &StageContext) -> StageOutput {
        StageOutput::ok(HashMap::new(), 0)
    }
}

struct LongRunning(Arc<AtomicBool>);
#[async_trait]
impl Stage for LongRunning {
    async fn execute(&self, _ctx: &StageContext) -> StageOutput {
        tokio::time::sleep(Duration::from_secs(5)).await;
        self.0.store(true, Ordering::SeqCst);
        StageOutput::ok(HashMap::new(), 0)
    }
}

#[tokio::test]
async fn cancellation_mid_run_returns_partial_results_and_skips_downstream() {
    let long_running_finished = Arc::new(AtomicBool::new(false));
    let graph = PipelineBuilder::new("cancel-mid-run")
        .add(StageSpec::new("a", Arc::new(QuickFinish)))
        .add(StageSpec::new("b", Arc::new(LongRunning(long_running_finished.clone()))).depends_on(["a"]))
        .add(StageSpec::new("c", Arc::new(QuickFinish)).depends_on(["a"]))
        .add(StageSpec::new("d", Arc::new(QuickFinish)).depends_on(["b", "c"]))
        .build()
        .unwrap();
    let sink = Arc::new(RecordingEventSink::new());
    let ctx = run_ctx(snapshot_with(""), sink.clone());

    let run_ctx_handle = ctx.clone();
    let options = RunOptions { cancellation_grace_period: Duration::from_millis(50), ..Default::default() };
    let runner =
        tokio::spawn(async move { execute(&graph, run_ctx_handle, &InterceptorChain::empty(), options).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    ctx.mark_cancelled_with_reason("caller requested cancellation");

    let outcome = runner.await.unwrap();
    match outcome {
        ExecutionOutcome::Cancelled { partial, .. } => {
            assert!(partial.contains_key("a"));
            assert!(!partial.contains_key("d"));
        }
        other => panic!("expected Cancelled, got {other:?}"),
    }
    assert!(!sink.event_types().iter().any(|e| e == "stage.d.started"));
    assert!(!long_running_finished.load(Ordering::SeqCst));
}

struct WriteShared(Value, u64);
#[async_trait]
impl Stage for WriteShared {
    async fn execute(&self, _ctx: &StageContext) -> StageOutput {
        tokio::time::sleep(Duration::from_millis(self.1)).await;
        let mut data = HashMap::new();
        data.insert("shared".to_string(), self.0.clone());
        StageOutput::ok(data, 0)
    }
}

#[tokio::test]
async fn two_stages_writing_the_same_key_conflict() {
    let graph = PipelineBuilder::new("conflict")
        .add(StageSpec::new("first", Arc::new(WriteShared(json!("from-first"), 10))))
        .add(StageSpec::new("second", Arc::new(WriteShared(json!("from-second"), 60))))
        .build()
        .unwrap();
    let sink = Arc::new(RecordingEventSink::new());
    let ctx = run_ctx(snapshot_with(""), sink.clone());

    let outcome = execute(&graph, ctx, &InterceptorChain::empty(), RunOptions::default()).await;

    match outcome {
        ExecutionOutcome::Failed { error, .. } => {
            assert_eq!(error.code(), "CONTRACT_CONFLICT");
        }
        other => panic!("expected Failed with a contract conflict, got {other:?}"),
    }
    assert!(sink.event_types().contains(&"pipeline.failed".to_string()));
}
