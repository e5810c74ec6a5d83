// /////////////////////////////////////////////////////////////////////////////
// Stageflow
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////
//! The run-level [`PipelineContext`] and the per-stage-invocation
//! [`StageContext`] built from it.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde_json::Value;
use stageflow_domain::{Capabilities, ContextBag, ContextSnapshot, EventSink, RunId, StageInputs, StageflowError};
use tokio::sync::watch;

/// A read-only, frozen view over a parent run's [`ContextBag`], handed to a
/// subrun's [`PipelineContext`]. Holds a flattened copy taken at fork time,
/// not a live reference to the parent — the parent keeps running and
/// mutating its own bag independently of whatever a child observed at fork.
#[derive(Clone)]
pub struct ParentDataView {
    frozen: Arc<std::collections::HashMap<String, Value>>,
}

impl ParentDataView {
    fn from_bag(bag: &ContextBag) -> Self {
        let frozen = bag.snapshot().into_iter().collect();
        Self { frozen: Arc::new(frozen) }
    }

    /// Reads a value the parent had written by the time this view was
    /// taken.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.frozen.get(key)
    }

    /// Attempting to write through a frozen parent view always fails: the
    /// view exists so a subrun can read its parent's data, not mutate it.
    ///
    /// # Errors
    /// Always returns [`StageflowError::ImmutableViewWrite`].
    pub fn write(&self, key: &str, _value: Value) -> Result<(), StageflowError> {
        Err(StageflowError::ImmutableViewWrite { key: key.to_string() })
    }
}

/// A cheap, `Arc`-shared monotonic clock stamped once per run. Retries
/// never reset it, so every stage and interceptor reports duration relative
/// to the same start instant.
#[derive(Clone)]
pub struct PipelineTimer {
    started_at: Instant,
}

impl PipelineTimer {
    fn new() -> Self {
        Self { started_at: Instant::now() }
    }

    /// Milliseconds elapsed since the run began.
    pub fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }
}

/// Run-scoped, `Arc`-shared state every stage in a pipeline run shares:
/// the context bag, the event sink, cancellation, the shared timer,
/// capability ports, and (for subruns) parent lineage.
pub struct PipelineContext {
    run_id: RunId,
    snapshot: Arc<ContextSnapshot>,
    /// The shared, conflict-detecting output store for this run.
    pub data: Arc<ContextBag>,
    event_sink: Arc<dyn EventSink>,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
    cancel_reason: RwLock<Option<String>>,
    timer: PipelineTimer,
    capabilities: Capabilities,
    config: Value,
    parent_data: Option<ParentDataView>,
    parent_run_id: Option<RunId>,
    parent_stage_id: Option<String>,
    correlation_id: Option<String>,
}

impl PipelineContext {
    /// Starts a fresh, top-level run.
    pub fn new(snapshot: ContextSnapshot, event_sink: Arc<dyn EventSink>) -> Arc<Self> {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Arc::new(Self {
            run_id: snapshot.run_id,
            snapshot: Arc::new(snapshot),
            data: Arc::new(ContextBag::new()),
            event_sink,
            cancel_tx,
            cancel_rx,
            cancel_reason: RwLock::new(None),
            timer: PipelineTimer::new(),
            capabilities: Capabilities::default(),
            config: Value::Null,
            parent_data: None,
            parent_run_id: None,
            parent_stage_id: None,
            correlation_id: None,
        })
    }

    /// Attaches capability ports. Chain this directly off [`Self::new`],
    /// before the returned `Arc` is cloned or shared with anything else.
    ///
    /// # Panics
    /// Panics if called on an `Arc` that already has another clone or weak
    /// reference outstanding.
    #[must_use]
    pub fn with_capabilities(mut self: Arc<Self>, capabilities: Capabilities) -> Arc<Self> {
        Arc::get_mut(&mut self).expect("with_capabilities called after the context was shared").capabilities =
            capabilities;
        self
    }

    /// Attaches a free-form config value, readable by every stage via
    /// [`StageContext::config`]. Chain this directly off [`Self::new`],
    /// before the returned `Arc` is cloned or shared with anything else.
    ///
    /// # Panics
    /// Panics if called on an `Arc` that already has another clone or weak
    /// reference outstanding.
    #[must_use]
    pub fn with_config(mut self: Arc<Self>, config: Value) -> Arc<Self> {
        Arc::get_mut(&mut self).expect("with_config called after the context was shared").config = config;
        self
    }

    /// The identifier of this run.
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// The immutable snapshot this run was started from.
    pub fn snapshot(&self) -> &ContextSnapshot {
        &self.snapshot
    }

    /// The run's capability ports.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// The run's free-form config value.
    pub fn config(&self) -> &Value {
        &self.config
    }

    /// Milliseconds elapsed since the run began.
    pub fn elapsed_ms(&self) -> u64 {
        self.timer.elapsed_ms()
    }

    /// A frozen, read-only view of the parent run's data at the moment
    /// this subrun was forked, for subruns. Not a live reference: the
    /// parent keeps mutating its own bag independently.
    pub fn parent_data(&self) -> Option<&ParentDataView> {
        self.parent_data.as_ref()
    }

    /// Reads a value the parent had written at fork time, for subruns.
    pub fn get_parent_data(&self, key: &str) -> Option<&Value> {
        self.parent_data.as_ref().and_then(|view| view.get(key))
    }

    /// The parent's run id, for subruns.
    pub fn parent_run_id(&self) -> Option<RunId> {
        self.parent_run_id
    }

    /// The name of the stage that forked this subrun, for subruns.
    pub fn parent_stage_id(&self) -> Option<&str> {
        self.parent_stage_id.as_deref()
    }

    /// The correlation id linking a subrun back to its ancestry.
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Whether this run has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    /// A receiver that resolves the next time this run is cancelled; used
    /// by the executor to race against in-flight stage futures.
    pub fn cancellation(&self) -> watch::Receiver<bool> {
        self.cancel_rx.clone()
    }

    /// The reason this run was cancelled, if it was.
    pub fn cancel_reason(&self) -> Option<String> {
        self.cancel_reason.read().clone()
    }

    /// Marks this run as cancelled with no specific reason recorded.
    pub fn mark_cancelled(&self) {
        self.mark_cancelled_with_reason("cancelled");
    }

    /// Marks this run as cancelled, recording why.
    pub fn mark_cancelled_with_reason(&self, reason: impl Into<String>) {
        *self.cancel_reason.write() = Some(reason.into());
        let _ = self.cancel_tx.send(true);
    }

    /// Emits a wide event, enriching its data with run-identifying fields.
    pub async fn emit(&self, event_type: &str, data: Value) {
        let enriched = enrich(data, self.run_id, self.parent_run_id, None);
        self.event_sink.emit(event_type, enriched).await;
    }

    /// Fires a wide event without waiting for the sink to accept it. The
    /// caller's path is never slowed or failed by a stalled or broken sink;
    /// the event is simply dropped if the emission doesn't finish.
    pub fn try_emit(self: &Arc<Self>, event_type: impl Into<String>, data: Value) {
        let event_type = event_type.into();
        let this = self.clone();
        tokio::spawn(async move {
            this.emit(&event_type, data).await;
        });
    }

    /// Forks a child [`PipelineContext`] for a subpipeline run.
    ///
    /// The child gets a fresh context bag, a frozen (cloned, not live) view
    /// of the parent's data readable via [`PipelineContext::get_parent_data`],
    /// the same event sink, and its own fresh (not pre-cancelled)
    /// cancellation state — callers that want cancellation to propagate from
    /// parent to child must observe both the parent's and the child's
    /// `cancellation()` receivers, which [`crate::subrun::fork`] does for
    /// them. The child holds no pointer back to the parent context itself,
    /// only this frozen data and the parent's identity, avoiding a cyclic
    /// parent/child reference.
    pub fn fork_for_subpipeline(
        self: &Arc<Self>,
        child_run_id: RunId,
        parent_stage_id: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Arc<Self> {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let mut child_snapshot = (*self.snapshot).clone();
        child_snapshot.run_id = child_run_id;
        Arc::new(Self {
            run_id: child_run_id,
            snapshot: Arc::new(child_snapshot),
            data: Arc::new(ContextBag::new()),
            event_sink: self.event_sink.clone(),
            cancel_tx,
            cancel_rx,
            cancel_reason: RwLock::new(None),
            timer: PipelineTimer::new(),
            capabilities: self.capabilities.clone(),
            config: self.config.clone(),
            parent_data: Some(ParentDataView::from_bag(&self.data)),
            parent_run_id: Some(self.run_id),
            parent_stage_id: Some(parent_stage_id.into()),
            correlation_id: Some(correlation_id.into()),
        })
    }
}

fn enrich(data: Value, run_id: RunId, parent_run_id: Option<RunId>, stage: Option<&str>) -> Value {
    let mut map = match data {
        Value::Object(map) => map,
        Value::Null => serde_json::Map::new(),
        other => {
            let mut map = serde_json::Map::new();
            map.insert("value".to_string(), other);
            map
        }
    };
    map.insert("event_id".to_string(), Value::String(uuid::Uuid::new_v4().to_string()));
    map.insert("timestamp".to_string(), Value::String(chrono::Utc::now().to_rfc3339()));
    map.insert("pipeline_run_id".to_string(), Value::String(run_id.to_string()));
    if let Some(parent) = parent_run_id {
        map.insert("parent_run_id".to_string(), Value::String(parent.to_string()));
    }
    if let Some(stage) = stage {
        map.insert("stage".to_string(), Value::String(stage.to_string()));
    }
    Value::Object(map)
}

/// The handle a single stage invocation receives: its name, its scoped
/// view over declared-dependency outputs, and a reference to the shared
/// [`PipelineContext`].
pub struct StageContext {
    pipeline_ctx: Arc<PipelineContext>,
    stage_name: String,
    inputs: StageInputs,
}

impl StageContext {
    /// Builds a stage's invocation context.
    pub fn new(pipeline_ctx: Arc<PipelineContext>, stage_name: impl Into<String>, inputs: StageInputs) -> Self {
        Self { pipeline_ctx, stage_name: stage_name.into(), inputs }
    }

    /// This stage's name.
    pub fn stage_name(&self) -> &str {
        &self.stage_name
    }

    /// This stage's scoped view over its dependencies' outputs.
    pub fn inputs(&self) -> &StageInputs {
        &self.inputs
    }

    /// The immutable snapshot this run was started from.
    pub fn snapshot(&self) -> &ContextSnapshot {
        self.pipeline_ctx.snapshot()
    }

    /// The run's free-form config value.
    pub fn config(&self) -> &Value {
        self.pipeline_ctx.config()
    }

    /// The shared context bag for this run.
    pub fn data(&self) -> &ContextBag {
        &self.pipeline_ctx.data
    }

    /// The run's capability ports.
    pub fn capabilities(&self) -> &Capabilities {
        self.pipeline_ctx.capabilities()
    }

    /// A reference to the shared run-level context.
    pub fn pipeline_ctx(&self) -> &Arc<PipelineContext> {
        &self.pipeline_ctx
    }

    /// Whether the run has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.pipeline_ctx.is_cancelled()
    }

    /// Emits a wide event, enriched with this stage's name in addition to
    /// the run-identifying fields [`PipelineContext::emit`] adds.
    pub async fn emit(&self, event_type: &str, data: Value) {
        let enriched = enrich(data, self.pipeline_ctx.run_id, self.pipeline_ctx.parent_run_id, Some(&self.stage_name));
        self.pipeline_ctx.event_sink.emit(event_type, enriched).await;
    }

    /// Fires a wide event, enriched with this stage's name, without waiting
    /// for the sink to accept it. See [`PipelineContext::try_emit`].
    pub fn try_emit(&self, event_type: impl Into<String>, data: Value) {
        let event_type = event_type.into();
        let pipeline_ctx = self.pipeline_ctx.clone();
        let stage_name = self.stage_name.clone();
        tokio::spawn(async move {
            let enriched = enrich(data, pipeline_ctx.run_id, pipeline_ctx.parent_run_id, Some(&stage_name));
            pipeline_ctx.event_sink.emit(&event_type, enriched).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stageflow_domain::CallerIdentity;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink(Arc<AtomicUsize>);

    #[async_trait::async_trait]
    impl EventSink for CountingSink {
        async fn emit(&self, _event_type: &str, _data: Value) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn snapshot() -> ContextSnapshot {
        ContextSnapshot::new(RunId::new(), CallerIdentity::default(), "")
    }

    #[tokio::test]
    async fn fork_gets_fresh_bag_and_shared_sink_and_fresh_cancellation() {
        let counter = Arc::new(AtomicUsize::new(0));
        let sink: Arc<dyn EventSink> = Arc::new(CountingSink(counter.clone()));
        let parent = PipelineContext::new(snapshot(), sink);
        parent.data.insert("k", Value::from(1), "stage-a").unwrap();
        parent.mark_cancelled_with_reason("parent stopped");

        let child = parent.fork_for_subpipeline(RunId::new(), "forking-stage", "corr-1");

        assert!(child.data.is_empty());
        assert_ne!(child.run_id(), parent.run_id());
        assert_eq!(child.parent_run_id(), Some(parent.run_id()));
        assert_eq!(child.get_parent_data("k"), Some(&Value::from(1)));
        assert!(!child.is_cancelled());

        child.emit("pipeline.started", Value::Null).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn try_emit_delivers_without_the_caller_awaiting_the_sink() {
        let counter = Arc::new(AtomicUsize::new(0));
        let sink: Arc<dyn EventSink> = Arc::new(CountingSink(counter.clone()));
        let ctx = PipelineContext::new(snapshot(), sink);
        ctx.try_emit("stream.buffer_overflow", Value::Null);
        // try_emit hands off to a background task; give it a chance to run.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn writing_through_a_frozen_parent_view_always_fails() {
        let view = ParentDataView::from_bag(&ContextBag::new());
        let err = view.write("k", Value::from(1)).unwrap_err();
        assert_eq!(err.code(), "IMMUTABLE_VIEW_WRITE");
    }

    #[test]
    fn with_config_chains_directly_off_new() {
        let sink: Arc<dyn EventSink> = Arc::new(NoopSink);
        let ctx = PipelineContext::new(snapshot(), sink).with_config(Value::from(42));
        assert_eq!(ctx.config(), &Value::from(42));
    }

    #[test]
    fn cancel_reason_is_recorded() {
        let sink: Arc<dyn EventSink> = Arc::new(stageflow_domain_test_sink());
        let ctx = PipelineContext::new(snapshot(), sink);
        assert!(!ctx.is_cancelled());
        ctx.mark_cancelled_with_reason("timeout");
        assert!(ctx.is_cancelled());
        assert_eq!(ctx.cancel_reason().as_deref(), Some("timeout"));
    }

    struct NoopSink;
    #[async_trait::async_trait]
    impl EventSink for NoopSink {
        async fn emit(&self, _event_type: &str, _data: Value) {}
    }
    fn stageflow_domain_test_sink() -> NoopSink {
        NoopSink
    }
}
