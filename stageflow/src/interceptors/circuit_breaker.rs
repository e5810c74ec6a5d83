// /////////////////////////////////////////////////////////////////////////////
// Stageflow
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////
//! Trips after a run of recent failures for a given operation key, refusing
//! further attempts until a cooldown window elapses.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::context::StageContext;
use crate::interceptor::{BeforeDecision, Interceptor};
use stageflow_domain::StageOutput;

struct Window {
    outcomes: VecDeque<bool>,
    opened_at: Option<Instant>,
}

/// A circuit breaker scoped to a single operation key (e.g.
/// `"summarize/openai"`), tracking a sliding window of recent pass/fail
/// outcomes and refusing to let the stage run while the circuit is open.
pub struct CircuitBreakerInterceptor {
    operation: String,
    window_size: usize,
    failure_threshold: usize,
    cooldown: Duration,
    state: Mutex<Window>,
}

impl CircuitBreakerInterceptor {
    /// Builds a circuit breaker for `operation`, tripping once
    /// `failure_threshold` of the last `window_size` attempts failed, and
    /// staying open for `cooldown` before allowing a trial attempt again.
    pub fn new(operation: impl Into<String>, window_size: usize, failure_threshold: usize, cooldown: Duration) -> Self {
        Self {
            operation: operation.into(),
            window_size: window_size.max(1),
            failure_threshold,
            cooldown,
            state: Mutex::new(Window { outcomes: VecDeque::new(), opened_at: None }),
        }
    }

    fn is_open(&self) -> bool {
        let state = self.state.lock();
        match state.opened_at {
            Some(opened_at) => opened_at.elapsed() < self.cooldown,
            None => false,
        }
    }

    fn record(&self, success: bool) {
        let mut state = self.state.lock();
        state.outcomes.push_back(success);
        if state.outcomes.len() > self.window_size {
            state.outcomes.pop_front();
        }
        let failures = state.outcomes.iter().filter(|ok| !**ok).count();
        if failures >= self.failure_threshold {
            state.opened_at = Some(Instant::now());
        } else if success {
            state.opened_at = None;
        }
    }
}

#[async_trait]
impl Interceptor for CircuitBreakerInterceptor {
    fn name(&self) -> &str {
        "circuit_breaker"
    }

    fn priority(&self) -> i32 {
        -50
    }

    async fn before_stage(&self, _ctx: &StageContext) -> BeforeDecision {
        if self.is_open() {
            return BeforeDecision::Fail(format!("circuit open for '{}'", self.operation));
        }
        BeforeDecision::Continue
    }

    async fn after_stage(&self, _ctx: &StageContext, output: StageOutput) -> crate::interceptor::AfterDecision {
        self.record(output.is_ok());
        crate::interceptor::AfterDecision::Continue(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interceptor::InterceptorChain;
    use crate::stage::Stage;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingCalls(Arc<AtomicUsize>);
    #[async_trait]
    impl Stage for CountingCalls {
        async fn execute(&self, _ctx: &StageContext) -> StageOutput {
            self.0.fetch_add(1, Ordering::SeqCst);
            StageOutput::fail("bad", 0)
        }
    }

    fn test_ctx() -> StageContext {
        use crate::context::PipelineContext;
        use crate::events::NoopEventSink;
        use stageflow_domain::{CallerIdentity, ContextSnapshot, RunId, StageInputs};
        let snapshot = ContextSnapshot::new(RunId::new(), CallerIdentity::default(), "");
        let pipeline_ctx = PipelineContext::new(snapshot, Arc::new(NoopEventSink));
        StageContext::new(pipeline_ctx, "s", StageInputs::new(&HashMap::new(), &[]))
    }

    #[tokio::test]
    async fn trips_after_threshold_and_blocks_the_stage() {
        let counter = Arc::new(AtomicUsize::new(0));
        let breaker = Arc::new(CircuitBreakerInterceptor::new("op", 5, 2, Duration::from_secs(60)));
        let chain = InterceptorChain::new(vec![breaker.clone()]);
        let ctx = test_ctx();
        let stage = CountingCalls(counter.clone());

        chain.run(&stage, &ctx).await;
        chain.run(&stage, &ctx).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);

        let output = chain.run(&stage, &ctx).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2, "third attempt must be blocked, not call the stage");
        assert!(!output.is_ok());
    }
}
