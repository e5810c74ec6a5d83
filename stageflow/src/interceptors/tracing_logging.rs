// /////////////////////////////////////////////////////////////////////////////
// Stageflow
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////
//! Structured logging for stage execution, with no influence on outcome.

use async_trait::async_trait;

use crate::context::StageContext;
use crate::interceptor::{AfterDecision, BeforeDecision, Interceptor};
use stageflow_domain::{StageEvent, StageOutput, StageStatus};

/// Emits `tracing` events at stage start and finish. Never returns
/// anything other than `Continue`/identity, so it can be composed with any
/// other interceptor without changing behavior.
pub struct TracingLoggingInterceptor;

#[async_trait]
impl Interceptor for TracingLoggingInterceptor {
    fn name(&self) -> &str {
        "tracing_logging"
    }

    fn priority(&self) -> i32 {
        -1000
    }

    async fn before_stage(&self, ctx: &StageContext) -> BeforeDecision {
        tracing::debug!(stage = ctx.stage_name(), "stage starting");
        BeforeDecision::Continue
    }

    async fn after_stage(&self, ctx: &StageContext, output: StageOutput) -> AfterDecision {
        let annotation = match output.status {
            StageStatus::Ok => {
                tracing::debug!(stage = ctx.stage_name(), duration_ms = output.duration_ms, "stage completed");
                None
            }
            StageStatus::Skip => {
                tracing::debug!(stage = ctx.stage_name(), reason = output.reason.as_deref(), "stage skipped");
                Some(StageEvent::new("skipped", serde_json::json!({ "reason": output.reason })))
            }
            StageStatus::Fail => {
                tracing::warn!(stage = ctx.stage_name(), error = output.error.as_deref(), "stage failed");
                Some(StageEvent::new("failed", serde_json::json!({ "error": output.error })))
            }
            StageStatus::Cancel => {
                tracing::warn!(stage = ctx.stage_name(), "stage cancelled");
                Some(StageEvent::new("cancelled", serde_json::json!({ "reason": output.reason })))
            }
        };
        let output = match annotation {
            Some(event) => output.with_event(event),
            None => output,
        };
        AfterDecision::Continue(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interceptor::InterceptorChain;
    use crate::stage::Stage;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Arc;

    struct Failing;
    #[async_trait]
    impl Stage for Failing {
        async fn execute(&self, _ctx: &StageContext) -> StageOutput {
            StageOutput::fail("boom", 0)
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
    async fn a_failed_stage_is_annotated_with_a_failed_event() {
        let chain = InterceptorChain::new(vec![Arc::new(TracingLoggingInterceptor)]);
        let ctx = test_ctx();
        let output = chain.run(&Failing, &ctx).await;
        assert_eq!(output.events.len(), 1);
        assert_eq!(output.events[0].r#type, "failed");
    }
}
