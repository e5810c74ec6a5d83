// /////////////////////////////////////////////////////////////////////////////
// Stageflow
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////
//! # stageflow
//!
//! Compose directed acyclic graphs of asynchronous stages and run them
//! with automatic parallelism, cooperative cancellation, interceptor
//! middleware, and subpipeline forking.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use stageflow::prelude::*;
//!
//! let graph = PipelineBuilder::new("summarize")
//!     .stage("fetch", Arc::new(FetchStage))
//!     .stage_with_deps("summarize", Arc::new(SummarizeStage), ["fetch"])
//!     .build()?;
//!
//! let ctx = PipelineContext::new(snapshot, Arc::new(NoopEventSink));
//! let outcome = execute(&graph, ctx, &InterceptorChain::empty(), RunOptions::default()).await;
//! ```

pub mod auth;
pub mod builder;
pub mod context;
pub mod events;
pub mod executor;
pub mod graph;
pub mod interceptor;
pub mod interceptors;
pub mod registry;
pub mod stage;
pub mod subrun;
pub mod tool;
pub mod validator;

/// Re-exports of this crate's most commonly used types, plus the domain
/// crate's own public surface.
pub mod prelude {
    pub use crate::auth::{Claims, OrgEnforcementInterceptor, TokenValidationInterceptor, TokenValidator};
    pub use crate::builder::PipelineBuilder;
    pub use crate::context::{ParentDataView, PipelineContext, PipelineTimer, StageContext};
    pub use crate::events::{LoggingEventSink, NoopEventSink, RecordingEventSink};
    pub use crate::executor::{execute, ExecutionOutcome, RunOptions};
    pub use crate::graph::StageGraph;
    pub use crate::interceptor::{AfterDecision, BeforeDecision, ErrorDecision, Interceptor, InterceptorChain};
    pub use crate::interceptors::{
        CircuitBreakerInterceptor, HardeningInterceptor, RetryInterceptor, TimeoutInterceptor,
        TracingLoggingInterceptor,
    };
    pub use crate::registry::{global as global_registry, Registry};
    pub use crate::stage::{Stage, StageRunner, StageSpec};
    pub use crate::subrun::{fork, link_cancellation, SubrunLineage};
    pub use crate::tool::{ToolError, ToolExecutor};
    pub use stageflow_domain::{
        AudioCapabilities, CallerIdentity, Capabilities, ContextBag, ContextSnapshot, CoreCapabilities,
        ContractErrorInfo, EventSink, LlmCapabilities, Message, RunId, StageArtifact, StageEvent, StageInputs,
        StageKind, StageOutput, StageStatus, StageflowError,
    };
}
