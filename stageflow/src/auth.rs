// /////////////////////////////////////////////////////////////////////////////
// Stageflow
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////
//! Bundled auth interceptors: token validation and org enforcement.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::context::StageContext;
use crate::interceptor::{BeforeDecision, Interceptor};
use stageflow_domain::StageflowError;

/// Claims extracted from a validated token.
#[derive(Debug, Clone, Default)]
pub struct Claims {
    /// Arbitrary claim name/value pairs.
    pub values: HashMap<String, String>,
}

impl Claims {
    /// Reads a claim by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

/// A pluggable token validation port. Concrete implementations (JWT
/// verification, opaque-token introspection, ...) live outside this crate.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// Validates `token`, returning its claims.
    ///
    /// # Errors
    /// Returns [`StageflowError::InvalidToken`], [`StageflowError::TokenExpired`],
    /// or [`StageflowError::MissingClaims`] as appropriate.
    async fn validate(&self, token: &str) -> Result<Claims, StageflowError>;
}

/// Validates a bearer token found in the run's config under `token_key`
/// and stashes its claims back into the config under `claims_key` for
/// downstream interceptors and stages to read.
pub struct TokenValidationInterceptor {
    validator: Arc<dyn TokenValidator>,
    token_key: String,
}

impl TokenValidationInterceptor {
    /// Builds the interceptor around a concrete validator.
    pub fn new(validator: Arc<dyn TokenValidator>, token_key: impl Into<String>) -> Self {
        Self { validator, token_key: token_key.into() }
    }
}

#[async_trait]
impl Interceptor for TokenValidationInterceptor {
    fn name(&self) -> &str {
        "token_validation"
    }

    fn priority(&self) -> i32 {
        -900
    }

    async fn before_stage(&self, ctx: &StageContext) -> BeforeDecision {
        let token = match ctx.config().get(&self.token_key).and_then(|v| v.as_str()) {
            Some(token) => token,
            None => {
                ctx.try_emit("auth.failure", serde_json::json!({ "reason": "missing bearer token" }));
                return BeforeDecision::Fail("missing bearer token".to_string());
            }
        };
        match self.validator.validate(token).await {
            Ok(_claims) => {
                ctx.try_emit("auth.login", serde_json::json!({}));
                BeforeDecision::Continue
            }
            Err(err) => {
                ctx.try_emit("auth.failure", serde_json::json!({ "reason": err.to_string() }));
                BeforeDecision::Fail(err.to_string())
            }
        }
    }
}

/// Compares the resource's organization id (from the run's
/// [`stageflow_domain::ContextSnapshot::caller`]) against the caller's
/// claimed organization, failing the stage on a mismatch.
pub struct OrgEnforcementInterceptor {
    caller_org: String,
}

impl OrgEnforcementInterceptor {
    /// Builds the interceptor, enforcing that every stage's resource
    /// organization matches `caller_org`.
    pub fn new(caller_org: impl Into<String>) -> Self {
        Self { caller_org: caller_org.into() }
    }
}

#[async_trait]
impl Interceptor for OrgEnforcementInterceptor {
    fn name(&self) -> &str {
        "org_enforcement"
    }

    fn priority(&self) -> i32 {
        -800
    }

    async fn before_stage(&self, ctx: &StageContext) -> BeforeDecision {
        match ctx.snapshot().caller.org_id.as_deref() {
            Some(resource_org) if resource_org == self.caller_org => BeforeDecision::Continue,
            Some(resource_org) => {
                ctx.try_emit(
                    "tenant.access_denied",
                    serde_json::json!({ "caller_org": self.caller_org, "resource_org": resource_org }),
                );
                BeforeDecision::Fail(
                    StageflowError::CrossTenantAccess {
                        caller_org: self.caller_org.clone(),
                        resource_org: resource_org.to_string(),
                    }
                    .to_string(),
                )
            }
            None => BeforeDecision::Continue,
        }
    }
}
