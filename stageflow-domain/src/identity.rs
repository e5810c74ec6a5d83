// /////////////////////////////////////////////////////////////////////////////
// Stageflow
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////
//! Identity types for pipeline runs.
//!
//! `RunId` is the one identifier the engine itself generates. Everything
//! else callers hand in alongside a run (request id, session id, user id,
//! org id, interaction id) is an opaque caller-supplied string: the engine
//! never parses, validates, or orders them, so they are carried as plain
//! `Option<String>` fields rather than a dedicated type.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A unique, engine-generated identifier for one pipeline run.
///
/// Unlike the caller-supplied opaque identifiers, `RunId` is always present
/// and always generated fresh by the engine at the start of a run (or a
/// subrun fork), so it is a true type and not a bare `String`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// Generates a new, random run identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID as a run identifier.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl From<Uuid> for RunId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<RunId> for Uuid {
    fn from(id: RunId) -> Self {
        id.0
    }
}

/// Caller-supplied, engine-opaque identifiers that travel alongside a run.
///
/// None of these fields are interpreted by the engine; they exist purely so
/// interceptors, event sinks, and stages can correlate a run with external
/// systems (auth tokens, tracing, multi-tenant scoping).
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct CallerIdentity {
    /// Identifier of the inbound request that triggered this run, if any.
    pub request_id: Option<String>,
    /// Identifier of the caller's session, if any.
    pub session_id: Option<String>,
    /// Identifier of the authenticated user, if any.
    pub user_id: Option<String>,
    /// Identifier of the tenant/organization the run is scoped to, if any.
    pub org_id: Option<String>,
    /// Identifier correlating this run with a broader multi-turn interaction.
    pub interaction_id: Option<String>,
}
