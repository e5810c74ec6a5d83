// /////////////////////////////////////////////////////////////////////////////
// Stageflow
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////
//! Opaque capability ports forwarded to stages.
//!
//! The engine never interprets these — it only carries them from wherever
//! the caller configured a run to whatever stage asks for them. Concrete
//! persistence, LLM, and audio implementations live entirely outside this
//! crate.

use std::any::Any;
use std::sync::Arc;

/// Core, engine-agnostic capabilities a host application may wire in: a
/// persistence backend, a status-callback sink, a call logger, a retry
/// policy, and a distributed lock. Each is an opaque trait object; the
/// engine forwards whichever ones are present without calling through any
/// of them itself.
#[derive(Clone, Default)]
pub struct CoreCapabilities {
    /// Opaque persistence handle.
    pub persistence: Option<Arc<dyn Any + Send + Sync>>,
    /// Opaque status-callback handle.
    pub status_callback: Option<Arc<dyn Any + Send + Sync>>,
    /// Opaque call-logger handle.
    pub call_logger: Option<Arc<dyn Any + Send + Sync>>,
    /// Opaque retry-policy handle.
    pub retry: Option<Arc<dyn Any + Send + Sync>>,
    /// Opaque distributed-lock handle.
    pub lock: Option<Arc<dyn Any + Send + Sync>>,
}

impl std::fmt::Debug for CoreCapabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreCapabilities")
            .field("persistence", &self.persistence.is_some())
            .field("status_callback", &self.status_callback.is_some())
            .field("call_logger", &self.call_logger.is_some())
            .field("retry", &self.retry.is_some())
            .field("lock", &self.lock.is_some())
            .finish()
    }
}

/// A single opaque handle for LLM capabilities; the engine never calls
/// through it, only hands it to stages that declare they need it.
#[derive(Clone, Default)]
pub struct LlmCapabilities {
    /// Opaque LLM client handle.
    pub client: Option<Arc<dyn Any + Send + Sync>>,
}

impl std::fmt::Debug for LlmCapabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmCapabilities").field("client", &self.client.is_some()).finish()
    }
}

/// A single opaque handle for audio capabilities, symmetrical to
/// [`LlmCapabilities`].
#[derive(Clone, Default)]
pub struct AudioCapabilities {
    /// Opaque audio client handle.
    pub client: Option<Arc<dyn Any + Send + Sync>>,
}

impl std::fmt::Debug for AudioCapabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioCapabilities").field("client", &self.client.is_some()).finish()
    }
}

/// The full bundle of capability ports carried on a run.
#[derive(Clone, Debug, Default)]
pub struct Capabilities {
    /// Core ports.
    pub core: CoreCapabilities,
    /// LLM port.
    pub llm: LlmCapabilities,
    /// Audio port.
    pub audio: AudioCapabilities,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_capabilities_have_nothing_wired() {
        let caps = Capabilities::default();
        assert!(caps.core.persistence.is_none());
        assert!(caps.llm.client.is_none());
        assert!(caps.audio.client.is_none());
    }
}
