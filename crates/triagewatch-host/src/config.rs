use std::time::Duration;

use serde::Deserialize;
use triagewatch_sync::DEFAULT_BACKEND_URL;

/// Runtime knobs for the host integration.
///
/// Defaults are what the portal has been run with; every timing is in
/// milliseconds so the struct deserializes from flat config.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub backend_url: String,
    /// Poll interval while a frame element or its document is missing.
    pub frame_poll_ms: u64,
    /// Retry interval after a cross-origin access failure.
    pub access_retry_ms: u64,
    /// Delay between a frame `load` event and the re-attach attempt.
    pub reload_settle_ms: u64,
    /// Quiet period coalescing listing mutations into one rescan.
    pub debounce_ms: u64,
    /// Delay before the one-shot check of an already loaded detail frame.
    pub detail_settle_ms: u64,
    /// How long a submit feedback icon stays up.
    pub feedback_ttl_ms: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            frame_poll_ms: 1_000,
            access_retry_ms: 2_000,
            reload_settle_ms: 500,
            debounce_ms: 500,
            detail_settle_ms: 500,
            feedback_ttl_ms: 3_000,
        }
    }
}

impl HostConfig {
    pub fn frame_poll(&self) -> Duration {
        Duration::from_millis(self.frame_poll_ms)
    }

    pub fn access_retry(&self) -> Duration {
        Duration::from_millis(self.access_retry_ms)
    }

    pub fn reload_settle(&self) -> Duration {
        Duration::from_millis(self.reload_settle_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn detail_settle(&self) -> Duration {
        Duration::from_millis(self.detail_settle_ms)
    }

    pub fn feedback_ttl(&self) -> Duration {
        Duration::from_millis(self.feedback_ttl_ms)
    }
}
