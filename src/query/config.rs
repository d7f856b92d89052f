//! Query cache configuration.
//!
//! Controls how long an unobserved entry survives before eviction.

use std::time::Duration;

use serde::Deserialize;

const DEFAULT_GC_IDLE_MS: u64 = 300_000;

/// Query cache configuration from the `[cache]` settings section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueryCacheConfig {
    /// Idle window (ms) between the last unsubscribe and eviction.
    pub gc_idle_ms: u64,
}

impl Default for QueryCacheConfig {
    fn default() -> Self {
        Self {
            gc_idle_ms: DEFAULT_GC_IDLE_MS,
        }
    }
}

impl From<&crate::config::CacheSettings> for QueryCacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            gc_idle_ms: u64::try_from(settings.gc_idle.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl QueryCacheConfig {
    pub fn with_gc_idle(gc_idle: Duration) -> Self {
        Self {
            gc_idle_ms: u64::try_from(gc_idle.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn gc_idle(&self) -> Duration {
        Duration::from_millis(self.gc_idle_ms)
    }
}
