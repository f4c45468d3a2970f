//! Projection processing configuration loaded from environment variables.

use std::time::Duration;

/// Retry settings for applying events to the projection store.
///
/// Reads from environment variables:
/// - `PROJECTION_MAX_ATTEMPTS` (default: `3`)
/// - `PROJECTION_RETRY_BACKOFF_MS` (default: `20`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionConfig {
    /// Total attempts per event, including the first one.
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl ProjectionConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: env_parse("PROJECTION_MAX_ATTEMPTS")
                .filter(|n: &u32| *n > 0)
                .unwrap_or(defaults.max_attempts),
            backoff: env_parse("PROJECTION_RETRY_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff),
        }
    }

    /// Delay before the attempt following `attempt` (1-based); grows linearly.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt.max(1))
    }
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(20),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
