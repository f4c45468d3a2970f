//! Command handling configuration loaded from environment variables.

use std::time::Duration;

/// Retry and deadline settings for the command handler.
///
/// Reads from environment variables:
/// - `COMMAND_MAX_ATTEMPTS` (default: `5`)
/// - `COMMAND_RETRY_BACKOFF_MS` (default: `10`)
/// - `COMMAND_RETRY_MAX_BACKOFF_MS` (default: `200`)
/// - `COMMAND_TIMEOUT_MS` (default: `5000`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandConfig {
    /// Total attempts per command, including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Deadline for the whole load/mutate/append loop.
    pub timeout: Duration,
}

impl CommandConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: env_parse("COMMAND_MAX_ATTEMPTS")
                .filter(|n: &u32| *n > 0)
                .unwrap_or(defaults.max_attempts),
            initial_backoff: env_millis("COMMAND_RETRY_BACKOFF_MS")
                .unwrap_or(defaults.initial_backoff),
            max_backoff: env_millis("COMMAND_RETRY_MAX_BACKOFF_MS")
                .unwrap_or(defaults.max_backoff),
            timeout: env_millis("COMMAND_TIMEOUT_MS").unwrap_or(defaults.timeout),
        }
    }

    /// Delay before the attempt following `attempt` (1-based).
    ///
    /// Doubles per attempt and is capped at `max_backoff`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(200),
            timeout: Duration::from_secs(5),
        }
    }
}

pub(crate) fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

pub(crate) fn env_millis(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = CommandConfig::default();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.initial_backoff, Duration::from_millis(10));
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn backoff_doubles_until_cap() {
        let config = CommandConfig::default();
        assert_eq!(config.backoff_for(1), Duration::from_millis(10));
        assert_eq!(config.backoff_for(2), Duration::from_millis(20));
        assert_eq!(config.backoff_for(3), Duration::from_millis(40));
        assert_eq!(config.backoff_for(10), Duration::from_millis(200));
        assert_eq!(config.backoff_for(64), Duration::from_millis(200));
    }

    #[test]
    fn zero_backoff_stays_zero() {
        let config = CommandConfig {
            initial_backoff: Duration::ZERO,
            ..CommandConfig::default()
        };
        assert_eq!(config.backoff_for(4), Duration::ZERO);
    }
}
