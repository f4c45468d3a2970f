//! Application configuration loaded from environment variables.

use domain::CommandConfig;
use projections::ProjectionConfig;

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// How committed events reach the read model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProjectionDelivery {
    /// Applied by the command handler right after the append, with a
    /// single attempt per event.
    Inline,
    /// Queued to a background worker that retries transient failures.
    #[default]
    Worker,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `json` for JSON lines, anything else for text
/// - `DATABASE_URL`: PostgreSQL connection string; in-memory stores when unset
/// - `DATABASE_MAX_CONNECTIONS` (default: `10`)
/// - `PROJECTION_DELIVERY`: `worker` (default) or `inline`
///
/// Command and projection retry settings come from
/// [`CommandConfig::from_env`] and [`ProjectionConfig::from_env`].
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub projection_delivery: ProjectionDelivery,
    pub command: CommandConfig,
    pub projection: ProjectionConfig,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: std::env::var("LOG_FORMAT")
                .map(|v| parse_log_format(&v))
                .unwrap_or(defaults.log_format),
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            database_max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|n| n.parse().ok())
                .unwrap_or(defaults.database_max_connections),
            projection_delivery: std::env::var("PROJECTION_DELIVERY")
                .map(|v| parse_delivery(&v))
                .unwrap_or(defaults.projection_delivery),
            command: CommandConfig::from_env(),
            projection: ProjectionConfig::from_env(),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            database_max_connections: 10,
            projection_delivery: ProjectionDelivery::Worker,
            command: CommandConfig::default(),
            projection: ProjectionConfig::default(),
        }
    }
}

fn parse_log_format(value: &str) -> LogFormat {
    if value.trim().eq_ignore_ascii_case("json") {
        LogFormat::Json
    } else {
        LogFormat::Text
    }
}

fn parse_delivery(value: &str) -> ProjectionDelivery {
    if value.trim().eq_ignore_ascii_case("inline") {
        ProjectionDelivery::Inline
    } else {
        ProjectionDelivery::Worker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.database_url.is_none());
        assert_eq!(config.projection_delivery, ProjectionDelivery::Worker);
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn log_format_and_delivery_parsing() {
        assert_eq!(parse_log_format("JSON"), LogFormat::Json);
        assert_eq!(parse_log_format("pretty"), LogFormat::Text);
        assert_eq!(parse_delivery(" worker "), ProjectionDelivery::Worker);
        assert_eq!(parse_delivery("inline"), ProjectionDelivery::Inline);
        assert_eq!(parse_delivery("other"), ProjectionDelivery::Worker);
    }
}
