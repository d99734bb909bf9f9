//! Service configuration loaded from an optional TOML file.
//!
//! The file is optional: a missing or empty file yields `Config::default()`.
//! Unknown keys are accepted but logged as warnings, since they are usually typos.
//! Command-line flags and environment variables are layered on top with
//! [`Config::apply`].
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::pipeline::{OnRetriesExhausted, RetryPolicy};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

pub const DEFAULT_FEED_URL: &str = "https://feeds.bbci.co.uk/news/world/rss.xml";
pub const DEFAULT_REFRESH_INTERVAL: &str = "15m";

/// Top-level service configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Feed to poll.
    pub feed_url: String,

    /// Time between polls, e.g. "15m", "1h", "90s" or bare seconds.
    pub refresh_interval: String,

    pub database: DatabaseConfig,
    pub queue: QueueConfig,
    pub api: ApiConfig,
    pub ingest: IngestConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed_url: DEFAULT_FEED_URL.to_string(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL.to_string(),
            database: DatabaseConfig::default(),
            queue: QueueConfig::default(),
            api: ApiConfig::default(),
            ingest: IngestConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_connections: u32,
    /// Deadline applied to every store call.
    pub query_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "news.db".to_string(),
            max_connections: 5,
            query_timeout_secs: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub backend: QueueBackend,
    /// Database file of the sqlite backend.
    pub path: String,
    pub name: String,
    /// Buffer size of the memory backend.
    pub capacity: usize,
    /// How often an idle sqlite consumer checks for new messages.
    pub poll_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::Sqlite,
            path: "queue.db".to_string(),
            name: "news".to_string(),
            capacity: 1024,
            poll_interval_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub listen: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub max_retries: u32,
    pub backoff_secs: u64,
    pub on_retries_exhausted: OnRetriesExhausted,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_secs: 30,
            on_retries_exhausted: OnRetriesExhausted::Terminate,
        }
    }
}

/// Values from the command line or environment that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub feed_url: Option<String>,
    pub refresh_interval: Option<String>,
    pub listen: Option<String>,
    pub db_path: Option<PathBuf>,
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            tracing::debug!("Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in unknown_keys(&raw) {
                tracing::warn!(key = %key, "Unknown key in config file, ignoring");
            }
        }

        let config: Config = toml::from_str(content)?;
        tracing::info!(feed_url = %config.feed_url, "Loaded configuration");
        Ok(config)
    }

    /// Layer command-line and environment values over the file values.
    pub fn apply(mut self, overrides: Overrides) -> Self {
        if let Some(url) = overrides.feed_url {
            self.feed_url = url;
        }
        if let Some(interval) = overrides.refresh_interval {
            self.refresh_interval = interval;
        }
        if let Some(listen) = overrides.listen {
            self.api.listen = listen;
        }
        if let Some(path) = overrides.db_path {
            self.database.path = path.to_string_lossy().into_owned();
        }
        self
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feed_url.trim().is_empty() {
            return Err(ConfigError::Invalid("feed_url is empty".into()));
        }
        if self.refresh_interval().is_zero() {
            return Err(ConfigError::Invalid("refresh_interval must be positive".into()));
        }
        if self.database.path.trim().is_empty() {
            return Err(ConfigError::Invalid("database.path is empty".into()));
        }
        if self.queue.name.trim().is_empty() {
            return Err(ConfigError::Invalid("queue.name is empty".into()));
        }
        if self.queue.backend == QueueBackend::Memory && self.queue.capacity == 0 {
            return Err(ConfigError::Invalid("queue.capacity must be positive".into()));
        }
        Ok(())
    }

    /// Polling interval. An unparseable value falls back to 15 minutes.
    pub fn refresh_interval(&self) -> Duration {
        match parse_interval(&self.refresh_interval) {
            Ok(secs) => Duration::from_secs(secs),
            Err(e) => {
                tracing::warn!(
                    value = %self.refresh_interval,
                    error = %e,
                    "Failed to parse refresh interval, using default 15m"
                );
                Duration::from_secs(15 * 60)
            }
        }
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.database.query_timeout_secs.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.queue.poll_interval_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.ingest.max_retries,
            backoff: Duration::from_secs(self.ingest.backoff_secs),
            on_exhausted: self.ingest.on_retries_exhausted,
        }
    }
}

/// Parse an interval string into seconds ("1h", "30m", "1d", "60s" or "3600").
pub fn parse_interval(s: &str) -> Result<u64, String> {
    let s = s.trim().to_lowercase();

    let (digits, unit) = if let Some(d) = s.strip_suffix('d') {
        (d, 86_400)
    } else if let Some(h) = s.strip_suffix('h') {
        (h, 3_600)
    } else if let Some(m) = s.strip_suffix('m') {
        (m, 60)
    } else if let Some(sec) = s.strip_suffix('s') {
        (sec, 1)
    } else {
        (s.as_str(), 1)
    };

    digits
        .trim()
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(unit))
        .ok_or_else(|| format!("Invalid interval: {s}. Use format like '1h', '30m', '1d'"))
}

fn unknown_keys(raw: &toml::Table) -> Vec<String> {
    const TOP: &[&str] = &[
        "feed_url",
        "refresh_interval",
        "database",
        "queue",
        "api",
        "ingest",
    ];
    const SECTIONS: &[(&str, &[&str])] = &[
        ("database", &["path", "max_connections", "query_timeout_secs"]),
        (
            "queue",
            &["backend", "path", "name", "capacity", "poll_interval_ms"],
        ),
        ("api", &["listen"]),
        (
            "ingest",
            &["max_retries", "backoff_secs", "on_retries_exhausted"],
        ),
    ];

    let mut unknown: Vec<String> = raw
        .keys()
        .filter(|k| !TOP.contains(&k.as_str()))
        .cloned()
        .collect();

    for (section, known) in SECTIONS {
        if let Some(toml::Value::Table(table)) = raw.get(*section) {
            unknown.extend(
                table
                    .keys()
                    .filter(|k| !known.contains(&k.as_str()))
                    .map(|k| format!("{section}.{k}")),
            );
        }
    }
    unknown
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("newsline.toml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.feed_url, DEFAULT_FEED_URL);
        assert_eq!(config.refresh_interval(), Duration::from_secs(900));
        assert_eq!(config.database.path, "news.db");
        assert_eq!(config.queue.backend, QueueBackend::Sqlite);
        assert_eq!(config.queue.name, "news");
        assert_eq!(config.api.listen, "127.0.0.1:8080");
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_empty_file_returns_default() {
        let (_dir, path) = write_config("  \n");
        assert_eq!(Config::load(&path).unwrap(), Config::default());
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let (_dir, path) = write_config("refresh_interval = \"1h\"\n[api]\nlisten = \"0.0.0.0:9000\"\n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.refresh_interval(), Duration::from_secs(3600));
        assert_eq!(config.api.listen, "0.0.0.0:9000");
        assert_eq!(config.feed_url, DEFAULT_FEED_URL);
        assert_eq!(config.database, DatabaseConfig::default());
    }

    #[test]
    fn test_full_config() {
        let (_dir, path) = write_config(
            r#"
feed_url = "https://example.com/feed.xml"
refresh_interval = "90s"

[database]
path = "/var/lib/newsline/news.db"
max_connections = 8
query_timeout_secs = 10

[queue]
backend = "memory"
capacity = 16

[api]
listen = "[::1]:8081"

[ingest]
max_retries = 5
backoff_secs = 2
on_retries_exhausted = "skip_cycle"
"#,
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(config.feed_url, "https://example.com/feed.xml");
        assert_eq!(config.refresh_interval(), Duration::from_secs(90));
        assert_eq!(config.database.max_connections, 8);
        assert_eq!(config.query_timeout(), Duration::from_secs(10));
        assert_eq!(config.queue.backend, QueueBackend::Memory);
        assert_eq!(config.queue.capacity, 16);
        assert_eq!(
            config.retry_policy(),
            RetryPolicy {
                max_retries: 5,
                backoff: Duration::from_secs(2),
                on_exhausted: OnRetriesExhausted::SkipCycle,
            }
        );
    }

    #[test]
    fn test_invalid_toml_is_error() {
        let (_dir, path) = write_config("feed_url = [unclosed");
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));

        let (_dir, path) = write_config("[queue]\nbackend = \"rabbitmq\"\n");
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_oversized_file_rejected() {
        let big = format!("# {}\n", "x".repeat(1_100_000));
        let (_dir, path) = write_config(&big);
        assert!(matches!(Config::load(&path), Err(ConfigError::TooLarge(_))));
    }

    #[test]
    fn test_unknown_keys_are_reported_not_fatal() {
        let content = "feed_urll = \"typo\"\n[api]\nlisten = \"127.0.0.1:1\"\nport = 8080\n";
        let raw: toml::Table = content.parse().unwrap();
        assert_eq!(unknown_keys(&raw), vec!["feed_urll", "api.port"]);

        let config = Config::from_toml(content).unwrap();
        assert_eq!(config.feed_url, DEFAULT_FEED_URL);
    }

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval("1h").unwrap(), 3600);
        assert_eq!(parse_interval("15m").unwrap(), 900);
        assert_eq!(parse_interval("1d").unwrap(), 86400);
        assert_eq!(parse_interval("60s").unwrap(), 60);
        assert_eq!(parse_interval("3600").unwrap(), 3600);
        assert_eq!(parse_interval(" 2H ").unwrap(), 7200);
        assert!(parse_interval("invalid").is_err());
        assert!(parse_interval("-5m").is_err());
        assert!(parse_interval("").is_err());
    }

    #[test]
    fn test_unparseable_interval_falls_back_to_default() {
        let config = Config {
            refresh_interval: "soon".into(),
            ..Config::default()
        };
        assert_eq!(config.refresh_interval(), Duration::from_secs(900));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = Config {
            feed_url: "  ".into(),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = Config {
            refresh_interval: "0m".into(),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_overrides_take_precedence() {
        let config = Config::default().apply(Overrides {
            feed_url: Some("https://override.example.com/rss".into()),
            refresh_interval: Some("5m".into()),
            listen: None,
            db_path: Some(PathBuf::from("/tmp/other.db")),
        });
        assert_eq!(config.feed_url, "https://override.example.com/rss");
        assert_eq!(config.refresh_interval(), Duration::from_secs(300));
        assert_eq!(config.api.listen, "127.0.0.1:8080");
        assert_eq!(config.database.path, "/tmp/other.db");
    }
}
