//! Query Core Configuration
//!
//! JSON configuration for the database pool, retry policy, result cache,
//! pagination limits and the compiled schema location. Every field has a
//! default, so `{}` is a valid (SQLite in-memory) configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::ResultCache;
use crate::db::RetryPolicy;
use crate::sql::DialectKind;

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub query: QueryLimits,

    /// Compiled schema (operations, bindings, field rules)
    #[serde(default)]
    pub schema: Option<PathBuf>,
}

/// Connection pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL (default: "sqlite::memory:")
    #[serde(default = "default_url")]
    pub url: String,

    #[serde(default = "default_dialect")]
    pub dialect: DialectKind,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,

    /// Per-statement limit enforced by the adapter
    #[serde(default = "default_statement_timeout_ms")]
    pub statement_timeout_ms: u64,
}

fn default_url() -> String {
    "sqlite::memory:".to_string()
}

fn default_dialect() -> DialectKind {
    DialectKind::Sqlite
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout_ms() -> u64 {
    3_000
}

fn default_statement_timeout_ms() -> u64 {
    5_000
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            dialect: default_dialect(),
            max_connections: default_max_connections(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            statement_timeout_ms: default_statement_timeout_ms(),
        }
    }
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn statement_timeout(&self) -> Duration {
        Duration::from_millis(self.statement_timeout_ms)
    }
}

/// Retry settings for transient execution failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts (default: 3, one try plus two retries)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    50
}

fn default_max_delay_ms() -> u64 {
    1_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

/// Result cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    #[serde(default = "default_shards")]
    pub shards: usize,

    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_max_entries() -> usize {
    10_000
}

fn default_shards() -> usize {
    16
}

fn default_ttl_secs() -> u64 {
    60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: default_max_entries(),
            shards: default_shards(),
            default_ttl_secs: default_ttl_secs(),
        }
    }
}

impl CacheConfig {
    pub fn build(&self) -> ResultCache {
        if self.enabled {
            ResultCache::new(
                self.max_entries,
                self.shards,
                Duration::from_secs(self.default_ttl_secs),
            )
        } else {
            ResultCache::disabled()
        }
    }
}

/// Pagination limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryLimits {
    /// Applied when a request has no limit
    #[serde(default = "default_limit")]
    pub default_limit: u64,

    /// Requests above this are rejected
    #[serde(default = "default_max_limit")]
    pub max_limit: u64,
}

fn default_limit() -> u64 {
    100
}

fn default_max_limit() -> u64 {
    1_000
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

impl QueryConfig {
    /// Load and validate a JSON config file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: QueryConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.is_empty() {
            return Err(ConfigError::Invalid("database.url must not be empty".into()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be positive".into(),
            ));
        }
        if self.database.statement_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "database.statement_timeout_ms must be positive".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be positive".into()));
        }
        if self.cache.enabled && (self.cache.max_entries == 0 || self.cache.shards == 0) {
            return Err(ConfigError::Invalid(
                "cache.max_entries and cache.shards must be positive".into(),
            ));
        }
        if self.cache.enabled && self.cache.shards > self.cache.max_entries {
            return Err(ConfigError::Invalid(format!(
                "cache.shards ({}) exceeds cache.max_entries ({})",
                self.cache.shards, self.cache.max_entries
            )));
        }
        if self.query.max_limit == 0 {
            return Err(ConfigError::Invalid("query.max_limit must be positive".into()));
        }
        if self.query.default_limit > self.query.max_limit {
            return Err(ConfigError::Invalid(format!(
                "query.default_limit ({}) exceeds query.max_limit ({})",
                self.query.default_limit, self.query.max_limit
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let file = write_config("{}");
        let config = QueryConfig::from_file(file.path()).unwrap();
        assert_eq!(config.database.dialect, DialectKind::Sqlite);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.query, QueryLimits::default());
        assert!(config.cache.enabled);
        assert!(config.schema.is_none());
    }

    #[test]
    fn test_sections_override_defaults() {
        let file = write_config(
            r#"{
                "database": {"url": "postgres://localhost/app", "dialect": "postgresql", "statement_timeout_ms": 250},
                "cache": {"enabled": false},
                "query": {"default_limit": 20, "max_limit": 50},
                "schema": "schema.json"
            }"#,
        );
        let config = QueryConfig::from_file(file.path()).unwrap();
        assert_eq!(config.database.dialect, DialectKind::Postgres);
        assert_eq!(config.database.statement_timeout(), Duration::from_millis(250));
        assert!(!config.cache.build().is_enabled());
        assert_eq!(config.query.max_limit, 50);
        assert_eq!(config.schema, Some(PathBuf::from("schema.json")));
    }

    #[test]
    fn test_default_limit_above_max_rejected() {
        let file = write_config(r#"{"query": {"default_limit": 500, "max_limit": 100}}"#);
        let err = QueryConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut config = QueryConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_more_shards_than_entries_rejected() {
        let mut config = QueryConfig::default();
        config.cache.max_entries = 4;
        config.cache.shards = 16;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cache.shards"));

        config.cache.shards = 4;
        assert!(config.validate().is_ok());

        config.cache.shards = 16;
        config.cache.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_dialect_is_parse_error() {
        let file = write_config(r#"{"database": {"dialect": "oracle"}}"#);
        let err = QueryConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = QueryConfig::from_file(Path::new("/nonexistent/aeroquery.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_retry_policy_from_config() {
        let policy = RetryConfig::default().policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(50));
    }
}
