//! Configuration for MailRule

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Rule engine configuration
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Rule engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path to the rule document
    #[serde(default = "default_rules_path")]
    pub rules_path: PathBuf,

    /// Upper bound for a single store lookup in milliseconds
    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_ms: u64,

    /// Compiled size limit for `matches` patterns
    #[serde(default = "default_regex_size_limit")]
    pub regex_size_limit: usize,

    /// Skip rules and stores that fail to load instead of rejecting the document
    #[serde(default)]
    pub skip_invalid: bool,

    /// Cached lookups per store; 0 disables the lookup cache
    #[serde(default)]
    pub cache_entries: usize,

    /// Lifetime of a cached member in milliseconds
    #[serde(default = "default_cache_ttl_positive")]
    pub cache_ttl_positive_ms: u64,

    /// Lifetime of a cached miss in milliseconds
    #[serde(default = "default_cache_ttl_negative")]
    pub cache_ttl_negative_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rules_path: default_rules_path(),
            lookup_timeout_ms: default_lookup_timeout(),
            regex_size_limit: default_regex_size_limit(),
            skip_invalid: false,
            cache_entries: 0,
            cache_ttl_positive_ms: default_cache_ttl_positive(),
            cache_ttl_negative_ms: default_cache_ttl_negative(),
        }
    }
}

impl EngineConfig {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    pub fn cache_ttl_positive(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_positive_ms)
    }

    pub fn cache_ttl_negative(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_negative_ms)
    }
}

fn default_rules_path() -> PathBuf {
    PathBuf::from("/etc/mailrule/rules.toml")
}

fn default_lookup_timeout() -> u64 {
    1000
}

fn default_cache_ttl_positive() -> u64 {
    86_400_000 // 1 day
}

fn default_cache_ttl_negative() -> u64 {
    3_600_000 // 1 hour
}

fn default_regex_size_limit() -> usize {
    1 << 20 // 1MB compiled size limit
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Load configuration from the default locations, then apply
    /// `MAILRULE__<SECTION>__<KEY>` environment overrides.
    pub fn load() -> crate::Result<Self> {
        let paths = [
            PathBuf::from("./mailrule.toml"),
            PathBuf::from("/etc/mailrule/mailrule.toml"),
        ];

        let mut builder = ::config::Config::builder();
        match paths.iter().find(|path| path.exists()) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "Using configuration file");
                builder = builder.add_source(::config::File::from(path.as_path()));
            }
            None => {
                tracing::debug!("No configuration file found, using defaults");
            }
        }

        let config = builder
            .add_source(
                ::config::Environment::with_prefix("MAILRULE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<Config>()?;

        Ok(config)
    }
}
