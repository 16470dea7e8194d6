use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::archiver::{RetryPolicy, ToolConfig};
use crate::constants::DEFAULT_DEVICE_PROFILE;
use crate::timestamp::UrlValidation;
use crate::wayback::DEFAULT_CDX_API_URL;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to parse {name} as boolean: {value}")]
    ParseBool { name: String, value: String },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // External archiving tool
    pub archive_root: PathBuf,
    pub archive_tool_path: String,
    pub archive_timeout: Duration,
    pub random_user_agent: bool,
    pub enable_tool_wal: bool,

    // Document store
    pub database_path: PathBuf,
    pub collection_name: String,
    pub max_store_failures: usize,

    // Scheduling
    pub worker_concurrency: usize,
    pub batch_size: usize,

    // Retry policy for lock contention
    pub retry_max_attempts: u32,
    pub retry_base_delay: Duration,
    pub retry_jitter_max: Duration,

    // Reconciliation
    pub verify_integrity: bool,
    pub strict_url_length: Option<usize>,
    pub device_profile: String,
    pub ledger_name: String,

    // Wayback CDX discovery
    pub cdx_api_url: String,
    pub cdx_from: Option<String>,
    pub cdx_to: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if an environment variable holds an unparseable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            archive_root: PathBuf::from(env_or_default("ARCHIVE_ROOT", "./data/archivebox")),
            archive_tool_path: env_or_default("ARCHIVE_TOOL_PATH", "archivebox"),
            archive_timeout: Duration::from_secs(parse_env_u64("ARCHIVE_TIMEOUT_SECS", 300)?),
            random_user_agent: parse_env_bool("RANDOM_USER_AGENT", false)?,
            enable_tool_wal: parse_env_bool("ENABLE_TOOL_WAL", true)?,

            database_path: PathBuf::from(env_or_default(
                "DATABASE_PATH",
                "./data/captures.sqlite",
            )),
            collection_name: env_or_default("COLLECTION_NAME", "wayback_home_captures"),
            max_store_failures: parse_env_usize("MAX_STORE_FAILURES", 5)?,

            worker_concurrency: parse_env_usize("WORKER_CONCURRENCY", 4)?,
            batch_size: parse_env_usize("BATCH_SIZE", 1)?,

            retry_max_attempts: parse_env_u32("RETRY_MAX_ATTEMPTS", 5)?,
            retry_base_delay: Duration::from_millis(parse_env_u64("RETRY_BASE_DELAY_MS", 100)?),
            retry_jitter_max: Duration::from_millis(parse_env_u64("RETRY_JITTER_MAX_MS", 100)?),

            verify_integrity: parse_env_bool("VERIFY_INTEGRITY", false)?,
            strict_url_length: parse_env_optional_usize("STRICT_URL_LENGTH")?,
            device_profile: env_or_default("DEVICE_PROFILE", DEFAULT_DEVICE_PROFILE),
            ledger_name: env_or_default("LEDGER_NAME", "insertInto_store"),

            cdx_api_url: env_or_default("CDX_API_URL", DEFAULT_CDX_API_URL),
            cdx_from: optional_env("CDX_FROM"),
            cdx_to: optional_env("CDX_TO"),
        })
    }

    /// Configuration rooted in `archive_root` with fast retries, for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            archive_root: PathBuf::from("./target/test-archive"),
            archive_tool_path: "archivebox".to_string(),
            archive_timeout: Duration::from_secs(10),
            random_user_agent: false,
            enable_tool_wal: false,
            database_path: PathBuf::from("./target/test-archive/captures.sqlite"),
            collection_name: "wayback_home_captures".to_string(),
            max_store_failures: 5,
            worker_concurrency: 2,
            batch_size: 1,
            retry_max_attempts: 3,
            retry_base_delay: Duration::from_millis(1),
            retry_jitter_max: Duration::from_millis(1),
            verify_integrity: true,
            strict_url_length: None,
            device_profile: DEFAULT_DEVICE_PROFILE.to_string(),
            ledger_name: "test".to_string(),
            cdx_api_url: "http://127.0.0.1:9/cdx/search/cdx".to_string(),
            cdx_from: None,
            cdx_to: None,
        }
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_concurrency == 0 {
            return Err(invalid("WORKER_CONCURRENCY", "must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(invalid("BATCH_SIZE", "must be at least 1"));
        }
        if self.retry_max_attempts == 0 {
            return Err(invalid("RETRY_MAX_ATTEMPTS", "must be at least 1"));
        }
        if self.archive_tool_path.is_empty() {
            return Err(invalid("ARCHIVE_TOOL_PATH", "cannot be empty"));
        }
        if self.collection_name.is_empty()
            || !self
                .collection_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(invalid(
                "COLLECTION_NAME",
                "must be non-empty and contain only ASCII letters, digits and underscores",
            ));
        }
        if self.strict_url_length == Some(0) {
            return Err(invalid("STRICT_URL_LENGTH", "must be positive when set"));
        }
        Ok(())
    }

    #[must_use]
    pub fn tool_config(&self) -> ToolConfig {
        ToolConfig {
            path: self.archive_tool_path.clone(),
            archive_root: self.archive_root.clone(),
            timeout: self.archive_timeout,
            random_user_agent: self.random_user_agent,
        }
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            base_delay: self.retry_base_delay,
            jitter_max: self.retry_jitter_max,
        }
    }

    #[must_use]
    pub fn url_validation(&self) -> UrlValidation {
        self.strict_url_length
            .map_or(UrlValidation::Standard, UrlValidation::ExactLength)
    }

    /// `success_<ledger>.txt` under the archive root.
    #[must_use]
    pub fn success_ledger_path(&self) -> PathBuf {
        self.archive_root
            .join(format!("success_{}.txt", self.ledger_name))
    }

    /// `error_<ledger>.txt` under the archive root.
    #[must_use]
    pub fn error_log_path(&self) -> PathBuf {
        self.archive_root.join(format!("error_{}.txt", self.ledger_name))
    }
}

fn invalid(name: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        message: message.to_string(),
    }
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_optional_usize(name: &str) -> Result<Option<usize>, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => {
            val.parse()
                .map(Some)
                .map_err(|e| ConfigError::ParseInt {
                    name: name.to_string(),
                    source: e,
                })
        }
        _ => Ok(None),
    }
}

fn parse_env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => match val.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::ParseBool {
                name: name.to_string(),
                value: val,
            }),
        },
        _ => Ok(default),
    }
}
