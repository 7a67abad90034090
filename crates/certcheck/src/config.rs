use certcheck_proto::HashAlgorithm;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::retry::RetryPolicy;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// How the OCSP request is transported
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcspMethod {
    /// POST the DER request (falls back to GET on HTTP 405)
    #[default]
    Post,
    /// GET with the base64 request appended to the responder URL
    Get,
}

/// Checker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckerConfig {
    /// Upper bound on each network call, in milliseconds (default: 5000)
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Largest accepted PKCS#12 container (default: 1 MiB)
    #[serde(default = "default_max_size")]
    pub max_container_size_bytes: usize,

    /// Largest accepted issuer or OCSP response body (default: 1 MiB)
    #[serde(default = "default_max_size")]
    pub max_response_size_bytes: usize,

    /// Retries for transient network failures (default: 2)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry, doubled for each further one (default: 250)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Digest used for the CertID hashes (default: sha1)
    #[serde(default)]
    pub hash_algorithm: HashAlgorithm,

    /// OCSP transport (default: post)
    #[serde(default)]
    pub ocsp_method: OcspMethod,

    /// Send a nonce extension with each request (default: false)
    #[serde(default)]
    pub enable_nonce: bool,

    /// Tolerance applied to thisUpdate/nextUpdate, in seconds (default: 0)
    #[serde(default)]
    pub clock_skew_secs: u64,

    /// Log level: "trace", "debug", "info", "warn", "error" (default: "info")
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_fetch_timeout_ms() -> u64 {
    5000
}

fn default_max_size() -> usize {
    1024 * 1024
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    250
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for CheckerConfig {
    fn default() -> Self {
        CheckerConfig {
            fetch_timeout_ms: default_fetch_timeout_ms(),
            max_container_size_bytes: default_max_size(),
            max_response_size_bytes: default_max_size(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            hash_algorithm: HashAlgorithm::default(),
            ocsp_method: OcspMethod::default(),
            enable_nonce: false,
            clock_skew_secs: 0,
            log_level: default_log_level(),
        }
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

const MAX_CLOCK_SKEW_SECS: u64 = 24 * 60 * 60;

impl CheckerConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: CheckerConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "fetch_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.max_container_size_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_container_size_bytes must be greater than 0".to_string(),
            ));
        }
        if self.max_response_size_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_response_size_bytes must be greater than 0".to_string(),
            ));
        }
        if self.clock_skew_secs > MAX_CLOCK_SKEW_SECS {
            return Err(ConfigError::Invalid(format!(
                "clock_skew_secs cannot exceed {}",
                MAX_CLOCK_SKEW_SECS
            )));
        }
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Unknown log level: {}",
                self.log_level
            )));
        }
        Ok(())
    }

    /// Apply `CERTCHECK_*` environment variables on top of this configuration
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup, then re-validate
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("CERTCHECK_FETCH_TIMEOUT_MS") {
            self.fetch_timeout_ms = parse_var("CERTCHECK_FETCH_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("CERTCHECK_MAX_CONTAINER_SIZE_BYTES") {
            self.max_container_size_bytes =
                parse_var("CERTCHECK_MAX_CONTAINER_SIZE_BYTES", &value)?;
        }
        if let Some(value) = lookup("CERTCHECK_MAX_RETRIES") {
            self.max_retries = parse_var("CERTCHECK_MAX_RETRIES", &value)?;
        }
        if let Some(value) = lookup("CERTCHECK_LOG_LEVEL") {
            self.log_level = value.trim().to_ascii_lowercase();
        }
        self.validate()
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn clock_skew(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.clock_skew_secs.min(MAX_CLOCK_SKEW_SECS) as i64)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_backoff_ms))
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{} is not a valid number: {}", name, value)))
}
