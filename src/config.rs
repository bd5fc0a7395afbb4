//! Workspace configuration.
//!
//! Loaded from an optional JSON file (camelCase keys, every field optional)
//! and then overridden by `BIONEXUS_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_API_BASE_URL: &str = "http://localhost:5000";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_MAX_ITEMS: usize = 20;
const DEFAULT_MAX_FILE_BYTES: u64 = 5 * 1024 * 1024;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_JOB_TIMEOUT_SECS: u64 = 300;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkspaceConfig {
    pub api_base_url: String,
    pub poll_interval_secs: u64,
    pub max_items: usize,
    pub max_file_bytes: u64,
    pub request_timeout_secs: u64,
    pub job_timeout_secs: u64,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            max_items: DEFAULT_MAX_ITEMS,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            job_timeout_secs: DEFAULT_JOB_TIMEOUT_SECS,
        }
    }
}

impl WorkspaceConfig {
    /// Load from `path` (if given) and apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let json = std::fs::read_to_string(path)?;
                tracing::info!("Loaded config from {}", path.display());
                Self::from_json(&json)?
            }
            None => Self::default(),
        };

        config.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config.normalized())
    }

    /// Apply `BIONEXUS_*` overrides looked up through `lookup`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("BIONEXUS_API_URL") {
            self.api_base_url = url;
        }
        if let Some(v) = lookup("BIONEXUS_POLL_INTERVAL_SECS") {
            self.poll_interval_secs = parse_number("BIONEXUS_POLL_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = lookup("BIONEXUS_MAX_ITEMS") {
            self.max_items = parse_number("BIONEXUS_MAX_ITEMS", &v)?;
        }
        if let Some(v) = lookup("BIONEXUS_MAX_FILE_BYTES") {
            self.max_file_bytes = parse_number("BIONEXUS_MAX_FILE_BYTES", &v)?;
        }
        if let Some(v) = lookup("BIONEXUS_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_number("BIONEXUS_REQUEST_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("BIONEXUS_JOB_TIMEOUT_SECS") {
            self.job_timeout_secs = parse_number("BIONEXUS_JOB_TIMEOUT_SECS", &v)?;
        }
        Ok(self.normalized())
    }

    fn normalized(mut self) -> Self {
        self.poll_interval_secs = self.poll_interval_secs.max(1);
        self.max_items = self.max_items.max(1);
        self.request_timeout_secs = self.request_timeout_secs.max(1);
        self.job_timeout_secs = self.job_timeout_secs.max(1);
        let trimmed = self.api_base_url.trim().trim_end_matches('/');
        self.api_base_url = trimmed.to_string();
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        })
}
