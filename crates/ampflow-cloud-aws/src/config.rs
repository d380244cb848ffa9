//! Provider configuration

use crate::error::{AmpError, Result};
use ampflow_cloud::RetryConfig;
use ampflow_cloud::provider::duration_secs;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings shared by every workspace operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// AWS region, e.g. "us-west-2"
    pub region: String,

    #[serde(with = "duration_secs")]
    pub create_timeout: Duration,

    #[serde(with = "duration_secs")]
    pub update_timeout: Duration,

    #[serde(with = "duration_secs")]
    pub delete_timeout: Duration,

    /// How long a not-found is tolerated right after create
    #[serde(with = "duration_secs")]
    pub not_found_grace: Duration,

    /// Backoff between readiness polls
    pub poll: RetryConfig,

    /// Retry of single calls failing with throttling or transient errors
    pub retry: RetryConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            create_timeout: Duration::from_secs(5 * 60),
            update_timeout: Duration::from_secs(5 * 60),
            delete_timeout: Duration::from_secs(5 * 60),
            not_found_grace: Duration::from_secs(30),
            poll: RetryConfig {
                max_attempts: 60,
                initial_delay: Duration::from_secs(2),
                max_delay: Duration::from_secs(30),
                backoff_multiplier: 2.0,
            },
            retry: RetryConfig::default(),
        }
    }
}

impl ProviderConfig {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            ..Self::default()
        }
    }

    /// Create ProviderConfig from environment variables
    ///
    /// `AWS_REGION` (or `AWS_DEFAULT_REGION`) is required. Timeouts can be
    /// overridden with `AMPFLOW_CREATE_TIMEOUT_SECS`,
    /// `AMPFLOW_UPDATE_TIMEOUT_SECS`, `AMPFLOW_DELETE_TIMEOUT_SECS` and
    /// `AMPFLOW_NOT_FOUND_GRACE_SECS`.
    pub fn from_env() -> Result<Self> {
        let region = std::env::var("AWS_REGION")
            .or_else(|_| std::env::var("AWS_DEFAULT_REGION"))
            .map_err(|_| AmpError::MissingEnvVar("AWS_REGION".to_string()))?;

        let mut config = Self::new(region);
        if let Some(timeout) = secs_from_env("AMPFLOW_CREATE_TIMEOUT_SECS")? {
            config.create_timeout = timeout;
        }
        if let Some(timeout) = secs_from_env("AMPFLOW_UPDATE_TIMEOUT_SECS")? {
            config.update_timeout = timeout;
        }
        if let Some(timeout) = secs_from_env("AMPFLOW_DELETE_TIMEOUT_SECS")? {
            config.delete_timeout = timeout;
        }
        if let Some(grace) = secs_from_env("AMPFLOW_NOT_FOUND_GRACE_SECS")? {
            config.not_found_grace = grace;
        }
        Ok(config)
    }

    /// Load from JSON; omitted fields keep their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        if config.region.is_empty() {
            return Err(AmpError::InvalidConfig("region must not be empty".to_string()));
        }
        Ok(config)
    }
}

fn secs_from_env(name: &str) -> Result<Option<Duration>> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(|secs| Some(Duration::from_secs(secs)))
            .map_err(|_| {
                AmpError::InvalidConfig(format!("{} must be a number of seconds, got {:?}", name, value))
            }),
        Err(_) => Ok(None),
    }
}
