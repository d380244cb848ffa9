//! Resource lifecycle trait definition

use crate::error::Result;
use crate::schema::ResourceSchema;
use crate::state::ResourceRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lifecycle contract of a single managed resource type
///
/// Implementations talk to the remote service through an injected client
/// and report what they observed. They never touch tracked state; that is
/// the [`Reconciler`](crate::Reconciler)'s job.
#[async_trait]
pub trait ResourceLifecycle: Send + Sync {
    /// Returns the resource type name (e.g., "aws_prometheus_workspace")
    fn resource_type(&self) -> &str;

    /// Attribute declarations used for validation and planning
    fn schema(&self) -> &ResourceSchema;

    /// Create the remote object and wait until it is ready
    ///
    /// The returned record has its identifier and every computed
    /// attribute populated.
    async fn create(&self, desired: &ResourceConfig) -> Result<ResourceRecord>;

    /// Fetch the current remote state
    async fn read(&self, id: &str) -> Result<ReadOutcome>;

    /// Apply mutable attribute changes in place
    ///
    /// Callers must route changes to force-new attributes through
    /// destroy and recreate instead.
    async fn update(&self, id: &str, desired: &ResourceConfig) -> Result<ResourceRecord>;

    /// Delete the remote object and wait until it is gone
    async fn delete(&self, id: &str) -> Result<DeleteOutcome>;

    /// Adopt an object created outside the reconciler
    async fn import(&self, id: &str) -> Result<ResourceRecord>;

    /// Wait until the object leaves a transitional phase
    ///
    /// Returns the record once it accepts operations again, or
    /// [`ReadOutcome::NotFound`] if it went away while waiting. A remote
    /// failure is a `Provisioning` error.
    async fn settle(&self, id: &str) -> Result<ReadOutcome>;
}

/// Result of reading a resource
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Found(ResourceRecord),
    NotFound,
}

impl ReadOutcome {
    pub fn into_record(self) -> Option<ResourceRecord> {
        match self {
            ReadOutcome::Found(record) => Some(record),
            ReadOutcome::NotFound => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ReadOutcome::NotFound)
    }
}

/// Result of deleting a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The delete call removed the object
    Deleted,
    /// The object was already gone
    AlreadyAbsent,
}

/// Desired configuration for a cloud resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Resource type (e.g., "aws_prometheus_workspace")
    pub resource_type: String,

    /// Resource-specific configuration
    pub config: serde_json::Value,
}

impl ResourceConfig {
    pub fn new(resource_type: impl Into<String>, config: serde_json::Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            config,
        }
    }

    /// Get a configuration value as a specific type
    pub fn get_config<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.config
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Retry configuration for provider operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_attempts: u32,

    /// Initial delay between retries
    #[serde(with = "duration_secs")]
    pub initial_delay: Duration,

    /// Maximum delay between retries
    #[serde(with = "duration_secs")]
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (zero based), capped at `max_delay`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let delay = self.initial_delay.as_secs_f64() * factor;
        if !delay.is_finite() || delay >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(delay)
    }
}

/// Serialize durations as whole seconds
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
