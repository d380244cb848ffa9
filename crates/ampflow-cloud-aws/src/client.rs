//! Remote API contract for Prometheus workspaces
//!
//! [`PrometheusApi`] is the seam between the workspace resource and the
//! service. The resource only sees typed results and [`AmpError`]
//! variants; how a concrete client talks to the service is its own
//! business.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Workspace status codes reported by the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkspaceStatusCode {
    Creating,
    Active,
    Updating,
    Deleting,
    CreationFailed,
    /// A code this client does not know
    Unknown(String),
}

impl WorkspaceStatusCode {
    pub fn as_str(&self) -> &str {
        match self {
            WorkspaceStatusCode::Creating => "CREATING",
            WorkspaceStatusCode::Active => "ACTIVE",
            WorkspaceStatusCode::Updating => "UPDATING",
            WorkspaceStatusCode::Deleting => "DELETING",
            WorkspaceStatusCode::CreationFailed => "CREATION_FAILED",
            WorkspaceStatusCode::Unknown(code) => code,
        }
    }

    pub fn parse(code: &str) -> Self {
        match code {
            "CREATING" => WorkspaceStatusCode::Creating,
            "ACTIVE" => WorkspaceStatusCode::Active,
            "UPDATING" => WorkspaceStatusCode::Updating,
            "DELETING" => WorkspaceStatusCode::Deleting,
            "CREATION_FAILED" => WorkspaceStatusCode::CreationFailed,
            other => WorkspaceStatusCode::Unknown(other.to_string()),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, WorkspaceStatusCode::CreationFailed)
    }
}

impl std::fmt::Display for WorkspaceStatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full description of a workspace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    pub workspace_id: String,
    pub alias: Option<String>,
    pub arn: String,
    pub status: WorkspaceStatusCode,
    pub prometheus_endpoint: Option<String>,
    pub kms_key_arn: Option<String>,
    pub tags: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

/// Entry returned by [`PrometheusApi::list_workspaces`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceSummary {
    pub workspace_id: String,
    pub alias: Option<String>,
    pub arn: String,
    pub status: WorkspaceStatusCode,
}

/// Parameters of a create call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateWorkspaceRequest {
    pub alias: Option<String>,
    pub kms_key_arn: Option<String>,
    pub tags: HashMap<String, String>,
    /// Idempotency token; repeated calls with the same token create one workspace
    pub client_token: Option<String>,
}

/// Response of a create call
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedWorkspace {
    pub workspace_id: String,
    pub arn: String,
    pub status: WorkspaceStatusCode,
}

/// Operations of the Amazon Managed Service for Prometheus API used here
#[async_trait]
pub trait PrometheusApi: Send + Sync {
    async fn create_workspace(&self, request: CreateWorkspaceRequest) -> Result<CreatedWorkspace>;

    /// Describe a workspace
    ///
    /// Returns `Ok(None)` when the service answered successfully without a
    /// workspace body; an absent workspace is `AmpError::ResourceNotFound`.
    async fn describe_workspace(&self, workspace_id: &str) -> Result<Option<Workspace>>;

    /// Set or clear (`None`) the alias
    async fn update_workspace_alias(&self, workspace_id: &str, alias: Option<&str>) -> Result<()>;

    async fn delete_workspace(&self, workspace_id: &str) -> Result<()>;

    /// List workspaces, optionally only those whose alias starts with `alias_prefix`
    async fn list_workspaces(&self, alias_prefix: Option<&str>) -> Result<Vec<WorkspaceSummary>>;

    async fn tag_resource(&self, arn: &str, tags: HashMap<String, String>) -> Result<()>;

    async fn untag_resource(&self, arn: &str, tag_keys: Vec<String>) -> Result<()>;
}
