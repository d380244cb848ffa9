//! AWS SDK backed [`PrometheusApi`]

use crate::client::{
    CreateWorkspaceRequest, CreatedWorkspace, PrometheusApi, Workspace, WorkspaceStatusCode,
    WorkspaceSummary,
};
use crate::config::ProviderConfig;
use crate::error::{AmpError, Result};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_amp::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_amp::types::{WorkspaceDescription, WorkspaceStatus};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Client for Amazon Managed Service for Prometheus
pub struct AwsPrometheusClient {
    client: aws_sdk_amp::Client,
}

impl AwsPrometheusClient {
    /// Build a client for `config.region` using the default credential chain
    pub async fn from_config(config: &ProviderConfig) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;
        tracing::debug!(region = %config.region, "loaded AWS configuration");
        Self::new(aws_sdk_amp::Client::new(&sdk_config))
    }

    pub fn new(client: aws_sdk_amp::Client) -> Self {
        Self { client }
    }
}

/// Classify an SDK failure by its service error code
fn classify<E, R>(err: SdkError<E, R>) -> AmpError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    if matches!(err, SdkError::DispatchFailure(_) | SdkError::TimeoutError(_)) {
        return AmpError::ServiceUnavailable(DisplayErrorContext(&err).to_string());
    }

    let message = err.message().unwrap_or_default().to_string();
    match err.code() {
        Some("ResourceNotFoundException") => AmpError::ResourceNotFound(message),
        Some("ThrottlingException") => AmpError::Throttling(message),
        Some("ValidationException") => AmpError::Validation(message),
        Some("ConflictException") => AmpError::Conflict(message),
        Some("AccessDeniedException") => AmpError::AccessDenied(message),
        Some("ServiceQuotaExceededException") => AmpError::ServiceQuotaExceeded(message),
        Some("InternalServerException") => AmpError::ServiceUnavailable(message),
        _ => AmpError::Api(DisplayErrorContext(&err).to_string()),
    }
}

fn status_of(status: Option<&WorkspaceStatus>) -> WorkspaceStatusCode {
    match status {
        Some(status) => WorkspaceStatusCode::parse(status.status_code().as_str()),
        None => WorkspaceStatusCode::Unknown("UNKNOWN".to_string()),
    }
}

fn workspace_from(description: &WorkspaceDescription) -> Workspace {
    let created_at = description.created_at();
    Workspace {
        workspace_id: description.workspace_id().to_string(),
        alias: description.alias().map(str::to_string),
        arn: description.arn().to_string(),
        status: status_of(description.status()),
        prometheus_endpoint: description.prometheus_endpoint().map(str::to_string),
        kms_key_arn: description.kms_key_arn().map(str::to_string),
        tags: description.tags().cloned().unwrap_or_default(),
        created_at: DateTime::<Utc>::from_timestamp(created_at.secs(), created_at.subsec_nanos())
            .unwrap_or_default(),
    }
}

#[async_trait]
impl PrometheusApi for AwsPrometheusClient {
    async fn create_workspace(&self, request: CreateWorkspaceRequest) -> Result<CreatedWorkspace> {
        tracing::debug!(alias = ?request.alias, "CreateWorkspace");
        let output = self
            .client
            .create_workspace()
            .set_alias(request.alias)
            .set_kms_key_arn(request.kms_key_arn)
            .set_tags((!request.tags.is_empty()).then_some(request.tags))
            .set_client_token(request.client_token)
            .send()
            .await
            .map_err(classify)?;

        Ok(CreatedWorkspace {
            workspace_id: output.workspace_id().to_string(),
            arn: output.arn().to_string(),
            status: status_of(output.status()),
        })
    }

    async fn describe_workspace(&self, workspace_id: &str) -> Result<Option<Workspace>> {
        let output = self
            .client
            .describe_workspace()
            .workspace_id(workspace_id)
            .send()
            .await
            .map_err(classify)?;
        Ok(output.workspace().map(workspace_from))
    }

    async fn update_workspace_alias(&self, workspace_id: &str, alias: Option<&str>) -> Result<()> {
        tracing::debug!(workspace_id, ?alias, "UpdateWorkspaceAlias");
        self.client
            .update_workspace_alias()
            .workspace_id(workspace_id)
            .set_alias(alias.map(str::to_string))
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn delete_workspace(&self, workspace_id: &str) -> Result<()> {
        tracing::debug!(workspace_id, "DeleteWorkspace");
        self.client
            .delete_workspace()
            .workspace_id(workspace_id)
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn list_workspaces(&self, alias_prefix: Option<&str>) -> Result<Vec<WorkspaceSummary>> {
        let mut workspaces = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let output = self
                .client
                .list_workspaces()
                .set_alias(alias_prefix.map(str::to_string))
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(classify)?;

            workspaces.extend(output.workspaces().iter().map(|w| WorkspaceSummary {
                workspace_id: w.workspace_id().to_string(),
                alias: w.alias().map(str::to_string),
                arn: w.arn().to_string(),
                status: status_of(w.status()),
            }));

            match output.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(workspaces)
    }

    async fn tag_resource(&self, arn: &str, tags: HashMap<String, String>) -> Result<()> {
        self.client
            .tag_resource()
            .resource_arn(arn)
            .set_tags(Some(tags))
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn untag_resource(&self, arn: &str, tag_keys: Vec<String>) -> Result<()> {
        self.client
            .untag_resource()
            .resource_arn(arn)
            .set_tag_keys(Some(tag_keys))
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }
}
