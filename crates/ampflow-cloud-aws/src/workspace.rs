//! `aws_prometheus_workspace` resource

use crate::client::{CreateWorkspaceRequest, PrometheusApi, Workspace, WorkspaceStatusCode};
use crate::config::ProviderConfig;
use ampflow_cloud::wait::{Probe, retry_transient, wait_for};
use ampflow_cloud::{
    AttributeSchema, CloudError, DeleteOutcome, ErrorKind, LifecyclePhase, Operation, ReadOutcome,
    ResourceConfig, ResourceLifecycle, ResourceRecord, ResourceSchema, Result,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub const RESOURCE_TYPE: &str = "aws_prometheus_workspace";

/// Attribute declarations of a workspace
pub fn workspace_schema() -> ResourceSchema {
    ResourceSchema::new(RESOURCE_TYPE)
        .with_attribute(
            AttributeSchema::optional_string("alias")
                .with_max_length(100)
                .with_default(json!("")),
        )
        .with_attribute(AttributeSchema::optional_string("kms_key_arn").force_new())
        .with_attribute(AttributeSchema::optional_string_map("tags"))
        .with_attribute(AttributeSchema::computed_string("arn"))
        .with_attribute(AttributeSchema::computed_string("prometheus_endpoint"))
        .with_attribute(AttributeSchema::computed_string("status"))
        .with_attribute(AttributeSchema::computed_string("created_at"))
}

/// Map a remote status onto the lifecycle
///
/// Unknown codes are treated as transitional.
pub fn phase_of(status: &WorkspaceStatusCode) -> LifecyclePhase {
    match status {
        WorkspaceStatusCode::Creating => LifecyclePhase::Creating,
        WorkspaceStatusCode::Active => LifecyclePhase::Active,
        WorkspaceStatusCode::Updating | WorkspaceStatusCode::Unknown(_) => LifecyclePhase::Updating,
        WorkspaceStatusCode::Deleting => LifecyclePhase::Deleting,
        WorkspaceStatusCode::CreationFailed => LifecyclePhase::Failed,
    }
}

/// Desired workspace settings extracted from configuration
#[derive(Debug, Clone, PartialEq)]
struct DesiredWorkspace {
    alias: Option<String>,
    kms_key_arn: Option<String>,
    tags: HashMap<String, String>,
}

impl DesiredWorkspace {
    fn from_config(schema: &ResourceSchema, desired: &ResourceConfig) -> Result<Self> {
        schema.validate(&desired.config)?;
        let normalized = schema.normalize(&desired.config);
        let non_empty = |key: &str| {
            normalized
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let tags = match normalized.get("tags") {
            Some(tags) => serde_json::from_value(tags.clone())?,
            None => HashMap::new(),
        };
        Ok(Self {
            alias: non_empty("alias"),
            kms_key_arn: non_empty("kms_key_arn"),
            tags,
        })
    }
}

/// Lifecycle of Amazon Managed Service for Prometheus workspaces
pub struct WorkspaceResource<C> {
    client: Arc<C>,
    config: ProviderConfig,
    schema: ResourceSchema,
}

impl<C: PrometheusApi> WorkspaceResource<C> {
    pub fn new(client: Arc<C>, config: ProviderConfig) -> Self {
        Self {
            client,
            config,
            schema: workspace_schema(),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// IDs of existing workspaces, optionally filtered by alias prefix
    ///
    /// Any of them can be passed to [`ResourceLifecycle::import`].
    pub async fn discover(&self, alias_prefix: Option<&str>) -> Result<Vec<String>> {
        let client = self.client.as_ref();
        let workspaces = retry_transient(&self.config.retry, Operation::Import, "*", move || async move {
            client
                .list_workspaces(alias_prefix)
                .await
                .map_err(CloudError::from)
        })
        .await?;
        Ok(workspaces.into_iter().map(|w| w.workspace_id).collect())
    }

    /// Describe with transient retry; `None` means the workspace does not exist
    async fn describe(&self, id: &str, operation: Operation) -> Result<Option<Workspace>> {
        let client = self.client.as_ref();
        let described = retry_transient(&self.config.retry, operation, id, move || async move {
            client.describe_workspace(id).await.map_err(CloudError::from)
        })
        .await;
        found(described, operation, id)
    }

    /// Single describe for a readiness probe
    ///
    /// Retryable errors surface to [`wait_for`], which counts them as
    /// pending within its own deadline.
    async fn describe_once(&self, id: &str) -> Result<Option<Workspace>> {
        let described = self.client.describe_workspace(id).await.map_err(CloudError::from);
        found(described, Operation::Wait, id)
    }

    /// Poll until the workspace is ACTIVE
    ///
    /// Not-found is tolerated for `grace` after the wait starts.
    async fn wait_active(&self, id: &str, timeout: Duration, grace: Duration) -> Result<Workspace> {
        let started = Instant::now();
        wait_for("ACTIVE", id, &self.config.poll, timeout, move || async move {
            match self.describe_once(id).await? {
                Some(ws) if ws.status == WorkspaceStatusCode::Active => Ok(Probe::Ready(ws)),
                Some(ws) if ws.status.is_failed() => {
                    Ok(Probe::Failed(format!("workspace entered {}", ws.status)))
                }
                Some(ws) => Ok(Probe::Pending(ws.status.to_string())),
                None if started.elapsed() < grace => Ok(Probe::Pending("NOT_FOUND".to_string())),
                None => Err(CloudError::ResourceNotFound(id.to_string())),
            }
        })
        .await
    }

    async fn wait_deleted(&self, id: &str) -> Result<()> {
        wait_for(
            "deleted",
            id,
            &self.config.poll,
            self.config.delete_timeout,
            move || async move {
                let probe = match self.describe_once(id).await? {
                    None => Probe::Ready(()),
                    Some(ws) => Probe::Pending(ws.status.to_string()),
                };
                Ok::<_, CloudError>(probe)
            },
        )
        .await
    }

    /// Poll until the workspace is ACTIVE or gone
    async fn wait_settled(&self, id: &str, timeout: Duration) -> Result<Option<Workspace>> {
        wait_for("settled", id, &self.config.poll, timeout, move || async move {
            let probe = match self.describe_once(id).await? {
                None => Probe::Ready(None),
                Some(ws) if ws.status == WorkspaceStatusCode::Active => Probe::Ready(Some(ws)),
                Some(ws) if ws.status.is_failed() => {
                    Probe::Failed(format!("workspace entered {}", ws.status))
                }
                Some(ws) => Probe::Pending(ws.status.to_string()),
            };
            Ok::<_, CloudError>(probe)
        })
        .await
    }

    fn record_from(&self, ws: &Workspace) -> ResourceRecord {
        let mut record = ResourceRecord::new(&ws.workspace_id, RESOURCE_TYPE)
            .with_phase(phase_of(&ws.status))
            .with_attribute("alias", json!(ws.alias.clone().unwrap_or_default()))
            .with_attribute("arn", json!(ws.arn))
            .with_attribute("status", json!(ws.status.as_str()))
            .with_attribute("created_at", json!(ws.created_at.to_rfc3339()))
            .with_attribute("tags", json!(ws.tags));
        if let Some(endpoint) = &ws.prometheus_endpoint {
            record = record.with_attribute("prometheus_endpoint", json!(endpoint));
        }
        if let Some(key) = &ws.kms_key_arn {
            record = record.with_attribute("kms_key_arn", json!(key));
        }
        record
    }

    async fn sync_tags(&self, current: &Workspace, desired: &HashMap<String, String>) -> Result<bool> {
        let client = self.client.as_ref();
        let arn = current.arn.as_str();
        let id = current.workspace_id.as_str();

        let removed: Vec<String> = current
            .tags
            .keys()
            .filter(|k| !desired.contains_key(*k))
            .cloned()
            .collect();
        let added: HashMap<String, String> = desired
            .iter()
            .filter(|(k, v)| current.tags.get(*k) != Some(*v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        if !removed.is_empty() {
            tracing::debug!(resource_id = id, keys = ?removed, "removing tags");
            retry_transient(&self.config.retry, Operation::Update, id, || {
                let keys = removed.clone();
                async move { client.untag_resource(arn, keys).await.map_err(CloudError::from) }
            })
            .await?;
        }
        if !added.is_empty() {
            tracing::debug!(resource_id = id, tags = ?added, "setting tags");
            retry_transient(&self.config.retry, Operation::Update, id, || {
                let tags = added.clone();
                async move { client.tag_resource(arn, tags).await.map_err(CloudError::from) }
            })
            .await?;
        }
        Ok(!removed.is_empty() || !added.is_empty())
    }
}

#[async_trait]
impl<C: PrometheusApi> ResourceLifecycle for WorkspaceResource<C> {
    fn resource_type(&self) -> &str {
        RESOURCE_TYPE
    }

    fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    async fn create(&self, desired: &ResourceConfig) -> Result<ResourceRecord> {
        let wanted = DesiredWorkspace::from_config(&self.schema, desired)?;
        let request = CreateWorkspaceRequest {
            alias: wanted.alias,
            kms_key_arn: wanted.kms_key_arn,
            tags: wanted.tags,
            client_token: Some(uuid::Uuid::new_v4().to_string()),
        };

        let client = self.client.as_ref();
        let created = retry_transient(&self.config.retry, Operation::Create, "new workspace", || {
            let request = request.clone();
            async move { client.create_workspace(request).await.map_err(CloudError::from) }
        })
        .await?;

        let id = created.workspace_id;
        tracing::info!(resource_id = %id, status = %created.status, "workspace created, waiting for ACTIVE");

        let mut tracked = ResourceRecord::new(&id, RESOURCE_TYPE);
        tracked.transition(LifecyclePhase::Creating)?;

        match self
            .wait_active(&id, self.config.create_timeout, self.config.not_found_grace)
            .await
        {
            Ok(ws) => {
                tracked.transition(LifecyclePhase::Active)?;
                let mut record = self.record_from(&ws);
                record.phase = tracked.phase;
                tracing::info!(resource_id = %id, alias = ?ws.alias, "workspace active");
                Ok(record)
            }
            Err(e) => {
                if e.kind() == ErrorKind::Provisioning {
                    tracked.transition(LifecyclePhase::Failed)?;
                }
                tracing::warn!(
                    resource_id = %id,
                    phase = %tracked.phase,
                    error = %e,
                    "workspace did not become ACTIVE; it is not tracked and must be deleted manually"
                );
                Err(e.context(Operation::Create, id))
            }
        }
    }

    async fn read(&self, id: &str) -> Result<ReadOutcome> {
        match self.describe(id, Operation::Read).await? {
            Some(ws) => Ok(ReadOutcome::Found(self.record_from(&ws))),
            None => {
                tracing::debug!(resource_id = id, "workspace not found");
                Ok(ReadOutcome::NotFound)
            }
        }
    }

    async fn update(&self, id: &str, desired: &ResourceConfig) -> Result<ResourceRecord> {
        let wanted = DesiredWorkspace::from_config(&self.schema, desired)?;
        let mut current = self
            .describe(id, Operation::Update)
            .await?
            .ok_or_else(|| CloudError::ResourceNotFound(id.to_string()).context(Operation::Update, id))?;

        if wanted.kms_key_arn != current.kms_key_arn {
            return Err(CloudError::ForceNewUpdate {
                resource_id: id.to_string(),
                attributes: vec!["kms_key_arn".to_string()],
            });
        }

        if current.status != WorkspaceStatusCode::Active {
            tracing::debug!(resource_id = id, status = %current.status, "waiting before update");
            current = self
                .wait_active(id, self.config.update_timeout, Duration::ZERO)
                .await?;
        }

        let mut changed = false;
        if wanted.alias.as_deref().unwrap_or_default() != current.alias.as_deref().unwrap_or_default() {
            let client = self.client.as_ref();
            let alias = wanted.alias.as_deref();
            tracing::info!(resource_id = id, from = ?current.alias, to = ?alias, "updating alias");
            retry_transient(&self.config.retry, Operation::Update, id, move || async move {
                client
                    .update_workspace_alias(id, alias)
                    .await
                    .map_err(CloudError::from)
            })
            .await?;
            changed = true;
        }
        changed |= self.sync_tags(&current, &wanted.tags).await?;

        let ws = if changed {
            self.wait_active(id, self.config.update_timeout, Duration::ZERO)
                .await
                .map_err(|e| e.context(Operation::Update, id))?
        } else {
            current
        };
        Ok(self.record_from(&ws))
    }

    async fn delete(&self, id: &str) -> Result<DeleteOutcome> {
        let client = self.client.as_ref();
        let deleted = retry_transient(&self.config.retry, Operation::Delete, id, move || async move {
            client.delete_workspace(id).await.map_err(CloudError::from)
        })
        .await;

        match deleted {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                tracing::warn!(resource_id = id, "workspace already deleted");
                return Ok(DeleteOutcome::AlreadyAbsent);
            }
            Err(e) => return Err(e),
        }

        self.wait_deleted(id)
            .await
            .map_err(|e| e.context(Operation::Delete, id))?;
        tracing::info!(resource_id = id, "workspace deleted");
        Ok(DeleteOutcome::Deleted)
    }

    async fn import(&self, id: &str) -> Result<ResourceRecord> {
        let ws = self
            .describe(id, Operation::Import)
            .await?
            .ok_or_else(|| CloudError::ResourceNotFound(id.to_string()).context(Operation::Import, id))?;

        let ws = if ws.status == WorkspaceStatusCode::Active {
            ws
        } else if ws.status.is_failed() {
            return Err(CloudError::Provisioning {
                resource_id: id.to_string(),
                reason: format!("workspace is {}", ws.status),
            }
            .context(Operation::Import, id));
        } else {
            self.wait_active(id, self.config.create_timeout, Duration::ZERO)
                .await
                .map_err(|e| e.context(Operation::Import, id))?
        };

        tracing::info!(resource_id = id, "workspace imported");
        Ok(self.record_from(&ws))
    }

    async fn settle(&self, id: &str) -> Result<ReadOutcome> {
        let Some(current) = self.describe(id, Operation::Wait).await? else {
            return Ok(ReadOutcome::NotFound);
        };
        if current.status.is_failed() {
            return Err(CloudError::Provisioning {
                resource_id: id.to_string(),
                reason: format!("workspace is {}", current.status),
            });
        }

        let settled = if current.status == WorkspaceStatusCode::Active {
            Some(current)
        } else {
            let timeout = if current.status == WorkspaceStatusCode::Deleting {
                self.config.delete_timeout
            } else {
                self.config.update_timeout
            };
            tracing::info!(resource_id = id, status = %current.status, "waiting for workspace to settle");
            self.wait_settled(id, timeout)
                .await
                .map_err(|e| e.context(Operation::Wait, id))?
        };

        Ok(match settled {
            Some(ws) => ReadOutcome::Found(self.record_from(&ws)),
            None => ReadOutcome::NotFound,
        })
    }
}

/// Map a describe result: not-found is `None`, an empty success is a bug
fn found(
    described: Result<Option<Workspace>>,
    operation: Operation,
    id: &str,
) -> Result<Option<Workspace>> {
    match described {
        Ok(Some(workspace)) => Ok(Some(workspace)),
        Ok(None) => Err(CloudError::InvariantViolation {
            operation,
            resource_id: id.to_string(),
            detail: "describe succeeded without a workspace".to_string(),
        }),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
