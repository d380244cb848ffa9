//! In-memory Prometheus service for tests
//!
//! Behaves like the remote service closely enough to exercise the
//! lifecycle: workspaces pass through `CREATING`/`UPDATING`/`DELETING` for
//! a configurable number of describe calls, and failures, throttling,
//! empty responses and eventual-consistency gaps can be injected.

use crate::client::{
    CreateWorkspaceRequest, CreatedWorkspace, PrometheusApi, Workspace, WorkspaceStatusCode,
    WorkspaceSummary,
};
use crate::error::{AmpError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

const ACCOUNT_ID: &str = "123456789012";

#[derive(Debug)]
struct Entry {
    workspace: Workspace,
    /// Describe calls left before the current transitional status settles
    pending_polls: u32,
    /// Settle creation as CREATION_FAILED instead of ACTIVE
    fail_creation: bool,
    /// Describe calls left that still answer not-found after create
    hidden_polls: u32,
}

#[derive(Debug, Default)]
struct Inner {
    workspaces: HashMap<String, Entry>,
    client_tokens: HashMap<String, String>,
    calls: HashMap<&'static str, u32>,
    creation_polls: u32,
    update_polls: u32,
    deletion_polls: u32,
    fail_next_creation: bool,
    throttle_next: u32,
    throttle_describe: u32,
    empty_describe_next: u32,
    hide_after_create: u32,
}

/// In-memory implementation of [`PrometheusApi`]
#[derive(Debug)]
pub struct InMemoryPrometheus {
    region: String,
    inner: Mutex<Inner>,
}

impl Default for InMemoryPrometheus {
    fn default() -> Self {
        Self::new("us-east-1")
    }
}

impl InMemoryPrometheus {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Describe calls a new workspace stays `CREATING`
    pub fn with_creation_polls(self, polls: u32) -> Self {
        self.lock().creation_polls = polls;
        self
    }

    /// Describe calls a workspace stays `UPDATING` after an alias change
    pub fn with_update_polls(self, polls: u32) -> Self {
        self.lock().update_polls = polls;
        self
    }

    /// Describe calls a deleted workspace stays `DELETING`
    pub fn with_deletion_polls(self, polls: u32) -> Self {
        self.lock().deletion_polls = polls;
        self
    }

    /// The next created workspace ends up `CREATION_FAILED`
    pub fn fail_next_creation(&self) {
        self.lock().fail_next_creation = true;
    }

    /// The next `count` calls fail with a throttling error
    pub fn throttle_next(&self, count: u32) {
        self.lock().throttle_next = count;
    }

    /// Throttle the next `count` DescribeWorkspace calls only
    pub fn throttle_describes(&self, count: u32) {
        self.lock().throttle_describe = count;
    }

    /// The next `count` describe calls succeed without a workspace body
    pub fn empty_describe_next(&self, count: u32) {
        self.lock().empty_describe_next = count;
    }

    /// Newly created workspaces answer not-found for `polls` describe calls
    pub fn hide_after_create(&self, polls: u32) {
        self.lock().hide_after_create = polls;
    }

    /// Delete a workspace behind the reconciler's back
    pub fn remove_out_of_band(&self, workspace_id: &str) -> bool {
        self.lock().workspaces.remove(workspace_id).is_some()
    }

    /// Change an alias behind the reconciler's back
    pub fn set_alias_out_of_band(&self, workspace_id: &str, alias: Option<&str>) -> bool {
        match self.lock().workspaces.get_mut(workspace_id) {
            Some(entry) => {
                entry.workspace.alias = alias.map(str::to_string);
                true
            }
            None => false,
        }
    }

    /// Current status without advancing any transition
    pub fn status_of(&self, workspace_id: &str) -> Option<WorkspaceStatusCode> {
        self.lock()
            .workspaces
            .get(workspace_id)
            .map(|e| e.workspace.status.clone())
    }

    pub fn workspace_count(&self) -> usize {
        self.lock().workspaces.len()
    }

    /// Number of calls made to `operation` (e.g. "DescribeWorkspace")
    pub fn calls(&self, operation: &str) -> u32 {
        self.lock().calls.get(operation).copied().unwrap_or(0)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count the call and apply injected throttling
    fn begin(&self, operation: &'static str) -> Result<MutexGuard<'_, Inner>> {
        let mut inner = self.lock();
        *inner.calls.entry(operation).or_insert(0) += 1;
        if inner.throttle_next > 0 {
            inner.throttle_next -= 1;
            return Err(AmpError::Throttling(format!("{}: Rate exceeded", operation)));
        }
        Ok(inner)
    }
}

impl Inner {
    fn find_by_arn(&mut self, arn: &str) -> Result<&mut Entry> {
        self.workspaces
            .values_mut()
            .find(|e| e.workspace.arn == arn)
            .ok_or_else(|| AmpError::ResourceNotFound(arn.to_string()))
    }
}

#[async_trait]
impl PrometheusApi for InMemoryPrometheus {
    async fn create_workspace(&self, request: CreateWorkspaceRequest) -> Result<CreatedWorkspace> {
        let mut inner = self.begin("CreateWorkspace")?;

        if let Some(alias) = &request.alias {
            if alias.is_empty() || alias.chars().count() > 100 {
                return Err(AmpError::Validation(format!("invalid alias {:?}", alias)));
            }
        }

        if let Some(token) = &request.client_token {
            if let Some(entry) = inner
                .client_tokens
                .get(token)
                .and_then(|id| inner.workspaces.get(id))
            {
                return Ok(CreatedWorkspace {
                    workspace_id: entry.workspace.workspace_id.clone(),
                    arn: entry.workspace.arn.clone(),
                    status: entry.workspace.status.clone(),
                });
            }
        }

        let workspace_id = format!("ws-{}", uuid::Uuid::new_v4());
        let arn = format!(
            "arn:aws:aps:{}:{}:workspace/{}",
            self.region, ACCOUNT_ID, workspace_id
        );
        let status = if inner.creation_polls == 0 && !inner.fail_next_creation {
            WorkspaceStatusCode::Active
        } else {
            WorkspaceStatusCode::Creating
        };

        let entry = Entry {
            workspace: Workspace {
                workspace_id: workspace_id.clone(),
                alias: request.alias,
                arn: arn.clone(),
                status: status.clone(),
                prometheus_endpoint: Some(format!(
                    "https://aps-workspaces.{}.amazonaws.com/workspaces/{}/",
                    self.region, workspace_id
                )),
                kms_key_arn: request.kms_key_arn,
                tags: request.tags,
                created_at: Utc::now(),
            },
            pending_polls: inner.creation_polls,
            fail_creation: std::mem::take(&mut inner.fail_next_creation),
            hidden_polls: inner.hide_after_create,
        };

        if let Some(token) = request.client_token {
            inner.client_tokens.insert(token, workspace_id.clone());
        }
        inner.workspaces.insert(workspace_id.clone(), entry);

        Ok(CreatedWorkspace {
            workspace_id,
            arn,
            status,
        })
    }

    async fn describe_workspace(&self, workspace_id: &str) -> Result<Option<Workspace>> {
        let mut inner = self.begin("DescribeWorkspace")?;

        if inner.throttle_describe > 0 {
            inner.throttle_describe -= 1;
            return Err(AmpError::Throttling("DescribeWorkspace: Rate exceeded".to_string()));
        }

        if inner.empty_describe_next > 0 {
            inner.empty_describe_next -= 1;
            return Ok(None);
        }

        let entry = inner
            .workspaces
            .get_mut(workspace_id)
            .ok_or_else(|| AmpError::ResourceNotFound(workspace_id.to_string()))?;

        if entry.hidden_polls > 0 {
            entry.hidden_polls -= 1;
            return Err(AmpError::ResourceNotFound(workspace_id.to_string()));
        }

        let mut gone = false;
        if entry.pending_polls > 0 {
            entry.pending_polls -= 1;
        } else {
            let next = match &entry.workspace.status {
                WorkspaceStatusCode::Creating if entry.fail_creation => {
                    Some(WorkspaceStatusCode::CreationFailed)
                }
                WorkspaceStatusCode::Creating | WorkspaceStatusCode::Updating => {
                    Some(WorkspaceStatusCode::Active)
                }
                WorkspaceStatusCode::Deleting => {
                    gone = true;
                    None
                }
                _ => None,
            };
            if let Some(next) = next {
                entry.workspace.status = next;
            }
        }

        if gone {
            inner.workspaces.remove(workspace_id);
            return Err(AmpError::ResourceNotFound(workspace_id.to_string()));
        }
        Ok(Some(entry.workspace.clone()))
    }

    async fn update_workspace_alias(&self, workspace_id: &str, alias: Option<&str>) -> Result<()> {
        let mut inner = self.begin("UpdateWorkspaceAlias")?;
        let update_polls = inner.update_polls;

        let entry = inner
            .workspaces
            .get_mut(workspace_id)
            .ok_or_else(|| AmpError::ResourceNotFound(workspace_id.to_string()))?;

        if entry.workspace.status != WorkspaceStatusCode::Active {
            return Err(AmpError::Conflict(format!(
                "workspace {} is {}",
                workspace_id, entry.workspace.status
            )));
        }

        entry.workspace.alias = alias.map(str::to_string);
        if update_polls > 0 {
            entry.workspace.status = WorkspaceStatusCode::Updating;
            entry.pending_polls = update_polls;
        }
        Ok(())
    }

    async fn delete_workspace(&self, workspace_id: &str) -> Result<()> {
        let mut inner = self.begin("DeleteWorkspace")?;
        let deletion_polls = inner.deletion_polls;

        let entry = inner
            .workspaces
            .get_mut(workspace_id)
            .ok_or_else(|| AmpError::ResourceNotFound(workspace_id.to_string()))?;

        if deletion_polls == 0 {
            inner.workspaces.remove(workspace_id);
        } else if entry.workspace.status != WorkspaceStatusCode::Deleting {
            entry.workspace.status = WorkspaceStatusCode::Deleting;
            entry.pending_polls = deletion_polls;
        }
        Ok(())
    }

    async fn list_workspaces(&self, alias_prefix: Option<&str>) -> Result<Vec<WorkspaceSummary>> {
        let inner = self.begin("ListWorkspaces")?;

        let mut workspaces: Vec<&Workspace> = inner
            .workspaces
            .values()
            .map(|e| &e.workspace)
            .filter(|w| match alias_prefix {
                Some(prefix) => w.alias.as_deref().is_some_and(|a| a.starts_with(prefix)),
                None => true,
            })
            .collect();
        workspaces.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.workspace_id.cmp(&b.workspace_id))
        });

        Ok(workspaces
            .into_iter()
            .map(|w| WorkspaceSummary {
                workspace_id: w.workspace_id.clone(),
                alias: w.alias.clone(),
                arn: w.arn.clone(),
                status: w.status.clone(),
            })
            .collect())
    }

    async fn tag_resource(&self, arn: &str, tags: HashMap<String, String>) -> Result<()> {
        let mut inner = self.begin("TagResource")?;
        inner.find_by_arn(arn)?.workspace.tags.extend(tags);
        Ok(())
    }

    async fn untag_resource(&self, arn: &str, tag_keys: Vec<String>) -> Result<()> {
        let mut inner = self.begin("UntagResource")?;
        let entry = inner.find_by_arn(arn)?;
        for key in &tag_keys {
            entry.workspace.tags.remove(key);
        }
        Ok(())
    }
}
