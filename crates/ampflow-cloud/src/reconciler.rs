//! Apply cycle for a single resource address
//!
//! The reconciler owns tracked state. Each cycle refreshes the record from
//! the remote system, diffs it against the desired configuration and
//! applies the resulting action through a [`ResourceLifecycle`].

use crate::action::{Action, ActionType, ApplyResult, Plan};
use crate::error::{CloudError, ErrorKind, Operation, Result};
use crate::lifecycle::LifecyclePhase;
use crate::plan;
use crate::provider::{DeleteOutcome, ReadOutcome, ResourceConfig, ResourceLifecycle};
use crate::state::{GlobalState, ResourceRecord};
use std::sync::Arc;

/// Drives one resource type toward its desired state
pub struct Reconciler<R> {
    resource: Arc<R>,
}

impl<R> Clone for Reconciler<R> {
    fn clone(&self) -> Self {
        Self {
            resource: Arc::clone(&self.resource),
        }
    }
}

impl<R: ResourceLifecycle> Reconciler<R> {
    pub fn new(resource: Arc<R>) -> Self {
        Self { resource }
    }

    pub fn resource(&self) -> &R {
        &self.resource
    }

    /// Re-read the tracked record for `address`
    ///
    /// A record whose remote object disappeared is dropped from state so the
    /// next plan recreates it.
    pub async fn refresh(
        &self,
        state: &mut GlobalState,
        address: &str,
    ) -> Result<Option<ResourceRecord>> {
        let Some(prior) = state.get_resource(address).cloned() else {
            return Ok(None);
        };

        match self.resource.read(&prior.id).await? {
            ReadOutcome::Found(mut record) => {
                if prior.phase == LifecyclePhase::Failed {
                    record.phase = LifecyclePhase::Failed;
                }
                record.created_at = prior.created_at;
                state.set_resource(address, record.clone());
                Ok(Some(record))
            }
            ReadOutcome::NotFound => {
                tracing::warn!(
                    address,
                    resource_id = %prior.id,
                    "resource no longer exists remotely, removing it from state"
                );
                state.remove_resource(address);
                Ok(None)
            }
        }
    }

    /// Refresh `address` and plan the action converging it to `desired`
    ///
    /// `None` plans destruction.
    pub async fn plan(
        &self,
        state: &mut GlobalState,
        address: &str,
        desired: Option<&ResourceConfig>,
    ) -> Result<Plan> {
        let prior = self.refresh(state, address).await?;
        let schema = self.resource.schema();
        let action = match desired {
            Some(desired) => plan::diff(schema, address, prior.as_ref(), desired)?,
            None => plan::destroy(schema, address, prior.as_ref()),
        };
        tracing::debug!(address, action = %action.action_type, "planned");
        Ok(Plan::new(vec![action]))
    }

    /// Plan and apply in one cycle
    pub async fn apply(
        &self,
        state: &mut GlobalState,
        address: &str,
        desired: Option<&ResourceConfig>,
    ) -> Result<ApplyResult> {
        let plan = self.plan(state, address, desired).await?;
        self.apply_plan(state, &plan, desired).await
    }

    /// Apply a previously computed plan
    pub async fn apply_plan(
        &self,
        state: &mut GlobalState,
        plan: &Plan,
        desired: Option<&ResourceConfig>,
    ) -> Result<ApplyResult> {
        let mut result = ApplyResult::new();
        let start = std::time::Instant::now();

        for action in &plan.actions {
            let message = self.apply_action(state, action, desired).await?;
            if action.action_type != ActionType::NoOp {
                tracing::info!(address = %action.address, action = %action.action_type, "{}", message);
                result.add_success(action.id.clone(), message);
            }
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }

    async fn apply_action(
        &self,
        state: &mut GlobalState,
        action: &Action,
        desired: Option<&ResourceConfig>,
    ) -> Result<String> {
        match action.action_type {
            ActionType::NoOp => Ok(format!("{} unchanged", action.address)),
            ActionType::Create => {
                let record = self.create(state, &action.address, require(desired, action)?).await?;
                Ok(format!("created {} (ID: {})", action.address, record.id))
            }
            ActionType::Update => {
                if action.changes.iter().any(|c| c.requires_replace) {
                    return Err(CloudError::ForceNewUpdate {
                        resource_id: action.resource_id.clone().unwrap_or_default(),
                        attributes: action
                            .changes
                            .iter()
                            .filter(|c| c.requires_replace)
                            .map(|c| c.attribute.clone())
                            .collect(),
                    });
                }
                let record = self.update(state, &action.address, require(desired, action)?).await?;
                Ok(format!("updated {} (ID: {})", action.address, record.id))
            }
            ActionType::Replace => {
                let desired = require(desired, action)?;
                self.delete(state, &action.address).await?;
                let record = self.create(state, &action.address, desired).await?;
                Ok(format!("replaced {} (ID: {})", action.address, record.id))
            }
            ActionType::Delete => {
                self.delete(state, &action.address).await?;
                Ok(format!("deleted {}", action.address))
            }
        }
    }

    async fn create(
        &self,
        state: &mut GlobalState,
        address: &str,
        desired: &ResourceConfig,
    ) -> Result<ResourceRecord> {
        // A failed create tracks nothing
        let record = self.resource.create(desired).await?;
        self.check_created(&record)?;
        state.set_resource(address, record.clone());
        Ok(record)
    }

    fn check_created(&self, record: &ResourceRecord) -> Result<()> {
        let violation = |detail: String| CloudError::InvariantViolation {
            operation: Operation::Create,
            resource_id: record.id.clone(),
            detail,
        };
        if record.id.is_empty() {
            return Err(violation("no identifier assigned".to_string()));
        }
        if record.phase != LifecyclePhase::Active {
            return Err(violation(format!("returned in phase {}", record.phase)));
        }
        let missing: Vec<&str> = self
            .resource
            .schema()
            .computed_attributes()
            .filter(|a| record.attributes.get(&a.name).is_none_or(|v| v.is_null()))
            .map(|a| a.name.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(violation(format!(
                "computed attributes not populated: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }

    /// Wait out a transitional phase before starting a new operation
    ///
    /// `None` means the object went away while waiting; it is no longer
    /// tracked.
    async fn await_settled(
        &self,
        state: &mut GlobalState,
        address: &str,
    ) -> Result<Option<ResourceRecord>> {
        let mut tracked = tracked(state, address)?;
        if tracked.phase.accepts_operations() || tracked.phase.is_terminal() {
            return Ok(Some(tracked));
        }

        tracing::info!(address, resource_id = %tracked.id, phase = %tracked.phase, "waiting for resource to settle");
        match self.resource.settle(&tracked.id).await {
            Ok(ReadOutcome::Found(mut record)) => {
                record.created_at = tracked.created_at;
                state.set_resource(address, record.clone());
                Ok(Some(record))
            }
            Ok(ReadOutcome::NotFound) => {
                tracing::info!(address, resource_id = %tracked.id, "resource went away while settling");
                state.remove_resource(address);
                Ok(None)
            }
            Err(e) => {
                if e.kind() == ErrorKind::Provisioning {
                    tracked.transition(LifecyclePhase::Failed)?;
                    state.set_resource(address, tracked);
                }
                Err(e)
            }
        }
    }

    async fn update(
        &self,
        state: &mut GlobalState,
        address: &str,
        desired: &ResourceConfig,
    ) -> Result<ResourceRecord> {
        let Some(mut tracked) = self.await_settled(state, address).await? else {
            return Err(
                CloudError::ResourceNotFound(address.to_string()).context(Operation::Update, address),
            );
        };
        tracked.transition(LifecyclePhase::Updating)?;
        state.set_resource(address, tracked.clone());

        match self.resource.update(&tracked.id, desired).await {
            Ok(mut record) => {
                tracked.transition(LifecyclePhase::Active)?;
                record.phase = tracked.phase;
                record.created_at = tracked.created_at;
                state.set_resource(address, record.clone());
                Ok(record)
            }
            Err(e) => {
                let next = if e.kind() == ErrorKind::Provisioning {
                    LifecyclePhase::Failed
                } else {
                    LifecyclePhase::Active
                };
                tracked.transition(next)?;
                state.set_resource(address, tracked);
                Err(e)
            }
        }
    }

    async fn delete(&self, state: &mut GlobalState, address: &str) -> Result<()> {
        // An earlier delete may still be in progress
        let Some(prior) = self.await_settled(state, address).await? else {
            return Ok(());
        };
        let mut tracked = prior.clone();
        tracked.transition(LifecyclePhase::Deleting)?;
        state.set_resource(address, tracked.clone());

        let deleted = match self.resource.delete(&tracked.id).await {
            Ok(outcome) => {
                if outcome == DeleteOutcome::AlreadyAbsent {
                    tracing::warn!(address, resource_id = %tracked.id, "already deleted");
                }
                self.verify_destroyed(&tracked.id).await
            }
            Err(e) => Err(e),
        };

        match deleted {
            Ok(()) => {
                tracked.transition(LifecyclePhase::Absent)?;
                state.remove_resource(address);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::Provisioning => {
                tracked.transition(LifecyclePhase::Failed)?;
                state.set_resource(address, tracked);
                Err(e)
            }
            Err(e) => {
                // Keep the record as it was so a retry can re-attempt
                state.set_resource(address, prior);
                Err(e)
            }
        }
    }

    /// Adopt an existing remote object as `address`
    pub async fn import(
        &self,
        state: &mut GlobalState,
        address: &str,
        id: &str,
    ) -> Result<ResourceRecord> {
        if state.get_resource(address).is_some() {
            return Err(CloudError::ResourceAlreadyExists(address.to_string()));
        }
        let record = self.resource.import(id).await?;
        tracing::info!(address, resource_id = %record.id, "imported");
        state.set_resource(address, record.clone());
        Ok(record)
    }

    /// Plan and apply destruction of `address`
    pub async fn destroy(&self, state: &mut GlobalState, address: &str) -> Result<ApplyResult> {
        self.apply(state, address, None).await
    }

    /// Check that a deleted object is really gone
    pub async fn verify_destroyed(&self, id: &str) -> Result<()> {
        match self.resource.read(id).await? {
            ReadOutcome::NotFound => Ok(()),
            ReadOutcome::Found(record) => Err(CloudError::InvariantViolation {
                operation: Operation::Delete,
                resource_id: id.to_string(),
                detail: format!("still present in phase {} after delete", record.phase),
            }),
        }
    }
}

fn require<'a>(desired: Option<&'a ResourceConfig>, action: &Action) -> Result<&'a ResourceConfig> {
    desired.ok_or_else(|| {
        CloudError::InvalidConfig(format!(
            "{} of {} needs a desired configuration",
            action.action_type, action.address
        ))
    })
}

fn tracked(state: &GlobalState, address: &str) -> Result<ResourceRecord> {
    state
        .get_resource(address)
        .cloned()
        .ok_or_else(|| CloudError::StateError(format!("{} is not tracked", address)))
}
