//! Planned actions and apply results for a single resource address

use serde::{Deserialize, Serialize};

/// One step the reconciler will take for an address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// `"{action}-{address}"`
    pub id: String,

    pub action_type: ActionType,

    /// Resource type (e.g., "aws_prometheus_workspace")
    pub resource_type: String,

    /// Resource address in tracked state
    pub address: String,

    /// Remote identifier of the existing object, if any
    pub resource_id: Option<String>,

    /// Human-readable summary
    pub description: String,

    /// Attribute-level differences behind this action
    pub changes: Vec<AttributeChange>,
}

impl Action {
    pub fn new(
        action_type: ActionType,
        resource_type: impl Into<String>,
        address: impl Into<String>,
        resource_id: Option<String>,
        changes: Vec<AttributeChange>,
    ) -> Self {
        let address = address.into();
        let description = match action_type {
            ActionType::NoOp => format!("{} is up to date", address),
            ActionType::Replace => format!(
                "{} must be replaced ({})",
                address,
                changes
                    .iter()
                    .filter(|c| c.requires_replace)
                    .map(|c| c.attribute.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            other => format!("{} will be {}d", address, other),
        };
        Self {
            id: format!("{}-{}", action_type, address),
            action_type,
            resource_type: resource_type.into(),
            address,
            resource_id,
            description,
            changes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Create,
    /// Update an existing resource in place
    Update,
    /// Destroy and recreate because a force-new attribute changed
    Replace,
    Delete,
    /// Already converged
    NoOp,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Update => write!(f, "update"),
            ActionType::Replace => write!(f, "replace"),
            ActionType::Delete => write!(f, "delete"),
            ActionType::NoOp => write!(f, "no-op"),
        }
    }
}

/// Difference of a single attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeChange {
    pub attribute: String,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub requires_replace: bool,
}

/// Outcome of an apply cycle
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyResult {
    /// Actions that changed something; no-ops are not listed
    pub succeeded: Vec<ActionResult>,

    pub duration_ms: u64,
}

impl ApplyResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_success(&mut self, action_id: String, message: String) {
        self.succeeded.push(ActionResult { action_id, message });
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub action_id: String,
    pub message: String,
}

/// Actions computed by a plan step, in apply order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub actions: Vec<Action>,

    /// False when every action is a no-op
    pub has_changes: bool,
}

impl Plan {
    pub fn new(actions: Vec<Action>) -> Self {
        let has_changes = actions.iter().any(|a| a.action_type != ActionType::NoOp);
        Self {
            actions,
            has_changes,
        }
    }

    pub fn empty() -> Self {
        Self {
            actions: Vec::new(),
            has_changes: false,
        }
    }

    pub fn actions_by_type(&self, action_type: ActionType) -> Vec<&Action> {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .collect()
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.actions_by_type(ActionType::Create).len(),
            update: self.actions_by_type(ActionType::Update).len(),
            replace: self.actions_by_type(ActionType::Replace).len(),
            delete: self.actions_by_type(ActionType::Delete).len(),
            no_change: self.actions_by_type(ActionType::NoOp).len(),
        }
    }
}

/// Action counts per type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub replace: usize,
    pub delete: usize,
    pub no_change: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to replace, {} to delete, {} unchanged",
            self.create, self.update, self.replace, self.delete, self.no_change
        )
    }
}
