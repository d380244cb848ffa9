//! Lifecycle phases of a single managed resource
//!
//! ```text
//! Absent ─▶ Creating ─▶ Active ⇄ Updating
//!              │          │         │
//!              ▼          ▼         │
//!           Failed ⇄ Deleting       │
//!              ▲          │         │
//!              │          ▼         │
//!              │       Absent       │
//!              └────────────────────┘
//! ```
//!
//! `Absent` and `Active` are the only phases that accept a new operation
//! without waiting. `Failed` is terminal: the only way out is an explicit
//! delete.

use serde::{Deserialize, Serialize};

/// Phase of a resource as tracked by the reconciler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    /// No remote object exists
    Absent,
    /// Create issued, waiting for readiness
    Creating,
    /// Ready and converged
    Active,
    /// In-place update in progress
    Updating,
    /// Delete issued, waiting for the object to disappear
    Deleting,
    /// The remote system reported a failure; needs manual intervention
    Failed,
}

impl LifecyclePhase {
    /// Whether `self -> next` is an allowed transition
    pub fn can_transition_to(self, next: LifecyclePhase) -> bool {
        use LifecyclePhase::*;
        matches!(
            (self, next),
            (Absent, Creating)
                | (Creating, Active)
                | (Creating, Failed)
                | (Active, Updating)
                | (Updating, Active)
                | (Updating, Failed)
                | (Active, Deleting)
                | (Deleting, Absent)
                | (Deleting, Failed)
                | (Failed, Deleting)
        )
    }

    pub fn accepts_operations(self) -> bool {
        matches!(self, LifecyclePhase::Absent | LifecyclePhase::Active)
    }

    pub fn is_terminal(self) -> bool {
        self == LifecyclePhase::Failed
    }
}

impl std::fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecyclePhase::Absent => write!(f, "absent"),
            LifecyclePhase::Creating => write!(f, "creating"),
            LifecyclePhase::Active => write!(f, "active"),
            LifecyclePhase::Updating => write!(f, "updating"),
            LifecyclePhase::Deleting => write!(f, "deleting"),
            LifecyclePhase::Failed => write!(f, "failed"),
        }
    }
}
