//! AmpFlow Cloud Reconciliation
//!
//! This crate provides the provider-neutral reconciliation engine for
//! AmpFlow: it drives a single declared resource toward its desired state
//! against an eventually-consistent remote API.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                   Reconciler                     │
//! │        refresh → plan (diff) → apply             │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                 ampflow-cloud                    │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │          Resource Abstraction             │   │
//! │  │  trait ResourceLifecycle { ... }          │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌────────────┐ ┌────────────┐ ┌────────────┐   │
//! │  │   Schema   │ │ State Mgmt │ │   Waiter   │   │
//! │  └────────────┘ └────────────┘ └────────────┘   │
//! └───────┬─────────────────────────────────────────┘
//!         │
//! ┌───────▼───────────────┐
//! │   ampflow-cloud-aws   │
//! │  prometheus workspace │
//! └───────────────────────┘
//! ```

pub mod action;
pub mod error;
pub mod lifecycle;
pub mod plan;
pub mod provider;
pub mod reconciler;
pub mod schema;
pub mod state;
pub mod wait;

// Re-exports
pub use action::{Action, ActionType, ApplyResult, AttributeChange, Plan, PlanSummary};
pub use error::{CloudError, ErrorKind, Operation, Result};
pub use lifecycle::LifecyclePhase;
pub use provider::{DeleteOutcome, ReadOutcome, ResourceConfig, ResourceLifecycle, RetryConfig};
pub use reconciler::Reconciler;
pub use schema::{AttributeSchema, ResourceSchema, ValueType};
pub use state::{GlobalState, ResourceRecord, StateLock, StateManager};
pub use wait::{Probe, retry_transient, wait_for};
