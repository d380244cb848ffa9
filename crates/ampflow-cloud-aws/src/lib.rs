//! Amazon Managed Service for Prometheus provider for AmpFlow
//!
//! Implements [`ResourceLifecycle`](ampflow_cloud::ResourceLifecycle) for
//! `aws_prometheus_workspace`, so the [`Reconciler`](ampflow_cloud::Reconciler)
//! can create, read, update, delete and import workspaces.
//!
//! # Features
//!
//! - `sdk`: [`AwsPrometheusClient`], a [`PrometheusApi`] backed by `aws-sdk-amp`
//! - `test-utils`: [`InMemoryPrometheus`], an in-process service with
//!   injectable delays and failures
//!
//! # Example
//!
//! ```ignore
//! use ampflow_cloud::{GlobalState, Reconciler, ResourceConfig};
//! use ampflow_cloud_aws::{AwsPrometheusClient, ProviderConfig, WorkspaceResource};
//! use std::sync::Arc;
//!
//! let config = ProviderConfig::from_env()?;
//! let client = AwsPrometheusClient::from_config(&config).await;
//! let reconciler = Reconciler::new(Arc::new(WorkspaceResource::new(Arc::new(client), config)));
//!
//! let mut state = GlobalState::new();
//! let desired = ResourceConfig::new(
//!     "aws_prometheus_workspace",
//!     serde_json::json!({ "alias": "metrics" }),
//! );
//! reconciler.apply(&mut state, "aws_prometheus_workspace.main", Some(&desired)).await?;
//! ```

pub mod client;
pub mod config;
pub mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
#[cfg(feature = "sdk")]
pub mod sdk;
pub mod workspace;

pub use client::{
    CreateWorkspaceRequest, CreatedWorkspace, PrometheusApi, Workspace, WorkspaceStatusCode,
    WorkspaceSummary,
};
pub use config::ProviderConfig;
pub use error::{AmpError, Result};
#[cfg(any(test, feature = "test-utils"))]
pub use memory::InMemoryPrometheus;
#[cfg(feature = "sdk")]
pub use sdk::AwsPrometheusClient;
pub use workspace::{RESOURCE_TYPE, WorkspaceResource, phase_of, workspace_schema};
