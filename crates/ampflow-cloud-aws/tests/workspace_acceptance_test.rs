mod common;

use ampflow_cloud::{ActionType, ErrorKind, LifecyclePhase, Reconciler, StateManager};
use ampflow_cloud_aws::{
    InMemoryPrometheus, PrometheusApi, ProviderConfig, WorkspaceResource, WorkspaceStatusCode,
};
use common::{ADDRESS, TestWorkspace, desired};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const ALIAS: &str = "tf_amp_workspace_12345";

fn cloud_kind(err: &anyhow::Error) -> Option<ErrorKind> {
    err.downcast_ref::<ampflow_cloud::CloudError>().map(|e| e.kind())
}

/// Create with alias, clear it, restore it, import, destroy
#[tokio::test(start_paused = true)]
async fn test_workspace_basic() -> anyhow::Result<()> {
    let mut ws = TestWorkspace::with_api(
        InMemoryPrometheus::default()
            .with_creation_polls(3)
            .with_update_polls(2)
            .with_deletion_polls(2),
    );

    ws.apply(json!({ "alias": ALIAS })).await?;
    ws.check_exists().await?;
    ws.check_attr("alias", ALIAS)?;
    ws.check_attr("status", "ACTIVE")?;
    let arn = ws.check_attr_set("arn")?;
    assert!(arn.starts_with("arn:aws:aps:us-east-1:"), "{}", arn);
    assert!(arn.contains(":workspace/ws-"), "{}", arn);
    ws.check_attr_set("prometheus_endpoint")?;
    ws.check_attr_set("created_at")?;
    let id = ws.id()?;

    ws.apply(json!({})).await?;
    ws.check_exists().await?;
    ws.check_attr("alias", "")?;
    assert_eq!(ws.id()?, id);

    ws.apply(json!({ "alias": ALIAS })).await?;
    ws.check_attr("alias", ALIAS)?;
    assert_eq!(ws.id()?, id);

    ws.import_verify().await?;

    ws.destroy().await?;
    ws.check_destroy(&id).await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_workspace_disappears() -> anyhow::Result<()> {
    let mut ws = TestWorkspace::new();
    ws.apply(json!({ "alias": ALIAS })).await?;
    ws.disappear()?;

    let plan = ws.plan(json!({ "alias": ALIAS })).await?;
    assert!(plan.has_changes);
    assert_eq!(plan.actions[0].action_type, ActionType::Create);
    assert!(ws.record().is_none());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_alias_drift_is_planned_as_update() -> anyhow::Result<()> {
    let mut ws = TestWorkspace::new();
    ws.apply(json!({ "alias": ALIAS })).await?;
    ws.api.set_alias_out_of_band(&ws.id()?, Some("drifted"));

    let plan = ws.plan(json!({ "alias": ALIAS })).await?;
    assert_eq!(plan.actions[0].action_type, ActionType::Update);

    ws.apply(json!({ "alias": ALIAS })).await?;
    ws.check_attr("alias", ALIAS)?;
    assert!(!ws.plan(json!({ "alias": ALIAS })).await?.has_changes);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_destroy_twice_is_idempotent() -> anyhow::Result<()> {
    let mut ws = TestWorkspace::with_api(InMemoryPrometheus::default().with_deletion_polls(1));
    ws.apply(json!({})).await?;
    let id = ws.id()?;

    let first = ws.destroy().await?;
    assert_eq!(first.succeeded.len(), 1);
    let second = ws.destroy().await?;
    assert!(second.succeeded.is_empty());
    ws.check_destroy(&id).await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_delete_of_missing_workspace_is_already_absent() -> anyhow::Result<()> {
    let mut ws = TestWorkspace::new();
    ws.apply(json!({})).await?;
    let id = ws.id()?;
    ws.disappear()?;

    // Stale state: delete without refreshing first
    let outcome = ampflow_cloud::ResourceLifecycle::delete(ws.resource(), &id).await?;
    assert_eq!(outcome, ampflow_cloud::DeleteOutcome::AlreadyAbsent);
    ws.reconciler.verify_destroyed(&id).await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_destroy_after_delete_timeout_finishes_the_delete() -> anyhow::Result<()> {
    let config = ProviderConfig {
        delete_timeout: Duration::from_secs(10),
        ..ProviderConfig::default()
    };
    let mut ws = TestWorkspace::with_config(InMemoryPrometheus::default().with_deletion_polls(8), config);
    ws.apply(json!({ "alias": ALIAS })).await?;
    let id = ws.id()?;

    let err = ws.destroy().await.unwrap_err();
    assert_eq!(cloud_kind(&err), Some(ErrorKind::Timeout));
    assert_eq!(ws.record().map(|r| r.phase), Some(LifecyclePhase::Active));
    assert_eq!(ws.api.status_of(&id), Some(WorkspaceStatusCode::Deleting));

    // The retry waits for the delete already in progress
    let result = ws.destroy().await?;
    assert_eq!(result.succeeded.len(), 1);
    ws.check_destroy(&id).await?;
    assert_eq!(ws.api.calls("DeleteWorkspace"), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_apply_and_destroy_wait_for_updating_workspace() -> anyhow::Result<()> {
    let mut ws = TestWorkspace::with_api(InMemoryPrometheus::default().with_update_polls(3));
    ws.apply(json!({ "alias": "a" })).await?;
    let id = ws.id()?;

    ws.api.update_workspace_alias(&id, Some("x")).await?;
    ws.apply(json!({ "alias": "b" })).await?;
    ws.check_attr("alias", "b")?;
    assert_eq!(ws.id()?, id);
    assert_eq!(ws.record().map(|r| r.phase), Some(LifecyclePhase::Active));

    ws.api.update_workspace_alias(&id, Some("y")).await?;
    ws.destroy().await?;
    ws.check_destroy(&id).await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_creation_failure_tracks_nothing() {
    let api = InMemoryPrometheus::default().with_creation_polls(2);
    api.fail_next_creation();
    let mut ws = TestWorkspace::with_api(api);

    let err = ws.apply(json!({ "alias": ALIAS })).await.unwrap_err();
    assert_eq!(cloud_kind(&err), Some(ErrorKind::Provisioning));
    assert!(ws.record().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_creation_timeout() {
    let config = ProviderConfig {
        create_timeout: Duration::from_secs(30),
        ..ProviderConfig::default()
    };
    let mut ws = TestWorkspace::with_config(
        InMemoryPrometheus::default().with_creation_polls(u32::MAX),
        config,
    );

    let started = tokio::time::Instant::now();
    let err = ws.apply(json!({})).await.unwrap_err();
    assert_eq!(cloud_kind(&err), Some(ErrorKind::Timeout));
    assert!(started.elapsed() <= Duration::from_secs(31));
    assert!(ws.record().is_none());
    // Nothing is rolled back
    assert_eq!(ws.api.workspace_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_empty_describe_is_invariant_violation() -> anyhow::Result<()> {
    let mut ws = TestWorkspace::new();
    ws.apply(json!({})).await?;

    ws.api.empty_describe_next(1);
    let err = ws.plan(json!({})).await.unwrap_err();
    assert_eq!(cloud_kind(&err), Some(ErrorKind::InvariantViolation));
    assert!(ws.record().is_some());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_throttled_calls_are_retried() -> anyhow::Result<()> {
    let api = InMemoryPrometheus::default();
    api.throttle_next(2);
    let mut ws = TestWorkspace::with_api(api);

    ws.apply(json!({ "alias": ALIAS })).await?;
    ws.check_exists().await?;
    assert_eq!(ws.api.workspace_count(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_persistent_throttling_gives_up() {
    let api = InMemoryPrometheus::default();
    api.throttle_next(10);
    let mut ws = TestWorkspace::with_api(api);

    let err = ws.apply(json!({})).await.unwrap_err();
    assert_eq!(cloud_kind(&err), Some(ErrorKind::Transient));
    assert_eq!(ws.api.calls("CreateWorkspace"), 3);
    assert!(ws.record().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_kms_key_change_replaces() -> anyhow::Result<()> {
    let key_a = "arn:aws:kms:us-east-1:123456789012:key/aaaa";
    let key_b = "arn:aws:kms:us-east-1:123456789012:key/bbbb";
    let mut ws = TestWorkspace::new();
    ws.apply(json!({ "alias": ALIAS, "kms_key_arn": key_a })).await?;
    let old_id = ws.id()?;

    let plan = ws.plan(json!({ "alias": ALIAS, "kms_key_arn": key_b })).await?;
    assert_eq!(plan.actions[0].action_type, ActionType::Replace);
    assert!(plan.actions[0].description.contains("kms_key_arn"));

    ws.apply(json!({ "alias": ALIAS, "kms_key_arn": key_b })).await?;
    assert_ne!(ws.id()?, old_id);
    ws.check_attr("kms_key_arn", key_b)?;
    assert_eq!(ws.api.status_of(&old_id), None);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_invalid_alias_is_rejected_before_any_call() {
    let mut ws = TestWorkspace::new();
    let err = ws.apply(json!({ "alias": "x".repeat(101) })).await.unwrap_err();
    assert_eq!(cloud_kind(&err), Some(ErrorKind::Validation));
    assert_eq!(ws.api.calls("CreateWorkspace"), 0);

    let err = ws.apply(json!({ "arn": "arn:aws:aps:::workspace/x" })).await.unwrap_err();
    assert_eq!(cloud_kind(&err), Some(ErrorKind::Validation));
}

#[tokio::test(start_paused = true)]
async fn test_tags_are_updated_in_place() -> anyhow::Result<()> {
    let mut ws = TestWorkspace::new();
    ws.apply(json!({ "tags": { "env": "test" } })).await?;
    let id = ws.id()?;

    let plan = ws.plan(json!({ "tags": { "env": "prod", "team": "obs" } })).await?;
    assert_eq!(plan.actions[0].action_type, ActionType::Update);
    ws.apply(json!({ "tags": { "env": "prod", "team": "obs" } })).await?;

    assert_eq!(ws.id()?, id);
    let remote = ws.check_exists().await?;
    let tags: std::collections::HashMap<String, String> = remote.get_attribute("tags").unwrap();
    assert_eq!(tags.len(), 2);
    assert_eq!(tags["env"], "prod");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_workspaces_are_independent() -> anyhow::Result<()> {
    let api = Arc::new(InMemoryPrometheus::default().with_creation_polls(2));
    let resource = WorkspaceResource::new(Arc::clone(&api), ProviderConfig::default());
    let reconciler = Reconciler::new(Arc::new(resource));

    let mut handles = Vec::new();
    for i in 0..3 {
        let reconciler = reconciler.clone();
        handles.push(tokio::spawn(async move {
            let mut state = ampflow_cloud::GlobalState::new();
            let desired = desired(json!({ "alias": format!("{}_{}", ALIAS, i) }));
            reconciler.apply(&mut state, ADDRESS, Some(&desired)).await?;
            anyhow::Ok(state)
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        let state = handle.await??;
        ids.push(state.get_resource(ADDRESS).unwrap().id.clone());
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3);
    assert_eq!(api.workspace_count(), 3);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_discovered_workspace_can_be_imported() -> anyhow::Result<()> {
    let mut ws = TestWorkspace::new();
    ws.apply(json!({ "alias": ALIAS })).await?;
    let id = ws.id()?;

    let found = ws.resource().discover(Some("tf_amp")).await?;
    assert_eq!(found, vec![id.clone()]);

    let mut fresh = ampflow_cloud::GlobalState::new();
    let imported = ws.reconciler.import(&mut fresh, ADDRESS, &found[0]).await?;
    assert_eq!(imported.id, id);

    // The address is already tracked in the original state
    let err = ws.reconciler.import(&mut ws.state, ADDRESS, &id).await.unwrap_err();
    assert!(matches!(err, ampflow_cloud::CloudError::ResourceAlreadyExists(_)));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_state_survives_restart() -> anyhow::Result<()> {
    let mut ws = TestWorkspace::new();
    let manager: StateManager = ws.state_manager();

    let lock = manager.acquire_lock().await?;
    ws.state = manager.load().await?;
    ws.apply(json!({ "alias": ALIAS })).await?;
    manager.save(&ws.state).await?;
    lock.release().await?;

    let reloaded = ws.state_manager().load().await?;
    assert_eq!(reloaded.get_resource(ADDRESS), ws.record());

    ws.state = reloaded;
    assert!(!ws.plan(json!({ "alias": ALIAS })).await?.has_changes);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_workspace_status_is_reported() -> anyhow::Result<()> {
    let mut ws = TestWorkspace::new();
    ws.apply(json!({})).await?;
    assert_eq!(ws.api.status_of(&ws.id()?), Some(WorkspaceStatusCode::Active));
    Ok(())
}
