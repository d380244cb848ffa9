use ampflow_cloud::{
    ApplyResult, GlobalState, Plan, ReadOutcome, Reconciler, ResourceConfig, ResourceLifecycle,
    ResourceRecord, StateManager,
};
use ampflow_cloud_aws::{InMemoryPrometheus, ProviderConfig, RESOURCE_TYPE, WorkspaceResource};
use anyhow::{Context, bail, ensure};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;

pub const ADDRESS: &str = "aws_prometheus_workspace.test";

pub type Resource = WorkspaceResource<InMemoryPrometheus>;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn desired(config: Value) -> ResourceConfig {
    ResourceConfig::new(RESOURCE_TYPE, config)
}

/// One tracked workspace address against an in-memory service
pub struct TestWorkspace {
    pub api: Arc<InMemoryPrometheus>,
    pub reconciler: Reconciler<Resource>,
    pub state: GlobalState,
    pub root: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self::with_api(InMemoryPrometheus::default())
    }

    pub fn with_api(api: InMemoryPrometheus) -> Self {
        Self::with_config(api, ProviderConfig::default())
    }

    pub fn with_config(api: InMemoryPrometheus, config: ProviderConfig) -> Self {
        init_tracing();
        let api = Arc::new(api);
        let resource = WorkspaceResource::new(Arc::clone(&api), config);
        Self {
            api,
            reconciler: Reconciler::new(Arc::new(resource)),
            state: GlobalState::new(),
            root: tempfile::tempdir().unwrap(),
        }
    }

    pub fn resource(&self) -> &Resource {
        self.reconciler.resource()
    }

    pub fn state_manager(&self) -> StateManager {
        StateManager::new(self.root.path())
    }

    pub async fn apply(&mut self, config: Value) -> anyhow::Result<ApplyResult> {
        let desired = desired(config);
        Ok(self
            .reconciler
            .apply(&mut self.state, ADDRESS, Some(&desired))
            .await?)
    }

    pub async fn plan(&mut self, config: Value) -> anyhow::Result<Plan> {
        let desired = desired(config);
        Ok(self
            .reconciler
            .plan(&mut self.state, ADDRESS, Some(&desired))
            .await?)
    }

    pub async fn destroy(&mut self) -> anyhow::Result<ApplyResult> {
        Ok(self.reconciler.destroy(&mut self.state, ADDRESS).await?)
    }

    pub fn record(&self) -> Option<&ResourceRecord> {
        self.state.get_resource(ADDRESS)
    }

    pub fn id(&self) -> anyhow::Result<String> {
        Ok(self.record().context("workspace is not tracked")?.id.clone())
    }

    /// The tracked workspace exists remotely
    pub async fn check_exists(&self) -> anyhow::Result<ResourceRecord> {
        let id = self.id()?;
        match self.resource().read(&id).await? {
            ReadOutcome::Found(record) => Ok(record),
            ReadOutcome::NotFound => bail!("workspace {} does not exist", id),
        }
    }

    /// The tracked record carries `name` = `expected`
    pub fn check_attr(&self, name: &str, expected: &str) -> anyhow::Result<()> {
        let record = self.record().context("workspace is not tracked")?;
        let actual: Option<String> = record.get_attribute(name);
        ensure!(
            actual.as_deref() == Some(expected),
            "{}: expected {:?}, got {:?}",
            name,
            expected,
            actual
        );
        Ok(())
    }

    /// The tracked record carries a non-empty `name`
    pub fn check_attr_set(&self, name: &str) -> anyhow::Result<String> {
        let record = self.record().context("workspace is not tracked")?;
        match record.get_attribute::<String>(name) {
            Some(value) if !value.is_empty() => Ok(value),
            other => bail!("{}: expected a value, got {:?}", name, other),
        }
    }

    /// Importing the tracked ID into a fresh state yields the same attributes
    pub async fn import_verify(&self) -> anyhow::Result<()> {
        let tracked = self.record().context("workspace is not tracked")?;
        let mut fresh = GlobalState::new();
        let imported = self
            .reconciler
            .import(&mut fresh, ADDRESS, &tracked.id)
            .await?;
        ensure!(
            imported.user_visible() == tracked.user_visible(),
            "import differs: {:?} vs {:?}",
            imported.user_visible(),
            tracked.user_visible()
        );
        Ok(())
    }

    /// `id` is gone remotely and nothing is tracked
    pub async fn check_destroy(&self, id: &str) -> anyhow::Result<()> {
        ensure!(self.record().is_none(), "{} is still tracked", ADDRESS);
        ensure!(
            self.resource().read(id).await?.is_not_found(),
            "workspace {} still exists",
            id
        );
        Ok(())
    }

    /// Delete the tracked workspace behind the reconciler's back
    pub fn disappear(&self) -> anyhow::Result<()> {
        let id = self.id()?;
        ensure!(self.api.remove_out_of_band(&id), "workspace {} was not there", id);
        Ok(())
    }
}
