//! Tracked state for managed resources
//!
//! Manages the `.ampflow/state.json` file which records the last observed
//! state of every resource the reconciler owns, keyed by resource address
//! (e.g. `aws_prometheus_workspace.test`).

use crate::error::{CloudError, Result};
use crate::lifecycle::LifecyclePhase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".ampflow";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const STATE_TMP: &str = "state.json.tmp";
const LOCK_FILE: &str = "lock.json";

/// Every tracked record, keyed by resource address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalState {
    pub version: u32,

    /// Incremented on every change to `resources`
    #[serde(default)]
    pub serial: u64,

    pub updated_at: DateTime<Utc>,

    pub resources: BTreeMap<String, ResourceRecord>,
}

impl Default for GlobalState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            serial: 0,
            updated_at: Utc::now(),
            resources: BTreeMap::new(),
        }
    }
}

impl GlobalState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_resource(&self, address: &str) -> Option<&ResourceRecord> {
        self.resources.get(address)
    }

    /// Track `record` under `address`, replacing any previous record
    pub fn set_resource(&mut self, address: impl Into<String>, record: ResourceRecord) {
        self.resources.insert(address.into(), record);
        self.touch();
    }

    pub fn remove_resource(&mut self, address: &str) -> Option<ResourceRecord> {
        let removed = self.resources.remove(address);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    fn touch(&mut self) {
        self.serial += 1;
        self.updated_at = Utc::now();
    }
}

/// Last known state of a single resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Identifier assigned by the remote system
    pub id: String,

    /// Resource type
    pub resource_type: String,

    /// Lifecycle phase
    pub phase: LifecyclePhase,

    /// Resource attributes, both configured and computed
    pub attributes: HashMap<String, serde_json::Value>,

    /// When the record was first created
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl ResourceRecord {
    pub fn new(id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            resource_type: resource_type.into(),
            phase: LifecyclePhase::Absent,
            attributes: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_phase(mut self, phase: LifecyclePhase) -> Self {
        self.phase = phase;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn get_attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow
    pub fn transition(&mut self, next: LifecyclePhase) -> Result<()> {
        if !self.phase.can_transition_to(next) {
            return Err(CloudError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        tracing::debug!(resource_id = %self.id, from = %self.phase, to = %next, "phase transition");
        self.phase = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Attributes a user can observe, without bookkeeping timestamps
    pub fn user_visible(&self) -> HashMap<String, serde_json::Value> {
        let mut attrs = self.attributes.clone();
        attrs.insert("id".to_string(), serde_json::json!(self.id));
        attrs
    }
}

/// Reads and writes `.ampflow/state.json` under a project root
///
/// Saves go through a temporary file and a rename, so a crash mid-write
/// leaves either the old or the new state. The previous state is kept as
/// `state.json.backup`.
pub struct StateManager {
    dir: PathBuf,
    stale_after: Duration,
}

impl StateManager {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            dir: project_root.as_ref().join(STATE_DIR),
            stale_after: Duration::from_secs(60 * 60),
        }
    }

    /// Age after which someone else's lock may be taken over
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    pub async fn load(&self) -> Result<GlobalState> {
        let path = self.state_path();
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no state file yet");
                return Ok(GlobalState::new());
            }
            Err(e) => return Err(e.into()),
        };

        let state: GlobalState = serde_json::from_str(&content)?;
        if state.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "{} has version {}, this build understands up to {}",
                path.display(),
                state.version,
                STATE_VERSION
            )));
        }

        tracing::debug!(serial = state.serial, resources = state.resources.len(), "loaded state");
        Ok(state)
    }

    pub async fn save(&self, state: &GlobalState) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;

        let path = self.state_path();
        let tmp = self.dir.join(STATE_TMP);
        fs::write(&tmp, serde_json::to_vec_pretty(state)?).await?;

        if fs::try_exists(&path).await? {
            fs::copy(&path, self.dir.join(STATE_BACKUP)).await?;
        }
        fs::rename(&tmp, &path).await?;

        tracing::debug!(serial = state.serial, resources = state.resources.len(), "saved state");
        Ok(())
    }

    /// Take the state lock
    ///
    /// Fails with [`CloudError::LockError`] while another holder's lock is
    /// younger than the stale threshold.
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        fs::create_dir_all(&self.dir).await?;
        let lock_path = self.dir.join(LOCK_FILE);

        let info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };
        let content = serde_json::to_vec_pretty(&info)?;

        for _ in 0..2 {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
                .await
            {
                Ok(mut file) => {
                    file.write_all(&content).await?;
                    file.flush().await?;
                    tracing::debug!(path = %lock_path.display(), "acquired state lock");
                    return Ok(StateLock {
                        lock_path,
                        released: false,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    let held: LockInfo = serde_json::from_str(&fs::read_to_string(&lock_path).await?)?;
                    let age = (Utc::now() - held.acquired_at).to_std().unwrap_or_default();
                    if age < self.stale_after {
                        return Err(CloudError::LockError(format!(
                            "state is locked by {} (pid {}) since {}",
                            held.holder, held.pid, held.acquired_at
                        )));
                    }
                    tracing::warn!(holder = %held.holder, pid = held.pid, "taking over stale state lock");
                    fs::remove_file(&lock_path).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(CloudError::LockError(format!(
            "{} was re-created while taking over a stale lock",
            lock_path.display()
        )))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// Held state lock; removed on [`StateLock::release`] or drop
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        match fs::remove_file(&self.lock_path).await {
            Ok(()) => {
                tracing::debug!("released state lock");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}
