//! State management for managed resources
//!
//! Manages the `.hwcflow/state.json` file which records the ID and last
//! known attributes of every resource applied from a manifest.

use crate::error::{CloudError, Result};
use crate::resource::{ResourceData, ResourceTimeouts};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".hwcflow";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const STATE_TMP: &str = "state.json.tmp";
const LOCK_FILE: &str = "lock.json";
const STALE_LOCK_HOURS: i64 = 1;

/// Global state containing all managed resources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalState {
    /// State file version
    pub version: u32,

    /// Incremented on every save
    #[serde(default)]
    pub serial: u64,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Resources indexed by address (`type.name`)
    pub resources: BTreeMap<String, ResourceState>,
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

    /// Resources of a specific type
    pub fn resources_of_type(&self, resource_type: &str) -> Vec<(&String, &ResourceState)> {
        self.resources
            .iter()
            .filter(|(_, r)| r.resource_type == resource_type)
            .collect()
    }

    /// Add or update a resource
    pub fn set_resource(&mut self, address: String, state: ResourceState) {
        self.resources.insert(address, state);
        self.updated_at = Utc::now();
    }

    /// Remove a resource
    pub fn remove_resource(&mut self, address: &str) -> Option<ResourceState> {
        let result = self.resources.remove(address);
        if result.is_some() {
            self.updated_at = Utc::now();
        }
        result
    }

    pub fn get_resource(&self, address: &str) -> Option<&ResourceState> {
        self.resources.get(address)
    }
}

/// State of a single resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceState {
    /// Remote resource ID
    pub id: String,

    /// Resource type (e.g. `huaweicloud_drs_job`)
    pub resource_type: String,

    #[serde(default)]
    pub status: ResourceStatus,

    /// Attributes as last written by create/read/update
    pub attributes: Map<String, Value>,

    /// Timeouts the resource was applied with
    #[serde(default)]
    pub timeouts: ResourceTimeouts,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl ResourceState {
    pub fn new(id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            resource_type: resource_type.into(),
            status: ResourceStatus::Ready,
            attributes: Map::new(),
            timeouts: ResourceTimeouts::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// State captured from resource data after an operation
    pub fn from_data(resource_type: impl Into<String>, data: &ResourceData) -> Self {
        let mut state =
            Self::new(data.id(), resource_type).with_attributes(data.attributes().clone());
        state.timeouts = data.timeouts().clone();
        state
    }

    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_attributes(mut self, attributes: Map<String, Value>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Replace the attributes, keeping the creation timestamp
    pub fn refresh(&mut self, data: &ResourceData) {
        self.id = data.id().to_string();
        self.attributes = data.attributes().clone();
        self.timeouts = data.timeouts().clone();
        self.updated_at = Utc::now();
    }

    /// Resource data seeded from this state
    pub fn to_data(&self) -> ResourceData {
        ResourceData::from_state(&self.id, self.attributes.clone()).with_timeouts(self.timeouts.clone())
    }

    pub fn get_attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Status of a resource in state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Created and in sync with the last apply
    #[default]
    Ready,
    /// Created remotely, but the create operation failed afterwards
    Tainted,
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceStatus::Ready => write!(f, "ready"),
            ResourceStatus::Tainted => write!(f, "tainted"),
        }
    }
}

/// Reads and writes `.hwcflow/` under a project root
pub struct StateManager {
    dir: PathBuf,
}

impl StateManager {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            dir: project_root.as_ref().join(STATE_DIR),
        }
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    /// The state file, or an empty state when none was saved yet
    pub async fn load(&self) -> Result<GlobalState> {
        let content = match fs::read_to_string(self.state_path()).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("No state file yet, starting empty");
                return Ok(GlobalState::new());
            }
            Err(e) => return Err(e.into()),
        };

        let state: GlobalState = serde_json::from_str(&content)?;
        if state.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "state version {} is newer than the supported version {}",
                state.version, STATE_VERSION
            )));
        }
        tracing::debug!(serial = state.serial, resources = state.resources.len(), "Loaded state");
        Ok(state)
    }

    /// Bump the serial and write the state through a temporary file,
    /// keeping the previous file as `state.json.backup`
    pub async fn save(&self, state: &mut GlobalState) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;
        state.serial += 1;
        state.updated_at = Utc::now();

        let tmp = self.dir.join(STATE_TMP);
        fs::write(&tmp, serde_json::to_vec_pretty(state)?).await?;

        let path = self.state_path();
        if fs::try_exists(&path).await? {
            fs::copy(&path, self.dir.join(STATE_BACKUP)).await?;
        }
        fs::rename(&tmp, &path).await?;

        tracing::debug!(serial = state.serial, resources = state.resources.len(), "Saved state");
        Ok(())
    }

    /// Take the exclusive state lock; a lock older than an hour is replaced
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
        let content = serde_json::to_vec(&info)?;

        for _ in 0..2 {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
                .await
            {
                Ok(mut file) => {
                    file.write_all(&content).await?;
                    tracing::debug!(pid = info.pid, "Acquired state lock");
                    return Ok(StateLock {
                        lock_path,
                        released: false,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    let held: LockInfo = serde_json::from_slice(&fs::read(&lock_path).await?)?;
                    let age = Utc::now().signed_duration_since(held.acquired_at);
                    if age < chrono::Duration::hours(STALE_LOCK_HOURS) {
                        return Err(CloudError::LockError(format!(
                            "state is locked by {} (pid {}) since {}",
                            held.holder, held.pid, held.acquired_at
                        )));
                    }
                    tracing::warn!(holder = %held.holder, pid = held.pid, "Replacing stale state lock");
                    fs::remove_file(&lock_path).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(CloudError::LockError(
            "state lock was taken while replacing a stale one".to_string(),
        ))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    #[serde(default)]
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// Held state lock, removed on release or drop
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        match fs::remove_file(&self.lock_path).await {
            Ok(()) => {
                tracing::debug!("Released state lock");
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
