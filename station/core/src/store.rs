//! Per-user session records and the stores that hold them.
//!
//! A store keeps whole [`SessionRecord`]s keyed by user id. Every mutation
//! goes through [`SessionStore::apply`] with a typed [`SessionUpdate`], and the
//! backend applies it as one read-modify-write of the full record under its
//! write lock. Sibling maps (consoles, antennas) therefore never overwrite
//! each other.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use station_spec::{
    AntennaConfig, AntennaId, ConsoleConfig, ConsoleId, DeviceIps, SchemeId, Timestamp,
};

/// Opaque user identifier.
pub type UserId = String;

/// Current wall-clock time in unix epoch millis.
pub fn now_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Timestamp)
        .unwrap_or_default()
}

/// Stored progress of one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionRecord {
    /// Owner of the session.
    pub user_id: UserId,
    /// Selected frequency band.
    pub selected_band: Option<String>,
    /// Selected network topology.
    pub selected_topology: Option<String>,
    /// Console configurations keyed by console id.
    #[serde(default)]
    pub console_configs: BTreeMap<ConsoleId, ConsoleConfig>,
    /// Antenna configurations keyed by antenna id.
    #[serde(default)]
    pub antenna_configs: BTreeMap<AntennaId, AntennaConfig>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last write time.
    pub updated_at: Timestamp,
    /// Incremented on every write.
    pub version: u64,
}

impl SessionRecord {
    /// Empty session created at `now`.
    pub fn new(user_id: impl Into<UserId>, now: Timestamp) -> Self {
        Self {
            user_id: user_id.into(),
            selected_band: None,
            selected_topology: None,
            console_configs: BTreeMap::new(),
            antenna_configs: BTreeMap::new(),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Whether both band and topology have been recorded.
    pub fn mode_selected(&self) -> bool {
        self.selected_band.is_some() && self.selected_topology.is_some()
    }

    /// Stored config of `console_id`.
    pub fn console_config(&self, console_id: &str) -> Option<&ConsoleConfig> {
        self.console_configs.get(console_id)
    }

    /// Stored config of `antenna_id`.
    pub fn antenna_config(&self, antenna_id: &str) -> Option<&AntennaConfig> {
        self.antenna_configs.get(antenna_id)
    }

    /// Apply `update` in place and stamp the write.
    pub fn apply(&mut self, update: SessionUpdate, now: Timestamp) {
        match update {
            SessionUpdate::Field(SessionField::Band(band)) => self.selected_band = Some(band),
            SessionUpdate::Field(SessionField::Topology(topology)) => {
                self.selected_topology = Some(topology)
            }
            SessionUpdate::Mode { band, topology } => {
                self.selected_band = Some(band);
                self.selected_topology = Some(topology);
            }
            SessionUpdate::ConsoleConfig { console_id, config } => {
                self.console_configs.insert(console_id, config);
            }
            SessionUpdate::AntennaConfig { antenna_id, config } => {
                self.antenna_configs.insert(antenna_id, config);
            }
        }
        self.updated_at = now.max(self.updated_at);
        self.version += 1;
    }
}

/// Scalar session fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum SessionField {
    /// Selected band.
    Band(String),
    /// Selected topology.
    Topology(String),
}

/// Closed set of writes a workflow step may perform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionUpdate {
    /// Set a scalar field.
    Field(SessionField),
    /// Record band and topology together.
    Mode {
        /// Selected band.
        band: String,
        /// Selected topology.
        topology: String,
    },
    /// Replace one console's config.
    ConsoleConfig {
        /// Console being configured.
        console_id: ConsoleId,
        /// Full replacement config.
        config: ConsoleConfig,
    },
    /// Replace one antenna's config.
    AntennaConfig {
        /// Antenna being configured.
        antenna_id: AntennaId,
        /// Full replacement config.
        config: AntennaConfig,
    },
}

/// Store failures. Not recoverable by the user.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Update addressed a session that does not exist.
    #[error("session record for {0:?} is missing")]
    MissingRecord(UserId),
    /// Storage or I/O failure.
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Session record persistence consumed by the workflow.
pub trait SessionStore: Send + Sync {
    /// Create an empty session; returns `false` if one already existed.
    fn create_session(&self, user_id: &str) -> Result<bool, StoreError>;
    /// Fetch a session.
    fn get_session(&self, user_id: &str) -> Result<Option<SessionRecord>, StoreError>;
    /// Atomically apply an update to an existing session and return the new record.
    fn apply(&self, user_id: &str, update: SessionUpdate) -> Result<SessionRecord, StoreError>;
    /// Number of stored sessions, for health reporting.
    fn session_count(&self) -> Result<usize, StoreError>;

    /// Set a scalar field.
    fn set_session_field(
        &self,
        user_id: &str,
        field: SessionField,
    ) -> Result<SessionRecord, StoreError> {
        self.apply(user_id, SessionUpdate::Field(field))
    }

    /// Replace one entry of the console map.
    fn merge_console_config(
        &self,
        user_id: &str,
        console_id: &str,
        config: ConsoleConfig,
    ) -> Result<SessionRecord, StoreError> {
        self.apply(
            user_id,
            SessionUpdate::ConsoleConfig {
                console_id: console_id.to_string(),
                config,
            },
        )
    }

    /// Replace one entry of the antenna map.
    fn merge_antenna_config(
        &self,
        user_id: &str,
        antenna_id: &str,
        config: AntennaConfig,
    ) -> Result<SessionRecord, StoreError> {
        self.apply(
            user_id,
            SessionUpdate::AntennaConfig {
                antenna_id: antenna_id.to_string(),
                config,
            },
        )
    }
}

/// Addressing saved for one scheme device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SavedDeviceConfig {
    /// Device on the scheme.
    pub device_id: String,
    /// Scheme holding the device.
    pub scheme_id: SchemeId,
    /// Saved addressing.
    pub ips: DeviceIps,
    /// Last save time.
    pub saved_at: Timestamp,
}

/// Persistence of scheme device configs, one per `(scheme, device)`.
pub trait DeviceConfigStore: Send + Sync {
    /// Replace the config of a device and return what was stored.
    fn save_device_config(
        &self,
        scheme_id: &str,
        device_id: &str,
        ips: DeviceIps,
    ) -> Result<SavedDeviceConfig, StoreError>;
    /// Fetch the config of a device.
    fn device_config(
        &self,
        scheme_id: &str,
        device_id: &str,
    ) -> Result<Option<SavedDeviceConfig>, StoreError>;
}

fn saved_config(scheme_id: &str, device_id: &str, ips: DeviceIps) -> SavedDeviceConfig {
    SavedDeviceConfig {
        device_id: device_id.to_string(),
        scheme_id: scheme_id.to_string(),
        ips: ips.with_default_dns(),
        saved_at: now_millis(),
    }
}

/// In-memory session store.
#[derive(Debug, Default, Clone)]
pub struct MemorySessionStore {
    sessions: Arc<RwLock<HashMap<UserId, SessionRecord>>>,
    devices: Arc<RwLock<HashMap<(SchemeId, String), SavedDeviceConfig>>>,
}

impl MemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn create_session(&self, user_id: &str) -> Result<bool, StoreError> {
        let mut sessions = self.sessions.write();
        if sessions.contains_key(user_id) {
            return Ok(false);
        }
        sessions.insert(user_id.to_string(), SessionRecord::new(user_id, now_millis()));
        Ok(true)
    }

    fn get_session(&self, user_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.sessions.read().get(user_id).cloned())
    }

    fn apply(&self, user_id: &str, update: SessionUpdate) -> Result<SessionRecord, StoreError> {
        let mut sessions = self.sessions.write();
        let record = sessions
            .get_mut(user_id)
            .ok_or_else(|| StoreError::MissingRecord(user_id.to_string()))?;
        record.apply(update, now_millis());
        Ok(record.clone())
    }

    fn session_count(&self) -> Result<usize, StoreError> {
        Ok(self.sessions.read().len())
    }
}

impl DeviceConfigStore for MemorySessionStore {
    fn save_device_config(
        &self,
        scheme_id: &str,
        device_id: &str,
        ips: DeviceIps,
    ) -> Result<SavedDeviceConfig, StoreError> {
        let saved = saved_config(scheme_id, device_id, ips);
        self.devices
            .write()
            .insert((scheme_id.to_string(), device_id.to_string()), saved.clone());
        Ok(saved)
    }

    fn device_config(
        &self,
        scheme_id: &str,
        device_id: &str,
    ) -> Result<Option<SavedDeviceConfig>, StoreError> {
        Ok(self
            .devices
            .read()
            .get(&(scheme_id.to_string(), device_id.to_string()))
            .cloned())
    }
}

/// Disk-backed session store: one JSON document per user.
///
/// File names are the blake3 digest of the user id, so arbitrary ids map to
/// safe paths. Writes go to a temp file and are renamed into place.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

const RECORD_EXTENSION: &str = "json";
const DEVICE_DIR: &str = "devices";

impl FileSessionStore {
    /// Open (or create) a store rooted at `dir`.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create session directory {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Directory holding the records.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, user_id: &str) -> PathBuf {
        let digest = blake3::hash(user_id.as_bytes());
        self.dir
            .join(format!("{}.{RECORD_EXTENSION}", digest.to_hex()))
    }

    fn device_path(&self, scheme_id: &str, device_id: &str) -> PathBuf {
        let digest = blake3::hash(format!("{scheme_id}\0{device_id}").as_bytes());
        self.dir
            .join(DEVICE_DIR)
            .join(format!("{}.{RECORD_EXTENSION}", digest.to_hex()))
    }

    fn read_record(&self, user_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let path = self.record_path(user_id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(anyhow::Error::new(err)
                    .context(format!("failed to read session {}", path.display()))
                    .into())
            }
        };
        let record: SessionRecord = serde_json::from_slice(&bytes)
            .with_context(|| format!("failed to decode session {}", path.display()))?;
        if record.user_id != user_id {
            return Err(anyhow::anyhow!(
                "session file {} belongs to {:?}, expected {:?}",
                path.display(),
                record.user_id,
                user_id
            )
            .into());
        }
        Ok(Some(record))
    }

    fn write_record(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let path = self.record_path(&record.user_id);
        let tmp = path.with_extension("tmp");
        let encoded =
            serde_json::to_vec_pretty(record).context("failed to serialize session record")?;
        fs::write(&tmp, encoded)
            .with_context(|| format!("failed to write session {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| {
            format!(
                "failed to atomically persist session {} -> {}",
                tmp.display(),
                path.display()
            )
        })?;
        tracing::debug!(user = %record.user_id, version = record.version, "session persisted");
        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn create_session(&self, user_id: &str) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock();
        if self.read_record(user_id)?.is_some() {
            return Ok(false);
        }
        self.write_record(&SessionRecord::new(user_id, now_millis()))?;
        Ok(true)
    }

    fn get_session(&self, user_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        self.read_record(user_id)
    }

    fn apply(&self, user_id: &str, update: SessionUpdate) -> Result<SessionRecord, StoreError> {
        let _guard = self.write_lock.lock();
        let mut record = self
            .read_record(user_id)?
            .ok_or_else(|| StoreError::MissingRecord(user_id.to_string()))?;
        record.apply(update, now_millis());
        self.write_record(&record)?;
        Ok(record)
    }

    fn session_count(&self) -> Result<usize, StoreError> {
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("failed to list sessions in {}", self.dir.display()))?;
        let mut count = 0;
        for entry in entries {
            let entry = entry.context("failed to read session directory entry")?;
            if entry.path().extension().and_then(|ext| ext.to_str()) == Some(RECORD_EXTENSION) {
                count += 1;
            }
        }
        Ok(count)
    }
}

impl DeviceConfigStore for FileSessionStore {
    fn save_device_config(
        &self,
        scheme_id: &str,
        device_id: &str,
        ips: DeviceIps,
    ) -> Result<SavedDeviceConfig, StoreError> {
        let saved = saved_config(scheme_id, device_id, ips);
        let path = self.device_path(scheme_id, device_id);
        let tmp = path.with_extension("tmp");
        let encoded =
            serde_json::to_vec_pretty(&saved).context("failed to serialize device config")?;
        let _guard = self.write_lock.lock();
        fs::create_dir_all(self.dir.join(DEVICE_DIR)).with_context(|| {
            format!("failed to create device directory under {}", self.dir.display())
        })?;
        fs::write(&tmp, encoded)
            .with_context(|| format!("failed to write device config {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("failed to persist device config {}", path.display()))?;
        tracing::debug!(scheme = scheme_id, device = device_id, "device config persisted");
        Ok(saved)
    }

    fn device_config(
        &self,
        scheme_id: &str,
        device_id: &str,
    ) -> Result<Option<SavedDeviceConfig>, StoreError> {
        let path = self.device_path(scheme_id, device_id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(anyhow::Error::new(err)
                    .context(format!("failed to read device config {}", path.display()))
                    .into())
            }
        };
        let mut saved: SavedDeviceConfig = serde_json::from_slice(&bytes)
            .with_context(|| format!("failed to decode device config {}", path.display()))?;
        saved.ips = saved.ips.with_default_dns();
        Ok(Some(saved))
    }
}
