//! File-backed record store
//!
//! Keeps every binding in one YAML file, keyed by address. Each operation
//! is a full read-modify-write of the file; the expected record count is
//! tiny and the login path is not high-throughput, so simplicity wins.
//!
//! A malformed entry (bad or missing fields) is logged and skipped — it
//! never aborts an enumeration or a sweep. An unparsable *file* is a real
//! store failure and surfaces as [`StoreError::Corrupt`].

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use super::{BindingRecord, BindingStore, StoreError};

/// On-disk shape of one binding row.
#[derive(Debug, Serialize, Deserialize)]
struct StoredRow {
    owner_id: String,
    #[serde(default)]
    owner_name: String,
    expires_at: i64,
    #[serde(default)]
    created_at: i64,
}

/// Whole data file. BTreeMap keeps the file diff-stable across writes.
#[derive(Debug, Default, Serialize, Deserialize)]
struct DataFile {
    #[serde(default)]
    bindings: BTreeMap<String, serde_yaml::Value>,
}

pub struct YamlStore {
    path: PathBuf,
    /// Serializes every load-modify-save pair. The gate's login lock only
    /// covers logins; the sweeper and admin erase hit this store directly,
    /// and two unsynchronized writers would each rewrite the whole file,
    /// the second silently dropping the first one's change.
    lock: Mutex<()>,
}

impl YamlStore {
    /// Open a store at `path`, creating the parent directory if needed.
    /// The file itself is created lazily on first write.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    fn load(&self) -> Result<DataFile, StoreError> {
        if !self.path.exists() {
            return Ok(DataFile::default());
        }
        let contents = fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(DataFile::default());
        }
        Ok(serde_yaml::from_str(&contents)?)
    }

    fn save(&self, data: &DataFile) -> Result<(), StoreError> {
        let yaml = serde_yaml::to_string(data)?;
        fs::write(&self.path, yaml)?;
        Ok(())
    }

    /// Decode one map entry, or log-and-skip it.
    fn decode(address: &str, value: &serde_yaml::Value) -> Option<BindingRecord> {
        match serde_yaml::from_value::<StoredRow>(value.clone()) {
            Ok(row) => Some(BindingRecord {
                address: address.to_string(),
                owner_id: row.owner_id,
                owner_name: row.owner_name,
                expires_at: row.expires_at,
                created_at: row.created_at,
            }),
            Err(e) => {
                tracing::warn!("[store] malformed record address={} err={}", address, e);
                None
            }
        }
    }
}

// The guard is never held across an await: all file I/O below is
// synchronous, so each operation completes under one lock acquisition.
impl BindingStore for YamlStore {
    async fn get(&self, address: &str) -> Result<Option<BindingRecord>, StoreError> {
        let _guard = self.lock.lock().unwrap();
        let data = self.load()?;
        Ok(data
            .bindings
            .get(address)
            .and_then(|v| Self::decode(address, v)))
    }

    async fn put(
        &self,
        address: &str,
        owner_id: &str,
        owner_name: &str,
        expires_at: i64,
    ) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap();
        let mut data = self.load()?;
        let row = StoredRow {
            owner_id: owner_id.to_string(),
            owner_name: owner_name.to_string(),
            expires_at,
            created_at: chrono::Utc::now().timestamp_millis(),
        };
        data.bindings
            .insert(address.to_string(), serde_yaml::to_value(&row)?);
        self.save(&data)
    }

    async fn erase(&self, address: &str) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().unwrap();
        let mut data = self.load()?;
        if data.bindings.remove(address).is_none() {
            return Ok(false);
        }
        self.save(&data)?;
        Ok(true)
    }

    async fn erase_expired(&self, address: &str, now_ms: i64) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().unwrap();
        let mut data = self.load()?;
        let expired = match data.bindings.get(address).and_then(|v| Self::decode(address, v)) {
            Some(record) => !record.is_live(now_ms),
            None => false,
        };
        if !expired {
            return Ok(false);
        }
        data.bindings.remove(address);
        self.save(&data)?;
        Ok(true)
    }

    async fn all(&self) -> Result<Vec<BindingRecord>, StoreError> {
        let _guard = self.lock.lock().unwrap();
        let data = self.load()?;
        Ok(data
            .bindings
            .iter()
            .filter_map(|(addr, v)| Self::decode(addr, v))
            .collect())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let _guard = self.lock.lock().unwrap();
        let data = self.load()?;
        Ok(data.bindings.len() as u64)
    }
}
