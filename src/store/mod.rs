//! Binding record storage
//!
//! One interface, two interchangeable backends: a YAML data file and a
//! MySQL table, selected by `mysql.enabled` in the config. The store holds
//! raw rows only; liveness (expiry) is the policy layer's job.
//!
//! Failure semantics matter here: an I/O error is reported as a
//! [`StoreError`], never coerced into "absent" — treating an unreadable
//! binding as gone would wave an intruder through.

pub mod mysql;
pub mod yaml;

use anyhow::{Context, Result};
use thiserror::Error;

use crate::config::LimitConfig;
pub use mysql::MySqlStore;
pub use yaml::YamlStore;

/// One address→account binding as stored.
///
/// `expires_at` and `created_at` are unix milliseconds; `expires_at == 0`
/// means the binding never expires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingRecord {
    pub address: String,
    /// Opaque stable account identity. Never changes on a live record.
    pub owner_id: String,
    /// Display label for the owner; best effort, may be stale or empty.
    pub owner_name: String,
    pub expires_at: i64,
    pub created_at: i64,
}

impl BindingRecord {
    /// True if the record is permanent or not yet past its expiry.
    pub fn is_live(&self, now_ms: i64) -> bool {
        self.expires_at == 0 || self.expires_at > now_ms
    }
}

/// Store-level failure, distinct from "record not found".
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("data file I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("database failure: {0}")]
    Database(#[from] sqlx::Error),

    /// The data file as a whole failed to parse. Individually malformed
    /// entries are logged and skipped instead (see `store::yaml`).
    #[error("data file corrupt: {0}")]
    Corrupt(#[from] serde_yaml::Error),
}

/// Record store contract shared by both backends.
///
/// `get` returns the raw stored row; callers that need "live" semantics
/// apply [`BindingRecord::is_live`] themselves. `erase` is idempotent:
/// erasing an absent record returns `Ok(false)`.
#[allow(async_fn_in_trait)]
pub trait BindingStore {
    async fn get(&self, address: &str) -> Result<Option<BindingRecord>, StoreError>;

    /// Create or unconditionally overwrite the record for `address`.
    /// `created_at` is stamped with the current time.
    async fn put(
        &self,
        address: &str,
        owner_id: &str,
        owner_name: &str,
        expires_at: i64,
    ) -> Result<(), StoreError>;

    /// Remove the record if present; returns whether one existed.
    async fn erase(&self, address: &str) -> Result<bool, StoreError>;

    /// Remove the record only if it is expired at `now_ms`. The check and
    /// the removal are one atomic step, so a binding refreshed by a
    /// concurrent login survives. Returns whether a record was removed.
    async fn erase_expired(&self, address: &str, now_ms: i64) -> Result<bool, StoreError>;

    /// Full enumeration. Order carries no meaning, display only.
    async fn all(&self) -> Result<Vec<BindingRecord>, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;
}

/// The configured backend.
pub enum Store {
    Yaml(YamlStore),
    MySql(MySqlStore),
}

impl Store {
    /// Open the backend selected by `config.mysql.enabled`.
    pub async fn open(config: &LimitConfig) -> Result<Self> {
        if config.mysql.enabled {
            let store = MySqlStore::connect(&config.mysql).await.with_context(|| {
                format!(
                    "Cannot connect to MySQL at {}:{}",
                    config.mysql.host, config.mysql.port
                )
            })?;
            tracing::info!("[store] using MySQL backend");
            Ok(Store::MySql(store))
        } else {
            let store = YamlStore::open(&config.data_file)
                .with_context(|| format!("Cannot open data file: {}", config.data_file))?;
            tracing::info!("[store] using YAML backend file={}", config.data_file);
            Ok(Store::Yaml(store))
        }
    }

    /// Short backend label for status output.
    pub fn kind(&self) -> &'static str {
        match self {
            Store::Yaml(_) => "YAML",
            Store::MySql(_) => "MySQL",
        }
    }
}

impl BindingStore for Store {
    async fn get(&self, address: &str) -> Result<Option<BindingRecord>, StoreError> {
        match self {
            Store::Yaml(s) => s.get(address).await,
            Store::MySql(s) => s.get(address).await,
        }
    }

    async fn put(
        &self,
        address: &str,
        owner_id: &str,
        owner_name: &str,
        expires_at: i64,
    ) -> Result<(), StoreError> {
        match self {
            Store::Yaml(s) => s.put(address, owner_id, owner_name, expires_at).await,
            Store::MySql(s) => s.put(address, owner_id, owner_name, expires_at).await,
        }
    }

    async fn erase(&self, address: &str) -> Result<bool, StoreError> {
        match self {
            Store::Yaml(s) => s.erase(address).await,
            Store::MySql(s) => s.erase(address).await,
        }
    }

    async fn erase_expired(&self, address: &str, now_ms: i64) -> Result<bool, StoreError> {
        match self {
            Store::Yaml(s) => s.erase_expired(address, now_ms).await,
            Store::MySql(s) => s.erase_expired(address, now_ms).await,
        }
    }

    async fn all(&self) -> Result<Vec<BindingRecord>, StoreError> {
        match self {
            Store::Yaml(s) => s.all().await,
            Store::MySql(s) => s.all().await,
        }
    }

    async fn count(&self) -> Result<u64, StoreError> {
        match self {
            Store::Yaml(s) => s.count().await,
            Store::MySql(s) => s.count().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_live_permanent() {
        let rec = BindingRecord {
            address: "1.2.3.4".into(),
            owner_id: "abc".into(),
            owner_name: "Alice".into(),
            expires_at: 0,
            created_at: 1,
        };
        assert!(rec.is_live(i64::MAX));
    }

    #[test]
    fn test_is_live_boundary() {
        let rec = BindingRecord {
            address: "1.2.3.4".into(),
            owner_id: "abc".into(),
            owner_name: "Alice".into(),
            expires_at: 1000,
            created_at: 1,
        };
        assert!(rec.is_live(999));
        // expired exactly at the expiry instant
        assert!(!rec.is_live(1000));
        assert!(!rec.is_live(1001));
    }
}
