//! MySQL-backed record store
//!
//! Same contract as the YAML store, backed by one table with a unique
//! `address` key. All queries are runtime strings; errors propagate to the
//! caller instead of collapsing into "absent", so the gate can fail closed.

use sqlx::mysql::MySqlPoolOptions;
use sqlx::MySqlPool;

use super::{BindingRecord, BindingStore, StoreError};
use crate::config::MysqlConfig;

pub struct MySqlStore {
    pool: MySqlPool,
    table: String,
}

impl MySqlStore {
    /// Connect and make sure the binding table exists.
    pub async fn connect(cfg: &MysqlConfig) -> Result<Self, StoreError> {
        let url = format!(
            "mysql://{}:{}@{}:{}/{}?ssl-mode={}",
            cfg.username,
            cfg.password,
            cfg.host,
            cfg.port,
            cfg.database,
            if cfg.use_ssl { "required" } else { "disabled" },
        );
        let pool = MySqlPoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let store = Self {
            pool,
            table: format!("{}bindings", cfg.table_prefix),
        };
        store.create_table().await?;
        tracing::info!("[store] connected to MySQL table={}", store.table);
        Ok(store)
    }

    async fn create_table(&self) -> Result<(), StoreError> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS `{}` (
                `address` VARCHAR(45) NOT NULL PRIMARY KEY,
                `owner_id` VARCHAR(64) NOT NULL,
                `owner_name` VARCHAR(64) NOT NULL,
                `expires_at` BIGINT NOT NULL,
                `created_at` BIGINT NOT NULL,
                INDEX `idx_expires_at` (`expires_at`)
            )",
            self.table
        );
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }
}

impl BindingStore for MySqlStore {
    async fn get(&self, address: &str) -> Result<Option<BindingRecord>, StoreError> {
        let sql = format!(
            "SELECT `owner_id`, `owner_name`, `expires_at`, `created_at`
             FROM `{}` WHERE `address` = ?",
            self.table
        );
        let row: Option<(String, String, i64, i64)> = sqlx::query_as(&sql)
            .bind(address)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(owner_id, owner_name, expires_at, created_at)| BindingRecord {
            address: address.to_string(),
            owner_id,
            owner_name,
            expires_at,
            created_at,
        }))
    }

    async fn put(
        &self,
        address: &str,
        owner_id: &str,
        owner_name: &str,
        expires_at: i64,
    ) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO `{}` (`address`, `owner_id`, `owner_name`, `expires_at`, `created_at`)
             VALUES (?, ?, ?, ?, ?) ON DUPLICATE KEY UPDATE
             `owner_id` = VALUES(`owner_id`), `owner_name` = VALUES(`owner_name`),
             `expires_at` = VALUES(`expires_at`), `created_at` = VALUES(`created_at`)",
            self.table
        );
        sqlx::query(&sql)
            .bind(address)
            .bind(owner_id)
            .bind(owner_name)
            .bind(expires_at)
            .bind(chrono::Utc::now().timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn erase(&self, address: &str) -> Result<bool, StoreError> {
        let sql = format!("DELETE FROM `{}` WHERE `address` = ?", self.table);
        let result = sqlx::query(&sql).bind(address).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn erase_expired(&self, address: &str, now_ms: i64) -> Result<bool, StoreError> {
        // expiry re-checked inside the DELETE so a concurrent refresh wins
        let sql = format!(
            "DELETE FROM `{}` WHERE `address` = ? AND `expires_at` != 0 AND `expires_at` <= ?",
            self.table
        );
        let result = sqlx::query(&sql)
            .bind(address)
            .bind(now_ms)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn all(&self) -> Result<Vec<BindingRecord>, StoreError> {
        let sql = format!(
            "SELECT `address`, `owner_id`, `owner_name`, `expires_at`, `created_at` FROM `{}`",
            self.table
        );
        let rows: Vec<(String, String, String, i64, i64)> =
            sqlx::query_as(&sql).fetch_all(&self.pool).await?;

        Ok(rows
            .into_iter()
            .map(
                |(address, owner_id, owner_name, expires_at, created_at)| BindingRecord {
                    address,
                    owner_id,
                    owner_name,
                    expires_at,
                    created_at,
                },
            )
            .collect())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM `{}`", self.table);
        let (n,): (i64,) = sqlx::query_as(&sql).fetch_one(&self.pool).await?;
        Ok(n.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    // DB integration tests require a live DATABASE_URL; skipped in CI.
    // The contract itself is exercised against the YAML backend in
    // src/store/yaml.rs and tests/binding_flow.rs.
}
