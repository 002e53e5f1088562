//! Limit configuration module
//!
//! Parses and manages the binding-limit configuration from a YAML file.
//! The file is also written back: admin commands mutate the in-memory
//! config and persist it on every change.
//!
//! Uses serde_yaml for automatic parsing - just define the struct and serde
//! handles all the parsing, validation, and type conversion.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// MySQL backend settings. Ignored unless `enabled` is true.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MysqlConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_mysql_host")]
    pub host: String,

    #[serde(default = "default_mysql_port")]
    pub port: u16,

    #[serde(default = "default_mysql_database")]
    pub database: String,

    #[serde(default = "default_mysql_username")]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Prefixed onto the binding table name ("<prefix>bindings").
    #[serde(default = "default_table_prefix")]
    pub table_prefix: String,

    #[serde(default)]
    pub use_ssl: bool,
}

impl Default for MysqlConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_mysql_host(),
            port: default_mysql_port(),
            database: default_mysql_database(),
            username: default_mysql_username(),
            password: String::new(),
            table_prefix: default_table_prefix(),
            use_ssl: false,
        }
    }
}

/// Main limit configuration
///
/// This struct is automatically parsed from YAML by serde.
/// Just add a field here, and serde handles the rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitConfig {
    /// Master switch. When false every login is allowed untouched.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Cooldown in minutes before an address unbinds. 0 = permanent.
    #[serde(default = "default_time_limit")]
    pub time_limit: u32,

    /// Addresses exempt from all binding checks.
    #[serde(default)]
    pub bypass_ips: Vec<String>,

    /// Path of the YAML data file (file-backed store only).
    #[serde(default = "default_data_file")]
    pub data_file: String,

    #[serde(default)]
    pub mysql: MysqlConfig,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            time_limit: default_time_limit(),
            bypass_ips: Vec::new(),
            data_file: default_data_file(),
            mysql: MysqlConfig::default(),
        }
    }
}

// ============================================
// Default value functions
// These are called by serde when a field is missing
// ============================================

fn default_enabled() -> bool {
    true
}

fn default_time_limit() -> u32 {
    10
}

fn default_data_file() -> String {
    "data.yml".to_string()
}

fn default_mysql_host() -> String {
    "localhost".to_string()
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_mysql_database() -> String {
    "minecraft".to_string()
}

fn default_mysql_username() -> String {
    "root".to_string()
}

fn default_table_prefix() -> String {
    "iplimit_".to_string()
}

impl LimitConfig {
    /// Load configuration from a YAML file
    ///
    /// # Example
    /// ```no_run
    /// use iplimit::config::LimitConfig;
    ///
    /// let config = LimitConfig::from_file("conf/iplimit.yaml")
    ///     .expect("Failed to load config");
    /// println!("time limit: {} min", config.time_limit);
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: LimitConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML in {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from a YAML string
    ///
    /// Useful for testing
    pub fn from_str(contents: &str) -> Result<Self> {
        let config: LimitConfig =
            serde_yaml::from_str(contents).context("Failed to parse YAML")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.data_file.is_empty(), "data_file cannot be empty");

        if self.mysql.enabled {
            anyhow::ensure!(!self.mysql.host.is_empty(), "mysql.host cannot be empty");
            anyhow::ensure!(
                !self.mysql.database.is_empty(),
                "mysql.database cannot be empty"
            );
            anyhow::ensure!(
                !self.mysql.username.is_empty(),
                "mysql.username cannot be empty"
            );
            anyhow::ensure!(
                !self.mysql.table_prefix.is_empty(),
                "mysql.table_prefix cannot be empty"
            );
        }

        Ok(())
    }

    /// Save configuration to a YAML file
    ///
    /// Called after every admin mutation so the file tracks runtime state.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml =
            serde_yaml::to_string(&self).context("Failed to serialize config to YAML")?;

        fs::write(path.as_ref(), yaml)
            .with_context(|| format!("Failed to write config to {}", path.as_ref().display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = LimitConfig::from_str("{}").unwrap();

        assert!(config.enabled);
        assert_eq!(config.time_limit, 10);
        assert!(config.bypass_ips.is_empty());
        assert_eq!(config.data_file, "data.yml");
        assert!(!config.mysql.enabled);
        assert_eq!(config.mysql.host, "localhost");
        assert_eq!(config.mysql.port, 3306);
        assert_eq!(config.mysql.table_prefix, "iplimit_");
    }

    #[test]
    fn test_full_config() {
        let config_str = r#"
enabled: false
time_limit: 120
bypass_ips:
  - "127.0.0.1"
  - "10.0.0.5"
data_file: "state/bindings.yml"

mysql:
  enabled: true
  host: "192.168.1.2"
  port: 3307
  database: "gamedb"
  username: "gameuser"
  password: "gamepass"
  table_prefix: "srv1_"
  use_ssl: true
"#;

        let config = LimitConfig::from_str(config_str).unwrap();

        assert!(!config.enabled);
        assert_eq!(config.time_limit, 120);
        assert_eq!(config.bypass_ips, vec!["127.0.0.1", "10.0.0.5"]);
        assert_eq!(config.data_file, "state/bindings.yml");
        assert!(config.mysql.enabled);
        assert_eq!(config.mysql.host, "192.168.1.2");
        assert_eq!(config.mysql.port, 3307);
        assert_eq!(config.mysql.table_prefix, "srv1_");
        assert!(config.mysql.use_ssl);
    }

    #[test]
    fn test_wrong_type() {
        let result = LimitConfig::from_str("time_limit: \"not_a_number\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_yaml() {
        let result = LimitConfig::from_str("bypass_ips: [this is not valid yaml");
        assert!(result.is_err());
    }

    #[test]
    fn test_mysql_requires_host() {
        let config_str = r#"
mysql:
  enabled: true
  host: ""
"#;

        let result = LimitConfig::from_str(config_str);
        assert!(result.is_err());

        let err_msg = format!("{}", result.unwrap_err());
        assert!(err_msg.contains("mysql.host"));
    }

    #[test]
    fn test_empty_table_prefix_rejected() {
        let config_str = r#"
mysql:
  enabled: true
  table_prefix: ""
"#;

        let result = LimitConfig::from_str(config_str);
        assert!(result.is_err());
    }

    #[test]
    fn test_save_and_load() {
        let mut config = LimitConfig::default();
        config.time_limit = 45;
        config.bypass_ips.push("192.168.0.9".to_string());

        let temp_file = std::env::temp_dir().join("test_save_iplimit_config.yaml");

        config.save(&temp_file).unwrap();
        let loaded = LimitConfig::from_file(&temp_file).unwrap();

        assert_eq!(loaded.time_limit, 45);
        assert_eq!(loaded.bypass_ips, vec!["192.168.0.9"]);
        assert_eq!(loaded.data_file, config.data_file);

        std::fs::remove_file(temp_file).ok();
    }
}
