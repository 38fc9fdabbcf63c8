use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file `{path}`: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

fn default_read_timeout_ms() -> u64 {
    60_000
}

fn default_heartbeat_period_ms() -> u64 {
    90_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct MysqlConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_heartbeat_period_ms")]
    pub heartbeat_period_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EsConfig {
    pub host: String,
    pub port: u16,
    pub index: String,
    #[serde(rename = "type")]
    pub doc_type: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BinlogConfig {
    #[serde(default)]
    pub start_bin_log_name: String,
    #[serde(default)]
    pub start_bin_log_position: u64,
    pub bin_log_status_file_path: PathBuf,
}

/// One entry of `rule.tables`: either the main table (`main = true`, with
/// `main_coll` set) or a join table (`join_coll`/`join_main_coll` set).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TableConfig {
    #[serde(default)]
    pub mapping: HashMap<String, String>,
    #[serde(default)]
    pub main: bool,
    pub main_coll: Option<String>,
    pub join_coll: Option<String>,
    pub join_main_coll: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    pub tables: HashMap<String, TableConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mysql: MysqlConfig,
    pub es: EsConfig,
    pub binlog: BinlogConfig,
    pub rule: RuleConfig,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// The name of the one table configured with `main = true`.
    pub fn main_table_name(&self) -> Result<&str, ConfigError> {
        self.rule
            .tables
            .iter()
            .find(|(_, t)| t.main)
            .map(|(name, _)| name.as_str())
            .ok_or_else(|| ConfigError::Invalid("no table in rule.tables has main = true".to_string()))
    }

    pub fn join_table_names(&self) -> impl Iterator<Item = &str> {
        self.rule.tables.iter().filter(|(_, t)| !t.main).map(|(name, _)| name.as_str())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.mysql.port == 0 {
            return Err(ConfigError::Invalid("mysql.port must be non-zero".to_string()));
        }
        if self.es.host.is_empty() || self.es.index.is_empty() || self.es.doc_type.is_empty() {
            return Err(ConfigError::Invalid(
                "es.host, es.index and es.type must all be non-empty".to_string(),
            ));
        }
        if !self.binlog.bin_log_status_file_path.is_dir() {
            return Err(ConfigError::Invalid(format!(
                "binlog.bin_log_status_file_path `{}` must be an existing directory",
                self.binlog.bin_log_status_file_path.display()
            )));
        }

        let main_tables: Vec<&String> = self.rule.tables.iter().filter(|(_, t)| t.main).map(|(name, _)| name).collect();
        if main_tables.len() != 1 {
            return Err(ConfigError::Invalid(format!(
                "exactly one table must have main = true, found {}",
                main_tables.len()
            )));
        }
        let main_name = main_tables[0];
        let main_conf = &self.rule.tables[main_name];
        if main_conf.main_coll.as_deref().unwrap_or("").is_empty() {
            return Err(ConfigError::Invalid(format!("table `{main_name}` has main = true but no main_coll")));
        }

        for (name, table) in self.rule.tables.iter().filter(|(n, _)| *n != main_name) {
            if table.join_coll.as_deref().unwrap_or("").is_empty() || table.join_main_coll.as_deref().unwrap_or("").is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "join table `{name}` must set both join_coll and join_main_coll"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_toml(status_dir: &str) -> String {
        format!(
            r#"
[mysql]
host = "127.0.0.1"
port = 3306
user = "root"
password = "secret"
database = "app"

[es]
host = "127.0.0.1"
port = 9200
index = "users"
type = "_doc"

[binlog]
bin_log_status_file_path = "{status_dir}"

[rule.tables.users]
main = true
main_coll = "id"

[rule.tables.addresses]
join_coll = "id"
join_main_coll = "addr_id"
"#
        )
    }

    #[test]
    fn parses_and_validates_a_well_formed_config() {
        let dir = std::env::temp_dir();
        let toml_str = sample_toml(&dir.display().to_string());
        let config: Config = toml::from_str(&toml_str).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.main_table_name().unwrap(), "users");
        assert_eq!(config.mysql.read_timeout_ms, 60_000);
        assert_eq!(config.mysql.heartbeat_period_ms, 90_000);
    }

    #[test]
    fn rejects_zero_main_tables() {
        let dir = std::env::temp_dir();
        let toml_str = sample_toml(&dir.display().to_string()).replace("main = true", "main = false");
        let config: Config = toml::from_str(&toml_str).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_nonexistent_status_dir() {
        let toml_str = sample_toml("/this/path/does/not/exist/i-hope");
        let config: Config = toml::from_str(&toml_str).unwrap();
        assert!(config.validate().is_err());
    }
}
