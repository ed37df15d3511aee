use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{constants, exchange::options::OptionMap, history::RetryPolicy};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file {0} does not exist")]
    NotFound(PathBuf),
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Contents of `data_config.json`. Every field is optional; keys this crate
/// does not know are kept in `extra` and written back on save.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<String>,
    /// Options handed to the exchange client as-is.
    #[serde(default)]
    pub exchange_config: OptionMap,
    /// `YYYY-MM-DD`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    /// `YYYY-MM-DD`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    /// IANA name of the zone calendar dates are taken in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_limit: Option<usize>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DataConfig {
    /// Config written when `data_config.json` does not exist yet.
    pub fn template() -> Self {
        Self {
            exchange_id: Some(constants::DEFAULT_EXCHANGE_ID.to_string()),
            symbol: Some(constants::CONFIG_TEMPLATE_SYMBOL.to_string()),
            timeframe: Some(constants::DEFAULT_TIMEFRAME.to_string()),
            ..Self::default()
        }
    }
}

/// Reads and writes named JSON files in one config directory.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: PathBuf,
}

impl ConfigManager {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_file(&self, name: &str) -> PathBuf {
        self.config_dir.join(name)
    }

    /// Reads `name` from the config directory. The data config is created
    /// with defaults first when it is missing.
    pub fn read_config<T: DeserializeOwned>(&self, name: &str) -> Result<T, ConfigError> {
        if name == constants::DATA_CONFIG_FILE {
            self.ensure_data_config()?;
        }

        let path = self.config_file(name);
        if !path.exists() {
            return Err(ConfigError::NotFound(path));
        }

        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Json { path, source })
    }

    /// Writes `value` as pretty JSON to `name`, creating the directory if needed.
    pub fn save_config<T: Serialize>(&self, value: &T, name: &str) -> Result<PathBuf, ConfigError> {
        let path = self.config_file(name);
        let io_error = |source| ConfigError::Io {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.config_dir).map_err(io_error)?;
        let mut content = serde_json::to_string_pretty(value).map_err(|source| ConfigError::Json {
            path: path.clone(),
            source,
        })?;
        content.push('\n');
        fs::write(&path, content).map_err(io_error)?;

        log::debug!("Saved config {}", path.display());
        Ok(path)
    }

    /// Writes `default` to `name` unless the file already exists.
    pub fn ensure_config<T: Serialize>(
        &self,
        name: &str,
        default: &T,
    ) -> Result<PathBuf, ConfigError> {
        let path = self.config_file(name);
        if path.exists() {
            return Ok(path);
        }
        log::info!("Creating default config: {}", path.display());
        self.save_config(default, name)
    }

    pub fn ensure_data_config(&self) -> Result<PathBuf, ConfigError> {
        self.ensure_config(constants::DATA_CONFIG_FILE, &DataConfig::template())
    }

    pub fn load_data_config(&self) -> Result<DataConfig, ConfigError> {
        self.read_config(constants::DATA_CONFIG_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn missing_data_config_is_created_with_defaults() {
        let dir = tempdir().unwrap();
        let manager = ConfigManager::new(dir.path().join("config"));

        let config = manager.load_data_config().unwrap();

        assert_eq!(config, DataConfig::template());
        assert_eq!(config.exchange_id.as_deref(), Some("okx"));
        assert_eq!(config.symbol.as_deref(), Some("BTC/USDT"));
        assert_eq!(config.timeframe.as_deref(), Some("1h"));
        assert!(config.exchange_config.is_empty());

        let content = fs::read_to_string(manager.config_file("data_config.json")).unwrap();
        let written: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(
            written,
            json!({
                "exchange_id": "okx",
                "symbol": "BTC/USDT",
                "timeframe": "1h",
                "exchange_config": {}
            })
        );
    }

    #[test]
    fn existing_data_config_is_not_overwritten() {
        let dir = tempdir().unwrap();
        let manager = ConfigManager::new(dir.path());
        fs::write(
            manager.config_file("data_config.json"),
            r#"{"exchange_id": "binance", "symbol": "SOL/USDT"}"#,
        )
        .unwrap();

        let config = manager.load_data_config().unwrap();

        assert_eq!(config.exchange_id.as_deref(), Some("binance"));
        assert_eq!(config.symbol.as_deref(), Some("SOL/USDT"));
        assert_eq!(config.timeframe, None);
    }

    #[test]
    fn unknown_keys_survive_a_round_trip() {
        let dir = tempdir().unwrap();
        let manager = ConfigManager::new(dir.path());
        fs::write(
            manager.config_file("data_config.json"),
            r#"{
                "exchange_id": "okx",
                "exchange_config": {"timeout": 5000},
                "retry": {"max_attempts": 3},
                "start_time": "2024-01-01 00:00:00",
                "notes": ["keep", "me"]
            }"#,
        )
        .unwrap();

        let config = manager.load_data_config().unwrap();
        assert_eq!(config.extra["start_time"], json!("2024-01-01 00:00:00"));
        let retry = config.retry.clone().unwrap();
        assert_eq!(retry.max_attempts, Some(3));
        assert_eq!(retry.backoff_ms, RetryPolicy::default().backoff_ms);

        manager.save_config(&config, "data_config.json").unwrap();
        let reloaded = manager.load_data_config().unwrap();
        assert_eq!(reloaded, config);
        assert_eq!(reloaded.extra["notes"], json!(["keep", "me"]));
        assert_eq!(reloaded.exchange_config["timeout"], json!(5000));
    }

    #[test]
    fn reading_a_missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let manager = ConfigManager::new(dir.path());

        let err = manager.read_config::<Value>("other.json").unwrap_err();

        assert!(matches!(err, ConfigError::NotFound(path) if path.ends_with("other.json")));
    }

    #[test]
    fn malformed_json_is_reported_with_its_path() {
        let dir = tempdir().unwrap();
        let manager = ConfigManager::new(dir.path());
        fs::write(manager.config_file("data_config.json"), "{ not json").unwrap();

        let err = manager.load_data_config().unwrap_err();

        assert!(matches!(err, ConfigError::Json { .. }));
        assert!(err.to_string().contains("data_config.json"));
    }
}
