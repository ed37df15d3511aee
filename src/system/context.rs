use crate::{
    config::{ConfigManager, DataConfig},
    model::Result,
    system::paths::SystemPaths,
};

/// Everything a command needs from the environment, built once in `main`.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub paths: SystemPaths,
    pub config: ConfigManager,
    pub data_config: DataConfig,
}

impl AppContext {
    /// Loads `data_config.json` from the config directory, creating it when missing.
    pub fn load(paths: SystemPaths) -> Result<Self> {
        let config = ConfigManager::new(&paths.config_path);
        let data_config = config.load_data_config()?;
        Ok(Self {
            paths,
            config,
            data_config,
        })
    }
}
