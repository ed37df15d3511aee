use std::{
    env, fs, io,
    path::{Path, PathBuf},
};

use crate::constants;

/// Directories used at runtime, all created on construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemPaths {
    pub runtime_root: PathBuf,
    /// `<root>/config`
    pub config_path: PathBuf,
    /// `<root>/output`
    pub output_path: PathBuf,
    /// `<root>/output/data`
    pub data_path: PathBuf,
    /// `<root>/output/logs`
    pub log_path: PathBuf,
}

impl SystemPaths {
    /// Lays the directory tree out under `root`, creating whatever is missing.
    pub fn new(root: &Path) -> io::Result<Self> {
        fs::create_dir_all(root)?;
        let runtime_root = fs::canonicalize(root)?;
        let output_path = runtime_root.join("output");
        let paths = Self {
            config_path: runtime_root.join("config"),
            data_path: output_path.join("data"),
            log_path: output_path.join("logs"),
            output_path,
            runtime_root,
        };

        for dir in [
            &paths.config_path,
            &paths.output_path,
            &paths.data_path,
            &paths.log_path,
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(paths)
    }

    /// Root from `MARKET_HISTORY_ROOT`, else the current directory.
    pub fn discover() -> io::Result<Self> {
        let root = match env::var_os(constants::ROOT_ENV_VAR) {
            Some(root) if !root.is_empty() => PathBuf::from(root),
            _ => env::current_dir()?,
        };
        Self::new(&root)
    }

    /// Logs every resolved directory.
    pub fn log_summary(&self) {
        log::info!("Runtime root: {}", self.runtime_root.display());
        log::info!("Config directory: {}", self.config_path.display());
        log::info!("Output directory: {}", self.output_path.display());
        log::info!("Data directory: {}", self.data_path.display());
        log::info!("Log directory: {}", self.log_path.display());
    }
}
