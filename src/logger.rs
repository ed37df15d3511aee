use std::{
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
};

use chrono::{
    Local,
    format::{Item, StrftimeItems},
};
use env_logger::{Builder, Target};
use log::LevelFilter;
use serde::{Deserialize, Serialize};

const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Contents of `log_config.json`. Missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `debug`, `info`, `warning`, `error` or `critical`.
    pub level: String,
    pub console_output: bool,
    pub file_output: bool,
    /// Log file name; `{timestamp}` is replaced by the start time.
    pub filename_format: String,
    /// strftime pattern for the record time.
    pub date_format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console_output: true,
            file_output: true,
            filename_format: "market_history_{timestamp}.log".to_string(),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
        }
    }
}

impl LogConfig {
    /// Reads `path`, falling back to the defaults when the file is missing or unreadable.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|content| serde_json::from_str(&content).map_err(|e| e.to_string()))
        {
            Ok(config) => config,
            Err(err) => {
                eprintln!(
                    "Failed to load log config {}: {}, using defaults",
                    path.display(),
                    err
                );
                Self::default()
            }
        }
    }

    pub fn level_filter(&self) -> LevelFilter {
        level_filter(&self.level)
    }

    /// File name for a log started at `timestamp` (`%Y%m%d_%H%M%S`).
    pub fn file_name(&self, timestamp: &str) -> String {
        self.filename_format.replace("{timestamp}", timestamp)
    }
}

/// Maps a level name to a filter. Unknown names mean `info`.
pub fn level_filter(name: &str) -> LevelFilter {
    match name.trim().to_ascii_lowercase().as_str() {
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warning" | "warn" => LevelFilter::Warn,
        "error" | "critical" => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}

// Writes every record to stderr and/or the log file.
struct Tee {
    console: bool,
    file: Option<File>,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.console {
            io::stderr().write_all(buf)?;
        }
        if let Some(file) = self.file.as_mut() {
            file.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.console {
            io::stderr().flush()?;
        }
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

fn valid_date_format(format: &str) -> bool {
    !StrftimeItems::new(format).any(|item| matches!(item, Item::Error))
}

/// Installs the global logger. `RUST_LOG` overrides the configured level.
///
/// Returns the log file path when file output is enabled.
pub fn init(log_dir: &Path, config: &LogConfig) -> io::Result<Option<PathBuf>> {
    let date_format = if valid_date_format(&config.date_format) {
        config.date_format.clone()
    } else {
        eprintln!(
            "Invalid log date format {:?}, using {:?}",
            config.date_format, DEFAULT_DATE_FORMAT
        );
        DEFAULT_DATE_FORMAT.to_string()
    };

    let log_file = if config.file_output {
        fs::create_dir_all(log_dir)?;
        let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        Some(log_dir.join(config.file_name(&timestamp)))
    } else {
        None
    };
    let file = match &log_file {
        Some(path) => Some(File::create(path)?),
        None => None,
    };

    let mut builder = Builder::new();
    builder
        .filter_level(config.level_filter())
        .parse_default_env()
        .format(move |buf, record| {
            writeln!(
                buf,
                "{} - {} - {} - {}",
                Local::now().format(&date_format),
                record.target(),
                record.level(),
                record.args()
            )
        })
        .target(Target::Pipe(Box::new(Tee {
            console: config.console_output,
            file,
        })));

    if builder.try_init().is_err() {
        eprintln!("Logger already initialized");
    }
    Ok(log_file)
}
