use std::{
    fs,
    path::{Path, PathBuf},
};

use csv::WriterBuilder;
use serde::Serialize;

use crate::model::{self, Candle, format_timestamp};

const COLUMNS: [&str; 7] = ["timestamp", "open", "high", "low", "close", "volume", "datetime"];

/// One CSV line: the candle plus its rendered UTC time.
#[derive(Debug, Serialize)]
struct Row {
    timestamp: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    datetime: String,
}

impl From<&Candle> for Row {
    fn from(candle: &Candle) -> Self {
        Self {
            timestamp: candle.timestamp,
            open: candle.open,
            high: candle.high,
            low: candle.low,
            close: candle.close,
            volume: candle.volume,
            datetime: format_timestamp(candle.timestamp),
        }
    }
}

/// Replaces the separators exchanges use in symbols (`/`, `:`) so the symbol can be a file stem.
pub fn sanitize_symbol(symbol: &str) -> String {
    symbol.replace(['/', ':'], "-")
}

/// Path of the table holding `symbol` at `timeframe` inside `output_dir`.
pub fn table_path(symbol: &str, timeframe: &str, output_dir: &Path) -> PathBuf {
    output_dir.join(format!("{}_{}.csv", sanitize_symbol(symbol), timeframe))
}

/// Creates `dir` and its parents when missing.
pub fn ensure_dir(dir: &Path) -> model::Result<()> {
    if !dir.exists() {
        log::info!("Creating data directory: {}", dir.display());
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

/// Writes `candles` to `<output_dir>/<symbol>_<timeframe>.csv`, replacing any previous file.
///
/// An empty slice produces a header-only file. Returns the absolute path written.
pub fn save_table(
    candles: &[Candle],
    symbol: &str,
    timeframe: &str,
    output_dir: &Path,
) -> model::Result<PathBuf> {
    ensure_dir(output_dir)?;

    let path = table_path(symbol, timeframe, output_dir);
    log::info!("Saving {} candles to {}", candles.len(), path.display());

    let mut writer = WriterBuilder::new().has_headers(false).from_path(&path)?;

    // Write header row
    writer.write_record(COLUMNS)?;

    // Write the data rows.
    for candle in candles {
        writer.serialize(Row::from(candle))?;
    }
    writer.flush()?;

    Ok(fs::canonicalize(&path)?)
}
