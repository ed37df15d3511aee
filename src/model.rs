use std::io;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;

use crate::{config::ConfigError, constants, http::client::RequestError};

/// Structure representing a candle (OHLCV data).
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub timestamp: i64, // Bucket start, milliseconds since epoch.
    pub open: f64,      // Opening price.
    pub high: f64,      // Highest price.
    pub low: f64,       // Lowest price.
    pub close: f64,     // Closing price.
    pub volume: f64,    // Trading volume.
}

impl Candle {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

/// Millisecond range walked by the history fetcher. `start < end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: i64,
    pub end: i64,
}

impl FetchWindow {
    pub fn new(start: i64, end: i64) -> Result<Self> {
        if end <= start {
            return Err(HistoryError::InvalidParameter(format!(
                "end ({}) must be later than start ({})",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    /// Resolves optional calendar dates against `now`.
    ///
    /// Dates are taken at midnight in `tz`. A missing end means `now`, a missing
    /// start means `now` minus the default lookback.
    pub fn resolve(
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        tz: Tz,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let start = match start_date {
            Some(date) => midnight_millis(date, tz)?,
            None => (now - Duration::days(constants::DEFAULT_LOOKBACK_DAYS)).timestamp_millis(),
        };
        let end = match end_date {
            Some(date) => midnight_millis(date, tz)?,
            None => now.timestamp_millis(),
        };
        Self::new(start, end)
    }
}

fn midnight_millis(date: NaiveDate, tz: Tz) -> Result<i64> {
    tz.from_local_datetime(&date.and_time(NaiveTime::MIN))
        .earliest()
        .map(|dt| dt.timestamp_millis())
        .ok_or_else(|| {
            HistoryError::InvalidParameter(format!("{} has no midnight in {:?}", date, tz))
        })
}

/// Renders a millisecond timestamp as a UTC `YYYY-MM-DD HH:MM:SS` string.
pub fn format_timestamp(millis: i64) -> String {
    match DateTime::<Utc>::from_timestamp_millis(millis) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => millis.to_string(),
    }
}

/// Parses an IANA timezone name such as `UTC` or `Asia/Shanghai`.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|e| HistoryError::InvalidParameter(format!("unknown timezone {}: {}", name, e)))
}

/// Parses a `YYYY-MM-DD` calendar date.
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|e| {
        HistoryError::InvalidParameter(format!(
            "invalid date {:?}, expected YYYY-MM-DD: {}",
            raw, e
        ))
    })
}

pub type Result<T> = std::result::Result<T, HistoryError>;

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("symbol {symbol} does not exist on exchange {exchange_id}")]
    SymbolNotFound { symbol: String, exchange_id: String },
    #[error("failed to initialize exchange client: {0}")]
    ClientInit(String),
    #[error("exchange request failed: {0}")]
    Request(#[from] RequestError),
    #[error("giving up after {attempts} failed attempts: {last_error}")]
    RetriesExhausted {
        attempts: u32,
        last_error: RequestError,
    },
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}
