use std::{collections::HashSet, time::Duration};

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use crate::{
    constants,
    exchange::ExchangeClient,
    model::{Candle, FetchWindow, HistoryError, Result, format_timestamp},
};

/// How failed page requests are retried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Consecutive failures tolerated on one cursor. `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Pause after the first failure.
    pub backoff_ms: u64,
    /// Growth factor applied to the pause after each further failure.
    pub multiplier: f64,
    /// Upper bound for the pause.
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            backoff_ms: constants::ERROR_BACKOFF.as_millis() as u64,
            multiplier: 1.0,
            max_backoff_ms: constants::MAX_ERROR_BACKOFF.as_millis() as u64,
        }
    }
}

impl RetryPolicy {
    /// Whether another attempt may follow `failures` consecutive failures.
    pub fn allows_retry(&self, failures: u32) -> bool {
        self.max_attempts.is_none_or(|max| failures < max)
    }

    /// Pause before the attempt that follows the `failures`-th consecutive failure.
    pub fn delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        let millis = self.backoff_ms as f64 * self.multiplier.max(0.0).powi(exponent);
        Duration::from_millis(millis.min(self.max_backoff_ms as f64) as u64)
    }
}

/// Knobs of a history download.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Candles requested per page.
    pub page_limit: usize,
    pub retry: RetryPolicy,
    /// Zone in which calendar dates start.
    pub timezone: Tz,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            page_limit: constants::PAGE_LIMIT,
            retry: RetryPolicy::default(),
            timezone: Tz::UTC,
        }
    }
}

/// Downloads every candle of `symbol` between two calendar dates.
///
/// `end_date` defaults to now and `start_date` to thirty days before now. The
/// parameters are validated before the first request is sent. The result is
/// sorted by timestamp, holds each timestamp once and ends at or before the
/// resolved end.
pub async fn fetch_full_history(
    client: &dyn ExchangeClient,
    symbol: &str,
    timeframe: &str,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    options: &FetchOptions,
) -> Result<Vec<Candle>> {
    if symbol.trim().is_empty() {
        return Err(HistoryError::InvalidParameter("symbol must not be empty".into()));
    }

    let window = FetchWindow::resolve(start_date, end_date, options.timezone, Utc::now())?;

    if !client.timeframes().contains(timeframe) {
        return Err(HistoryError::InvalidParameter(format!(
            "unsupported timeframe {} on {}, expected one of {}",
            timeframe,
            client.id(),
            client.timeframes().labels().join(", ")
        )));
    }

    fetch_window(client, symbol, timeframe, window, options).await
}

/// Pages through `window` starting at its first millisecond.
///
/// Each request starts one millisecond after the last candle of the previous
/// page. Failed requests are retried on the same cursor per `options.retry`.
pub async fn fetch_window(
    client: &dyn ExchangeClient,
    symbol: &str,
    timeframe: &str,
    window: FetchWindow,
    options: &FetchOptions,
) -> Result<Vec<Candle>> {
    let pause = Duration::from_millis(client.rate_limit());
    let mut all_candles: Vec<Candle> = Vec::new();
    let mut cursor = window.start;
    let mut failures = 0u32;

    while cursor < window.end {
        log::info!(
            "Fetching {} {} candles since {}",
            symbol,
            timeframe,
            format_timestamp(cursor)
        );

        let page = match client
            .fetch_ohlcv(symbol, timeframe, Some(cursor), options.page_limit)
            .await
        {
            Ok(page) => page,
            Err(err) => {
                failures += 1;
                log::error!("Failed to fetch candles (attempt {}): {}", failures, err);
                if !options.retry.allows_retry(failures) {
                    return Err(HistoryError::RetriesExhausted {
                        attempts: failures,
                        last_error: err,
                    });
                }
                sleep(options.retry.delay(failures)).await;
                continue;
            }
        };
        failures = 0;

        let Some(last) = page.last() else {
            log::warn!("No more candles returned, reached the end of available data");
            break;
        };
        log::info!("Received {} candles", page.len());

        let next = last.timestamp + 1;
        all_candles.extend(page);
        // A page that leaves the cursor where it was would be requested forever.
        if next == cursor {
            log::warn!(
                "Exchange returned no candles after {}, stopping",
                format_timestamp(cursor)
            );
            break;
        }
        cursor = next;

        sleep(pause).await;
    }

    let fetched = all_candles.len();
    let candles = dedup_sort_bound(all_candles, window.end);
    log::info!("Collected {} valid candles ({} fetched)", candles.len(), fetched);
    Ok(candles)
}

/// Keeps the first candle of each timestamp, sorts ascending and drops candles after `end`.
pub fn dedup_sort_bound(candles: Vec<Candle>, end: i64) -> Vec<Candle> {
    let mut seen = HashSet::with_capacity(candles.len());
    let mut unique: Vec<Candle> = candles
        .into_iter()
        .filter(|candle| seen.insert(candle.timestamp))
        .collect();
    unique.sort_by_key(|candle| candle.timestamp);
    unique.retain(|candle| candle.timestamp <= end);
    unique
}
