use std::collections::HashMap;

use async_trait::async_trait;

use crate::{http::client::RequestError, model::Candle, timeframe::TimeframeCatalog};

pub mod binance;
#[cfg(test)]
pub mod fake;
pub mod okx;
pub mod options;
pub mod registry;

/// Market data capabilities the history fetcher needs from an exchange.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Registry id of the exchange, e.g. `okx`.
    fn id(&self) -> &str;

    /// Minimum delay between requests mandated by the exchange, in milliseconds.
    fn rate_limit(&self) -> u64;

    fn timeframes(&self) -> &TimeframeCatalog;

    /// Unified symbols (`BASE/QUOTE`). Empty until [`load_markets`](Self::load_markets) succeeds.
    fn symbols(&self) -> &[String];

    async fn load_markets(&mut self) -> Result<(), RequestError>;

    /// Fetches up to `limit` candles starting at `since` (ms), oldest first.
    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: &str,
        since: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Candle>, RequestError>;
}

/// Unified symbols of an exchange and their native instrument ids.
#[derive(Debug, Default)]
pub struct MarketIndex {
    symbols: Vec<String>,
    native_ids: HashMap<String, String>,
}

impl MarketIndex {
    /// Builds the index from `(unified, native)` pairs. Symbols are kept sorted.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let native_ids: HashMap<String, String> = pairs.into_iter().collect();
        let mut symbols: Vec<String> = native_ids.keys().cloned().collect();
        symbols.sort();
        Self {
            symbols,
            native_ids,
        }
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn native_id(&self, symbol: &str) -> Option<&str> {
        self.native_ids.get(symbol).map(String::as_str)
    }
}

// Parses a numeric field that exchanges send as a JSON string.
pub(crate) fn parse_decimal(raw: &str, field: &str) -> Result<f64, RequestError> {
    raw.parse::<f64>()
        .map_err(|_| RequestError::JsonError(format!("invalid {} value {:?}", field, raw)))
}
