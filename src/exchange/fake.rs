use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;

use super::ExchangeClient;
use crate::{http::client::RequestError, model::Candle, timeframe::TimeframeCatalog};

/// Scripted exchange for the fetcher and pipeline tests.
///
/// Replays queued page responses; once the queue is empty every request gets an empty page.
pub struct FakeExchange {
    timeframes: TimeframeCatalog,
    catalog: Vec<String>,
    symbols: Vec<String>,
    rate_limit: u64,
    pages: Mutex<VecDeque<Result<Vec<Candle>, RequestError>>>,
    requests: Arc<Mutex<Vec<Option<i64>>>>,
}

impl FakeExchange {
    pub fn new(pages: Vec<Result<Vec<Candle>, RequestError>>) -> Self {
        Self {
            timeframes: TimeframeCatalog::from_labels(["1m", "1h", "1d"]).unwrap(),
            catalog: vec!["ETH/USDT".to_string()],
            symbols: Vec::new(),
            rate_limit: 100,
            pages: Mutex::new(pages.into()),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_symbols(mut self, symbols: &[&str]) -> Self {
        self.catalog = symbols.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_timeframes(mut self, labels: &[&str]) -> Self {
        self.timeframes = TimeframeCatalog::from_labels(labels.iter().copied()).unwrap();
        self
    }

    pub fn with_request_log(mut self, requests: Arc<Mutex<Vec<Option<i64>>>>) -> Self {
        self.requests = requests;
        self
    }

    /// `since` of every page request, shared so it stays readable after the client is boxed.
    pub fn request_log(&self) -> Arc<Mutex<Vec<Option<i64>>>> {
        Arc::clone(&self.requests)
    }
}

/// Candle whose prices are derived from its timestamp.
pub fn candle(timestamp: i64) -> Candle {
    let base = 100.0 + timestamp as f64 / 1000.0;
    Candle::new(timestamp, base, base + 2.0, base - 1.0, base + 1.0, 10.0)
}

pub fn page(timestamps: &[i64]) -> Result<Vec<Candle>, RequestError> {
    Ok(timestamps.iter().map(|&t| candle(t)).collect())
}

pub fn failure(message: &str) -> Result<Vec<Candle>, RequestError> {
    Err(RequestError::Other(message.to_string()))
}

#[async_trait]
impl ExchangeClient for FakeExchange {
    fn id(&self) -> &str {
        "fake"
    }

    fn rate_limit(&self) -> u64 {
        self.rate_limit
    }

    fn timeframes(&self) -> &TimeframeCatalog {
        &self.timeframes
    }

    fn symbols(&self) -> &[String] {
        &self.symbols
    }

    async fn load_markets(&mut self) -> Result<(), RequestError> {
        self.symbols = self.catalog.clone();
        Ok(())
    }

    async fn fetch_ohlcv(
        &self,
        _symbol: &str,
        _timeframe: &str,
        since: Option<i64>,
        _limit: usize,
    ) -> Result<Vec<Candle>, RequestError> {
        self.requests.lock().unwrap().push(since);
        self.pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}
