use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use super::{ExchangeClient, MarketIndex, options::ExchangeOptions, parse_decimal};
use crate::{
    http::client::{self, RequestError, Throttle},
    model::Candle,
    timeframe::TimeframeCatalog,
};

pub const ID: &str = "binance";

const BASE_URL: &str = "https://api.binance.com/";

const RATE_LIMIT_MS: u64 = 50;

const MAX_PAGE: usize = 1000;

// Binance uses the unified labels verbatim as `interval`.
const INTERVALS: &[&str] = &[
    "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w", "1M",
];

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    symbol: String,
    base_asset: String,
    quote_asset: String,
    // Delisted and halted pairs report something other than TRADING.
    #[serde(default)]
    status: Option<String>,
}

impl SymbolInfo {
    fn is_trading(&self) -> bool {
        self.status.as_deref().is_none_or(|status| status == "TRADING")
    }
}

// Row layout: [openTime, o, h, l, c, v, closeTime, quoteVolume, trades, ...]
fn parse_kline(row: &[Value]) -> Result<Candle, RequestError> {
    if row.len() < 6 {
        return Err(RequestError::JsonError(format!(
            "kline row has {} fields, expected at least 6",
            row.len()
        )));
    }
    let timestamp = row[0]
        .as_i64()
        .ok_or_else(|| RequestError::JsonError(format!("invalid open time {}", row[0])))?;
    let field = |idx: usize, name: &str| -> Result<f64, RequestError> {
        match &row[idx] {
            Value::String(s) => parse_decimal(s, name),
            Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| RequestError::JsonError(format!("invalid {} value {}", name, n))),
            other => Err(RequestError::JsonError(format!(
                "invalid {} value {}",
                name, other
            ))),
        }
    };
    Ok(Candle::new(
        timestamp,
        field(1, "open")?,
        field(2, "high")?,
        field(3, "low")?,
        field(4, "close")?,
        field(5, "volume")?,
    ))
}

/// Public market data client for Binance spot markets.
pub struct BinanceClient {
    http: reqwest::Client,
    base: Url,
    rate_limit: u64,
    throttle: Throttle,
    timeframes: TimeframeCatalog,
    markets: MarketIndex,
}

impl BinanceClient {
    pub fn new(options: &ExchangeOptions) -> Result<Self, String> {
        Ok(Self {
            http: client::build_client(options.timeout).map_err(|e| e.to_string())?,
            base: options.base_url_or(BASE_URL)?,
            rate_limit: options.effective_rate_limit(RATE_LIMIT_MS),
            throttle: Throttle::new(options.throttle_interval(RATE_LIMIT_MS)),
            timeframes: TimeframeCatalog::from_labels(INTERVALS.iter().copied())?,
            markets: MarketIndex::default(),
        })
    }

    pub fn connect(options: &ExchangeOptions) -> Result<Box<dyn ExchangeClient>, String> {
        Ok(Box::new(Self::new(options)?))
    }

    fn market_id(&self, symbol: &str) -> String {
        self.markets
            .native_id(symbol)
            .map(str::to_string)
            .unwrap_or_else(|| symbol.replace('/', ""))
    }
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    fn id(&self) -> &str {
        ID
    }

    fn rate_limit(&self) -> u64 {
        self.rate_limit
    }

    fn timeframes(&self) -> &TimeframeCatalog {
        &self.timeframes
    }

    fn symbols(&self) -> &[String] {
        self.markets.symbols()
    }

    async fn load_markets(&mut self) -> Result<(), RequestError> {
        self.throttle.wait().await;
        let info = client::get::<ExchangeInfo>(
            &self.http,
            &self.base,
            "api/v3/exchangeInfo",
            &[],
            &[],
        )
        .await?;

        self.markets = MarketIndex::from_pairs(
            info.symbols
                .into_iter()
                .filter(SymbolInfo::is_trading)
                .map(|s| (format!("{}/{}", s.base_asset, s.quote_asset), s.symbol)),
        );
        log::debug!("binance: loaded {} spot markets", self.markets.symbols().len());
        Ok(())
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: &str,
        since: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Candle>, RequestError> {
        if !self.timeframes.contains(timeframe) {
            return Err(RequestError::Other(format!(
                "binance does not support {}",
                timeframe
            )));
        }
        let mut params = vec![
            ("symbol", self.market_id(symbol)),
            ("interval", timeframe.to_string()),
            ("limit", limit.clamp(1, MAX_PAGE).to_string()),
        ];
        if let Some(since) = since {
            params.push(("startTime", since.to_string()));
        }

        self.throttle.wait().await;
        let rows = client::get::<Vec<Vec<Value>>>(
            &self.http,
            &self.base,
            "api/v3/klines",
            &params,
            &[],
        )
        .await?;

        rows.iter().map(|row| parse_kline(row)).collect()
    }
}
