use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use super::{ExchangeClient, MarketIndex, options::ExchangeOptions, parse_decimal};
use crate::{
    http::client::{self, RequestError, Throttle},
    model::Candle,
    timeframe::TimeframeCatalog,
};

pub const ID: &str = "okx";

// Base URL for the OKX v5 REST API.
const BASE_URL: &str = "https://www.okx.com/";

const RATE_LIMIT_MS: u64 = 100;

// history-candles returns at most 100 rows per call.
const MAX_PAGE: usize = 100;

lazy_static::lazy_static! {
    // Unified timeframe label to OKX `bar` value. Daily and longer bars use UTC buckets.
    static ref BARS: HashMap<&'static str, &'static str> = HashMap::from([
        ("1m", "1m"),
        ("3m", "3m"),
        ("5m", "5m"),
        ("15m", "15m"),
        ("30m", "30m"),
        ("1h", "1H"),
        ("2h", "2H"),
        ("4h", "4H"),
        ("6h", "6Hutc"),
        ("12h", "12Hutc"),
        ("1d", "1Dutc"),
        ("1w", "1Wutc"),
        ("1M", "1Mutc"),
    ]);
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Instrument {
    inst_id: String,
    base_ccy: String,
    quote_ccy: String,
    #[serde(default)]
    state: Option<String>,
}

impl Instrument {
    fn is_live(&self) -> bool {
        self.state.as_deref().is_none_or(|state| state == "live")
    }
}

// Checks the code returned by the API and returns an error if it is not "0".
fn check_code(code: &str, msg: &str) -> Result<(), RequestError> {
    match code {
        "0" => Ok(()),
        _ => Err(RequestError::Api {
            code: code.to_string(),
            message: if msg.is_empty() {
                "Unknown error".into()
            } else {
                msg.to_string()
            },
        }),
    }
}

// Row layout: [ts, o, h, l, c, vol, volCcy, volCcyQuote, confirm]
fn parse_candle(row: &[String]) -> Result<Candle, RequestError> {
    if row.len() < 6 {
        return Err(RequestError::JsonError(format!(
            "candle row has {} fields, expected at least 6",
            row.len()
        )));
    }
    let timestamp = row[0]
        .parse::<i64>()
        .map_err(|_| RequestError::JsonError(format!("invalid timestamp {:?}", row[0])))?;
    Ok(Candle::new(
        timestamp,
        parse_decimal(&row[1], "open")?,
        parse_decimal(&row[2], "high")?,
        parse_decimal(&row[3], "low")?,
        parse_decimal(&row[4], "close")?,
        parse_decimal(&row[5], "volume")?,
    ))
}

/// Public market data client for OKX spot markets.
pub struct OkxClient {
    http: reqwest::Client,
    base: Url,
    rate_limit: u64,
    throttle: Throttle,
    timeframes: TimeframeCatalog,
    markets: MarketIndex,
}

impl OkxClient {
    pub fn new(options: &ExchangeOptions) -> Result<Self, String> {
        let timeframes = TimeframeCatalog::from_labels(BARS.keys().copied())?;
        Ok(Self {
            http: client::build_client(options.timeout).map_err(|e| e.to_string())?,
            base: options.base_url_or(BASE_URL)?,
            rate_limit: options.effective_rate_limit(RATE_LIMIT_MS),
            throttle: Throttle::new(options.throttle_interval(RATE_LIMIT_MS)),
            timeframes,
            markets: MarketIndex::default(),
        })
    }

    pub fn connect(options: &ExchangeOptions) -> Result<Box<dyn ExchangeClient>, String> {
        Ok(Box::new(Self::new(options)?))
    }

    fn instrument_id(&self, symbol: &str) -> String {
        self.markets
            .native_id(symbol)
            .map(str::to_string)
            .unwrap_or_else(|| symbol.replace('/', "-"))
    }
}

#[async_trait]
impl ExchangeClient for OkxClient {
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
        let resp = client::get::<Envelope<Instrument>>(
            &self.http,
            &self.base,
            "api/v5/public/instruments",
            &[("instType", "SPOT".to_string())],
            &[],
        )
        .await?;
        check_code(&resp.code, &resp.msg)?;

        self.markets = MarketIndex::from_pairs(
            resp.data
                .into_iter()
                .filter(Instrument::is_live)
                .map(|inst| (format!("{}/{}", inst.base_ccy, inst.quote_ccy), inst.inst_id)),
        );
        log::debug!("okx: loaded {} spot markets", self.markets.symbols().len());
        Ok(())
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: &str,
        since: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Candle>, RequestError> {
        let bar = BARS
            .get(timeframe)
            .ok_or_else(|| RequestError::Other(format!("okx does not support {}", timeframe)))?;
        let limit = limit.clamp(1, MAX_PAGE);

        let mut params = vec![
            ("instId", self.instrument_id(symbol)),
            ("bar", bar.to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(since) = since {
            // `before` alone returns the newest rows, so bound the page on both sides.
            let duration = self.timeframes.duration_ms(timeframe).unwrap_or_default();
            let start = (since - 1).max(0);
            params.push(("before", start.to_string()));
            params.push(("after", (start + duration * limit as i64).to_string()));
        }

        self.throttle.wait().await;
        let resp = client::get::<Envelope<Vec<String>>>(
            &self.http,
            &self.base,
            "api/v5/market/history-candles",
            &params,
            &[],
        )
        .await?;
        check_code(&resp.code, &resp.msg)?;

        let mut candles = resp
            .data
            .iter()
            .map(|row| parse_candle(row))
            .collect::<Result<Vec<_>, _>>()?;
        // OKX answers newest first.
        candles.reverse();
        Ok(candles)
    }
}
