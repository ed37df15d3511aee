use std::time::Duration;

use serde_json::{Map, Value};
use url::Url;

use crate::constants;

/// Free-form client options, as found under `exchange_config`.
pub type OptionMap = Map<String, Value>;

/// Options every client starts from before configuration is layered on top.
pub fn default_options() -> OptionMap {
    let mut options = OptionMap::new();
    options.insert("enableRateLimit".into(), Value::Bool(true));
    options
}

/// Overlays `layers` in order; keys of later layers win.
pub fn merge_options<'a, I>(layers: I) -> OptionMap
where
    I: IntoIterator<Item = &'a OptionMap>,
{
    let mut merged = OptionMap::new();
    for layer in layers {
        for (key, value) in layer {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Typed view of the option keys the clients understand.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeOptions {
    pub enable_rate_limit: bool,
    /// Overrides the exchange's own rate limit (ms).
    pub rate_limit: Option<u64>,
    pub timeout: Duration,
    /// Overrides the exchange's API host.
    pub base_url: Option<Url>,
}

impl Default for ExchangeOptions {
    fn default() -> Self {
        Self {
            enable_rate_limit: true,
            rate_limit: None,
            timeout: Duration::from_millis(constants::HTTP_TIMEOUT_MS),
            base_url: None,
        }
    }
}

impl ExchangeOptions {
    /// Reads the known keys from `map`. Unknown keys are ignored.
    pub fn from_map(map: &OptionMap) -> Result<Self, String> {
        let mut options = Self::default();
        if let Some(value) = map.get("enableRateLimit") {
            options.enable_rate_limit = value
                .as_bool()
                .ok_or_else(|| format!("enableRateLimit must be a boolean, got {}", value))?;
        }
        if let Some(value) = map.get("rateLimit") {
            options.rate_limit = Some(millis(value, "rateLimit")?);
        }
        if let Some(value) = map.get("timeout") {
            options.timeout = Duration::from_millis(millis(value, "timeout")?);
        }
        if let Some(value) = map.get("baseUrl").or_else(|| map.get("hostname")) {
            let raw = value
                .as_str()
                .ok_or_else(|| format!("baseUrl must be a string, got {}", value))?;
            let raw = if raw.contains("://") {
                raw.to_string()
            } else {
                format!("https://{}", raw)
            };
            let url = Url::parse(&raw).map_err(|e| format!("invalid baseUrl {}: {}", raw, e))?;
            options.base_url = Some(url);
        }
        Ok(options)
    }

    /// Rate limit to report for an exchange whose own limit is `exchange_default`.
    pub fn effective_rate_limit(&self, exchange_default: u64) -> u64 {
        self.rate_limit.unwrap_or(exchange_default)
    }

    /// Interval the client-side throttle enforces between HTTP requests.
    pub fn throttle_interval(&self, exchange_default: u64) -> Duration {
        if self.enable_rate_limit {
            Duration::from_millis(self.effective_rate_limit(exchange_default))
        } else {
            Duration::ZERO
        }
    }

    /// API base URL, with a trailing slash so relative paths join below it.
    pub fn base_url_or(&self, exchange_default: &str) -> Result<Url, String> {
        let mut url = match &self.base_url {
            Some(url) => url.clone(),
            None => Url::parse(exchange_default).map_err(|e| e.to_string())?,
        };
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }
}

fn millis(value: &Value, key: &str) -> Result<u64, String> {
    value
        .as_u64()
        .ok_or_else(|| format!("{} must be a non-negative integer (ms), got {}", key, value))
}
