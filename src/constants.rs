use std::time::Duration;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Fallbacks used when neither the caller nor data_config.json names a value.
pub const DEFAULT_SYMBOL: &str = "ETH/USDT";
pub const DEFAULT_TIMEFRAME: &str = "1h";
pub const DEFAULT_EXCHANGE_ID: &str = "okx";

// Values written into a freshly created data_config.json.
pub const CONFIG_TEMPLATE_SYMBOL: &str = "BTC/USDT";

pub const DEFAULT_LOOKBACK_DAYS: i64 = 30;
pub const DEFAULT_TIMEZONE: &str = "UTC";

// Candles requested per page. Exchanges cap this further on their side.
pub const PAGE_LIMIT: usize = 1000;

// Pause after a failed page request before retrying the same cursor.
pub const ERROR_BACKOFF: Duration = Duration::from_secs(10);
pub const MAX_ERROR_BACKOFF: Duration = Duration::from_secs(600);

pub const HTTP_TIMEOUT_MS: u64 = 10_000;

// Number of symbols logged when a requested symbol is missing.
pub const SYMBOL_SAMPLE_SIZE: usize = 10;

pub const DATA_CONFIG_FILE: &str = "data_config.json";
pub const LOG_CONFIG_FILE: &str = "log_config.json";

pub const ROOT_ENV_VAR: &str = "MARKET_HISTORY_ROOT";
