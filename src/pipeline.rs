use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::{
    constants,
    exchange::{
        ExchangeClient,
        options::{OptionMap, default_options, merge_options},
        registry::Registry,
    },
    history::{self, FetchOptions},
    model::{HistoryError, Result, parse_date, parse_timezone},
    store::candle::save_table,
    system::context::AppContext,
};

/// Caller overrides for one download. `None` falls back to the data config,
/// then to the built-in defaults.
#[derive(Debug, Clone, Default)]
pub struct FetchRequest {
    pub symbol: Option<String>,
    pub timeframe: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub exchange_id: Option<String>,
    pub output_dir: Option<PathBuf>,
    /// Overlaid on top of the data config's `exchange_config`.
    pub client_options: Option<OptionMap>,
}

// Argument first, then config, then the fallback.
fn resolve(argument: Option<&str>, config: Option<&str>, fallback: &str) -> String {
    argument.or(config).unwrap_or(fallback).to_string()
}

fn resolve_date(argument: Option<NaiveDate>, config: Option<&str>) -> Result<Option<NaiveDate>> {
    match (argument, config) {
        (Some(date), _) => Ok(Some(date)),
        (None, Some(raw)) => parse_date(raw).map(Some),
        (None, None) => Ok(None),
    }
}

// Relative directories are taken from the runtime root.
fn resolve_output_dir(ctx: &AppContext, argument: Option<&Path>) -> PathBuf {
    match argument.or(ctx.data_config.output_dir.as_deref()) {
        Some(dir) if dir.is_absolute() => dir.to_path_buf(),
        Some(dir) => ctx.paths.runtime_root.join(dir),
        None => ctx.paths.data_path.clone(),
    }
}

fn fetch_options(ctx: &AppContext) -> Result<FetchOptions> {
    let config = &ctx.data_config;
    let timezone = config
        .timezone
        .as_deref()
        .unwrap_or(constants::DEFAULT_TIMEZONE);
    let page_limit = config.page_limit.unwrap_or(constants::PAGE_LIMIT);
    if page_limit == 0 {
        return Err(HistoryError::InvalidParameter(
            "page_limit must be positive".into(),
        ));
    }

    Ok(FetchOptions {
        page_limit,
        retry: config.retry.clone().unwrap_or_default(),
        timezone: parse_timezone(timezone)?,
    })
}

/// Creates the client for `exchange_id` and loads its markets.
pub async fn connect(
    ctx: &AppContext,
    registry: &Registry,
    exchange_id: &str,
    client_options: Option<&OptionMap>,
) -> Result<Box<dyn ExchangeClient>> {
    let empty = OptionMap::new();
    let defaults = default_options();
    let options = merge_options([
        &defaults,
        &ctx.data_config.exchange_config,
        client_options.unwrap_or(&empty),
    ]);

    let mut client = registry.create(exchange_id, &options)?;
    log::info!("Loading markets from {}", exchange_id);
    client.load_markets().await.map_err(|e| {
        log::error!("Failed to load markets from {}: {}", exchange_id, e);
        HistoryError::from(e)
    })?;
    log::info!("Loaded {} symbols from {}", client.symbols().len(), exchange_id);
    Ok(client)
}

/// Downloads the requested history and writes it to `<output_dir>/<symbol>_<timeframe>.csv`.
///
/// The symbol is checked against the exchange catalog before any candle is
/// requested. Returns the absolute path of the written file.
pub async fn fetch_and_save(
    ctx: &AppContext,
    registry: &Registry,
    request: FetchRequest,
) -> Result<PathBuf> {
    let result = run(ctx, registry, request).await;
    if let Err(err) = &result {
        log::error!("Failed to fetch and save history: {}", err);
    }
    result
}

async fn run(ctx: &AppContext, registry: &Registry, request: FetchRequest) -> Result<PathBuf> {
    let config = &ctx.data_config;
    let symbol = resolve(
        request.symbol.as_deref(),
        config.symbol.as_deref(),
        constants::DEFAULT_SYMBOL,
    );
    let timeframe = resolve(
        request.timeframe.as_deref(),
        config.timeframe.as_deref(),
        constants::DEFAULT_TIMEFRAME,
    );
    let exchange_id = resolve(
        request.exchange_id.as_deref(),
        config.exchange_id.as_deref(),
        constants::DEFAULT_EXCHANGE_ID,
    );
    let start_date = resolve_date(request.start_date, config.start_date.as_deref())?;
    let end_date = resolve_date(request.end_date, config.end_date.as_deref())?;
    let output_dir = resolve_output_dir(ctx, request.output_dir.as_deref());
    let options = fetch_options(ctx)?;

    log::info!(
        "Fetching {} {} from {} ({} to {})",
        symbol,
        timeframe,
        exchange_id,
        start_date.map_or_else(|| "default start".to_string(), |d| d.to_string()),
        end_date.map_or_else(|| "now".to_string(), |d| d.to_string()),
    );

    let client = connect(ctx, registry, &exchange_id, request.client_options.as_ref()).await?;

    if !client.symbols().iter().any(|s| *s == symbol) {
        let sample: Vec<&str> = client
            .symbols()
            .iter()
            .take(constants::SYMBOL_SAMPLE_SIZE)
            .map(String::as_str)
            .collect();
        log::error!(
            "Symbol {} not found on {}. Available symbols include: {}",
            symbol,
            exchange_id,
            sample.join(", ")
        );
        return Err(HistoryError::SymbolNotFound {
            symbol,
            exchange_id,
        });
    }

    let candles = history::fetch_full_history(
        client.as_ref(),
        &symbol,
        &timeframe,
        start_date,
        end_date,
        &options,
    )
    .await?;

    let path = save_table(&candles, &symbol, &timeframe, &output_dir)?;
    log::info!("Saved {} candles to {}", candles.len(), path.display());
    Ok(path)
}

/// Up to `limit` symbols of `exchange_id` in catalog order.
pub async fn list_symbols(
    ctx: &AppContext,
    registry: &Registry,
    exchange_id: Option<&str>,
    limit: Option<usize>,
) -> Result<Vec<String>> {
    let exchange_id = resolve(
        exchange_id,
        ctx.data_config.exchange_id.as_deref(),
        constants::DEFAULT_EXCHANGE_ID,
    );
    let client = connect(ctx, registry, &exchange_id, None).await?;
    let limit = limit.unwrap_or(usize::MAX);
    Ok(client.symbols().iter().take(limit).cloned().collect())
}

/// Registered exchange ids with their timeframes, shortest first.
pub fn describe_exchanges(registry: &Registry) -> Result<Vec<(String, Vec<String>)>> {
    registry
        .ids()
        .into_iter()
        .map(|id| {
            let client = registry.create(id, &default_options())?;
            let labels: Vec<String> = client
                .timeframes()
                .labels()
                .into_iter()
                .map(str::to_string)
                .collect();
            Ok::<_, HistoryError>((id.to_string(), labels))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::{
        fs,
        sync::{Arc, Mutex},
    };

    use serde_json::json;
    use tempfile::{TempDir, tempdir};

    use super::*;
    use crate::{
        config::DataConfig,
        exchange::{
            fake::{FakeExchange, page},
            options::ExchangeOptions,
        },
        system::paths::SystemPaths,
    };

    const JULY_1: i64 = 1_625_097_600_000;
    const HOUR_MS: i64 = 3_600_000;

    struct Harness {
        _dir: TempDir,
        ctx: AppContext,
        registry: Registry,
        requests: Arc<Mutex<Vec<Option<i64>>>>,
        seen_options: Arc<Mutex<Vec<ExchangeOptions>>>,
    }

    // Registry whose only exchange, `fake`, serves one page per entry of `pages`.
    fn harness(
        data_config: DataConfig,
        symbols: &'static [&'static str],
        pages: Vec<Vec<i64>>,
    ) -> Harness {
        let dir = tempdir().unwrap();
        let paths = SystemPaths::new(dir.path()).unwrap();
        let ctx = AppContext {
            config: crate::config::ConfigManager::new(&paths.config_path),
            paths,
            data_config,
        };

        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen_options = Arc::new(Mutex::new(Vec::new()));
        let mut registry = Registry::empty();
        {
            let requests = Arc::clone(&requests);
            let seen_options = Arc::clone(&seen_options);
            registry.register("fake", move |options: &ExchangeOptions| {
                seen_options.lock().unwrap().push(options.clone());
                let pages = pages.iter().map(|stamps| page(stamps)).collect();
                let client = FakeExchange::new(pages)
                    .with_symbols(symbols)
                    .with_request_log(Arc::clone(&requests));
                Ok(Box::new(client) as Box<dyn ExchangeClient>)
            });
        }

        Harness {
            _dir: dir,
            ctx,
            registry,
            requests,
            seen_options,
        }
    }

    fn fake_config() -> DataConfig {
        DataConfig {
            exchange_id: Some("fake".into()),
            symbol: Some("ETH/USDT".into()),
            timeframe: Some("1h".into()),
            start_date: Some("2021-07-01".into()),
            end_date: Some("2021-07-02".into()),
            ..DataConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn missing_symbol_fails_without_fetching() {
        let h = harness(fake_config(), &["ETH/USDT"], vec![vec![JULY_1]]);
        let request = FetchRequest {
            symbol: Some("BTC/USDT".into()),
            ..FetchRequest::default()
        };

        let err = fetch_and_save(&h.ctx, &h.registry, request).await.unwrap_err();

        match err {
            HistoryError::SymbolNotFound {
                symbol,
                exchange_id,
            } => {
                assert_eq!(symbol, "BTC/USDT");
                assert_eq!(exchange_id, "fake");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(h.requests.lock().unwrap().is_empty());
        assert_eq!(fs::read_dir(&h.ctx.paths.data_path).unwrap().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn writes_the_history_from_the_data_config() {
        let h = harness(
            fake_config(),
            &["BTC/USDT", "ETH/USDT"],
            vec![vec![JULY_1], vec![JULY_1 + HOUR_MS]],
        );

        let path = fetch_and_save(&h.ctx, &h.registry, FetchRequest::default())
            .await
            .unwrap();

        assert_eq!(path, h.ctx.paths.data_path.join("ETH-USDT_1h.csv"));
        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("1625097600000,"));
        assert!(lines[2].starts_with("1625101200000,"));
        assert_eq!(
            *h.requests.lock().unwrap(),
            vec![Some(JULY_1), Some(JULY_1 + 1), Some(JULY_1 + HOUR_MS + 1)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn arguments_override_the_data_config() {
        let h = harness(fake_config(), &["ETH/USDT", "SOL/USDT"], vec![vec![JULY_1 + HOUR_MS]]);
        let output_dir = h.ctx.paths.runtime_root.join("custom");
        let request = FetchRequest {
            symbol: Some("SOL/USDT".into()),
            timeframe: Some("1d".into()),
            start_date: Some(NaiveDate::from_ymd_opt(2021, 7, 1).unwrap()),
            end_date: Some(NaiveDate::from_ymd_opt(2021, 7, 3).unwrap()),
            output_dir: Some(output_dir.clone()),
            ..FetchRequest::default()
        };

        let path = fetch_and_save(&h.ctx, &h.registry, request).await.unwrap();

        assert_eq!(path, output_dir.join("SOL-USDT_1d.csv"));
        assert_eq!(h.requests.lock().unwrap()[0], Some(JULY_1));
    }

    #[tokio::test(start_paused = true)]
    async fn client_options_layer_over_the_config() {
        let mut config = fake_config();
        config.exchange_config = json!({"timeout": 5000, "rateLimit": 250})
            .as_object()
            .cloned()
            .unwrap();
        let h = harness(config, &["ETH/USDT"], Vec::new());
        let request = FetchRequest {
            client_options: json!({"rateLimit": 500}).as_object().cloned(),
            ..FetchRequest::default()
        };

        fetch_and_save(&h.ctx, &h.registry, request).await.unwrap();

        let seen = h.seen_options.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].enable_rate_limit);
        assert_eq!(seen[0].rate_limit, Some(500));
        assert_eq!(seen[0].timeout.as_millis(), 5000);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_history_still_writes_a_header() {
        let h = harness(fake_config(), &["ETH/USDT"], Vec::new());

        let path = fetch_and_save(&h.ctx, &h.registry, FetchRequest::default())
            .await
            .unwrap();

        assert_eq!(
            fs::read_to_string(path).unwrap(),
            "timestamp,open,high,low,close,volume,datetime\n"
        );
        assert_eq!(h.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_exchange_is_a_client_init_error() {
        let h = harness(fake_config(), &["ETH/USDT"], Vec::new());
        let request = FetchRequest {
            exchange_id: Some("nowhere".into()),
            ..FetchRequest::default()
        };

        let err = fetch_and_save(&h.ctx, &h.registry, request).await.unwrap_err();

        assert!(matches!(err, HistoryError::ClientInit(_)));
        assert!(h.seen_options.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_config_date_is_invalid() {
        let mut config = fake_config();
        config.start_date = Some("July 1st".into());
        let h = harness(config, &["ETH/USDT"], Vec::new());

        let err = fetch_and_save(&h.ctx, &h.registry, FetchRequest::default())
            .await
            .unwrap_err();

        assert!(matches!(err, HistoryError::InvalidParameter(_)));
        assert!(h.seen_options.lock().unwrap().is_empty());
    }

    #[test]
    fn relative_output_dir_is_under_the_runtime_root() {
        let mut config = fake_config();
        config.output_dir = Some(PathBuf::from("exports"));
        let h = harness(config, &["ETH/USDT"], Vec::new());

        assert_eq!(
            resolve_output_dir(&h.ctx, None),
            h.ctx.paths.runtime_root.join("exports")
        );
        assert_eq!(
            resolve_output_dir(&h.ctx, Some(Path::new("/tmp/elsewhere"))),
            PathBuf::from("/tmp/elsewhere")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn lists_a_limited_number_of_symbols() {
        let h = harness(fake_config(), &["ADA/USDT", "BTC/USDT", "ETH/USDT"], Vec::new());

        let symbols = list_symbols(&h.ctx, &h.registry, None, Some(2)).await.unwrap();

        assert_eq!(symbols, vec!["ADA/USDT", "BTC/USDT"]);
    }

    #[test]
    fn describes_registered_exchanges() {
        let h = harness(fake_config(), &["ETH/USDT"], Vec::new());

        let described = describe_exchanges(&h.registry).unwrap();

        assert_eq!(
            described,
            vec![(
                "fake".to_string(),
                vec!["1m".to_string(), "1h".to_string(), "1d".to_string()]
            )]
        );
    }
}
