// Main function for the market history downloader.
// HTTP client module.
mod http {
    // HTTP client implementation.
    pub mod client;
    // Loopback server for client tests.
    #[cfg(test)]
    pub mod stub;
}
// Exchange clients and their registry.
mod exchange;
// Paginated history download.
mod history;
// Fetch-and-save orchestration.
mod pipeline;
// Data models.
mod model;
// Timeframe labels and durations.
mod timeframe;
// Data storage module.
mod store {
    /// Candle CSV tables.
    pub mod candle;
}
// Runtime directories and shared context.
mod system {
    /// Runtime directory layout.
    pub mod paths;
    /// Paths plus loaded configuration.
    pub mod context;
}
// JSON configuration files.
mod config;
// Logger setup.
mod logger;
// module storing defaults
mod constants;

use std::{path::PathBuf, process::ExitCode};

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde_json::Value;

use exchange::{options::OptionMap, registry::Registry};
use logger::LogConfig;
use pipeline::FetchRequest;
use system::{context::AppContext, paths::SystemPaths};

// Command-line argument parser.
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Download OHLCV candle history from crypto exchanges",
    long_about = None
)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,
}

// Subcommands for the application. Without one, `fetch` runs on the data config.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Download candle history and save it as CSV.
    Fetch(FetchArgs),
    /// Create the runtime directories and default config files.
    Init,
    /// List the symbols an exchange trades.
    Symbols {
        #[arg(long)]
        exchange: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// List the supported exchanges and their timeframes.
    Exchanges,
}

#[derive(clap::Args, Debug, Default)]
struct FetchArgs {
    /// Unified symbol, e.g. ETH/USDT.
    #[arg(long)]
    symbol: Option<String>,
    /// Candle timeframe, e.g. 1h.
    #[arg(long)]
    timeframe: Option<String>,
    /// First day to fetch (YYYY-MM-DD).
    #[arg(long, value_parser = date_arg)]
    start: Option<NaiveDate>,
    /// Day to stop at (YYYY-MM-DD).
    #[arg(long, value_parser = date_arg)]
    end: Option<NaiveDate>,
    #[arg(long)]
    exchange: Option<String>,
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Exchange client option as key=value; repeatable.
    #[arg(long = "option", value_parser = option_arg)]
    options: Vec<(String, Value)>,
}

impl From<FetchArgs> for FetchRequest {
    fn from(args: FetchArgs) -> Self {
        let client_options = if args.options.is_empty() {
            None
        } else {
            Some(args.options.into_iter().collect::<OptionMap>())
        };
        FetchRequest {
            symbol: args.symbol,
            timeframe: args.timeframe,
            start_date: args.start,
            end_date: args.end,
            exchange_id: args.exchange,
            output_dir: args.output_dir,
            client_options,
        }
    }
}

fn date_arg(raw: &str) -> Result<NaiveDate, String> {
    model::parse_date(raw).map_err(|e| e.to_string())
}

// Values that parse as JSON keep their type, anything else is a string.
fn option_arg(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {:?}", raw))?;
    if key.trim().is_empty() {
        return Err(format!("missing option name in {:?}", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.trim().to_string(), value))
}

async fn run(command: Commands, ctx: &AppContext, registry: &Registry) -> model::Result<()> {
    match command {
        Commands::Fetch(args) => {
            let path = pipeline::fetch_and_save(ctx, registry, args.into()).await?;
            log::info!("Data saved to {}", path.display());
        }

        Commands::Init => {
            let data_config = ctx.config.ensure_data_config()?;
            let log_config = ctx
                .config
                .ensure_config(constants::LOG_CONFIG_FILE, &LogConfig::default())?;
            log::info!("Config directory: {}", ctx.config.config_dir().display());
            log::info!("Data config: {}", data_config.display());
            log::info!("Log config: {}", log_config.display());
        }

        Commands::Symbols { exchange, limit } => {
            let symbols =
                pipeline::list_symbols(ctx, registry, exchange.as_deref(), limit).await?;
            for symbol in &symbols {
                println!("{}", symbol);
            }
            log::info!("Listed {} symbols", symbols.len());
        }

        Commands::Exchanges => {
            for (id, timeframes) in pipeline::describe_exchanges(registry)? {
                println!("{}: {}", id, timeframes.join(", "));
            }
        }
    }
    Ok(())
}

#[tokio::main]
// Main function entry point.
async fn main() -> ExitCode {
    dotenv().ok();

    let args = Args::parse();

    let paths = match SystemPaths::discover() {
        Ok(paths) => paths,
        Err(err) => {
            eprintln!("Error preparing runtime directories: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let log_config = LogConfig::load(&paths.config_path.join(constants::LOG_CONFIG_FILE));
    match logger::init(&paths.log_path, &log_config) {
        Ok(Some(file)) => log::info!("Logging to {}", file.display()),
        Ok(None) => {}
        Err(err) => eprintln!("Error opening log file: {}", err),
    }
    log::info!("market_history {}", constants::VERSION);
    paths.log_summary();

    let ctx = match AppContext::load(paths) {
        Ok(ctx) => ctx,
        Err(err) => {
            log::error!("Error loading configuration: {}", err);
            return ExitCode::FAILURE;
        }
    };
    let registry = Registry::default();

    let command = args
        .command
        .unwrap_or_else(|| Commands::Fetch(FetchArgs::default()));
    match run(command, &ctx, &registry).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
