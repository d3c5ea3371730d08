use crate::cache::indicator_cache::IndicatorCache;
use crate::cache::price_cache::PriceCache;
use crate::cache::redis::RedisStore;
use crate::config::{Settings, StorageBackend};
use crate::database::file_store::FileStore;
use crate::database::memory::MemoryStore;
use crate::database::store::SharedStore;
use crate::indicators::rsi::{PriceSource, RsiOptions};
use crate::indicators::ta::Smoothing;
use crate::models::{normalize_symbol, Timeframe};
use crate::processor::feed::JsonFileFeed;
use crate::processor::job::IndicatorJob;
use crate::processor::pipeline::IndicatorPipeline;
use crate::utils::clock::SystemClock;
use crate::utils::utils::format_timestamp;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "candle-indicator-cache")]
#[command(about = "Cached candle aggregation and RSI for stock price series", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to ./candle-indicator-cache.{toml,json,yaml})
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch full history from the feed and replace the cached series
    Import {
        /// Symbols (e.g., "AAPL")
        #[arg(required = true)]
        symbols: Vec<String>,
    },

    /// Append the feed's latest points to the cached series
    Refresh {
        #[arg(required = true)]
        symbols: Vec<String>,
    },

    /// Print candles for a symbol
    Candles {
        symbol: String,

        /// day, week or month
        #[arg(short, long, default_value = "day")]
        timeframe: Timeframe,
    },

    /// Print RSI, signal line and crossovers for a symbol
    Rsi {
        symbol: String,

        #[arg(short, long, default_value = "day")]
        timeframe: Timeframe,

        #[command(flatten)]
        overrides: RsiOverrides,
    },

    /// Compute RSI for many symbols and timeframes in parallel
    Batch {
        /// JSON file holding an array of jobs
        #[arg(short, long, conflicts_with = "symbols")]
        file: Option<PathBuf>,

        /// Symbols to run with the configured RSI settings
        symbols: Vec<String>,

        /// Timeframes to run for each symbol (defaults to all)
        #[arg(short, long, value_delimiter = ',')]
        timeframes: Vec<Timeframe>,

        /// Worker threads (defaults to the configured value)
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Drop cached data for a symbol, or everything
    Clear {
        /// Omit to clear every symbol
        symbol: Option<String>,

        /// Keep the price series, clear indicators only
        #[arg(long)]
        indicators_only: bool,
    },

    /// Remove expired and unreadable cache entries
    Purge,
}

/// Per-invocation overrides of the configured RSI settings.
#[derive(Args, Default)]
pub struct RsiOverrides {
    #[arg(long)]
    pub period: Option<usize>,

    /// close, hlc3, hl2 or ohlc4
    #[arg(long)]
    pub source: Option<PriceSource>,

    /// wilder, ema or sma
    #[arg(long)]
    pub smoothing: Option<Smoothing>,

    #[arg(long)]
    pub signal_period: Option<usize>,

    /// Decimal digits to round values to
    #[arg(long)]
    pub precision: Option<u32>,

    /// Let degenerate windows fall through to the raw formula
    #[arg(long)]
    pub no_clamp: bool,
}

impl RsiOverrides {
    pub fn apply(&self, base: RsiOptions, signal_period: usize) -> Result<(RsiOptions, usize)> {
        let options = RsiOptions {
            period: self.period.unwrap_or(base.period),
            source: self.source.unwrap_or(base.source),
            smoothing: self.smoothing.unwrap_or(base.smoothing),
            clamp_edges: base.clamp_edges && !self.no_clamp,
            precision: self.precision.or(base.precision),
        };
        let signal_period = self.signal_period.unwrap_or(signal_period);

        anyhow::ensure!(options.period > 0, "--period must be greater than 0");
        anyhow::ensure!(signal_period > 0, "--signal-period must be greater than 0");
        Ok((options, signal_period))
    }
}

/// Open the configured key-value backend.
pub fn create_store(settings: &Settings) -> Result<SharedStore> {
    let store: SharedStore = match settings.storage.backend {
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
        StorageBackend::File => Arc::new(
            FileStore::open(&settings.storage.path).with_context(|| {
                format!("Failed to open cache directory {}", settings.storage.path.display())
            })?,
        ),
        StorageBackend::Redis => {
            // Redis expiry backs up the caches' own TTL checks
            let ttl = settings.price_ttl().max(settings.indicator_ttl()).to_std().ok();
            Arc::new(
                RedisStore::connect(&settings.storage.redis_url, ttl)
                    .context("Failed to connect to Redis")?,
            )
        }
    };

    info!("Using {:?} cache backend", settings.storage.backend);
    Ok(store)
}

/// Wire feed, caches and calendar zone from settings.
pub fn create_pipeline(settings: &Settings) -> Result<IndicatorPipeline> {
    let store = create_store(settings)?;
    let clock = Arc::new(SystemClock);

    let prices = PriceCache::new(store.clone(), clock.clone(), settings.price_ttl());
    let indicators = IndicatorCache::new(store, clock, settings.indicator_ttl());
    let feed = Arc::new(JsonFileFeed::new(&settings.feed.dir));

    Ok(IndicatorPipeline::new(feed, prices, indicators, settings.calendar.zone()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Execute a command from the CLI
pub fn execute_command(settings: &Settings, command: Commands) -> Result<()> {
    let pipeline = create_pipeline(settings)?;

    match command {
        Commands::Import { symbols } => {
            let mut imported = Vec::with_capacity(symbols.len());
            for symbol in &symbols {
                let series = pipeline.import(symbol)?;
                imported.push(json!({
                    "symbol": series.symbol,
                    "points": series.len(),
                    "from": series.range_from,
                    "to": series.range_to,
                    "last_updated": format_timestamp(series.last_updated),
                }));
            }
            print_json(&imported)?;
        }

        Commands::Refresh { symbols } => {
            let mut refreshed = Vec::with_capacity(symbols.len());
            for symbol in &symbols {
                let outcome = pipeline.refresh(symbol)?;
                refreshed.push(json!({
                    "symbol": normalize_symbol(symbol),
                    "outcome": format!("{:?}", outcome),
                }));
            }
            print_json(&refreshed)?;
        }

        Commands::Candles { symbol, timeframe } => {
            let candles = pipeline.candles(&symbol, timeframe)?;
            print_json(&json!({
                "symbol": normalize_symbol(&symbol),
                "timeframe": timeframe,
                "candles": candles,
            }))?;
        }

        Commands::Rsi {
            symbol,
            timeframe,
            overrides,
        } => {
            let (options, signal_period) =
                overrides.apply(settings.rsi.options(), settings.rsi.signal_period)?;
            let job = IndicatorJob::new(&symbol, timeframe, options, signal_period);
            let result = pipeline.rsi(&job)?;
            print_json(&json!({
                "symbol": job.symbol,
                "timeframe": timeframe,
                "options": options,
                "signal_period": signal_period,
                "latest": result.latest(),
                "result": result,
            }))?;
        }

        Commands::Batch {
            file,
            symbols,
            timeframes,
            workers,
        } => {
            let timeframes = if timeframes.is_empty() {
                Timeframe::all().to_vec()
            } else {
                timeframes
            };
            let jobs: Vec<IndicatorJob> = match file {
                Some(path) => {
                    let raw = std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read job file {}", path.display()))?;
                    serde_json::from_str(&raw)
                        .with_context(|| format!("Invalid job file {}", path.display()))?
                }
                None => symbols
                    .iter()
                    .flat_map(|symbol| {
                        timeframes.iter().map(move |&timeframe| {
                            IndicatorJob::new(
                                symbol,
                                timeframe,
                                settings.rsi.options(),
                                settings.rsi.signal_period,
                            )
                        })
                    })
                    .collect(),
            };

            let reports = pipeline.run_batch(&jobs, workers.unwrap_or(settings.workers))?;
            print_json(&reports)?;
        }

        Commands::Clear {
            symbol,
            indicators_only,
        } => {
            let (indicators, prices) = match symbol {
                Some(symbol) => {
                    let indicators = pipeline.indicators().clear_symbol(&symbol);
                    let prices = !indicators_only && pipeline.prices().invalidate(&symbol);
                    (indicators, prices as usize)
                }
                None => {
                    let indicators = pipeline.indicators().clear_all();
                    let prices = if indicators_only {
                        0
                    } else {
                        pipeline
                            .prices()
                            .symbols()
                            .iter()
                            .filter(|s| pipeline.prices().invalidate(s))
                            .count()
                    };
                    (indicators, prices)
                }
            };
            print_json(&json!({
                "indicator_entries_removed": indicators,
                "price_series_removed": prices,
            }))?;
        }

        Commands::Purge => {
            let prices = pipeline.prices().purge_expired();
            let indicators = pipeline.indicators().purge_expired();
            print_json(&json!({
                "indicator_entries_removed": indicators,
                "price_series_removed": prices,
            }))?;
        }
    }

    Ok(())
}
