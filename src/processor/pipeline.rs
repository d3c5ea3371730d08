use crate::cache::indicator_cache::IndicatorCache;
use crate::cache::price_cache::{AppendOutcome, PriceCache};
use crate::indicators::calculator::{IndicatorEngine, RsiCalculator};
use crate::indicators::rsi::RsiResult;
use crate::models::{normalize_symbol, Candle, CachedSeries, Timeframe};
use crate::processor::aggregator::CalendarZone;
use crate::processor::feed::PriceFeed;
use crate::processor::job::IndicatorJob;
use crate::utils::utils::measure_time;
use anyhow::{anyhow, Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Outcome of one job in a batch.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job: IndicatorJob,
    pub job_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<RsiResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Price feed → price cache → aggregator → indicator cache.
pub struct IndicatorPipeline<E: IndicatorEngine = RsiCalculator> {
    feed: Arc<dyn PriceFeed>,
    prices: PriceCache,
    indicators: IndicatorCache<E>,
    zone: CalendarZone,
}

impl<E: IndicatorEngine> IndicatorPipeline<E> {
    pub fn new(
        feed: Arc<dyn PriceFeed>,
        prices: PriceCache,
        indicators: IndicatorCache<E>,
        zone: CalendarZone,
    ) -> Self {
        Self {
            feed,
            prices,
            indicators,
            zone,
        }
    }

    pub fn prices(&self) -> &PriceCache {
        &self.prices
    }

    pub fn indicators(&self) -> &IndicatorCache<E> {
        &self.indicators
    }

    /// Fetch the full history from the feed and replace the cached series.
    #[instrument(skip(self))]
    pub fn import(&self, symbol: &str) -> Result<CachedSeries> {
        let points = self
            .feed
            .fetch_history(symbol)
            .with_context(|| format!("Failed to fetch history for {}", normalize_symbol(symbol)))?;
        Ok(self.prices.store(symbol, points))
    }

    /// The cached series, falling back to a full import on a miss.
    pub fn history(&self, symbol: &str) -> Result<CachedSeries> {
        match self.prices.get(symbol) {
            Some(series) => Ok(series),
            None => self.import(symbol),
        }
    }

    /// Merge the feed's latest points into the cache.
    ///
    /// A failing or empty feed is tolerated while a live series is cached.
    /// Without a live series the full history is imported first, so the
    /// latest points never stand in for the whole history.
    #[instrument(skip(self))]
    pub fn refresh(&self, symbol: &str) -> Result<AppendOutcome> {
        let fresh = match self.feed.fetch_latest(symbol) {
            Ok(points) if !points.is_empty() => points,
            Ok(_) => return self.keep_cached(symbol, anyhow!("feed returned no points")),
            Err(e) => return self.keep_cached(symbol, e),
        };

        if self.prices.get(symbol).is_none() {
            info!("No live series for {}, importing full history", normalize_symbol(symbol));
            self.import(symbol)?;
        }

        let outcome = self.prices.append_latest(symbol, &fresh);
        if outcome == AppendOutcome::Unavailable {
            warn!("Price cache unavailable while refreshing {}", normalize_symbol(symbol));
        }
        Ok(outcome)
    }

    fn keep_cached(&self, symbol: &str, cause: anyhow::Error) -> Result<AppendOutcome> {
        if self.prices.get(symbol).is_some() {
            warn!(
                "Refresh of {} failed, keeping cached series: {}",
                normalize_symbol(symbol),
                cause
            );
            Ok(AppendOutcome::NoChange)
        } else {
            Err(cause.context(format!("No cached series for {}", normalize_symbol(symbol))))
        }
    }

    /// Candles for `symbol` at `timeframe`.
    pub fn candles(&self, symbol: &str, timeframe: Timeframe) -> Result<Vec<Candle>> {
        let series = self.history(symbol)?;
        Ok(self.zone.aggregate_points(&series.points, timeframe))
    }

    /// RSI for one job, served from the indicator cache when possible.
    #[instrument(skip(self, job), fields(job = %job))]
    pub fn rsi(&self, job: &IndicatorJob) -> Result<RsiResult> {
        let candles = self.candles(&job.symbol, job.timeframe)?;
        Ok(self
            .indicators
            .get_or_compute(&job.symbol, job.timeframe, &candles, &job.options, job.signal_period))
    }

    /// Run `jobs` in parallel on a pool of `workers` threads.
    ///
    /// Reports come back in job order; a failed job does not stop the rest.
    pub fn run_batch(&self, jobs: &[IndicatorJob], workers: usize) -> Result<Vec<JobReport>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("indicator-worker-{}", i))
            .build()
            .context("Failed to build worker pool")?;

        info!("Running {} indicator jobs on {} workers", jobs.len(), pool.current_num_threads());

        let reports = measure_time("indicator batch", || {
            pool.install(|| {
                jobs.par_iter()
                    .map(|job| match self.rsi(job) {
                        Ok(result) => JobReport {
                            job: job.clone(),
                            job_key: job.job_key(),
                            result: Some(result),
                            error: None,
                        },
                        Err(e) => {
                            error!("Failed to process job {}: {:#}", job, e);
                            JobReport {
                                job: job.clone(),
                                job_key: job.job_key(),
                                result: None,
                                error: Some(format!("{:#}", e)),
                            }
                        }
                    })
                    .collect::<Vec<_>>()
            })
        });

        Ok(reports)
    }
}
