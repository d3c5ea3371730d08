use crate::indicators::rsi::{PriceSource, RsiOptions, DEFAULT_PERIOD, DEFAULT_SIGNAL_PERIOD};
use crate::indicators::ta::Smoothing;
use crate::processor::aggregator::CalendarZone;
use anyhow::{bail, Context, Result};
use chrono::FixedOffset;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "CANDLE";
pub const DEFAULT_CONFIG_NAME: &str = "candle-indicator-cache";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    File,
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub path: PathBuf,
    pub redis_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    pub price_ttl_hours: i64,
    pub indicator_ttl_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RsiSettings {
    pub period: usize,
    pub source: PriceSource,
    pub smoothing: Smoothing,
    pub clamp_edges: bool,
    #[serde(default)]
    pub precision: Option<u32>,
    pub signal_period: usize,
}

impl RsiSettings {
    pub fn options(&self) -> RsiOptions {
        RsiOptions {
            period: self.period,
            source: self.source,
            smoothing: self.smoothing,
            clamp_edges: self.clamp_edges,
            precision: self.precision,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CalendarSettings {
    /// Minutes east of UTC; unset means the host's local zone
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
}

impl CalendarSettings {
    pub fn zone(&self) -> CalendarZone {
        CalendarZone::from_offset_minutes(self.utc_offset_minutes)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedSettings {
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub storage: StorageSettings,
    pub cache: CacheSettings,
    pub rsi: RsiSettings,
    #[serde(default)]
    pub calendar: CalendarSettings,
    pub feed: FeedSettings,
    pub workers: usize,
}

impl Settings {
    /// Defaults, then the config file, then `CANDLE_*` environment variables.
    ///
    /// Without an explicit path, `candle-indicator-cache.{toml,json,yaml}` in
    /// the working directory is used if present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => config::File::from(p).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };

        let settings: Settings = config::Config::builder()
            .set_default("storage.backend", "file")?
            .set_default("storage.path", ".candle-cache")?
            .set_default("storage.redis_url", "redis://127.0.0.1/")?
            .set_default("cache.price_ttl_hours", 24i64)?
            .set_default("cache.indicator_ttl_hours", 24i64)?
            .set_default("rsi.period", DEFAULT_PERIOD as i64)?
            .set_default("rsi.source", "close")?
            .set_default("rsi.smoothing", "wilder")?
            .set_default("rsi.clamp_edges", true)?
            .set_default("rsi.signal_period", DEFAULT_SIGNAL_PERIOD as i64)?
            .set_default("feed.dir", "data")?
            .set_default("workers", num_cpus::get() as i64)?
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rsi.period == 0 {
            bail!("rsi.period must be greater than 0");
        }
        if self.rsi.signal_period == 0 {
            bail!("rsi.signal_period must be greater than 0");
        }
        if self.cache.price_ttl_hours <= 0 || self.cache.indicator_ttl_hours <= 0 {
            bail!("cache TTLs must be positive");
        }
        if self.workers == 0 {
            bail!("workers must be greater than 0");
        }
        if let Some(minutes) = self.calendar.utc_offset_minutes {
            if FixedOffset::east_opt(minutes.saturating_mul(60)).is_none() {
                bail!(
                    "calendar.utc_offset_minutes must be within a day of UTC, got {}",
                    minutes
                );
            }
        }
        Ok(())
    }

    pub fn price_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.cache.price_ttl_hours)
    }

    pub fn indicator_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.cache.indicator_ttl_hours)
    }
}
