use crate::models::{normalize_symbol, RawPricePoint};
use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// Upstream source of raw price points.
pub trait PriceFeed: Send + Sync {
    /// The full history available for `symbol`, in any order.
    fn fetch_history(&self, symbol: &str) -> Result<Vec<RawPricePoint>>;

    /// The most recent points for `symbol`. Feeds without a cheaper
    /// incremental query return the whole history.
    fn fetch_latest(&self, symbol: &str) -> Result<Vec<RawPricePoint>> {
        self.fetch_history(symbol)
    }
}

/// Reads `{dir}/{SYMBOL}.json`, a JSON array of raw price points.
#[derive(Debug, Clone)]
pub struct JsonFileFeed {
    dir: PathBuf,
}

impl JsonFileFeed {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{}.json", normalize_symbol(symbol)))
    }
}

impl PriceFeed for JsonFileFeed {
    fn fetch_history(&self, symbol: &str) -> Result<Vec<RawPricePoint>> {
        let path = self.path_for(symbol);
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read price file {}", path.display()))?;
        let points: Vec<RawPricePoint> = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid price data in {}", path.display()))?;

        debug!("Read {} price points from {}", points.len(), path.display());
        Ok(points)
    }
}
