use crate::cache::keys::params_hash;
use crate::indicators::rsi::{RsiOptions, DEFAULT_SIGNAL_PERIOD};
use crate::models::{normalize_symbol, Timeframe};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One RSI request: which series to build and how to compute it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorJob {
    pub symbol: String,
    pub timeframe: Timeframe,
    #[serde(default)]
    pub options: RsiOptions,
    #[serde(default = "default_signal_period")]
    pub signal_period: usize,
}

fn default_signal_period() -> usize {
    DEFAULT_SIGNAL_PERIOD
}

impl IndicatorJob {
    pub fn new(
        symbol: &str,
        timeframe: Timeframe,
        options: RsiOptions,
        signal_period: usize,
    ) -> Self {
        Self {
            symbol: normalize_symbol(symbol),
            timeframe,
            options,
            signal_period,
        }
    }

    /// Stable identifier used in logs and batch reports.
    pub fn job_key(&self) -> String {
        format!(
            "job:{}:{}:{}",
            normalize_symbol(&self.symbol),
            self.timeframe,
            params_hash(&self.options, self.signal_period)
        )
    }
}

impl fmt::Display for IndicatorJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:rsi({},{},{})",
            self.symbol,
            self.timeframe,
            self.options.period,
            self.options.source,
            self.signal_period
        )
    }
}
