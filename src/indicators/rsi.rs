//! Relative Strength Index with a signal line and crossover detection.
//!
//! The computation is a pure function of a candle sequence and an
//! [`RsiOptions`]. Too little history is not an error: the result is simply
//! empty.

use crate::indicators::ta::{Next, SimpleMovingAverage, SmoothedAverage, Smoothing};
use crate::models::Candle;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_PERIOD: usize = 14;
pub const DEFAULT_SIGNAL_PERIOD: usize = 9;

/// RSI value used when nothing moved over the averaging window
/// (average gain and average loss both zero) and edges are clamped.
pub const FLAT_RSI: f64 = 50.0;

// Beyond this, rounding to `precision` digits is a no-op for f64.
const MAX_PRECISION: u32 = 15;

/// Which candle value feeds the oscillator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    #[default]
    Close,
    Hlc3,
    Hl2,
    Ohlc4,
}

impl PriceSource {
    pub fn value(&self, c: &Candle) -> f64 {
        match self {
            PriceSource::Close => c.close,
            PriceSource::Hlc3 => (c.high + c.low + c.close) / 3.0,
            PriceSource::Hl2 => (c.high + c.low) / 2.0,
            PriceSource::Ohlc4 => (c.open + c.high + c.low + c.close) / 4.0,
        }
    }
}

impl fmt::Display for PriceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceSource::Close => write!(f, "close"),
            PriceSource::Hlc3 => write!(f, "hlc3"),
            PriceSource::Hl2 => write!(f, "hl2"),
            PriceSource::Ohlc4 => write!(f, "ohlc4"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown price source: {0}")]
pub struct ParsePriceSourceError(pub String);

impl FromStr for PriceSource {
    type Err = ParsePriceSourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "close" => Ok(PriceSource::Close),
            "hlc3" | "typical" => Ok(PriceSource::Hlc3),
            "hl2" | "median" => Ok(PriceSource::Hl2),
            "ohlc4" => Ok(PriceSource::Ohlc4),
            _ => Err(ParsePriceSourceError(s.to_string())),
        }
    }
}

/// RSI configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct RsiOptions {
    pub period: usize,
    pub source: PriceSource,
    pub smoothing: Smoothing,
    /// Pin the degenerate cases to exact values instead of relying on
    /// division by zero.
    pub clamp_edges: bool,
    /// Decimal digits to round each value to
    pub precision: Option<u32>,
}

impl Default for RsiOptions {
    fn default() -> Self {
        Self {
            period: DEFAULT_PERIOD,
            source: PriceSource::Close,
            smoothing: Smoothing::Wilder,
            clamp_edges: false,
            precision: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrossoverKind {
    Bullish,
    Bearish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crossover {
    /// Index into `RsiResult::rsi`
    pub index: usize,
    pub kind: CrossoverKind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RsiResult {
    pub rsi: Vec<f64>,
    /// `signal[j]` lines up with `rsi[j + signal_period - 1]`
    pub signal: Vec<f64>,
    pub crossovers: Vec<Crossover>,
}

impl RsiResult {
    /// True when there was not enough history for a single RSI value.
    pub fn is_empty(&self) -> bool {
        self.rsi.is_empty()
    }

    pub fn latest(&self) -> Option<f64> {
        self.rsi.last().copied()
    }
}

/// Compute RSI, its signal line and the crossovers between them.
pub fn calculate_rsi(candles: &[Candle], options: &RsiOptions, signal_period: usize) -> RsiResult {
    let rsi = rsi_series(candles, options);
    let signal = signal_line(&rsi, signal_period, options.precision);
    let crossovers = detect_crossovers(&rsi, &signal);

    RsiResult {
        rsi,
        signal,
        crossovers,
    }
}

/// One RSI value per bar from index `period` on, or empty unless there are
/// at least `period + 1` finite source values.
pub fn rsi_series(candles: &[Candle], options: &RsiOptions) -> Vec<f64> {
    let period = options.period;
    if period == 0 {
        return Vec::new();
    }

    let prices: Vec<f64> = candles
        .iter()
        .map(|c| options.source.value(c))
        .filter(|v| v.is_finite())
        .collect();

    if prices.len() <= period {
        debug!(
            "Insufficient history for RSI({}): {} values",
            period,
            prices.len()
        );
        return Vec::new();
    }

    let (gains, losses): (Vec<f64>, Vec<f64>) = prices
        .windows(2)
        .map(|w| {
            let delta = w[1] - w[0];
            (delta.max(0.0), (-delta).max(0.0))
        })
        .unzip();

    // Both seeds are non-empty because period > 0 and gains.len() >= period
    let (Ok(mut avg_gain), Ok(mut avg_loss)) = (
        SmoothedAverage::seeded(options.smoothing, &gains[..period]),
        SmoothedAverage::seeded(options.smoothing, &losses[..period]),
    ) else {
        return Vec::new();
    };

    let mut result = Vec::with_capacity(gains.len() - period + 1);
    result.push(finish(
        rsi_from_averages(avg_gain.value(), avg_loss.value(), options.clamp_edges),
        options.precision,
    ));

    for (&gain, &loss) in gains[period..].iter().zip(&losses[period..]) {
        let g = avg_gain.next(gain);
        let l = avg_loss.next(loss);
        result.push(finish(
            rsi_from_averages(g, l, options.clamp_edges),
            options.precision,
        ));
    }

    result
}

/// Simple moving average of the RSI series.
pub fn signal_line(rsi: &[f64], signal_period: usize, precision: Option<u32>) -> Vec<f64> {
    if signal_period == 0 || rsi.len() < signal_period {
        return Vec::new();
    }

    let Ok(mut sma) = SimpleMovingAverage::new(signal_period) else {
        return Vec::new();
    };

    rsi.iter()
        .filter_map(|&value| sma.next(value))
        .map(|avg| round_to(avg, precision))
        .collect()
}

/// Walk the overlap of RSI and signal, aligned from their ends.
///
/// Indices are relative to the RSI array.
pub fn detect_crossovers(rsi: &[f64], signal: &[f64]) -> Vec<Crossover> {
    if signal.len() < 2 || signal.len() > rsi.len() {
        return Vec::new();
    }

    let offset = rsi.len() - signal.len();
    let mut crossovers = Vec::new();

    for j in 1..signal.len() {
        let i = j + offset;
        let (prev_rsi, cur_rsi) = (rsi[i - 1], rsi[i]);
        let (prev_sig, cur_sig) = (signal[j - 1], signal[j]);

        if prev_rsi <= prev_sig && cur_rsi > cur_sig {
            crossovers.push(Crossover {
                index: i,
                kind: CrossoverKind::Bullish,
            });
        } else if prev_rsi >= prev_sig && cur_rsi < cur_sig {
            crossovers.push(Crossover {
                index: i,
                kind: CrossoverKind::Bearish,
            });
        }
    }

    crossovers
}

/// Convert average gain / average loss into an RSI value in [0, 100].
///
/// Without clamping, a zero average loss means an infinite RS and therefore
/// 100, even when nothing moved. With clamping, the flat case is
/// [`FLAT_RSI`] and a zero average gain is exactly 0.
fn rsi_from_averages(avg_gain: f64, avg_loss: f64, clamp_edges: bool) -> f64 {
    // Rolling sums can drift a hair below zero
    let gain = avg_gain.max(0.0);
    let loss = avg_loss.max(0.0);

    let rsi = if clamp_edges {
        if gain == 0.0 && loss == 0.0 {
            FLAT_RSI
        } else if loss == 0.0 {
            100.0
        } else if gain == 0.0 {
            0.0
        } else {
            100.0 - 100.0 / (1.0 + gain / loss)
        }
    } else if loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + gain / loss)
    };

    if rsi.is_finite() {
        rsi.clamp(0.0, 100.0)
    } else {
        FLAT_RSI
    }
}

fn finish(value: f64, precision: Option<u32>) -> f64 {
    round_to(value, precision)
}

fn round_to(value: f64, precision: Option<u32>) -> f64 {
    match precision {
        Some(digits) if digits <= MAX_PRECISION => {
            let factor = 10f64.powi(digits as i32);
            (value * factor).round() / factor
        }
        _ => value,
    }
}
