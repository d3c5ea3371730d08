// Streaming averages used by the RSI engine and its signal line.
// Each average is fed one value at a time through the `Next` trait.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The `Next` trait is used for indicators that consume one value per bar
pub trait Next<T> {
    type Output;
    fn next(&mut self, input: T) -> Self::Output;
}

/// How gains and losses are rolled forward after the seed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Smoothing {
    /// avg = (avg * (period - 1) + x) / period
    #[default]
    Wilder,
    /// avg = alpha * x + (1 - alpha) * avg, alpha = 2 / (period + 1)
    Ema,
    /// Trailing arithmetic mean over the last `period` values
    Sma,
}

impl fmt::Display for Smoothing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Smoothing::Wilder => write!(f, "wilder"),
            Smoothing::Ema => write!(f, "ema"),
            Smoothing::Sma => write!(f, "sma"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown smoothing: {0}")]
pub struct ParseSmoothingError(pub String);

impl FromStr for Smoothing {
    type Err = ParseSmoothingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "wilder" | "rma" | "smma" => Ok(Smoothing::Wilder),
            "ema" => Ok(Smoothing::Ema),
            "sma" => Ok(Smoothing::Sma),
            _ => Err(ParseSmoothingError(s.to_string())),
        }
    }
}

/// Wilder's smoothing, seeded with an initial average
#[derive(Debug, Clone)]
pub struct WilderAverage {
    period: f64,
    value: f64,
}

impl WilderAverage {
    pub fn new(period: usize, seed: f64) -> Self {
        Self {
            period: period as f64,
            value: seed,
        }
    }
}

impl Next<f64> for WilderAverage {
    type Output = f64;

    fn next(&mut self, input: f64) -> f64 {
        self.value = (self.value * (self.period - 1.0) + input) / self.period;
        self.value
    }
}

/// Exponential Moving Average, seeded with an initial average
#[derive(Debug, Clone)]
pub struct ExponentialMovingAverage {
    alpha: f64,
    value: f64,
}

impl ExponentialMovingAverage {
    pub fn new(period: usize, seed: f64) -> Self {
        Self {
            alpha: 2.0 / (period as f64 + 1.0),
            value: seed,
        }
    }
}

impl Next<f64> for ExponentialMovingAverage {
    type Output = f64;

    fn next(&mut self, input: f64) -> f64 {
        self.value = self.alpha * input + (1.0 - self.alpha) * self.value;
        self.value
    }
}

/// Simple Moving Average over a rolling window.
///
/// Yields `None` until the window is full. The running sum is updated by
/// adding the new value and subtracting the evicted one.
#[derive(Debug, Clone)]
pub struct SimpleMovingAverage {
    period: usize,
    window: VecDeque<f64>,
    sum: f64,
}

impl SimpleMovingAverage {
    pub fn new(period: usize) -> anyhow::Result<Self> {
        if period == 0 {
            return Err(anyhow::anyhow!("Period must be greater than 0"));
        }

        Ok(Self {
            period,
            window: VecDeque::with_capacity(period + 1),
            sum: 0.0,
        })
    }
}

impl Next<f64> for SimpleMovingAverage {
    type Output = Option<f64>;

    fn next(&mut self, input: f64) -> Option<f64> {
        self.window.push_back(input);
        self.sum += input;

        if self.window.len() > self.period {
            if let Some(evicted) = self.window.pop_front() {
                self.sum -= evicted;
            }
        }

        if self.window.len() < self.period {
            None
        } else {
            Some(self.sum / self.period as f64)
        }
    }
}

/// A gain or loss average under one of the three smoothing rules.
///
/// Seeded from the arithmetic mean of the first `period` values, then
/// rolled forward one bar per `next` call.
#[derive(Debug, Clone)]
pub enum SmoothedAverage {
    Wilder(WilderAverage),
    Ema(ExponentialMovingAverage),
    Sma(SimpleMovingAverage, f64),
}

impl SmoothedAverage {
    /// `seed` must hold exactly `period` values, with `period > 0`.
    pub fn seeded(smoothing: Smoothing, seed: &[f64]) -> anyhow::Result<Self> {
        let period = seed.len();
        if period == 0 {
            return Err(anyhow::anyhow!("Seed window must not be empty"));
        }
        let mean = seed.iter().sum::<f64>() / period as f64;

        Ok(match smoothing {
            Smoothing::Wilder => SmoothedAverage::Wilder(WilderAverage::new(period, mean)),
            Smoothing::Ema => SmoothedAverage::Ema(ExponentialMovingAverage::new(period, mean)),
            Smoothing::Sma => {
                let mut sma = SimpleMovingAverage::new(period)?;
                let mut current = mean;
                for &value in seed {
                    if let Some(avg) = sma.next(value) {
                        current = avg;
                    }
                }
                SmoothedAverage::Sma(sma, current)
            }
        })
    }

    pub fn value(&self) -> f64 {
        match self {
            SmoothedAverage::Wilder(w) => w.value,
            SmoothedAverage::Ema(e) => e.value,
            SmoothedAverage::Sma(_, current) => *current,
        }
    }
}

impl Next<f64> for SmoothedAverage {
    type Output = f64;

    fn next(&mut self, input: f64) -> f64 {
        match self {
            SmoothedAverage::Wilder(w) => w.next(input),
            SmoothedAverage::Ema(e) => e.next(input),
            SmoothedAverage::Sma(sma, current) => {
                if let Some(avg) = sma.next(input) {
                    *current = avg;
                }
                *current
            }
        }
    }
}
