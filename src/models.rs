use chrono::{NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A single price observation as delivered by an upstream feed.
///
/// Feeds are known to emit partial records, so every price field is
/// optional. Points with a missing or non-finite field are kept in storage
/// but excluded from aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawPricePoint {
    /// Epoch milliseconds
    pub timestamp: i64,
    #[serde(default)]
    pub open: Option<f64>,
    #[serde(default)]
    pub high: Option<f64>,
    #[serde(default)]
    pub low: Option<f64>,
    #[serde(default)]
    pub close: Option<f64>,
    #[serde(default)]
    pub volume: Option<i64>,
}

impl RawPricePoint {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: i64) -> Self {
        Self {
            timestamp,
            open: Some(open),
            high: Some(high),
            low: Some(low),
            close: Some(close),
            volume: Some(volume),
        }
    }

    /// Convert into a single-point candle, or `None` if the record is malformed.
    ///
    /// Volume is taken as an absolute value and high/low are widened to
    /// bracket open/close.
    pub fn to_candle(&self) -> Option<Candle> {
        let open = self.open.filter(|v| v.is_finite())?;
        let high = self.high.filter(|v| v.is_finite())?;
        let low = self.low.filter(|v| v.is_finite())?;
        let close = self.close.filter(|v| v.is_finite())?;
        let volume = self.volume?;

        Some(Candle {
            timestamp: self.timestamp,
            open,
            high: high.max(open).max(close),
            low: low.min(open).min(close),
            close,
            volume: volume.unsigned_abs(),
        })
    }
}

/// Aggregated OHLC record for one calendar bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bucket start, epoch milliseconds
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Candle {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: u64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

/// A symbol's cached raw history, as persisted by the price cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedSeries {
    pub symbol: String,
    /// Sorted by timestamp, no duplicate timestamps
    pub points: Vec<RawPricePoint>,
    /// Epoch milliseconds of the last write
    pub last_updated: i64,
    pub range_from: Option<NaiveDate>,
    pub range_to: Option<NaiveDate>,
}

impl CachedSeries {
    /// Build a series, sorting the points and dropping repeated timestamps.
    ///
    /// The first occurrence of a timestamp wins.
    pub fn new(symbol: &str, mut points: Vec<RawPricePoint>, last_updated: i64) -> Self {
        points.sort_by_key(|p| p.timestamp);
        points.dedup_by_key(|p| p.timestamp);

        let range_from = points.first().and_then(|p| utc_date(p.timestamp));
        let range_to = points.last().and_then(|p| utc_date(p.timestamp));

        Self {
            symbol: symbol.to_string(),
            points,
            last_updated,
            range_from,
            range_to,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }
}

fn utc_date(timestamp_ms: i64) -> Option<NaiveDate> {
    Utc.timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|dt| dt.date_naive())
}

/// Calendar bucket size for aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    Day,
    Week,
    Month,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Day => "day",
            Timeframe::Week => "week",
            Timeframe::Month => "month",
        }
    }

    pub fn all() -> &'static [Timeframe] {
        &[Timeframe::Day, Timeframe::Week, Timeframe::Month]
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown timeframe: {0}")]
pub struct ParseTimeframeError(pub String);

impl FromStr for Timeframe {
    type Err = ParseTimeframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "day" | "d" | "1d" | "daily" => Ok(Timeframe::Day),
            "week" | "w" | "1w" | "weekly" => Ok(Timeframe::Week),
            "month" | "m" | "1mo" | "monthly" => Ok(Timeframe::Month),
            _ => Err(ParseTimeframeError(s.to_string())),
        }
    }
}

/// Normalise a ticker for key derivation.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}
