//! Calendar bucketing of price points into day, week and month candles.

use crate::models::{Candle, RawPricePoint, Timeframe};
use chrono::{Datelike, Duration, FixedOffset, Local, LocalResult, NaiveDate, TimeZone, Utc};
use std::collections::BTreeMap;

/// Time zone whose calendar defines bucket boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalendarZone {
    /// The host's local zone
    #[default]
    Local,
    /// A fixed offset east of UTC
    Fixed(FixedOffset),
}

impl CalendarZone {
    /// `None` falls back to the host zone; out-of-range offsets likewise.
    pub fn from_offset_minutes(minutes: Option<i32>) -> Self {
        minutes
            .and_then(|m| FixedOffset::east_opt(m.saturating_mul(60)))
            .map(CalendarZone::Fixed)
            .unwrap_or(CalendarZone::Local)
    }

    pub fn aggregate_points(&self, points: &[RawPricePoint], timeframe: Timeframe) -> Vec<Candle> {
        match self {
            CalendarZone::Local => aggregate_points(points, timeframe, &Local),
            CalendarZone::Fixed(offset) => aggregate_points(points, timeframe, offset),
        }
    }

    pub fn aggregate_candles(&self, candles: &[Candle], timeframe: Timeframe) -> Vec<Candle> {
        match self {
            CalendarZone::Local => aggregate_candles(candles, timeframe, &Local),
            CalendarZone::Fixed(offset) => aggregate_candles(candles, timeframe, offset),
        }
    }
}

/// Aggregate raw points, in any order, into candles sorted by bucket start.
///
/// Malformed points are skipped; a bucket left with no valid points is not
/// emitted.
pub fn aggregate_points<Tz: TimeZone>(
    points: &[RawPricePoint],
    timeframe: Timeframe,
    tz: &Tz,
) -> Vec<Candle> {
    let candles: Vec<Candle> = points.iter().filter_map(RawPricePoint::to_candle).collect();
    aggregate_candles(&candles, timeframe, tz)
}

/// Re-bucket existing candles (e.g. day candles into weeks).
pub fn aggregate_candles<Tz: TimeZone>(
    candles: &[Candle],
    timeframe: Timeframe,
    tz: &Tz,
) -> Vec<Candle> {
    let mut buckets: BTreeMap<NaiveDate, Vec<Candle>> = BTreeMap::new();

    for candle in candles.iter().filter(|c| is_finite(c)) {
        if let Some(key) = bucket_key(candle.timestamp, timeframe, tz) {
            buckets.entry(key).or_default().push(*candle);
        }
    }

    buckets
        .into_iter()
        .filter_map(|(key, mut members)| {
            members.sort_by_key(|c| c.timestamp);
            merge(bucket_start_ms(key, tz), &members)
        })
        .collect()
}

/// Calendar date identifying the bucket that contains `timestamp_ms`.
pub fn bucket_key<Tz: TimeZone>(
    timestamp_ms: i64,
    timeframe: Timeframe,
    tz: &Tz,
) -> Option<NaiveDate> {
    let date = Utc
        .timestamp_millis_opt(timestamp_ms)
        .single()?
        .with_timezone(tz)
        .date_naive();

    match timeframe {
        Timeframe::Day => Some(date),
        // Weeks start on Sunday
        Timeframe::Week => {
            date.checked_sub_signed(Duration::days(date.weekday().num_days_from_sunday() as i64))
        }
        Timeframe::Month => NaiveDate::from_ymd_opt(date.year(), date.month(), 1),
    }
}

// First instant of `date` in `tz`, stepping past a DST gap at midnight.
fn bucket_start_ms<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> i64 {
    for hour in 0..3 {
        let Some(naive) = date.and_hms_opt(hour, 0, 0) else {
            continue;
        };
        match tz.from_local_datetime(&naive) {
            LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => return dt.timestamp_millis(),
            LocalResult::None => continue,
        }
    }

    date.and_hms_opt(0, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive).timestamp_millis())
        .unwrap_or_default()
}

fn merge(timestamp: i64, members: &[Candle]) -> Option<Candle> {
    let first = members.first()?;
    let last = members.last()?;

    let (high, low, volume) = members.iter().fold(
        (f64::NEG_INFINITY, f64::INFINITY, 0u64),
        |(high, low, volume), c| {
            (
                high.max(c.high),
                low.min(c.low),
                volume.saturating_add(c.volume),
            )
        },
    );

    Some(Candle {
        timestamp,
        open: first.open,
        high,
        low,
        close: last.close,
        volume,
    })
}

fn is_finite(c: &Candle) -> bool {
    c.open.is_finite() && c.high.is_finite() && c.low.is_finite() && c.close.is_finite()
}
