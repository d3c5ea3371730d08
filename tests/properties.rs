use candle_indicator_cache::indicators::rsi::{
    calculate_rsi, rsi_series, signal_line, PriceSource, RsiOptions,
};
use candle_indicator_cache::indicators::ta::Smoothing;
use candle_indicator_cache::models::{Candle, RawPricePoint, Timeframe};
use candle_indicator_cache::processor::aggregator::{aggregate_candles, aggregate_points};
use chrono::{TimeZone, Utc};

const HOUR: i64 = 3_600_000;
const SMOOTHINGS: [Smoothing; 3] = [Smoothing::Wilder, Smoothing::Ema, Smoothing::Sma];

/// Small deterministic generator so the property inputs are reproducible.
struct Lcg(u64);

impl Lcg {
    fn next_f64(&mut self) -> f64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }

    fn next_range(&mut self, bound: i64) -> i64 {
        (self.next_f64() * bound as f64) as i64
    }
}

fn random_points(seed: u64, n: usize) -> Vec<RawPricePoint> {
    let mut rng = Lcg(seed);
    let start = Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap().timestamp_millis();
    let mut price = 100.0;
    (0..n)
        .map(|_| {
            let ts = start + rng.next_range(120 * 24) * HOUR + rng.next_range(HOUR);
            let open = price;
            price = (price + (rng.next_f64() - 0.5) * 4.0).max(1.0);
            let close = price;
            let high = open.max(close) + rng.next_f64();
            let low = open.min(close) - rng.next_f64();
            let volume = rng.next_range(10_000) - 500;
            RawPricePoint::new(ts, open, high, low, close, volume)
        })
        .collect()
}

fn closes(values: impl IntoIterator<Item = f64>) -> Vec<Candle> {
    values
        .into_iter()
        .enumerate()
        .map(|(i, c)| Candle::new(i as i64 * 24 * HOUR, c, c, c, c, 1))
        .collect()
}

fn random_walk(seed: u64, n: usize) -> Vec<Candle> {
    let mut rng = Lcg(seed);
    let mut price = 50.0;
    closes((0..n).map(|_| {
        price = (price + (rng.next_f64() - 0.5) * 3.0).max(0.5);
        price
    }))
}

#[test]
fn weekly_from_daily_matches_weekly_from_points() {
    for seed in 1..=20 {
        let points = random_points(seed, 400);
        let daily = aggregate_points(&points, Timeframe::Day, &Utc);
        let via_days = aggregate_candles(&daily, Timeframe::Week, &Utc);
        let direct = aggregate_points(&points, Timeframe::Week, &Utc);

        assert_eq!(via_days.len(), direct.len(), "seed {}", seed);
        for (a, b) in via_days.iter().zip(&direct) {
            assert_eq!(a.timestamp, b.timestamp);
            assert_eq!(a.high, b.high);
            assert_eq!(a.low, b.low);
            assert_eq!(a.volume, b.volume);
            assert_eq!(a.open, b.open);
            assert_eq!(a.close, b.close);
        }
    }
}

#[test]
fn monthly_from_daily_matches_monthly_from_points() {
    let points = random_points(99, 600);
    let daily = aggregate_points(&points, Timeframe::Day, &Utc);
    let via_days = aggregate_candles(&daily, Timeframe::Month, &Utc);
    let direct = aggregate_points(&points, Timeframe::Month, &Utc);
    assert_eq!(via_days, direct);
}

#[test]
fn aggregation_ignores_input_order() {
    let mut points = random_points(7, 200);
    let sorted = aggregate_points(&points, Timeframe::Week, &Utc);
    points.reverse();
    assert_eq!(aggregate_points(&points, Timeframe::Week, &Utc), sorted);
}

#[test]
fn three_intraday_points_make_one_day_candle() {
    let day = Utc.with_ymd_and_hms(2024, 5, 14, 0, 0, 0).unwrap().timestamp_millis();
    let points = vec![
        RawPricePoint::new(day + 14 * HOUR, 11.0, 13.0, 10.0, 12.0, 150),
        RawPricePoint::new(day + 10 * HOUR, 10.0, 12.0, 9.0, 11.0, 100),
        RawPricePoint::new(day + 15 * HOUR, 12.0, 12.0, 11.0, 11.5, 50),
    ];

    let candles = aggregate_points(&points, Timeframe::Day, &Utc);
    assert_eq!(candles, vec![Candle::new(day, 10.0, 13.0, 9.0, 11.5, 300)]);
}

#[test]
fn rising_closes_yield_six_values_of_one_hundred() {
    let candles = closes((0..20).map(|i| 100.0 + i as f64));
    let options = RsiOptions {
        clamp_edges: true,
        ..RsiOptions::default()
    };

    let rsi = rsi_series(&candles, &options);
    assert_eq!(rsi, vec![100.0; 6]);
}

#[test]
fn rsi_length_is_input_minus_period() {
    for smoothing in SMOOTHINGS {
        for period in [1, 2, 5, 14, 30] {
            let options = RsiOptions {
                period,
                smoothing,
                ..RsiOptions::default()
            };
            for n in [0, 1, period, period + 1, period + 7, 100] {
                let rsi = rsi_series(&random_walk(n as u64 + 3, n), &options);
                let expected = if n > period { n - period } else { 0 };
                assert_eq!(rsi.len(), expected, "{} period={} n={}", smoothing, period, n);
            }
        }
    }
}

#[test]
fn rsi_stays_within_bounds() {
    for smoothing in SMOOTHINGS {
        for clamp_edges in [false, true] {
            let sources = [
                PriceSource::Close,
                PriceSource::Hlc3,
                PriceSource::Hl2,
                PriceSource::Ohlc4,
            ];
            for source in sources {
                for seed in 0..10 {
                    let options = RsiOptions {
                        period: 1 + (seed as usize % 20),
                        source,
                        smoothing,
                        clamp_edges,
                        precision: None,
                    };
                    for value in rsi_series(&random_walk(seed, 150), &options) {
                        assert!(value.is_finite());
                        assert!((0.0..=100.0).contains(&value), "{} out of range", value);
                    }
                }
            }
        }
    }
}

#[test]
fn monotonic_input_pins_clamped_edges() {
    for smoothing in SMOOTHINGS {
        let options = RsiOptions {
            period: 5,
            smoothing,
            clamp_edges: true,
            ..RsiOptions::default()
        };

        let up = rsi_series(&closes((0..30).map(|i| 10.0 + i as f64 * 0.5)), &options);
        assert!(up.iter().all(|&v| v == 100.0), "{}: {:?}", smoothing, up);

        let down = rsi_series(&closes((0..30).map(|i| 50.0 - i as f64 * 0.5)), &options);
        assert!(down.iter().all(|&v| v == 0.0), "{}: {:?}", smoothing, down);
    }
}

#[test]
fn signal_length_follows_rsi_length() {
    let rsi: Vec<f64> = (0..20).map(|i| 30.0 + i as f64).collect();
    for signal_period in 1..=25 {
        let signal = signal_line(&rsi, signal_period, None);
        let expected = if rsi.len() >= signal_period {
            rsi.len() - signal_period + 1
        } else {
            0
        };
        assert_eq!(signal.len(), expected);
    }
}

#[test]
fn crossovers_index_into_rsi_and_match_the_lines() {
    let candles = random_walk(42, 200);
    let result = calculate_rsi(&candles, &RsiOptions::default(), 9);
    let offset = 9 - 1;

    assert!(!result.crossovers.is_empty());
    for crossover in &result.crossovers {
        let i = crossover.index;
        assert!(i > offset && i < result.rsi.len());
        let (prev_rsi, prev_sig) = (result.rsi[i - 1], result.signal[i - 1 - offset]);
        let (rsi, sig) = (result.rsi[i], result.signal[i - offset]);
        let bullish = prev_rsi <= prev_sig && rsi > sig;
        let bearish = prev_rsi >= prev_sig && rsi < sig;
        assert!(bullish || bearish);
    }
}

#[test]
fn precision_rounds_every_value() {
    let options = RsiOptions {
        precision: Some(2),
        ..RsiOptions::default()
    };
    let result = calculate_rsi(&random_walk(5, 80), &options, 9);
    for value in result.rsi.iter().chain(&result.signal) {
        assert_eq!((value * 100.0).round() / 100.0, *value);
    }
}
