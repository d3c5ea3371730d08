use crate::indicators::rsi::{calculate_rsi, RsiOptions, RsiResult};
use crate::models::Candle;

/// A computation the indicator cache can memoize.
pub trait IndicatorEngine: Send + Sync {
    /// Name used as the indicator component of cache keys
    fn name(&self) -> &'static str;

    fn compute(&self, candles: &[Candle], options: &RsiOptions, signal_period: usize) -> RsiResult;
}

/// The RSI engine: a stateless wrapper around [`calculate_rsi`].
#[derive(Debug, Default, Clone, Copy)]
pub struct RsiCalculator;

impl IndicatorEngine for RsiCalculator {
    fn name(&self) -> &'static str {
        "rsi"
    }

    fn compute(&self, candles: &[Candle], options: &RsiOptions, signal_period: usize) -> RsiResult {
        calculate_rsi(candles, options, signal_period)
    }
}

impl<E: IndicatorEngine + ?Sized> IndicatorEngine for std::sync::Arc<E> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn compute(&self, candles: &[Candle], options: &RsiOptions, signal_period: usize) -> RsiResult {
        (**self).compute(candles, options, signal_period)
    }
}
