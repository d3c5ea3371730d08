pub mod calculator;
pub mod rsi;
pub mod ta;

pub use self::calculator::{IndicatorEngine, RsiCalculator};
pub use self::rsi::{
    calculate_rsi, Crossover, CrossoverKind, PriceSource, RsiOptions, RsiResult,
    DEFAULT_PERIOD, DEFAULT_SIGNAL_PERIOD,
};
pub use self::ta::Smoothing;
