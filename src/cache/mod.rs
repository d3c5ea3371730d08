pub mod indicator_cache;
pub mod keys;
pub mod price_cache;
pub mod redis;

pub use self::indicator_cache::{IndicatorCache, IndicatorCacheEntry};
pub use self::price_cache::{AppendOutcome, PriceCache};
pub use self::redis::RedisStore;
