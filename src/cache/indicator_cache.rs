use crate::cache::keys::{
    indicator_key, indicator_series_prefix, indicator_symbol_prefix, ohlc_hash, params_hash,
    INDICATOR_PREFIX,
};
use crate::database::store::SharedStore;
use crate::error::StorageResult;
use crate::indicators::calculator::{IndicatorEngine, RsiCalculator};
use crate::indicators::rsi::{RsiOptions, RsiResult};
use crate::models::{Candle, Timeframe};
use crate::utils::clock::SharedClock;
use crate::utils::utils::truncate_string;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const DEFAULT_INDICATOR_TTL_HOURS: i64 = 24;

/// Bumped whenever the stored layout or engine semantics change; older
/// entries are then treated as misses.
pub const ENTRY_VERSION: u32 = 1;

/// A memoized engine result as persisted in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorCacheEntry {
    pub version: u32,
    pub indicator_name: String,
    pub params_hash: String,
    pub ohlc_hash: String,
    /// Epoch milliseconds
    pub computed_at: i64,
    pub data: RsiResult,
}

/// Memoizes engine output keyed by symbol, timeframe, configuration and
/// candle content.
pub struct IndicatorCache<E: IndicatorEngine = RsiCalculator> {
    store: SharedStore,
    clock: SharedClock,
    ttl: Duration,
    engine: E,
}

impl IndicatorCache<RsiCalculator> {
    pub fn new(store: SharedStore, clock: SharedClock, ttl: Duration) -> Self {
        Self::with_engine(store, clock, ttl, RsiCalculator)
    }
}

impl<E: IndicatorEngine> IndicatorCache<E> {
    pub fn with_engine(store: SharedStore, clock: SharedClock, ttl: Duration, engine: E) -> Self {
        Self {
            store,
            clock,
            ttl,
            engine,
        }
    }

    /// Return the cached result for these inputs, computing and storing it
    /// on a miss.
    pub fn get_or_compute(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        ohlc: &[Candle],
        options: &RsiOptions,
        signal_period: usize,
    ) -> RsiResult {
        let name = self.engine.name();
        let params = params_hash(options, signal_period);
        let content = ohlc_hash(ohlc);
        let key = indicator_key(symbol, timeframe, name, &params, &content);

        match self.read(&key) {
            Ok(Some(entry)) if self.is_valid(&entry, name, &params, &content) => {
                debug!("Indicator cache hit for {}", truncate_string(&key, 64));
                return entry.data;
            }
            Ok(Some(_)) => debug!("Indicator cache entry {} is stale", truncate_string(&key, 64)),
            Ok(None) => debug!("Indicator cache miss for {}", truncate_string(&key, 64)),
            Err(e) => warn!("Indicator cache read failed for {}: {}", key, e),
        }

        let data = self.engine.compute(ohlc, options, signal_period);

        let entry = IndicatorCacheEntry {
            version: ENTRY_VERSION,
            indicator_name: name.to_string(),
            params_hash: params,
            ohlc_hash: content,
            computed_at: self.clock.now_ms(),
            data,
        };

        self.supersede(&indicator_series_prefix(symbol, timeframe, name), &key);
        if let Err(e) = self.write(&key, &entry) {
            warn!("Failed to cache indicator {}: {}", key, e);
        }

        entry.data
    }

    /// Remove every entry for `symbol`. Returns how many were removed.
    pub fn clear_symbol(&self, symbol: &str) -> usize {
        let removed = self.remove_prefix(&indicator_symbol_prefix(symbol));
        info!("Cleared {} indicator entries for {}", removed, symbol);
        removed
    }

    pub fn clear_all(&self) -> usize {
        let removed = self.remove_prefix(INDICATOR_PREFIX);
        info!("Cleared {} indicator entries", removed);
        removed
    }

    /// Remove expired, outdated or unreadable entries.
    pub fn purge_expired(&self) -> usize {
        let keys = match self.store.keys_with_prefix(INDICATOR_PREFIX) {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Failed to list indicator cache entries: {}", e);
                return 0;
            }
        };

        let mut purged = 0;
        for key in keys {
            let stale = match self.read(&key) {
                Ok(Some(entry)) => entry.version != ENTRY_VERSION || !self.is_live(&entry),
                Ok(None) => false,
                Err(_) => true,
            };
            if stale && self.remove(&key) {
                purged += 1;
            }
        }
        purged
    }

    fn is_live(&self, entry: &IndicatorCacheEntry) -> bool {
        self.clock.now_ms() - entry.computed_at <= self.ttl.num_milliseconds()
    }

    fn is_valid(
        &self,
        entry: &IndicatorCacheEntry,
        name: &str,
        params: &str,
        content: &str,
    ) -> bool {
        entry.version == ENTRY_VERSION
            && entry.indicator_name == name
            && entry.params_hash == params
            && entry.ohlc_hash == content
            && self.is_live(entry)
    }

    // Older results for the same symbol/timeframe/indicator are never read again
    fn supersede(&self, series_prefix: &str, keep: &str) {
        match self.store.keys_with_prefix(series_prefix) {
            Ok(keys) => {
                for key in keys.into_iter().filter(|k| k != keep) {
                    self.remove(&key);
                }
            }
            Err(e) => warn!("Failed to list indicator entries under {}: {}", series_prefix, e),
        }
    }

    fn remove_prefix(&self, prefix: &str) -> usize {
        match self.store.keys_with_prefix(prefix) {
            Ok(keys) => keys.iter().filter(|k| self.remove(k)).count(),
            Err(e) => {
                warn!("Failed to list indicator entries under {}: {}", prefix, e);
                0
            }
        }
    }

    fn read(&self, key: &str) -> StorageResult<Option<IndicatorCacheEntry>> {
        match self.store.get(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn write(&self, key: &str, entry: &IndicatorCacheEntry) -> StorageResult<()> {
        let serialized = serde_json::to_string(entry)?;
        self.store.set(key, &serialized)
    }

    fn remove(&self, key: &str) -> bool {
        match self.store.delete(key) {
            Ok(removed) => removed,
            Err(e) => {
                warn!("Failed to delete {}: {}", key, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryStore;
    use crate::database::store::KeyValueStore;
    use crate::utils::clock::ManualClock;
    use std::sync::Arc;

    fn candles(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let close = 100.0 + ((i * 7) % 5) as f64 - (i % 3) as f64;
                Candle::new(i as i64 * 86_400_000, close, close + 1.0, close - 1.0, close, 100)
            })
            .collect()
    }

    fn cache() -> (IndicatorCache, Arc<MemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(0));
        let cache = IndicatorCache::new(
            store.clone(),
            clock.clone(),
            Duration::hours(DEFAULT_INDICATOR_TTL_HOURS),
        );
        (cache, store, clock)
    }

    #[test]
    fn newer_content_supersedes_older_entry() {
        let (cache, store, _) = cache();
        let options = RsiOptions::default();
        let mut ohlc = candles(30);

        cache.get_or_compute("AAPL", Timeframe::Day, &ohlc, &options, 9);
        ohlc[29].close += 1.0;
        cache.get_or_compute("AAPL", Timeframe::Day, &ohlc, &options, 9);
        cache.get_or_compute("AAPL", Timeframe::Week, &ohlc, &options, 9);

        assert_eq!(store.keys_with_prefix("indicator:AAPL:day:").unwrap().len(), 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn expired_entry_is_recomputed_with_new_timestamp() {
        let (cache, store, clock) = cache();
        let ohlc = candles(30);
        let options = RsiOptions::default();
        cache.get_or_compute("AAPL", Timeframe::Day, &ohlc, &options, 9);

        clock.advance(Duration::hours(25));
        cache.get_or_compute("AAPL", Timeframe::Day, &ohlc, &options, 9);

        let key = store.keys_with_prefix("indicator:").unwrap().remove(0);
        let entry: IndicatorCacheEntry =
            serde_json::from_str(&store.get(&key).unwrap().unwrap()).unwrap();
        assert_eq!(entry.computed_at, 25 * 3_600_000);
    }

    #[test]
    fn outdated_version_is_a_miss() {
        let (cache, store, _) = cache();
        let ohlc = candles(30);
        let options = RsiOptions::default();
        let expected = cache.get_or_compute("AAPL", Timeframe::Day, &ohlc, &options, 9);

        let key = store.keys_with_prefix("indicator:").unwrap().remove(0);
        let mut entry: IndicatorCacheEntry =
            serde_json::from_str(&store.get(&key).unwrap().unwrap()).unwrap();
        entry.version = 0;
        entry.data = RsiResult::default();
        store.set(&key, &serde_json::to_string(&entry).unwrap()).unwrap();

        assert_eq!(cache.get_or_compute("AAPL", Timeframe::Day, &ohlc, &options, 9), expected);
    }

    #[test]
    fn clear_symbol_leaves_other_symbols() {
        let (cache, store, _) = cache();
        let ohlc = candles(20);
        let options = RsiOptions::default();
        for symbol in ["AAPL", "AAPLX", "MSFT"] {
            cache.get_or_compute(symbol, Timeframe::Day, &ohlc, &options, 9);
        }
        store.set("prices:AAPL", "[]").unwrap();

        assert_eq!(cache.clear_symbol("aapl"), 1);
        assert_eq!(store.keys_with_prefix("indicator:").unwrap().len(), 2);
        assert_eq!(cache.clear_all(), 2);
        assert_eq!(store.keys_with_prefix("").unwrap(), vec!["prices:AAPL"]);
    }

    #[test]
    fn purge_removes_only_stale_entries() {
        let (cache, store, clock) = cache();
        let options = RsiOptions::default();
        cache.get_or_compute("AAPL", Timeframe::Day, &candles(20), &options, 9);
        clock.advance(Duration::hours(30));
        cache.get_or_compute("MSFT", Timeframe::Day, &candles(20), &options, 9);
        store.set("indicator:BAD:day:rsi:x:y", "garbage").unwrap();

        assert_eq!(cache.purge_expired(), 2);
        assert_eq!(store.keys_with_prefix("indicator:MSFT:").unwrap().len(), 1);
        assert_eq!(store.len(), 1);
    }
}
