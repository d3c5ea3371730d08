use crate::cache::keys::{price_key, symbol_from_price_key, PRICE_PREFIX};
use crate::database::store::SharedStore;
use crate::error::{StorageError, StorageResult};
use crate::models::{normalize_symbol, CachedSeries, RawPricePoint};
use crate::utils::clock::SharedClock;
use chrono::Duration;
use parking_lot::Mutex;
use std::collections::HashSet;
use tracing::{debug, info, warn};

pub const DEFAULT_PRICE_TTL_HOURS: i64 = 24;

/// Result of an incremental refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Every fresh timestamp was already cached; nothing was written
    NoChange,
    Updated { added: usize, total: usize },
    /// The store could not be read or written; the caller should refetch
    Unavailable,
}

/// TTL-bounded raw price history per symbol.
///
/// Caching is an optimisation only: every storage failure is logged and
/// reported as a miss.
pub struct PriceCache {
    store: SharedStore,
    clock: SharedClock,
    ttl: Duration,
    // Serialises read-modify-write cycles so concurrent appends can't lose points
    write_lock: Mutex<()>,
}

impl PriceCache {
    pub fn new(store: SharedStore, clock: SharedClock, ttl: Duration) -> Self {
        Self {
            store,
            clock,
            ttl,
            write_lock: Mutex::new(()),
        }
    }

    /// Replace whatever is cached for `symbol` with `points`.
    ///
    /// Returns the normalised series even when it could not be persisted.
    pub fn store(&self, symbol: &str, points: Vec<RawPricePoint>) -> CachedSeries {
        let symbol = normalize_symbol(symbol);
        let series = CachedSeries::new(&symbol, points, self.clock.now_ms());

        let _guard = self.write_lock.lock();
        match self.write(&series) {
            Ok(()) => info!("Cached {} price points for {}", series.len(), symbol),
            Err(e) => warn!("Failed to cache price history for {}: {}", symbol, e),
        }
        series
    }

    /// The live series for `symbol`, if any. A stale entry is purged.
    pub fn get(&self, symbol: &str) -> Option<CachedSeries> {
        let key = price_key(symbol);

        match self.read(&key) {
            Ok(Some(series)) if self.is_live(&series) => {
                debug!("Price cache hit for {}", key);
                Some(series)
            }
            Ok(Some(_)) | Err(StorageError::Serialization(_)) => {
                debug!("Price cache entry {} is stale or unreadable, purging", key);
                let _guard = self.write_lock.lock();
                // Re-check under the lock; a writer may have refreshed it meanwhile
                match self.read(&key) {
                    Ok(Some(series)) if self.is_live(&series) => Some(series),
                    _ => {
                        self.remove(&key);
                        None
                    }
                }
            }
            Ok(None) => {
                debug!("Price cache miss for {}", key);
                None
            }
            Err(e) => {
                warn!("Price cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    /// Merge points whose timestamps are not cached yet.
    ///
    /// Safe to repeat: the stored series never holds duplicate timestamps.
    pub fn append_latest(&self, symbol: &str, fresh: &[RawPricePoint]) -> AppendOutcome {
        let symbol = normalize_symbol(symbol);
        let key = price_key(&symbol);

        let _guard = self.write_lock.lock();

        let existing = match self.read(&key) {
            Ok(Some(series)) if self.is_live(&series) => series.points,
            Ok(_) | Err(StorageError::Serialization(_)) => Vec::new(),
            Err(e) => {
                warn!("Price cache read failed for {}: {}", key, e);
                return AppendOutcome::Unavailable;
            }
        };

        let mut seen: HashSet<i64> = existing.iter().map(|p| p.timestamp).collect();
        let additions: Vec<RawPricePoint> = fresh
            .iter()
            .filter(|p| seen.insert(p.timestamp))
            .copied()
            .collect();

        if additions.is_empty() {
            debug!("No new price points for {}", symbol);
            return AppendOutcome::NoChange;
        }

        let added = additions.len();
        let mut merged = existing;
        merged.extend(additions);
        let series = CachedSeries::new(&symbol, merged, self.clock.now_ms());

        match self.write(&series) {
            Ok(()) => {
                info!("Appended {} price points for {} ({} total)", added, symbol, series.len());
                AppendOutcome::Updated {
                    added,
                    total: series.len(),
                }
            }
            Err(e) => {
                warn!("Failed to append price points for {}: {}", symbol, e);
                AppendOutcome::Unavailable
            }
        }
    }

    /// Drop the cached series for `symbol`. Returns true if one was removed.
    pub fn invalidate(&self, symbol: &str) -> bool {
        let _guard = self.write_lock.lock();
        self.remove(&price_key(symbol))
    }

    /// Symbols with a cached entry, live or not.
    pub fn symbols(&self) -> Vec<String> {
        match self.store.keys_with_prefix(PRICE_PREFIX) {
            Ok(keys) => keys
                .into_iter()
                .filter_map(|k| symbol_from_price_key(&k))
                .collect(),
            Err(e) => {
                warn!("Failed to list cached symbols: {}", e);
                Vec::new()
            }
        }
    }

    /// Remove every expired or unreadable series. Returns how many went.
    pub fn purge_expired(&self) -> usize {
        let keys = match self.store.keys_with_prefix(PRICE_PREFIX) {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Failed to list price cache entries: {}", e);
                return 0;
            }
        };

        let _guard = self.write_lock.lock();
        let mut purged = 0;
        for key in keys {
            let stale = match self.read(&key) {
                Ok(Some(series)) => !self.is_live(&series),
                Ok(None) => false,
                Err(StorageError::Serialization(_)) => true,
                Err(e) => {
                    warn!("Price cache read failed for {}: {}", key, e);
                    false
                }
            };
            if stale && self.remove(&key) {
                purged += 1;
            }
        }

        if purged > 0 {
            info!("Purged {} expired price series", purged);
        }
        purged
    }

    fn is_live(&self, series: &CachedSeries) -> bool {
        self.clock.now_ms() - series.last_updated <= self.ttl.num_milliseconds()
    }

    fn read(&self, key: &str) -> StorageResult<Option<CachedSeries>> {
        match self.store.get(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn write(&self, series: &CachedSeries) -> StorageResult<()> {
        let serialized = serde_json::to_string(series)?;
        self.store.set(&price_key(&series.symbol), &serialized)
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

    fn point(ts: i64, close: f64) -> RawPricePoint {
        RawPricePoint::new(ts, close, close, close, close, 10)
    }

    fn cache() -> (PriceCache, Arc<MemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(1_000_000));
        let cache = PriceCache::new(
            store.clone(),
            clock.clone(),
            Duration::hours(DEFAULT_PRICE_TTL_HOURS),
        );
        (cache, store, clock)
    }

    #[test]
    fn store_sorts_and_get_returns_series() {
        let (cache, _, _) = cache();
        cache.store("aapl", vec![point(3, 3.0), point(1, 1.0), point(2, 2.0)]);

        let series = cache.get("AAPL").unwrap();
        assert_eq!(series.symbol, "AAPL");
        let stamps: Vec<i64> = series.points.iter().map(|p| p.timestamp).collect();
        assert_eq!(stamps, vec![1, 2, 3]);
        assert_eq!(series.last_updated, 1_000_000);
    }

    #[test]
    fn empty_store_persists_an_empty_series() {
        let (cache, _, _) = cache();
        cache.store("TSLA", Vec::new());
        assert!(cache.get("TSLA").unwrap().is_empty());
    }

    #[test]
    fn expired_series_is_purged_on_read() {
        let (cache, store, clock) = cache();
        cache.store("AAPL", vec![point(1, 1.0)]);

        clock.advance(Duration::hours(24));
        assert!(cache.get("AAPL").is_some(), "exactly at TTL is still live");

        clock.advance(Duration::milliseconds(1));
        assert!(cache.get("AAPL").is_none());
        assert_eq!(store.get("prices:AAPL").unwrap(), None);
    }

    #[test]
    fn corrupt_entry_is_a_miss() {
        let (cache, store, _) = cache();
        store.set("prices:AAPL", "not json").unwrap();
        assert!(cache.get("AAPL").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn append_without_new_timestamps_keeps_last_updated() {
        let (cache, _, clock) = cache();
        cache.store("AAPL", vec![point(1, 1.0), point(2, 2.0)]);
        clock.advance(Duration::minutes(5));

        let outcome = cache.append_latest("AAPL", &[point(2, 2.5), point(1, 1.5)]);
        assert_eq!(outcome, AppendOutcome::NoChange);
        assert_eq!(cache.get("AAPL").unwrap().last_updated, 1_000_000);
    }

    #[test]
    fn append_merges_and_deduplicates() {
        let (cache, _, clock) = cache();
        cache.store("AAPL", vec![point(1, 1.0), point(3, 3.0)]);
        clock.advance(Duration::minutes(5));

        let fresh = [point(4, 4.0), point(2, 2.0), point(3, 9.0), point(4, 4.5)];
        let outcome = cache.append_latest("AAPL", &fresh);
        assert_eq!(outcome, AppendOutcome::Updated { added: 2, total: 4 });

        let series = cache.get("AAPL").unwrap();
        let stamps: Vec<i64> = series.points.iter().map(|p| p.timestamp).collect();
        assert_eq!(stamps, vec![1, 2, 3, 4]);
        // Existing points win over fresh ones with the same timestamp
        assert_eq!(series.points[2].close, Some(3.0));
        assert_eq!(series.points[3].close, Some(4.0));
        assert_eq!(series.last_updated, 1_000_000 + 5 * 60_000);
    }

    #[test]
    fn append_to_missing_series_creates_it() {
        let (cache, _, _) = cache();
        assert_eq!(
            cache.append_latest("NVDA", &[point(1, 1.0)]),
            AppendOutcome::Updated { added: 1, total: 1 }
        );
        assert_eq!(cache.append_latest("NVDA", &[]), AppendOutcome::NoChange);
    }

    #[test]
    fn purge_and_list_symbols() {
        let (cache, _, clock) = cache();
        cache.store("AAPL", vec![point(1, 1.0)]);
        clock.advance(Duration::hours(25));
        cache.store("MSFT", vec![point(1, 1.0)]);

        let mut symbols = cache.symbols();
        symbols.sort();
        assert_eq!(symbols, vec!["AAPL", "MSFT"]);

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.symbols(), vec!["MSFT"]);
        assert!(cache.invalidate("msft"));
        assert!(cache.symbols().is_empty());
    }

    #[test]
    fn exchange_qualified_symbols_stay_separate() {
        let (cache, store, _) = cache();
        cache.store("NASDAQ", vec![point(1, 1.0)]);
        cache.store("nasdaq:aapl", vec![point(1, 2.0)]);

        assert!(store.get("prices:NASDAQ%3AAAPL").unwrap().is_some());
        let mut symbols = cache.symbols();
        symbols.sort();
        assert_eq!(symbols, vec!["NASDAQ", "NASDAQ:AAPL"]);

        assert!(cache.invalidate("NASDAQ"));
        assert_eq!(cache.get("NASDAQ:AAPL").unwrap().points[0].close, Some(2.0));
    }
}
