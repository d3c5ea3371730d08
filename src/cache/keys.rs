use crate::indicators::rsi::RsiOptions;
use crate::models::{normalize_symbol, Candle, Timeframe};
use sha2::{Digest, Sha256};

pub const PRICE_PREFIX: &str = "prices:";
pub const INDICATOR_PREFIX: &str = "indicator:";

// Hex digits kept from each digest
const HASH_LEN: usize = 32;

// Cache key for a symbol's raw price history
pub fn price_key(symbol: &str) -> String {
    format!("{}{}", PRICE_PREFIX, key_symbol(symbol))
}

/// The symbol a price key was built from, if it is one.
pub fn symbol_from_price_key(key: &str) -> Option<String> {
    key.strip_prefix(PRICE_PREFIX).and_then(unescape_symbol)
}

// Every indicator entry for a symbol lives under this prefix
pub fn indicator_symbol_prefix(symbol: &str) -> String {
    format!("{}{}:", INDICATOR_PREFIX, key_symbol(symbol))
}

/// Normalised symbol with the key separator escaped, so `NASDAQ` never
/// prefixes the entries of `NASDAQ:AAPL`.
fn key_symbol(symbol: &str) -> String {
    let symbol = normalize_symbol(symbol);
    let mut escaped = String::with_capacity(symbol.len());
    for ch in symbol.chars() {
        match ch {
            '%' => escaped.push_str("%25"),
            ':' => escaped.push_str("%3A"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

fn unescape_symbol(escaped: &str) -> Option<String> {
    let mut symbol = String::with_capacity(escaped.len());
    let mut rest = escaped;
    while let Some(at) = rest.find('%') {
        symbol.push_str(&rest[..at]);
        match rest.get(at + 1..at + 3)? {
            "25" => symbol.push('%'),
            "3A" => symbol.push(':'),
            _ => return None,
        }
        rest = &rest[at + 3..];
    }
    symbol.push_str(rest);
    Some(symbol)
}

// Entries for one (symbol, timeframe, indicator) triple; a fresh entry
// supersedes everything else under this prefix
pub fn indicator_series_prefix(symbol: &str, timeframe: Timeframe, indicator_name: &str) -> String {
    format!(
        "{}{}:{}:",
        indicator_symbol_prefix(symbol),
        timeframe,
        indicator_name
    )
}

// Cache key for a calculated indicator
pub fn indicator_key(
    symbol: &str,
    timeframe: Timeframe,
    indicator_name: &str,
    params_hash: &str,
    ohlc_hash: &str,
) -> String {
    format!(
        "{}{}:{}",
        indicator_series_prefix(symbol, timeframe, indicator_name),
        params_hash,
        ohlc_hash
    )
}

/// Hash of everything in the configuration that changes the output.
pub fn params_hash(options: &RsiOptions, signal_period: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update((options.period as u64).to_le_bytes());
    hasher.update(options.source.to_string().as_bytes());
    hasher.update([0u8]);
    hasher.update(options.smoothing.to_string().as_bytes());
    hasher.update([0u8]);
    hasher.update([options.clamp_edges as u8]);
    match options.precision {
        Some(digits) => {
            hasher.update([1u8]);
            hasher.update(digits.to_le_bytes());
        }
        None => hasher.update([0u8]),
    }
    hasher.update((signal_period as u64).to_le_bytes());
    finish(hasher)
}

/// Hash of the candle fields the RSI engine reads.
///
/// Volume is deliberately left out: a volume-only revision must not
/// invalidate cached indicators.
pub fn ohlc_hash(candles: &[Candle]) -> String {
    let mut hasher = Sha256::new();
    hasher.update((candles.len() as u64).to_le_bytes());
    for c in candles {
        hasher.update(c.timestamp.to_le_bytes());
        hasher.update(c.open.to_bits().to_le_bytes());
        hasher.update(c.high.to_bits().to_le_bytes());
        hasher.update(c.low.to_bits().to_le_bytes());
        hasher.update(c.close.to_bits().to_le_bytes());
    }
    finish(hasher)
}

fn finish(hasher: Sha256) -> String {
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(HASH_LEN);
    digest
}
