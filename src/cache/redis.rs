use crate::database::store::KeyValueStore;
use crate::error::StorageResult;
use parking_lot::Mutex;
use redis::{Commands, Connection};
use std::time::Duration;
use tracing::info;

/// Redis-backed key-value store.
///
/// Entries also get a Redis expiry as a backstop, so abandoned keys do not
/// accumulate; the caches still apply their own TTL on read.
pub struct RedisStore {
    conn: Mutex<Connection>,
    default_ttl: Option<Duration>,
}

impl RedisStore {
    pub fn connect(url: &str, default_ttl: Option<Duration>) -> StorageResult<Self> {
        let client = redis::Client::open(url)?;
        let mut conn = client.get_connection()?;

        // Test connection
        redis::cmd("PING").query::<String>(&mut conn)?;

        info!("Connected to Redis successfully");

        Ok(Self {
            conn: Mutex::new(conn),
            default_ttl,
        })
    }
}

impl KeyValueStore for RedisStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let mut conn = self.conn.lock();
        Ok(conn.get(key)?)
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut conn = self.conn.lock();

        match self.default_ttl {
            Some(ttl) => conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1) as usize)?,
            None => conn.set::<_, _, ()>(key, value)?,
        }

        Ok(())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        let mut conn = self.conn.lock();
        let removed: i32 = conn.del(key)?;
        Ok(removed == 1)
    }

    fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut conn = self.conn.lock();
        let pattern = format!("{}*", escape_glob(prefix));
        let mut keys: Vec<String> = conn.scan_match::<_, String>(pattern)?.collect();
        keys.sort();
        Ok(keys)
    }
}

// SCAN MATCH treats these as glob metacharacters
fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for ch in prefix.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_metacharacters_are_escaped() {
        assert_eq!(escape_glob("indicator:AAPL:"), "indicator:AAPL:");
        assert_eq!(escape_glob("a*b?[c]"), "a\\*b\\?\\[c\\]");
    }
}
