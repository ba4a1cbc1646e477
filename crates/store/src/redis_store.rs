//! Redis-backed counter store.
//!
//! Plain keys hold both the integer counters and the scalar game state, so a
//! deployment that already has data in Redis keeps working unchanged.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, ErrorKind, RedisError, RedisResult, Script};
use tracing::debug;

use tally_core::store::{CounterStore, StoreError};

const SCAN_BATCH: usize = 500;

// ARGV[1] = "1" when the key must be absent, ARGV[2] = expected value, ARGV[3] = new value.
const COMPARE_AND_SWAP: &str = r"
local current = redis.call('GET', KEYS[1])
if ARGV[1] == '1' then
  if current then return 0 end
elseif current ~= ARGV[2] then
  return 0
end
redis.call('SET', KEYS[1], ARGV[3])
return 1
";

#[derive(Clone)]
pub struct RedisCounterStore {
    conn_manager: ConnectionManager,
    cas_script: Script,
    timeout: Duration,
}

impl RedisCounterStore {
    /// Opens a managed connection to `redis_url`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] when the URL is invalid or the server
    /// cannot be reached within `timeout`.
    pub async fn connect(redis_url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::open(redis_url).map_err(|e| {
            StoreError::Unavailable(format!("failed to create Redis client: {e}"))
        })?;

        let conn_manager = tokio::time::timeout(timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Timeout { millis: millis(timeout) })?
            .map_err(|e| {
                StoreError::Unavailable(format!("failed to create Redis connection manager: {e}"))
            })?;

        Ok(Self { conn_manager, cas_script: Script::new(COMPARE_AND_SWAP), timeout })
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = RedisResult<T>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => {
                Err(StoreError::Unavailable(format!("redis {operation} failed: {error}")))
            }
            Err(_) => Err(StoreError::Timeout { millis: millis(self.timeout) }),
        }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn_manager.clone();
        let value: Option<String> = self.bounded("GET", conn.get(key)).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn_manager.clone();
        let _: () = self.bounded("SET", conn.set(key, value)).await?;
        Ok(())
    }

    async fn increment(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn_manager.clone();
        let next = self
            .bounded("INCR", async move {
                let reply: RedisResult<i64> = conn.incr(key, 1_i64).await;
                match reply {
                    Err(error) if refuses_non_integer(&error) => Ok(None),
                    other => other.map(Some),
                }
            })
            .await?;
        next.ok_or_else(|| StoreError::NotAnInteger { key: key.to_owned() })
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, StoreError> {
        let mut conn = self.conn_manager.clone();
        let pattern = format!("{}*", escape_glob(prefix));
        // SCAN may yield a key more than once across batches.
        let mut found: HashMap<String, String> = HashMap::new();
        let mut cursor: u64 = 0;

        loop {
            let mut scan = redis::cmd("SCAN");
            scan.arg(cursor).arg("MATCH").arg(&pattern).arg("COUNT").arg(SCAN_BATCH);
            let (next_cursor, keys): (u64, Vec<String>) =
                self.bounded("SCAN", scan.query_async(&mut conn)).await?;

            if !keys.is_empty() {
                let mut mget = redis::cmd("MGET");
                mget.arg(&keys);
                let values: Vec<Option<String>> =
                    self.bounded("MGET", mget.query_async(&mut conn)).await?;
                found.extend(
                    keys.into_iter()
                        .zip(values)
                        .filter_map(|(key, value)| value.map(|value| (key, value))),
                );
            }

            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }

        debug!(prefix = %prefix, matched = found.len(), "redis prefix scan finished");
        Ok(found.into_iter().collect())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn_manager.clone();
        let must_be_absent = if expected.is_none() { "1" } else { "0" };
        let mut invocation = self.cas_script.key(key);
        invocation.arg(must_be_absent).arg(expected.unwrap_or_default()).arg(new);

        let swapped: i64 = self.bounded("EVALSHA", invocation.invoke_async(&mut conn)).await?;
        Ok(swapped == 1)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn_manager.clone();
        let mut ping = redis::cmd("PING");
        let _: String = self.bounded("PING", ping.query_async(&mut conn)).await?;
        Ok(())
    }
}

/// Escapes the glob metacharacters `SCAN MATCH` understands.
/// INCR on a value Redis cannot parse as an integer.
fn refuses_non_integer(error: &RedisError) -> bool {
    error.kind() == ErrorKind::ResponseError && error.to_string().contains("not an integer")
}

fn escape_glob(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
