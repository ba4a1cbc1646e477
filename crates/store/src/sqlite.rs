use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::Row;

use tally_core::store::{CounterStore, StoreError};

use crate::DbPool;

/// Counter store backed by the `counter_kv` table.
pub struct SqliteCounterStore {
    pool: DbPool,
    timeout: Duration,
}

impl SqliteCounterStore {
    pub fn new(pool: DbPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, sqlx::Error>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => {
                Err(StoreError::Unavailable(format!("sqlite {operation} failed: {error}")))
            }
            Err(_) => Err(StoreError::Timeout { millis: millis(self.timeout) }),
        }
    }
}

#[async_trait]
impl CounterStore for SqliteCounterStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row = self
            .bounded(
                "get",
                sqlx::query("SELECT value FROM counter_kv WHERE key = ?1")
                    .bind(key)
                    .fetch_optional(&self.pool),
            )
            .await?;
        Ok(row.map(|row| row.get::<String, _>("value")))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.bounded(
            "set",
            sqlx::query(
                "INSERT INTO counter_kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
            )
            .bind(key)
            .bind(value)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn increment(&self, key: &str) -> Result<i64, StoreError> {
        // The WHERE guard leaves non-integer values untouched and returns no row.
        let row = self
            .bounded(
                "increment",
                sqlx::query(
                    "INSERT INTO counter_kv (key, value) VALUES (?1, '1')
                     ON CONFLICT(key) DO UPDATE SET
                        value = CAST(CAST(counter_kv.value AS INTEGER) + 1 AS TEXT),
                        updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE CAST(CAST(counter_kv.value AS INTEGER) AS TEXT) = counter_kv.value
                     RETURNING value",
                )
                .bind(key)
                .fetch_optional(&self.pool),
            )
            .await?;

        let not_an_integer = || StoreError::NotAnInteger { key: key.to_owned() };
        let raw = row.map(|row| row.get::<String, _>("value")).ok_or_else(not_an_integer)?;
        raw.parse::<i64>().map_err(|_| not_an_integer())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, StoreError> {
        // substr comparison keeps `_` and `%` in user ids literal.
        let rows = self
            .bounded(
                "scan",
                sqlx::query(
                    "SELECT key, value FROM counter_kv WHERE substr(key, 1, length(?1)) = ?2",
                )
                .bind(prefix)
                .bind(prefix)
                .fetch_all(&self.pool),
            )
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get::<String, _>("key"), row.get::<String, _>("value")))
            .collect())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
    ) -> Result<bool, StoreError> {
        let result = match expected {
            None => {
                self.bounded(
                    "compare_and_swap",
                    sqlx::query(
                        "INSERT INTO counter_kv (key, value) VALUES (?1, ?2)
                         ON CONFLICT(key) DO NOTHING",
                    )
                    .bind(key)
                    .bind(new)
                    .execute(&self.pool),
                )
                .await?
            }
            Some(expected) => {
                self.bounded(
                    "compare_and_swap",
                    sqlx::query(
                        "UPDATE counter_kv
                         SET value = ?1, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                         WHERE key = ?2 AND value = ?3",
                    )
                    .bind(new)
                    .bind(key)
                    .bind(expected)
                    .execute(&self.pool),
                )
                .await?
            }
        };
        Ok(result.rows_affected() == 1)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.bounded("ping", sqlx::query("SELECT 1").execute(&self.pool)).await.map(|_| ())
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
