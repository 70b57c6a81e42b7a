//! State Store (§4.2): rule leases, send-time dedup, and alert history,
//! against either a SQLite or a networked (PostgreSQL) relational store.
//!
//! Per the REDESIGN FLAGS note on "dialect-conditional SQL": the two
//! dialects differ only in the insert-or-ignore idiom and are otherwise
//! identical, because both schemas store timestamps as unix-epoch integers
//! rather than native date types, so the date-arithmetic fragment for
//! expiry is plain integer arithmetic in both.

mod queries;

use crate::config::StateStoreConfig;
use crate::error::{EngineError, Result};
use crate::models::{AlertHistoryRow, DedupeKey, Level};
use chrono::{DateTime, Local, TimeZone, Timelike, Utc};
use serde_json::Value;
use sqlx::{Pool, Postgres, Sqlite};
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

#[derive(Clone)]
enum AnyPool {
    Sqlite(Pool<Sqlite>),
    Postgres(Pool<Postgres>),
}

#[derive(Clone)]
pub struct StateStore {
    pool: AnyPool,
    dialect: Dialect,
}

/// A page of alert history rows plus the applied filter, for the admin
/// read-only query helpers (§4.2 "Query helpers").
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub rule_name: Option<String>,
    pub level: Option<Level>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Default)]
pub struct LevelHistogram {
    pub counts: Vec<(Level, i64)>,
}

#[derive(Debug, Clone, Default)]
pub struct HourlyHistogram {
    /// (local hour-of-day 0..23, count)
    pub counts: Vec<(u32, i64)>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct HistoryRow {
    id: i64,
    alert_id: String,
    rule_name: String,
    level: String,
    message: String,
    timestamp: i64,
    count: i64,
    matches: String,
    data: String,
    created_at: i64,
}

impl HistoryRow {
    fn into_model(self) -> AlertHistoryRow {
        AlertHistoryRow {
            id: self.id,
            alert_id: self.alert_id,
            rule_name: self.rule_name,
            level: Level::from_str(&self.level).unwrap_or(Level::Info),
            message: self.message,
            timestamp: Utc.timestamp_opt(self.timestamp, 0).single().unwrap_or_else(Utc::now),
            count: self.count,
            matches: serde_json::from_str(&self.matches).unwrap_or(Value::Null),
            data: serde_json::from_str(&self.data).unwrap_or(Value::Null),
            created_at: Utc.timestamp_opt(self.created_at, 0).single().unwrap_or_else(Utc::now),
        }
    }
}

impl StateStore {
    pub async fn connect(config: &StateStoreConfig) -> Result<Self> {
        match config {
            StateStoreConfig::EmbeddedFile { path } => {
                let url = format!("sqlite://{path}?mode=rwc");
                let pool = sqlx::sqlite::SqlitePoolOptions::new()
                    .max_connections(5)
                    .connect(&url)
                    .await?;
                let store = Self {
                    pool: AnyPool::Sqlite(pool),
                    dialect: Dialect::Sqlite,
                };
                store.run_migrations("migrations/sqlite").await?;
                Ok(store)
            }
            StateStoreConfig::Networked { url, max_connections } => {
                let pool = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(*max_connections)
                    .connect(url)
                    .await?;
                let store = Self {
                    pool: AnyPool::Postgres(pool),
                    dialect: Dialect::Postgres,
                };
                store.run_migrations("migrations/postgres").await?;
                Ok(store)
            }
        }
    }

    #[cfg(test)]
    pub async fn connect_memory_for_tests() -> Result<Self> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self {
            pool: AnyPool::Sqlite(pool),
            dialect: Dialect::Sqlite,
        };
        store.run_migrations("migrations/sqlite").await?;
        Ok(store)
    }

    async fn run_migrations(&self, dir: &str) -> Result<()> {
        let migrator = sqlx::migrate::Migrator::new(std::path::Path::new(dir))
            .await
            .map_err(|e| EngineError::ConfigInvalid(format!("migration load failed: {e}")))?;
        match &self.pool {
            AnyPool::Sqlite(p) => migrator.run(p).await,
            AnyPool::Postgres(p) => migrator.run(p).await,
        }
        .map_err(|e| EngineError::ConfigInvalid(format!("migration run failed: {e}")))?;
        Ok(())
    }

    /// Lease acquisition (§4.2). Upserts the row (no-op on conflict), then
    /// performs the conditional update; returns true iff exactly one row
    /// changed.
    pub async fn try_acquire_lease(&self, rule_name: &str, holder: &str, ttl_seconds: i64) -> Result<bool> {
        let now = Utc::now().timestamp();
        match &self.pool {
            AnyPool::Sqlite(p) => {
                sqlx::query(queries::SQLITE_UPSERT_LEASE)
                    .bind(rule_name)
                    .bind(ttl_seconds)
                    .execute(p)
                    .await?;
                let result = sqlx::query(queries::ACQUIRE_LEASE)
                    .bind(holder)
                    .bind(now)
                    .bind(rule_name)
                    .bind(now)
                    .bind(holder)
                    .execute(p)
                    .await?;
                Ok(result.rows_affected() == 1)
            }
            AnyPool::Postgres(p) => {
                sqlx::query(queries::POSTGRES_UPSERT_LEASE)
                    .bind(rule_name)
                    .bind(ttl_seconds)
                    .execute(p)
                    .await?;
                let result = sqlx::query(&queries::pg_placeholders(queries::ACQUIRE_LEASE))
                    .bind(holder)
                    .bind(now)
                    .bind(rule_name)
                    .bind(now)
                    .bind(holder)
                    .execute(p)
                    .await?;
                Ok(result.rows_affected() == 1)
            }
        }
    }

    /// Release the lease (§4.2), only if still held by `holder`.
    pub async fn release_lease(&self, rule_name: &str, holder: &str, ttl_seconds: i64) -> Result<()> {
        let backdated = Utc::now().timestamp() - ttl_seconds - 1;
        match &self.pool {
            AnyPool::Sqlite(p) => {
                sqlx::query(queries::RELEASE_LEASE)
                    .bind(backdated)
                    .bind(rule_name)
                    .bind(holder)
                    .execute(p)
                    .await?;
            }
            AnyPool::Postgres(p) => {
                sqlx::query(&queries::pg_placeholders(queries::RELEASE_LEASE))
                    .bind(backdated)
                    .bind(rule_name)
                    .bind(holder)
                    .execute(p)
                    .await?;
            }
        }
        Ok(())
    }

    /// Send-time dedup (§4.2), implemented as the atomic conditional-update
    /// variant per Open Question 4 (SPEC_FULL.md §9): insert a placeholder
    /// row that always loses the first race, then attempt the conditional
    /// update and treat `rows_affected = 1` as the acquisition signal.
    pub async fn check_and_touch(&self, key: &DedupeKey, ttl_seconds: i64) -> Result<bool> {
        let now = Utc::now().timestamp();
        let placeholder_last_sent = now - ttl_seconds - 1;
        let k = key.key();
        match &self.pool {
            AnyPool::Sqlite(p) => {
                sqlx::query(queries::SQLITE_UPSERT_DEDUPE)
                    .bind(&k)
                    .bind(&key.rule_name)
                    .bind(key.level.to_string())
                    .bind(placeholder_last_sent)
                    .bind(ttl_seconds)
                    .execute(p)
                    .await?;
                let result = sqlx::query(queries::TOUCH_DEDUPE)
                    .bind(now)
                    .bind(&k)
                    .bind(now - ttl_seconds)
                    .execute(p)
                    .await?;
                Ok(result.rows_affected() == 1)
            }
            AnyPool::Postgres(p) => {
                sqlx::query(queries::POSTGRES_UPSERT_DEDUPE)
                    .bind(&k)
                    .bind(&key.rule_name)
                    .bind(key.level.to_string())
                    .bind(placeholder_last_sent)
                    .bind(ttl_seconds)
                    .execute(p)
                    .await?;
                let result = sqlx::query(&queries::pg_placeholders(queries::TOUCH_DEDUPE))
                    .bind(now)
                    .bind(&k)
                    .bind(now - ttl_seconds)
                    .execute(p)
                    .await?;
                Ok(result.rows_affected() == 1)
            }
        }
    }

    /// Straight insert of a history row (§4.2 "History write").
    pub async fn insert_history(
        &self,
        alert_id: &str,
        rule_name: &str,
        level: Level,
        message: &str,
        timestamp: DateTime<Utc>,
        count: i64,
        matches: &Value,
        data: &Value,
    ) -> Result<()> {
        let matches_json = serde_json::to_string(matches)?;
        let data_json = serde_json::to_string(data)?;
        let created_at = Utc::now().timestamp();
        match &self.pool {
            AnyPool::Sqlite(p) => {
                sqlx::query(queries::INSERT_HISTORY)
                    .bind(alert_id)
                    .bind(rule_name)
                    .bind(level.to_string())
                    .bind(message)
                    .bind(timestamp.timestamp())
                    .bind(count)
                    .bind(matches_json)
                    .bind(data_json)
                    .bind(created_at)
                    .execute(p)
                    .await?;
            }
            AnyPool::Postgres(p) => {
                sqlx::query(&queries::pg_placeholders(queries::INSERT_HISTORY))
                    .bind(alert_id)
                    .bind(rule_name)
                    .bind(level.to_string())
                    .bind(message)
                    .bind(timestamp.timestamp())
                    .bind(count)
                    .bind(matches_json)
                    .bind(data_json)
                    .bind(created_at)
                    .execute(p)
                    .await?;
            }
        }
        Ok(())
    }

    /// Paged read by time window / rule name / level (§4.2 "Query helpers").
    pub async fn list_history(&self, filter: &HistoryFilter) -> Result<Vec<AlertHistoryRow>> {
        let rows: Vec<HistoryRow> = match &self.pool {
            AnyPool::Sqlite(p) => {
                sqlx::query_as(queries::LIST_HISTORY_SQLITE)
                    .bind(filter.rule_name.clone())
                    .bind(filter.rule_name.clone())
                    .bind(filter.level.map(|l| l.to_string()))
                    .bind(filter.level.map(|l| l.to_string()))
                    .bind(filter.since.map(|d| d.timestamp()))
                    .bind(filter.since.map(|d| d.timestamp()))
                    .bind(filter.until.map(|d| d.timestamp()))
                    .bind(filter.until.map(|d| d.timestamp()))
                    .bind(filter.limit)
                    .bind(filter.offset)
                    .fetch_all(p)
                    .await?
            }
            AnyPool::Postgres(p) => {
                sqlx::query_as(&queries::pg_placeholders(queries::LIST_HISTORY_SQLITE))
                    .bind(filter.rule_name.clone())
                    .bind(filter.rule_name.clone())
                    .bind(filter.level.map(|l| l.to_string()))
                    .bind(filter.level.map(|l| l.to_string()))
                    .bind(filter.since.map(|d| d.timestamp()))
                    .bind(filter.since.map(|d| d.timestamp()))
                    .bind(filter.until.map(|d| d.timestamp()))
                    .bind(filter.until.map(|d| d.timestamp()))
                    .bind(filter.limit)
                    .bind(filter.offset)
                    .fetch_all(p)
                    .await?
            }
        };
        Ok(rows.into_iter().map(HistoryRow::into_model).collect())
    }

    /// Detail lookup by alert id (§4.2 "Query helpers").
    pub async fn get_by_alert_id(&self, alert_id: &str) -> Result<Option<AlertHistoryRow>> {
        let row: Option<HistoryRow> = match &self.pool {
            AnyPool::Sqlite(p) => sqlx::query_as(queries::GET_BY_ALERT_ID)
                .bind(alert_id)
                .fetch_optional(p)
                .await?,
            AnyPool::Postgres(p) => sqlx::query_as(&queries::pg_placeholders(queries::GET_BY_ALERT_ID))
                .bind(alert_id)
                .fetch_optional(p)
                .await?,
        };
        Ok(row.map(HistoryRow::into_model))
    }

    /// Hourly bucket histogram in local time (§4.2 "Query helpers"). Bucketing
    /// is done in Rust rather than in SQL so both dialects share one code path
    /// regardless of which date functions each one offers.
    pub async fn hourly_histogram(&self) -> Result<HourlyHistogram> {
        let rows: Vec<(i64,)> = match &self.pool {
            AnyPool::Sqlite(p) => sqlx::query_as(queries::HOURLY_TIMESTAMPS).fetch_all(p).await?,
            AnyPool::Postgres(p) => sqlx::query_as(queries::HOURLY_TIMESTAMPS).fetch_all(p).await?,
        };
        let mut buckets = [0i64; 24];
        for (ts,) in rows {
            if let Some(dt) = Utc.timestamp_opt(ts, 0).single() {
                let hour = dt.with_timezone(&Local).hour();
                buckets[hour as usize] += 1;
            }
        }
        Ok(HourlyHistogram {
            counts: (0u32..24).zip(buckets).collect(),
        })
    }

    /// Level histogram aggregate (§4.2 "Query helpers").
    pub async fn level_histogram(&self) -> Result<LevelHistogram> {
        let rows: Vec<(String, i64)> = match &self.pool {
            AnyPool::Sqlite(p) => sqlx::query_as(queries::LEVEL_HISTOGRAM).fetch_all(p).await?,
            AnyPool::Postgres(p) => sqlx::query_as(queries::LEVEL_HISTOGRAM).fetch_all(p).await?,
        };
        Ok(LevelHistogram {
            counts: rows
                .into_iter()
                .map(|(l, c)| (Level::from_str(&l).unwrap_or(Level::Info), c))
                .collect(),
        })
    }

    /// Recent 10 alerts (§4.2 "Query helpers").
    pub async fn recent(&self, n: i64) -> Result<Vec<AlertHistoryRow>> {
        let filter = HistoryFilter {
            limit: n,
            ..Default::default()
        };
        self.list_history(&filter).await
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Liveness probe: round-trips a trivial query against the pool, for
    /// `/healthz` (§9 ambient admin surface).
    pub async fn health_probe(&self) -> Result<()> {
        match &self.pool {
            AnyPool::Sqlite(p) => sqlx::query("SELECT 1").execute(p).await,
            AnyPool::Postgres(p) => sqlx::query("SELECT 1").execute(p).await,
        }
        .map_err(EngineError::Database)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DedupeKey;

    #[tokio::test]
    async fn lease_is_exclusive_until_released() {
        let store = StateStore::connect_memory_for_tests().await.unwrap();
        assert!(store.try_acquire_lease("r1", "replica-a", 30).await.unwrap());
        assert!(!store.try_acquire_lease("r1", "replica-b", 30).await.unwrap());
        // Re-entrance by the same holder is allowed.
        assert!(store.try_acquire_lease("r1", "replica-a", 30).await.unwrap());
        store.release_lease("r1", "replica-a", 30).await.unwrap();
        assert!(store.try_acquire_lease("r1", "replica-b", 30).await.unwrap());
    }

    #[tokio::test]
    async fn dedupe_suppresses_within_ttl() {
        let store = StateStore::connect_memory_for_tests().await.unwrap();
        let key = DedupeKey::new("r1", Level::High, "boom");
        assert!(store.check_and_touch(&key, 120).await.unwrap());
        assert!(!store.check_and_touch(&key, 120).await.unwrap());
    }

    /// P4: across replicas racing the same tick, exactly one passes step 1
    /// of §4.3. Spawns real concurrent tasks on a shared pool rather than
    /// calling sequentially, so the conditional `UPDATE` in `ACQUIRE_LEASE`
    /// actually has to win a race instead of running against an already-settled
    /// row.
    #[tokio::test]
    async fn lease_race_grants_exactly_one_winner() {
        let store = StateStore::connect_memory_for_tests().await.unwrap();
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.try_acquire_lease("race-rule", &format!("replica-{i}"), 30).await.unwrap()
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    /// P5: at most one concurrent `checkAndTouch` call on the same key
    /// returns true within the TTL window. Same rationale as the lease race
    /// test above — real `tokio::spawn` tasks racing `TOUCH_DEDUPE`.
    #[tokio::test]
    async fn dedupe_race_grants_exactly_one_winner() {
        let store = StateStore::connect_memory_for_tests().await.unwrap();
        let key = DedupeKey::new("race-rule", Level::High, "boom");
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move { store.check_and_touch(&key, 120).await.unwrap() }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn history_roundtrips() {
        let store = StateStore::connect_memory_for_tests().await.unwrap();
        store
            .insert_history(
                "r1-123",
                "r1",
                Level::High,
                "boom",
                Utc::now(),
                7,
                &Value::Array(vec![]),
                &Value::Null,
            )
            .await
            .unwrap();
        let row = store.get_by_alert_id("r1-123").await.unwrap();
        assert!(row.is_some());
        assert_eq!(row.unwrap().count, 7);
        assert!(store.get_by_alert_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn hourly_histogram_buckets_sum_to_total() {
        let store = StateStore::connect_memory_for_tests().await.unwrap();
        for i in 0..5 {
            store
                .insert_history(
                    &format!("r1-{i}"),
                    "r1",
                    Level::Low,
                    "boom",
                    Utc::now(),
                    1,
                    &Value::Array(vec![]),
                    &Value::Null,
                )
                .await
                .unwrap();
        }
        let hist = store.hourly_histogram().await.unwrap();
        assert_eq!(hist.counts.len(), 24);
        assert_eq!(hist.counts.iter().map(|(_, c)| c).sum::<i64>(), 5);
    }
}
