//! SQLite storage backend implementation
//!
//! Gauges and counters live in two tables with one row per metric name.
//! Writes are upserts: gauges take the new value, counters add to the
//! stored total.
//!
//! ## Features
//!
//! - **WAL mode**: reads proceed while a batch is being written
//! - **Migrations**: embedded `sqlx` migrations, applied idempotently at startup
//! - **Retries**: every statement runs through a `RetryExecutor`, so lock
//!   contention and dropped connections are retried with backoff
//! - **Integer counters**: a trigger refuses sums that would leave the
//!   `i64` range, so an overflowing write fails instead of storing a REAL
//! - **Atomic batches**: a batch is one transaction; any failing statement
//!   rolls the whole batch back

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use futures::StreamExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::backend::{MetricSnapshot, StorageEngine};
use super::error::{StorageError, StorageResult};
use crate::retry::RetryExecutor;
use crate::{Metric, MetricKind, MetricValue};

const UPSERT_GAUGE: &str = r#"
    INSERT INTO gauges (name, value) VALUES (?, ?)
    ON CONFLICT (name) DO UPDATE SET value = excluded.value
"#;

const UPSERT_COUNTER: &str = r#"
    INSERT INTO counters (name, value) VALUES (?, ?)
    ON CONFLICT (name) DO UPDATE SET value = counters.value + excluded.value
"#;

/// Relational metric store on top of a SQLite connection pool.
pub struct RelationalStore {
    pool: Pool<Sqlite>,
    retry: RetryExecutor,
}

impl RelationalStore {
    /// Open (or create) the database named by `dsn` and apply migrations.
    ///
    /// `dsn` is either a `sqlite:` URL or a plain file path. Connecting and
    /// migrating are both retried; failing after the retry budget is fatal.
    ///
    /// ## Example
    ///
    /// ```no_run
    /// # use metrics_relay::{retry::RetryExecutor, storage::sqlite::RelationalStore};
    /// # async fn example() -> anyhow::Result<()> {
    /// let store = RelationalStore::connect("./metrics.db", RetryExecutor::default()).await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip(retry))]
    pub async fn connect(dsn: &str, retry: RetryExecutor) -> StorageResult<Self> {
        let options = if dsn.starts_with("sqlite:") {
            SqliteConnectOptions::from_str(dsn)
                .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?
        } else {
            SqliteConnectOptions::new().filename(Path::new(dsn))
        };

        let options = options
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        info!("opening SQLite store at {dsn}");

        let pool = retry
            .run(|| {
                let options = options.clone();
                async move {
                    SqlitePoolOptions::new()
                        .max_connections(5)
                        .connect_with(options)
                        .await
                        .map_err(StorageError::from)
                }
            })
            .await?;

        debug!("running database migrations");
        retry
            .run(|| async {
                sqlx::migrate!("./migrations")
                    .run(&pool)
                    .await
                    .map_err(StorageError::from)
            })
            .await?;

        info!("database migrations complete");

        Ok(Self { pool, retry })
    }

    /// Underlying connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    async fn apply_batch(&self, metrics: &[Metric]) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        for metric in metrics {
            match metric.payload() {
                Some(MetricValue::Gauge(value)) => {
                    sqlx::query(UPSERT_GAUGE)
                        .bind(&metric.id)
                        .bind(value)
                        .execute(&mut *tx)
                        .await?;
                }
                Some(MetricValue::Counter(delta)) => {
                    sqlx::query(UPSERT_COUNTER)
                        .bind(&metric.id)
                        .bind(delta)
                        .execute(&mut *tx)
                        .await?;
                }
                None => warn!("skipping {} {} without a payload", metric.kind, metric.id),
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn scan_table<T>(&self, table: &str, into: &mut std::collections::BTreeMap<String, T>)
    where
        T: for<'r> sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite> + Send + Unpin,
    {
        let sql = format!("SELECT name, value FROM {table}");
        let mut rows = sqlx::query(&sql).fetch(&self.pool);

        while let Some(row) = rows.next().await {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    warn!("reading {table} stopped early: {e}");
                    break;
                }
            };

            match (row.try_get::<String, _>("name"), row.try_get::<T, _>("value")) {
                (Ok(name), Ok(value)) => {
                    into.insert(name, value);
                }
                (Err(e), _) | (_, Err(e)) => warn!("skipping unreadable {table} row: {e}"),
            }
        }
    }
}

#[async_trait]
impl StorageEngine for RelationalStore {
    #[instrument(skip(self))]
    async fn save_gauge(&self, name: &str, value: f64) -> StorageResult<()> {
        self.retry
            .run(|| async {
                sqlx::query(UPSERT_GAUGE)
                    .bind(name)
                    .bind(value)
                    .execute(&self.pool)
                    .await
                    .map_err(StorageError::from)
            })
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn save_counter(&self, name: &str, delta: i64) -> StorageResult<()> {
        self.retry
            .run(|| async {
                sqlx::query(UPSERT_COUNTER)
                    .bind(name)
                    .bind(delta)
                    .execute(&self.pool)
                    .await
                    .map_err(StorageError::from)
            })
            .await?;
        Ok(())
    }

    async fn get_gauge(&self, name: &str) -> StorageResult<f64> {
        let value = self
            .retry
            .run(|| async {
                sqlx::query_scalar::<_, f64>("SELECT value FROM gauges WHERE name = ?")
                    .bind(name)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(StorageError::from)
            })
            .await?;

        value.ok_or_else(|| StorageError::not_found(MetricKind::Gauge, name))
    }

    async fn get_counter(&self, name: &str) -> StorageResult<i64> {
        let value = self
            .retry
            .run(|| async {
                sqlx::query_scalar::<_, i64>("SELECT value FROM counters WHERE name = ?")
                    .bind(name)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(StorageError::from)
            })
            .await?;

        value.ok_or_else(|| StorageError::not_found(MetricKind::Counter, name))
    }

    #[instrument(skip(self))]
    async fn get_all_metrics(&self) -> MetricSnapshot {
        let mut snapshot = MetricSnapshot::default();
        self.scan_table("gauges", &mut snapshot.gauges).await;
        self.scan_table("counters", &mut snapshot.counters).await;
        snapshot
    }

    #[instrument(skip(self, metrics), fields(count = metrics.len()))]
    async fn update_metrics_batch(&self, metrics: &[Metric]) -> StorageResult<()> {
        if metrics.is_empty() {
            return Ok(());
        }

        self.retry.run(|| self.apply_batch(metrics)).await?;

        debug!("batch of {} metrics committed", metrics.len());
        Ok(())
    }

    async fn ping(&self) -> StorageResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing SQLite store");
        self.pool.close().await;
        Ok(())
    }
}
