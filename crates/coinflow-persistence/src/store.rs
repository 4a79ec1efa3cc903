//! PostgreSQL tick store.
//!
//! Holds a single `PgConnection` rather than a pool: exactly one task writes
//! and it never issues concurrent statements. A failed write leaves the
//! connection in an unknown state, so the caller recycles it through
//! [`TickSink::reconnect`].

use crate::backoff::RetryPolicy;
use crate::error::{PersistenceError, PersistenceResult};
use crate::forecast::{dedup_forecasts, ForecastPoint, Granularity, PriceSample};
use crate::schema::{self, ROWS_PER_INSERT};
use crate::sink::TickSink;
use chrono::NaiveDateTime;
use coinflow_core::{now_naive_utc, Symbol, TickerUpdate};
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection, Postgres, QueryBuilder};
use std::time::Duration;
use tracing::{debug, info, warn};

const INSERT_TICKS: &str = "INSERT INTO public.coin_ticks \
     (symbol, event_time, price, price_change, price_change_percent, high, low, volume, ingest_ts) ";

const INSERT_FORECASTS: &str = "INSERT INTO public.coin_forecasts \
     (symbol, forecast_time, predicted_price, lower_bound, upper_bound, created_at) ";

const UPSERT_FORECASTS: &str = " ON CONFLICT (symbol, forecast_time) DO UPDATE SET \
     predicted_price = EXCLUDED.predicted_price, \
     lower_bound = EXCLUDED.lower_bound, \
     upper_bound = EXCLUDED.upper_bound, \
     created_at = EXCLUDED.created_at";

const PRICE_HISTORY: &str = "SELECT date_trunc($1, event_time) AS ts, AVG(price) AS price \
     FROM public.coin_ticks \
     WHERE symbol = $2 AND event_time >= $3 \
     GROUP BY 1 ORDER BY 1";

/// Store connection settings.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub connect: PgConnectOptions,
    /// Applied to every connection attempt, initial and reconnect.
    pub retry: RetryPolicy,
    /// Upper bound on one batch transaction.
    pub write_timeout: Duration,
}

impl StoreConfig {
    pub fn new(connect: PgConnectOptions) -> Self {
        Self {
            connect,
            retry: RetryPolicy::default(),
            write_timeout: Duration::from_secs(10),
        }
    }
}

pub struct PgTickStore {
    config: StoreConfig,
    conn: Option<PgConnection>,
}

impl PgTickStore {
    /// Connect with backoff.
    pub async fn connect(config: StoreConfig) -> PersistenceResult<Self> {
        let conn = open(&config).await?;
        info!(
            host = config.connect.get_host(),
            database = config.connect.get_database().unwrap_or_default(),
            "Store connected"
        );
        Ok(Self {
            config,
            conn: Some(conn),
        })
    }

    /// A store with no connection yet; the first `reconnect` opens one.
    pub fn disconnected(config: StoreConfig) -> Self {
        Self { config, conn: None }
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn conn(&mut self) -> PersistenceResult<&mut PgConnection> {
        self.conn.as_mut().ok_or(PersistenceError::NotConnected)
    }

    /// Create the tick and forecast tables if they do not exist.
    pub async fn ensure_schema(&mut self) -> PersistenceResult<()> {
        let conn = self.conn()?;
        for statement in schema::ALL {
            sqlx::query(statement).execute(&mut *conn).await?;
        }
        info!("Store schema ready");
        Ok(())
    }

    /// Averaged price history for `symbol`, oldest first.
    pub async fn fetch_price_history(
        &mut self,
        symbol: &Symbol,
        granularity: Granularity,
    ) -> PersistenceResult<Vec<PriceSample>> {
        let since = granularity.since(now_naive_utc());
        let conn = self.conn()?;

        let rows: Vec<(NaiveDateTime, Decimal)> = sqlx::query_as(PRICE_HISTORY)
            .bind(granularity.trunc_unit())
            .bind(symbol.as_str())
            .bind(since)
            .fetch_all(&mut *conn)
            .await?;

        debug!(
            symbol = %symbol,
            unit = granularity.trunc_unit(),
            samples = rows.len(),
            "Fetched price history"
        );
        Ok(rows
            .into_iter()
            .map(|(ts, price)| PriceSample { ts, price })
            .collect())
    }

    /// Upsert forecast points in one transaction. Returns rows written.
    pub async fn save_forecasts(&mut self, points: &[ForecastPoint]) -> PersistenceResult<u64> {
        if points.is_empty() {
            return Ok(0);
        }
        let points = dedup_forecasts(points);
        let conn = self.conn()?;

        let mut tx = conn.begin().await?;
        let mut written = 0;
        for chunk in points.chunks(ROWS_PER_INSERT) {
            let mut query = QueryBuilder::<Postgres>::new(INSERT_FORECASTS);
            query.push_values(chunk.iter().copied(), |mut row, point| {
                row.push_bind(point.symbol.as_str())
                    .push_bind(point.forecast_time)
                    .push_bind(point.predicted_price)
                    .push_bind(point.lower_bound)
                    .push_bind(point.upper_bound)
                    .push_bind(point.created_at);
            });
            query.push(UPSERT_FORECASTS);
            written += query.build().execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;

        info!(written, "Saved forecasts");
        Ok(written)
    }

    /// Close the connection cleanly.
    pub async fn close(mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err(e) = conn.close().await {
                warn!(error = %e, "Error closing store connection");
            }
        }
    }
}

impl TickSink for PgTickStore {
    async fn write_batch(&mut self, batch: &[TickerUpdate]) -> PersistenceResult<u64> {
        if batch.is_empty() {
            return Ok(0);
        }
        let timeout = self.config.write_timeout;
        let conn = self.conn()?;

        tokio::time::timeout(timeout, insert_ticks(conn, batch))
            .await
            .map_err(|_| PersistenceError::Timeout(timeout))?
    }

    async fn reconnect(&mut self) -> PersistenceResult<()> {
        if let Some(stale) = self.conn.take() {
            // Best effort; the socket may already be gone
            match tokio::time::timeout(self.config.write_timeout, stale.close()).await {
                Ok(Err(e)) => debug!(error = %e, "Stale store connection did not close cleanly"),
                Err(_) => debug!("Timed out closing stale store connection"),
                Ok(Ok(())) => {}
            }
        }

        let conn = open(&self.config).await?;
        self.conn = Some(conn);
        info!("Store connection re-established");
        Ok(())
    }
}

async fn open(config: &StoreConfig) -> PersistenceResult<PgConnection> {
    config
        .retry
        .retry("store connect", || PgConnection::connect_with(&config.connect))
        .await
        .map_err(|source| PersistenceError::ConnectExhausted {
            attempts: config.retry.attempts(),
            source,
        })
}

/// Insert `batch` in one transaction, chunked under the bind limit.
async fn insert_ticks(conn: &mut PgConnection, batch: &[TickerUpdate]) -> PersistenceResult<u64> {
    let mut tx = conn.begin().await?;
    let mut inserted = 0;

    for chunk in batch.chunks(ROWS_PER_INSERT) {
        let mut query = QueryBuilder::<Postgres>::new(INSERT_TICKS);
        query.push_values(chunk, |mut row, update| {
            row.push_bind(update.symbol.as_str())
                .push_bind(update.event_time)
                .push_bind(update.price)
                .push_bind(update.price_change)
                .push_bind(update.price_change_percent)
                .push_bind(update.high)
                .push_bind(update.low)
                .push_bind(update.volume)
                .push_bind(update.ingest_time);
        });
        query.push(" ON CONFLICT (symbol, event_time) DO NOTHING");
        inserted += query.build().execute(&mut *tx).await?.rows_affected();
    }

    tx.commit().await?;
    Ok(inserted)
}
