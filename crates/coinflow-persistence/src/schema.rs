//! Table definitions, applied with `CREATE TABLE IF NOT EXISTS`.

pub const CREATE_COIN_TICKS: &str = r#"
CREATE TABLE IF NOT EXISTS public.coin_ticks (
    symbol               TEXT      NOT NULL,
    event_time           TIMESTAMP NOT NULL,
    price                NUMERIC   NOT NULL,
    price_change         NUMERIC   NOT NULL,
    price_change_percent NUMERIC   NOT NULL,
    high                 NUMERIC   NOT NULL,
    low                  NUMERIC   NOT NULL,
    volume               NUMERIC   NOT NULL,
    ingest_ts            TIMESTAMP NOT NULL,
    PRIMARY KEY (symbol, event_time)
)"#;

pub const CREATE_COIN_FORECASTS: &str = r#"
CREATE TABLE IF NOT EXISTS public.coin_forecasts (
    symbol          TEXT      NOT NULL,
    forecast_time   TIMESTAMP NOT NULL,
    predicted_price NUMERIC   NOT NULL,
    lower_bound     NUMERIC   NOT NULL,
    upper_bound     NUMERIC   NOT NULL,
    created_at      TIMESTAMP NOT NULL,
    PRIMARY KEY (symbol, forecast_time)
)"#;

/// Statements in application order.
pub const ALL: [&str; 2] = [CREATE_COIN_TICKS, CREATE_COIN_FORECASTS];

/// Columns written per tick row.
pub const TICK_COLUMNS: usize = 9;

/// PostgreSQL caps a statement at 65535 bind parameters.
pub const MAX_BIND_PARAMS: usize = 65_535;

/// Rows per INSERT statement so one chunk stays under the bind limit.
pub const ROWS_PER_INSERT: usize = 5_000;

const _: () = assert!(ROWS_PER_INSERT * TICK_COLUMNS <= MAX_BIND_PARAMS);
