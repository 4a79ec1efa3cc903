use chrono::NaiveDateTime;
use coinflow_core::{naive_utc_from_millis, Symbol, TickerUpdate};
use rust_decimal::Decimal;

pub(crate) const BASE_MS: i64 = 1_700_000_000_000;

pub(crate) fn ts(ms: i64) -> NaiveDateTime {
    naive_utc_from_millis(ms).unwrap()
}

/// BTCUSDT tick `n` seconds after the base time.
pub(crate) fn tick(n: i64) -> TickerUpdate {
    tick_for("BTCUSDT", n)
}

pub(crate) fn tick_for(symbol: &str, n: i64) -> TickerUpdate {
    let price = Decimal::new(4_200_050 + n, 2);
    TickerUpdate {
        symbol: Symbol::new(symbol).unwrap(),
        event_time: ts(BASE_MS + n * 1000),
        price,
        price_change: Decimal::new(105, 1),
        price_change_percent: Decimal::new(2, 2),
        high: price,
        low: price,
        volume: Decimal::new(12345, 1),
        ingest_time: ts(BASE_MS + n * 1000 + 150),
    }
}
