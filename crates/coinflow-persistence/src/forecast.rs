//! Forecast read side.
//!
//! A forecasting engine reads aggregated price history from the tick table
//! and writes predicted points back. The engine itself lives outside this
//! workspace; [`Forecaster`] is the seam it plugs into.

use chrono::{NaiveDateTime, TimeDelta};
use coinflow_core::Symbol;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// One aggregated point of a symbol's price history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceSample {
    pub ts: NaiveDateTime,
    pub price: Decimal,
}

/// History resolution and how far back to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    /// Hourly averages over the last `days` days.
    Hourly { days: u32 },
    /// Per-minute averages over the last `hours` hours.
    Minute { hours: u32 },
}

impl Granularity {
    /// Argument to `date_trunc`.
    pub fn trunc_unit(&self) -> &'static str {
        match self {
            Self::Hourly { .. } => "hour",
            Self::Minute { .. } => "minute",
        }
    }

    /// Start of the lookback window ending at `now`.
    pub fn since(&self, now: NaiveDateTime) -> NaiveDateTime {
        let span = match *self {
            Self::Hourly { days } => TimeDelta::try_days(days.into()),
            Self::Minute { hours } => TimeDelta::try_hours(hours.into()),
        };
        span.and_then(|span| now.checked_sub_signed(span))
            .unwrap_or(NaiveDateTime::MIN)
    }
}

/// A predicted price with its confidence band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForecastPoint {
    pub symbol: Symbol,
    pub forecast_time: NaiveDateTime,
    pub predicted_price: Decimal,
    pub lower_bound: Decimal,
    pub upper_bound: Decimal,
    pub created_at: NaiveDateTime,
}

/// External forecasting engine.
pub trait Forecaster {
    /// Predict `horizon` future points from `history` (oldest first).
    fn forecast(&self, symbol: &Symbol, history: &[PriceSample], horizon: usize)
        -> Vec<ForecastPoint>;
}

/// Keep the last point for each `(symbol, forecast_time)`.
///
/// PostgreSQL rejects an upsert that touches the same row twice in one
/// statement, so duplicates are collapsed before writing.
pub(crate) fn dedup_forecasts(points: &[ForecastPoint]) -> Vec<&ForecastPoint> {
    let mut latest: Vec<&ForecastPoint> = Vec::with_capacity(points.len());
    let mut position: HashMap<(&Symbol, NaiveDateTime), usize> =
        HashMap::with_capacity(points.len());
    for point in points {
        match position.get(&(&point.symbol, point.forecast_time)) {
            Some(&i) => latest[i] = point,
            None => {
                position.insert((&point.symbol, point.forecast_time), latest.len());
                latest.push(point);
            }
        }
    }
    latest
}
