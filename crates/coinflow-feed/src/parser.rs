//! Ticker frame normalization.
//!
//! Parses Binance `!ticker@arr` frames (a JSON array of 24h ticker
//! objects) into [`TickerUpdate`]s.
//!
//! Any other frame, including a lone ticker object or a subscription
//! acknowledgement, yields no updates. Malformed frames and elements are
//! counted in [`NormalizeStats`] instead of being logged, since a broken
//! upstream would otherwise flood the logs at feed rate.

use crate::error::{FeedError, FeedResult};
use chrono::NaiveDateTime;
use coinflow_core::{naive_utc_from_millis, TickerUpdate, TrackedSymbols};
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

/// Field names in the Binance ticker payload.
mod field {
    pub const SYMBOL: &str = "s";
    pub const EVENT_TIME: &str = "E";
    pub const LAST_PRICE: &str = "c";
    pub const PRICE_CHANGE: &str = "p";
    pub const PRICE_CHANGE_PERCENT: &str = "P";
    pub const HIGH: &str = "h";
    pub const LOW: &str = "l";
    pub const VOLUME: &str = "v";
}

/// Counters for normalizer outcomes.
#[derive(Debug, Default)]
pub struct NormalizeStats {
    frames: AtomicU64,
    /// Frames that were not JSON or not a ticker shape.
    frames_ignored: AtomicU64,
    accepted: AtomicU64,
    untracked: AtomicU64,
    malformed: AtomicU64,
}

impl NormalizeStats {
    fn record_frame(&self) {
        self.frames.fetch_add(1, Ordering::Relaxed);
    }

    fn record_frame_ignored(&self) {
        self.frames_ignored.fetch_add(1, Ordering::Relaxed);
    }

    fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    fn record_skipped(&self, error: &FeedError) {
        match error {
            FeedError::Untracked => self.untracked.fetch_add(1, Ordering::Relaxed),
            _ => self.malformed.fetch_add(1, Ordering::Relaxed),
        };
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames: self.frames.load(Ordering::Relaxed),
            frames_ignored: self.frames_ignored.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            untracked: self.untracked.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
        }
    }
}

/// Copy of [`NormalizeStats`] counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub frames: u64,
    pub frames_ignored: u64,
    pub accepted: u64,
    pub untracked: u64,
    pub malformed: u64,
}

impl StatsSnapshot {
    /// Counter increase since an earlier snapshot.
    pub fn since(&self, earlier: &StatsSnapshot) -> StatsSnapshot {
        StatsSnapshot {
            frames: self.frames.saturating_sub(earlier.frames),
            frames_ignored: self.frames_ignored.saturating_sub(earlier.frames_ignored),
            accepted: self.accepted.saturating_sub(earlier.accepted),
            untracked: self.untracked.saturating_sub(earlier.untracked),
            malformed: self.malformed.saturating_sub(earlier.malformed),
        }
    }
}

/// Converts raw feed frames into ticker updates for tracked symbols.
pub struct TickerNormalizer {
    tracked: TrackedSymbols,
    stats: NormalizeStats,
}

impl TickerNormalizer {
    pub fn new(tracked: TrackedSymbols) -> Self {
        Self {
            tracked,
            stats: NormalizeStats::default(),
        }
    }

    pub fn stats(&self) -> &NormalizeStats {
        &self.stats
    }

    /// Normalize one frame.
    ///
    /// Returns a lazy iterator over the accepted updates in frame order.
    /// Elements that fail validation are skipped individually.
    pub fn normalize<'a>(
        &'a self,
        frame: &str,
        ingest_time: NaiveDateTime,
    ) -> impl Iterator<Item = TickerUpdate> + 'a {
        self.stats.record_frame();

        let elements = match serde_json::from_str::<Value>(frame) {
            Ok(value) => frame_elements(value),
            Err(_) => None,
        };
        if elements.is_none() {
            self.stats.record_frame_ignored();
        }

        elements
            .into_iter()
            .flatten()
            .filter_map(move |element| match self.parse_element(&element, ingest_time) {
                Ok(update) => {
                    self.stats.record_accepted();
                    Some(update)
                }
                Err(e) => {
                    self.stats.record_skipped(&e);
                    None
                }
            })
    }

    /// Convert one ticker object.
    ///
    /// The allow-list is checked before any other field so untracked
    /// instruments never count as malformed.
    pub fn parse_element(
        &self,
        element: &Value,
        ingest_time: NaiveDateTime,
    ) -> FeedResult<TickerUpdate> {
        let object = element.as_object().ok_or(FeedError::NotAnObject)?;

        let raw_symbol = object
            .get(field::SYMBOL)
            .and_then(Value::as_str)
            .ok_or(FeedError::Untracked)?;
        let symbol = self
            .tracked
            .get(raw_symbol)
            .ok_or(FeedError::Untracked)?
            .clone();

        let event_ms = parse_millis(object.get(field::EVENT_TIME), field::EVENT_TIME)?;
        let event_time =
            naive_utc_from_millis(event_ms).map_err(|_| FeedError::InvalidField {
                field: field::EVENT_TIME,
                value: event_ms.to_string(),
            })?;

        Ok(TickerUpdate {
            symbol,
            event_time,
            price: parse_decimal(object.get(field::LAST_PRICE), field::LAST_PRICE)?,
            price_change: parse_decimal(object.get(field::PRICE_CHANGE), field::PRICE_CHANGE)?,
            price_change_percent: parse_decimal(
                object.get(field::PRICE_CHANGE_PERCENT),
                field::PRICE_CHANGE_PERCENT,
            )?,
            high: parse_decimal(object.get(field::HIGH), field::HIGH)?,
            low: parse_decimal(object.get(field::LOW), field::LOW)?,
            volume: parse_decimal(object.get(field::VOLUME), field::VOLUME)?,
            ingest_time,
        })
    }
}

/// Ticker elements of a parsed frame. Only arrays are ticker frames.
fn frame_elements(value: Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(elements) => Some(elements),
        _ => None,
    }
}

fn parse_millis(value: Option<&Value>, name: &'static str) -> FeedResult<i64> {
    let invalid = |v: &Value| FeedError::InvalidField {
        field: name,
        value: v.to_string(),
    };

    match value {
        None | Some(Value::Null) => Err(FeedError::MissingField(name)),
        Some(v @ Value::Number(n)) => n.as_i64().ok_or_else(|| invalid(v)),
        Some(v @ Value::String(s)) => s.parse::<i64>().map_err(|_| invalid(v)),
        Some(v) => Err(invalid(v)),
    }
}

/// Strict decimal conversion.
///
/// Strings must be plain decimal literals. JSON numbers are read from their
/// original text (never through `f64`); exponent notation is accepted there.
/// Values that would need rounding to fit a `Decimal` are rejected.
fn parse_decimal(value: Option<&Value>, name: &'static str) -> FeedResult<Decimal> {
    let invalid = |v: &Value| FeedError::InvalidField {
        field: name,
        value: v.to_string(),
    };

    match value {
        None | Some(Value::Null) => Err(FeedError::MissingField(name)),
        Some(v @ Value::String(s)) => Decimal::from_str_exact(s).map_err(|_| invalid(v)),
        Some(v @ Value::Number(n)) => {
            let text = n.to_string();
            if text.contains(|c| c == 'e' || c == 'E') {
                Decimal::from_scientific(&text).map_err(|_| invalid(v))
            } else {
                Decimal::from_str_exact(&text).map_err(|_| invalid(v))
            }
        }
        Some(v) => Err(invalid(v)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use coinflow_core::{now_naive_utc, Symbol};
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn normalizer() -> TickerNormalizer {
        TickerNormalizer::new(TrackedSymbols::default())
    }

    fn ticker(symbol: &str, event_ms: i64) -> Value {
        json!({
            "e": "24hrTicker",
            "E": event_ms,
            "s": symbol,
            "c": "42000.50",
            "p": "10.5",
            "P": "0.02",
            "h": "42500.00",
            "l": "41500.00",
            "v": "1234.5"
        })
    }

    fn collect(n: &TickerNormalizer, frame: &str) -> Vec<TickerUpdate> {
        n.normalize(frame, now_naive_utc()).collect()
    }

    #[test]
    fn test_reference_frame() {
        let n = normalizer();
        let frame = r#"[{"s":"BTCUSDT","E":1700000000000,"c":"42000.50","p":"10.5","P":"0.02","h":"42500.00","l":"41500.00","v":"1234.5"}]"#;

        let updates = collect(&n, frame);
        assert_eq!(updates.len(), 1);

        let update = &updates[0];
        assert_eq!(update.symbol, Symbol::new("BTCUSDT").unwrap());
        assert_eq!(
            update.event_time,
            NaiveDate::from_ymd_opt(2023, 11, 14)
                .unwrap()
                .and_hms_opt(22, 13, 20)
                .unwrap()
        );
        assert_eq!(update.price, dec!(42000.50));
        assert_eq!(update.price.to_string(), "42000.50");
        assert_eq!(update.price_change, dec!(10.5));
        assert_eq!(update.price_change_percent, dec!(0.02));
        assert_eq!(update.high, dec!(42500.00));
        assert_eq!(update.low, dec!(41500.00));
        assert_eq!(update.volume, dec!(1234.5));
    }

    #[test]
    fn test_untracked_symbol_skipped() {
        let n = normalizer();
        let frame = json!([ticker("BTCUSDT", 1), ticker("PEPEUSDT", 2)]).to_string();

        let updates = collect(&n, &frame);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].symbol.as_str(), "BTCUSDT");

        let stats = n.stats().snapshot();
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.untracked, 1);
        assert_eq!(stats.malformed, 0);
    }

    #[test]
    fn test_only_untracked_symbols_yield_nothing() {
        let n = normalizer();
        let frame = json!([
            ticker("PEPEUSDT", 1),
            ticker("BUSDUSDT", 2),
            ticker("btcusdt", 3)
        ])
        .to_string();

        assert!(collect(&n, &frame).is_empty());
        assert_eq!(n.stats().snapshot().untracked, 3);
    }

    #[test]
    fn test_bad_field_skips_only_that_element() {
        let n = normalizer();

        let mut bad_price = ticker("ETHUSDT", 1);
        bad_price["c"] = json!("not-a-number");
        let mut missing_volume = ticker("SOLUSDT", 2);
        missing_volume.as_object_mut().unwrap().remove("v");
        let mut bad_time = ticker("XRPUSDT", 3);
        bad_time["E"] = json!("yesterday");

        let frame = json!([
            ticker("BTCUSDT", 10),
            bad_price,
            missing_volume,
            bad_time,
            ticker("BNBUSDT", 11)
        ])
        .to_string();

        let updates = collect(&n, &frame);
        let symbols: Vec<_> = updates.iter().map(|u| u.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["BTCUSDT", "BNBUSDT"]);
        assert_eq!(n.stats().snapshot().malformed, 3);
    }

    #[test]
    fn test_malformed_frames_ignored() {
        let n = normalizer();

        assert!(collect(&n, "").is_empty());
        assert!(collect(&n, "{not json").is_empty());
        assert!(collect(&n, "42").is_empty());
        assert!(collect(&n, "\"text\"").is_empty());
        assert!(collect(&n, "[]").is_empty());
        assert!(collect(&n, "[1, null, \"x\"]").is_empty());

        let stats = n.stats().snapshot();
        assert_eq!(stats.frames, 6);
        assert_eq!(stats.frames_ignored, 4);
        assert_eq!(stats.malformed, 3);
    }

    #[test]
    fn test_non_array_frames_ignored() {
        let n = normalizer();
        let single = ticker("ETHUSDT", 1_700_000_000_000).to_string();
        let envelope = json!({
            "stream": "!ticker@arr",
            "data": [ticker("BTCUSDT", 1), ticker("ETHUSDT", 2)]
        })
        .to_string();

        assert!(collect(&n, &single).is_empty());
        assert!(collect(&n, &envelope).is_empty());
        assert!(collect(&n, r#"{"result":null,"id":1}"#).is_empty());

        let stats = n.stats().snapshot();
        assert_eq!(stats.frames, 3);
        assert_eq!(stats.frames_ignored, 3);
        assert_eq!(stats.accepted, 0);
        assert_eq!(stats.untracked, 0);
    }

    #[test]
    fn test_numeric_fields_converted_exactly() {
        let n = normalizer();
        let frame = r#"[{"s":"BTCUSDT","E":"1700000000000","c":0.1,"p":-0.30,"P":1e-2,"h":42500,"l":41500.00,"v":"0.00000001"}]"#;

        let updates = collect(&n, frame);
        assert_eq!(updates.len(), 1);
        let u = &updates[0];
        assert_eq!(u.price.to_string(), "0.1");
        assert_eq!(u.price_change, dec!(-0.30));
        assert_eq!(u.price_change_percent, dec!(0.01));
        assert_eq!(u.high, dec!(42500));
        assert_eq!(u.volume, dec!(0.00000001));
    }

    #[test]
    fn test_strict_string_decimals() {
        let n = normalizer();
        let now = now_naive_utc();

        for bad in [" 1.0", "1.0 ", "1,5", "", "NaN", "0x10"] {
            let mut element = ticker("BTCUSDT", 1);
            element["c"] = json!(bad);
            assert!(
                matches!(
                    n.parse_element(&element, now),
                    Err(FeedError::InvalidField { field: "c", .. })
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_missing_symbol_is_untracked() {
        let n = normalizer();
        let mut element = ticker("BTCUSDT", 1);
        element.as_object_mut().unwrap().remove("s");

        assert_eq!(
            n.parse_element(&element, now_naive_utc()),
            Err(FeedError::Untracked)
        );
    }

    #[test]
    fn test_event_time_out_of_range() {
        let n = normalizer();
        let mut element = ticker("BTCUSDT", 1);
        element["E"] = json!(i64::MAX);

        assert!(matches!(
            n.parse_element(&element, now_naive_utc()),
            Err(FeedError::InvalidField { field: "E", .. })
        ));
    }

    #[test]
    fn test_ingest_time_stamped_from_caller() {
        let n = normalizer();
        let ingest = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let frame = json!([ticker("BTCUSDT", 1_700_000_000_000)]).to_string();

        let update = n.normalize(&frame, ingest).next().unwrap();
        assert_eq!(update.ingest_time, ingest);
    }

    #[test]
    fn test_stats_since() {
        let n = normalizer();
        let before = n.stats().snapshot();
        collect(&n, &json!([ticker("BTCUSDT", 1)]).to_string());
        let delta = n.stats().snapshot().since(&before);
        assert_eq!(delta.frames, 1);
        assert_eq!(delta.accepted, 1);
    }
}
