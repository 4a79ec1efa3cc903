//! Ticker frame builders.

use serde_json::json;

pub const BASE_MS: i64 = 1_700_000_000_000;

/// One `!ticker@arr` element.
pub fn ticker(symbol: &str, event_ms: i64, price: &str) -> serde_json::Value {
    json!({
        "e": "24hrTicker",
        "E": event_ms,
        "s": symbol,
        "p": "10.5",
        "P": "0.02",
        "c": price,
        "h": "42500.00",
        "l": "41500.00",
        "v": "1234.5",
        "q": "51851250.00"
    })
}

/// Array frame from elements.
pub fn frame(elements: Vec<serde_json::Value>) -> String {
    serde_json::Value::Array(elements).to_string()
}
