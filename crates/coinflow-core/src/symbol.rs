//! Instrument symbols and the tracked-instrument allow-list.
//!
//! Exchange symbols are short uppercase identifiers such as `BTCUSDT`.
//! Only symbols present in [`TrackedSymbols`] are ingested; everything
//! else on the feed is discarded by the normalizer.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::HashSet;
use std::fmt;

/// Maximum accepted symbol length.
const MAX_SYMBOL_LEN: usize = 20;

/// Default allow-list: 20 high-volume USDT spot pairs.
pub const DEFAULT_TRACKED_SYMBOLS: [&str; 20] = [
    "BTCUSDT", "ETHUSDT", "BNBUSDT", "SOLUSDT", "XRPUSDT", "ADAUSDT", "DOGEUSDT", "TRXUSDT",
    "AVAXUSDT", "DOTUSDT", "LINKUSDT", "MATICUSDT", "LTCUSDT", "BCHUSDT", "ATOMUSDT", "UNIUSDT",
    "XLMUSDT", "ETCUSDT", "FILUSDT", "NEARUSDT",
];

/// Exchange instrument symbol (e.g., "BTCUSDT").
///
/// Always non-empty, ASCII uppercase letters and digits only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Create a symbol, validating its shape.
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let valid = !raw.is_empty()
            && raw.len() <= MAX_SYMBOL_LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit());

        if valid {
            Ok(Self(raw))
        } else {
            Err(CoreError::InvalidSymbol(raw))
        }
    }

    /// Create a symbol from user input, uppercasing and trimming it first.
    pub fn parse_lenient(raw: &str) -> Result<Self> {
        Self::new(raw.trim().to_ascii_uppercase())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Symbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Symbol {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

/// Fixed set of instruments the pipeline ingests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedSymbols {
    symbols: HashSet<Symbol>,
}

impl TrackedSymbols {
    /// Build an allow-list from already-validated symbols.
    pub fn new(symbols: impl IntoIterator<Item = Symbol>) -> Self {
        Self {
            symbols: symbols.into_iter().collect(),
        }
    }

    /// Build an allow-list from raw strings, rejecting any invalid entry.
    pub fn from_strs<'a>(raw: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let symbols = raw
            .into_iter()
            .map(Symbol::parse_lenient)
            .collect::<Result<HashSet<_>>>()?;
        Ok(Self { symbols })
    }

    /// Look up a raw feed symbol, returning the tracked `Symbol` if present.
    ///
    /// Matching is exact: the feed always sends uppercase symbols.
    #[inline]
    pub fn get(&self, raw: &str) -> Option<&Symbol> {
        self.symbols.get(raw)
    }

    #[inline]
    pub fn contains(&self, raw: &str) -> bool {
        self.get(raw).is_some()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Symbols in sorted order (stable output for logs and queries).
    pub fn sorted(&self) -> Vec<&Symbol> {
        let mut symbols: Vec<_> = self.symbols.iter().collect();
        symbols.sort();
        symbols
    }
}

impl Default for TrackedSymbols {
    fn default() -> Self {
        Self::new(
            DEFAULT_TRACKED_SYMBOLS
                .iter()
                .map(|s| Symbol(s.to_string())),
        )
    }
}
