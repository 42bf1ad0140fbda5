//! Trading instrument (symbol pair) types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A tradable pair of asset symbols. Prices on this instrument quote how many
/// `quote` units equal one `base` unit.
///
/// Symbols are opaque lowercase tags ("btc", "usdt"); equality is byte-exact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    pub base: String,
    pub quote: String,
}

impl Instrument {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// Error parsing the `base_quote` wire encoding used by the HTTP layer.
#[derive(Debug, thiserror::Error)]
#[error("invalid instrument format: {0} (expected base_quote, e.g. btc_usdt)")]
pub struct ParseInstrumentError(String);

impl FromStr for Instrument {
    type Err = ParseInstrumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('_') {
            Some((base, quote)) if !base.is_empty() && !quote.is_empty() => {
                Ok(Instrument::new(base, quote))
            }
            _ => Err(ParseInstrumentError(s.to_string())),
        }
    }
}
