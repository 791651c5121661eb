use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

const MAX_SYMBOL_LEN: usize = 12;

/// Uppercase asset ticker such as `BTC`, `1INCH` or `USDC.E`.
///
/// Crypto tickers may start with a digit, so only the alphabet and length are
/// checked.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        input.parse()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `XBT` is the ISO-style alias some exchanges use.
    pub fn is_bitcoin(&self) -> bool {
        self.0 == "BTC" || self.0 == "XBT"
    }
}

fn is_ticker_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '.' || ch == '-'
}

impl FromStr for Symbol {
    type Err = ValidationError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let ticker = input.trim();
        if ticker.is_empty() {
            return Err(ValidationError::EmptySymbol);
        }

        for (index, ch) in ticker.chars().enumerate() {
            if !is_ticker_char(ch) {
                return Err(ValidationError::SymbolInvalidChar { ch, index });
            }
        }

        // All ASCII past this point, so bytes == chars.
        if ticker.len() > MAX_SYMBOL_LEN {
            return Err(ValidationError::SymbolTooLong {
                len: ticker.len(),
                max: MAX_SYMBOL_LEN,
            });
        }

        Ok(Self(ticker.to_ascii_uppercase()))
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Symbol {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}
