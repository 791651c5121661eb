use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Symbol, ValidationError};

/// Broad asset category used when a ticker has no dedicated estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectorCategory {
    Layer1,
    Stablecoin,
    Defi,
    Meme,
    Other,
}

impl SectorCategory {
    pub const ALL: [Self; 5] = [
        Self::Layer1,
        Self::Stablecoin,
        Self::Defi,
        Self::Meme,
        Self::Other,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Layer1 => "layer1",
            Self::Stablecoin => "stablecoin",
            Self::Defi => "defi",
            Self::Meme => "meme",
            Self::Other => "other",
        }
    }

    /// Category-wide `(beta, cagr)` heuristic against a BTC benchmark.
    pub const fn defaults(self) -> (f64, f64) {
        match self {
            Self::Layer1 => (1.3, 0.25),
            Self::Stablecoin => (0.0, 0.0),
            Self::Defi => (1.5, 0.15),
            Self::Meme => (2.0, 0.10),
            Self::Other => (1.4, 0.08),
        }
    }
}

impl Display for SectorCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SectorCategory {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace(['-', '_', ' '], "");
        match normalized.as_str() {
            "layer1" | "l1" | "smartcontract" | "currency" => Ok(Self::Layer1),
            "stablecoin" | "stable" => Ok(Self::Stablecoin),
            "defi" => Ok(Self::Defi),
            "meme" | "memecoin" => Ok(Self::Meme),
            "other" => Ok(Self::Other),
            _ => Err(ValidationError::InvalidCategory {
                value: value.to_owned(),
            }),
        }
    }
}

/// Heuristic beta/CAGR for one asset; always provisional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorEstimate {
    pub symbol: Symbol,
    pub category: SectorCategory,
    pub beta: f64,
    pub cagr: f64,
}

/// Synthetic tier: a fixed lookup table that never fails.
#[derive(Debug, Clone)]
pub struct SectorEstimates {
    entries: HashMap<Symbol, (SectorCategory, f64, f64)>,
}

const BUILTIN: &[(&str, SectorCategory, f64, f64)] = &[
    ("BTC", SectorCategory::Layer1, 1.0, 0.45),
    ("ETH", SectorCategory::Layer1, 1.2, 0.40),
    ("SOL", SectorCategory::Layer1, 1.6, 0.55),
    ("BNB", SectorCategory::Layer1, 1.0, 0.35),
    ("ADA", SectorCategory::Layer1, 1.3, 0.10),
    ("AVAX", SectorCategory::Layer1, 1.5, 0.20),
    ("DOT", SectorCategory::Layer1, 1.3, 0.05),
    ("XRP", SectorCategory::Layer1, 1.1, 0.15),
    ("LTC", SectorCategory::Layer1, 1.0, 0.05),
    ("MATIC", SectorCategory::Layer1, 1.5, 0.10),
    ("LINK", SectorCategory::Defi, 1.4, 0.20),
    ("UNI", SectorCategory::Defi, 1.5, 0.10),
    ("AAVE", SectorCategory::Defi, 1.6, 0.15),
    ("DOGE", SectorCategory::Meme, 1.8, 0.30),
    ("USDT", SectorCategory::Stablecoin, 0.0, 0.0),
    ("USDC", SectorCategory::Stablecoin, 0.0, 0.0),
    ("DAI", SectorCategory::Stablecoin, 0.0, 0.0),
];

impl Default for SectorEstimates {
    fn default() -> Self {
        let entries = BUILTIN
            .iter()
            .filter_map(|(ticker, category, beta, cagr)| {
                Symbol::parse(ticker)
                    .ok()
                    .map(|symbol| (symbol, (*category, *beta, *cagr)))
            })
            .collect();
        Self { entries }
    }
}

impl SectorEstimates {
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn with_entry(mut self, symbol: Symbol, category: SectorCategory, beta: f64, cagr: f64) -> Self {
        self.entries.insert(symbol, (category, beta, cagr));
        self
    }

    /// Table entry for `symbol`, else the defaults of `category_hint`
    /// (or `other` when no hint is given).
    pub fn estimate(&self, symbol: &Symbol, category_hint: Option<SectorCategory>) -> SectorEstimate {
        let (category, beta, cagr) = self.entries.get(symbol).copied().unwrap_or_else(|| {
            let category = category_hint.unwrap_or(SectorCategory::Other);
            let (beta, cagr) = category.defaults();
            (category, beta, cagr)
        });

        SectorEstimate {
            symbol: symbol.clone(),
            category,
            beta,
            cagr,
        }
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.entries.contains_key(symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(value: &str) -> Symbol {
        Symbol::parse(value).expect("valid symbol")
    }

    #[test]
    fn known_assets_use_table_entries() {
        let estimates = SectorEstimates::default();
        let eth = estimates.estimate(&symbol("eth"), Some(SectorCategory::Meme));

        assert_eq!(eth.category, SectorCategory::Layer1);
        assert_eq!(eth.beta, 1.2);
        assert_eq!(eth.cagr, 0.40);
    }

    #[test]
    fn unknown_assets_fall_back_to_category_defaults() {
        let estimates = SectorEstimates::default();

        let pepe = estimates.estimate(&symbol("PEPE"), Some(SectorCategory::Meme));
        assert_eq!(pepe.category, SectorCategory::Meme);
        assert_eq!((pepe.beta, pepe.cagr), SectorCategory::Meme.defaults());

        let unknown = estimates.estimate(&symbol("XYZ"), None);
        assert_eq!(unknown.category, SectorCategory::Other);
    }

    #[test]
    fn categories_parse_loosely() {
        assert_eq!("Layer-1".parse::<SectorCategory>(), Ok(SectorCategory::Layer1));
        assert_eq!("stable_coin".parse::<SectorCategory>(), Ok(SectorCategory::Stablecoin));
        assert!("gaming".parse::<SectorCategory>().is_err());
    }

    #[test]
    fn overrides_replace_builtin_entries() {
        let estimates =
            SectorEstimates::default().with_entry(symbol("BTC"), SectorCategory::Layer1, 1.0, 0.2);
        assert_eq!(estimates.estimate(&symbol("BTC"), None).cagr, 0.2);
        assert!(!SectorEstimates::empty().contains(&symbol("BTC")));
    }
}
