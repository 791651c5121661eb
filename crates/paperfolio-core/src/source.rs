use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Position of a source in the fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataTier {
    Live,
    Persisted,
    Synthetic,
}

impl DataTier {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Persisted => "persisted",
            Self::Synthetic => "synthetic",
        }
    }
}

impl Display for DataTier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical provider identifiers used for provenance tagging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Coingecko,
    Warehouse,
    Sector,
}

impl ProviderId {
    pub const ALL: [Self; 3] = [Self::Coingecko, Self::Warehouse, Self::Sector];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Coingecko => "coingecko",
            Self::Warehouse => "warehouse",
            Self::Sector => "sector",
        }
    }

    pub const fn tier(self) -> DataTier {
        match self {
            Self::Coingecko => DataTier::Live,
            Self::Warehouse => DataTier::Persisted,
            Self::Sector => DataTier::Synthetic,
        }
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "coingecko" => Ok(Self::Coingecko),
            "warehouse" => Ok(Self::Warehouse),
            "sector" => Ok(Self::Sector),
            other => Err(ValidationError::InvalidSource {
                value: other.to_owned(),
            }),
        }
    }
}
