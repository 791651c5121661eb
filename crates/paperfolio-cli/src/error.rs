use paperfolio_analytics::AnalyticsError;
use paperfolio_core::{ConfigError, ValidationError, WarehouseError};
use thiserror::Error;

/// Process exit codes, one per failure family.
mod exit {
    pub const INVALID_INPUT: u8 = 2;
    pub const CONFIG: u8 = 3;
    pub const MALFORMED_DOCUMENT: u8 = 4;
    pub const STRICT: u8 = 5;
    pub const WAREHOUSE: u8 = 6;
    pub const IO: u8 = 10;
}

#[derive(Debug, Error)]
pub enum CliError {
    /// Arguments or rows that fail domain validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Analytics(#[from] AnalyticsError),
    #[error("{0}")]
    Command(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    /// Holdings or envelope JSON that does not match the expected shape.
    #[error("malformed JSON: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("unreadable CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("strict mode: {warning_count} warning(s) and {error_count} error(s) reported")]
    StrictModeViolation {
        warning_count: usize,
        error_count: usize,
    },
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) | Self::Analytics(_) | Self::Command(_) => exit::INVALID_INPUT,
            Self::Config(_) => exit::CONFIG,
            Self::Serialization(_) => exit::MALFORMED_DOCUMENT,
            Self::StrictModeViolation { .. } => exit::STRICT,
            Self::Warehouse(_) => exit::WAREHOUSE,
            Self::Csv(_) | Self::Io(_) => exit::IO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_portfolio_is_invalid_input() {
        let error = CliError::from(AnalyticsError::EmptyPortfolio);
        assert_eq!(error.exit_code(), exit::INVALID_INPUT);
    }

    #[test]
    fn io_failures_share_one_code() {
        let io = CliError::from(std::io::Error::other("disk full"));
        assert_eq!(io.exit_code(), 10);
    }
}
