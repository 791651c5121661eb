use paperfolio_core::ValidationError;
use thiserror::Error;

/// Failures of a single analytics computation.
///
/// The engine turns statistical failures into provisional results; only
/// invalid caller input reaches the caller as an error.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalyticsError {
    #[error("insufficient data: {available} point(s) available, {required} required")]
    InsufficientData { required: usize, available: usize },

    #[error("benchmark return variance {variance:e} is below {threshold:e}")]
    ZeroVariance { variance: f64, threshold: f64 },

    #[error("30-day volatility {volatility:.4} exceeds {limit}")]
    ExtremeVolatility { volatility: f64, limit: f64 },

    #[error("invalid period: {reason}")]
    InvalidPeriod { reason: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("portfolio has no holdings with positive value")]
    EmptyPortfolio,

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl AnalyticsError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InsufficientData { .. } => "analytics.insufficient_data",
            Self::ZeroVariance { .. } => "analytics.zero_variance",
            Self::ExtremeVolatility { .. } => "analytics.extreme_volatility",
            Self::InvalidPeriod { .. } => "analytics.invalid_period",
            Self::InvalidInput(_) => "analytics.invalid_input",
            Self::EmptyPortfolio => "analytics.empty_portfolio",
            Self::Validation(_) => "analytics.validation",
        }
    }

    /// Data-driven failures that downgrade to a sector estimate.
    pub const fn is_statistical(&self) -> bool {
        matches!(
            self,
            Self::InsufficientData { .. }
                | Self::ZeroVariance { .. }
                | Self::ExtremeVolatility { .. }
                | Self::InvalidPeriod { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statistical_errors_are_flagged_for_downgrade() {
        assert!(AnalyticsError::ZeroVariance {
            variance: 0.0,
            threshold: 1e-6
        }
        .is_statistical());
        assert!(!AnalyticsError::EmptyPortfolio.is_statistical());
        assert_eq!(AnalyticsError::EmptyPortfolio.code(), "analytics.empty_portfolio");
    }
}
