//! Analytics for paperfolio.
//!
//! The numeric stages are pure functions over their inputs:
//! [`SeriesAligner`] → [`log_returns`] → [`AdaptiveWindowSelector`] →
//! [`BetaEngine`], alongside [`CagrCalculator`], [`NpvIrrEngine`] and
//! [`RiskAllocationAnalyzer`]. [`AnalyticsEngine`] wires them to the data
//! source resolver and the result cache.

pub mod align;
pub mod allocation;
pub mod beta;
pub mod cagr;
pub mod engine;
pub mod error;
pub mod returns;
pub mod valuation;
pub mod window;

pub use align::{AlignedObservation, Alignment, DataGap, SeriesAligner};
pub use allocation::{RebalanceDirection, RiskAllocationAnalyzer, RiskAnalysis, RiskLevel};
pub use beta::{BetaEngine, BetaResult, BETA_MAX, BETA_MIN};
pub use cagr::{CagrCalculator, CagrResult};
pub use engine::{AnalyticsEngine, Assessment, NpvRequest, PriceMode};
pub use error::AnalyticsError;
pub use returns::{log_returns, ReturnObservation};
pub use valuation::{
    npv_at, solve_irr, IrrSolution, IrrStatus, NpvAssumptions, NpvInputs, NpvIrrEngine, NpvResult,
};
pub use window::{sample_std_dev, AdaptiveWindowSelector, WindowSelection};
