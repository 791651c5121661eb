use paperfolio_core::{CalendarDate, Confidence, LiquidityThresholds, Symbol};
use serde::{Deserialize, Serialize};

use crate::align::AlignedObservation;
use crate::error::AnalyticsError;
use crate::returns::log_returns;
use crate::window::{AdaptiveWindowSelector, WindowSelection, VOLATILITY_LOOKBACK};

pub const BETA_MIN: f64 = -3.0;
pub const BETA_MAX: f64 = 5.0;
pub const MIN_BENCHMARK_VARIANCE: f64 = 1e-6;

/// CAPM beta of an asset against a benchmark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetaResult {
    pub beta: f64,
    pub beta_unadjusted: f64,
    pub window_days: usize,
    pub volatility_30d: f64,
    pub median_daily_volume: f64,
    pub liquidity_adjustment_factor: f64,
    pub data_points: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_start: Option<CalendarDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_end: Option<CalendarDate>,
    pub benchmark: Symbol,
    pub confidence: Confidence,
    pub data_quality_score: f64,
    pub provisional: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl BetaResult {
    /// Sector heuristic standing in for a measured beta.
    pub fn provisional(beta: f64, benchmark: Symbol) -> Self {
        let beta = beta.clamp(BETA_MIN, BETA_MAX);
        Self {
            beta,
            beta_unadjusted: beta,
            window_days: 0,
            volatility_30d: 0.0,
            median_daily_volume: 0.0,
            liquidity_adjustment_factor: 1.0,
            data_points: 0,
            window_start: None,
            window_end: None,
            benchmark,
            confidence: Confidence::Low,
            data_quality_score: 0.0,
            provisional: true,
            warnings: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BetaEngine {
    selector: AdaptiveWindowSelector,
    liquidity: LiquidityThresholds,
}

impl BetaEngine {
    pub fn new(selector: AdaptiveWindowSelector, liquidity: LiquidityThresholds) -> Self {
        Self {
            selector,
            liquidity,
        }
    }

    /// Beta over the volatility-selected trailing window of daily log returns.
    pub fn compute(
        &self,
        benchmark: Symbol,
        aligned: &[AlignedObservation],
    ) -> Result<BetaResult, AnalyticsError> {
        let returns = log_returns(aligned);
        let WindowSelection {
            window_days,
            volatility_30d,
        } = self.selector.select(&returns)?;

        let window = &returns[returns.len() - window_days..];
        let n = window.len();
        if n < 2 {
            return Err(AnalyticsError::InsufficientData {
                required: 2,
                available: n,
            });
        }

        let count = n as f64;
        let asset_mean = window.iter().map(|r| r.asset_return).sum::<f64>() / count;
        let benchmark_mean = window.iter().map(|r| r.benchmark_return).sum::<f64>() / count;

        let mut covariance = 0.0;
        let mut variance = 0.0;
        for observation in window {
            let asset_dev = observation.asset_return - asset_mean;
            let benchmark_dev = observation.benchmark_return - benchmark_mean;
            covariance += asset_dev * benchmark_dev;
            variance += benchmark_dev * benchmark_dev;
        }
        covariance /= count - 1.0;
        variance /= count - 1.0;

        if variance < MIN_BENCHMARK_VARIANCE {
            return Err(AnalyticsError::ZeroVariance {
                variance,
                threshold: MIN_BENCHMARK_VARIANCE,
            });
        }

        let beta_unadjusted = covariance / variance;

        let recent = &aligned[aligned.len().saturating_sub(VOLATILITY_LOOKBACK)..];
        let positive_volumes = recent
            .iter()
            .map(|observation| observation.asset_volume)
            .filter(|volume| volume.is_finite() && *volume > 0.0)
            .collect::<Vec<_>>();

        let mut warnings = Vec::new();
        let median_daily_volume = median(&positive_volumes).unwrap_or(0.0);
        let liquidity_adjustment_factor = if positive_volumes.is_empty() {
            warnings.push(String::from(
                "no positive volume in the last 30 observations; illiquid adjustment not applied, factor kept at 1.0",
            ));
            1.0
        } else {
            self.liquidity_factor(median_daily_volume)
        };

        let beta = (beta_unadjusted * liquidity_adjustment_factor).clamp(BETA_MIN, BETA_MAX);
        let confidence = confidence_for(n, variance, volatility_30d);

        let aligned_count = aligned.len() as f64;
        let data_quality_score = ((aligned_count / 365.0).min(1.0)
            + returns.len() as f64 / aligned_count
            + positive_volumes.len() as f64 / VOLATILITY_LOOKBACK as f64)
            / 3.0;

        Ok(BetaResult {
            beta,
            beta_unadjusted,
            window_days,
            volatility_30d,
            median_daily_volume,
            liquidity_adjustment_factor,
            data_points: n,
            window_start: window.first().map(|observation| observation.date),
            window_end: window.last().map(|observation| observation.date),
            benchmark,
            confidence,
            data_quality_score: data_quality_score.clamp(0.0, 1.0),
            provisional: false,
            warnings,
        })
    }

    pub fn liquidity_factor(&self, median_daily_volume: f64) -> f64 {
        if median_daily_volume < self.liquidity.low {
            self.liquidity.illiquid_factor
        } else if median_daily_volume > self.liquidity.high {
            self.liquidity.liquid_factor
        } else {
            1.0
        }
    }
}

fn confidence_for(data_points: usize, variance: f64, volatility_30d: f64) -> Confidence {
    if data_points >= 300 && variance > 1e-5 && volatility_30d < 0.1 {
        Confidence::High
    } else if data_points >= 180 && variance > 1e-6 && volatility_30d < 0.2 {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}
