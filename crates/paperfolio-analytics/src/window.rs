use paperfolio_core::{VolatilityThresholds, WindowPolicy};
use serde::{Deserialize, Serialize};

use crate::error::AnalyticsError;
use crate::returns::ReturnObservation;

/// Number of trailing returns used to measure volatility.
pub const VOLATILITY_LOOKBACK: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowSelection {
    /// Return observations to use, already clamped to what is available.
    pub window_days: usize,
    pub volatility_30d: f64,
}

/// Picks the beta lookback from trailing 30-day volatility.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdaptiveWindowSelector {
    thresholds: VolatilityThresholds,
    windows: WindowPolicy,
}

impl AdaptiveWindowSelector {
    pub fn new(thresholds: VolatilityThresholds, windows: WindowPolicy) -> Self {
        Self {
            thresholds,
            windows,
        }
    }

    pub fn select(&self, returns: &[ReturnObservation]) -> Result<WindowSelection, AnalyticsError> {
        if returns.len() < 2 {
            return Err(AnalyticsError::InsufficientData {
                required: 2,
                available: returns.len(),
            });
        }

        let recent = &returns[returns.len().saturating_sub(VOLATILITY_LOOKBACK)..];
        let asset_returns = recent
            .iter()
            .map(|observation| observation.asset_return)
            .collect::<Vec<_>>();
        let volatility_30d = sample_std_dev(&asset_returns);

        if !volatility_30d.is_finite() || volatility_30d > self.thresholds.extreme {
            return Err(AnalyticsError::ExtremeVolatility {
                volatility: volatility_30d,
                limit: self.thresholds.extreme,
            });
        }

        Ok(WindowSelection {
            window_days: self.window_for(volatility_30d).min(returns.len()),
            volatility_30d,
        })
    }

    /// Unclamped window for a volatility level; both comparisons are strict.
    pub fn window_for(&self, volatility_30d: f64) -> usize {
        if volatility_30d > self.thresholds.high {
            self.windows.high_volatility_days
        } else if volatility_30d < self.thresholds.low {
            self.windows.low_volatility_days
        } else {
            self.windows.normal_days
        }
    }
}

/// Sample standard deviation (`n - 1` denominator); zero for fewer than two values.
pub fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let sum_squares = values
        .iter()
        .map(|value| (value - mean).powi(2))
        .sum::<f64>();
    (sum_squares / (n - 1.0)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use paperfolio_core::CalendarDate;

    fn returns(values: &[f64]) -> Vec<ReturnObservation> {
        let start = CalendarDate::parse("2024-01-01").expect("valid date");
        values
            .iter()
            .enumerate()
            .map(|(index, value)| ReturnObservation {
                date: start.saturating_add_days(index as i64),
                asset_return: *value,
                benchmark_return: 0.0,
            })
            .collect()
    }

    #[test]
    fn boundaries_follow_strict_comparisons() {
        let selector = AdaptiveWindowSelector::default();

        assert_eq!(selector.window_for(0.05), 180);
        assert_eq!(selector.window_for(0.0501), 90);
        assert_eq!(selector.window_for(0.0149), 360);
        assert_eq!(selector.window_for(0.015), 180);
        assert_eq!(selector.window_for(0.03), 180);
    }

    #[test]
    fn window_is_clamped_to_available_returns() {
        let alternating = (0..40)
            .map(|index| if index % 2 == 0 { 0.001 } else { -0.001 })
            .collect::<Vec<_>>();

        let selection = AdaptiveWindowSelector::default()
            .select(&returns(&alternating))
            .expect("selection");

        assert_eq!(selection.window_days, 40);
        assert!(selection.volatility_30d < 0.015);
    }

    #[test]
    fn volatility_uses_only_last_thirty_returns() {
        let mut values = vec![0.5; 10];
        values.extend((0..30).map(|index| if index % 2 == 0 { 0.02 } else { -0.02 }));

        let selection = AdaptiveWindowSelector::default()
            .select(&returns(&values))
            .expect("selection");

        let expected = sample_std_dev(&values[10..]);
        assert!((selection.volatility_30d - expected).abs() < 1e-15);
    }

    #[test]
    fn extreme_volatility_is_rejected() {
        let wild = (0..30)
            .map(|index| if index % 2 == 0 { 3.0 } else { -3.0 })
            .collect::<Vec<_>>();

        let error = AdaptiveWindowSelector::default()
            .select(&returns(&wild))
            .expect_err("garbage data");

        assert!(matches!(error, AnalyticsError::ExtremeVolatility { .. }));
    }

    #[test]
    fn single_return_is_insufficient() {
        let error = AdaptiveWindowSelector::default()
            .select(&returns(&[0.01]))
            .expect_err("too short");

        assert_eq!(
            error,
            AnalyticsError::InsufficientData {
                required: 2,
                available: 1
            }
        );
    }

    #[test]
    fn sample_std_dev_uses_n_minus_one() {
        assert!((sample_std_dev(&[1.0, 2.0, 3.0, 4.0]) - 1.290_994_448_735_805_6).abs() < 1e-12);
        assert_eq!(sample_std_dev(&[5.0]), 0.0);
    }
}
