use std::collections::BTreeMap;

use paperfolio_core::{AllocationPolicy, Holding, Symbol};
use serde::{Deserialize, Serialize};

use crate::error::AnalyticsError;

const BALANCED_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceDirection {
    Buy,
    Sell,
    #[serde(rename = "none")]
    NoChange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAnalysis {
    pub current_btc_allocation_pct: f64,
    pub recommended_btc_allocation_pct: f64,
    pub total_value: f64,
    pub risk_level: RiskLevel,
    pub is_compliant: bool,
    pub rebalance_amount: f64,
    pub rebalance_direction: RebalanceDirection,
    pub diversification_score: f64,
}

/// BTC share against a value-tiered target, plus HHI concentration.
#[derive(Debug, Clone, Default)]
pub struct RiskAllocationAnalyzer {
    policy: AllocationPolicy,
}

impl RiskAllocationAnalyzer {
    pub fn new(policy: AllocationPolicy) -> Self {
        Self { policy }
    }

    pub fn analyze(&self, holdings: &[Holding]) -> Result<RiskAnalysis, AnalyticsError> {
        let mut by_symbol: BTreeMap<&Symbol, f64> = BTreeMap::new();
        for holding in holdings {
            *by_symbol.entry(&holding.symbol).or_insert(0.0) += holding.value();
        }

        let total_value = by_symbol.values().sum::<f64>();
        if !total_value.is_finite() || total_value <= 0.0 {
            return Err(AnalyticsError::EmptyPortfolio);
        }

        let btc_value = by_symbol
            .iter()
            .filter(|(symbol, _)| symbol.is_bitcoin())
            .map(|(_, value)| value)
            .sum::<f64>();

        let current = btc_value / total_value * 100.0;
        let recommended = self.policy.target_for(total_value);
        let gap = (current - recommended).abs();

        let risk_level = if gap <= 5.0 {
            RiskLevel::Low
        } else if gap <= 15.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        };

        let (rebalance_direction, rebalance_amount) = if gap < BALANCED_EPSILON {
            (RebalanceDirection::NoChange, 0.0)
        } else {
            let amount = (recommended * total_value - current * total_value).abs() / 100.0;
            if current < recommended {
                (RebalanceDirection::Buy, amount)
            } else {
                (RebalanceDirection::Sell, amount)
            }
        };

        let hhi = by_symbol
            .values()
            .map(|value| {
                let weight_pct = value / total_value * 100.0;
                weight_pct * weight_pct
            })
            .sum::<f64>();

        Ok(RiskAnalysis {
            current_btc_allocation_pct: current,
            recommended_btc_allocation_pct: recommended,
            total_value,
            risk_level,
            is_compliant: current >= recommended,
            rebalance_amount,
            rebalance_direction,
            diversification_score: (100.0 - hhi / 100.0).clamp(0.0, 100.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn holding(symbol: &str, amount: f64, price: f64) -> Holding {
        Holding::new(Symbol::parse(symbol).expect("valid symbol"), amount, price, None)
            .expect("valid holding")
    }

    #[test]
    fn under_allocated_mid_tier_portfolio_should_buy() {
        let analysis = RiskAllocationAnalyzer::default()
            .analyze(&[holding("BTC", 0.5, 40_000.0), holding("ETH", 10.0, 3_000.0)])
            .expect("analysis");

        assert_eq!(analysis.total_value, 50_000.0);
        assert!((analysis.current_btc_allocation_pct - 40.0).abs() < 1e-9);
        assert_eq!(analysis.recommended_btc_allocation_pct, 70.0);
        assert_eq!(analysis.risk_level, RiskLevel::High);
        assert_eq!(analysis.rebalance_direction, RebalanceDirection::Buy);
        assert!((analysis.rebalance_amount - 15_000.0).abs() < 1e-6);
        assert!(!analysis.is_compliant);
    }

    #[test]
    fn single_asset_scores_zero() {
        let analysis = RiskAllocationAnalyzer::default()
            .analyze(&[holding("BTC", 1.0, 10_000.0)])
            .expect("analysis");

        assert_eq!(analysis.diversification_score, 0.0);
        assert_eq!(analysis.rebalance_direction, RebalanceDirection::Sell);
        assert!(analysis.is_compliant);
    }

    #[test]
    fn four_equal_assets_score_seventy_five() {
        let analysis = RiskAllocationAnalyzer::default()
            .analyze(&[
                holding("BTC", 1.0, 2_500.0),
                holding("ETH", 1.0, 2_500.0),
                holding("SOL", 1.0, 2_500.0),
                holding("ADA", 1.0, 2_500.0),
            ])
            .expect("analysis");

        assert!((analysis.diversification_score - 75.0).abs() < 1e-9);
        assert_eq!(analysis.recommended_btc_allocation_pct, 50.0);
        assert_eq!(analysis.risk_level, RiskLevel::High);
    }

    #[test]
    fn repeated_symbols_are_aggregated_before_concentration() {
        let analysis = RiskAllocationAnalyzer::default()
            .analyze(&[
                holding("eth", 1.0, 500.0),
                holding("ETH", 1.0, 500.0),
                holding("btc", 1.0, 1_000.0),
            ])
            .expect("analysis");

        assert!((analysis.diversification_score - 50.0).abs() < 1e-9);
        assert_eq!(analysis.rebalance_direction, RebalanceDirection::NoChange);
        assert_eq!(analysis.rebalance_amount, 0.0);
        assert_eq!(analysis.risk_level, RiskLevel::Low);
    }

    #[test]
    fn empty_or_worthless_portfolio_is_rejected() {
        let analyzer = RiskAllocationAnalyzer::default();

        assert_eq!(analyzer.analyze(&[]), Err(AnalyticsError::EmptyPortfolio));
        assert_eq!(
            analyzer.analyze(&[holding("BTC", 0.0, 50_000.0)]),
            Err(AnalyticsError::EmptyPortfolio)
        );
    }

    #[test]
    fn direction_serializes_none_for_balanced() {
        let json = serde_json::to_string(&RebalanceDirection::NoChange).expect("serialize");
        assert_eq!(json, "\"none\"");
    }
}
