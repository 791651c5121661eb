use paperfolio_core::{Confidence, PricePoint};
use serde::{Deserialize, Serialize};

use crate::cagr::CagrCalculator;
use crate::error::AnalyticsError;

pub const IRR_INITIAL_GUESS: f64 = 0.10;
pub const IRR_TOLERANCE: f64 = 0.01;
pub const IRR_MAX_ITERATIONS: usize = 100;
pub const RATE_FLOOR: f64 = -0.99;
pub const RATE_CEILING: f64 = 10.0;
const FLAT_DERIVATIVE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NpvInputs {
    pub current_price: f64,
    pub cagr: f64,
    pub beta: f64,
    pub benchmark_cagr: f64,
    pub risk_free_rate: f64,
    pub investment: f64,
    pub horizon_years: u32,
    pub long_term_growth_rate: Option<f64>,
}

/// Everything but the asset's own growth, for valuing straight from history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NpvAssumptions {
    pub beta: f64,
    pub benchmark_cagr: f64,
    pub risk_free_rate: f64,
    pub investment: f64,
    pub horizon_years: u32,
    pub long_term_growth_rate: Option<f64>,
    /// Defaults to the last price in the history.
    pub current_price: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IrrStatus {
    Converged,
    Unconverged,
    FlatDerivative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpvResult {
    pub npv: f64,
    pub irr: f64,
    pub irr_status: IrrStatus,
    pub irr_iterations: usize,
    pub confidence: Confidence,
    pub discount_rate: f64,
    pub cash_flows: Vec<f64>,
    pub projected_prices: Vec<f64>,
    pub beta: f64,
    pub cagr: f64,
    pub market_premium: f64,
    pub investment: f64,
    pub horizon_years: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IrrSolution {
    pub rate: f64,
    pub status: IrrStatus,
    pub iterations: usize,
}

/// Discounted cash-flow valuation of holding an asset for a whole number of years.
#[derive(Debug, Clone, Copy, Default)]
pub struct NpvIrrEngine;

impl NpvIrrEngine {
    pub fn compute(&self, inputs: &NpvInputs) -> Result<NpvResult, AnalyticsError> {
        validate(inputs)?;

        let horizon = inputs.horizon_years as usize;
        let mut warnings = Vec::new();

        let projected_prices = (0..=inputs.horizon_years)
            .map(|year| inputs.current_price * (1.0 + inputs.cagr).powi(year as i32))
            .collect::<Vec<_>>();

        let market_premium = inputs.benchmark_cagr - inputs.risk_free_rate;
        let mut discount_rate = inputs.risk_free_rate + inputs.beta * market_premium;
        if !discount_rate.is_finite() {
            return Err(AnalyticsError::InvalidInput(String::from(
                "discount rate is not finite",
            )));
        }
        if discount_rate < RATE_FLOOR {
            warnings.push(format!(
                "discount rate {discount_rate:.4} clamped to {RATE_FLOOR}"
            ));
            discount_rate = RATE_FLOOR;
        }

        let sale_proceeds = inputs.investment * projected_prices[horizon] / projected_prices[0];

        let mut cash_flows = vec![0.0; horizon + 1];
        cash_flows[0] = -inputs.investment;
        cash_flows[horizon] = sale_proceeds;

        let mut terminal_value = None;
        if let Some(growth) = inputs.long_term_growth_rate {
            if growth > 0.0 && growth < discount_rate {
                let undiscounted = sale_proceeds * (1.0 + growth) / (discount_rate - growth);
                cash_flows[horizon] += undiscounted;
                terminal_value =
                    Some(undiscounted / (1.0 + discount_rate).powi(inputs.horizon_years as i32));
            } else {
                warnings.push(format!(
                    "terminal value skipped: long-term growth {growth:.4} must lie strictly \
                     between 0 and the discount rate {discount_rate:.4}"
                ));
            }
        }

        let npv = npv_at(&cash_flows, discount_rate);
        let solution = solve_irr(&cash_flows);
        let confidence = match solution.status {
            IrrStatus::Converged => Confidence::High,
            IrrStatus::Unconverged => {
                warnings.push(format!(
                    "IRR did not converge after {} iteration(s); reporting last iterate",
                    solution.iterations
                ));
                Confidence::Low
            }
            IrrStatus::FlatDerivative => {
                warnings.push(String::from(
                    "IRR search stopped on a flat derivative; reporting last iterate",
                ));
                Confidence::Low
            }
        };

        Ok(NpvResult {
            npv,
            irr: solution.rate,
            irr_status: solution.status,
            irr_iterations: solution.iterations,
            confidence,
            discount_rate,
            cash_flows,
            projected_prices,
            beta: inputs.beta,
            cagr: inputs.cagr,
            market_premium,
            investment: inputs.investment,
            horizon_years: inputs.horizon_years,
            terminal_value,
            warnings,
        })
    }

    /// Values the asset using the CAGR measured over `history`.
    pub fn from_history(
        &self,
        history: &[PricePoint],
        assumptions: &NpvAssumptions,
    ) -> Result<NpvResult, AnalyticsError> {
        let growth = CagrCalculator.compute(history)?;
        let mut result = self.compute(&NpvInputs {
            current_price: assumptions.current_price.unwrap_or(growth.ending_price),
            cagr: growth.cagr,
            beta: assumptions.beta,
            benchmark_cagr: assumptions.benchmark_cagr,
            risk_free_rate: assumptions.risk_free_rate,
            investment: assumptions.investment,
            horizon_years: assumptions.horizon_years,
            long_term_growth_rate: assumptions.long_term_growth_rate,
        })?;
        result.warnings.extend(growth.warnings);
        Ok(result)
    }
}

fn validate(inputs: &NpvInputs) -> Result<(), AnalyticsError> {
    let finite = [
        ("current_price", inputs.current_price),
        ("cagr", inputs.cagr),
        ("beta", inputs.beta),
        ("benchmark_cagr", inputs.benchmark_cagr),
        ("risk_free_rate", inputs.risk_free_rate),
        ("investment", inputs.investment),
    ];
    if let Some((field, _)) = finite.iter().find(|(_, value)| !value.is_finite()) {
        return Err(AnalyticsError::InvalidInput(format!("{field} must be finite")));
    }
    if inputs.current_price <= 0.0 {
        return Err(AnalyticsError::InvalidInput(String::from(
            "current_price must be positive",
        )));
    }
    if inputs.investment <= 0.0 {
        return Err(AnalyticsError::InvalidInput(String::from(
            "investment must be positive",
        )));
    }
    if inputs.horizon_years == 0 {
        return Err(AnalyticsError::InvalidInput(String::from(
            "horizon_years must be at least 1",
        )));
    }
    if inputs.cagr <= -1.0 {
        return Err(AnalyticsError::InvalidInput(String::from(
            "cagr must be greater than -1",
        )));
    }
    if inputs
        .long_term_growth_rate
        .is_some_and(|growth| !growth.is_finite())
    {
        return Err(AnalyticsError::InvalidInput(String::from(
            "long_term_growth_rate must be finite",
        )));
    }
    Ok(())
}

/// `Σ CF_t / (1+rate)^t`.
pub fn npv_at(cash_flows: &[f64], rate: f64) -> f64 {
    let base = 1.0 + rate;
    cash_flows
        .iter()
        .enumerate()
        .map(|(year, flow)| flow / base.powi(year as i32))
        .sum()
}

fn npv_derivative(cash_flows: &[f64], rate: f64) -> f64 {
    let base = 1.0 + rate;
    cash_flows
        .iter()
        .enumerate()
        .skip(1)
        .map(|(year, flow)| -(year as f64) * flow / base.powi(year as i32 + 1))
        .sum()
}

/// Newton-Raphson on the NPV curve, clamped to `[RATE_FLOOR, RATE_CEILING]`.
pub fn solve_irr(cash_flows: &[f64]) -> IrrSolution {
    let mut rate = IRR_INITIAL_GUESS;

    for iteration in 0..IRR_MAX_ITERATIONS {
        let value = npv_at(cash_flows, rate);
        if value.abs() < IRR_TOLERANCE {
            return IrrSolution {
                rate,
                status: IrrStatus::Converged,
                iterations: iteration,
            };
        }

        let slope = npv_derivative(cash_flows, rate);
        if !slope.is_finite() || slope.abs() < FLAT_DERIVATIVE {
            return IrrSolution {
                rate,
                status: IrrStatus::FlatDerivative,
                iterations: iteration,
            };
        }

        rate = (rate - value / slope).clamp(RATE_FLOOR, RATE_CEILING);
    }

    let status = if npv_at(cash_flows, rate).abs() < IRR_TOLERANCE {
        IrrStatus::Converged
    } else {
        IrrStatus::Unconverged
    };
    IrrSolution {
        rate,
        status,
        iterations: IRR_MAX_ITERATIONS,
    }
}
