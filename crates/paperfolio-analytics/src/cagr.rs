use paperfolio_core::{CalendarDate, PricePoint};
use serde::{Deserialize, Serialize};

use crate::error::AnalyticsError;

pub const DAYS_PER_YEAR: f64 = 365.25;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CagrResult {
    pub cagr: f64,
    pub beginning_date: CalendarDate,
    pub beginning_price: f64,
    pub ending_date: CalendarDate,
    pub ending_price: f64,
    pub total_days: i64,
    pub num_years: f64,
    pub growth_ratio: f64,
    pub exponent: f64,
    pub annualized_growth: f64,
    pub data_points: usize,
    pub is_valid: bool,
    pub warnings: Vec<String>,
}

impl CagrResult {
    /// Sector-estimate CAGR expressed over the year ending `as_of`, starting
    /// from an index level of 1.0. Never marked valid.
    pub fn provisional(cagr: f64, as_of: CalendarDate) -> Self {
        let beginning_date = as_of.saturating_sub_days(365);
        let total_days = beginning_date.days_until(as_of) + 1;
        let num_years = total_days as f64 / DAYS_PER_YEAR;
        let annualized_growth = 1.0 + cagr;
        let growth_ratio = annualized_growth.powf(num_years);

        Self {
            cagr,
            beginning_date,
            beginning_price: 1.0,
            ending_date: as_of,
            ending_price: growth_ratio,
            total_days,
            num_years,
            growth_ratio,
            exponent: 1.0 / num_years,
            annualized_growth,
            data_points: 0,
            is_valid: false,
            warnings: vec![String::from(
                "provisional sector estimate; not measured from price history",
            )],
        }
    }
}

/// Calendar-exact compound annual growth between the first and last price.
#[derive(Debug, Clone, Copy, Default)]
pub struct CagrCalculator;

impl CagrCalculator {
    pub fn compute(&self, points: &[PricePoint]) -> Result<CagrResult, AnalyticsError> {
        let mut valid = points
            .iter()
            .filter(|point| point.price.is_finite() && point.price > 0.0)
            .copied()
            .collect::<Vec<_>>();
        valid.sort_by_key(|point| point.date);

        let (Some(first), Some(last)) = (valid.first().copied(), valid.last().copied()) else {
            return Err(AnalyticsError::InsufficientData {
                required: 2,
                available: 0,
            });
        };
        if valid.len() < 2 {
            return Err(AnalyticsError::InsufficientData {
                required: 2,
                available: valid.len(),
            });
        }
        if first.date >= last.date {
            return Err(AnalyticsError::InvalidPeriod {
                reason: format!("first and last price share the date {}", first.date),
            });
        }

        let total_days = first.date.days_until(last.date) + 1;
        let num_years = total_days as f64 / DAYS_PER_YEAR;
        if num_years <= 0.0 {
            return Err(AnalyticsError::InvalidPeriod {
                reason: format!("period of {total_days} day(s) is not positive"),
            });
        }

        let growth_ratio = last.price / first.price;
        let exponent = 1.0 / num_years;
        let annualized_growth = growth_ratio.powf(exponent);
        let cagr = annualized_growth - 1.0;

        let mut warnings = Vec::new();
        if num_years < 1.0 {
            warnings.push(format!(
                "period of {total_days} day(s) is shorter than one year; short-period rate, \
                 interpret as short-term growth, not annualized trend"
            ));
        }
        if !cagr.is_finite() {
            warnings.push(String::from("growth rate is not finite"));
        }

        Ok(CagrResult {
            cagr,
            beginning_date: first.date,
            beginning_price: first.price,
            ending_date: last.date,
            ending_price: last.price,
            total_days,
            num_years,
            growth_ratio,
            exponent,
            annualized_growth,
            data_points: valid.len(),
            is_valid: warnings.is_empty() && cagr.is_finite(),
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(date: &str, price: f64) -> PricePoint {
        PricePoint::new(CalendarDate::parse(date).expect("valid date"), price, 0.0).expect("valid")
    }

    #[test]
    fn doubling_over_one_year_is_about_one_hundred_percent() {
        let result = CagrCalculator
            .compute(&[point("2023-01-01", 100.0), point("2024-01-01", 200.0)])
            .expect("cagr");

        assert_eq!(result.total_days, 366);
        assert!((result.num_years - 1.0).abs() < 0.01);
        assert!((result.cagr - 1.0).abs() < 0.01);
        assert!(result.is_valid);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn formula_fields_are_consistent() {
        let result = CagrCalculator
            .compute(&[
                point("2022-06-01", 40.0),
                point("2021-01-01", 10.0),
                point("2023-03-15", 25.0),
            ])
            .expect("cagr");

        assert_eq!(result.beginning_price, 10.0);
        assert_eq!(result.ending_price, 25.0);
        assert_eq!(result.data_points, 3);
        assert!((result.num_years - result.total_days as f64 / 365.25).abs() < 1e-12);
        assert!((result.cagr - (2.5_f64.powf(1.0 / result.num_years) - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn short_periods_warn_but_stay_finite() {
        let result = CagrCalculator
            .compute(&[point("2024-01-01", 100.0), point("2024-03-01", 110.0)])
            .expect("cagr");

        assert!(!result.warnings.is_empty());
        assert!(result.cagr.is_finite());
        assert!(!result.is_valid);
    }

    #[test]
    fn single_point_is_insufficient() {
        let error = CagrCalculator
            .compute(&[point("2024-01-01", 100.0)])
            .expect_err("one point");

        assert_eq!(
            error,
            AnalyticsError::InsufficientData {
                required: 2,
                available: 1
            }
        );
        assert!(CagrCalculator.compute(&[]).is_err());
    }

    #[test]
    fn same_day_endpoints_are_an_invalid_period() {
        let error = CagrCalculator
            .compute(&[point("2024-01-01", 100.0), point("2024-01-01", 120.0)])
            .expect_err("zero span");

        assert!(matches!(error, AnalyticsError::InvalidPeriod { .. }));
    }

    #[test]
    fn provisional_result_compounds_to_the_estimate() {
        let as_of = CalendarDate::parse("2024-06-30").expect("valid date");
        let result = CagrResult::provisional(0.25, as_of);

        assert!(!result.is_valid);
        assert_eq!(result.ending_date, as_of);
        assert!((result.growth_ratio.powf(result.exponent) - 1.25).abs() < 1e-12);
    }
}
