use paperfolio_core::CalendarDate;
use serde::{Deserialize, Serialize};

use crate::align::AlignedObservation;

/// Daily log returns of the asset and benchmark, dated by the later day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReturnObservation {
    pub date: CalendarDate,
    pub asset_return: f64,
    pub benchmark_return: f64,
}

/// `ln(P_t / P_{t-1})` for each adjacent pair of observations.
///
/// A pair with a non-positive or non-finite price on either side is skipped,
/// never zero-filled.
pub fn log_returns(observations: &[AlignedObservation]) -> Vec<ReturnObservation> {
    observations
        .windows(2)
        .filter_map(|pair| {
            let (previous, current) = (pair[0], pair[1]);
            let prices = [
                previous.asset_price,
                current.asset_price,
                previous.benchmark_price,
                current.benchmark_price,
            ];
            if prices.iter().any(|price| !price.is_finite() || *price <= 0.0) {
                return None;
            }

            Some(ReturnObservation {
                date: current.date,
                asset_return: (current.asset_price / previous.asset_price).ln(),
                benchmark_return: (current.benchmark_price / previous.benchmark_price).ln(),
            })
        })
        .collect()
}
