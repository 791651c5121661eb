use std::collections::BTreeMap;

use paperfolio_core::{CalendarDate, PriceSeries};
use serde::{Deserialize, Serialize};

/// One date on which both the asset and the benchmark have a price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignedObservation {
    pub date: CalendarDate,
    pub asset_price: f64,
    pub asset_volume: f64,
    pub benchmark_price: f64,
}

/// Run of asset dates with no benchmark price that was too long to fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataGap {
    pub start: CalendarDate,
    pub end: CalendarDate,
    pub missing_days: usize,
}

impl DataGap {
    pub fn describe(&self) -> String {
        format!(
            "benchmark data gap of {} day(s) from {} to {}; the whole run was dropped",
            self.missing_days, self.start, self.end
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Alignment {
    pub observations: Vec<AlignedObservation>,
    pub gaps: Vec<DataGap>,
}

impl Alignment {
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

/// Joins an asset series with its benchmark by date.
#[derive(Debug, Clone, Copy)]
pub struct SeriesAligner {
    max_fill_days: usize,
}

impl Default for SeriesAligner {
    fn default() -> Self {
        Self { max_fill_days: 2 }
    }
}

struct MissingRun {
    start: CalendarDate,
    end: CalendarDate,
    len: usize,
    /// Forward-filled observations, kept only if the run stays short.
    filled: Vec<AlignedObservation>,
}

impl SeriesAligner {
    pub fn new(max_fill_days: usize) -> Self {
        Self { max_fill_days }
    }

    /// Observations come out sorted by date. A run of at most `max_fill_days`
    /// asset dates without a benchmark price reuses the last benchmark price.
    /// A longer run is dropped entirely and reported as a [`DataGap`].
    /// Fewer than two observations yields an empty alignment (gaps are kept).
    pub fn align(&self, asset: &PriceSeries, benchmark: &PriceSeries) -> Alignment {
        let benchmark_prices: BTreeMap<CalendarDate, f64> = benchmark
            .points
            .iter()
            .map(|point| (point.date, point.price))
            .collect();

        let mut asset_points = asset.points.clone();
        asset_points.sort_by_key(|point| point.date);

        let mut observations = Vec::with_capacity(asset_points.len());
        let mut gaps = Vec::new();
        let mut last_benchmark: Option<f64> = None;
        let mut run: Option<MissingRun> = None;

        for point in asset_points {
            if let Some(price) = benchmark_prices.get(&point.date).copied() {
                self.close_run(run.take(), &mut observations, &mut gaps);
                last_benchmark = Some(price);
                observations.push(AlignedObservation {
                    date: point.date,
                    asset_price: point.price,
                    asset_volume: point.volume,
                    benchmark_price: price,
                });
                continue;
            }

            let current = run.get_or_insert_with(|| MissingRun {
                start: point.date,
                end: point.date,
                len: 0,
                filled: Vec::new(),
            });
            current.end = point.date;
            current.len += 1;

            if current.len > self.max_fill_days {
                current.filled.clear();
                continue;
            }
            if let Some(price) = last_benchmark {
                current.filled.push(AlignedObservation {
                    date: point.date,
                    asset_price: point.price,
                    asset_volume: point.volume,
                    benchmark_price: price,
                });
            }
        }
        self.close_run(run, &mut observations, &mut gaps);

        if observations.len() < 2 {
            observations.clear();
        }

        Alignment { observations, gaps }
    }

    fn close_run(
        &self,
        run: Option<MissingRun>,
        observations: &mut Vec<AlignedObservation>,
        gaps: &mut Vec<DataGap>,
    ) {
        let Some(run) = run else {
            return;
        };

        if run.len > self.max_fill_days {
            gaps.push(DataGap {
                start: run.start,
                end: run.end,
                missing_days: run.len,
            });
        } else {
            observations.extend(run.filled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paperfolio_core::{PricePoint, Symbol};

    fn day(offset: i64) -> CalendarDate {
        CalendarDate::parse("2024-01-01")
            .expect("valid date")
            .saturating_add_days(offset)
    }

    fn series(symbol: &str, days: &[i64], price: impl Fn(i64) -> f64) -> PriceSeries {
        PriceSeries::new(
            Symbol::parse(symbol).expect("valid symbol"),
            days.iter()
                .map(|offset| PricePoint::new(day(*offset), price(*offset), 1_000.0).expect("valid"))
                .collect(),
        )
    }

    #[test]
    fn exact_matches_are_joined_in_date_order() {
        let asset = series("ETH", &[0, 1, 2], |offset| 10.0 + offset as f64);
        let benchmark = series("BTC", &[2, 1, 0], |offset| 100.0 + offset as f64);

        let alignment = SeriesAligner::default().align(&asset, &benchmark);

        assert_eq!(alignment.len(), 3);
        assert!(alignment.gaps.is_empty());
        assert_eq!(alignment.observations[2].benchmark_price, 102.0);
        assert_eq!(alignment.observations[0].date, day(0));
    }

    #[test]
    fn short_benchmark_gaps_are_forward_filled() {
        let asset = series("ETH", &[0, 1, 2, 3], |_| 10.0);
        let benchmark = series("BTC", &[0, 3], |offset| 100.0 + offset as f64);

        let alignment = SeriesAligner::default().align(&asset, &benchmark);

        assert_eq!(alignment.len(), 4);
        assert!(alignment.gaps.is_empty());
        assert_eq!(alignment.observations[1].benchmark_price, 100.0);
        assert_eq!(alignment.observations[2].benchmark_price, 100.0);
        assert_eq!(alignment.observations[3].benchmark_price, 103.0);
    }

    #[test]
    fn long_gaps_are_dropped_whole_and_reported() {
        let asset = series("ETH", &[0, 1, 2, 3, 4, 5, 6], |_| 10.0);
        let benchmark = series("BTC", &[0, 6], |_| 100.0);

        let alignment = SeriesAligner::default().align(&asset, &benchmark);

        let dates = alignment
            .observations
            .iter()
            .map(|observation| observation.date)
            .collect::<Vec<_>>();
        assert_eq!(dates, vec![day(0), day(6)]);
        assert!(alignment
            .observations
            .iter()
            .all(|observation| observation.benchmark_price == 100.0));
        assert_eq!(
            alignment.gaps,
            vec![DataGap {
                start: day(1),
                end: day(5),
                missing_days: 5,
            }]
        );
        assert!(alignment.gaps[0].describe().contains("5 day(s)"));
    }

    #[test]
    fn trailing_short_run_is_still_filled() {
        let asset = series("ETH", &[0, 1, 2, 3], |_| 10.0);
        let benchmark = series("BTC", &[0, 1], |offset| 100.0 + offset as f64);

        let alignment = SeriesAligner::default().align(&asset, &benchmark);

        assert_eq!(alignment.len(), 4);
        assert_eq!(alignment.observations[3].benchmark_price, 101.0);
        assert!(alignment.gaps.is_empty());
    }

    #[test]
    fn leading_dates_without_benchmark_history_are_skipped() {
        let asset = series("ETH", &[0, 1, 2, 3], |_| 10.0);
        let benchmark = series("BTC", &[2, 3], |_| 100.0);

        let alignment = SeriesAligner::default().align(&asset, &benchmark);

        assert_eq!(alignment.len(), 2);
        assert_eq!(alignment.observations[0].date, day(2));
    }

    #[test]
    fn fewer_than_two_observations_is_empty() {
        let asset = series("ETH", &[0, 1], |_| 10.0);
        let benchmark = series("BTC", &[1], |_| 100.0);

        let alignment = SeriesAligner::default().align(&asset, &benchmark);

        assert!(alignment.is_empty());
    }
}
