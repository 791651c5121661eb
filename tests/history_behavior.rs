//! Behavior-driven tests for the persisted price history tier.
//!
//! These tests verify HOW stored history is written and then served back
//! through the persisted tier.

use paperfolio_core::adapters::price_record;
use paperfolio_core::{
    DateRange, MarketDataGateway, ProviderId, SeriesRequest, SourceErrorKind, WarehouseError,
};
use paperfolio_tests::{as_of, open_warehouse, seed_warehouse, symbol, warehouse_tier, HISTORY_DAYS};
use tempfile::tempdir;

#[tokio::test]
async fn when_history_is_seeded_system_serves_it_through_the_persisted_tier() {
    // Given: A warehouse seeded with 400 days of BTC
    let temp = tempdir().expect("tempdir");
    let warehouse = open_warehouse(temp.path());
    seed_warehouse(&warehouse, &["BTC"]);
    let tier = warehouse_tier(warehouse);

    // When: The last 90 days are requested
    let range = DateRange::trailing(as_of(), 90).expect("valid range");
    let series = tier
        .fetch_series(SeriesRequest::new(symbol("BTC"), range))
        .await
        .expect("stored history");

    // Then: Only rows inside the range come back, oldest first
    assert_eq!(tier.id(), ProviderId::Warehouse);
    assert!(series.len() <= 91);
    assert!(series.len() >= 90);
    assert!(series.points.windows(2).all(|pair| pair[0].date < pair[1].date));
    assert_eq!(series.latest().map(|point| point.date), Some(as_of()));
}

#[tokio::test]
async fn when_symbol_was_never_stored_system_reports_insufficient_data() {
    // Given: An empty warehouse
    let temp = tempdir().expect("tempdir");
    let tier = warehouse_tier(open_warehouse(temp.path()));

    // When: Any series is requested
    let range = DateRange::trailing(as_of(), 30).expect("valid range");
    let error = tier
        .fetch_series(SeriesRequest::new(symbol("DOGE"), range))
        .await
        .expect_err("no rows");

    // Then: The tier fails in a way the resolver falls through on
    assert_eq!(error.kind(), SourceErrorKind::InsufficientData);
}

#[test]
fn when_rows_are_imported_twice_system_keeps_one_row_per_day() {
    // Given: A warehouse with seeded ETH history
    let temp = tempdir().expect("tempdir");
    let warehouse = open_warehouse(temp.path());
    seed_warehouse(&warehouse, &["ETH"]);

    // When: The same history is imported again
    seed_warehouse(&warehouse, &["ETH"]);

    // Then: Coverage still shows one row per day
    let coverage = warehouse.coverage().expect("coverage");
    assert_eq!(coverage.len(), 1);
    assert_eq!(coverage[0].symbol, "ETH");
    assert_eq!(coverage[0].rows, HISTORY_DAYS as u64);
    assert_eq!(coverage[0].last_date, "2024-06-30");
}

#[test]
fn when_a_batch_contains_an_invalid_row_system_writes_nothing() {
    // Given: A batch whose second row has a corrupt price
    let temp = tempdir().expect("tempdir");
    let warehouse = open_warehouse(temp.path());
    let mut rows = vec![
        price_record(&symbol("SOL"), as_of(), 150.0, 1.0e6).expect("valid row"),
        price_record(&symbol("SOL"), as_of().saturating_sub_days(1), 149.0, 1.0e6)
            .expect("valid row"),
    ];
    rows[1].price = f64::NAN;

    // When: The batch is written
    let result = warehouse.upsert_daily_prices("csv", "import:test", &rows);

    // Then: It is rejected as a whole
    assert!(matches!(result, Err(WarehouseError::InvalidRecord { row: 1, .. })));
    assert!(warehouse.coverage().expect("coverage").is_empty());
}
