//! Behavior-driven tests for the tiered data fallback.
//!
//! These tests verify WHICH tier answers a request and how the answer is
//! tagged when earlier tiers fail.

use std::time::Duration;

use paperfolio_analytics::NpvRequest;
use paperfolio_core::{
    CacheMode, Confidence, DataTier, EngineConfig, ProviderId, SectorCategory, SourceError,
};
use paperfolio_tests::{
    as_of, engine, engine_with_config, engine_with_timeout, open_warehouse, seed_warehouse, symbol, warehouse_tier,
    DisjointGateway, FailingGateway, HangingGateway, SyntheticGateway, TRUE_BETA,
};
use tempfile::tempdir;

// =============================================================================
// Fallback: Live tier healthy
// =============================================================================

#[tokio::test]
async fn when_live_tier_answers_system_tags_live_provenance() {
    // Given: A healthy live tier
    let live = SyntheticGateway::new(ProviderId::Coingecko);
    let engine = engine(vec![live.clone()]);

    // When: Beta is requested
    let assessment = engine
        .beta(&symbol("ETH"), &symbol("BTC"), as_of(), CacheMode::Use)
        .await
        .expect("valid request");

    // Then: The live tier is credited and nothing is provisional
    assert_eq!(assessment.provenance, Some(ProviderId::Coingecko));
    assert_eq!(assessment.tier, Some(DataTier::Live));
    assert_eq!(assessment.tier_chain, vec![ProviderId::Coingecko]);
    assert!(!assessment.provisional);
    assert!(assessment.errors.is_empty());
    assert!((assessment.result.beta - TRUE_BETA).abs() < 0.1);
}

// =============================================================================
// Fallback: Live tier fails
// =============================================================================

#[tokio::test]
async fn when_live_tier_fails_system_uses_persisted_history() {
    // Given: A failing live tier and a warehouse seeded with history
    let temp = tempdir().expect("tempdir");
    let warehouse = open_warehouse(temp.path());
    seed_warehouse(&warehouse, &["ETH", "BTC"]);
    let live = FailingGateway::new(
        ProviderId::Coingecko,
        SourceError::unavailable("connection refused"),
    );
    let engine = engine(vec![live, warehouse_tier(warehouse)]);

    // When: Beta is requested
    let assessment = engine
        .beta(&symbol("ETH"), &symbol("BTC"), as_of(), CacheMode::Use)
        .await
        .expect("valid request");

    // Then: The result is measured from stored history and tagged as such
    assert_eq!(assessment.provenance, Some(ProviderId::Warehouse));
    assert_eq!(assessment.tier, Some(DataTier::Persisted));
    assert_eq!(
        assessment.tier_chain,
        vec![ProviderId::Coingecko, ProviderId::Warehouse]
    );
    assert!(!assessment.provisional);
    assert!(assessment
        .warnings
        .iter()
        .any(|warning| warning == "fallback succeeded with 'warehouse' after 1 failed attempt(s)"));

    // And: The live failure is recorded with its source
    assert_eq!(assessment.errors.len(), 1);
    assert_eq!(assessment.errors[0].source, Some(ProviderId::Coingecko));
    assert_eq!(assessment.errors[0].code, "source.unavailable");
    assert!((assessment.result.beta - TRUE_BETA).abs() < 0.1);
}

#[tokio::test]
async fn when_live_tier_hangs_system_times_out_and_falls_back() {
    // Given: A live tier that never answers and a short fetch timeout
    let persisted = SyntheticGateway::new(ProviderId::Warehouse);
    let engine = engine_with_timeout(
        vec![std::sync::Arc::new(HangingGateway), persisted],
        Duration::from_millis(50),
    );

    // When: CAGR is requested
    let assessment = engine
        .cagr(&symbol("SOL"), as_of(), CacheMode::Use)
        .await
        .expect("valid request");

    // Then: The timeout is recorded and the next tier answers
    assert_eq!(assessment.provenance, Some(ProviderId::Warehouse));
    assert_eq!(assessment.errors[0].code, "source.timeout");
    assert!(assessment.result.cagr.is_finite());
}

#[tokio::test]
async fn when_live_series_is_too_short_system_advances_to_next_tier() {
    // Given: A live tier with only 30 days of history
    let live = SyntheticGateway::with_days(ProviderId::Coingecko, 30);
    let persisted = SyntheticGateway::new(ProviderId::Warehouse);
    let engine = engine(vec![live, persisted]);

    // When: Beta is requested (at least 180 aligned points are required)
    let assessment = engine
        .beta(&symbol("ETH"), &symbol("BTC"), as_of(), CacheMode::Use)
        .await
        .expect("valid request");

    // Then: The short series counts as a failed attempt
    assert_eq!(assessment.provenance, Some(ProviderId::Warehouse));
    assert_eq!(assessment.errors[0].code, "source.insufficient_data");
}

#[tokio::test]
async fn when_live_series_do_not_overlap_system_measures_from_persisted_history() {
    // Given: A live tier with 220 days per series on disjoint dates
    //        and a warehouse holding aligned history
    let temp = tempdir().expect("tempdir");
    let warehouse = open_warehouse(temp.path());
    seed_warehouse(&warehouse, &["ETH", "BTC"]);
    let live = DisjointGateway::new(ProviderId::Coingecko, 220);
    let engine = engine(vec![live, warehouse_tier(warehouse)]);

    // When: Beta is requested
    let assessment = engine
        .beta(&symbol("ETH"), &symbol("BTC"), as_of(), CacheMode::Use)
        .await
        .expect("valid request");

    // Then: The live tier is rejected for too few aligned points
    assert_eq!(assessment.errors.len(), 1);
    assert_eq!(assessment.errors[0].code, "source.insufficient_data");
    assert_eq!(assessment.errors[0].source, Some(ProviderId::Coingecko));

    // And: The warehouse answers with a measured beta
    assert_eq!(assessment.provenance, Some(ProviderId::Warehouse));
    assert_eq!(
        assessment.tier_chain,
        vec![ProviderId::Coingecko, ProviderId::Warehouse]
    );
    assert!(!assessment.provisional);
    assert!((assessment.result.beta - TRUE_BETA).abs() < 0.1);
}

// =============================================================================
// Fallback: Every data tier fails
// =============================================================================

#[tokio::test]
async fn when_live_and_persisted_fail_system_returns_provisional_low_confidence_result() {
    // Given: A failing live tier and an empty warehouse
    let temp = tempdir().expect("tempdir");
    let warehouse = open_warehouse(temp.path());
    let live = FailingGateway::new(ProviderId::Coingecko, SourceError::timeout(10_000));
    let engine = engine(vec![live, warehouse_tier(warehouse)]);

    // When: Beta is requested
    let result = engine
        .beta(&symbol("ETH"), &symbol("BTC"), as_of(), CacheMode::Use)
        .await;

    // Then: A sector estimate is returned instead of an error
    let assessment = result.expect("fallback never surfaces as an error");
    assert!(assessment.provisional);
    assert_eq!(assessment.confidence, Confidence::Low);
    assert_eq!(assessment.provenance, Some(ProviderId::Sector));
    assert_eq!(assessment.tier, Some(DataTier::Synthetic));
    assert_eq!(
        assessment.tier_chain,
        vec![ProviderId::Coingecko, ProviderId::Warehouse, ProviderId::Sector]
    );
    assert_eq!(assessment.errors.len(), 2);
    assert!(assessment.result.provisional);
    assert!((assessment.result.beta - 1.2).abs() < f64::EPSILON);
}

#[tokio::test]
async fn when_an_unlisted_asset_has_a_configured_sector_system_uses_its_defaults() {
    // Given: PEPE has no sector table entry but is configured as a meme coin
    let live = FailingGateway::new(ProviderId::Coingecko, SourceError::unavailable("down"));
    let mut config = EngineConfig::default();
    config
        .asset_categories
        .insert(String::from("PEPE"), SectorCategory::Meme);
    let engine = engine_with_config(vec![live], Duration::from_secs(5), config);

    // When: Beta is requested
    let assessment = engine
        .beta(&symbol("PEPE"), &symbol("BTC"), as_of(), CacheMode::Use)
        .await
        .expect("fallback never surfaces as an error");

    // Then: The meme category default is published as a provisional estimate
    assert!(assessment.provisional);
    let (meme_beta, _) = SectorCategory::Meme.defaults();
    assert!((assessment.result.beta - meme_beta).abs() < f64::EPSILON);
}

#[tokio::test]
async fn when_all_tiers_fail_system_still_values_the_investment() {
    // Given: No reachable data tier
    let live = FailingGateway::new(
        ProviderId::Coingecko,
        SourceError::rate_limited("429 too many requests"),
    );
    let engine = engine(vec![live]);
    let request = NpvRequest::new(symbol("SOL"), symbol("BTC"), as_of(), 5_000.0, 3)
        .with_current_price(150.0);

    // When: NPV is requested
    let assessment = engine
        .npv(&request, CacheMode::Use)
        .await
        .expect("valid request");

    // Then: Every input is provisional and the valuation is still finite
    assert!(assessment.provisional);
    assert_eq!(assessment.confidence, Confidence::Low);
    assert_eq!(assessment.provenance, Some(ProviderId::Sector));
    assert!(assessment.result.npv.is_finite());
    assert_eq!(assessment.result.cash_flows.len(), 4);
}

#[tokio::test]
async fn when_benchmark_is_flat_system_downgrades_to_sector_estimate() {
    // Given: A benchmark whose history never moves
    let temp = tempdir().expect("tempdir");
    let warehouse = open_warehouse(temp.path());
    seed_warehouse(&warehouse, &["SOL"]);
    let flat = (0..400)
        .map(|day| paperfolio_core::adapters::price_record(
            &symbol("USDC"),
            as_of().saturating_sub_days(day),
            1.0,
            1.0e9,
        )
        .expect("valid row"))
        .collect::<Vec<_>>();
    warehouse
        .upsert_daily_prices("seed", "seed:flat", &flat)
        .expect("seed flat rows");
    let engine = engine(vec![warehouse_tier(warehouse)]);

    // When: Beta against the flat benchmark is requested
    let assessment = engine
        .beta(&symbol("SOL"), &symbol("USDC"), as_of(), CacheMode::Use)
        .await
        .expect("valid request");

    // Then: The zero-variance failure becomes a provisional sector estimate
    assert!(assessment.provisional);
    assert_eq!(assessment.confidence, Confidence::Low);
    assert!(assessment
        .errors
        .iter()
        .any(|error| error.code == "analytics.zero_variance"));
    assert!((assessment.result.beta - 1.6).abs() < f64::EPSILON);
}
