//! Ordered fallback across the data tiers.
//!
//! Tiers are tried in registration order (live, then persisted). The first tier
//! that returns enough history for every requested symbol wins. When none does,
//! the synthetic sector table answers instead, so [`DataSourceResolver::resolve`]
//! always produces a [`Resolution`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::adapters::{CoinGeckoAdapter, SectorCategory, SectorEstimate, SectorEstimates, WarehouseAdapter};
use crate::circuit_breaker::CircuitState;
use crate::data_source::{HealthState, HealthStatus, MarketDataGateway, SeriesRequest, SourceError};
use crate::envelope::EnvelopeError;
use crate::{DataTier, DateRange, PriceSeries, ProviderId, Symbol};

/// What to fetch for one analytics request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPlan {
    pub asset: Symbol,
    pub benchmark: Option<Symbol>,
    pub range: DateRange,
    /// Minimum daily points each series must have for a tier to count.
    pub minimum_points: usize,
    pub category_hint: Option<SectorCategory>,
}

impl FetchPlan {
    pub fn single(asset: Symbol, range: DateRange, minimum_points: usize) -> Self {
        Self {
            asset,
            benchmark: None,
            range,
            minimum_points,
            category_hint: None,
        }
    }

    pub fn paired(asset: Symbol, benchmark: Symbol, range: DateRange, minimum_points: usize) -> Self {
        Self {
            benchmark: Some(benchmark),
            ..Self::single(asset, range, minimum_points)
        }
    }

    pub fn with_category_hint(mut self, category: Option<SectorCategory>) -> Self {
        self.category_hint = category;
        self
    }
}

/// Series returned by a data tier.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedSeries {
    pub asset: PriceSeries,
    pub benchmark: Option<PriceSeries>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedData {
    Series(FetchedSeries),
    Synthetic(SectorEstimate),
}

/// Outcome of one resolution, tagged with where the data came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub outcome: ResolvedData,
    pub provenance: ProviderId,
    pub tier_chain: Vec<ProviderId>,
    pub warnings: Vec<String>,
    pub errors: Vec<EnvelopeError>,
    pub latency_ms: u64,
}

impl Resolution {
    pub fn tier(&self) -> DataTier {
        self.provenance.tier()
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self.outcome, ResolvedData::Synthetic(_))
    }
}

/// Tier snapshot used by the `sources` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TierSnapshot {
    pub id: ProviderId,
    pub tier: DataTier,
    pub health: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circuit: Option<CircuitState>,
}

impl TierSnapshot {
    pub fn status_label(self) -> &'static str {
        if !self.health.rate_available {
            return "rate_limited";
        }

        match self.health.state {
            HealthState::Healthy => "healthy",
            HealthState::Degraded => "degraded",
            HealthState::Unhealthy => "unhealthy",
        }
    }
}

pub struct DataSourceResolver {
    tiers: Vec<Arc<dyn MarketDataGateway>>,
    sectors: SectorEstimates,
    fetch_timeout: Duration,
}

impl DataSourceResolver {
    pub fn new(
        tiers: Vec<Arc<dyn MarketDataGateway>>,
        sectors: SectorEstimates,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            tiers,
            sectors,
            fetch_timeout,
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// Providers in fallback order, ending with the synthetic tier.
    pub fn tier_ids(&self) -> Vec<ProviderId> {
        self.tiers
            .iter()
            .map(|tier| tier.id())
            .chain(std::iter::once(ProviderId::Sector))
            .collect()
    }

    pub fn sector_estimate(&self, symbol: &Symbol, category_hint: Option<SectorCategory>) -> SectorEstimate {
        self.sectors.estimate(symbol, category_hint)
    }

    pub async fn snapshots(&self) -> Vec<TierSnapshot> {
        let mut snapshots = Vec::with_capacity(self.tiers.len() + 1);
        for tier in &self.tiers {
            snapshots.push(TierSnapshot {
                id: tier.id(),
                tier: tier.tier(),
                health: tier.health().await,
                circuit: tier.circuit_state(),
            });
        }
        snapshots.push(TierSnapshot {
            id: ProviderId::Sector,
            tier: DataTier::Synthetic,
            health: HealthStatus::healthy(),
            circuit: None,
        });
        snapshots
    }

    /// Walk the tiers until one satisfies `plan`; never fails.
    pub async fn resolve(&self, plan: &FetchPlan) -> Resolution {
        self.resolve_with(plan, |_| Ok(())).await
    }

    /// Like [`DataSourceResolver::resolve`], but a tier also has to pass
    /// `accept`. A rejection counts as that tier's failure and the walk moves on.
    pub async fn resolve_with<F>(&self, plan: &FetchPlan, accept: F) -> Resolution
    where
        F: Fn(&FetchedSeries) -> Result<(), SourceError> + Sync,
    {
        let started = Instant::now();
        let mut tier_chain = Vec::with_capacity(self.tiers.len() + 1);
        let mut errors = Vec::new();

        for tier in &self.tiers {
            let provider = tier.id();
            tier_chain.push(provider);

            let health = tier.health().await;
            if !health.is_usable() {
                let error = if health.state == HealthState::Unhealthy {
                    SourceError::unavailable("source health check reported unhealthy")
                } else {
                    SourceError::rate_limited("source has no rate budget available")
                };
                record_failure(&mut errors, provider, &plan.asset, &error);
                continue;
            }

            let fetched = self
                .fetch_from(tier.as_ref(), plan)
                .await
                .and_then(|series| accept(&series).map(|()| series));
            match fetched {
                Ok(series) => {
                    let mut warnings = Vec::new();
                    if !errors.is_empty() {
                        warnings.push(format!(
                            "fallback succeeded with '{}' after {} failed attempt(s)",
                            provider.as_str(),
                            errors.len()
                        ));
                    }
                    info!(
                        tier = %provider.tier(),
                        provider = %provider,
                        symbol = %plan.asset,
                        points = series.asset.len(),
                        "data tier selected"
                    );

                    return Resolution {
                        outcome: ResolvedData::Series(series),
                        provenance: provider,
                        tier_chain,
                        warnings,
                        errors,
                        latency_ms: elapsed_ms(started),
                    };
                }
                Err(error) => record_failure(&mut errors, provider, &plan.asset, &error),
            }
        }

        tier_chain.push(ProviderId::Sector);
        let estimate = self.sector_estimate(&plan.asset, plan.category_hint);
        warn!(
            tier = %DataTier::Synthetic,
            provider = %ProviderId::Sector,
            symbol = %plan.asset,
            reason = "all data tiers failed",
            "using sector estimate"
        );

        Resolution {
            outcome: ResolvedData::Synthetic(estimate),
            provenance: ProviderId::Sector,
            tier_chain,
            warnings: vec![String::from("all data tiers failed; using sector estimate")],
            errors,
            latency_ms: elapsed_ms(started),
        }
    }

    /// Asset and benchmark are requested concurrently from the same tier.
    async fn fetch_from(
        &self,
        gateway: &dyn MarketDataGateway,
        plan: &FetchPlan,
    ) -> Result<FetchedSeries, SourceError> {
        let asset = self.fetch_one(gateway, plan.asset.clone(), plan);

        match &plan.benchmark {
            Some(benchmark) => {
                let (asset, benchmark) =
                    tokio::join!(asset, self.fetch_one(gateway, benchmark.clone(), plan));
                Ok(FetchedSeries {
                    asset: asset?,
                    benchmark: Some(benchmark?),
                })
            }
            None => Ok(FetchedSeries {
                asset: asset.await?,
                benchmark: None,
            }),
        }
    }

    async fn fetch_one(
        &self,
        gateway: &dyn MarketDataGateway,
        symbol: Symbol,
        plan: &FetchPlan,
    ) -> Result<PriceSeries, SourceError> {
        let request = SeriesRequest::new(symbol, plan.range);
        let series = tokio::time::timeout(self.fetch_timeout, gateway.fetch_series(request))
            .await
            .map_err(|_| SourceError::timeout(duration_ms(self.fetch_timeout)))??;

        if series.len() < plan.minimum_points {
            return Err(SourceError::insufficient_data(plan.minimum_points, series.len()));
        }

        Ok(series)
    }
}

fn record_failure(
    errors: &mut Vec<EnvelopeError>,
    provider: ProviderId,
    symbol: &Symbol,
    error: &SourceError,
) {
    debug!(
        tier = %provider.tier(),
        provider = %provider,
        symbol = %symbol,
        reason = %error,
        "data tier skipped"
    );
    errors.push(EnvelopeError::from_source(provider, error));
}

fn elapsed_ms(started: Instant) -> u64 {
    duration_ms(started.elapsed())
}

fn duration_ms(duration: Duration) -> u64 {
    duration.as_millis().min(u128::from(u64::MAX)) as u64
}

/// Builder wiring the production tiers.
///
/// # Environment Variables
///
/// | Purpose | Primary Env Var | Fallback Env Var |
/// |---------|-----------------|------------------|
/// | CoinGecko demo key | `PAPERFOLIO_COINGECKO_API_KEY` | `COINGECKO_API_KEY` |
/// | CoinGecko endpoint | `PAPERFOLIO_COINGECKO_BASE_URL` | built-in public URL |
#[derive(Default)]
pub struct DataSourceResolverBuilder {
    live: Option<CoinGeckoAdapter>,
    warehouse: Option<WarehouseAdapter>,
    fetch_timeout: Option<Duration>,
}

impl DataSourceResolverBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live tier over reqwest, with the API key read from the environment.
    pub fn with_real_clients(mut self) -> Self {
        self.live = Some(CoinGeckoAdapter::from_env());
        self
    }

    /// Live tier that never reaches the network; it always falls through.
    pub fn with_offline_mode(mut self) -> Self {
        self.live = Some(CoinGeckoAdapter::default());
        self
    }

    pub fn with_warehouse(mut self, adapter: WarehouseAdapter) -> Self {
        self.warehouse = Some(adapter);
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> DataSourceResolver {
        let fetch_timeout = self.fetch_timeout.unwrap_or(Duration::from_secs(10));
        let mut tiers: Vec<Arc<dyn MarketDataGateway>> = Vec::new();
        if let Some(live) = self.live {
            tiers.push(Arc::new(live.with_request_timeout_ms(duration_ms(fetch_timeout))));
        }
        if let Some(warehouse) = self.warehouse {
            tiers.push(Arc::new(warehouse));
        }

        DataSourceResolver::new(tiers, SectorEstimates::default(), fetch_timeout)
    }
}
