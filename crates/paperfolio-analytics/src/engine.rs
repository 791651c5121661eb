//! Request orchestration: cache, tiered data resolution, then the numerics.
//!
//! Every metric comes back as an [`Assessment`] carrying provenance and
//! confidence. Statistical failures never reach the caller; they downgrade to
//! the sector estimate the same way an exhausted fallback chain does.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use paperfolio_core::cache::{beta_key, cagr_key, npv_key, CacheLookup};
use paperfolio_core::{
    CacheMode, CalendarDate, Confidence, DataSourceResolver, DataTier, DateRange, EngineConfig,
    EnvelopeError, FetchPlan, Holding, ProviderId, Resolution, ResolvedData, ResultCache,
    SectorEstimate, SourceError, Symbol,
};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::align::SeriesAligner;
use crate::allocation::{RiskAllocationAnalyzer, RiskAnalysis};
use crate::beta::{BetaEngine, BetaResult};
use crate::cagr::{CagrCalculator, CagrResult};
use crate::error::AnalyticsError;
use crate::valuation::{NpvInputs, NpvIrrEngine, NpvResult};
use crate::window::AdaptiveWindowSelector;

/// Days of history requested when refreshing a holding's price.
const LIVE_PRICE_LOOKBACK_DAYS: u32 = 7;

/// A metric plus where its inputs came from and how far to trust it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment<T> {
    pub result: T,
    /// Least reliable source that contributed; `None` when only caller data was used.
    pub provenance: Option<ProviderId>,
    pub tier: Option<DataTier>,
    pub tier_chain: Vec<ProviderId>,
    pub provisional: bool,
    pub confidence: Confidence,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<EnvelopeError>,
    pub latency_ms: u64,
    pub cache_hit: bool,
}

impl<T> Assessment<T> {
    fn from_resolution(result: T, resolution: Resolution, confidence: Confidence) -> Self {
        let provisional = resolution.is_provisional();
        Self {
            result,
            provenance: Some(resolution.provenance),
            tier: Some(resolution.tier()),
            tier_chain: resolution.tier_chain,
            provisional,
            confidence: if provisional {
                Confidence::Low
            } else {
                confidence
            },
            warnings: resolution.warnings,
            errors: resolution.errors,
            latency_ms: resolution.latency_ms,
            cache_hit: false,
        }
    }

    /// Folds the lineage of an input metric into this one.
    fn absorb<U>(&mut self, label: &str, input: &Assessment<U>) {
        for provider in &input.tier_chain {
            if !self.tier_chain.contains(provider) {
                self.tier_chain.push(*provider);
            }
        }
        if input.tier > self.tier {
            self.tier = input.tier;
            self.provenance = input.provenance;
        }
        self.provisional |= input.provisional;
        self.confidence = self.confidence.min(input.confidence);
        self.warnings.extend(
            input
                .warnings
                .iter()
                .map(|warning| format!("{label}: {warning}")),
        );
        self.errors.extend(input.errors.iter().cloned());
    }
}

/// Parameters of one NPV/IRR valuation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpvRequest {
    pub asset: Symbol,
    pub benchmark: Symbol,
    pub as_of: CalendarDate,
    pub investment: f64,
    pub horizon_years: u32,
    /// Overrides the price at the end of the measured history.
    #[serde(default)]
    pub current_price: Option<f64>,
    #[serde(default)]
    pub terminal_value: bool,
    /// Overrides the configured long-term growth rate for the terminal value.
    #[serde(default)]
    pub long_term_growth_rate: Option<f64>,
}

impl NpvRequest {
    pub fn new(
        asset: Symbol,
        benchmark: Symbol,
        as_of: CalendarDate,
        investment: f64,
        horizon_years: u32,
    ) -> Self {
        Self {
            asset,
            benchmark,
            as_of,
            investment,
            horizon_years,
            current_price: None,
            terminal_value: false,
            long_term_growth_rate: None,
        }
    }

    pub fn with_current_price(mut self, price: f64) -> Self {
        self.current_price = Some(price);
        self
    }

    pub fn with_terminal_value(mut self, long_term_growth_rate: Option<f64>) -> Self {
        self.terminal_value = true;
        self.long_term_growth_rate = long_term_growth_rate;
        self
    }

    fn validate(&self) -> Result<(), AnalyticsError> {
        if !self.investment.is_finite() || self.investment <= 0.0 {
            return Err(AnalyticsError::InvalidInput(String::from(
                "investment must be positive",
            )));
        }
        if self.horizon_years == 0 {
            return Err(AnalyticsError::InvalidInput(String::from(
                "horizon_years must be at least 1",
            )));
        }
        if self
            .current_price
            .is_some_and(|price| !price.is_finite() || price <= 0.0)
        {
            return Err(AnalyticsError::InvalidInput(String::from(
                "current_price must be positive",
            )));
        }
        if self
            .long_term_growth_rate
            .is_some_and(|growth| !growth.is_finite())
        {
            return Err(AnalyticsError::InvalidInput(String::from(
                "long_term_growth_rate must be finite",
            )));
        }
        Ok(())
    }

    fn cache_key(&self, terminal_growth: Option<f64>) -> String {
        let base = npv_key(
            &self.asset,
            &self.benchmark,
            self.as_of,
            self.investment,
            self.horizon_years,
        );
        let terminal = terminal_growth.map_or_else(|| String::from("none"), |g| g.to_string());
        let price = self
            .current_price
            .map_or_else(|| String::from("market"), |p| p.to_string());
        format!("{base}:tv={terminal}:price={price}")
    }
}

/// Where holding prices come from in [`AnalyticsEngine::risk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PriceMode {
    /// Use the price on each holding as given.
    #[default]
    Supplied,
    /// Refresh each symbol's price through the resolver; keep the supplied
    /// price when no data tier has one.
    Live,
}

pub struct AnalyticsEngine {
    resolver: Arc<DataSourceResolver>,
    cache: ResultCache,
    config: EngineConfig,
    aligner: SeriesAligner,
    beta_engine: BetaEngine,
}

impl AnalyticsEngine {
    pub fn new(resolver: Arc<DataSourceResolver>, cache: ResultCache, config: EngineConfig) -> Self {
        let selector =
            AdaptiveWindowSelector::new(config.volatility_thresholds, config.window_days);
        let beta_engine = BetaEngine::new(selector, config.liquidity_thresholds);
        Self {
            resolver,
            cache,
            config,
            aligner: SeriesAligner::default(),
            beta_engine,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn resolver(&self) -> &Arc<DataSourceResolver> {
        &self.resolver
    }

    #[instrument(skip_all, fields(asset = %asset, benchmark = %benchmark, as_of = %as_of, mode = %mode))]
    pub async fn beta(
        &self,
        asset: &Symbol,
        benchmark: &Symbol,
        as_of: CalendarDate,
        mode: CacheMode,
    ) -> Result<Assessment<BetaResult>, AnalyticsError> {
        let started = Instant::now();
        let plan = FetchPlan::paired(
            asset.clone(),
            benchmark.clone(),
            self.history_range(as_of)?,
            self.config.min_aligned_points,
        )
        .with_category_hint(self.config.category_of(asset));

        let lookup = self
            .cache
            .compute_if_absent(&beta_key(asset, benchmark, as_of), mode, || {
                self.measure_beta(&plan)
            })
            .await;
        Ok(finish("beta", lookup, started))
    }

    #[instrument(skip_all, fields(asset = %asset, as_of = %as_of, mode = %mode))]
    pub async fn cagr(
        &self,
        asset: &Symbol,
        as_of: CalendarDate,
        mode: CacheMode,
    ) -> Result<Assessment<CagrResult>, AnalyticsError> {
        let started = Instant::now();
        let plan = FetchPlan::single(
            asset.clone(),
            self.history_range(as_of)?,
            self.config.min_cagr_points,
        )
        .with_category_hint(self.config.category_of(asset));

        let lookup = self
            .cache
            .compute_if_absent(&cagr_key(asset, as_of), mode, || {
                self.measure_cagr(&plan, as_of)
            })
            .await;
        Ok(finish("cagr", lookup, started))
    }

    /// Values `request.investment` in the asset; beta and both growth rates
    /// are computed concurrently.
    #[instrument(
        skip_all,
        fields(asset = %request.asset, benchmark = %request.benchmark, as_of = %request.as_of, mode = %mode)
    )]
    pub async fn npv(
        &self,
        request: &NpvRequest,
        mode: CacheMode,
    ) -> Result<Assessment<NpvResult>, AnalyticsError> {
        let started = Instant::now();
        request.validate()?;
        let terminal_growth = request.terminal_value.then(|| {
            request
                .long_term_growth_rate
                .unwrap_or(self.config.long_term_growth_rate)
        });

        let lookup = self
            .cache
            .try_compute_if_absent(&request.cache_key(terminal_growth), mode, || {
                self.value(request, terminal_growth, mode)
            })
            .await?;
        Ok(finish("npv", lookup, started))
    }

    #[instrument(skip_all, fields(holdings = holdings.len(), price_mode = ?price_mode))]
    pub async fn risk(
        &self,
        holdings: &[Holding],
        price_mode: PriceMode,
    ) -> Result<Assessment<RiskAnalysis>, AnalyticsError> {
        let started = Instant::now();
        let analyzer = RiskAllocationAnalyzer::new(self.config.allocation_policy.clone());

        let mut assessment = match price_mode {
            PriceMode::Supplied => {
                let result = analyzer.analyze(holdings)?;
                Assessment {
                    result,
                    provenance: None,
                    tier: None,
                    tier_chain: Vec::new(),
                    provisional: false,
                    confidence: Confidence::Medium,
                    warnings: Vec::new(),
                    errors: Vec::new(),
                    latency_ms: 0,
                    cache_hit: false,
                }
            }
            PriceMode::Live => {
                let refresh = self.refresh_prices(holdings).await?;
                let result = analyzer.analyze(&refresh.holdings)?;
                let confidence = if refresh.kept_supplied == 0 {
                    Confidence::High
                } else {
                    Confidence::Medium
                };
                Assessment {
                    result,
                    provenance: refresh.provenance,
                    tier: refresh.provenance.map(ProviderId::tier),
                    tier_chain: refresh.tier_chain,
                    provisional: false,
                    confidence,
                    warnings: refresh.warnings,
                    errors: refresh.errors,
                    latency_ms: 0,
                    cache_hit: false,
                }
            }
        };

        assessment.latency_ms = elapsed_ms(started);
        info!(
            total_value = assessment.result.total_value,
            confidence = assessment.confidence.as_str(),
            "risk analysis complete"
        );
        Ok(assessment)
    }

    fn history_range(&self, as_of: CalendarDate) -> Result<DateRange, AnalyticsError> {
        Ok(DateRange::trailing(as_of, self.config.lookback_days)?)
    }

    async fn measure_beta(&self, plan: &FetchPlan) -> Assessment<BetaResult> {
        // A tier whose two series barely overlap counts as short of data, so
        // the next tier gets a chance before the sector estimate.
        let required = self.config.min_aligned_points;
        let aligner = self.aligner;
        let resolution = self
            .resolver
            .resolve_with(plan, |fetched| {
                let aligned = fetched
                    .benchmark
                    .as_ref()
                    .map_or(0, |benchmark| aligner.align(&fetched.asset, benchmark).len());
                if aligned < required {
                    Err(SourceError::insufficient_data(required, aligned))
                } else {
                    Ok(())
                }
            })
            .await;
        let benchmark = plan
            .benchmark
            .clone()
            .unwrap_or_else(|| plan.asset.clone());

        let fetched = match &resolution.outcome {
            ResolvedData::Synthetic(estimate) => {
                let result = BetaResult::provisional(estimate.beta, benchmark);
                return Assessment::from_resolution(result, resolution, Confidence::Low);
            }
            ResolvedData::Series(fetched) => fetched,
        };

        let Some(benchmark_series) = fetched.benchmark.as_ref() else {
            let error = AnalyticsError::InsufficientData {
                required: self.config.min_aligned_points,
                available: 0,
            };
            return self.sector_fallback(resolution, plan, &error, |estimate| {
                BetaResult::provisional(estimate.beta, benchmark)
            });
        };

        let alignment = self.aligner.align(&fetched.asset, benchmark_series);
        let gap_warnings = alignment
            .gaps
            .iter()
            .map(|gap| gap.describe())
            .collect::<Vec<_>>();
        for gap in &alignment.gaps {
            warn!(
                symbol = %plan.asset,
                start = %gap.start,
                end = %gap.end,
                missing_days = gap.missing_days,
                "benchmark data gap"
            );
        }

        let measured = if alignment.len() < self.config.min_aligned_points {
            Err(AnalyticsError::InsufficientData {
                required: self.config.min_aligned_points,
                available: alignment.len(),
            })
        } else {
            self.beta_engine
                .compute(benchmark.clone(), &alignment.observations)
        };

        let mut assessment = match measured {
            Ok(result) => {
                let confidence = result.confidence;
                Assessment::from_resolution(result, resolution, confidence)
            }
            Err(error) => self.sector_fallback(resolution, plan, &error, |estimate| {
                BetaResult::provisional(estimate.beta, benchmark)
            }),
        };
        assessment.warnings.extend(gap_warnings);
        assessment
    }

    async fn measure_cagr(&self, plan: &FetchPlan, as_of: CalendarDate) -> Assessment<CagrResult> {
        let resolution = self.resolver.resolve(plan).await;

        let fetched = match &resolution.outcome {
            ResolvedData::Synthetic(estimate) => {
                let result = CagrResult::provisional(estimate.cagr, as_of);
                return Assessment::from_resolution(result, resolution, Confidence::Low);
            }
            ResolvedData::Series(fetched) => fetched,
        };

        match CagrCalculator.compute(&fetched.asset.points) {
            Ok(result) if result.cagr.is_finite() => {
                let confidence = if result.is_valid {
                    Confidence::High
                } else {
                    Confidence::Medium
                };
                Assessment::from_resolution(result, resolution, confidence)
            }
            Ok(result) => {
                let error = AnalyticsError::InvalidPeriod {
                    reason: format!(
                        "growth over {} day(s) is not a finite rate",
                        result.total_days
                    ),
                };
                self.sector_fallback(resolution, plan, &error, |estimate| {
                    CagrResult::provisional(estimate.cagr, as_of)
                })
            }
            Err(error) => self.sector_fallback(resolution, plan, &error, |estimate| {
                CagrResult::provisional(estimate.cagr, as_of)
            }),
        }
    }

    async fn value(
        &self,
        request: &NpvRequest,
        terminal_growth: Option<f64>,
        mode: CacheMode,
    ) -> Result<Assessment<NpvResult>, AnalyticsError> {
        let (beta, asset_growth, benchmark_growth) = tokio::join!(
            self.beta(&request.asset, &request.benchmark, request.as_of, mode),
            self.cagr(&request.asset, request.as_of, mode),
            self.cagr(&request.benchmark, request.as_of, mode),
        );
        let (beta, asset_growth, benchmark_growth) = (beta?, asset_growth?, benchmark_growth?);

        let result = NpvIrrEngine.compute(&NpvInputs {
            current_price: request
                .current_price
                .unwrap_or(asset_growth.result.ending_price),
            cagr: asset_growth.result.cagr,
            beta: beta.result.beta,
            benchmark_cagr: benchmark_growth.result.cagr,
            risk_free_rate: self.config.risk_free_rate,
            investment: request.investment,
            horizon_years: request.horizon_years,
            long_term_growth_rate: terminal_growth,
        })?;

        let confidence = result.confidence;
        let mut assessment = Assessment {
            result,
            provenance: None,
            tier: None,
            tier_chain: Vec::new(),
            provisional: false,
            confidence,
            warnings: Vec::new(),
            errors: Vec::new(),
            latency_ms: 0,
            cache_hit: false,
        };
        assessment.absorb("beta", &beta);
        assessment.absorb(&format!("cagr {}", request.asset), &asset_growth);
        assessment.absorb(&format!("cagr {}", request.benchmark), &benchmark_growth);
        if asset_growth.provisional && request.current_price.is_none() {
            assessment.warnings.push(format!(
                "no measured price for {}; projected_prices are index levels starting at {:.4}, pass current_price for price units",
                request.asset, asset_growth.result.ending_price
            ));
        }
        Ok(assessment)
    }

    /// Replaces a statistical failure with the sector estimate for `plan.asset`.
    fn sector_fallback<T>(
        &self,
        mut resolution: Resolution,
        plan: &FetchPlan,
        error: &AnalyticsError,
        provisional: impl FnOnce(SectorEstimate) -> T,
    ) -> Assessment<T> {
        warn!(
            tier = %DataTier::Synthetic,
            provider = %ProviderId::Sector,
            symbol = %plan.asset,
            reason = %error,
            "computation failed; using sector estimate"
        );

        let failed = resolution.provenance;
        resolution
            .errors
            .push(EnvelopeError::computation(error.code(), error.to_string(), failed));
        resolution
            .warnings
            .push(format!("{error}; using sector estimate"));
        resolution.tier_chain.push(ProviderId::Sector);

        let estimate = self
            .resolver
            .sector_estimate(&plan.asset, plan.category_hint);
        Assessment {
            result: provisional(estimate),
            provenance: Some(ProviderId::Sector),
            tier: Some(DataTier::Synthetic),
            tier_chain: resolution.tier_chain,
            provisional: true,
            confidence: Confidence::Low,
            warnings: resolution.warnings,
            errors: resolution.errors,
            latency_ms: resolution.latency_ms,
            cache_hit: false,
        }
    }

    /// Latest price per distinct symbol, resolved concurrently.
    async fn refresh_prices(&self, holdings: &[Holding]) -> Result<PriceRefresh, AnalyticsError> {
        let range = DateRange::trailing(CalendarDate::today(), LIVE_PRICE_LOOKBACK_DAYS)?;
        let symbols = holdings
            .iter()
            .map(|holding| holding.symbol.clone())
            .collect::<BTreeSet<_>>();

        let mut tasks = JoinSet::new();
        for symbol in symbols {
            let resolver = Arc::clone(&self.resolver);
            tasks.spawn(async move {
                let resolution = resolver.resolve(&FetchPlan::single(symbol.clone(), range, 1)).await;
                (symbol, resolution)
            });
        }

        let mut prices = BTreeMap::new();
        let mut refresh = PriceRefresh::default();
        while let Some(joined) = tasks.join_next().await {
            let (symbol, resolution) = match joined {
                Ok(pair) => pair,
                Err(error) => {
                    refresh.warnings.push(format!("price refresh task failed: {error}"));
                    continue;
                }
            };

            for provider in &resolution.tier_chain {
                if !refresh.tier_chain.contains(provider) {
                    refresh.tier_chain.push(*provider);
                }
            }
            refresh.errors.extend(resolution.errors);

            let latest = match &resolution.outcome {
                ResolvedData::Series(fetched) => fetched.asset.latest().map(|point| point.price),
                ResolvedData::Synthetic(_) => None,
            };
            match latest {
                Some(price) => {
                    debug!(symbol = %symbol, provider = %resolution.provenance, price, "price refreshed");
                    let weaker = refresh
                        .provenance
                        .map_or(true, |current| resolution.provenance.tier() > current.tier());
                    if weaker {
                        refresh.provenance = Some(resolution.provenance);
                    }
                    prices.insert(symbol, price);
                }
                None => {
                    refresh
                        .warnings
                        .push(format!("no live price for {symbol}; keeping supplied price"));
                }
            }
        }

        refresh.tier_chain.sort_by_key(|provider| provider.tier());
        refresh.warnings.sort();
        let mut kept_supplied = 0;
        refresh.holdings = holdings
            .iter()
            .map(|holding| match prices.get(&holding.symbol) {
                Some(price) => Holding {
                    price: *price,
                    ..holding.clone()
                },
                None => {
                    kept_supplied += 1;
                    holding.clone()
                }
            })
            .collect();
        refresh.kept_supplied = kept_supplied;
        Ok(refresh)
    }
}

#[derive(Default)]
struct PriceRefresh {
    holdings: Vec<Holding>,
    provenance: Option<ProviderId>,
    tier_chain: Vec<ProviderId>,
    warnings: Vec<String>,
    errors: Vec<EnvelopeError>,
    kept_supplied: usize,
}

fn finish<T>(metric: &str, lookup: CacheLookup<Assessment<T>>, started: Instant) -> Assessment<T> {
    let mut assessment = lookup.value;
    assessment.cache_hit = lookup.cache_hit;
    assessment.latency_ms = elapsed_ms(started);
    info!(
        metric,
        provenance = ?assessment.provenance,
        confidence = assessment.confidence.as_str(),
        provisional = assessment.provisional,
        cache_hit = assessment.cache_hit,
        "assessment ready"
    );
    assessment
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}
