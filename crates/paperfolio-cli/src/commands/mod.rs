mod beta;
mod cagr;
mod history;
mod npv;
mod risk;
mod sources;

use std::sync::Arc;

use paperfolio_analytics::{AnalyticsEngine, Assessment};
use paperfolio_core::{
    CacheMode, CalendarDate, DataSourceResolverBuilder, EngineConfig, Envelope, EnvelopeError,
    Lineage, ProviderId, ResultCache, Symbol, Warehouse, WarehouseAdapter, WarehouseError,
};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::cli::{Cli, Command};
use crate::error::CliError;
use crate::metadata::{envelope_meta, RequestId};

#[derive(Debug)]
pub struct CommandResult {
    pub data: Value,
    pub warnings: Vec<String>,
    pub errors: Vec<EnvelopeError>,
    pub latency_ms: u64,
    pub cache_hit: bool,
    pub source_chain: Vec<ProviderId>,
    pub lineage: Option<Lineage>,
}

impl CommandResult {
    pub fn ok(data: Value, source_chain: Vec<ProviderId>) -> Self {
        Self {
            data,
            warnings: Vec::new(),
            errors: Vec::new(),
            latency_ms: 0,
            cache_hit: false,
            source_chain,
            lineage: None,
        }
    }

    /// Envelope data is the whole assessment; its lineage fills the metadata.
    pub fn from_assessment<T: Serialize>(assessment: Assessment<T>) -> Result<Self, CliError> {
        let data = serde_json::to_value(&assessment)?;
        let Assessment {
            provenance,
            tier_chain,
            provisional,
            confidence,
            warnings,
            errors,
            latency_ms,
            cache_hit,
            ..
        } = assessment;

        let mut result = Self::ok(data, tier_chain);
        result.lineage = Some(Lineage {
            provenance,
            confidence,
            provisional,
        });
        Ok(result
            .with_warnings(warnings)
            .with_errors(errors)
            .with_latency(latency_ms)
            .with_cache_hit(cache_hit))
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    pub fn with_errors(mut self, errors: Vec<EnvelopeError>) -> Self {
        self.errors.extend(errors);
        self
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn with_cache_hit(mut self, cache_hit: bool) -> Self {
        self.cache_hit = cache_hit;
        self
    }
}

/// Engine wired for one invocation, plus any warnings raised while wiring it.
pub struct Runtime {
    pub engine: AnalyticsEngine,
    pub warnings: Vec<String>,
}

impl Runtime {
    fn build(cli: &Cli, config: EngineConfig) -> Self {
        Self::assemble(cli, config, Warehouse::open_default())
    }

    /// The warehouse backs both the persisted tier and the result cache.
    fn assemble(
        cli: &Cli,
        config: EngineConfig,
        warehouse: Result<Warehouse, WarehouseError>,
    ) -> Self {
        let mut warnings = Vec::new();
        let mut builder = DataSourceResolverBuilder::new().with_fetch_timeout(config.fetch_timeout());
        builder = if cli.offline {
            builder.with_offline_mode()
        } else {
            builder.with_real_clients()
        };

        let cache = match warehouse {
            Ok(warehouse) => {
                builder = builder.with_warehouse(WarehouseAdapter::new(warehouse.clone()));
                ResultCache::persistent(warehouse, config.cache_ttl())
            }
            Err(error) => {
                warn!(%error, "warehouse unavailable");
                warnings.push(format!(
                    "warehouse unavailable ({error}); persisted tier skipped and results cached for this run only"
                ));
                ResultCache::in_memory(config.cache_ttl())
            }
        };

        let engine = AnalyticsEngine::new(Arc::new(builder.build()), cache, config);
        Self { engine, warnings }
    }
}

pub async fn run(cli: &Cli) -> Result<Envelope<Value>, CliError> {
    let config = EngineConfig::load(cli.config.as_deref())?;
    let mode = CacheMode::from(cli.cache);

    let command_result = match &cli.command {
        Command::Beta(args) => {
            let runtime = Runtime::build(cli, config);
            beta::run(args, &runtime.engine, mode)
                .await?
                .with_warnings(runtime.warnings)
        }
        Command::Cagr(args) => {
            let runtime = Runtime::build(cli, config);
            cagr::run(args, &runtime.engine, mode)
                .await?
                .with_warnings(runtime.warnings)
        }
        Command::Npv(args) => {
            let runtime = Runtime::build(cli, config);
            npv::run(args, &runtime.engine, mode)
                .await?
                .with_warnings(runtime.warnings)
        }
        Command::Risk(args) => {
            let runtime = Runtime::build(cli, config);
            risk::run(args, &runtime.engine).await?.with_warnings(runtime.warnings)
        }
        Command::Sources(args) => {
            let runtime = Runtime::build(cli, config);
            sources::run(args, &runtime.engine)
                .await?
                .with_warnings(runtime.warnings)
        }
        Command::History(args) => history::run(args)?,
    };

    let CommandResult {
        data,
        warnings,
        errors,
        latency_ms,
        cache_hit,
        source_chain,
        lineage,
    } = command_result;

    let meta = envelope_meta(
        RequestId::new_v4(),
        source_chain,
        lineage,
        latency_ms,
        cache_hit,
        warnings,
    )?;
    Envelope::new(meta, data, errors).map_err(CliError::from)
}

fn parse_symbol(input: &str) -> Result<Symbol, CliError> {
    Symbol::parse(input).map_err(CliError::from)
}

/// Benchmark argument, or the configured default.
fn parse_benchmark(input: Option<&str>, config: &EngineConfig) -> Result<Symbol, CliError> {
    match input {
        Some(value) => parse_symbol(value),
        None => config.default_benchmark().map_err(CliError::from),
    }
}

/// `--as-of` argument, or today in UTC.
fn parse_as_of(input: Option<&str>) -> Result<CalendarDate, CliError> {
    match input {
        Some(value) => CalendarDate::parse(value).map_err(CliError::from),
        None => Ok(CalendarDate::today()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use paperfolio_core::{Confidence, DataTier, WarehouseConfig};
    use serde_json::json;

    #[test]
    fn assessment_lineage_moves_into_metadata_fields() {
        let assessment = Assessment {
            result: json!({ "beta": 1.2 }),
            provenance: Some(ProviderId::Sector),
            tier: Some(DataTier::Synthetic),
            tier_chain: vec![ProviderId::Coingecko, ProviderId::Warehouse, ProviderId::Sector],
            provisional: true,
            confidence: Confidence::Low,
            warnings: vec![String::from("all data tiers failed; using sector estimate")],
            errors: Vec::new(),
            latency_ms: 42,
            cache_hit: false,
        };

        let result = CommandResult::from_assessment(assessment).expect("serializable");

        assert_eq!(result.source_chain.len(), 3);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.latency_ms, 42);
        assert_eq!(
            result.lineage,
            Some(Lineage {
                provenance: Some(ProviderId::Sector),
                confidence: Confidence::Low,
                provisional: true,
            })
        );
        assert_eq!(result.data["provenance"], json!("sector"));
        assert_eq!(result.data["provisional"], json!(true));
        assert_eq!(result.data["result"]["beta"], json!(1.2));
    }

    #[test]
    fn missing_as_of_defaults_to_today() {
        assert_eq!(parse_as_of(None).expect("today"), CalendarDate::today());
        assert!(parse_as_of(Some("2024-02-30")).is_err());
    }

    #[test]
    fn benchmark_defaults_to_configuration() {
        let config = EngineConfig::default();
        let benchmark = parse_benchmark(None, &config).expect("configured benchmark");
        assert!(benchmark.is_bitcoin());
        assert_eq!(
            parse_benchmark(Some("eth"), &config).expect("symbol").as_str(),
            "ETH"
        );
    }

    #[tokio::test]
    async fn cached_results_carry_over_between_runs() {
        let home = tempfile::tempdir().expect("tempdir");
        let cli = Cli::parse_from(["paperfolio", "--offline", "cagr", "DOGE", "--as-of", "2024-06-30"]);
        let Command::Cagr(args) = &cli.command else {
            panic!("expected cagr command");
        };

        let first = {
            let warehouse = Warehouse::open(WarehouseConfig::in_home(home.path()));
            let runtime = Runtime::assemble(&cli, EngineConfig::default(), warehouse);
            cagr::run(args, &runtime.engine, CacheMode::Use).await.expect("first run")
        };
        let second = {
            let warehouse = Warehouse::open(WarehouseConfig::in_home(home.path()));
            let runtime = Runtime::assemble(&cli, EngineConfig::default(), warehouse);
            cagr::run(args, &runtime.engine, CacheMode::Use).await.expect("second run")
        };

        assert!(!first.cache_hit);
        assert!(second.cache_hit);
        assert_eq!(first.data["result"], second.data["result"]);
    }
}
