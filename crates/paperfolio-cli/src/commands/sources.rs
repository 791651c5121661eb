use paperfolio_analytics::AnalyticsEngine;
use paperfolio_core::{CircuitState, DataTier, HealthStatus, ProviderId, TierSnapshot};
use serde::Serialize;

use crate::cli::SourcesArgs;
use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct TierReport {
    id: ProviderId,
    tier: DataTier,
    status: &'static str,
    health: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    circuit: Option<CircuitState>,
}

impl From<TierSnapshot> for TierReport {
    fn from(snapshot: TierSnapshot) -> Self {
        Self {
            id: snapshot.id,
            tier: snapshot.tier,
            status: snapshot.status_label(),
            health: snapshot.health,
            circuit: snapshot.circuit,
        }
    }
}

#[derive(Debug, Serialize)]
struct SourcesResponseData {
    sources: Vec<TierReport>,
}

pub async fn run(args: &SourcesArgs, engine: &AnalyticsEngine) -> Result<CommandResult, CliError> {
    let only = args
        .provider
        .as_deref()
        .map(str::parse::<ProviderId>)
        .transpose()?;

    let resolver = engine.resolver();
    let sources = resolver
        .snapshots()
        .await
        .into_iter()
        .filter(|snapshot| only.map_or(true, |id| snapshot.id == id))
        .map(TierReport::from)
        .collect::<Vec<_>>();

    let mut result = CommandResult::ok(
        serde_json::to_value(SourcesResponseData { sources })?,
        resolver.tier_ids(),
    );
    if let Some(id) = only.filter(|id| !resolver.tier_ids().contains(id)) {
        result = result.with_warning(format!("provider '{id}' is not registered in this run"));
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use paperfolio_core::{DataSourceResolverBuilder, EngineConfig, ResultCache};
    use serde_json::json;

    use super::*;

    fn offline_engine() -> AnalyticsEngine {
        let resolver = DataSourceResolverBuilder::new().with_offline_mode().build();
        AnalyticsEngine::new(
            Arc::new(resolver),
            ResultCache::in_memory(Duration::from_secs(60)),
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn provider_filter_keeps_one_tier() {
        let args = SourcesArgs {
            provider: Some(String::from("Sector")),
        };

        let result = run(&args, &offline_engine()).await.expect("sources");

        assert_eq!(result.data["sources"].as_array().map(Vec::len), Some(1));
        assert_eq!(result.data["sources"][0]["tier"], json!("synthetic"));
        assert!(result.warnings.is_empty());
    }

    #[tokio::test]
    async fn unregistered_provider_is_reported() {
        let args = SourcesArgs {
            provider: Some(String::from("warehouse")),
        };

        let result = run(&args, &offline_engine()).await.expect("sources");

        assert_eq!(result.data["sources"], json!([]));
        assert_eq!(result.warnings.len(), 1);
    }

    #[tokio::test]
    async fn unknown_provider_is_invalid_input() {
        let args = SourcesArgs {
            provider: Some(String::from("yahoo")),
        };

        let error = run(&args, &offline_engine()).await.expect_err("unknown provider");
        assert_eq!(error.exit_code(), 2);
    }
}
