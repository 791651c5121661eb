use paperfolio_analytics::AnalyticsEngine;
use paperfolio_core::CacheMode;

use crate::cli::BetaArgs;
use crate::error::CliError;

use super::{parse_as_of, parse_benchmark, parse_symbol, CommandResult};

pub async fn run(
    args: &BetaArgs,
    engine: &AnalyticsEngine,
    mode: CacheMode,
) -> Result<CommandResult, CliError> {
    let asset = parse_symbol(&args.asset)?;
    let benchmark = parse_benchmark(args.benchmark.as_deref(), engine.config())?;
    let as_of = parse_as_of(args.as_of.as_deref())?;

    let assessment = engine.beta(&asset, &benchmark, as_of, mode).await?;
    CommandResult::from_assessment(assessment)
}
