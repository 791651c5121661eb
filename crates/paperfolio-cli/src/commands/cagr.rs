use paperfolio_analytics::AnalyticsEngine;
use paperfolio_core::CacheMode;

use crate::cli::CagrArgs;
use crate::error::CliError;

use super::{parse_as_of, parse_symbol, CommandResult};

pub async fn run(
    args: &CagrArgs,
    engine: &AnalyticsEngine,
    mode: CacheMode,
) -> Result<CommandResult, CliError> {
    let asset = parse_symbol(&args.asset)?;
    let as_of = parse_as_of(args.as_of.as_deref())?;

    let assessment = engine.cagr(&asset, as_of, mode).await?;
    CommandResult::from_assessment(assessment)
}
