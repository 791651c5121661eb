use std::fs;
use std::path::Path;

use paperfolio_analytics::{AnalyticsEngine, PriceMode};
use paperfolio_core::Holding;

use crate::cli::RiskArgs;
use crate::error::CliError;

use super::CommandResult;

pub async fn run(args: &RiskArgs, engine: &AnalyticsEngine) -> Result<CommandResult, CliError> {
    let holdings = read_holdings(&args.holdings)?;
    let price_mode = if args.live_prices {
        PriceMode::Live
    } else {
        PriceMode::Supplied
    };

    let assessment = engine.risk(&holdings, price_mode).await?;
    CommandResult::from_assessment(assessment)
}

/// Holdings file: a JSON array of `{symbol, amount, price, category}` objects.
fn read_holdings(path: &Path) -> Result<Vec<Holding>, CliError> {
    let body = fs::read_to_string(path)?;
    let holdings = serde_json::from_str::<Vec<Holding>>(&body)?;
    Ok(holdings)
}
