use paperfolio_analytics::{AnalyticsEngine, NpvRequest};
use paperfolio_core::{CacheMode, EngineConfig};

use crate::cli::NpvArgs;
use crate::error::CliError;

use super::{parse_as_of, parse_benchmark, parse_symbol, CommandResult};

pub async fn run(
    args: &NpvArgs,
    engine: &AnalyticsEngine,
    mode: CacheMode,
) -> Result<CommandResult, CliError> {
    let request = build_request(args, engine.config())?;
    let assessment = engine.npv(&request, mode).await?;
    CommandResult::from_assessment(assessment)
}

fn build_request(args: &NpvArgs, config: &EngineConfig) -> Result<NpvRequest, CliError> {
    let mut request = NpvRequest::new(
        parse_symbol(&args.asset)?,
        parse_benchmark(args.benchmark.as_deref(), config)?,
        parse_as_of(args.as_of.as_deref())?,
        args.investment,
        args.horizon,
    );
    if let Some(price) = args.price {
        request = request.with_current_price(price);
    }
    if args.terminal_value {
        request = request.with_terminal_value(args.growth);
    }
    Ok(request)
}
