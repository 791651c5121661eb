//! CLI argument definitions for paperfolio.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `beta` | CAPM beta of an asset against a benchmark |
//! | `cagr` | Compound annual growth rate over the lookback |
//! | `npv` | NPV/IRR of holding an asset for whole years |
//! | `risk` | BTC allocation and concentration of a holdings snapshot |
//! | `sources` | Data tiers with health and circuit state |
//! | `history` | Seed or inspect the persisted price history |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--format` | `json` | Output format (json, ndjson, table) |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--strict` | `false` | Treat warnings and errors as failures |
//! | `--config` | none | TOML engine configuration file |
//! | `--cache` | `use` | Result cache mode (use, refresh, bypass) |
//! | `--offline` | `false` | Skip the live provider |
//! | `--log-level` | `warn` | Log filter when `RUST_LOG` is unset |
//!
//! # Examples
//!
//! ```bash
//! paperfolio beta ETH --benchmark BTC --pretty
//! paperfolio npv SOL --investment 5000 --horizon 5 --terminal-value
//! paperfolio risk --holdings holdings.json --live-prices
//! paperfolio history import BTC btc.csv
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use paperfolio_core::CacheMode;

/// Paper-portfolio analytics: beta, CAGR, NPV/IRR and allocation risk.
#[derive(Debug, Parser)]
#[command(name = "paperfolio", author, version, about)]
pub struct Cli {
    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Treat warnings and errors as failures (exit code 5).
    #[arg(long, global = true, default_value_t = false)]
    pub strict: bool,

    /// Engine configuration file (TOML). `PAPERFOLIO_*` variables override it.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Result cache mode.
    #[arg(long = "cache", global = true, value_enum, default_value_t = CacheArg::Use)]
    pub cache: CacheArg,

    /// Do not call the live provider; start the fallback chain at the warehouse.
    #[arg(long, global = true, default_value_t = false)]
    pub offline: bool,

    /// Log filter used when `RUST_LOG` is not set (e.g. `info`, `paperfolio_core=debug`).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary.
    Table,
    /// Single JSON object.
    Json,
    /// One JSON object per line.
    Ndjson,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CacheArg {
    /// Serve fresh cached results, compute on miss.
    Use,
    /// Recompute and overwrite the cached result.
    Refresh,
    /// Neither read nor write the cache.
    Bypass,
}

impl From<CacheArg> for CacheMode {
    fn from(value: CacheArg) -> Self {
        match value {
            CacheArg::Use => Self::Use,
            CacheArg::Refresh => Self::Refresh,
            CacheArg::Bypass => Self::Bypass,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// CAPM beta of an asset against a benchmark.
    ///
    ///   paperfolio beta ETH
    ///   paperfolio beta SOL --benchmark ETH --as-of 2024-06-30
    Beta(BetaArgs),

    /// Compound annual growth rate over the configured lookback.
    ///
    ///   paperfolio cagr BTC
    Cagr(CagrArgs),

    /// NPV and IRR of holding an asset for a whole number of years.
    ///
    ///   paperfolio npv ETH --investment 10000 --horizon 5
    ///   paperfolio npv SOL --investment 5000 --horizon 3 --terminal-value --growth 0.02
    Npv(NpvArgs),

    /// BTC allocation, rebalance guidance and diversification of holdings.
    ///
    ///   paperfolio risk --holdings holdings.json
    ///   paperfolio risk --holdings holdings.json --live-prices
    Risk(RiskArgs),

    /// Data tiers in fallback order with their health.
    ///
    ///   paperfolio sources
    ///   paperfolio sources --provider coingecko
    Sources(SourcesArgs),

    /// Persisted price history.
    History(HistoryArgs),
}

#[derive(Debug, Args)]
pub struct BetaArgs {
    /// Asset symbol (e.g. ETH).
    pub asset: String,

    /// Benchmark symbol; defaults to the configured benchmark.
    #[arg(long)]
    pub benchmark: Option<String>,

    /// Last day of history to use (YYYY-MM-DD); defaults to today (UTC).
    #[arg(long)]
    pub as_of: Option<String>,
}

#[derive(Debug, Args)]
pub struct CagrArgs {
    pub asset: String,

    #[arg(long)]
    pub as_of: Option<String>,
}

#[derive(Debug, Args)]
pub struct NpvArgs {
    pub asset: String,

    #[arg(long)]
    pub benchmark: Option<String>,

    #[arg(long)]
    pub as_of: Option<String>,

    /// Amount invested today.
    #[arg(long)]
    pub investment: f64,

    /// Holding period in whole years.
    #[arg(long)]
    pub horizon: u32,

    /// Current price; defaults to the last price in the history.
    #[arg(long)]
    pub price: Option<f64>,

    /// Add a growing-perpetuity terminal value in the final year.
    #[arg(long, default_value_t = false)]
    pub terminal_value: bool,

    /// Long-term growth rate for the terminal value; defaults to configuration.
    #[arg(long, requires = "terminal_value")]
    pub growth: Option<f64>,
}

#[derive(Debug, Args)]
pub struct RiskArgs {
    /// JSON array of `{symbol, amount, price, category}` holdings.
    #[arg(long)]
    pub holdings: PathBuf,

    /// Refresh prices through the data tiers before analysing.
    #[arg(long, default_value_t = false)]
    pub live_prices: bool,
}

#[derive(Debug, Args)]
pub struct SourcesArgs {
    /// Only report this provider (coingecko, warehouse or sector).
    #[arg(long)]
    pub provider: Option<String>,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    #[command(subcommand)]
    pub command: HistoryCommand,
}

#[derive(Debug, Subcommand)]
pub enum HistoryCommand {
    /// Load `date,price[,volume]` rows from a CSV file into the warehouse.
    Import(HistoryImportArgs),

    /// Stored symbols with row counts and date bounds.
    Coverage,
}

#[derive(Debug, Args)]
pub struct HistoryImportArgs {
    pub symbol: String,

    pub file: PathBuf,

    /// Label recorded as the rows' source.
    #[arg(long, default_value = "csv")]
    pub source: String,
}
