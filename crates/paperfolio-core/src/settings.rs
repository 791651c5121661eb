//! Engine configuration.
//!
//! Values come from built-in defaults, then an optional TOML file, then
//! `PAPERFOLIO_*` environment variables (nested keys use `__`, for example
//! `PAPERFOLIO_VOLATILITY_THRESHOLDS__HIGH=0.06`).

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{SectorCategory, Symbol};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Trailing-volatility cut-offs for window selection (daily log-return stdev).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolatilityThresholds {
    pub high: f64,
    pub low: f64,
    /// Above this the series is treated as garbage data.
    pub extreme: f64,
}

impl Default for VolatilityThresholds {
    fn default() -> Self {
        Self {
            high: 0.05,
            low: 0.015,
            extreme: 2.0,
        }
    }
}

/// Lookback lengths (in return observations) picked by volatility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowPolicy {
    pub high_volatility_days: usize,
    pub normal_days: usize,
    pub low_volatility_days: usize,
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self {
            high_volatility_days: 90,
            normal_days: 180,
            low_volatility_days: 360,
        }
    }
}

/// Median daily volume bounds and the beta multipliers applied outside them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiquidityThresholds {
    pub low: f64,
    pub high: f64,
    pub illiquid_factor: f64,
    pub liquid_factor: f64,
}

impl Default for LiquidityThresholds {
    fn default() -> Self {
        Self {
            low: 1e7,
            high: 1e9,
            illiquid_factor: 1.2,
            liquid_factor: 0.9,
        }
    }
}

/// Target BTC share for portfolios up to `max_total_value` (open-ended when `None`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AllocationTier {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_total_value: Option<f64>,
    pub target_btc_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationPolicy {
    pub tiers: Vec<AllocationTier>,
}

impl Default for AllocationPolicy {
    fn default() -> Self {
        Self {
            tiers: vec![
                AllocationTier {
                    max_total_value: Some(20_000.0),
                    target_btc_pct: 50.0,
                },
                AllocationTier {
                    max_total_value: Some(100_000.0),
                    target_btc_pct: 70.0,
                },
                AllocationTier {
                    max_total_value: None,
                    target_btc_pct: 85.0,
                },
            ],
        }
    }
}

impl AllocationPolicy {
    /// Target BTC percentage for a portfolio worth `total_value`.
    pub fn target_for(&self, total_value: f64) -> f64 {
        self.tiers
            .iter()
            .find(|tier| tier.max_total_value.map_or(true, |max| total_value <= max))
            .or_else(|| self.tiers.last())
            .map_or(0.0, |tier| tier.target_btc_pct)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.tiers.is_empty() {
            return invalid("allocation_policy.tiers must not be empty");
        }

        let mut previous = f64::NEG_INFINITY;
        for (index, tier) in self.tiers.iter().enumerate() {
            if !(0.0..=100.0).contains(&tier.target_btc_pct) {
                return invalid(format!(
                    "allocation_policy.tiers[{index}].target_btc_pct must be within 0..=100"
                ));
            }
            match tier.max_total_value {
                Some(max) if !max.is_finite() || max <= previous => {
                    return invalid(format!(
                        "allocation_policy.tiers[{index}].max_total_value must be finite and increasing"
                    ));
                }
                Some(max) => previous = max,
                None if index + 1 != self.tiers.len() => {
                    return invalid("only the last allocation tier may be open-ended");
                }
                None => {}
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub cache_ttl_seconds: u64,
    pub min_aligned_points: usize,
    pub min_cagr_points: usize,
    pub risk_free_rate: f64,
    pub long_term_growth_rate: f64,
    pub volatility_thresholds: VolatilityThresholds,
    pub window_days: WindowPolicy,
    pub liquidity_thresholds: LiquidityThresholds,
    pub allocation_policy: AllocationPolicy,
    pub fetch_timeout_ms: u64,
    pub lookback_days: u32,
    pub default_benchmark: String,
    /// Sector for unlisted tickers that fall back to the synthetic tier,
    /// e.g. `PEPE = "meme"`.
    pub asset_categories: BTreeMap<String, SectorCategory>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: 21_600,
            min_aligned_points: 180,
            min_cagr_points: 2,
            risk_free_rate: 0.045,
            long_term_growth_rate: 0.03,
            volatility_thresholds: VolatilityThresholds::default(),
            window_days: WindowPolicy::default(),
            liquidity_thresholds: LiquidityThresholds::default(),
            allocation_policy: AllocationPolicy::default(),
            fetch_timeout_ms: 10_000,
            lookback_days: 730,
            default_benchmark: String::from("BTC"),
            asset_categories: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    /// Defaults, then `path` when given and present, then `PAPERFOLIO_*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_environment(path, environment())
    }

    pub fn load_with_environment(
        path: Option<&Path>,
        environment: ::config::Environment,
    ) -> Result<Self, ConfigError> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(false));
        }

        let config = builder
            .add_source(environment)
            .build()?
            .try_deserialize::<Self>()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_aligned_points < 2 {
            return invalid("min_aligned_points must be at least 2");
        }
        if self.min_cagr_points < 2 {
            return invalid("min_cagr_points must be at least 2");
        }
        if !self.risk_free_rate.is_finite() || self.risk_free_rate <= -1.0 {
            return invalid("risk_free_rate must be finite and greater than -1");
        }
        if !self.long_term_growth_rate.is_finite() {
            return invalid("long_term_growth_rate must be finite");
        }

        let volatility = self.volatility_thresholds;
        if !(volatility.low > 0.0 && volatility.low < volatility.high && volatility.high < volatility.extreme)
        {
            return invalid("volatility_thresholds must satisfy 0 < low < high < extreme");
        }

        let windows = self.window_days;
        if !(2 <= windows.high_volatility_days
            && windows.high_volatility_days <= windows.normal_days
            && windows.normal_days <= windows.low_volatility_days)
        {
            return invalid("window_days must satisfy 2 <= high_volatility <= normal <= low_volatility");
        }

        let liquidity = self.liquidity_thresholds;
        if !(liquidity.low >= 0.0 && liquidity.low < liquidity.high && liquidity.high.is_finite()) {
            return invalid("liquidity_thresholds must satisfy 0 <= low < high");
        }
        if !(liquidity.illiquid_factor > 0.0 && liquidity.liquid_factor > 0.0) {
            return invalid("liquidity factors must be positive");
        }

        if self.fetch_timeout_ms == 0 {
            return invalid("fetch_timeout_ms must be positive");
        }
        if self.lookback_days == 0 {
            return invalid("lookback_days must be positive");
        }
        if Symbol::parse(&self.default_benchmark).is_err() {
            return invalid(format!(
                "default_benchmark '{}' is not a valid symbol",
                self.default_benchmark
            ));
        }

        if let Some(ticker) = self
            .asset_categories
            .keys()
            .find(|ticker| Symbol::parse(ticker).is_err())
        {
            return invalid(format!("asset_categories key '{ticker}' is not a valid symbol"));
        }

        self.allocation_policy.validate()
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// Configured sector for `symbol`; keys match case-insensitively.
    pub fn category_of(&self, symbol: &Symbol) -> Option<SectorCategory> {
        self.asset_categories
            .iter()
            .find(|(ticker, _)| ticker.trim().eq_ignore_ascii_case(symbol.as_str()))
            .map(|(_, category)| *category)
    }

    pub fn default_benchmark(&self) -> Result<Symbol, ConfigError> {
        Symbol::parse(&self.default_benchmark)
            .map_err(|error| ConfigError::Invalid(error.to_string()))
    }
}

fn environment() -> ::config::Environment {
    ::config::Environment::with_prefix("PAPERFOLIO")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn invalid<T>(message: impl Into<String>) -> Result<T, ConfigError> {
    Err(ConfigError::Invalid(message.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env_from(pairs: &[(&str, &str)]) -> ::config::Environment {
        let map = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect::<HashMap<_, _>>();
        environment().source(Some(map))
    }

    #[test]
    fn defaults_match_documented_options() {
        let config = EngineConfig::default();

        assert_eq!(config.cache_ttl_seconds, 21_600);
        assert_eq!(config.min_aligned_points, 180);
        assert_eq!(config.risk_free_rate, 0.045);
        assert_eq!(config.long_term_growth_rate, 0.03);
        assert_eq!(config.volatility_thresholds.high, 0.05);
        assert_eq!(config.liquidity_thresholds.high, 1e9);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = EngineConfig::load_with_environment(
            Some(&dir.path().join("absent.toml")),
            env_from(&[]),
        )
        .expect("defaults load");

        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn file_then_environment_override_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("paperfolio.toml");
        let mut file = std::fs::File::create(&path).expect("create config");
        writeln!(
            file,
            "risk_free_rate = 0.05\nmin_aligned_points = 120\n\n[volatility_thresholds]\nhigh = 0.06"
        )
        .expect("write config");

        let config = EngineConfig::load_with_environment(
            Some(&path),
            env_from(&[("PAPERFOLIO_MIN_ALIGNED_POINTS", "200")]),
        )
        .expect("config loads");

        assert_eq!(config.risk_free_rate, 0.05);
        assert_eq!(config.min_aligned_points, 200);
        assert_eq!(config.volatility_thresholds.high, 0.06);
        assert_eq!(config.volatility_thresholds.low, 0.015);
    }

    #[test]
    fn asset_categories_match_any_case() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("paperfolio.toml");
        std::fs::write(&path, "[asset_categories]\npepe = \"meme\"\nUNI = \"defi\"\n")
            .expect("write config");

        let config = EngineConfig::load_with_environment(Some(&path), env_from(&[]))
            .expect("config loads");

        let pepe = Symbol::parse("PEPE").expect("valid");
        let uni = Symbol::parse("uni").expect("valid");
        assert_eq!(config.category_of(&pepe), Some(SectorCategory::Meme));
        assert_eq!(config.category_of(&uni), Some(SectorCategory::Defi));
        assert_eq!(config.category_of(&Symbol::parse("BTC").expect("valid")), None);
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let config = EngineConfig {
            volatility_thresholds: VolatilityThresholds {
                high: 0.01,
                low: 0.02,
                extreme: 2.0,
            },
            ..EngineConfig::default()
        };

        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn allocation_tiers_pick_first_matching_bound() {
        let policy = AllocationPolicy::default();

        assert_eq!(policy.target_for(20_000.0), 50.0);
        assert_eq!(policy.target_for(50_000.0), 70.0);
        assert_eq!(policy.target_for(250_000.0), 85.0);
    }

    #[test]
    fn open_ended_tier_must_be_last() {
        let policy = AllocationPolicy {
            tiers: vec![
                AllocationTier {
                    max_total_value: None,
                    target_btc_pct: 50.0,
                },
                AllocationTier {
                    max_total_value: Some(1.0),
                    target_btc_pct: 60.0,
                },
            ],
        };

        assert!(policy.validate().is_err());
    }
}
