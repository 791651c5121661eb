//! Gateways for each data tier.
//!
//! | Adapter | Tier | Backing |
//! |---------|------|---------|
//! | [`CoinGeckoAdapter`] | live | CoinGecko `market_chart/range` over HTTP |
//! | [`WarehouseAdapter`] | persisted | DuckDB `daily_prices` table |
//! | [`SectorEstimates`] | synthetic | Built-in per-asset and per-category table |

mod coingecko;
mod sector;
mod warehouse;

pub use coingecko::{coin_id, CoinGeckoAdapter};
pub use sector::{SectorCategory, SectorEstimate, SectorEstimates};
pub use warehouse::{price_record, series_to_records, WarehouseAdapter};
