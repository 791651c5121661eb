//! Core contracts for paperfolio.
//!
//! This crate contains:
//! - Domain models and validation
//! - Provider and tier identifiers
//! - The market data gateway contract and its adapters
//! - The tiered data source resolver and the result cache
//! - Engine configuration and the response envelope

pub mod adapters;
pub mod cache;
pub mod circuit_breaker;
pub mod data_source;
pub mod domain;
pub mod envelope;
pub mod error;
pub mod http_client;
pub mod resolver;
pub mod settings;
pub mod source;
pub mod throttling;

pub use adapters::{
    CoinGeckoAdapter, SectorCategory, SectorEstimate, SectorEstimates, WarehouseAdapter,
};
pub use cache::{CacheBackend, CacheLookup, CacheMode, CacheStore, ResultCache, WarehouseCache};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use data_source::{
    HealthState, HealthStatus, MarketDataGateway, SeriesRequest, SourceError, SourceErrorKind,
};
pub use domain::{
    validate_non_negative, validate_positive, CalendarDate, Confidence, DateRange, Holding,
    PricePoint, PriceSeries, Symbol,
};
pub use envelope::{Envelope, EnvelopeError, EnvelopeMeta, Lineage};
pub use error::ValidationError;
pub use http_client::{
    ApiKey, HttpClient, HttpError, HttpRequest, HttpResponse, OfflineHttpClient, ReqwestHttpClient,
};
pub use paperfolio_warehouse::{
    PriceRecord, SymbolCoverage, Warehouse, WarehouseConfig, WarehouseError,
};
pub use resolver::{
    DataSourceResolver, DataSourceResolverBuilder, FetchPlan, FetchedSeries, Resolution,
    ResolvedData, TierSnapshot,
};
pub use settings::{
    AllocationPolicy, AllocationTier, ConfigError, EngineConfig, LiquidityThresholds,
    VolatilityThresholds, WindowPolicy,
};
pub use source::{DataTier, ProviderId};
pub use throttling::RateBudget;
