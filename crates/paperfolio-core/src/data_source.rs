//! Market data gateway contract.
//!
//! Every tier in the fallback chain implements [`MarketDataGateway`]: the live
//! HTTP provider, the DuckDB-backed history reader and any test double. A
//! gateway makes exactly one attempt per call and reports failures as a typed
//! [`SourceError`]; moving on to the next tier is the resolver's job.

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::circuit_breaker::CircuitState;
use crate::{DataTier, DateRange, PriceSeries, ProviderId, Symbol};

/// Health state used by tier skipping and the `sources` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Runtime gateway health snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub state: HealthState,
    pub rate_available: bool,
}

impl HealthStatus {
    pub const fn new(state: HealthState, rate_available: bool) -> Self {
        Self {
            state,
            rate_available,
        }
    }

    pub const fn healthy() -> Self {
        Self::new(HealthState::Healthy, true)
    }

    pub fn is_usable(self) -> bool {
        self.state != HealthState::Unhealthy && self.rate_available
    }
}

/// Gateway-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceErrorKind {
    Unavailable,
    Timeout,
    RateLimited,
    InsufficientData,
    Internal,
}

/// Structured failure returned by a single tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
}

impl SourceError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::with_kind(SourceErrorKind::Unavailable, message)
    }

    pub fn timeout(timeout_ms: u64) -> Self {
        Self::with_kind(
            SourceErrorKind::Timeout,
            format!("fetch did not complete within {timeout_ms}ms"),
        )
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::with_kind(SourceErrorKind::RateLimited, message)
    }

    pub fn insufficient_data(required: usize, available: usize) -> Self {
        Self::with_kind(
            SourceErrorKind::InsufficientData,
            format!("{available} daily point(s) available, {required} required"),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_kind(SourceErrorKind::Internal, message)
    }

    fn with_kind(kind: SourceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether a later run may succeed; surfaced on envelope errors.
    pub const fn retryable(&self) -> bool {
        matches!(
            self.kind,
            SourceErrorKind::Unavailable | SourceErrorKind::Timeout | SourceErrorKind::RateLimited
        )
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::Unavailable => "source.unavailable",
            SourceErrorKind::Timeout => "source.timeout",
            SourceErrorKind::RateLimited => "source.rate_limited",
            SourceErrorKind::InsufficientData => "source.insufficient_data",
            SourceErrorKind::Internal => "source.internal",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

/// Request for one symbol's daily history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesRequest {
    pub symbol: Symbol,
    pub range: DateRange,
}

impl SeriesRequest {
    pub fn new(symbol: Symbol, range: DateRange) -> Self {
        Self { symbol, range }
    }
}

pub type GatewayFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

/// Source of daily price/volume series for a single tier.
pub trait MarketDataGateway: Send + Sync {
    fn id(&self) -> ProviderId;

    fn tier(&self) -> DataTier {
        self.id().tier()
    }

    /// Fetch the daily series for `req.symbol` within `req.range`.
    ///
    /// An empty payload is a failure (`InsufficientData`), never an empty `Ok`.
    fn fetch_series<'a>(&'a self, req: SeriesRequest) -> GatewayFuture<'a, PriceSeries>;

    fn health<'a>(&'a self) -> Pin<Box<dyn Future<Output = HealthStatus> + Send + 'a>>;

    /// Circuit state for gateways guarded by a breaker.
    fn circuit_state(&self) -> Option<CircuitState> {
        None
    }
}
