use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::data_source::{SourceError, SourceErrorKind};

/// Circuit state reported by the `sources` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive upstream faults that open the circuit.
    pub failure_threshold: u32,
    /// How long an open circuit rejects calls before one trial call is allowed.
    pub cool_down: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cool_down: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed { faults: u32 },
    Open { until: Instant },
    Probing,
}

/// Guards one live provider against hammering a failing upstream.
///
/// Only upstream faults count: rate limiting, bad requests and short payloads
/// say nothing about whether the provider is reachable.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    phase: Mutex<Phase>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            phase: Mutex::new(Phase::Closed { faults: 0 }),
        }
    }

    /// `Err(wait)` while open; an expired cool-down admits a single trial call.
    pub fn admit(&self) -> Result<(), Duration> {
        let mut phase = self.phase();
        if let Phase::Open { until } = *phase {
            let now = Instant::now();
            if now < until {
                return Err(until - now);
            }
            *phase = Phase::Probing;
        }
        Ok(())
    }

    /// Folds the outcome of an admitted call into the circuit.
    pub fn record<T>(&self, outcome: &Result<T, SourceError>) {
        match outcome {
            Ok(_) => self.record_success(),
            Err(error) if is_upstream_fault(error) => self.record_fault(),
            Err(_) => {}
        }
    }

    pub fn record_success(&self) {
        *self.phase() = Phase::Closed { faults: 0 };
    }

    pub fn record_fault(&self) {
        let mut phase = self.phase();
        let faults = match *phase {
            Phase::Closed { faults } => faults.saturating_add(1),
            Phase::Probing => self.config.failure_threshold,
            Phase::Open { .. } => return,
        };

        *phase = if faults >= self.config.failure_threshold {
            Phase::Open {
                until: Instant::now() + self.config.cool_down,
            }
        } else {
            Phase::Closed { faults }
        };
    }

    pub fn state(&self) -> CircuitState {
        match *self.phase() {
            Phase::Closed { .. } => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::Probing => CircuitState::HalfOpen,
        }
    }

    fn phase(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn is_upstream_fault(error: &SourceError) -> bool {
    matches!(
        error.kind(),
        SourceErrorKind::Unavailable | SourceErrorKind::Timeout | SourceErrorKind::Internal
    )
}
