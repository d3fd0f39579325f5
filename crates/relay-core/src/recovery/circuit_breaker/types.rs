//! Circuit breaker types and configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls proceed normally
    Closed,
    /// Calls are rejected until the recovery timeout elapses
    Open,
    /// One probe call is allowed to test recovery
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Time since the last failure before an open circuit admits a probe
    #[serde(with = "humantime_serde")]
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

/// Mutable per-provider state, created lazily on first failure
#[derive(Debug, Clone)]
pub(super) struct ProviderCircuit {
    pub state: CircuitState,
    pub failure_count: u32,
    pub last_failure: Option<Instant>,
    pub half_open_successes: u32,
    /// When the current half-open probe slot was claimed
    pub probe_started: Option<Instant>,
}

impl Default for ProviderCircuit {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure: None,
            half_open_successes: 0,
            probe_started: None,
        }
    }
}

impl ProviderCircuit {
    pub fn snapshot(&self, now: Instant) -> CircuitStatus {
        CircuitStatus {
            state: self.state,
            failure_count: self.failure_count,
            half_open_successes: self.half_open_successes,
            seconds_since_last_failure: self
                .last_failure
                .map(|at| now.saturating_duration_since(at).as_secs_f64()),
        }
    }
}

/// Read-only view of one provider's circuit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitStatus {
    pub state: CircuitState,
    pub failure_count: u32,
    pub half_open_successes: u32,
    pub seconds_since_last_failure: Option<f64>,
}

impl Default for CircuitStatus {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            half_open_successes: 0,
            seconds_since_last_failure: None,
        }
    }
}
