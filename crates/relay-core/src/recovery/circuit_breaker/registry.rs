//! Registry of per-provider circuits

use dashmap::DashMap;
use std::collections::BTreeMap;
use tokio::time::Instant;

use super::types::{CircuitBreakerConfig, CircuitState, CircuitStatus, ProviderCircuit};

/// Provider name → circuit, shared by every concurrent dispatch.
///
/// A provider without an entry is closed. Each operation holds the entry's
/// shard lock only for the state update.
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    circuits: DashMap<String, ProviderCircuit>,
    config: CircuitBreakerConfig,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            circuits: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Whether `provider` may be called right now.
    ///
    /// Performs `open → half_open` once the recovery timeout has passed since
    /// the last failure, and claims the single half-open probe slot for the
    /// caller. While a probe is outstanding other callers are refused; a slot
    /// held longer than the recovery timeout is treated as abandoned.
    pub fn is_available(&self, provider: &str) -> bool {
        let Some(mut circuit) = self.circuits.get_mut(provider) else {
            return true;
        };

        let now = Instant::now();
        let recovery = self.config.recovery_timeout;
        let state = circuit.state;
        let probe_started = circuit.probe_started;

        match state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = circuit
                    .last_failure
                    .map(|at| now.saturating_duration_since(at))
                    .unwrap_or(recovery);
                if elapsed < recovery {
                    return false;
                }
                circuit.state = CircuitState::HalfOpen;
                circuit.probe_started = Some(now);
                circuit.half_open_successes = 0;
                let failure_count = circuit.failure_count;
                drop(circuit);
                log_transition(provider, CircuitState::Open, CircuitState::HalfOpen, failure_count);
                true
            }
            CircuitState::HalfOpen => match probe_started {
                Some(started) if now.saturating_duration_since(started) < recovery => false,
                _ => {
                    circuit.probe_started = Some(now);
                    tracing::debug!(provider = %provider, "circuit_probe_reclaimed");
                    true
                }
            },
        }
    }

    /// Successful call: a half-open probe closes the circuit, a closed one
    /// forgets its consecutive failures
    pub fn record_success(&self, provider: &str) {
        let Some(mut circuit) = self.circuits.get_mut(provider) else {
            return;
        };

        let state = circuit.state;
        match state {
            CircuitState::HalfOpen => {
                circuit.half_open_successes += 1;
                circuit.state = CircuitState::Closed;
                circuit.failure_count = 0;
                circuit.probe_started = None;
                drop(circuit);
                log_transition(provider, CircuitState::HalfOpen, CircuitState::Closed, 0);
            }
            CircuitState::Closed => {
                circuit.failure_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    /// Failed call: a failed probe reopens, otherwise count towards the threshold
    pub fn record_failure(&self, provider: &str) {
        let now = Instant::now();
        let mut circuit = self.circuits.entry(provider.to_string()).or_default();

        let state = circuit.state;
        match state {
            CircuitState::HalfOpen => {
                circuit.state = CircuitState::Open;
                circuit.last_failure = Some(now);
                circuit.probe_started = None;
                let failure_count = circuit.failure_count;
                drop(circuit);
                log_transition(provider, CircuitState::HalfOpen, CircuitState::Open, failure_count);
            }
            _ => {
                circuit.failure_count = circuit.failure_count.saturating_add(1);
                circuit.last_failure = Some(now);
                let failure_count = circuit.failure_count;
                if state == CircuitState::Closed && failure_count >= self.config.failure_threshold {
                    circuit.state = CircuitState::Open;
                    drop(circuit);
                    log_transition(provider, CircuitState::Closed, CircuitState::Open, failure_count);
                }
            }
        }
    }

    /// Current state without side effects; unknown providers are closed
    pub fn state(&self, provider: &str) -> CircuitState {
        self.circuits
            .get(provider)
            .map(|circuit| circuit.state)
            .unwrap_or(CircuitState::Closed)
    }

    pub fn status(&self, provider: &str) -> CircuitStatus {
        let now = Instant::now();
        self.circuits
            .get(provider)
            .map(|circuit| circuit.snapshot(now))
            .unwrap_or_default()
    }

    /// Snapshot of every known circuit, ordered by provider name
    pub fn get_all_statuses(&self) -> BTreeMap<String, CircuitStatus> {
        let now = Instant::now();
        self.circuits
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot(now)))
            .collect()
    }

    /// Forget every circuit
    pub fn reset(&self) {
        self.circuits.clear();
        tracing::info!("circuit_breakers_reset");
    }
}

fn log_transition(provider: &str, from: CircuitState, to: CircuitState, failure_count: u32) {
    match to {
        CircuitState::Open => tracing::warn!(
            provider = %provider,
            from = %from,
            to = %to,
            failure_count,
            "circuit_state_changed"
        ),
        _ => tracing::info!(
            provider = %provider,
            from = %from,
            to = %to,
            failure_count,
            "circuit_state_changed"
        ),
    }
}
