//! Per-provider circuit breaking
//!
//! Stops sending calls to a provider after repeated consecutive failures and
//! lets a single probe through once the recovery timeout has elapsed.

mod registry;
mod types;

#[cfg(test)]
mod tests;

pub use registry::CircuitBreakerRegistry;
pub use types::{CircuitBreakerConfig, CircuitState, CircuitStatus};
