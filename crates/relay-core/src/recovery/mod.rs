//! Failure handling primitives for provider calls
//!
//! This module provides:
//! - Error classification into the provider error taxonomy
//! - Exponential backoff with jitter
//! - A single-call retry executor
//! - Per-provider circuit breaking

pub mod backoff;
pub mod circuit_breaker;
pub mod classifier;
pub mod retry;

pub use backoff::ExponentialBackoff;
pub use circuit_breaker::{CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState, CircuitStatus};
pub use classifier::{ErrorKind, ProviderError, classify_error, is_retryable, parse_retry_after};
pub use retry::{RetryConfig, RetryPolicy, RetryResult};
