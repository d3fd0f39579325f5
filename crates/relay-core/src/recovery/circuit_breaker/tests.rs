//! Tests for circuit breaker functionality

use std::sync::Arc;
use std::time::Duration;

use super::registry::CircuitBreakerRegistry;
use super::types::{CircuitBreakerConfig, CircuitState};

fn registry(threshold: u32, recovery_secs: u64) -> CircuitBreakerRegistry {
    CircuitBreakerRegistry::with_config(CircuitBreakerConfig {
        failure_threshold: threshold,
        recovery_timeout: Duration::from_secs(recovery_secs),
    })
}

#[tokio::test(start_paused = true)]
async fn test_unknown_provider_is_closed_and_available() {
    let cb = CircuitBreakerRegistry::new();
    assert!(cb.is_available("Groq"));
    assert_eq!(cb.state("Groq"), CircuitState::Closed);
    assert!(cb.get_all_statuses().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_opens_at_threshold() {
    let cb = registry(3, 60);

    cb.record_failure("Groq");
    cb.record_failure("Groq");
    assert_eq!(cb.state("Groq"), CircuitState::Closed);
    assert!(cb.is_available("Groq"));

    cb.record_failure("Groq");
    assert_eq!(cb.state("Groq"), CircuitState::Open);
    assert!(!cb.is_available("Groq"));
    assert_eq!(cb.status("Groq").failure_count, 3);
}

#[tokio::test(start_paused = true)]
async fn test_default_threshold_is_five() {
    let cb = CircuitBreakerRegistry::new();
    for _ in 0..4 {
        cb.record_failure("Groq");
    }
    assert_eq!(cb.state("Groq"), CircuitState::Closed);
    cb.record_failure("Groq");
    assert_eq!(cb.state("Groq"), CircuitState::Open);
}

#[tokio::test(start_paused = true)]
async fn test_success_resets_consecutive_failures() {
    let cb = registry(3, 60);
    cb.record_failure("Groq");
    cb.record_failure("Groq");
    cb.record_success("Groq");
    cb.record_failure("Groq");
    assert_eq!(cb.state("Groq"), CircuitState::Closed);
    assert_eq!(cb.status("Groq").failure_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_after_recovery_timeout() {
    let cb = registry(1, 60);
    cb.record_failure("Groq");

    tokio::time::advance(Duration::from_secs(59)).await;
    assert!(!cb.is_available("Groq"));
    assert_eq!(cb.state("Groq"), CircuitState::Open);

    tokio::time::advance(Duration::from_secs(1)).await;
    assert!(cb.is_available("Groq"));
    assert_eq!(cb.state("Groq"), CircuitState::HalfOpen);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_success_closes() {
    let cb = registry(1, 60);
    cb.record_failure("Groq");
    tokio::time::advance(Duration::from_secs(60)).await;
    assert!(cb.is_available("Groq"));

    cb.record_success("Groq");
    let status = cb.status("Groq");
    assert_eq!(status.state, CircuitState::Closed);
    assert_eq!(status.failure_count, 0);
    assert_eq!(status.half_open_successes, 1);
    assert!(cb.is_available("Groq"));
}

#[tokio::test(start_paused = true)]
async fn test_half_open_failure_reopens() {
    let cb = registry(1, 60);
    cb.record_failure("Groq");
    tokio::time::advance(Duration::from_secs(60)).await;
    assert!(cb.is_available("Groq"));

    cb.record_failure("Groq");
    assert_eq!(cb.state("Groq"), CircuitState::Open);
    // Recovery is measured from the failed probe
    tokio::time::advance(Duration::from_secs(30)).await;
    assert!(!cb.is_available("Groq"));
}

#[tokio::test(start_paused = true)]
async fn test_single_probe_in_half_open() {
    let cb = registry(1, 60);
    cb.record_failure("Groq");
    tokio::time::advance(Duration::from_secs(60)).await;

    assert!(cb.is_available("Groq"));
    assert!(!cb.is_available("Groq"));
    assert!(!cb.is_available("Groq"));
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_probe_slot_is_reclaimed() {
    let cb = registry(1, 60);
    cb.record_failure("Groq");
    tokio::time::advance(Duration::from_secs(60)).await;
    assert!(cb.is_available("Groq"));

    tokio::time::advance(Duration::from_secs(60)).await;
    assert!(cb.is_available("Groq"));
    assert_eq!(cb.state("Groq"), CircuitState::HalfOpen);
}

#[tokio::test(start_paused = true)]
async fn test_providers_are_independent() {
    let cb = registry(1, 60);
    cb.record_failure("Groq");
    assert!(!cb.is_available("Groq"));
    assert!(cb.is_available("Cerebras"));

    let statuses = cb.get_all_statuses();
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses["Groq"].state, CircuitState::Open);
}

#[tokio::test(start_paused = true)]
async fn test_reset_clears_everything() {
    let cb = registry(1, 60);
    cb.record_failure("Groq");
    cb.record_failure("Cerebras");
    cb.reset();
    assert!(cb.get_all_statuses().is_empty());
    assert!(cb.is_available("Groq"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_failures_are_all_counted() {
    let cb = Arc::new(registry(1_000, 60));
    let mut handles = Vec::new();
    for _ in 0..8 {
        let cb = cb.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..50 {
                cb.record_failure("Groq");
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(cb.status("Groq").failure_count, 400);
}

#[test]
fn test_state_serializes_snake_case() {
    assert_eq!(serde_json::to_string(&CircuitState::HalfOpen).unwrap(), "\"half_open\"");
}
