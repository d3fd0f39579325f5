//! One-shot test of every model's provider

use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, timeout};

use crate::error::RelayResult;
use crate::models::{Model, ModelId};
use crate::provider::{GenerateOptions, ProviderRegistry, RawProviderError, sanitize_error_text};
use crate::recovery::classify_error;
use crate::store::{ModelQuery, ModelStore};

pub const PROBE_PROMPT: &str = "Hello! Please respond with 'OK' if you can read this message.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeResult {
    pub provider: String,
    pub model: String,
    pub model_id: ModelId,
    pub status: ProbeStatus,
    /// Seconds, only for successful probes
    pub response_time: Option<f64>,
    pub error: Option<String>,
}

/// Reachability of one registered provider's models endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderHealth {
    pub provider: String,
    pub healthy: bool,
}

/// Sends a fixed prompt through every model's adapter, bypassing retries and
/// circuits, and feeds the outcome into the long-term statistics
pub struct ProviderProbe {
    store: Arc<dyn ModelStore>,
    providers: Arc<ProviderRegistry>,
    call_timeout: Duration,
}

impl ProviderProbe {
    pub fn new(store: Arc<dyn ModelStore>, providers: Arc<ProviderRegistry>, call_timeout: Duration) -> Self {
        Self {
            store,
            providers,
            call_timeout,
        }
    }

    /// Probe all models, active or not.
    ///
    /// Results are ordered successes first (fastest first), then failures.
    pub async fn run(&self) -> RelayResult<Vec<ProbeResult>> {
        let models = self.store.list_models(ModelQuery::all()).await?;
        tracing::info!(models = models.len(), "provider_probe_started");

        let mut results = Vec::with_capacity(models.len());
        for snapshot in models {
            results.push(self.probe(&snapshot.model).await);
        }

        results.sort_by(|a, b| match (a.status, b.status) {
            (ProbeStatus::Success, ProbeStatus::Error) => Ordering::Less,
            (ProbeStatus::Error, ProbeStatus::Success) => Ordering::Greater,
            _ => a
                .response_time
                .unwrap_or(f64::INFINITY)
                .total_cmp(&b.response_time.unwrap_or(f64::INFINITY)),
        });

        tracing::info!(
            succeeded = results.iter().filter(|r| r.status == ProbeStatus::Success).count(),
            total = results.len(),
            "provider_probe_completed"
        );
        Ok(results)
    }

    /// Run every registered adapter's health check, in name order.
    ///
    /// No prompt is sent and statistics are left alone.
    pub async fn check_health(&self) -> Vec<ProviderHealth> {
        let mut report = Vec::with_capacity(self.providers.len());
        for name in self.providers.names() {
            let Some(adapter) = self.providers.get(&name) else {
                continue;
            };
            let healthy = timeout(self.call_timeout, adapter.health_check())
                .await
                .unwrap_or(false);
            if !healthy {
                tracing::warn!(provider = %name, "provider_unhealthy");
            }
            report.push(ProviderHealth { provider: name, healthy });
        }
        report
    }

    async fn probe(&self, model: &Model) -> ProbeResult {
        let mut result = ProbeResult {
            provider: model.provider.clone(),
            model: model.name.clone(),
            model_id: model.id,
            status: ProbeStatus::Error,
            response_time: None,
            error: None,
        };

        let Some(adapter) = self.providers.get(&model.provider) else {
            tracing::warn!(provider = %model.provider, "provider_not_registered");
            result.error = Some("Provider not configured in registry".to_string());
            return result;
        };

        let started = Instant::now();
        let outcome = match timeout(
            self.call_timeout,
            adapter.generate(PROBE_PROMPT, &GenerateOptions::default()),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(RawProviderError::Timeout(format!(
                "no response within {}s",
                self.call_timeout.as_secs_f64()
            ))),
        };
        let elapsed = started.elapsed();

        let stats_update = match outcome {
            Ok(text) if !text.trim().is_empty() => {
                result.status = ProbeStatus::Success;
                result.response_time = Some(elapsed.as_secs_f64());
                self.store.increment_success(model.id, elapsed).await
            }
            Ok(_) => {
                result.error = Some("Empty response".to_string());
                self.store.increment_failure(model.id, elapsed).await
            }
            Err(raw) => {
                let error = classify_error(raw);
                result.error = Some(sanitize_error_text(&format!("{}: {}", error.kind(), error.message())));
                self.store.increment_failure(model.id, elapsed).await
            }
        };

        if let Err(e) = stats_update {
            tracing::error!(
                model_id = model.id,
                error = %sanitize_error_text(&e.to_string()),
                "stats_update_failed"
            );
        }

        result
    }
}
