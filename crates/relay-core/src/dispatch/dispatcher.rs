//! Dispatch loop: rank candidates, call them in order, degrade gracefully

use chrono::Utc;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, timeout};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::error::DispatchError;
use super::selector::{Candidate, CandidateSelector};
use crate::config::{DispatchConfig, RelayConfig};
use crate::models::{Model, PromptRequest, PromptResponse};
use crate::provider::{GenerateOptions, ProviderRegistry, RawProviderError, sanitize_error_text};
use crate::recovery::{
    CircuitBreakerRegistry, CircuitStatus, ErrorKind, ProviderError, RetryConfig, RetryPolicy, RetryResult,
};
use crate::store::{AvailabilityUpdate, HistoryRecord, ModelQuery, ModelStore};

/// Per-request orchestrator; share one instance across concurrent requests
pub struct Dispatcher {
    store: Arc<dyn ModelStore>,
    providers: Arc<ProviderRegistry>,
    circuits: Arc<CircuitBreakerRegistry>,
    retry: RetryPolicy,
    selector: CandidateSelector,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn ModelStore>,
        providers: Arc<ProviderRegistry>,
        circuits: Arc<CircuitBreakerRegistry>,
        retry: RetryConfig,
        config: DispatchConfig,
    ) -> Self {
        Self {
            store,
            providers,
            circuits,
            retry: RetryPolicy::new(retry),
            selector: CandidateSelector::new(config.min_window_requests),
            config,
        }
    }

    /// Wire a dispatcher with a fresh circuit registry from `config`
    pub fn from_config(config: &RelayConfig, store: Arc<dyn ModelStore>, providers: Arc<ProviderRegistry>) -> Self {
        let circuits = Arc::new(CircuitBreakerRegistry::with_config(config.circuit_breaker.clone()));
        Self::new(store, providers, circuits, config.retry.clone(), config.dispatch.clone())
    }

    pub fn store(&self) -> &Arc<dyn ModelStore> {
        &self.store
    }

    pub fn providers(&self) -> &Arc<ProviderRegistry> {
        &self.providers
    }

    pub fn circuits(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.circuits
    }

    pub fn circuit_statuses(&self) -> BTreeMap<String, CircuitStatus> {
        self.circuits.get_all_statuses()
    }

    pub async fn dispatch(&self, request: PromptRequest) -> Result<PromptResponse, DispatchError> {
        self.dispatch_with_cancel(request, &CancellationToken::new()).await
    }

    /// Try ranked candidates until one succeeds.
    ///
    /// Skipped circuits do not count as attempts. Rate limits set a cooldown
    /// without touching failure statistics; authentication and validation
    /// failures set the long cooldown and count as failures. If every
    /// candidate fails and any of them was rate limited the caller gets
    /// [`DispatchError::RateLimited`].
    #[instrument(
        skip_all,
        fields(request_id = %request.request_id, user_id = %request.user_id)
    )]
    pub async fn dispatch_with_cancel(
        &self,
        request: PromptRequest,
        cancel: &CancellationToken,
    ) -> Result<PromptResponse, DispatchError> {
        let pool = self
            .store
            .list_models(ModelQuery::dispatchable(self.config.window_days))
            .await
            .map_err(|e| {
                let message = sanitize_error_text(&e.to_string());
                tracing::error!(error = %message, "model_pool_fetch_failed");
                DispatchError::Store { message }
            })?;

        let selection = self.selector.select(pool, &self.providers, request.model_id);
        let Some(first) = selection.first() else {
            tracing::warn!("no_configured_models");
            return Err(self.unavailable());
        };
        let first_model_id = first.model.id;

        tracing::info!(
            model = %first.model.name,
            provider = %first.model.provider,
            effective_score = first.score.score,
            decision_reason = %first.score.decision_reason,
            recent_request_count = first.score.recent_request_count,
            selection_mode = %selection.mode,
            candidates = selection.candidates.len(),
            "model_selected"
        );

        let prompt = truncate_prompt(&request.prompt, self.config.max_prompt_chars);
        if let Cow::Owned(_) = prompt {
            tracing::info!(
                original_chars = request.prompt.chars().count(),
                max_chars = self.config.max_prompt_chars,
                "prompt_truncated"
            );
        }
        let options = GenerateOptions {
            system_prompt: request.system_prompt.clone(),
            response_format: request.response_format.clone(),
            ..Default::default()
        };

        let mut attempts: u32 = 0;
        let mut providers_tried: Vec<String> = Vec::new();
        let mut last_error: Option<ProviderError> = None;
        let mut last_model: Option<&Model> = None;
        let mut last_elapsed = Duration::ZERO;
        let mut rate_limit_hint: Option<Duration> = None;

        for Candidate { model, .. } in &selection.candidates {
            if cancel.is_cancelled() {
                return Err(DispatchError::Cancelled { attempts });
            }

            if !self.circuits.is_available(&model.provider) {
                tracing::debug!(provider = %model.provider, model = %model.name, "circuit_open_skip");
                continue;
            }
            let Some(adapter) = self.providers.get(&model.provider) else {
                continue;
            };

            attempts += 1;
            if !providers_tried.contains(&model.provider) {
                providers_tried.push(model.provider.clone());
            }
            last_model = Some(model);

            let adapter = adapter.as_ref();
            let prompt_text: &str = &prompt;
            let options = &options;
            let call_timeout = self.config.provider_timeout;
            let started = Instant::now();

            let result = self
                .retry
                .execute(
                    &model.provider,
                    &model.name,
                    move || async move {
                        match timeout(call_timeout, adapter.generate(prompt_text, options)).await {
                            Ok(outcome) => outcome,
                            Err(_) => Err(RawProviderError::Timeout(format!(
                                "no response within {}s",
                                call_timeout.as_secs_f64()
                            ))),
                        }
                    },
                    Some(cancel),
                )
                .await;
            let elapsed = started.elapsed();

            match result {
                RetryResult::Success { value, .. } => {
                    self.circuits.record_success(&model.provider);
                    if let Err(e) = self.store.increment_success(model.id, elapsed).await {
                        log_stats_failure(model, &e.to_string());
                    }
                    self.record_history(&request, Some(model), Some(value.clone()), elapsed, None)
                        .await;

                    let fallback_used = model.id != first_model_id;
                    tracing::info!(
                        model = %model.name,
                        provider = %model.provider,
                        attempts,
                        fallback_used,
                        response_time_seconds = elapsed.as_secs_f64(),
                        "prompt_completed"
                    );

                    return Ok(PromptResponse {
                        request_id: request.request_id,
                        prompt: request.prompt.clone(),
                        response: value,
                        selected_model: model.name.clone(),
                        selected_model_id: model.id,
                        provider: model.provider.clone(),
                        response_time: elapsed,
                        success: true,
                        attempts,
                        fallback_used,
                        selection_mode: selection.mode,
                    });
                }
                RetryResult::Failed { error, .. } => {
                    if let Some(cooldown) = self.handle_failure(model, &error, elapsed).await {
                        rate_limit_hint = Some(rate_limit_hint.map_or(cooldown, |hint| hint.min(cooldown)));
                    }
                    last_elapsed = elapsed;
                    last_error = Some(error);
                }
                RetryResult::Cancelled { .. } => {
                    tracing::info!(provider = %model.provider, attempts, "dispatch_cancelled");
                    return Err(DispatchError::Cancelled { attempts });
                }
            }
        }

        let (Some(model), Some(error)) = (last_model, last_error) else {
            tracing::warn!(candidates = selection.candidates.len(), "all_circuits_open");
            return Err(self.unavailable());
        };

        let last_error = sanitize_error_text(&error.to_string());
        self.record_history(&request, Some(model), None, last_elapsed, Some(last_error.clone()))
            .await;

        tracing::error!(
            attempts,
            providers_tried = ?providers_tried,
            last_error_type = %error.kind(),
            last_error = %last_error,
            "all_providers_failed"
        );

        match rate_limit_hint {
            Some(retry_after) => Err(DispatchError::RateLimited {
                retry_after,
                attempts,
                providers_tried,
            }),
            None => Err(DispatchError::Exhausted {
                attempts,
                last_error,
                providers_tried,
            }),
        }
    }

    /// Apply statistics, cooldown and circuit updates for one failed
    /// candidate; returns the cooldown when the failure was a rate limit
    async fn handle_failure(&self, model: &Model, error: &ProviderError, elapsed: Duration) -> Option<Duration> {
        let kind = error.kind();
        tracing::warn!(
            provider = %model.provider,
            model = %model.name,
            error_type = %kind,
            error = %sanitize_error_text(error.message()),
            elapsed_seconds = elapsed.as_secs_f64(),
            "candidate_failed"
        );

        let rate_limit_cooldown = match kind {
            ErrorKind::RateLimit => {
                let cooldown = error
                    .retry_after()
                    .map(|hint| hint.min(self.config.max_rate_limit_cooldown()))
                    .unwrap_or(self.config.rate_limit_cooldown);
                let update = AvailabilityUpdate::cooldown(cooldown)
                    .with_reason("rate_limit")
                    .with_error_type(kind.as_str());
                match self.store.set_availability(model.id, update).await {
                    Ok(()) => tracing::warn!(
                        provider = %model.provider,
                        model = %model.name,
                        retry_after_seconds = cooldown.as_secs(),
                        "rate_limit_cooldown_set"
                    ),
                    Err(e) => log_stats_failure(model, &e.to_string()),
                }
                Some(cooldown)
            }
            ErrorKind::Authentication | ErrorKind::Validation => {
                if let Err(e) = self.store.increment_failure(model.id, elapsed).await {
                    log_stats_failure(model, &e.to_string());
                }
                let update = AvailabilityUpdate::cooldown(self.config.permanent_error_cooldown)
                    .with_reason("permanent_error")
                    .with_error_type(kind.as_str());
                if let Err(e) = self.store.set_availability(model.id, update).await {
                    log_stats_failure(model, &e.to_string());
                }
                None
            }
            ErrorKind::Server | ErrorKind::Timeout | ErrorKind::Generic => {
                if let Err(e) = self.store.increment_failure(model.id, elapsed).await {
                    log_stats_failure(model, &e.to_string());
                }
                None
            }
        };

        self.circuits.record_failure(&model.provider);
        rate_limit_cooldown
    }

    async fn record_history(
        &self,
        request: &PromptRequest,
        model: Option<&Model>,
        response: Option<String>,
        elapsed: Duration,
        error_message: Option<String>,
    ) {
        let record = HistoryRecord {
            user_id: request.user_id.clone(),
            prompt: request.prompt.clone(),
            selected_model_id: model.map(|m| m.id),
            success: response.is_some(),
            response,
            response_time: elapsed.as_secs_f64(),
            error_message,
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.create_history_record(record).await {
            tracing::error!(
                error = %sanitize_error_text(&e.to_string()),
                "history_record_failed"
            );
        }
    }

    fn unavailable(&self) -> DispatchError {
        DispatchError::NoCandidates {
            retry_after: self.config.unavailable_retry_after,
        }
    }
}

fn log_stats_failure(model: &Model, error: &str) {
    tracing::error!(
        model_id = model.id,
        model = %model.name,
        error = %sanitize_error_text(error),
        "stats_update_failed"
    );
}

/// Cut `prompt` to at most `max_chars` characters
pub fn truncate_prompt(prompt: &str, max_chars: usize) -> Cow<'_, str> {
    match prompt.char_indices().nth(max_chars) {
        Some((byte_index, _)) => Cow::Owned(prompt[..byte_index].to_string()),
        None => Cow::Borrowed(prompt),
    }
}
