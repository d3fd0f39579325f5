//! Core data model: models, windowed statistics, prompt requests and responses

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

use crate::config::ModelSeed;
use crate::scoring;

pub type ModelId = i64;

/// A named backend configuration with its long-term statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: ModelId,
    pub name: String,
    /// Registry key of the adapter serving this model
    pub provider: String,
    pub api_format: String,
    pub success_count: u64,
    pub failure_count: u64,
    /// Accumulated response time in seconds
    pub total_response_time: f64,
    pub request_count: u64,
    pub is_active: bool,
    /// `None` means available now; a future instant means cooling down
    pub available_at: Option<DateTime<Utc>>,
    pub last_checked: Option<DateTime<Utc>>,
}

impl Model {
    pub fn new(id: ModelId, name: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            provider: provider.into(),
            api_format: "openai".to_string(),
            success_count: 0,
            failure_count: 0,
            total_response_time: 0.0,
            request_count: 0,
            is_active: true,
            available_at: None,
            last_checked: None,
        }
    }

    pub fn from_seed(seed: &ModelSeed) -> Self {
        Self {
            api_format: seed.api_format.clone(),
            is_active: seed.is_active,
            ..Self::new(seed.id, seed.name.clone(), seed.provider.clone())
        }
    }

    /// `success_count / request_count`, 0 without requests
    pub fn success_rate(&self) -> f64 {
        if self.request_count == 0 {
            return 0.0;
        }
        self.success_count as f64 / self.request_count as f64
    }

    /// Mean response time in seconds, 0 without requests
    pub fn average_response_time(&self) -> f64 {
        if self.request_count == 0 {
            return 0.0;
        }
        self.total_response_time / self.request_count as f64
    }

    pub fn speed_score(&self) -> f64 {
        scoring::speed_score(self.average_response_time())
    }

    /// Long-term reliability in [0, 1]
    pub fn reliability_score(&self) -> f64 {
        scoring::reliability(self.success_rate(), self.average_response_time())
    }

    /// Whether the model is outside any cooldown at `now`
    pub fn is_available_at(&self, now: DateTime<Utc>) -> bool {
        self.available_at.is_none_or(|at| at <= now)
    }
}

/// Rolling-window aggregate for one model
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    pub request_count: u64,
    pub success_count: u64,
    /// Seconds
    pub avg_response_time: f64,
}

impl WindowStats {
    pub fn success_rate(&self) -> f64 {
        if self.request_count == 0 {
            return 0.0;
        }
        self.success_count as f64 / self.request_count as f64
    }
}

/// A model together with its windowed statistics, as returned by the store
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSnapshot {
    pub model: Model,
    pub window: Option<WindowStats>,
}

impl ModelSnapshot {
    pub fn new(model: Model, window: Option<WindowStats>) -> Self {
        Self { model, window }
    }
}

/// Immutable input to one dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptRequest {
    pub request_id: Uuid,
    pub user_id: String,
    pub prompt: String,
    pub system_prompt: Option<String>,
    /// Structured-output directive forwarded to capable providers
    pub response_format: Option<Value>,
    /// Caller-forced model, tried first when present in the pool
    pub model_id: Option<ModelId>,
}

impl PromptRequest {
    pub fn new(user_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            user_id: user_id.into(),
            prompt: prompt.into(),
            system_prompt: None,
            response_format: None,
            model_id: None,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_response_format(mut self, response_format: Value) -> Self {
        self.response_format = Some(response_format);
        self
    }

    pub fn with_model_id(mut self, model_id: ModelId) -> Self {
        self.model_id = Some(model_id);
        self
    }
}

/// How the first candidate was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    Auto,
    ForcedFirst,
}

impl SelectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::ForcedFirst => "forced_first",
        }
    }
}

impl std::fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Successful dispatch result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptResponse {
    pub request_id: Uuid,
    pub prompt: String,
    pub response: String,
    pub selected_model: String,
    pub selected_model_id: ModelId,
    pub provider: String,
    #[serde(rename = "response_time_seconds", with = "secs_f64")]
    pub response_time: Duration,
    pub success: bool,
    /// Candidates actually called, not counting inline retries
    pub attempts: u32,
    pub fallback_used: bool,
    pub selection_mode: SelectionMode,
}

mod secs_f64 {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_with(success: u64, failure: u64, total_time: f64) -> Model {
        Model {
            success_count: success,
            failure_count: failure,
            request_count: success + failure,
            total_response_time: total_time,
            ..Model::new(1, "m", "p")
        }
    }

    #[test]
    fn test_no_requests_means_zero_everything() {
        let model = Model::new(1, "m", "p");
        assert_eq!(model.success_rate(), 0.0);
        assert_eq!(model.average_response_time(), 0.0);
        assert_eq!(model.reliability_score(), 0.0);
    }

    #[test]
    fn test_zero_successes_forces_zero_reliability() {
        let fast_but_failing = model_with(0, 5, 0.5);
        assert_eq!(fast_but_failing.reliability_score(), 0.0);
    }

    #[test]
    fn test_reliability_from_counters() {
        // 8/10 success, 2s average
        let model = model_with(8, 2, 20.0);
        let expected = 0.8 * 0.6 + 0.8 * 0.4;
        assert!((model.reliability_score() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_availability_window() {
        let now = Utc::now();
        let mut model = Model::new(1, "m", "p");
        assert!(model.is_available_at(now));
        model.available_at = Some(now + chrono::Duration::seconds(30));
        assert!(!model.is_available_at(now));
        model.available_at = Some(now - chrono::Duration::seconds(1));
        assert!(model.is_available_at(now));
    }

    #[test]
    fn test_response_serializes_seconds() {
        let response = PromptResponse {
            request_id: Uuid::nil(),
            prompt: "hi".into(),
            response: "hello".into(),
            selected_model: "m".into(),
            selected_model_id: 1,
            provider: "p".into(),
            response_time: Duration::from_millis(1500),
            success: true,
            attempts: 1,
            fallback_used: false,
            selection_mode: SelectionMode::Auto,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["response_time_seconds"], 1.5);
        assert_eq!(json["selection_mode"], "auto");
    }
}
