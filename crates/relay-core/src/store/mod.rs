//! Persistence capability for model metadata, statistics and history
//!
//! The dispatch loop treats every call here as a remote operation that may
//! fail; failures are logged by the caller and never reach the user.

mod memory;

pub use memory::InMemoryModelStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::RelayResult;
use crate::models::{ModelId, ModelSnapshot};

/// Filter for [`ModelStore::list_models`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelQuery {
    pub active_only: bool,
    /// Exclude models whose `available_at` is in the future
    pub available_only: bool,
    /// Attach rolling-window stats over this many days
    pub window_days: Option<u32>,
}

impl ModelQuery {
    /// Active, not cooling down, with window stats
    pub fn dispatchable(window_days: u32) -> Self {
        Self {
            active_only: true,
            available_only: true,
            window_days: Some(window_days),
        }
    }

    /// Every model, no window stats
    pub fn all() -> Self {
        Self {
            active_only: false,
            available_only: false,
            window_days: None,
        }
    }
}

/// Cooldown change; a zero `retry_after` clears it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityUpdate {
    pub retry_after: Duration,
    pub reason: Option<String>,
    pub error_type: Option<String>,
}

impl AvailabilityUpdate {
    pub fn cooldown(retry_after: Duration) -> Self {
        Self {
            retry_after,
            reason: None,
            error_type: None,
        }
    }

    pub fn clear() -> Self {
        Self::cooldown(Duration::ZERO)
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_error_type(mut self, error_type: impl Into<String>) -> Self {
        self.error_type = Some(error_type.into());
        self
    }
}

/// One prompt outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub user_id: String,
    pub prompt: String,
    pub selected_model_id: Option<ModelId>,
    pub response: Option<String>,
    /// Seconds
    pub response_time: f64,
    pub success: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelStore: Send + Sync {
    /// Models matching `query`, each with its window stats when requested
    async fn list_models(&self, query: ModelQuery) -> RelayResult<Vec<ModelSnapshot>>;

    async fn increment_success(&self, model_id: ModelId, response_time: Duration) -> RelayResult<()>;

    async fn increment_failure(&self, model_id: ModelId, response_time: Duration) -> RelayResult<()>;

    async fn set_availability(&self, model_id: ModelId, update: AvailabilityUpdate) -> RelayResult<()>;

    async fn create_history_record(&self, record: HistoryRecord) -> RelayResult<()>;
}
