//! Process-local [`ModelStore`]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::time::Duration;

use super::{AvailabilityUpdate, HistoryRecord, ModelQuery, ModelStore};
use crate::config::ModelSeed;
use crate::error::{RelayError, RelayResult};
use crate::models::{Model, ModelId, ModelSnapshot, WindowStats};

#[derive(Debug, Default)]
struct Inner {
    models: BTreeMap<ModelId, Model>,
    history: Vec<HistoryRecord>,
}

/// Models and history held in memory; window stats are computed from history
#[derive(Debug, Default)]
pub struct InMemoryModelStore {
    inner: RwLock<Inner>,
}

impl InMemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seeds(seeds: &[ModelSeed]) -> Self {
        Self::with_models(seeds.iter().map(Model::from_seed))
    }

    pub fn with_models(models: impl IntoIterator<Item = Model>) -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.write();
            for model in models {
                inner.models.insert(model.id, model);
            }
        }
        store
    }

    /// Insert or replace a model
    pub fn insert_model(&self, model: Model) {
        self.inner.write().models.insert(model.id, model);
    }

    pub fn model(&self, model_id: ModelId) -> Option<Model> {
        self.inner.read().models.get(&model_id).cloned()
    }

    pub fn models(&self) -> Vec<Model> {
        self.inner.read().models.values().cloned().collect()
    }

    /// Models are deactivated, never deleted
    pub fn set_active(&self, model_id: ModelId, active: bool) -> RelayResult<()> {
        let mut inner = self.inner.write();
        let model = inner
            .models
            .get_mut(&model_id)
            .ok_or_else(|| not_found(model_id))?;
        model.is_active = active;
        Ok(())
    }

    pub fn history(&self) -> Vec<HistoryRecord> {
        self.inner.read().history.clone()
    }

    fn update_stats(&self, model_id: ModelId, response_time: Duration, success: bool) -> RelayResult<()> {
        let mut inner = self.inner.write();
        let model = inner
            .models
            .get_mut(&model_id)
            .ok_or_else(|| not_found(model_id))?;
        if success {
            model.success_count += 1;
        } else {
            model.failure_count += 1;
        }
        model.request_count += 1;
        model.total_response_time += response_time.as_secs_f64();
        model.last_checked = Some(Utc::now());
        Ok(())
    }
}

fn not_found(model_id: ModelId) -> RelayError {
    RelayError::store(format!("model {} not found", model_id))
}

fn window_stats(history: &[HistoryRecord], model_id: ModelId, since: DateTime<Utc>) -> WindowStats {
    let mut stats = WindowStats::default();
    let mut total_time = 0.0;
    for record in history
        .iter()
        .filter(|r| r.selected_model_id == Some(model_id) && r.created_at >= since)
    {
        stats.request_count += 1;
        if record.success {
            stats.success_count += 1;
        }
        total_time += record.response_time;
    }
    if stats.request_count > 0 {
        stats.avg_response_time = total_time / stats.request_count as f64;
    }
    stats
}

#[async_trait]
impl ModelStore for InMemoryModelStore {
    async fn list_models(&self, query: ModelQuery) -> RelayResult<Vec<ModelSnapshot>> {
        let now = Utc::now();
        let inner = self.inner.read();

        let snapshots = inner
            .models
            .values()
            .filter(|m| !query.active_only || m.is_active)
            .filter(|m| !query.available_only || m.is_available_at(now))
            .map(|m| {
                let window = query.window_days.map(|days| {
                    let since = now
                        .checked_sub_signed(chrono::Duration::days(i64::from(days)))
                        .unwrap_or(DateTime::<Utc>::MIN_UTC);
                    window_stats(&inner.history, m.id, since)
                });
                ModelSnapshot::new(m.clone(), window)
            })
            .collect();

        Ok(snapshots)
    }

    async fn increment_success(&self, model_id: ModelId, response_time: Duration) -> RelayResult<()> {
        self.update_stats(model_id, response_time, true)
    }

    async fn increment_failure(&self, model_id: ModelId, response_time: Duration) -> RelayResult<()> {
        self.update_stats(model_id, response_time, false)
    }

    async fn set_availability(&self, model_id: ModelId, update: AvailabilityUpdate) -> RelayResult<()> {
        let mut inner = self.inner.write();
        let model = inner
            .models
            .get_mut(&model_id)
            .ok_or_else(|| not_found(model_id))?;

        if update.retry_after.is_zero() {
            model.available_at = None;
        } else {
            let cooldown = chrono::Duration::from_std(update.retry_after)
                .map_err(|e| RelayError::store(format!("invalid cooldown: {}", e)))?;
            let until = Utc::now().checked_add_signed(cooldown).ok_or_else(|| {
                RelayError::store(format!("cooldown of {}s is out of range", update.retry_after.as_secs()))
            })?;
            model.available_at = Some(until);
        }

        tracing::debug!(
            model_id,
            retry_after_seconds = update.retry_after.as_secs(),
            reason = update.reason.as_deref().unwrap_or(""),
            error_type = update.error_type.as_deref().unwrap_or(""),
            "availability_updated"
        );
        Ok(())
    }

    async fn create_history_record(&self, record: HistoryRecord) -> RelayResult<()> {
        self.inner.write().history.push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(model_id: ModelId, success: bool, secs: f64, age_days: i64) -> HistoryRecord {
        HistoryRecord {
            user_id: "u".into(),
            prompt: "p".into(),
            selected_model_id: Some(model_id),
            response: success.then(|| "ok".to_string()),
            response_time: secs,
            success,
            error_message: None,
            created_at: Utc::now() - chrono::Duration::days(age_days),
        }
    }

    fn store() -> InMemoryModelStore {
        let mut cooling = Model::new(3, "Cooling", "Groq");
        cooling.available_at = Some(Utc::now() + chrono::Duration::hours(1));
        let mut inactive = Model::new(2, "Inactive", "Groq");
        inactive.is_active = false;
        InMemoryModelStore::with_models([Model::new(1, "Active", "Groq"), inactive, cooling])
    }

    #[tokio::test]
    async fn test_list_filters() {
        let store = store();
        let all = store.list_models(ModelQuery::all()).await.unwrap();
        assert_eq!(all.len(), 3);

        let dispatchable = store.list_models(ModelQuery::dispatchable(7)).await.unwrap();
        let ids: Vec<ModelId> = dispatchable.iter().map(|s| s.model.id).collect();
        assert_eq!(ids, vec![1]);
        assert_eq!(dispatchable[0].window, Some(WindowStats::default()));
    }

    #[tokio::test]
    async fn test_window_excludes_old_history() {
        let store = store();
        store.create_history_record(record(1, true, 1.0, 0)).await.unwrap();
        store.create_history_record(record(1, false, 3.0, 1)).await.unwrap();
        store.create_history_record(record(1, true, 9.0, 30)).await.unwrap();
        store.create_history_record(record(2, true, 1.0, 0)).await.unwrap();

        let snapshots = store.list_models(ModelQuery::dispatchable(7)).await.unwrap();
        let window = snapshots[0].window.unwrap();
        assert_eq!(window.request_count, 2);
        assert_eq!(window.success_count, 1);
        assert!((window.avg_response_time - 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_counters_and_unknown_model() {
        let store = store();
        store.increment_success(1, Duration::from_secs(2)).await.unwrap();
        store.increment_failure(1, Duration::from_secs(4)).await.unwrap();

        let model = store.model(1).unwrap();
        assert_eq!(model.success_count, 1);
        assert_eq!(model.failure_count, 1);
        assert_eq!(model.request_count, 2);
        assert!((model.average_response_time() - 3.0).abs() < 1e-9);
        assert!(model.last_checked.is_some());

        let err = store.increment_success(99, Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, RelayError::Store(_)));
    }

    #[tokio::test]
    async fn test_set_and_clear_availability() {
        let store = store();
        store
            .set_availability(1, AvailabilityUpdate::cooldown(Duration::from_secs(60)).with_reason("rate_limit"))
            .await
            .unwrap();
        assert!(store.model(1).unwrap().available_at.is_some());
        assert!(store.list_models(ModelQuery::dispatchable(7)).await.unwrap().is_empty());

        store.set_availability(1, AvailabilityUpdate::clear()).await.unwrap();
        assert_eq!(store.model(1).unwrap().available_at, None);
    }

    #[tokio::test]
    async fn test_out_of_range_cooldown_is_an_error() {
        let store = store();
        let err = store
            .set_availability(1, AvailabilityUpdate::cooldown(Duration::from_secs(10_000_000_000_000)))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Store(_)));
        assert_eq!(store.model(1).unwrap().available_at, None);
    }

    #[tokio::test]
    async fn test_huge_window_counts_all_history() {
        let store = store();
        store.create_history_record(record(1, true, 2.0, 400)).await.unwrap();

        let snapshots = store.list_models(ModelQuery::dispatchable(u32::MAX)).await.unwrap();
        assert_eq!(snapshots[0].window.unwrap().request_count, 1);
    }

    #[tokio::test]
    async fn test_deactivate_keeps_model() {
        let store = store();
        store.set_active(1, false).unwrap();
        assert_eq!(store.models().len(), 3);
        assert!(store.list_models(ModelQuery::dispatchable(7)).await.unwrap().is_empty());
    }
}
