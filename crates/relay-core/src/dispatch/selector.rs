//! Candidate ordering

use crate::models::{Model, ModelId, ModelSnapshot, SelectionMode};
use crate::provider::ProviderRegistry;
use crate::scoring::{self, EffectiveScore};

/// A model eligible for this dispatch with the score it was ranked by
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub model: Model,
    pub score: EffectiveScore,
}

/// Ranked candidates for one dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub candidates: Vec<Candidate>,
    pub mode: SelectionMode,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn first(&self) -> Option<&Candidate> {
        self.candidates.first()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CandidateSelector {
    min_window_requests: u64,
}

impl Default for CandidateSelector {
    fn default() -> Self {
        Self::new(scoring::DEFAULT_MIN_WINDOW_REQUESTS)
    }
}

impl CandidateSelector {
    pub fn new(min_window_requests: u64) -> Self {
        Self { min_window_requests }
    }

    /// Drop unconfigured providers, rank by effective score (descending,
    /// stable), then move a forced model to the front without reordering
    /// the rest
    pub fn select(
        &self,
        pool: Vec<ModelSnapshot>,
        providers: &ProviderRegistry,
        forced: Option<ModelId>,
    ) -> Selection {
        let mut candidates: Vec<Candidate> = pool
            .into_iter()
            .filter(|snapshot| providers.is_configured(&snapshot.model.provider))
            .map(|snapshot| {
                let score =
                    scoring::effective_score(&snapshot.model, snapshot.window.as_ref(), self.min_window_requests);
                Candidate {
                    model: snapshot.model,
                    score,
                }
            })
            .collect();

        candidates.sort_by(|a, b| b.score.score.total_cmp(&a.score.score));

        let mut mode = SelectionMode::Auto;
        if let Some(model_id) = forced {
            match candidates.iter().position(|c| c.model.id == model_id) {
                Some(index) => {
                    let candidate = candidates.remove(index);
                    candidates.insert(0, candidate);
                    mode = SelectionMode::ForcedFirst;
                }
                None => {
                    tracing::warn!(model_id, "forced_model_not_in_pool");
                }
            }
        }

        Selection { candidates, mode }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WindowStats;
    use crate::provider::{GenerateOptions, ProviderAdapter, RawProviderError};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Stub(&'static str);

    #[async_trait]
    impl ProviderAdapter for Stub {
        fn name(&self) -> &str {
            self.0
        }

        async fn generate(&self, _prompt: &str, _options: &GenerateOptions) -> Result<String, RawProviderError> {
            Ok(String::new())
        }

        async fn health_check(&self) -> bool {
            true
        }
    }

    fn registry(names: &[&'static str]) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        for &name in names {
            registry.register(Arc::new(Stub(name)));
        }
        registry
    }

    /// Long-term score = `success_rate * 0.6 + 0.4` (zero latency)
    fn snapshot(id: ModelId, provider: &str, successes: u64, requests: u64) -> ModelSnapshot {
        let model = Model {
            success_count: successes,
            failure_count: requests - successes,
            request_count: requests,
            ..Model::new(id, format!("model-{}", id), provider)
        };
        ModelSnapshot::new(model, None)
    }

    fn ids(selection: &Selection) -> Vec<ModelId> {
        selection.candidates.iter().map(|c| c.model.id).collect()
    }

    #[test]
    fn test_orders_by_score_descending() {
        let pool = vec![snapshot(1, "A", 5, 10), snapshot(2, "A", 9, 10), snapshot(3, "A", 7, 10)];
        let selection = CandidateSelector::default().select(pool, &registry(&["A"]), None);
        assert_eq!(ids(&selection), vec![2, 3, 1]);
        assert_eq!(selection.mode, SelectionMode::Auto);
    }

    #[test]
    fn test_ties_keep_pool_order() {
        let pool = vec![snapshot(4, "A", 1, 2), snapshot(1, "A", 1, 2), snapshot(9, "A", 1, 2)];
        let selection = CandidateSelector::default().select(pool, &registry(&["A"]), None);
        assert_eq!(ids(&selection), vec![4, 1, 9]);
    }

    #[test]
    fn test_drops_unconfigured_providers() {
        let pool = vec![snapshot(1, "A", 10, 10), snapshot(2, "B", 1, 10)];
        let selection = CandidateSelector::default().select(pool, &registry(&["B"]), None);
        assert_eq!(ids(&selection), vec![2]);
    }

    #[test]
    fn test_forced_model_moves_to_front_only() {
        let pool = vec![
            snapshot(1, "A", 9, 10),
            snapshot(2, "A", 8, 10),
            snapshot(3, "A", 7, 10),
            snapshot(4, "A", 1, 10),
        ];
        let selection = CandidateSelector::default().select(pool, &registry(&["A"]), Some(3));
        assert_eq!(ids(&selection), vec![3, 1, 2, 4]);
        assert_eq!(selection.mode, SelectionMode::ForcedFirst);
    }

    #[test]
    fn test_forced_model_missing_is_auto() {
        let pool = vec![snapshot(1, "A", 9, 10)];
        let selection = CandidateSelector::default().select(pool, &registry(&["A"]), Some(42));
        assert_eq!(ids(&selection), vec![1]);
        assert_eq!(selection.mode, SelectionMode::Auto);
    }

    #[test]
    fn test_recent_window_overrides_long_term() {
        let mut strong_history = snapshot(1, "A", 10, 10);
        strong_history.window = Some(WindowStats {
            request_count: 5,
            success_count: 0,
            avg_response_time: 1.0,
        });
        let steady = snapshot(2, "A", 5, 10);

        let selection = CandidateSelector::default().select(vec![strong_history, steady], &registry(&["A"]), None);
        assert_eq!(ids(&selection), vec![2, 1]);
        assert_eq!(selection.candidates[1].score.score, 0.0);
    }
}
