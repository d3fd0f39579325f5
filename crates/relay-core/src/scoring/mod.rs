//! Reliability scoring
//!
//! Pure computation, no I/O. The effective score is the only ranking key used
//! by candidate selection.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{Model, WindowStats};

pub const SUCCESS_WEIGHT: f64 = 0.6;
pub const SPEED_WEIGHT: f64 = 0.4;
/// Responses at or above this many seconds score zero on speed
pub const SPEED_BASELINE_SECS: f64 = 10.0;
pub const DEFAULT_MIN_WINDOW_REQUESTS: u64 = 3;

/// `clamp(1 - avg/10s, 0, 1)`
pub fn speed_score(avg_response_time: f64) -> f64 {
    (1.0 - avg_response_time / SPEED_BASELINE_SECS).clamp(0.0, 1.0)
}

/// Weighted success rate and speed.
///
/// A zero success rate always scores zero, however fast the failures were.
pub fn reliability(success_rate: f64, avg_response_time: f64) -> f64 {
    if success_rate <= 0.0 || success_rate.is_nan() {
        return 0.0;
    }
    let score = success_rate * SUCCESS_WEIGHT + speed_score(avg_response_time) * SPEED_WEIGHT;
    score.clamp(0.0, 1.0)
}

/// Which data the effective score was computed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// Enough windowed requests
    RecentScore,
    /// Cold start, long-term score used
    Fallback,
}

impl DecisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RecentScore => "recent_score",
            Self::Fallback => "fallback",
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EffectiveScore {
    pub score: f64,
    pub decision_reason: DecisionReason,
    pub recent_request_count: u64,
    pub long_term_score: f64,
    /// Present when the window had any requests
    pub recent_score: Option<f64>,
}

/// Windowed reliability when at least `min_window_requests` recent requests
/// exist, otherwise the model's long-term reliability
pub fn effective_score(
    model: &Model,
    window: Option<&WindowStats>,
    min_window_requests: u64,
) -> EffectiveScore {
    let long_term_score = model.reliability_score();
    let recent_request_count = window.map(|w| w.request_count).unwrap_or(0);
    let recent_score = window
        .filter(|w| w.request_count > 0)
        .map(|w| reliability(w.success_rate(), w.avg_response_time));

    match recent_score {
        Some(score) if recent_request_count >= min_window_requests => EffectiveScore {
            score,
            decision_reason: DecisionReason::RecentScore,
            recent_request_count,
            long_term_score,
            recent_score,
        },
        _ => EffectiveScore {
            score: long_term_score,
            decision_reason: DecisionReason::Fallback,
            recent_request_count,
            long_term_score,
            recent_score,
        },
    }
}
