//! Terminal errors surfaced to dispatch callers

use std::time::Duration;
use thiserror::Error;

/// Why a dispatch produced no response
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    /// Nothing to try: no configured, active, available model, or every
    /// circuit is open
    #[error("no configured AI models available, retry after {}s", .retry_after.as_secs())]
    NoCandidates { retry_after: Duration },

    /// Every attempted candidate failed and at least one was rate limited
    #[error(
        "rate limited: all providers failed after {attempts} attempts ({}), retry after {}s",
        .providers_tried.join(", "),
        .retry_after.as_secs()
    )]
    RateLimited {
        retry_after: Duration,
        attempts: u32,
        providers_tried: Vec<String>,
    },

    /// Every attempted candidate failed for other reasons
    #[error("All AI providers failed after {attempts} attempts ({}). Last error: {last_error}", .providers_tried.join(", "))]
    Exhausted {
        attempts: u32,
        last_error: String,
        providers_tried: Vec<String>,
    },

    /// The model pool could not be read
    #[error("model pool unavailable: {message}")]
    Store { message: String },

    #[error("dispatch cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

impl DispatchError {
    /// Hint for when the caller should try again
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::NoCandidates { retry_after } | Self::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Suggested HTTP status for a transport front-end
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NoCandidates { .. } => 503,
            Self::RateLimited { .. } => 429,
            Self::Exhausted { .. } => 500,
            Self::Store { .. } => 503,
            Self::Cancelled { .. } => 499,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::RateLimited { attempts, .. }
            | Self::Exhausted { attempts, .. }
            | Self::Cancelled { attempts } => *attempts,
            Self::NoCandidates { .. } | Self::Store { .. } => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_and_hints() {
        let err = DispatchError::RateLimited {
            retry_after: Duration::from_secs(120),
            attempts: 2,
            providers_tried: vec!["Groq".into(), "Cerebras".into()],
        };
        assert_eq!(err.status_code(), 429);
        assert_eq!(err.retry_after(), Some(Duration::from_secs(120)));
        assert_eq!(
            err.to_string(),
            "rate limited: all providers failed after 2 attempts (Groq, Cerebras), retry after 120s"
        );

        let err = DispatchError::Exhausted {
            attempts: 1,
            last_error: "server error: HTTP 503".into(),
            providers_tried: vec!["Groq".into()],
        };
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.retry_after(), None);
        assert!(err.to_string().ends_with("Last error: server error: HTTP 503"));

        assert_eq!(
            DispatchError::NoCandidates { retry_after: Duration::from_secs(60) }.status_code(),
            503
        );
    }
}
