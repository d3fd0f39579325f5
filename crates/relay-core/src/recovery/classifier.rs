//! Provider failure classification
//!
//! Maps a raw adapter failure into exactly one [`ProviderError`]. Rules are
//! applied in order:
//!
//! 1. connection/read timeout → `TimeoutError`
//! 2. 429, or 500 whose body contains `"429"` → `RateLimitError`
//! 3. any other 5xx → `ServerError`
//! 4. 401 / 402 / 403 → `AuthenticationError`
//! 5. 400 / 404 / 422 → `ValidationError`
//! 6. anything else → generic `ProviderError` (never retried)

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::provider::RawProviderError;

/// Discriminant of a classified provider error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    RateLimit,
    Server,
    Timeout,
    Authentication,
    Validation,
    Generic,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimit => "RateLimitError",
            Self::Server => "ServerError",
            Self::Timeout => "TimeoutError",
            Self::Authentication => "AuthenticationError",
            Self::Validation => "ValidationError",
            Self::Generic => "ProviderError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provider failure after classification
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Provider-side rate limiting. Never retried inline.
    #[error("rate limited: {message}")]
    RateLimit {
        message: String,
        retry_after: Option<Duration>,
    },

    /// 5xx from the provider
    #[error("server error: {message}")]
    Server { message: String, status: u16 },

    /// Connection or read timeout
    #[error("timeout: {message}")]
    Timeout { message: String },

    /// Bad or exhausted credentials (401/402/403)
    #[error("authentication failed: {message}")]
    Authentication { message: String, status: u16 },

    /// Malformed request or unknown endpoint/model (400/404/422)
    #[error("request rejected: {message}")]
    Validation { message: String, status: u16 },

    /// Anything the classifier does not recognise
    #[error("provider error: {message}")]
    Generic { message: String },
}

impl ProviderError {
    pub fn rate_limit(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::RateLimit {
            message: message.into(),
            retry_after,
        }
    }

    pub fn server(message: impl Into<String>, status: u16) -> Self {
        Self::Server {
            message: message.into(),
            status,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    pub fn authentication(message: impl Into<String>, status: u16) -> Self {
        Self::Authentication {
            message: message.into(),
            status,
        }
    }

    pub fn validation(message: impl Into<String>, status: u16) -> Self {
        Self::Validation {
            message: message.into(),
            status,
        }
    }

    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RateLimit { .. } => ErrorKind::RateLimit,
            Self::Server { .. } => ErrorKind::Server,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Generic { .. } => ErrorKind::Generic,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::RateLimit { message, .. }
            | Self::Server { message, .. }
            | Self::Timeout { message }
            | Self::Authentication { message, .. }
            | Self::Validation { message, .. }
            | Self::Generic { message } => message,
        }
    }

    /// Provider-suggested wait, only ever present on rate limits
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Only server errors and timeouts are retried in place.
    pub fn is_retryable(&self) -> bool {
        is_retryable(self)
    }
}

/// Classify a raw adapter failure using the current wall clock
pub fn classify_error(error: RawProviderError) -> ProviderError {
    classify_error_at(error, Utc::now())
}

/// Classify a raw adapter failure relative to `now` (used for HTTP-date `Retry-After`)
pub fn classify_error_at(error: RawProviderError, now: DateTime<Utc>) -> ProviderError {
    match error {
        RawProviderError::Classified(classified) => classified,
        RawProviderError::Timeout(message) => ProviderError::timeout(message),
        RawProviderError::Status {
            status,
            headers,
            body,
        } => classify_status(status, &headers, &body, now),
        RawProviderError::Transport(message) | RawProviderError::Other(message) => {
            ProviderError::generic(message)
        }
    }
}

fn classify_status(status: u16, headers: &HeaderMap, body: &str, now: DateTime<Utc>) -> ProviderError {
    let message = format!("HTTP {}: {}", status, body);

    if status == 429 || (status == 500 && body.contains("429")) {
        let retry_after = headers
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| parse_retry_after(value, now));
        return ProviderError::rate_limit(message, retry_after);
    }

    match status {
        500..=599 => ProviderError::server(message, status),
        401 | 402 | 403 => ProviderError::authentication(message, status),
        400 | 404 | 422 => ProviderError::validation(message, status),
        _ => ProviderError::generic(message),
    }
}

/// Parse a `Retry-After` header value.
///
/// Accepts integer seconds (`"60"`) or an HTTP date
/// (`"Wed, 21 Oct 2026 07:28:00 GMT"`), the latter converted to seconds from
/// `now` and floored at zero. Anything else yields `None`.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if value.bytes().all(|b| b.is_ascii_digit()) {
        return value.parse::<u64>().ok().map(Duration::from_secs);
    }

    let date = DateTime::parse_from_rfc2822(value).ok()?;
    let seconds = (date.with_timezone(&Utc) - now).num_seconds().max(0);
    Some(Duration::from_secs(seconds as u64))
}

/// True only for `ServerError` and `TimeoutError`.
///
/// Rate limits, authentication and validation failures are handled by
/// cooldown and fallback, not by retrying the same provider.
pub fn is_retryable(error: &ProviderError) -> bool {
    matches!(
        error,
        ProviderError::Server { .. } | ProviderError::Timeout { .. }
    )
}
