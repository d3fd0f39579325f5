//! Credential scrubbing for provider error text.
//!
//! Provider error bodies are echoed into logs, history records and the
//! terminal [`DispatchError`](crate::DispatchError); all of them pass
//! through [`sanitize_error_text`] first.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

const MAX_CHARS: usize = 1_024;
const MASK: &str = "[REDACTED]";

/// JSON field names whose values are masked wholesale (after lowercasing
/// and mapping `-` and spaces to `_`)
const SECRET_FIELDS: &[&str] = &[
    "api_key",
    "apikey",
    "token",
    "secret",
    "password",
    "passwd",
    "authorization",
    "bearer",
    "cookie",
    "connection_string",
    "database_url",
];

/// Inline patterns, applied in order, with their replacement
static INLINE_SECRETS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?i)\bBearer\s+[A-Za-z0-9._\-+/=]{8,}", "Bearer [REDACTED]"),
        (
            r#"(?i)\b(api[_-]?key|access[_-]?token|token|secret|password|authorization)\b\s*[:=]\s*["']?[^"',\s}]+"#,
            "$1=[REDACTED]",
        ),
        // Issued key formats: OpenAI-style, Groq, Hugging Face, Replicate, Google AI
        (
            r"\b(?:sk-[A-Za-z0-9_\-]{20,}|gsk_[A-Za-z0-9_]{20,}|hf_[A-Za-z0-9]{20,}|r8_[A-Za-z0-9]{20,}|AIza[A-Za-z0-9_\-]{35})",
            MASK,
        ),
        (r"\beyJ[A-Za-z0-9_\-]*\.eyJ[A-Za-z0-9_\-.]*", MASK),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).expect("secret pattern compiles"), replacement))
    .collect()
});

/// Mask credentials in `raw` and cap it at 1024 characters.
///
/// JSON bodies are scrubbed field by field and re-serialized compactly;
/// anything else is scrubbed as plain text.
pub fn sanitize_error_text(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return "<empty error>".to_string();
    }

    let scrubbed = match serde_json::from_str::<Value>(raw) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => {
            serde_json::to_string(&scrub_json(value)).unwrap_or_else(|_| scrub_text(raw))
        }
        _ => scrub_text(raw),
    };
    cap_length(scrubbed)
}

fn scrub_json(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, val)| {
                    let val = if is_secret_field(&key) {
                        Value::String(MASK.to_string())
                    } else {
                        scrub_json(val)
                    };
                    (key, val)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(scrub_json).collect()),
        Value::String(text) => Value::String(scrub_text(&text)),
        other => other,
    }
}

fn is_secret_field(key: &str) -> bool {
    let key = key.to_ascii_lowercase().replace(['-', ' '], "_");
    SECRET_FIELDS.iter().any(|field| key.contains(field))
}

fn scrub_text(text: &str) -> String {
    INLINE_SECRETS
        .iter()
        .fold(text.to_string(), |acc, (re, replacement)| {
            re.replace_all(&acc, *replacement).into_owned()
        })
}

fn cap_length(text: String) -> String {
    match text.char_indices().nth(MAX_CHARS) {
        Some((cut, _)) => {
            let dropped = text[cut..].chars().count();
            format!("{}... [truncated {} chars]", &text[..cut], dropped)
        }
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::sanitize_error_text;

    #[test]
    fn test_json_secret_fields_are_masked() {
        let raw = r#"{"error":{"message":"bad request","api_key":"sk-secret","X-Auth-Token":"abc123"}}"#;
        let sanitized = sanitize_error_text(raw);
        assert!(!sanitized.contains("sk-secret"));
        assert!(!sanitized.contains("abc123"));
        assert!(sanitized.contains("bad request"));
        assert!(sanitized.contains("[REDACTED]"));
    }

    #[test]
    fn test_inline_keys_and_bearer_tokens() {
        let key = "gsk_abcdefghijklmnopqrstuvwxyz0123";
        let raw = format!("Authorization: Bearer {key} failed; retry with {key}");
        let sanitized = sanitize_error_text(&raw);
        assert!(!sanitized.contains(key));
        assert!(sanitized.contains("[REDACTED]"));
    }

    #[test]
    fn test_jwt_in_plain_text() {
        let sanitized = sanitize_error_text("session eyJhbGciOiJIUzI1NiJ9.eyJzdWIiOiIxIn0.sig expired");
        assert!(!sanitized.contains("eyJhbGci"));
        assert!(sanitized.ends_with("expired"));
    }

    #[test]
    fn test_plain_scalar_json_is_text() {
        assert_eq!(sanitize_error_text("503"), "503");
    }

    #[test]
    fn test_long_text_is_capped() {
        let sanitized = sanitize_error_text(&"x".repeat(5_000));
        assert!(sanitized.starts_with(&"x".repeat(1_024)));
        assert!(sanitized.ends_with("... [truncated 3976 chars]"));
    }

    #[test]
    fn test_blank_input() {
        assert_eq!(sanitize_error_text("  \n "), "<empty error>");
    }
}
