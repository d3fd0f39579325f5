//! Generic adapter for OpenAI-compatible chat-completion endpoints

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{Value, json};
use std::env;

use super::{GenerateOptions, ProviderAdapter, RawProviderError, sanitize_error_text};
use crate::config::ProviderConfig;
use crate::error::{RelayError, RelayResult};

const DEFAULT_MAX_TOKENS: u32 = 512;
const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_TOP_P: f32 = 0.9;

/// Chat-completions adapter driven entirely by [`ProviderConfig`]
#[derive(Debug)]
pub struct OpenAiCompatibleProvider {
    name: String,
    api_url: String,
    models_url: Option<String>,
    api_key: String,
    model: String,
    supports_response_format: bool,
    extra_headers: HeaderMap,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    /// Build the adapter, failing when the credential is missing
    pub fn from_config(config: &ProviderConfig) -> RelayResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .or_else(|| env::var(&config.api_key_env).ok().filter(|key| !key.is_empty()))
            .ok_or_else(|| RelayError::config(format!("{} is required", config.api_key_env)))?;

        let mut extra_headers = HeaderMap::new();
        for (key, value) in &config.extra_headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| RelayError::config(format!("invalid header name {}: {}", key, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| RelayError::config(format!("invalid header value for {}: {}", key, e)))?;
            extra_headers.insert(name, value);
        }

        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            name: config.name.clone(),
            api_url: config.base_url.clone(),
            models_url: config.models_url.clone(),
            api_key,
            model: config.default_model.clone(),
            supports_response_format: config.supports_response_format,
            extra_headers,
            client,
        })
    }

    fn build_payload(&self, prompt: &str, options: &GenerateOptions) -> Value {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = options.system_prompt.as_deref().filter(|s| !s.is_empty()) {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": prompt}));

        let mut payload = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "temperature": options.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            "top_p": DEFAULT_TOP_P,
        });

        if let Some(format) = &options.response_format {
            if self.supports_response_format {
                payload["response_format"] = format.clone();
            } else {
                tracing::warn!(
                    provider = %self.name,
                    requested_format = %format,
                    "response_format_not_supported"
                );
            }
        }

        payload
    }
}

/// Extract `choices[0].message.content`, joining array content parts
fn parse_response(provider: &str, body: &Value) -> Result<String, RawProviderError> {
    let Some(choice) = body.get("choices").and_then(Value::as_array).and_then(|c| c.first()) else {
        tracing::error!(
            provider = %provider,
            body = %sanitize_error_text(&body.to_string()),
            "unexpected_response_shape"
        );
        return Err(RawProviderError::Other(format!(
            "Invalid response format from {}",
            provider
        )));
    };

    let content = match choice.pointer("/message/content") {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .map(|part| match part {
                Value::String(s) => s.clone(),
                Value::Object(obj) => obj
                    .get("text")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| part.to_string()),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" "),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    Ok(content.trim().to_string())
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String, RawProviderError> {
        let payload = self.build_payload(prompt, options);

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .headers(self.extra_headers.clone())
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(
                provider = %self.name,
                status = status.as_u16(),
                body = %sanitize_error_text(&body),
                "provider_http_error"
            );
            return Err(RawProviderError::status(status.as_u16(), headers, body));
        }

        let body: Value = response.json().await?;
        parse_response(&self.name, &body)
    }

    async fn health_check(&self) -> bool {
        let Some(url) = &self.models_url else {
            return false;
        };

        match self.client.get(url).bearer_auth(&self.api_key).send().await {
            Ok(response) => response.status().as_u16() == 200,
            Err(e) => {
                tracing::warn!(
                    provider = %self.name,
                    error = %sanitize_error_text(&e.to_string()),
                    "health_check_failed"
                );
                false
            }
        }
    }
}
