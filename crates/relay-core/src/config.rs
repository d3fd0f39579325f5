//! Configuration loading and management

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{RelayError, RelayResult};
use crate::models::ModelId;
use crate::recovery::circuit_breaker::CircuitBreakerConfig;
use crate::recovery::retry::RetryConfig;

/// Top-level configuration for the dispatch engine
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub dispatch: DispatchConfig,
    #[serde(rename = "provider")]
    pub providers: Vec<ProviderConfig>,
    #[serde(rename = "model")]
    pub models: Vec<ModelSeed>,
}

/// Longest supported rolling window
pub const MAX_WINDOW_DAYS: u32 = 3_650;

impl RelayConfig {
    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> RelayResult<()> {
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(RelayError::config("circuit_breaker.failure_threshold must be at least 1"));
        }
        if self.retry.max_delay < self.retry.base_delay {
            return Err(RelayError::config(format!(
                "retry.max_delay ({:?}) must not be smaller than retry.base_delay ({:?})",
                self.retry.max_delay, self.retry.base_delay
            )));
        }
        if self.dispatch.max_prompt_chars == 0 {
            return Err(RelayError::config("dispatch.max_prompt_chars must be at least 1"));
        }
        if self.dispatch.window_days == 0 || self.dispatch.window_days > MAX_WINDOW_DAYS {
            return Err(RelayError::config(format!(
                "dispatch.window_days must be between 1 and {}",
                MAX_WINDOW_DAYS
            )));
        }
        if self.dispatch.min_window_requests == 0 {
            return Err(RelayError::config("dispatch.min_window_requests must be at least 1"));
        }

        let mut names = HashSet::new();
        for provider in &self.providers {
            if !names.insert(provider.name.as_str()) {
                return Err(RelayError::config(format!("duplicate provider name: {}", provider.name)));
            }
        }

        let mut ids = HashSet::new();
        for model in &self.models {
            if !ids.insert(model.id) {
                return Err(RelayError::config(format!("duplicate model id: {}", model.id)));
            }
        }

        Ok(())
    }
}

/// Dispatch-loop tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DispatchConfig {
    /// Per provider call, independent of the caller's deadline
    #[serde(with = "humantime_serde")]
    pub provider_timeout: Duration,
    /// Prompts are cut to this many characters before dispatch
    pub max_prompt_chars: usize,
    /// Below this many windowed requests the long-term score is used
    pub min_window_requests: u64,
    pub window_days: u32,
    /// Cooldown when a rate-limited provider gives no `Retry-After`
    #[serde(with = "humantime_serde")]
    pub rate_limit_cooldown: Duration,
    /// Cooldown after authentication/validation failures
    #[serde(with = "humantime_serde")]
    pub permanent_error_cooldown: Duration,
    /// Retry-after hint when no candidate exists at all
    #[serde(with = "humantime_serde")]
    pub unavailable_retry_after: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            provider_timeout: Duration::from_secs(30),
            max_prompt_chars: 6_000,
            min_window_requests: 3,
            window_days: 7,
            rate_limit_cooldown: Duration::from_secs(3_600),
            permanent_error_cooldown: Duration::from_secs(86_400),
            unavailable_retry_after: Duration::from_secs(60),
        }
    }
}

impl DispatchConfig {
    /// Ceiling for a provider-supplied `Retry-After`; never below the
    /// long cooldown for permanent errors
    pub fn max_rate_limit_cooldown(&self) -> Duration {
        self.permanent_error_cooldown.max(self.rate_limit_cooldown)
    }
}

/// One OpenAI-compatible backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    /// Registry key, matched against `Model::provider`
    pub name: String,
    /// Chat-completions endpoint
    pub base_url: String,
    /// Endpoint used by health checks
    #[serde(default)]
    pub models_url: Option<String>,
    /// Environment variable holding the credential
    pub api_key_env: String,
    /// Inline credential, takes precedence over `api_key_env`
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub default_model: String,
    #[serde(default)]
    pub supports_response_format: bool,
    #[serde(default = "default_provider_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default)]
    pub extra_headers: BTreeMap<String, String>,
}

fn default_provider_timeout() -> Duration {
    Duration::from_secs(30)
}

impl ProviderConfig {
    /// Minimal entry; the credential variable defaults to `<NAME>_API_KEY`
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        let name = name.into();
        let api_key_env = format!("{}_API_KEY", name.to_uppercase().replace(['-', ' '], "_"));
        Self {
            name,
            base_url: base_url.into(),
            models_url: None,
            api_key_env,
            api_key: None,
            default_model: String::new(),
            supports_response_format: false,
            timeout: default_provider_timeout(),
            extra_headers: BTreeMap::new(),
        }
    }
}

/// Initial model pool entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelSeed {
    pub id: ModelId,
    pub name: String,
    pub provider: String,
    #[serde(default = "default_api_format")]
    pub api_format: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_api_format() -> String {
    "openai".to_string()
}

fn default_true() -> bool {
    true
}

/// Source of configuration data
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// TOML file; a missing file leaves the configuration unchanged
    File(PathBuf),
    /// Process environment
    Environment,
    /// Explicit variable set, used instead of the process environment
    Vars(HashMap<String, String>),
    /// Built-in defaults
    Default,
}

/// Configuration loader; later sources override earlier ones
#[derive(Debug, Default)]
pub struct ConfigLoader {
    sources: Vec<ConfigSource>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_source(mut self, source: ConfigSource) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_defaults(self) -> Self {
        self.add_source(ConfigSource::Default)
    }

    pub fn with_file<P: AsRef<Path>>(self, path: P) -> Self {
        self.add_source(ConfigSource::File(path.as_ref().to_path_buf()))
    }

    pub fn with_env(self) -> Self {
        self.add_source(ConfigSource::Environment)
    }

    pub fn with_env_vars<I, K, V>(self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self.add_source(ConfigSource::Vars(vars))
    }

    /// Apply every source in order, then validate
    pub fn load(self) -> RelayResult<RelayConfig> {
        let mut config = RelayConfig::default();

        for source in &self.sources {
            match source {
                ConfigSource::Default => {
                    tracing::debug!("Loading default config");
                    config = RelayConfig::default();
                }
                ConfigSource::File(path) => {
                    tracing::debug!("Loading config from file: {}", path.display());
                    if let Some(file_config) = load_from_file(path)? {
                        config = file_config;
                    }
                }
                ConfigSource::Environment => {
                    tracing::debug!("Loading config from environment");
                    apply_env_overrides(&mut config, |key| env::var(key).ok())?;
                }
                ConfigSource::Vars(vars) => {
                    apply_env_overrides(&mut config, |key| vars.get(key).cloned())?;
                }
            }
        }

        config.validate()?;
        Ok(config)
    }
}

fn load_from_file(path: &Path) -> RelayResult<Option<RelayConfig>> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "config_file_missing");
        return Ok(None);
    }

    let content = fs::read_to_string(path).map_err(|e| {
        RelayError::config(format!("Failed to read config file '{}': {}", path.display(), e))
    })?;

    toml::from_str(&content).map(Some).map_err(|e| {
        RelayError::config(format!("Failed to parse TOML config '{}': {}", path.display(), e))
    })
}

fn apply_env_overrides<F>(config: &mut RelayConfig, lookup: F) -> RelayResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = parse_var(&lookup, "RELAY_MAX_RETRIES")? {
        config.retry.max_retries = v;
    }
    if let Some(v) = parse_secs(&lookup, "RELAY_RETRY_BASE_DELAY")? {
        config.retry.base_delay = v;
    }
    if let Some(v) = parse_secs(&lookup, "RELAY_RETRY_MAX_DELAY")? {
        config.retry.max_delay = v;
    }
    if let Some(v) = parse_secs(&lookup, "RELAY_RETRY_JITTER")? {
        config.retry.jitter = v;
    }
    if let Some(v) = parse_var(&lookup, "RELAY_CB_FAILURE_THRESHOLD")? {
        config.circuit_breaker.failure_threshold = v;
    }
    if let Some(v) = parse_secs(&lookup, "RELAY_CB_RECOVERY_TIMEOUT")? {
        config.circuit_breaker.recovery_timeout = v;
    }
    if let Some(v) = parse_secs(&lookup, "RELAY_PROVIDER_TIMEOUT")? {
        config.dispatch.provider_timeout = v;
    }
    if let Some(v) = parse_var(&lookup, "RELAY_MAX_PROMPT_CHARS")? {
        config.dispatch.max_prompt_chars = v;
    }
    if let Some(v) = parse_var(&lookup, "RELAY_MIN_WINDOW_REQUESTS")? {
        config.dispatch.min_window_requests = v;
    }
    if let Some(v) = parse_var(&lookup, "RELAY_WINDOW_DAYS")? {
        config.dispatch.window_days = v;
    }
    Ok(())
}

fn parse_var<T, F>(lookup: &F, key: &str) -> RelayResult<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| RelayError::config(format!("Invalid {} value: {}", key, raw))),
    }
}

fn parse_secs<F>(lookup: &F, key: &str) -> RelayResult<Option<Duration>>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(secs) = parse_var::<f64, F>(lookup, key)? else {
        return Ok(None);
    };
    Duration::try_from_secs_f64(secs)
        .map(Some)
        .map_err(|_| RelayError::config(format!("Invalid {} value: {}", key, secs)))
}
