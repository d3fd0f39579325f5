//! Relay Core Library
//!
//! Provider selection and resilience engine for routing completion requests
//! across unreliable LLM providers: reliability scoring, candidate ranking,
//! retry with backoff, per-provider circuit breaking and cooldown-based
//! backpressure.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod models;
pub mod provider;
pub mod recovery;
pub mod scoring;
pub mod store;

// Re-export commonly used types
pub use config::{ConfigLoader, DispatchConfig, ModelSeed, ProviderConfig, RelayConfig};
pub use dispatch::{DispatchError, Dispatcher, ProbeResult, ProbeStatus, ProviderHealth, ProviderProbe};
pub use error::{RelayError, RelayResult};
pub use models::{Model, ModelId, ModelSnapshot, PromptRequest, PromptResponse, SelectionMode, WindowStats};
pub use provider::{GenerateOptions, OpenAiCompatibleProvider, ProviderAdapter, ProviderRegistry, RawProviderError};
pub use recovery::{
    CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState, ErrorKind, ProviderError, RetryConfig, RetryPolicy,
};
pub use scoring::{DecisionReason, EffectiveScore};
pub use store::{AvailabilityUpdate, HistoryRecord, InMemoryModelStore, ModelQuery, ModelStore};
