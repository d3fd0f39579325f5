//! Wiring of configuration, providers, store and dispatcher

use relay_core::{
    ConfigLoader, Dispatcher, InMemoryModelStore, ProviderProbe, ProviderRegistry, RelayConfig, RelayResult,
};
use std::path::Path;
use std::sync::Arc;

/// Everything a command needs, built once per invocation
pub struct App {
    pub config: RelayConfig,
    pub store: Arc<InMemoryModelStore>,
    pub dispatcher: Dispatcher,
}

impl App {
    /// Defaults, then the TOML file (if present), then `RELAY_*` variables
    pub fn load_config(path: &Path) -> RelayResult<RelayConfig> {
        ConfigLoader::new().with_defaults().with_file(path).with_env().load()
    }

    pub fn build(config: RelayConfig) -> Self {
        let providers = Arc::new(ProviderRegistry::from_configs(&config.providers));
        let store = Arc::new(InMemoryModelStore::from_seeds(&config.models));

        tracing::debug!(
            providers = ?providers.names(),
            models = config.models.len(),
            "app_initialized"
        );

        let dispatcher = Dispatcher::from_config(&config, store.clone(), providers);
        Self {
            config,
            store,
            dispatcher,
        }
    }

    pub fn probe(&self) -> ProviderProbe {
        ProviderProbe::new(
            self.store.clone(),
            self.dispatcher.providers().clone(),
            self.config.dispatch.provider_timeout,
        )
    }
}
