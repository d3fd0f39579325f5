//! Configuration management commands

use anyhow::Result;
use colored::*;
use relay_core::RelayConfig;
use std::path::Path;

/// Show the effective configuration as TOML
pub fn show(config_path: &Path, config: &RelayConfig) -> Result<()> {
    if config_path.exists() {
        eprintln!("{} {}", "Loaded configuration from:".green(), config_path.display());
    } else {
        eprintln!(
            "{} {}",
            "Configuration file not found, using defaults:".yellow(),
            config_path.display()
        );
    }

    println!("{}", render(config)?);
    Ok(())
}

/// Credentials are never rendered
pub fn render(config: &RelayConfig) -> Result<String> {
    Ok(toml::to_string_pretty(config)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::ProviderConfig;

    #[test]
    fn test_render_hides_inline_key() {
        let mut config = RelayConfig::default();
        config.providers.push(ProviderConfig {
            api_key: Some("super-secret".into()),
            ..ProviderConfig::new("Groq", "https://api.groq.com/openai/v1/chat/completions")
        });

        let rendered = render(&config).unwrap();
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("GROQ_API_KEY"));
        assert!(rendered.contains("base_delay = \"2s\""));
    }
}
