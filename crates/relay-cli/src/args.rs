//! CLI argument definitions using clap
//!
//! - relay prompt "text"        # Dispatch one prompt
//! - relay probe                # Test every configured model
//! - relay models               # Show model statistics and scores
//! - relay config show          # Print the effective configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Default configuration file name used across all CLI commands.
pub const DEFAULT_CONFIG_FILE: &str = "relay.toml";

#[derive(Parser, Debug)]
#[command(name = "relay")]
#[command(about = "Relay - reliability-ranked routing across LLM providers")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, env = "RELAY_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send a prompt to the best available model
    Prompt {
        /// Prompt text
        text: String,

        /// System prompt
        #[arg(long)]
        system: Option<String>,

        /// Ask capable providers for a JSON object response
        #[arg(long)]
        json_mode: bool,

        /// Print the response as JSON
        #[arg(long)]
        json: bool,

        /// Try this model first
        #[arg(long)]
        model_id: Option<i64>,

        /// User id recorded in history
        #[arg(long, default_value = "cli_user")]
        user: String,
    },

    /// Send a test prompt through every model's provider
    Probe {
        /// Print results as JSON
        #[arg(long)]
        json: bool,

        /// Only check each provider's models endpoint, without sending a prompt
        #[arg(long)]
        health: bool,
    },

    /// Show model statistics, scores and cooldowns
    Models {
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show the effective configuration after file and environment overrides
    Show,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_arguments() {
        let cli = Cli::try_parse_from([
            "relay",
            "prompt",
            "hello there",
            "--system",
            "be terse",
            "--json-mode",
            "--model-id",
            "3",
        ])
        .unwrap();

        match cli.command {
            Commands::Prompt {
                text,
                system,
                json_mode,
                json,
                model_id,
                user,
            } => {
                assert_eq!(text, "hello there");
                assert_eq!(system.as_deref(), Some("be terse"));
                assert!(json_mode);
                assert!(!json);
                assert_eq!(model_id, Some(3));
                assert_eq!(user, "cli_user");
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_FILE));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["relay", "models", "--config", "/etc/relay.toml", "-v"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, PathBuf::from("/etc/relay.toml"));
        assert!(matches!(cli.command, Commands::Models { json: false }));
    }

    #[test]
    fn test_probe_health_flag() {
        let cli = Cli::try_parse_from(["relay", "probe", "--health", "--json"]).unwrap();
        assert!(matches!(cli.command, Commands::Probe { json: true, health: true }));
    }

    #[test]
    fn test_config_show() {
        let cli = Cli::try_parse_from(["relay", "config", "show"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Show
            }
        ));
    }

    #[test]
    fn test_prompt_requires_text() {
        assert!(Cli::try_parse_from(["relay", "prompt"]).is_err());
    }
}
