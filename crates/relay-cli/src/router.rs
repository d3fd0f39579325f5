//! Command routing logic for CLI

use anyhow::Result;

use crate::app::App;
use crate::args::{Cli, Commands, ConfigAction};
use crate::commands;

/// Route CLI commands to their respective handlers
pub async fn route(cli: Cli) -> Result<()> {
    let config = App::load_config(&cli.config)?;

    match cli.command {
        Commands::Config {
            action: ConfigAction::Show,
        } => commands::config::show(&cli.config, &config),
        Commands::Prompt {
            text,
            system,
            json_mode,
            json,
            model_id,
            user,
        } => {
            let app = App::build(config);
            let args = commands::prompt::PromptArgs {
                text,
                system,
                json_mode,
                json,
                model_id,
                user,
            };
            commands::prompt::execute(&app, args).await
        }
        Commands::Probe { json, health } => {
            let app = App::build(config);
            if health {
                commands::probe::health(&app, json).await
            } else {
                commands::probe::execute(&app, json).await
            }
        }
        Commands::Models { json } => {
            let app = App::build(config);
            commands::models::execute(&app, json).await
        }
    }
}
