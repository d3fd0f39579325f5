//! `relay prompt`

use anyhow::Result;
use colored::*;
use relay_core::{DispatchError, PromptRequest, PromptResponse};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::app::App;

pub struct PromptArgs {
    pub text: String,
    pub system: Option<String>,
    /// Ask capable providers for a JSON object response
    pub json_mode: bool,
    /// Print the response envelope as JSON
    pub json: bool,
    pub model_id: Option<i64>,
    pub user: String,
}

/// Build the request the dispatcher sees from CLI arguments
pub fn build_request(args: &PromptArgs) -> PromptRequest {
    let mut request = PromptRequest::new(args.user.clone(), args.text.clone());
    if let Some(system) = &args.system {
        request = request.with_system_prompt(system.clone());
    }
    if args.json_mode {
        request = request.with_response_format(json!({"type": "json_object"}));
    }
    if let Some(model_id) = args.model_id {
        request = request.with_model_id(model_id);
    }
    request
}

/// Dispatch one prompt; Ctrl-C cancels between attempts
pub async fn execute(app: &App, args: PromptArgs) -> Result<()> {
    let request = build_request(&args);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt_received");
            on_interrupt.cancel();
        }
    });

    let outcome = app.dispatcher.dispatch_with_cancel(request, &cancel).await;
    signal_task.abort();

    match outcome {
        Ok(response) if args.json => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Ok(response) => {
            print_response(&response);
            Ok(())
        }
        Err(e) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&failure_json(&e))?);
            } else {
                print_failure(&e);
            }
            Err(e.into())
        }
    }
}

/// Machine-readable form of a failed dispatch
pub fn failure_json(error: &DispatchError) -> Value {
    json!({
        "success": false,
        "error": error.to_string(),
        "status_code": error.status_code(),
        "attempts": error.attempts(),
        "retry_after_seconds": error.retry_after().map(|d| d.as_secs()),
    })
}

fn print_response(response: &PromptResponse) {
    println!("{}", response.response);
    eprintln!();
    eprintln!(
        "{} {} ({}) in {:.2}s, attempts: {}{}",
        "✓".green(),
        response.selected_model.bold(),
        response.provider,
        response.response_time.as_secs_f64(),
        response.attempts,
        if response.fallback_used {
            ", fallback used".yellow().to_string()
        } else {
            String::new()
        }
    );
}

fn print_failure(error: &DispatchError) {
    eprintln!("{} {}", "✗".red(), error.to_string().red());
    if let Some(retry_after) = error.retry_after() {
        eprintln!("  retry after {}s (status {})", retry_after.as_secs(), error.status_code());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn args(json_mode: bool, json: bool) -> PromptArgs {
        PromptArgs {
            text: "hi".into(),
            system: None,
            json_mode,
            json,
            model_id: None,
            user: "u".into(),
        }
    }

    #[test]
    fn test_build_request_maps_flags() {
        let request = build_request(&PromptArgs {
            system: Some("sys".into()),
            model_id: Some(4),
            ..args(true, false)
        });
        assert_eq!(request.prompt, "hi");
        assert_eq!(request.system_prompt.as_deref(), Some("sys"));
        assert_eq!(request.response_format, Some(json!({"type": "json_object"})));
        assert_eq!(request.model_id, Some(4));
    }

    #[test]
    fn test_json_output_does_not_change_request() {
        let request = build_request(&args(false, true));
        assert!(request.response_format.is_none());
        assert!(request.model_id.is_none());
    }

    #[test]
    fn test_failure_json() {
        let value = failure_json(&DispatchError::RateLimited {
            retry_after: Duration::from_secs(30),
            attempts: 2,
            providers_tried: vec!["A".into(), "B".into()],
        });
        assert_eq!(value["status_code"], 429);
        assert_eq!(value["retry_after_seconds"], 30);
        assert_eq!(value["attempts"], 2);
        assert_eq!(value["success"], false);

        let value = failure_json(&DispatchError::Cancelled { attempts: 1 });
        assert!(value["retry_after_seconds"].is_null());
    }
}
