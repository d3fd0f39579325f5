//! `relay probe`

use anyhow::Result;
use colored::*;
use relay_core::{ProbeResult, ProbeStatus, ProviderHealth};

use crate::app::App;

pub async fn execute(app: &App, json: bool) -> Result<()> {
    let results = app.probe().run().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("{}", "No models configured".yellow());
        return Ok(());
    }

    for result in &results {
        println!("{}", format_result(result));
    }

    let ok = results.iter().filter(|r| r.status == ProbeStatus::Success).count();
    println!();
    println!("{}/{} providers responded", ok, results.len());
    Ok(())
}

/// `relay probe --health`
pub async fn health(app: &App, json: bool) -> Result<()> {
    let report = app.probe().check_health().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if report.is_empty() {
        println!("{}", "No providers configured".yellow());
        return Ok(());
    }

    for entry in &report {
        println!("{}", format_health(entry));
    }
    Ok(())
}

fn format_health(entry: &ProviderHealth) -> String {
    if entry.healthy {
        format!("{} {}", "✓".green(), entry.provider)
    } else {
        format!("{} {} {}", "✗".red(), entry.provider, "unreachable".red())
    }
}

fn format_result(result: &ProbeResult) -> String {
    match result.status {
        ProbeStatus::Success => format!(
            "{} {:<14} {:<36} {:>6.2}s",
            "✓".green(),
            result.provider,
            result.model,
            result.response_time.unwrap_or_default()
        ),
        ProbeStatus::Error => format!(
            "{} {:<14} {:<36} {}",
            "✗".red(),
            result.provider,
            result.model,
            result.error.as_deref().unwrap_or("unknown error").red()
        ),
    }
}
