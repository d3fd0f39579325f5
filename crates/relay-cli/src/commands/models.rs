//! `relay models`

use anyhow::Result;
use chrono::Utc;
use colored::*;
use relay_core::scoring::{EffectiveScore, effective_score};
use relay_core::store::ModelQuery;
use relay_core::{CircuitState, Model, ModelStore};
use serde::Serialize;

use crate::app::App;

#[derive(Debug, Serialize)]
struct ModelRow {
    id: i64,
    name: String,
    provider: String,
    active: bool,
    configured: bool,
    success_rate: f64,
    average_response_time: f64,
    reliability_score: f64,
    effective: EffectiveScore,
    cooldown_seconds: Option<i64>,
    circuit: CircuitState,
}

pub async fn execute(app: &App, json: bool) -> Result<()> {
    let query = ModelQuery {
        active_only: false,
        available_only: false,
        window_days: Some(app.config.dispatch.window_days),
    };
    let snapshots = app.store.list_models(query).await?;
    let providers = app.dispatcher.providers();
    let circuits = app.dispatcher.circuits();
    let now = Utc::now();

    let mut rows: Vec<ModelRow> = snapshots
        .iter()
        .map(|snapshot| {
            let model: &Model = &snapshot.model;
            ModelRow {
                id: model.id,
                name: model.name.clone(),
                provider: model.provider.clone(),
                active: model.is_active,
                configured: providers.is_configured(&model.provider),
                success_rate: model.success_rate(),
                average_response_time: model.average_response_time(),
                reliability_score: model.reliability_score(),
                effective: effective_score(
                    model,
                    snapshot.window.as_ref(),
                    app.config.dispatch.min_window_requests,
                ),
                cooldown_seconds: model
                    .available_at
                    .filter(|at| *at > now)
                    .map(|at| (at - now).num_seconds()),
                circuit: circuits.state(&model.provider),
            }
        })
        .collect();
    rows.sort_by(|a, b| b.effective.score.total_cmp(&a.effective.score));

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!(
        "{:>4}  {:<36} {:<14} {:>7} {:>8} {:>7} {:>9}  {:<12} {}",
        "id".bold(),
        "model".bold(),
        "provider".bold(),
        "success".bold(),
        "avg (s)".bold(),
        "score".bold(),
        "effective".bold(),
        "reason".bold(),
        "state".bold()
    );
    for row in &rows {
        let state = if !row.configured {
            "unconfigured".dimmed().to_string()
        } else if !row.active {
            "inactive".dimmed().to_string()
        } else if let Some(secs) = row.cooldown_seconds {
            format!("cooldown {}s", secs).yellow().to_string()
        } else if row.circuit != CircuitState::Closed {
            format!("circuit {}", row.circuit).red().to_string()
        } else {
            "ready".green().to_string()
        };
        println!(
            "{:>4}  {:<36} {:<14} {:>6.1}% {:>8.2} {:>7.3} {:>9.3}  {:<12} {}",
            row.id,
            row.name,
            row.provider,
            row.success_rate * 100.0,
            row.average_response_time,
            row.reliability_score,
            row.effective.score,
            row.effective.decision_reason.as_str(),
            state
        );
    }
    Ok(())
}
