//! Output formatting helpers for CLI commands

use crate::agent::ModelDescriptor;
use crate::metrics::{Alert, AlertKind, Severity};
use crate::registry::{BackendStatus, BackendView};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use serde_json::json;

fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(header);
    table
}

fn status_cell(status: BackendStatus) -> String {
    match status {
        BackendStatus::Healthy => "Healthy".green().to_string(),
        BackendStatus::Unhealthy => "Unhealthy".red().to_string(),
        BackendStatus::Unknown => "Unknown".yellow().to_string(),
    }
}

/// Per-token price shown per 1K tokens.
fn per_thousand(cost: f64) -> String {
    if cost == 0.0 {
        "free".to_string()
    } else {
        format!("${:.4}", cost * 1000.0)
    }
}

pub fn format_models_table(models: &[ModelDescriptor]) -> String {
    let mut t = table(vec![
        "Model", "Backend", "Context", "Input/1K", "Output/1K", "Latency", "Available",
    ]);
    for m in models {
        t.add_row(vec![
            Cell::new(m.key()),
            Cell::new(&m.backend),
            Cell::new(m.context_window),
            Cell::new(per_thousand(m.cost_per_input_token)),
            Cell::new(per_thousand(m.cost_per_output_token)),
            Cell::new(format!("{:.0}ms", m.avg_latency_ms)),
            Cell::new(if m.is_available {
                "yes".green().to_string()
            } else {
                "no".red().to_string()
            }),
        ]);
    }
    t.to_string()
}

pub fn format_models_json(models: &[ModelDescriptor]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&json!({ "models": models }))
}

pub fn format_backends_table(backends: &[BackendView]) -> String {
    let mut t = table(vec!["Name", "Type", "Status", "Models", "Last Error"]);
    for b in backends {
        t.add_row(vec![
            Cell::new(&b.name),
            Cell::new(&b.backend_type),
            Cell::new(status_cell(b.status)),
            Cell::new(b.model_count),
            Cell::new(b.last_error.as_deref().unwrap_or("-")),
        ]);
    }
    t.to_string()
}

pub fn format_backends_json(backends: &[BackendView]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&json!({ "backends": backends }))
}

pub fn format_alerts_table(alerts: &[Alert]) -> String {
    let mut t = table(vec!["Model", "Alert", "Severity", "Observed", "Threshold"]);
    for a in alerts {
        let (kind, observed, threshold) = match a.kind {
            AlertKind::HighFailureRate => (
                "failure rate",
                format!("{:.1}%", a.observed * 100.0),
                format!("{:.1}%", a.threshold * 100.0),
            ),
            AlertKind::HighLatency => (
                "latency",
                format!("{:.0}ms", a.observed),
                format!("{:.0}ms", a.threshold),
            ),
        };
        let severity = match a.severity {
            Severity::Warning => a.severity.to_string().yellow().to_string(),
            Severity::Critical => a.severity.to_string().red().bold().to_string(),
        };
        t.add_row(vec![
            Cell::new(&a.model_key),
            Cell::new(kind),
            Cell::new(severity),
            Cell::new(observed),
            Cell::new(threshold),
        ]);
    }
    t.to_string()
}

pub fn format_alerts_json(alerts: &[Alert]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&json!({ "alerts": alerts }))
}

/// Status icon for compact output.
pub fn status_icon(status: BackendStatus) -> &'static str {
    match status {
        BackendStatus::Healthy => "✓",
        BackendStatus::Unhealthy => "✗",
        BackendStatus::Unknown => "?",
    }
}
