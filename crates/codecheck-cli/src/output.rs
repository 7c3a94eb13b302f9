//! Rendering of command results

use clap::ValueEnum;
use codecheck_core::Row;
use codecheck_pool::{HealthReport, OperationOutput, PoolStats};
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

pub fn rows_table(rows: &[Row]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    if let Some(first) = rows.first() {
        table.set_header(first.columns().to_vec());
    }
    for row in rows {
        table.add_row(row.values.iter().map(|v| v.to_string()).collect::<Vec<_>>());
    }
    table
}

fn key_value_table(pairs: Vec<(&str, String)>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["field", "value"]);
    for (key, value) in pairs {
        table.add_row(vec![key.to_string(), value]);
    }
    table
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

pub fn stats_table(stats: &PoolStats) -> Table {
    key_value_table(vec![
        ("pool_size", stats.pool_size().to_string()),
        ("available", stats.available().to_string()),
        ("active", stats.active().to_string()),
        ("waiting", stats.waiting().to_string()),
        ("min / max", format!("{} / {}", stats.min_size(), stats.max_size())),
        ("utilization", format!("{:.0}%", stats.utilization() * 100.0)),
        ("total_created", stats.total_created().to_string()),
        ("queries_executed", stats.queries_executed().to_string()),
        ("transactions_executed", stats.transactions_executed().to_string()),
        ("errors", stats.errors().to_string()),
        ("pool_exhausted_count", stats.pool_exhausted_count().to_string()),
        ("last_error", optional(stats.last_error())),
        ("last_error_at", optional(stats.last_error_at().map(|t| t.to_rfc3339()))),
    ])
}

pub fn health_table(report: &HealthReport) -> Table {
    key_value_table(vec![
        ("status", report.status.to_string()),
        ("database_version", optional(report.database_version.as_deref())),
        ("database_time", optional(report.database_time.map(|t| t.to_rfc3339()))),
        ("is_replica", optional(report.is_replica)),
        ("latency_ms", report.latency_ms.to_string()),
        ("error", optional(report.error.as_deref())),
        ("consecutive_failures", report.consecutive_failures.to_string()),
    ])
}

pub fn rows_json(rows: &[Row]) -> serde_json::Value {
    serde_json::Value::Array(rows.iter().map(Row::to_json).collect())
}

pub fn outputs_json(outputs: &[OperationOutput]) -> serde_json::Value {
    serde_json::Value::Array(outputs.iter().map(OperationOutput::to_json).collect())
}
