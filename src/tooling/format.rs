//! Render replies as JSON or as tables.

use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;
use serde_json::Value;

/// Output format of the CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Json,
    Table,
}

/// Section heading in bold/underline.
pub fn format_section_heading(title: &str) -> String {
    format!("{}", title.bold().underline())
}

/// Scalars as themselves, anything else as compact JSON
fn cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

/// A list of records as one row per record; columns are the keys of the first record.
pub fn records_table(records: &[Value]) -> String {
    let Some(first) = records.first().and_then(Value::as_object) else {
        let mut table = Table::new();
        table.load_preset(UTF8_BORDERS_ONLY);
        table.set_header(vec!["Value"]);
        for record in records {
            table.add_row(vec![cell(record)]);
        }
        return table.to_string();
    };
    let columns: Vec<&String> = first.keys().collect();

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(columns.iter().map(|c| c.as_str()).collect::<Vec<_>>());
    for record in records {
        table.add_row(
            columns
                .iter()
                .map(|c| record.get(c.as_str()).map(cell).unwrap_or_default())
                .collect::<Vec<_>>(),
        );
    }
    table.to_string()
}

/// One record as field/value rows
pub fn record_table(record: &serde_json::Map<String, Value>) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Field", "Value"]);
    for (field, value) in record {
        table.add_row(vec![field.clone(), cell(value)]);
    }
    table.to_string()
}

/// Render `data` in `format` under an optional heading. Trees stay JSON.
pub fn render(data: &Value, format: OutputFormat, heading: Option<&str>) -> String {
    let body = match (format, data) {
        (OutputFormat::Json, _) => {
            serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string())
        }
        (OutputFormat::Table, Value::Array(records)) => records_table(records),
        (OutputFormat::Table, Value::Object(record)) if !record.contains_key("__path__") => {
            record_table(record)
        }
        (OutputFormat::Table, other) => {
            serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string())
        }
    };
    match heading {
        Some(title) if format == OutputFormat::Table => {
            format!("{}\n\n{}", format_section_heading(title), body)
        }
        _ => body,
    }
}
