//! Rendering of query results for the terminal

use std::fmt::Write;

use serde_json::Value;

use super::QueryResult;

/// Output format for query results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Aligned columns with a header rule
    #[default]
    Table,
    Json,
    Csv,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Table => "table",
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [OutputFormat::Table, OutputFormat::Json, OutputFormat::Csv]
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown output format: {}. Use table, json or csv.", s))
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Render a result in the requested format
pub fn format_query_result(result: &QueryResult, format: OutputFormat) -> String {
    match format {
        OutputFormat::Table => render_table(result),
        OutputFormat::Csv => render_csv(result),
        OutputFormat::Json => match serde_json::to_string_pretty(&result.rows) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("Failed to serialize rows: {}", e);
                "[]".to_string()
            }
        },
    }
}

/// Cell text for table output; nulls are spelled out
fn cell(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// CSV field; nulls are empty, text is quoted when it needs to be
fn csv_field(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) if s.contains([',', '"', '\n', '\r']) => {
            format!("\"{}\"", s.replace('"', "\"\""))
        }
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn render_csv(result: &QueryResult) -> String {
    let mut out = result.columns.join(",");
    out.push('\n');
    for row in 0..result.row_count() {
        let fields: Vec<String> = result
            .columns
            .iter()
            .map(|c| csv_field(result.value(row, c)))
            .collect();
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

fn render_table(result: &QueryResult) -> String {
    if result.is_empty() {
        return "(0 rows)".to_string();
    }

    let grid: Vec<Vec<String>> = (0..result.row_count())
        .map(|row| {
            result
                .columns
                .iter()
                .map(|c| cell(result.value(row, c)))
                .collect()
        })
        .collect();

    let widths: Vec<usize> = result
        .columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            grid.iter()
                .map(|cells| cells[i].chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |cells: &[String]| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(text, &width)| format!("{:<width$}", text))
            .collect::<Vec<_>>()
            .join(" | ")
    };

    let mut out = String::new();
    let _ = writeln!(out, "{}", line(&result.columns));
    let rule: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    let _ = writeln!(out, "{}", rule.join("-+-"));
    for cells in &grid {
        let _ = writeln!(out, "{}", line(cells));
    }
    let _ = write!(out, "({} rows)", result.row_count());
    out
}
