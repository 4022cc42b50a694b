//! Bulk-load statements for the staging tables

use super::Table;

/// How JSON source records are mapped onto staging columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonFormat {
    /// Object keys are matched to column names
    Auto,
    /// A jsonpaths file maps paths to columns by position
    JsonPaths(String),
}

impl JsonFormat {
    /// Parse a configured value: `auto` or the location of a jsonpaths file
    pub fn parse(value: &str) -> Self {
        let value = unquote(value);
        if value.eq_ignore_ascii_case("auto") {
            JsonFormat::Auto
        } else {
            JsonFormat::JsonPaths(value.to_string())
        }
    }

    fn as_sql(&self) -> String {
        match self {
            JsonFormat::Auto => "'auto'".to_string(),
            JsonFormat::JsonPaths(path) => sql_literal(path),
        }
    }
}

/// A single COPY of external JSON files into a staging table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkLoad {
    /// Target staging table
    pub table: Table,
    /// Object storage prefix (or local path for the embedded backend)
    pub source: String,
    /// Record mapping
    pub format: JsonFormat,
    /// IAM role the warehouse assumes to read the source
    pub iam_role_arn: String,
    /// Region of the source bucket
    pub region: String,
}

impl BulkLoad {
    pub fn new(
        table: Table,
        source: impl Into<String>,
        format: JsonFormat,
        iam_role_arn: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            table,
            source: unquote(&source.into()).to_string(),
            format,
            iam_role_arn: unquote(&iam_role_arn.into()).to_string(),
            region: unquote(&region.into()).to_string(),
        }
    }

    /// Render the Redshift COPY statement
    pub fn to_copy_sql(&self) -> String {
        format!(
            "COPY {} FROM {}\n    CREDENTIALS {}\n    FORMAT AS JSON {}\n    COMPUPDATE OFF REGION {}",
            self.table.ident(),
            sql_literal(&self.source),
            sql_literal(&format!("aws_iam_role={}", self.iam_role_arn)),
            self.format.as_sql(),
            sql_literal(&self.region),
        )
    }
}

impl std::fmt::Display for BulkLoad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <- {}", self.table, self.source)
    }
}

/// Quote a value as an SQL string literal
pub fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Strip one pair of surrounding single quotes, as found in legacy INI configs
fn unquote(value: &str) -> &str {
    let trimmed = value.trim();
    trimmed
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .unwrap_or(trimmed)
}
