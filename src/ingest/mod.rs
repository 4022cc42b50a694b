//! Local staging loads
//!
//! Reads JSON source files from the local filesystem and maps each record
//! onto the columns of a staging table, following the rules of Redshift's
//! JSON COPY:
//! - a file may hold one object or many concatenated/newline-delimited objects
//! - `auto` matches object keys to column names (case-insensitive here)
//! - a jsonpaths file maps one path per column, by position
//!
//! Used by the embedded backend, which has no access to object storage.

mod error;
mod jsonpath;

pub use error::IngestError;
pub use jsonpath::{JsonPath, JsonPathsFile};

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;

use crate::catalog::{ColumnDef, ColumnType, JsonFormat, TableDef};

/// Counters for one staging load
#[derive(Debug, Clone, Default)]
pub struct IngestStats {
    pub files_processed: usize,
    pub records_ingested: usize,
    pub bytes_processed: u64,
    pub duration: Duration,
}

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records per second, zero for an instant load
    pub fn throughput(&self) -> f64 {
        match self.duration.as_secs_f64() {
            secs if secs > 0.0 => self.records_ingested as f64 / secs,
            _ => 0.0,
        }
    }

    /// Elapsed time as `1h 2m 3s`, omitting leading zero units
    pub fn duration_string(&self) -> String {
        let total = self.duration.as_secs();
        let (h, m, s) = (total / 3600, total / 60 % 60, total % 60);
        match (h, m) {
            (0, 0) => format!("{}s", s),
            (0, _) => format!("{}m {}s", m, s),
            _ => format!("{}h {}m {}s", h, m, s),
        }
    }
}

/// A discovered source file
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub size: u64,
}

/// Discover the files behind a load source
///
/// The source may be a single file, a directory (all `*.json` files below
/// it) or a glob pattern. Files are returned sorted by path.
pub fn discover_local_files(source: &str) -> Result<Vec<DiscoveredFile>, IngestError> {
    if is_remote(source) {
        return Err(IngestError::UnsupportedSource(source.to_string()));
    }

    let path = Path::new(source);
    let pattern = if path.is_file() {
        let metadata = fs::metadata(path)?;
        return Ok(vec![DiscoveredFile {
            path: path.to_path_buf(),
            size: metadata.len(),
        }]);
    } else if path.is_dir() {
        format!("{}/**/*.json", source.trim_end_matches('/'))
    } else {
        source.to_string()
    };

    let entries = glob::glob(&pattern)
        .map_err(|e| IngestError::InvalidPattern(format!("{}: {}", pattern, e)))?;

    let mut files = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) => {
                if path.is_file() {
                    let metadata = fs::metadata(&path)?;
                    files.push(DiscoveredFile {
                        path,
                        size: metadata.len(),
                    });
                }
            }
            Err(e) => {
                tracing::warn!("Error accessing path: {}", e);
            }
        }
    }

    if files.is_empty() {
        return Err(IngestError::NoFiles(source.to_string()));
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(files)
}

/// Parse all JSON objects in a file
pub fn parse_records(path: &Path) -> Result<Vec<Value>, IngestError> {
    let content = fs::read_to_string(path)?;
    let stream = serde_json::Deserializer::from_str(&content).into_iter::<Value>();

    let mut records = Vec::new();
    for (index, item) in stream.enumerate() {
        let value = item.map_err(|e| IngestError::JsonParse {
            path: path.to_path_buf(),
            record: index,
            error: e.to_string(),
        })?;

        if !value.is_object() {
            return Err(IngestError::JsonParse {
                path: path.to_path_buf(),
                record: index,
                error: "top-level value is not an object".to_string(),
            });
        }

        records.push(value);
    }

    Ok(records)
}

enum Mapping {
    Auto,
    Paths(Vec<JsonPath>),
}

/// Maps JSON records onto the columns of a staging table
pub struct RecordMapper {
    columns: &'static [ColumnDef],
    mapping: Mapping,
}

impl RecordMapper {
    /// Build a mapper; a jsonpaths format is read from the local filesystem
    pub fn new(table: &'static TableDef, format: &JsonFormat) -> Result<Self, IngestError> {
        let mapping = match format {
            JsonFormat::Auto => Mapping::Auto,
            JsonFormat::JsonPaths(location) => {
                if is_remote(location) {
                    return Err(IngestError::UnsupportedSource(location.clone()));
                }
                let content = fs::read_to_string(location)?;
                let paths = JsonPathsFile::parse(&content)?;
                if paths.len() != table.columns.len() {
                    return Err(IngestError::JsonPathsMismatch {
                        expected: table.columns.len(),
                        found: paths.len(),
                    });
                }
                Mapping::Paths(paths)
            }
        };

        Ok(Self {
            columns: table.columns,
            mapping,
        })
    }

    /// Column values for one record, as text, in column order
    pub fn map(&self, record: &Value) -> Vec<Option<String>> {
        match &self.mapping {
            Mapping::Auto => {
                let keys: HashMap<String, &Value> = record
                    .as_object()
                    .map(|obj| {
                        obj.iter()
                            .map(|(k, v)| (k.to_lowercase(), v))
                            .collect()
                    })
                    .unwrap_or_default();

                self.columns
                    .iter()
                    .map(|c| {
                        keys.get(&c.name.to_lowercase())
                            .and_then(|v| value_to_text(v, c.ty))
                    })
                    .collect()
            }
            Mapping::Paths(paths) => self
                .columns
                .iter()
                .zip(paths)
                .map(|(c, p)| p.extract(record).and_then(|v| value_to_text(v, c.ty)))
                .collect(),
        }
    }
}

fn value_to_text(value: &Value, ty: ColumnType) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() && !ty.is_text() => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn is_remote(location: &str) -> bool {
    location.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Table;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_ingest_stats() {
        let mut stats = IngestStats::new();
        stats.records_ingested = 1000;
        stats.duration = Duration::from_secs(10);
        assert_eq!(stats.throughput(), 100.0);
        assert_eq!(stats.duration_string(), "10s");

        stats.duration = Duration::from_secs(3661);
        assert_eq!(stats.duration_string(), "1h 1m 1s");
    }

    #[test]
    fn test_discover_directory_recursively() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("A/B")).unwrap();
        fs::write(dir.path().join("A/B/TRAAA.json"), "{}").unwrap();
        fs::write(dir.path().join("A/TRAAB.json"), "{}").unwrap();
        fs::write(dir.path().join("notes.txt"), "skip").unwrap();

        let files = discover_local_files(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].path.ends_with("A/B/TRAAA.json"));
    }

    #[test]
    fn test_discover_rejects_remote_and_empty() {
        assert!(matches!(
            discover_local_files("s3://udacity-dend/log_data"),
            Err(IngestError::UnsupportedSource(_))
        ));

        let dir = TempDir::new().unwrap();
        assert!(matches!(
            discover_local_files(dir.path().to_str().unwrap()),
            Err(IngestError::NoFiles(_))
        ));
    }

    #[test]
    fn test_parse_newline_delimited_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("2018-11-01-events.json");
        let mut file = File::create(&path).unwrap();
        writeln!(file, r#"{{"page": "Home"}}"#).unwrap();
        writeln!(file, r#"{{"page": "NextSong"}}"#).unwrap();

        let records = parse_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["page"], "NextSong");
    }

    #[test]
    fn test_parse_rejects_non_objects() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(
            parse_records(&path),
            Err(IngestError::JsonParse { record: 0, .. })
        ));
    }

    #[test]
    fn test_auto_mapping_is_case_insensitive() {
        let mapper = RecordMapper::new(Table::StagingEvents.definition(), &JsonFormat::Auto).unwrap();
        let record = serde_json::json!({
            "firstName": "Walter",
            "USERID": "39",
            "ts": 1541105830796u64,
            "sessionId": "",
            "length": null
        });

        let values = mapper.map(&record);
        let def = Table::StagingEvents.definition();
        let get = |name: &str| {
            let idx = def.columns.iter().position(|c| c.name == name).unwrap();
            values[idx].clone()
        };

        assert_eq!(values.len(), 18);
        assert_eq!(get("firstName"), Some("Walter".to_string()));
        assert_eq!(get("userId"), Some("39".to_string()));
        assert_eq!(get("ts"), Some("1541105830796".to_string()));
        assert_eq!(get("sessionId"), None);
        assert_eq!(get("length"), None);
        assert_eq!(get("artist"), None);
    }

    #[test]
    fn test_jsonpaths_mapping() {
        let dir = TempDir::new().unwrap();
        let paths_file = dir.path().join("song_paths.json");
        let paths: Vec<String> = Table::StagingSongs
            .definition()
            .columns
            .iter()
            .map(|c| format!("$['{}']", c.name))
            .collect();
        fs::write(
            &paths_file,
            serde_json::json!({ "jsonpaths": paths }).to_string(),
        )
        .unwrap();

        let format = JsonFormat::JsonPaths(paths_file.display().to_string());
        let mapper = RecordMapper::new(Table::StagingSongs.definition(), &format).unwrap();
        let values = mapper.map(&serde_json::json!({
            "song_id": "SOUPIRU12A6D4FA1E1",
            "num_songs": 1,
            "duration": 152.92036
        }));

        assert_eq!(values[0], Some("SOUPIRU12A6D4FA1E1".to_string()));
        assert_eq!(values[1], Some("1".to_string()));
        assert_eq!(values[8], Some("152.92036".to_string()));
        assert_eq!(values[9], None);
    }

    #[test]
    fn test_jsonpaths_count_must_match_columns() {
        let dir = TempDir::new().unwrap();
        let paths_file = dir.path().join("short.json");
        fs::write(&paths_file, r#"{"jsonpaths": ["$['artist']"]}"#).unwrap();

        let format = JsonFormat::JsonPaths(paths_file.display().to_string());
        assert!(matches!(
            RecordMapper::new(Table::StagingEvents.definition(), &format),
            Err(IngestError::JsonPathsMismatch {
                expected: 18,
                found: 1
            })
        ));
    }
}
