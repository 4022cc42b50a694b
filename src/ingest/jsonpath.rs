//! jsonpaths expressions as used by Redshift's `FORMAT AS JSON '<file>'`
//!
//! Supports bracket notation (`$['artist']`, `$["a"]["b"]`), dot notation
//! (`$.artist.name`) and array indexes (`$.tags[0]`).

use serde::Deserialize;
use serde_json::Value;

use super::IngestError;

/// Contents of a jsonpaths file
#[derive(Debug, Deserialize)]
pub struct JsonPathsFile {
    pub jsonpaths: Vec<String>,
}

impl JsonPathsFile {
    /// Parse the file contents and compile every expression
    pub fn parse(content: &str) -> Result<Vec<JsonPath>, IngestError> {
        let file: JsonPathsFile = serde_json::from_str(content)
            .map_err(|e| IngestError::InvalidJsonPath(format!("invalid jsonpaths file: {}", e)))?;
        file.jsonpaths.iter().map(|p| JsonPath::parse(p)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

/// A compiled path expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    segments: Vec<Segment>,
}

impl JsonPath {
    pub fn parse(expr: &str) -> Result<Self, IngestError> {
        let invalid = || IngestError::InvalidJsonPath(expr.to_string());
        let chars: Vec<char> = expr.trim().chars().collect();

        if chars.first() != Some(&'$') {
            return Err(invalid());
        }

        let mut segments = Vec::new();
        let mut i = 1;
        while i < chars.len() {
            match chars[i] {
                '.' => {
                    let start = i + 1;
                    let mut end = start;
                    while end < chars.len() && chars[end] != '.' && chars[end] != '[' {
                        end += 1;
                    }
                    if end == start {
                        return Err(invalid());
                    }
                    segments.push(Segment::Key(chars[start..end].iter().collect()));
                    i = end;
                }
                '[' => {
                    let quote = *chars.get(i + 1).ok_or_else(invalid)?;
                    if quote == '\'' || quote == '"' {
                        let start = i + 2;
                        let close = (start..chars.len())
                            .find(|&j| chars[j] == quote)
                            .ok_or_else(invalid)?;
                        if chars.get(close + 1) != Some(&']') {
                            return Err(invalid());
                        }
                        segments.push(Segment::Key(chars[start..close].iter().collect()));
                        i = close + 2;
                    } else {
                        let close = (i + 1..chars.len())
                            .find(|&j| chars[j] == ']')
                            .ok_or_else(invalid)?;
                        let digits: String = chars[i + 1..close].iter().collect();
                        let index = digits.trim().parse().map_err(|_| invalid())?;
                        segments.push(Segment::Index(index));
                        i = close + 1;
                    }
                }
                _ => return Err(invalid()),
            }
        }

        if segments.is_empty() {
            return Err(invalid());
        }

        Ok(Self { segments })
    }

    /// Resolve the path against a record
    pub fn extract<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        self.segments
            .iter()
            .try_fold(value, |current, segment| match segment {
                Segment::Key(key) => current.get(key.as_str()),
                Segment::Index(index) => current.get(*index),
            })
    }
}
