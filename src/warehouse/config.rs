//! ETL configuration file support
//!
//! Handles parsing of the `dwh.toml` configuration file and environment
//! variable overrides. The configuration is loaded once and passed to the
//! components that need connection details or source locations.

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{WarehouseError, WarehouseResult};
use crate::catalog::Dialect;

/// Default configuration filename
pub const CONFIG_FILENAME: &str = "dwh.toml";

/// DuckDB path selecting an in-memory database
pub const IN_MEMORY_PATH: &str = ":memory:";

/// Default Redshift port
pub const DEFAULT_PORT: u16 = 5439;

/// Default region of the source bucket
pub const DEFAULT_REGION: &str = "us-west-2";

/// Environment variable for the warehouse backend
pub const ENV_BACKEND: &str = "SONGPLAY_ETL_BACKEND";

/// Environment variable for the DuckDB path
pub const ENV_DUCKDB_PATH: &str = "SONGPLAY_ETL_DUCKDB_PATH";

/// Environment variable for the cluster host
pub const ENV_HOST: &str = "SONGPLAY_ETL_HOST";

/// Environment variable for the cluster password
pub const ENV_PASSWORD: &str = "SONGPLAY_ETL_PASSWORD";

/// Environment variable for the IAM role ARN
pub const ENV_IAM_ROLE_ARN: &str = "SONGPLAY_ETL_IAM_ROLE_ARN";

/// Environment variable for the source bucket region
pub const ENV_REGION: &str = "SONGPLAY_ETL_REGION";

/// Warehouse backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarehouseBackendType {
    /// Amazon Redshift cluster (default)
    #[default]
    Redshift,
    /// DuckDB embedded database
    #[serde(rename = "duckdb")]
    DuckDb,
}

impl WarehouseBackendType {
    /// SQL dialect spoken by the backend
    pub fn dialect(&self) -> Dialect {
        match self {
            WarehouseBackendType::Redshift => Dialect::Redshift,
            WarehouseBackendType::DuckDb => Dialect::DuckDb,
        }
    }
}

impl std::str::FromStr for WarehouseBackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "redshift" | "postgres" | "postgresql" => Ok(WarehouseBackendType::Redshift),
            "duckdb" => Ok(WarehouseBackendType::DuckDb),
            _ => Err(format!(
                "Unknown warehouse backend: {}. Use 'redshift' or 'duckdb'.",
                s
            )),
        }
    }
}

impl std::fmt::Display for WarehouseBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WarehouseBackendType::Redshift => write!(f, "redshift"),
            WarehouseBackendType::DuckDb => write!(f, "duckdb"),
        }
    }
}

/// Warehouse selection section
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WarehouseSection {
    /// Backend type
    #[serde(default)]
    pub backend: WarehouseBackendType,

    /// Path to the DuckDB database file, or `:memory:`
    #[serde(default)]
    pub path: String,
}

/// Cluster connection section
#[derive(Clone, Serialize, Deserialize)]
pub struct ClusterSection {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub dbname: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for ClusterSection {
    fn default() -> Self {
        Self {
            host: String::new(),
            dbname: String::new(),
            user: String::new(),
            password: String::new(),
            port: DEFAULT_PORT,
        }
    }
}

// Keeps the password out of logs and error messages.
impl std::fmt::Debug for ClusterSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterSection")
            .field("host", &self.host)
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("password", &"****")
            .field("port", &self.port)
            .finish()
    }
}

/// IAM role used by the warehouse to read the sources
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IamRoleSection {
    #[serde(default)]
    pub arn: String,
}

/// Source locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Section {
    /// Event log files
    #[serde(default)]
    pub log_data: String,

    /// jsonpaths file shaping the event log load
    #[serde(default = "default_json_format")]
    pub log_jsonpath: String,

    /// Song metadata files
    #[serde(default)]
    pub song_data: String,

    /// jsonpaths file for the song load, or `auto`
    #[serde(default = "default_json_format")]
    pub song_jsonpath: String,

    /// Region of the source bucket
    #[serde(default = "default_region")]
    pub region: String,
}

fn default_json_format() -> String {
    "auto".to_string()
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

impl Default for S3Section {
    fn default() -> Self {
        Self {
            log_data: String::new(),
            log_jsonpath: default_json_format(),
            song_data: String::new(),
            song_jsonpath: default_json_format(),
            region: default_region(),
        }
    }
}

/// Pipeline behaviour section
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PipelineSection {
    /// Run all steps in one transaction instead of committing each one
    #[serde(default)]
    pub transactional: bool,
}

/// Main configuration structure
///
/// Represents the `dwh.toml` configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EtlConfig {
    #[serde(default)]
    pub warehouse: WarehouseSection,

    #[serde(default)]
    pub cluster: ClusterSection,

    #[serde(default)]
    pub iam_role: IamRoleSection,

    #[serde(default)]
    pub s3: S3Section,

    #[serde(default)]
    pub pipeline: PipelineSection,
}

impl EtlConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration for an embedded DuckDB warehouse loading local files
    pub fn duckdb(path: impl Into<String>, log_data: &str, song_data: &str) -> Self {
        Self {
            warehouse: WarehouseSection {
                backend: WarehouseBackendType::DuckDb,
                path: path.into(),
            },
            s3: S3Section {
                log_data: log_data.to_string(),
                song_data: song_data.to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Load configuration from a file and apply environment overrides
    pub fn load(path: &Path) -> WarehouseResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            WarehouseError::IoError(format!("Failed to read config {}: {}", path.display(), e))
        })?;

        let mut config = Self::parse(&content)?;
        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> WarehouseResult<Self> {
        toml::from_str(content)
            .map_err(|e| WarehouseError::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Convert configuration to TOML string
    pub fn to_toml(&self) -> WarehouseResult<String> {
        toml::to_string_pretty(self).map_err(|e| {
            WarehouseError::SerializationError(format!("Failed to serialize config: {}", e))
        })
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(backend) = std::env::var(ENV_BACKEND)
            && let Ok(backend_type) = backend.parse()
        {
            self.warehouse.backend = backend_type;
        }

        if let Ok(path) = std::env::var(ENV_DUCKDB_PATH) {
            self.warehouse.path = path;
        }

        if let Ok(host) = std::env::var(ENV_HOST) {
            self.cluster.host = host;
        }

        if let Ok(password) = std::env::var(ENV_PASSWORD) {
            self.cluster.password = password;
        }

        if let Ok(arn) = std::env::var(ENV_IAM_ROLE_ARN) {
            self.iam_role.arn = arn;
        }

        if let Ok(region) = std::env::var(ENV_REGION) {
            self.s3.region = region;
        }
    }

    /// Check that everything the selected backend needs is present
    pub fn validate(&self) -> WarehouseResult<()> {
        let mut missing = Vec::new();

        if self.s3.log_data.is_empty() {
            missing.push("s3.log_data");
        }
        if self.s3.song_data.is_empty() {
            missing.push("s3.song_data");
        }

        if self.warehouse.backend == WarehouseBackendType::Redshift {
            if self.cluster.host.is_empty() {
                missing.push("cluster.host");
            }
            if self.cluster.dbname.is_empty() {
                missing.push("cluster.dbname");
            }
            if self.cluster.user.is_empty() {
                missing.push("cluster.user");
            }
            if self.iam_role.arn.is_empty() {
                missing.push("iam_role.arn");
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(WarehouseError::ConfigError(format!(
                "Missing required settings: {}",
                missing.join(", ")
            )))
        }
    }

    /// SQL dialect of the configured backend
    pub fn dialect(&self) -> Dialect {
        self.warehouse.backend.dialect()
    }
}

/// Generate a sample configuration file content
pub fn sample_config() -> &'static str {
    r#"# songplay-etl configuration

[warehouse]
# Warehouse backend: "redshift" (default) or "duckdb"
backend = "redshift"

# Path to the DuckDB database file (duckdb backend only), or ":memory:"
# path = "songplays.duckdb"

[cluster]
host = "dwhcluster.abc123.us-west-2.redshift.amazonaws.com"
dbname = "dwh"
user = "dwhuser"
password = "change-me"
port = 5439

[iam_role]
arn = "arn:aws:iam::123456789012:role/dwhRole"

[s3]
log_data = "s3://udacity-dend/log_data"
log_jsonpath = "s3://udacity-dend/log_json_path.json"
song_data = "s3://udacity-dend/song_data"
song_jsonpath = "auto"
region = "us-west-2"

[pipeline]
# Wrap the whole run in one transaction instead of committing each statement
transactional = false
"#
}
