//! Configuration type definitions.

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (MSSQL).
    pub source: SourceConfig,

    /// Target database configuration (MySQL).
    pub target: TargetConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Source database (MSSQL) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 1433).
    #[serde(default = "default_mssql_port")]
    pub port: u16,

    /// Database name. Also used as the catalog name when enumerating
    /// tables from INFORMATION_SCHEMA.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    pub password: String,

    /// Encrypt connection (default: true).
    #[serde(default = "default_true")]
    pub encrypt: bool,

    /// Trust server certificate (default: false).
    #[serde(default)]
    pub trust_server_cert: bool,
}

/// Target database (MySQL) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 3306).
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    pub password: String,
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Run the schema-creation phase before copying data (default: false).
    /// Overridable from the CLI with `--schemas yes`.
    #[serde(default)]
    pub migrate_schema: bool,

    /// Maximum number of table copy tasks running at once (default: 150).
    #[serde(default = "default_max_tasks")]
    pub max_tasks: usize,

    /// Table names to skip entirely.
    #[serde(default)]
    pub exclude_tables: Vec<String>,

    /// Maximum MSSQL connections (default: 16).
    #[serde(default = "default_source_connections")]
    pub max_source_connections: u32,

    /// Maximum MySQL connections (default: 16).
    #[serde(default = "default_target_connections")]
    pub max_target_connections: usize,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            migrate_schema: false,
            max_tasks: default_max_tasks(),
            exclude_tables: Vec::new(),
            max_source_connections: default_source_connections(),
            max_target_connections: default_target_connections(),
        }
    }
}

// Default value functions for serde

fn default_mssql_port() -> u16 {
    1433
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_max_tasks() -> usize {
    150
}

fn default_source_connections() -> u32 {
    16
}

fn default_target_connections() -> usize {
    16
}

fn default_true() -> bool {
    true
}
