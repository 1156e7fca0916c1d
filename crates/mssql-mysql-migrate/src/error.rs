//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source database (MSSQL) driver error.
    #[error("Source database error: {0}")]
    Source(#[from] tiberius::error::Error),

    /// Target database (MySQL) driver error.
    #[error("Target database error: {0}")]
    Target(#[from] mysql_async::Error),

    /// Connection pool error with context.
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Catalog introspection or table enumeration query failed.
    /// Fatal to the phase that issued it.
    #[error("Catalog query failed: {0}")]
    Introspection(String),

    /// A CREATE TABLE execution failed. Tables created before the failure
    /// are left in place.
    #[error("Schema migration failed for table {table}: {message}")]
    Schema { table: String, message: String },

    /// A single table's copy task failed (cursor open, row scan, or
    /// insert). Local to that table; other tasks are unaffected.
    #[error("Copy failed for table {table}: {message}")]
    Copy { table: String, message: String },

    /// One or more table copy tasks failed; reported by the driver after
    /// all scheduled outcomes have been drained.
    #[error("Migration failed for {} table(s): {}", tables.len(), tables.join(", "))]
    Failed { tables: Vec<String> },

    /// Fewer outcomes arrived than tasks were scheduled. Indicates a copy
    /// task ended without reporting, e.g. a panic before completion.
    #[error("{missing} copy task(s) ended without reporting an outcome")]
    OutcomeLost { missing: usize },

    /// IO error (file operations).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML deserialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl MigrateError {
    /// Create a Pool error with context about where it occurred.
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Copy error for a specific table.
    pub fn copy(table: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Copy {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Format error with full details including the error chain.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }

    /// Process exit code for this error class.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => 2,
            MigrateError::Source(_) | MigrateError::Target(_) | MigrateError::Pool { .. } => 3,
            MigrateError::Introspection(_) => 4,
            MigrateError::Schema { .. } => 5,
            MigrateError::Copy { .. }
            | MigrateError::Failed { .. }
            | MigrateError::OutcomeLost { .. } => 6,
            MigrateError::Io(_) => 7,
        }
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
