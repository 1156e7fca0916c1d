//! # mssql-mysql-migrate
//!
//! Bulk MSSQL to MySQL database copy library.
//!
//! Copies the entire contents (and optionally the schema) of a SQL Server
//! database into a MySQL database, table by table, with:
//!
//! - **Bounded concurrency**: one tokio task per table, gated by a
//!   semaphore (default 150 permits)
//! - **Row streaming**: rows flow from the source cursor straight into
//!   per-row INSERTs on the target, preserving cursor order per table
//! - **Fixed type mapping** from MSSQL type names to MySQL types
//! - **Fail-fast aggregation**: the first failed table dooms the run, but
//!   in-flight tasks drain before the error is returned
//!
//! ## Example
//!
//! ```rust,no_run
//! use mssql_mysql_migrate::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::new(config).await?;
//!     let result = orchestrator.run().await?;
//!     println!("Copied {} rows", result.summary.rows_copied);
//!     orchestrator.close().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod orchestrator;
pub mod source;
pub mod target;
pub mod transfer;
pub mod typemap;

// Re-exports for convenient access
pub use crate::core::{ColumnDescriptor, SqlValue, TableSchema};
pub use config::{Config, MigrationConfig, SourceConfig, TargetConfig};
pub use error::{MigrateError, Result};
pub use orchestrator::{format_duration, MigrationResult, Orchestrator};
pub use source::MssqlPool;
pub use target::MysqlPool;
pub use transfer::{CopyEngine, CopySummary, ResultAggregator, TableOutcome, TaskState};
