//! Migration driver - runs the schema and data phases in order.

use crate::config::Config;
use crate::error::Result;
use crate::source::MssqlPool;
use crate::target::{table_ddl, MysqlPool};
use crate::transfer::{filter_excluded, CopyEngine, CopySummary};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Migration driver. Owns both pools for the lifetime of a run.
pub struct Orchestrator {
    config: Config,
    source: Arc<MssqlPool>,
    target: Arc<MysqlPool>,
}

/// Result of a completed migration run.
#[derive(Debug, Clone)]
pub struct MigrationResult {
    /// Tables created by the schema phase (0 when the phase was skipped).
    pub tables_created: usize,

    /// Duration of the schema phase, when it ran.
    pub schema_elapsed: Option<Duration>,

    /// Data phase summary.
    pub summary: CopySummary,

    /// Duration of the data phase.
    pub data_elapsed: Duration,
}

impl Orchestrator {
    /// Connect both databases. Any connection failure aborts before any
    /// work starts.
    pub async fn new(config: Config) -> Result<Self> {
        let source = MssqlPool::new(
            config.source.clone(),
            config.migration.max_source_connections,
        )
        .await?;

        let target = MysqlPool::new(&config.target, config.migration.max_target_connections).await?;

        Ok(Self {
            config,
            source: Arc::new(source),
            target: Arc::new(target),
        })
    }

    /// Run the migration: optional schema phase, then the data phase.
    pub async fn run(&self) -> Result<MigrationResult> {
        let mut tables_created = 0;
        let mut schema_elapsed = None;

        if self.config.migration.migrate_schema {
            info!("Running schema migration phase");
            let started = Instant::now();
            tables_created = self.migrate_schema().await?;
            let elapsed = started.elapsed();
            info!(
                "Schema phase completed: {} tables in {}",
                tables_created,
                format_duration(elapsed)
            );
            schema_elapsed = Some(elapsed);
        }

        info!("Running data migration phase");
        let started = Instant::now();
        let summary = self.copy_data().await?;
        let data_elapsed = started.elapsed();
        info!(
            "Data phase completed: {} tables, {} rows in {}",
            summary.tables_succeeded,
            summary.rows_copied,
            format_duration(data_elapsed)
        );

        Ok(MigrationResult {
            tables_created,
            schema_elapsed,
            summary,
            data_elapsed,
        })
    }

    /// Introspect the source catalog and create each table on the target,
    /// sequentially, in alphabetical table order. The first DDL failure
    /// aborts the phase; tables already created stay.
    async fn migrate_schema(&self) -> Result<usize> {
        let schema = self.source.introspect_columns().await?;

        for (table, columns) in schema.iter() {
            let ddl = table_ddl(table, columns);
            debug!("Creating table: {}", table);
            self.target.exec_ddl(table, &ddl).await?;
        }

        Ok(schema.len())
    }

    /// Enumerate base tables, drop the excluded ones and hand the rest to
    /// the copy engine.
    async fn copy_data(&self) -> Result<CopySummary> {
        let tables = self.source.list_tables().await?;

        let excluded: HashSet<String> = self
            .config
            .migration
            .exclude_tables
            .iter()
            .cloned()
            .collect();
        let tables = filter_excluded(tables, &excluded);

        info!(
            "Copying {} tables with up to {} concurrent tasks",
            tables.len(),
            self.config.migration.max_tasks
        );

        let engine = CopyEngine::new(
            self.source.clone(),
            self.target.clone(),
            self.config.migration.max_tasks,
        );
        engine.run(tables).await
    }

    /// Close the target pool cleanly. The source pool closes on drop.
    pub async fn close(&self) {
        self.target.disconnect().await;
    }
}

/// Format a duration as `HHh MMm SSs`, rounded to whole seconds.
pub fn format_duration(d: Duration) -> String {
    let total = d.as_secs() + u64::from(d.subsec_millis() >= 500);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{:02}h {:02}m {:02}s", hours, minutes, seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_duration_whole_units() {
        assert_eq!(format_duration(Duration::from_secs(0)), "00h 00m 00s");
        assert_eq!(format_duration(Duration::from_secs(59)), "00h 00m 59s");
        assert_eq!(format_duration(Duration::from_secs(61)), "00h 01m 01s");
        assert_eq!(format_duration(Duration::from_secs(3_723)), "01h 02m 03s");
    }

    #[test]
    fn format_duration_rounds_to_nearest_second() {
        assert_eq!(format_duration(Duration::from_millis(1_499)), "00h 00m 01s");
        assert_eq!(format_duration(Duration::from_millis(1_500)), "00h 00m 02s");
    }
}
