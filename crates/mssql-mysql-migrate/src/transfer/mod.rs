//! Per-table copy engine with bounded concurrency.
//!
//! Each included table runs as an independent tokio task. A task acquires
//! an owned semaphore permit before it is spawned (the scheduling loop
//! blocks while the pool is saturated) and releases it on every exit path,
//! including a panic, because the permit is owned by the task. Outcomes
//! flow back over an mpsc channel in arrival order and are folded by the
//! [`ResultAggregator`].

use crate::core::SqlValue;
use crate::error::{MigrateError, Result};
use crate::source::{scan_row, MssqlPool, SourceConn};
use crate::target::{insert_sql, to_mysql_value, MysqlPool, RowSink};
use futures::TryStreamExt;
use mysql_async::Conn;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tiberius::QueryItem;
use tokio::sync::{mpsc, Semaphore};
use tracing::{error, info};

/// Lifecycle of one table copy task. Terminal states are final; a task is
/// never retried or reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// Result of one table copy task.
#[derive(Debug)]
pub struct TableOutcome {
    /// Table the task copied.
    pub table: String,

    /// Terminal state (Succeeded or Failed).
    pub state: TaskState,

    /// Rows written before completion or failure. A failed task reports
    /// the rows it had already inserted.
    pub rows: u64,

    /// Wall-clock duration of the task.
    pub elapsed: Duration,

    /// The table-local error, if the task failed.
    pub error: Option<MigrateError>,
}

/// Summary of a completed data phase.
#[derive(Debug, Clone)]
pub struct CopySummary {
    /// Tasks scheduled (enumerated, non-excluded tables).
    pub tables_total: usize,

    /// Tables copied completely.
    pub tables_succeeded: usize,

    /// Total rows written across all succeeded tables.
    pub rows_copied: u64,
}

/// Drop excluded names from the enumerated table list, preserving order.
pub fn filter_excluded(tables: Vec<String>, excluded: &HashSet<String>) -> Vec<String> {
    tables
        .into_iter()
        .filter(|t| !excluded.contains(t))
        .collect()
}

/// Schedule one task per table with at most `capacity` running at once.
///
/// Returns the number of scheduled tasks and the outcome channel. The
/// sender side is dropped once every task is spawned, so the receiver
/// terminates after the last outcome even if a task dies without sending.
pub(crate) async fn spawn_bounded<F, Fut>(
    tables: Vec<String>,
    capacity: usize,
    task: F,
) -> (usize, mpsc::UnboundedReceiver<TableOutcome>)
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = TableOutcome> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(capacity));
    let (tx, rx) = mpsc::unbounded_channel();
    let scheduled = tables.len();

    for table in tables {
        // Blocks the scheduling loop while the pool is saturated. The
        // semaphore is never closed, so acquire cannot fail.
        let permit = semaphore.clone().acquire_owned().await.unwrap();
        let fut = task(table);
        let tx = tx.clone();

        tokio::spawn(async move {
            let outcome = fut.await;
            let _ = tx.send(outcome);
            drop(permit);
        });
    }

    (scheduled, rx)
}

/// Collects exactly one outcome per scheduled task and decides the fate of
/// the run.
///
/// Failures do not cancel tasks still in flight; the run is doomed from
/// the first failed outcome, but draining continues until every scheduled
/// task has reported so the outcome count stays consistent.
pub struct ResultAggregator {
    expected: usize,
    received: usize,
    succeeded: usize,
    rows_copied: u64,
    failed_tables: Vec<String>,
}

impl ResultAggregator {
    /// Create an aggregator expecting one outcome per scheduled task.
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            received: 0,
            succeeded: 0,
            rows_copied: 0,
            failed_tables: Vec::new(),
        }
    }

    /// Record one task outcome.
    pub fn record(&mut self, outcome: TableOutcome) {
        self.received += 1;
        match outcome.error {
            None => {
                self.succeeded += 1;
                self.rows_copied += outcome.rows;
                info!(
                    "{}: copied {} rows in {:.1}s",
                    outcome.table,
                    outcome.rows,
                    outcome.elapsed.as_secs_f64()
                );
            }
            Some(err) => {
                error!("{}: {}", outcome.table, err);
                self.failed_tables.push(outcome.table);
            }
        }
    }

    /// True once a failed outcome has been observed.
    pub fn has_failure(&self) -> bool {
        !self.failed_tables.is_empty()
    }

    /// Close the aggregation: verify the outcome count and either return
    /// the summary or escalate the recorded failures.
    pub fn finish(self) -> Result<CopySummary> {
        if !self.failed_tables.is_empty() {
            return Err(MigrateError::Failed {
                tables: self.failed_tables,
            });
        }

        if self.received < self.expected {
            return Err(MigrateError::OutcomeLost {
                missing: self.expected - self.received,
            });
        }

        Ok(CopySummary {
            tables_total: self.expected,
            tables_succeeded: self.succeeded,
            rows_copied: self.rows_copied,
        })
    }
}

/// Copies every included table from source to target.
pub struct CopyEngine {
    source: Arc<MssqlPool>,
    target: Arc<MysqlPool>,
    max_tasks: usize,
}

impl CopyEngine {
    /// Create a copy engine with the given concurrency bound.
    pub fn new(source: Arc<MssqlPool>, target: Arc<MysqlPool>, max_tasks: usize) -> Self {
        Self {
            source,
            target,
            max_tasks,
        }
    }

    /// Copy all listed tables and aggregate the outcomes.
    pub async fn run(&self, tables: Vec<String>) -> Result<CopySummary> {
        let source = self.source.clone();
        let target = self.target.clone();

        let (scheduled, mut outcomes) = spawn_bounded(tables, self.max_tasks, move |table| {
            let source = source.clone();
            let target = target.clone();
            async move { copy_table(source, target, table).await }
        })
        .await;

        let mut aggregator = ResultAggregator::new(scheduled);
        while let Some(outcome) = outcomes.recv().await {
            aggregator.record(outcome);
        }
        aggregator.finish()
    }
}

/// Run one table copy task to its terminal state. Never panics on copy
/// errors; they are folded into the outcome.
async fn copy_table(
    source: Arc<MssqlPool>,
    target: Arc<MysqlPool>,
    table: String,
) -> TableOutcome {
    info!("Starting copy for table: {}", table);
    let started = Instant::now();

    match copy_table_rows(&source, &target, &table).await {
        Ok(rows) => TableOutcome {
            table,
            state: TaskState::Succeeded,
            rows,
            elapsed: started.elapsed(),
            error: None,
        },
        Err((rows, err)) => TableOutcome {
            table,
            state: TaskState::Failed,
            rows,
            elapsed: started.elapsed(),
            error: Some(err),
        },
    }
}

/// Writes scanned rows to a [`RowSink`], one INSERT per row, in the order
/// they are handed in. The INSERT statement is built from the first
/// column count seen and reused for every row.
pub(crate) struct RowWriter<'a, S: RowSink> {
    table: &'a str,
    sink: &'a mut S,
    insert: Option<String>,
    rows: u64,
}

impl<'a, S: RowSink> RowWriter<'a, S> {
    pub(crate) fn new(table: &'a str, sink: &'a mut S) -> Self {
        Self {
            table,
            sink,
            insert: None,
            rows: 0,
        }
    }

    /// Build the INSERT statement ahead of the first row, from the result
    /// metadata. A no-op once the statement exists.
    pub(crate) fn prepare(&mut self, column_count: usize) {
        if self.insert.is_none() {
            self.insert = Some(insert_sql(self.table, column_count));
        }
    }

    /// Write one row. Rows reach the sink in call order.
    pub(crate) async fn write_row(&mut self, cells: Vec<SqlValue>) -> Result<()> {
        let statement = self
            .insert
            .get_or_insert_with(|| insert_sql(self.table, cells.len()))
            .clone();

        let params: Vec<mysql_async::Value> = cells.iter().map(to_mysql_value).collect();
        self.sink
            .write(&statement, params)
            .await
            .map_err(|e| MigrateError::copy(self.table, e))?;
        self.rows += 1;
        Ok(())
    }

    /// Rows written to the sink so far.
    pub(crate) fn rows_written(&self) -> u64 {
        self.rows
    }
}

/// Stream `SELECT *` from the source and write each row to the target
/// immediately, one INSERT per row, autocommit, in cursor order. The
/// error path carries the rows already written.
async fn copy_table_rows(
    source: &MssqlPool,
    target: &MysqlPool,
    table: &str,
) -> std::result::Result<u64, (u64, MigrateError)> {
    let mut src = source.client().await.map_err(|e| (0, e))?;
    let mut dst = target
        .conn()
        .await
        .map_err(|e| (0, MigrateError::copy(table, e)))?;

    let result = stream_table(&mut src, &mut dst, table).await;
    if result.is_err() {
        // The session may hold an undrained result stream; have the pool
        // discard it instead of handing it to the next task.
        src.poison();
    }
    result
}

async fn stream_table(
    src: &mut SourceConn,
    dst: &mut Conn,
    table: &str,
) -> std::result::Result<u64, (u64, MigrateError)> {
    let select = format!("SELECT * FROM [{}]", table.replace(']', "]]"));
    let mut stream = src
        .simple_query(&select)
        .await
        .map_err(|e| (0, MigrateError::copy(table, e)))?;

    let mut writer = RowWriter::new(table, dst);

    loop {
        let item = match stream.try_next().await {
            Ok(Some(item)) => item,
            Ok(None) => break,
            Err(e) => return Err((writer.rows_written(), MigrateError::copy(table, e))),
        };

        match item {
            QueryItem::Metadata(meta) => writer.prepare(meta.columns().len()),
            QueryItem::Row(row) => {
                let cells = scan_row(&row);
                if let Err(e) = writer.write_row(cells).await {
                    return Err((writer.rows_written(), e));
                }
            }
        }
    }

    Ok(writer.rows_written())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Sink that records every write and can refuse after a set count.
    #[derive(Default)]
    struct RecordingSink {
        written: Vec<(String, Vec<mysql_async::Value>)>,
        fail_after: Option<usize>,
    }

    #[async_trait]
    impl RowSink for RecordingSink {
        async fn write(
            &mut self,
            statement: &str,
            params: Vec<mysql_async::Value>,
        ) -> std::result::Result<(), mysql_async::Error> {
            if let Some(limit) = self.fail_after {
                if self.written.len() >= limit {
                    return Err(mysql_async::Error::Other("write refused".into()));
                }
            }
            self.written.push((statement.to_string(), params));
            Ok(())
        }
    }

    fn outcome(table: &str, rows: u64, error: Option<MigrateError>) -> TableOutcome {
        let state = if error.is_none() {
            TaskState::Succeeded
        } else {
            TaskState::Failed
        };
        TableOutcome {
            table: table.into(),
            state,
            rows,
            elapsed: Duration::from_millis(5),
            error,
        }
    }

    #[test]
    fn exclusion_set_filters_tables() {
        let excluded: HashSet<String> = ["b".to_string()].into_iter().collect();
        let tables = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(filter_excluded(tables, &excluded), ["a", "c"]);
    }

    #[test]
    fn exclusion_set_can_be_empty() {
        let excluded = HashSet::new();
        let tables = vec!["a".to_string(), "b".to_string()];
        assert_eq!(filter_excluded(tables, &excluded).len(), 2);
    }

    #[test]
    fn aggregator_counts_every_outcome_once() {
        let mut agg = ResultAggregator::new(3);
        agg.record(outcome("a", 10, None));
        agg.record(outcome("b", 20, None));
        agg.record(outcome("c", 30, None));

        let summary = agg.finish().unwrap();
        assert_eq!(summary.tables_total, 3);
        assert_eq!(summary.tables_succeeded, 3);
        assert_eq!(summary.rows_copied, 60);
    }

    #[test]
    fn aggregator_escalates_first_failure_after_draining() {
        let mut agg = ResultAggregator::new(3);
        agg.record(outcome("a", 10, None));
        agg.record(outcome(
            "orders",
            499,
            Some(MigrateError::copy("orders", "write error on row 500")),
        ));
        assert!(agg.has_failure());

        // Remaining tasks still report; their results are only counted.
        agg.record(outcome("c", 30, None));

        match agg.finish() {
            Err(MigrateError::Failed { tables }) => assert_eq!(tables, ["orders"]),
            other => panic!("expected Failed, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn aggregator_detects_lost_outcomes() {
        let mut agg = ResultAggregator::new(2);
        agg.record(outcome("a", 1, None));

        match agg.finish() {
            Err(MigrateError::OutcomeLost { missing }) => assert_eq!(missing, 1),
            other => panic!("expected OutcomeLost, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn rows_are_written_in_cursor_order() {
        let mut sink = RecordingSink::default();
        let mut writer = RowWriter::new("events", &mut sink);
        writer.prepare(2);

        for i in 0..5i32 {
            writer
                .write_row(vec![SqlValue::I32(i), SqlValue::Text(format!("payload{}", i))])
                .await
                .unwrap();
        }
        assert_eq!(writer.rows_written(), 5);
        drop(writer);

        assert!(sink
            .written
            .iter()
            .all(|(stmt, _)| stmt == "INSERT INTO `events` VALUES (?,?)"));

        // One INSERT per row, in exactly the order the rows were read.
        let first_cells: Vec<mysql_async::Value> = sink
            .written
            .iter()
            .map(|(_, params)| params[0].clone())
            .collect();
        let expected: Vec<mysql_async::Value> = (0..5i32).map(mysql_async::Value::from).collect();
        assert_eq!(first_cells, expected);
    }

    #[tokio::test]
    async fn failed_write_reports_rows_already_copied() {
        let mut sink = RecordingSink {
            written: Vec::new(),
            fail_after: Some(3),
        };
        let mut writer = RowWriter::new("orders", &mut sink);

        let mut last = Ok(());
        for i in 0..5i64 {
            last = writer.write_row(vec![SqlValue::I64(i)]).await;
            if last.is_err() {
                break;
            }
        }

        assert!(matches!(last, Err(MigrateError::Copy { .. })));
        assert_eq!(writer.rows_written(), 3);
    }

    #[tokio::test]
    async fn bounded_scheduler_never_exceeds_capacity() {
        const CAPACITY: usize = 4;
        const TABLES: usize = 32;

        let running = Arc::new(AtomicUsize::new(0));
        let high_water = Arc::new(AtomicUsize::new(0));

        let tables: Vec<String> = (0..TABLES).map(|i| format!("t{}", i)).collect();

        let running_ref = running.clone();
        let high_water_ref = high_water.clone();
        let (scheduled, mut rx) = spawn_bounded(tables, CAPACITY, move |table| {
            let running = running_ref.clone();
            let high_water = high_water_ref.clone();
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                high_water.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                outcome(&table, 1, None)
            }
        })
        .await;

        let mut count = 0;
        while let Some(_outcome) = rx.recv().await {
            count += 1;
        }

        assert_eq!(scheduled, TABLES);
        assert_eq!(count, TABLES);
        assert!(
            high_water.load(Ordering::SeqCst) <= CAPACITY,
            "observed {} concurrent tasks, capacity {}",
            high_water.load(Ordering::SeqCst),
            CAPACITY
        );
    }

    #[tokio::test]
    async fn scheduler_delivers_exactly_one_outcome_per_table() {
        let tables = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let (scheduled, mut rx) =
            spawn_bounded(tables, 2, |table| async move { outcome(&table, 1, None) }).await;

        let mut seen = Vec::new();
        while let Some(o) = rx.recv().await {
            seen.push(o.table);
        }

        seen.sort();
        assert_eq!(scheduled, 3);
        assert_eq!(seen, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn panicked_task_still_releases_its_permit() {
        // With capacity 1, a panicking first task must not wedge the
        // scheduling loop for the second.
        let tables = vec!["boom".to_string(), "ok".to_string()];
        let (scheduled, mut rx) = spawn_bounded(tables, 1, |table| async move {
            if table == "boom" {
                panic!("induced failure");
            }
            outcome(&table, 1, None)
        })
        .await;

        let mut seen = Vec::new();
        while let Some(o) = rx.recv().await {
            seen.push(o.table);
        }

        // The panicked task never reports; the aggregator turns the short
        // count into an OutcomeLost error.
        assert_eq!(seen, ["ok"]);
        let mut agg = ResultAggregator::new(scheduled);
        agg.record(outcome("ok", 1, None));
        assert!(matches!(
            agg.finish(),
            Err(MigrateError::OutcomeLost { missing: 1 })
        ));
    }
}
