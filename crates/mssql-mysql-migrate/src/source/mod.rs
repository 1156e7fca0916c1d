//! MSSQL source database operations.
//!
//! Provides the catalog queries (column introspection, base-table
//! enumeration) and the pooled connections the copy engine streams rows
//! from. Uses Tiberius with bb8 connection pooling.

use crate::config::SourceConfig;
use crate::core::{ColumnDescriptor, SqlValue, TableSchema};
use crate::error::{MigrateError, Result};
use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use std::ops::{Deref, DerefMut};
use std::time::Duration;
use tiberius::{AuthMethod, Client, ColumnType, Config, EncryptionLevel, Query, Row};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};
use uuid::Uuid;

/// How long a checkout may wait for a free connection. A copy task holds
/// its connection for the whole table stream, so checkouts queued behind
/// long copies can legitimately wait far past bb8's 30-second default.
const CHECKOUT_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// A checked-out source connection.
pub(crate) type SourceClient<'a> = PooledConnection<'a, TiberiusConnectionManager>;

/// A client with a poison flag. A copy task that errors mid-stream leaves
/// the session with an undrained result set; poisoning makes the pool
/// discard it instead of handing it to the next task.
pub(crate) struct PoisonableConn<C> {
    client: C,
    poisoned: bool,
}

/// The pooled source connection type.
pub(crate) type SourceConn = PoisonableConn<Client<Compat<TcpStream>>>;

impl<C> PoisonableConn<C> {
    fn new(client: C) -> Self {
        Self {
            client,
            poisoned: false,
        }
    }

    /// Flag the connection for discard on return to the pool.
    pub(crate) fn poison(&mut self) {
        self.poisoned = true;
    }

    fn is_poisoned(&self) -> bool {
        self.poisoned
    }
}

impl<C> Deref for PoisonableConn<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.client
    }
}

impl<C> DerefMut for PoisonableConn<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.client
    }
}

/// Connection manager for bb8 pool with Tiberius.
#[derive(Clone)]
pub(crate) struct TiberiusConnectionManager {
    config: SourceConfig,
}

impl TiberiusConnectionManager {
    fn new(config: SourceConfig) -> Self {
        Self { config }
    }

    fn build_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.config.host);
        config.port(self.config.port);
        config.database(&self.config.database);
        config.authentication(AuthMethod::sql_server(
            &self.config.user,
            &self.config.password,
        ));

        if self.config.encrypt {
            if self.config.trust_server_cert {
                config.trust_cert();
            }
            config.encryption(EncryptionLevel::Required);
        } else {
            config.encryption(EncryptionLevel::NotSupported);
        }

        config
    }
}

#[async_trait]
impl bb8::ManageConnection for TiberiusConnectionManager {
    type Connection = SourceConn;
    type Error = tiberius::error::Error;

    async fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        let config = self.build_config();
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| tiberius::error::Error::Io {
                kind: e.kind(),
                message: e.to_string(),
            })?;

        tcp.set_nodelay(true).ok();

        let client = Client::connect(config, tcp.compat_write()).await?;
        Ok(PoisonableConn::new(client))
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        conn.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.is_poisoned()
    }
}

/// MSSQL source pool.
pub struct MssqlPool {
    pool: Pool<TiberiusConnectionManager>,
    config: SourceConfig,
}

impl MssqlPool {
    /// Create a new MSSQL source pool and verify connectivity.
    pub async fn new(config: SourceConfig, max_size: u32) -> Result<Self> {
        let manager = TiberiusConnectionManager::new(config.clone());
        let pool = Pool::builder()
            .max_size(max_size)
            .min_idle(Some(1))
            .connection_timeout(CHECKOUT_TIMEOUT)
            .build(manager)
            .await
            .map_err(|e| MigrateError::pool(e, "creating MSSQL connection pool"))?;

        // Test connection
        {
            let mut conn = pool
                .get()
                .await
                .map_err(|e| MigrateError::pool(e, "testing MSSQL connection"))?;
            conn.simple_query("SELECT 1").await?.into_row().await?;
        }

        info!(
            "Connected to MSSQL: {}:{}/{} (pool_size={})",
            config.host, config.port, config.database, max_size
        );

        Ok(Self { pool, config })
    }

    /// Get a pooled connection.
    pub(crate) async fn client(&self) -> Result<SourceClient<'_>> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "getting MSSQL connection from pool"))
    }

    /// Introspect every column of every table in the source catalog.
    ///
    /// Runs one query ordered by table name and groups the (table, column,
    /// type) triples into a [`TableSchema`]. Any query or iteration failure
    /// aborts the whole schema phase.
    pub async fn introspect_columns(&self) -> Result<TableSchema> {
        let mut client = self.client().await?;

        let stream = client
            .simple_query(
                "SELECT TABLE_NAME, COLUMN_NAME, DATA_TYPE \
                 FROM INFORMATION_SCHEMA.COLUMNS ORDER BY TABLE_NAME",
            )
            .await
            .map_err(|e| MigrateError::Introspection(e.to_string()))?;
        let rows = stream
            .into_first_result()
            .await
            .map_err(|e| MigrateError::Introspection(e.to_string()))?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            columns.push(ColumnDescriptor {
                table: row.get::<&str, _>(0).unwrap_or_default().to_string(),
                name: row.get::<&str, _>(1).unwrap_or_default().to_string(),
                data_type: row.get::<&str, _>(2).unwrap_or_default().to_string(),
            });
        }

        let schema = TableSchema::from_columns(columns);
        debug!("Introspected {} tables from source catalog", schema.len());
        Ok(schema)
    }

    /// List the base tables of the configured source catalog.
    ///
    /// Failure is fatal to the data phase. Exclusions are applied by the
    /// caller before tasks are created.
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        let mut client = self.client().await?;

        let mut query = Query::new(
            "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES \
             WHERE TABLE_TYPE = 'BASE TABLE' AND TABLE_CATALOG = @P1",
        );
        query.bind(self.config.database.as_str());

        let stream = query
            .query(&mut client)
            .await
            .map_err(|e| MigrateError::Introspection(e.to_string()))?;
        let rows = stream
            .into_first_result()
            .await
            .map_err(|e| MigrateError::Introspection(e.to_string()))?;

        let tables: Vec<String> = rows
            .iter()
            .filter_map(|row| row.get::<&str, _>(0).map(str::to_string))
            .collect();

        debug!(
            "Enumerated {} base tables in catalog {}",
            tables.len(),
            self.config.database
        );
        Ok(tables)
    }
}

/// Scan every cell of a row into generic value holders, preserving the
/// native representation the driver produced.
pub(crate) fn scan_row(row: &Row) -> Vec<SqlValue> {
    let types: Vec<ColumnType> = row.columns().iter().map(|c| c.column_type()).collect();
    types
        .iter()
        .enumerate()
        .map(|(idx, col_type)| convert_cell(row, idx, *col_type))
        .collect()
}

/// Convert one cell keyed on the wire column type.
fn convert_cell(row: &Row, idx: usize, col_type: ColumnType) -> SqlValue {
    match col_type {
        ColumnType::Null => SqlValue::Null,

        ColumnType::Bit | ColumnType::Bitn => row
            .try_get::<bool, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Bool)
            .unwrap_or(SqlValue::Null),

        ColumnType::Int1 => row
            .try_get::<u8, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::U8)
            .unwrap_or(SqlValue::Null),

        ColumnType::Int2 => row
            .try_get::<i16, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::I16)
            .unwrap_or(SqlValue::Null),

        ColumnType::Int4 => row
            .try_get::<i32, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::I32)
            .unwrap_or(SqlValue::Null),

        ColumnType::Int8 => row
            .try_get::<i64, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::I64)
            .unwrap_or(SqlValue::Null),

        // Nullable integers arrive as Intn with the width of the actual
        // column, so probe from widest to narrowest.
        ColumnType::Intn => scan_intn(row, idx),

        ColumnType::Float4 => row
            .try_get::<f32, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::F32)
            .unwrap_or(SqlValue::Null),

        ColumnType::Float8 => row
            .try_get::<f64, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::F64)
            .unwrap_or(SqlValue::Null),

        ColumnType::Floatn => row
            .try_get::<f64, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::F64)
            .or_else(|| {
                row.try_get::<f32, _>(idx)
                    .ok()
                    .flatten()
                    .map(SqlValue::F32)
            })
            .unwrap_or(SqlValue::Null),

        ColumnType::Money | ColumnType::Money4 => row
            .try_get::<f64, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::F64)
            .unwrap_or(SqlValue::Null),

        ColumnType::Decimaln | ColumnType::Numericn => row
            .try_get::<Decimal, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Decimal)
            .unwrap_or(SqlValue::Null),

        ColumnType::Guid => row
            .try_get::<Uuid, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Uuid)
            .unwrap_or(SqlValue::Null),

        ColumnType::Daten => row
            .try_get::<NaiveDate, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Date)
            .unwrap_or(SqlValue::Null),

        ColumnType::Timen => row
            .try_get::<NaiveTime, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Time)
            .unwrap_or(SqlValue::Null),

        ColumnType::Datetime
        | ColumnType::Datetime4
        | ColumnType::Datetimen
        | ColumnType::Datetime2 => row
            .try_get::<NaiveDateTime, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::DateTime)
            .unwrap_or(SqlValue::Null),

        // Offset timestamps are normalized to UTC wall-clock time; MySQL
        // DATETIME has no offset.
        ColumnType::DatetimeOffsetn => row
            .try_get::<DateTime<Utc>, _>(idx)
            .ok()
            .flatten()
            .map(|dt| SqlValue::DateTime(dt.naive_utc()))
            .unwrap_or(SqlValue::Null),

        ColumnType::BigVarChar
        | ColumnType::BigChar
        | ColumnType::NVarchar
        | ColumnType::NChar
        | ColumnType::Text
        | ColumnType::NText
        | ColumnType::Xml => row
            .try_get::<&str, _>(idx)
            .ok()
            .flatten()
            .map(|s| SqlValue::Text(s.to_string()))
            .unwrap_or(SqlValue::Null),

        ColumnType::BigVarBin
        | ColumnType::BigBinary
        | ColumnType::Image
        | ColumnType::Udt
        | ColumnType::SSVariant => row
            .try_get::<&[u8], _>(idx)
            .ok()
            .flatten()
            .map(|b| SqlValue::Bytes(b.to_vec()))
            .unwrap_or(SqlValue::Null),

        // Legacy wire types (nullable money and friends) probe a few
        // representations before giving up.
        _ => row
            .try_get::<f64, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::F64)
            .or_else(|| {
                row.try_get::<&str, _>(idx)
                    .ok()
                    .flatten()
                    .map(|s| SqlValue::Text(s.to_string()))
            })
            .or_else(|| {
                row.try_get::<&[u8], _>(idx)
                    .ok()
                    .flatten()
                    .map(|b| SqlValue::Bytes(b.to_vec()))
            })
            .unwrap_or(SqlValue::Null),
    }
}

fn scan_intn(row: &Row, idx: usize) -> SqlValue {
    if let Ok(Some(v)) = row.try_get::<i64, _>(idx) {
        return SqlValue::I64(v);
    }
    if let Ok(Some(v)) = row.try_get::<i32, _>(idx) {
        return SqlValue::I32(v);
    }
    if let Ok(Some(v)) = row.try_get::<i16, _>(idx) {
        return SqlValue::I16(v);
    }
    if let Ok(Some(v)) = row.try_get::<u8, _>(idx) {
        return SqlValue::U8(v);
    }
    SqlValue::Null
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queued_checkouts_outlast_long_table_copies() {
        // Copy tasks scheduled past the pool size wait for a slot; the
        // wait must not expire while another table is still streaming.
        assert!(CHECKOUT_TIMEOUT >= Duration::from_secs(3600));
    }

    #[test]
    fn poisoned_connection_reports_broken() {
        let mut conn = PoisonableConn::new(());
        assert!(!conn.is_poisoned());
        conn.poison();
        assert!(conn.is_poisoned());
    }
}
