//! MySQL target database operations.
//!
//! Wraps a `mysql_async` pool and provides DDL execution for the schema
//! phase plus per-row INSERT execution for the copy engine. The SQL text
//! builders live here as pure functions so they can be tested without a
//! server.

use crate::config::TargetConfig;
use crate::core::{ColumnDescriptor, SqlValue};
use crate::error::{MigrateError, Result};
use crate::typemap::mssql_to_mysql;
use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts};
use tracing::{debug, info};

/// Destination for generated row INSERTs. `Conn` is the live sink; the
/// copy engine's write loop is tested against a recording implementation.
#[async_trait]
pub(crate) trait RowSink: Send {
    async fn write(
        &mut self,
        statement: &str,
        params: Vec<mysql_async::Value>,
    ) -> std::result::Result<(), mysql_async::Error>;
}

#[async_trait]
impl RowSink for Conn {
    async fn write(
        &mut self,
        statement: &str,
        params: Vec<mysql_async::Value>,
    ) -> std::result::Result<(), mysql_async::Error> {
        self.exec_drop(statement, params).await
    }
}

/// MySQL target pool.
pub struct MysqlPool {
    pool: Pool,
}

impl MysqlPool {
    /// Create a new MySQL target pool and verify connectivity.
    ///
    /// Every connection is initialized with `SET NAMES utf8mb4` and
    /// `SET FOREIGN_KEY_CHECKS=0`, so referential-integrity checking is
    /// off for exactly the sessions this pool owns. Nothing server-global
    /// is touched, so there is no state to restore on any exit path.
    pub async fn new(config: &TargetConfig, max_conns: usize) -> Result<Self> {
        let opts = Opts::from_url(&config.url())
            .map_err(|e| MigrateError::Config(format!("invalid MySQL connection URL: {}", e)))?;

        let constraints = PoolConstraints::new(1, max_conns).ok_or_else(|| {
            MigrateError::Config(format!("invalid MySQL pool size: {}", max_conns))
        })?;

        let builder = OptsBuilder::from_opts(opts)
            .init(vec!["SET NAMES utf8mb4", "SET FOREIGN_KEY_CHECKS=0"])
            .pool_opts(PoolOpts::new().with_constraints(constraints));

        let pool = Pool::new(builder);

        // Test connection
        let mut conn = pool
            .get_conn()
            .await
            .map_err(|e| MigrateError::pool(e, "creating MySQL target pool"))?;
        conn.query_drop("SELECT 1")
            .await
            .map_err(|e| MigrateError::pool(e, "testing MySQL target connection"))?;
        drop(conn);

        info!(
            "Connected to MySQL: {}:{}/{} (pool_size={})",
            config.host, config.port, config.database, max_conns
        );

        Ok(Self { pool })
    }

    /// Get a pooled connection.
    pub(crate) async fn conn(&self) -> Result<Conn> {
        self.pool
            .get_conn()
            .await
            .map_err(|e| MigrateError::pool(e, "getting MySQL connection from pool"))
    }

    /// Execute one CREATE TABLE statement. The first failure aborts the
    /// schema phase; tables created before it stay in place.
    pub async fn exec_ddl(&self, table: &str, ddl: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.query_drop(ddl).await.map_err(|e| MigrateError::Schema {
            table: table.to_string(),
            message: e.to_string(),
        })?;
        debug!("Created table {}", table);
        Ok(())
    }

    /// Disconnect the pool, closing all connections.
    pub async fn disconnect(&self) {
        self.pool.clone().disconnect().await.ok();
    }
}

/// Quote a MySQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Generate the CREATE TABLE statement for one introspected table.
///
/// Columns keep their source catalog order; each type runs through the
/// fixed MSSQL-to-MySQL mapping. No keys, constraints or defaults are
/// emitted.
pub fn table_ddl(table: &str, columns: &[ColumnDescriptor]) -> String {
    let cols: Vec<String> = columns
        .iter()
        .map(|c| format!("{} {}", quote_ident(&c.name), mssql_to_mysql(&c.data_type)))
        .collect();

    format!("CREATE TABLE {} ({}\n);", quote_ident(table), cols.join(","))
}

/// Generate the positional INSERT statement for one table.
pub fn insert_sql(table: &str, column_count: usize) -> String {
    let placeholders = vec!["?"; column_count].join(",");
    format!("INSERT INTO {} VALUES ({})", quote_ident(table), placeholders)
}

/// Convert a scanned cell to a mysql_async parameter value.
pub(crate) fn to_mysql_value(value: &SqlValue) -> mysql_async::Value {
    match value {
        SqlValue::Null => mysql_async::Value::NULL,
        SqlValue::Bool(b) => mysql_async::Value::from(*b),
        SqlValue::U8(v) => mysql_async::Value::from(*v),
        SqlValue::I16(v) => mysql_async::Value::from(*v),
        SqlValue::I32(v) => mysql_async::Value::from(*v),
        SqlValue::I64(v) => mysql_async::Value::from(*v),
        SqlValue::F32(v) => mysql_async::Value::from(*v),
        SqlValue::F64(v) => mysql_async::Value::from(*v),
        SqlValue::Text(s) => mysql_async::Value::from(s.as_str()),
        SqlValue::Bytes(b) => mysql_async::Value::from(b.as_slice()),
        SqlValue::Uuid(u) => mysql_async::Value::from(u.to_string()),
        SqlValue::Decimal(d) => mysql_async::Value::from(d.to_string()),
        SqlValue::DateTime(dt) => mysql_async::Value::from(*dt),
        SqlValue::Date(d) => mysql_async::Value::from(*d),
        SqlValue::Time(t) => mysql_async::Value::from(*t),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(table: &str, name: &str, data_type: &str) -> ColumnDescriptor {
        ColumnDescriptor {
            table: table.into(),
            name: name.into(),
            data_type: data_type.into(),
        }
    }

    #[test]
    fn quote_ident_escapes_backticks() {
        assert_eq!(quote_ident("name"), "`name`");
        assert_eq!(quote_ident("ta`ble"), "`ta``ble`");
    }

    #[test]
    fn users_table_ddl() {
        let columns = vec![
            col("users", "id", "int"),
            col("users", "name", "varchar"),
            col("users", "created", "datetime"),
        ];
        assert_eq!(
            table_ddl("users", &columns),
            "CREATE TABLE `users` (`id` INT,`name` TEXT,`created` DATETIME\n);"
        );
    }

    #[test]
    fn ddl_has_no_trailing_comma() {
        let columns = vec![col("t", "only", "bigint")];
        assert_eq!(table_ddl("t", &columns), "CREATE TABLE `t` (`only` BIGINT\n);");
    }

    #[test]
    fn ddl_maps_unknown_types_to_text() {
        let columns = vec![col("shapes", "outline", "geometry")];
        assert_eq!(
            table_ddl("shapes", &columns),
            "CREATE TABLE `shapes` (`outline` TEXT\n);"
        );
    }

    #[test]
    fn insert_sql_one_placeholder_per_column() {
        assert_eq!(insert_sql("users", 3), "INSERT INTO `users` VALUES (?,?,?)");
        assert_eq!(insert_sql("t", 1), "INSERT INTO `t` VALUES (?)");
    }

    #[test]
    fn null_converts_to_mysql_null() {
        assert_eq!(to_mysql_value(&SqlValue::Null), mysql_async::Value::NULL);
    }

    #[test]
    fn text_and_int_conversions() {
        assert_eq!(
            to_mysql_value(&SqlValue::Text("abc".into())),
            mysql_async::Value::from("abc")
        );
        assert_eq!(
            to_mysql_value(&SqlValue::I64(42)),
            mysql_async::Value::from(42i64)
        );
    }
}
