//! Type mapping between MSSQL and MySQL.

/// Map an MSSQL data type name to its MySQL equivalent.
///
/// The match is case-sensitive against the lowercase names reported by
/// `INFORMATION_SCHEMA.COLUMNS.DATA_TYPE`. Names outside the known
/// vocabulary fall back to `TEXT`; this function never fails.
///
/// The mapping is deliberately lossy: character and national-character
/// families all collapse to `TEXT`, and `varbinary` is capped at 255.
pub fn mssql_to_mysql(data_type: &str) -> &'static str {
    match data_type {
        "bit" => "TINYINT(1)",
        "tinyint" => "TINYINT",
        "smallint" => "SMALLINT",
        "int" => "INT",
        "bigint" => "BIGINT",
        "numeric" | "decimal" => "DECIMAL",
        "smallmoney" => "DECIMAL(6, 4)",
        "money" => "DECIMAL(19, 4)",
        "float" => "DOUBLE",
        "real" => "FLOAT",
        "date" => "DATE",
        "time" => "TIME",
        "datetime" | "datetime2" | "smalldatetime" | "timestamp" => "DATETIME",
        "year" => "YEAR",
        "char" | "nchar" | "varchar" | "nvarchar" | "text" | "ntext" => "TEXT",
        "binary" => "BINARY",
        "varbinary" => "VARBINARY(255)",
        "image" => "BLOB",
        _ => "TEXT",
    }
}
