//! Configuration validation.

use super::types::Config;
use crate::error::{MigrateError, Result};

/// Validate a loaded configuration before any connection is attempted.
pub fn validate(config: &Config) -> Result<()> {
    let mut problems = Vec::new();

    if config.source.host.is_empty() {
        problems.push("source.host must not be empty");
    }
    if config.source.database.is_empty() {
        problems.push("source.database must not be empty");
    }
    if config.source.user.is_empty() {
        problems.push("source.user must not be empty");
    }
    if config.target.host.is_empty() {
        problems.push("target.host must not be empty");
    }
    if config.target.database.is_empty() {
        problems.push("target.database must not be empty");
    }
    if config.target.user.is_empty() {
        problems.push("target.user must not be empty");
    }
    if config.migration.max_tasks == 0 {
        problems.push("migration.max_tasks must be at least 1");
    }
    if config.migration.max_source_connections == 0 {
        problems.push("migration.max_source_connections must be at least 1");
    }
    if config.migration.max_target_connections == 0 {
        problems.push("migration.max_target_connections must be at least 1");
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(MigrateError::Config(problems.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;

    fn valid_yaml() -> &'static str {
        r#"
source:
  host: sqlserver.local
  database: northwind
  user: sa
  password: secret
target:
  host: mysql.local
  database: northwind
  user: root
  password: secret
"#
    }

    #[test]
    fn accepts_minimal_config() {
        let config = Config::from_yaml(valid_yaml()).unwrap();
        assert_eq!(config.source.port, 1433);
        assert_eq!(config.target.port, 3306);
        assert_eq!(config.migration.max_tasks, 150);
        assert!(!config.migration.migrate_schema);
    }

    #[test]
    fn rejects_empty_host() {
        let yaml = valid_yaml().replace("sqlserver.local", "\"\"");
        let err = Config::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("source.host"));
    }

    #[test]
    fn rejects_zero_max_tasks() {
        let yaml = format!("{}migration:\n  max_tasks: 0\n", valid_yaml());
        let err = Config::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("max_tasks"));
    }
}
