//! Catalog table registry.
//!
//! Catalog tables are created by an external import process. The set the
//! application works with is fixed at startup from configuration and checked
//! against the database schema; runtime introspection only seeds the
//! registry when the configuration lists no tables.

use std::collections::HashSet;

use super::query::quote_ident;
use super::schema::is_reserved_table;
use super::Database;
use crate::config::{CatalogConfig, ColumnConfig};
use crate::error::{CatalogError, Result};

/// A registered catalog table and the names of its record columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogTable {
    pub name: String,
    pub columns: ColumnConfig,
}

impl CatalogTable {
    pub fn new(name: impl Into<String>, columns: ColumnConfig) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    pub(crate) fn quoted_name(&self) -> String {
        quote_ident(&self.name)
    }

    fn required_columns(&self) -> [&str; 5] {
        [
            self.columns.path.as_str(),
            self.columns.sub_file.as_str(),
            self.columns.comment.as_str(),
            self.columns.photo.as_str(),
            self.columns.tags.as_str(),
        ]
    }
}

impl Database {
    /// User tables in the database file, excluding reserved and system tables.
    pub fn discover_catalog_tables(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY rowid")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names
            .into_iter()
            .filter(|name| !is_reserved_table(name))
            .collect())
    }

    fn table_exists(&self, name: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            [name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn table_columns(&self, name: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT name FROM pragma_table_info(?)")?;
        let columns = stmt
            .query_map([name], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(columns)
    }

    /// Columns the table lacks, compared the way SQLite resolves identifiers.
    fn missing_columns(&self, table: &CatalogTable) -> Result<Vec<String>> {
        let present = self.table_columns(&table.name)?;
        Ok(table
            .required_columns()
            .into_iter()
            .filter(|wanted| {
                !present
                    .iter()
                    .any(|have| have.as_str() == *wanted || have.eq_ignore_ascii_case(wanted))
            })
            .map(|c| c.to_string())
            .collect())
    }

    /// Build and validate the catalog registry, then rebuild the tag index.
    ///
    /// Configured tables must exist and carry every record column. When no
    /// tables are configured, discovered tables lacking record columns are
    /// skipped with a warning.
    pub fn attach_catalog(&mut self, config: &CatalogConfig) -> Result<()> {
        let mut registry = Vec::new();
        let mut seen = HashSet::new();

        if config.tables.is_empty() {
            for name in self.discover_catalog_tables()? {
                let table = CatalogTable::new(name, config.columns.clone());
                let missing = self.missing_columns(&table)?;
                if missing.is_empty() {
                    registry.push(table);
                } else {
                    tracing::warn!(
                        "Skipping table {:?}: missing columns {:?}",
                        table.name,
                        missing
                    );
                }
            }
        } else {
            let mut problems = Vec::new();
            for entry in &config.tables {
                let columns = entry.columns.clone().unwrap_or_else(|| config.columns.clone());
                let table = CatalogTable::new(entry.name.clone(), columns);

                if is_reserved_table(&table.name) {
                    problems.push(format!("{:?} is a reserved table name", table.name));
                    continue;
                }
                if !seen.insert(table.name.clone()) {
                    problems.push(format!("{:?} is listed more than once", table.name));
                    continue;
                }
                if !self.table_exists(&table.name)? {
                    problems.push(format!("table {:?} does not exist", table.name));
                    continue;
                }
                let missing = self.missing_columns(&table)?;
                if !missing.is_empty() {
                    problems.push(format!("table {:?} is missing columns {:?}", table.name, missing));
                    continue;
                }
                registry.push(table);
            }

            if !problems.is_empty() {
                return Err(CatalogError::Registry(problems.join("; ")));
            }
        }

        tracing::info!(
            "Registered {} catalog tables: {:?}",
            registry.len(),
            registry.iter().map(|t| t.name.as_str()).collect::<Vec<_>>()
        );
        self.registry = registry;
        self.reindex_all_tags()?;
        Ok(())
    }

    pub fn catalog_tables(&self) -> &[CatalogTable] {
        &self.registry
    }

    /// Registered catalog table names, in registry order.
    pub fn list_table_names(&self) -> Vec<String> {
        self.registry.iter().map(|t| t.name.clone()).collect()
    }

    pub(crate) fn resolve_table(&self, name: &str) -> Result<&CatalogTable> {
        self.registry
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| CatalogError::NotFound(format!("catalog table {:?}", name)))
    }

    pub fn record_count(&self, table: &str) -> Result<i64> {
        let table = self.resolve_table(table)?;
        let count = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", table.quoted_name()),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{registry_config, CATALOG_DDL};
    use super::*;
    use crate::config::TableConfig;

    fn db_with_tables() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db.conn.execute_batch(CATALOG_DDL).unwrap();
        db
    }

    #[test]
    fn test_discovery_excludes_reserved_tables() {
        let db = db_with_tables();
        let names = db.discover_catalog_tables().unwrap();
        assert_eq!(names, vec!["archive".to_string(), "scans".to_string()]);
    }

    #[test]
    fn test_configured_registry_keeps_order() {
        let mut db = db_with_tables();
        db.attach_catalog(&registry_config(&["scans", "archive"])).unwrap();
        assert_eq!(db.list_table_names(), vec!["scans".to_string(), "archive".to_string()]);
    }

    #[test]
    fn test_empty_config_registers_discovered_tables() {
        let mut db = db_with_tables();
        db.conn
            .execute_batch("CREATE TABLE unrelated (id INTEGER)")
            .unwrap();
        db.attach_catalog(&CatalogConfig::default()).unwrap();
        assert_eq!(db.list_table_names(), vec!["archive".to_string(), "scans".to_string()]);
    }

    #[test]
    fn test_missing_table_is_rejected() {
        let mut db = db_with_tables();
        let err = db
            .attach_catalog(&registry_config(&["archive", "nope"]))
            .unwrap_err();
        assert!(matches!(err, CatalogError::Registry(ref msg) if msg.contains("nope")));
        assert!(db.catalog_tables().is_empty());
    }

    #[test]
    fn test_reserved_and_duplicate_names_are_rejected() {
        let mut db = db_with_tables();
        assert!(matches!(
            db.attach_catalog(&registry_config(&["users"])),
            Err(CatalogError::Registry(_))
        ));
        assert!(matches!(
            db.attach_catalog(&registry_config(&["archive", "archive"])),
            Err(CatalogError::Registry(_))
        ));
    }

    #[test]
    fn test_missing_columns_are_rejected() {
        let mut db = db_with_tables();
        db.conn
            .execute_batch(r#"CREATE TABLE "thin" ("Путь" TEXT, "tags" TEXT)"#)
            .unwrap();
        let err = db.attach_catalog(&registry_config(&["thin"])).unwrap_err();
        assert!(matches!(err, CatalogError::Registry(ref msg) if msg.contains("Фото")));
    }

    #[test]
    fn test_per_table_column_override() {
        let mut db = db_with_tables();
        db.conn
            .execute_batch("CREATE TABLE legacy (file TEXT, sub TEXT, note TEXT, pic TEXT, labels TEXT)")
            .unwrap();
        let config = CatalogConfig {
            tables: vec![TableConfig {
                name: "legacy".to_string(),
                columns: Some(ColumnConfig {
                    path: "file".to_string(),
                    sub_file: "sub".to_string(),
                    comment: "note".to_string(),
                    photo: "pic".to_string(),
                    tags: "labels".to_string(),
                }),
            }],
            ..Default::default()
        };
        db.attach_catalog(&config).unwrap();
        assert_eq!(db.catalog_tables()[0].columns.path, "file");
    }

    #[test]
    fn test_unknown_table_is_not_found() {
        let mut db = db_with_tables();
        db.attach_catalog(&registry_config(&["archive"])).unwrap();
        assert_eq!(db.record_count("archive").unwrap(), 0);
        assert!(matches!(db.record_count("scans"), Err(CatalogError::NotFound(_))));
    }
}
