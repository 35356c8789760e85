mod schema;
pub mod catalog;
pub mod query;
pub mod records;
pub mod tags;
pub mod users;

use rusqlite::Connection;
use std::path::Path;

pub use catalog::CatalogTable;
pub use query::SearchCriteria;
pub use records::{Record, RecordEdit};
pub use schema::{is_reserved_table, MIGRATIONS, RESERVED_TABLES, SCHEMA};
pub use tags::Tag;
pub use users::{NewUser, Registration, UserSummary, UserUpdate};

use crate::error::Result;

/// Handle over the SQLite store holding users, the tag vocabulary, the
/// record tag index and every registered catalog table.
pub struct Database {
    pub(crate) conn: Connection,
    hash_cost: u32,
    registry: Vec<CatalogTable>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| crate::error::CatalogError::storage(parent, e))?;
            }
        }
        let conn = Connection::open(path)?;
        tracing::debug!("Opened database at {:?}", path);
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            hash_cost: bcrypt::DEFAULT_COST,
            registry: Vec::new(),
        }
    }

    /// bcrypt work factor used for newly hashed passwords.
    pub fn with_hash_cost(mut self, cost: u32) -> Self {
        self.hash_cost = cost;
        self
    }

    pub fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        self.run_migrations();
        Ok(())
    }

    fn run_migrations(&self) {
        for migration in MIGRATIONS {
            if let Err(e) = self.conn.execute(migration, []) {
                tracing::trace!("Skipped migration {:?}: {}", migration, e);
            }
        }
    }

    /// Direct access for the external import process and for tests.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::config::CatalogConfig;

    pub const CATALOG_DDL: &str = r#"
        CREATE TABLE "archive" ("Путь" TEXT, "Подфайл" TEXT, "Комментарий" TEXT, "Фото" TEXT, "tags" TEXT);
        CREATE TABLE "scans" ("Путь" TEXT, "Подфайл" TEXT, "Комментарий" TEXT, "Фото" TEXT, "tags" TEXT);
    "#;

    /// In-memory database with two empty catalog tables, `archive` then `scans`.
    pub fn catalog_db() -> Database {
        let mut db = Database::open_in_memory().unwrap().with_hash_cost(4);
        db.initialize().unwrap();
        db.conn.execute_batch(CATALOG_DDL).unwrap();
        db.attach_catalog(&registry_config(&["archive", "scans"])).unwrap();
        db
    }

    pub fn registry_config(names: &[&str]) -> CatalogConfig {
        CatalogConfig {
            tables: names
                .iter()
                .map(|name| crate::config::TableConfig {
                    name: name.to_string(),
                    columns: None,
                })
                .collect(),
            ..Default::default()
        }
    }

    /// Insert a row the way the import process would and return its rowid.
    pub fn insert_row(db: &Database, table: &str, path: &str, tags: &str, photo: Option<&str>) -> i64 {
        db.conn
            .execute(
                &format!(
                    r#"INSERT INTO "{table}" ("Путь", "Подфайл", "Комментарий", "Фото", "tags") VALUES (?, NULL, NULL, ?, ?)"#
                ),
                rusqlite::params![path, photo, tags],
            )
            .unwrap();
        let row_id = db.conn.last_insert_rowid();
        db.reindex_tags(table).unwrap();
        row_id
    }
}
