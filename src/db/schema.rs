pub const SCHEMA: &str = r#"
-- Accounts: column names are shared with databases created by earlier tools
CREATE TABLE IF NOT EXISTS users (
    username TEXT NOT NULL UNIQUE,
    password TEXT NOT NULL,  -- bcrypt hash
    name TEXT,
    admin INTEGER DEFAULT 0
);

-- Curated tag vocabulary
CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    description TEXT
);

-- Record to tag index, keyed by tag name so vocabulary deletes never cascade
CREATE TABLE IF NOT EXISTS record_tags (
    source_table TEXT NOT NULL,
    row_id INTEGER NOT NULL,
    tag TEXT NOT NULL,
    PRIMARY KEY (source_table, row_id, tag)
);

CREATE INDEX IF NOT EXISTS idx_record_tags_tag ON record_tags(tag, source_table);

-- Optimistic concurrency counters; a missing row means version 0
CREATE TABLE IF NOT EXISTS record_versions (
    source_table TEXT NOT NULL,
    row_id INTEGER NOT NULL,
    version INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT,
    updated_by TEXT,
    PRIMARY KEY (source_table, row_id)
);
"#;

/// Statements applied after `SCHEMA`; failures (e.g. duplicate column) are ignored.
pub const MIGRATIONS: &[&str] = &[
    // Databases created before the admin flag existed
    "ALTER TABLE users ADD COLUMN admin INTEGER DEFAULT 0",
];

/// Tables owned by this crate, never registered as catalog tables.
pub const RESERVED_TABLES: &[&str] = &["users", "tags", "record_tags", "record_versions"];

pub fn is_reserved_table(name: &str) -> bool {
    RESERVED_TABLES.contains(&name) || name.starts_with("sqlite_")
}
