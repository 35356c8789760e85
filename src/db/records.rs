//! Catalog record operations.

use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::OptionalExtension;
use serde::Serialize;

use super::catalog::CatalogTable;
use super::query::{build_record_query, quote_ident, RecordFilter, SearchCriteria};
use super::Database;
use crate::assets::AssetManager;
use crate::error::{CatalogError, Result};

/// A row of a catalog table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    pub source_table: String,
    pub row_id: i64,
    pub path: String,
    pub sub_file: Option<String>,
    pub comment: Option<String>,
    /// Comma-joined tag names as stored.
    pub tags: String,
    pub photo_ref: Option<String>,
    pub version: i64,
}

impl Record {
    pub fn tag_list(&self) -> Vec<String> {
        split_tags(&self.tags)
    }
}

/// Replacement values for the mutable fields of a record.
#[derive(Debug, Clone, Default)]
pub struct RecordEdit {
    pub comment: String,
    pub tags: Vec<String>,
    pub photo_ref: Option<String>,
    /// Reject the edit with `Conflict` unless the record is still at this version.
    pub expected_version: Option<i64>,
    pub edited_by: Option<String>,
}

/// Tag names from a stored comma-joined list: trimmed, blanks and repeats dropped.
pub fn split_tags(raw: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in raw.split(',') {
        let tag = tag.trim();
        if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

/// Validate tags for storage: trimmed, non-empty, comma-free, unique.
pub fn normalize_tags(tags: &[String]) -> Result<Vec<String>> {
    let mut normalized: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.trim();
        if tag.is_empty() {
            continue;
        }
        if tag.contains(',') {
            return Err(CatalogError::Validation(format!(
                "tag {:?} must not contain a comma",
                tag
            )));
        }
        if !normalized.iter().any(|t| t == tag) {
            normalized.push(tag.to_string());
        }
    }
    Ok(normalized)
}

/// Render a loosely typed column value; imported tables are not strict about types.
fn value_to_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(f) => Some(f.to_string()),
        Value::Text(s) => Some(s),
        Value::Blob(b) => Some(String::from_utf8_lossy(&b).into_owned()),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<Record> {
    Ok(Record {
        source_table: row.get(1)?,
        row_id: row.get(2)?,
        path: value_to_text(row.get(3)?).unwrap_or_default(),
        sub_file: non_empty(value_to_text(row.get(4)?)),
        comment: non_empty(value_to_text(row.get(5)?)),
        tags: value_to_text(row.get(6)?).unwrap_or_default(),
        photo_ref: non_empty(value_to_text(row.get(7)?)),
        version: row.get(8)?,
    })
}

impl Database {
    fn run_record_query(
        &self,
        tables: &[&CatalogTable],
        filter: RecordFilter<'_>,
    ) -> Result<Vec<Record>> {
        let Some(query) = build_record_query(tables, filter) else {
            return Ok(Vec::new());
        };
        tracing::trace!("Record query: {}", query.sql);

        let mut stmt = self.conn.prepare(&query.sql)?;
        let records = stmt
            .query_map(rusqlite::params_from_iter(query.params.iter()), row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Records of one table whose path contains `path_substring` (all records if absent).
    pub fn get_records(&self, table: &str, path_substring: Option<&str>) -> Result<Vec<Record>> {
        let table = self.resolve_table(table)?;
        let filter = RecordFilter {
            path: path_substring.filter(|p| !p.is_empty()),
            ..Default::default()
        };
        self.run_record_query(&[table], filter)
    }

    /// Path search across every catalog table. No path text means no results.
    pub fn search_all(&self, path_substring: Option<&str>) -> Result<Vec<Record>> {
        let Some(path) = path_substring.filter(|p| !p.is_empty()) else {
            return Ok(Vec::new());
        };
        let tables: Vec<&CatalogTable> = self.registry.iter().collect();
        let filter = RecordFilter {
            path: Some(path),
            ..Default::default()
        };
        self.run_record_query(&tables, filter)
    }

    /// Public search by path text and tags (all tags required). Empty criteria yield no results.
    pub fn search_public(&self, criteria: &SearchCriteria) -> Result<Vec<Record>> {
        if criteria.is_empty() {
            return Ok(Vec::new());
        }
        let tags = criteria.required_tags();
        let tables: Vec<&CatalogTable> = self.registry.iter().collect();
        let filter = RecordFilter {
            path: criteria.path_text(),
            tags: &tags,
            row_id: None,
        };
        let records = self.run_record_query(&tables, filter)?;
        tracing::debug!(
            "Public search path={:?} tags={:?}: {} records",
            criteria.path_text(),
            tags,
            records.len()
        );
        Ok(records)
    }

    pub fn get_record(&self, table: &str, row_id: i64) -> Result<Record> {
        let table = self.resolve_table(table)?;
        let filter = RecordFilter {
            row_id: Some(row_id),
            ..Default::default()
        };
        self.run_record_query(&[table], filter)?
            .into_iter()
            .next()
            .ok_or_else(|| CatalogError::NotFound(format!("record {} in {:?}", row_id, table.name)))
    }

    /// Replace comment, tags and photo reference of a record.
    pub fn update_record(&self, table: &str, row_id: i64, edit: &RecordEdit) -> Result<Record> {
        let table = self.resolve_table(table)?;
        let tags = normalize_tags(&edit.tags)?;
        let cols = &table.columns;

        let tx = self.conn.unchecked_transaction()?;

        let exists = tx
            .query_row(
                &format!("SELECT 1 FROM {} WHERE rowid = ?", table.quoted_name()),
                [row_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !exists {
            return Err(CatalogError::NotFound(format!(
                "record {} in {:?}",
                row_id, table.name
            )));
        }

        let current: i64 = tx
            .query_row(
                "SELECT version FROM record_versions WHERE source_table = ? AND row_id = ?",
                rusqlite::params![table.name, row_id],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);
        if let Some(expected) = edit.expected_version {
            if expected != current {
                tracing::warn!(
                    "Rejected stale edit of {}#{}: expected version {}, found {}",
                    table.name,
                    row_id,
                    expected,
                    current
                );
                return Err(CatalogError::Conflict {
                    expected,
                    actual: current,
                });
            }
        }

        tx.execute(
            &format!(
                "UPDATE {} SET {} = ?, {} = ?, {} = ? WHERE rowid = ?",
                table.quoted_name(),
                quote_ident(&cols.comment),
                quote_ident(&cols.tags),
                quote_ident(&cols.photo),
            ),
            rusqlite::params![edit.comment, tags.join(","), edit.photo_ref, row_id],
        )?;

        tx.execute(
            "DELETE FROM record_tags WHERE source_table = ? AND row_id = ?",
            rusqlite::params![table.name, row_id],
        )?;
        for tag in &tags {
            tx.execute(
                "INSERT INTO record_tags (source_table, row_id, tag) VALUES (?, ?, ?)",
                rusqlite::params![table.name, row_id, tag],
            )?;
        }

        tx.execute(
            r#"
            INSERT INTO record_versions (source_table, row_id, version, updated_at, updated_by)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (source_table, row_id) DO UPDATE SET
                version = excluded.version,
                updated_at = excluded.updated_at,
                updated_by = excluded.updated_by
            "#,
            rusqlite::params![
                table.name,
                row_id,
                current + 1,
                Utc::now().to_rfc3339(),
                edit.edited_by
            ],
        )?;

        tx.commit()?;
        tracing::info!("Updated record {}#{} (version {})", table.name, row_id, current + 1);

        self.get_record(&table.name, row_id)
    }

    /// Delete a record and its photo file. The file goes first, so a failure
    /// in between leaves at worst an orphaned file, never a dangling reference.
    pub fn delete_record(&self, table: &str, row_id: i64, assets: &AssetManager) -> Result<()> {
        let record = self.get_record(table, row_id)?;
        let table = self.resolve_table(table)?;

        if let Some(photo_ref) = &record.photo_ref {
            if assets.delete(photo_ref)? {
                tracing::info!("Removed photo {} of {}#{}", photo_ref, table.name, row_id);
            }
        }

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            &format!("DELETE FROM {} WHERE rowid = ?", table.quoted_name()),
            [row_id],
        )?;
        tx.execute(
            "DELETE FROM record_tags WHERE source_table = ? AND row_id = ?",
            rusqlite::params![table.name, row_id],
        )?;
        tx.execute(
            "DELETE FROM record_versions WHERE source_table = ? AND row_id = ?",
            rusqlite::params![table.name, row_id],
        )?;
        tx.commit()?;

        tracing::info!("Deleted record {}#{} ({})", table.name, row_id, record.path);
        Ok(())
    }

    /// Rebuild the tag index of one table from its stored tag column.
    pub fn reindex_tags(&self, table: &str) -> Result<usize> {
        let table = self.resolve_table(table)?;
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM record_tags WHERE source_table = ?",
            [&table.name],
        )?;

        let rows: Vec<(i64, Option<String>)> = {
            let mut stmt = tx.prepare(&format!(
                "SELECT rowid, {} FROM {}",
                quote_ident(&table.columns.tags),
                table.quoted_name()
            ))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, i64>(0)?, value_to_text(row.get(1)?)))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        let mut indexed = 0;
        {
            let mut insert = tx.prepare(
                "INSERT OR IGNORE INTO record_tags (source_table, row_id, tag) VALUES (?, ?, ?)",
            )?;
            for (row_id, raw) in rows {
                for tag in split_tags(raw.as_deref().unwrap_or("")) {
                    indexed += insert.execute(rusqlite::params![table.name, row_id, tag])?;
                }
            }
        }
        tx.commit()?;

        tracing::debug!("Indexed {} tag references in {}", indexed, table.name);
        Ok(indexed)
    }

    pub fn reindex_all_tags(&self) -> Result<usize> {
        let mut total = 0;
        for name in self.list_table_names() {
            total += self.reindex_tags(&name)?;
        }
        Ok(total)
    }

    /// Every non-empty photo reference across the catalog.
    pub fn photo_refs(&self) -> Result<Vec<String>> {
        let mut refs = Vec::new();
        for table in &self.registry {
            let photo = quote_ident(&table.columns.photo);
            let mut stmt = self.conn.prepare(&format!(
                "SELECT {photo} FROM {} WHERE {photo} IS NOT NULL",
                table.quoted_name()
            ))?;
            let values = stmt
                .query_map([], |row| row.get::<_, Value>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            refs.extend(values.into_iter().filter_map(|v| non_empty(value_to_text(v))));
        }
        Ok(refs)
    }
}
