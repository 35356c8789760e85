//! Tag vocabulary.
//!
//! Records reference tags by name, so renaming or deleting a vocabulary tag
//! never rewrites records; such references are left dangling.

use rusqlite::OptionalExtension;
use serde::Serialize;

use super::Database;
use crate::error::{map_unique, CatalogError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

/// Trimmed tag name; rejects empty names and commas (the record tag list separator).
pub fn validate_tag_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CatalogError::Validation("tag name must not be empty".to_string()));
    }
    if name.contains(',') {
        return Err(CatalogError::Validation(format!(
            "tag name {:?} must not contain a comma",
            name
        )));
    }
    Ok(name.to_string())
}

fn clean_description(description: Option<&str>) -> Option<&str> {
    description.map(str::trim).filter(|d| !d.is_empty())
}

fn row_to_tag(row: &rusqlite::Row) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
    })
}

impl Database {
    pub fn create_tag(&self, name: &str, description: Option<&str>) -> Result<i64> {
        let name = validate_tag_name(name)?;
        self.conn
            .execute(
                "INSERT INTO tags (name, description) VALUES (?, ?)",
                rusqlite::params![name, clean_description(description)],
            )
            .map_err(|e| map_unique(e, || format!("tag {:?}", name)))?;
        let id = self.conn.last_insert_rowid();
        tracing::info!("Created tag {:?} (id {})", name, id);
        Ok(id)
    }

    pub fn update_tag(&self, id: i64, name: &str, description: Option<&str>) -> Result<()> {
        let name = validate_tag_name(name)?;
        let changed = self
            .conn
            .execute(
                "UPDATE tags SET name = ?, description = ? WHERE id = ?",
                rusqlite::params![name, clean_description(description), id],
            )
            .map_err(|e| map_unique(e, || format!("tag {:?}", name)))?;
        if changed == 0 {
            return Err(CatalogError::NotFound(format!("tag {}", id)));
        }
        tracing::info!("Updated tag {} to {:?}", id, name);
        Ok(())
    }

    pub fn delete_tag(&self, id: i64) -> Result<()> {
        let changed = self.conn.execute("DELETE FROM tags WHERE id = ?", [id])?;
        if changed == 0 {
            return Err(CatalogError::NotFound(format!("tag {}", id)));
        }
        tracing::info!("Deleted tag {}", id);
        Ok(())
    }

    pub fn get_tag(&self, id: i64) -> Result<Tag> {
        self.conn
            .query_row(
                "SELECT id, name, description FROM tags WHERE id = ?",
                [id],
                row_to_tag,
            )
            .optional()?
            .ok_or_else(|| CatalogError::NotFound(format!("tag {}", id)))
    }

    pub fn list_tags(&self) -> Result<Vec<Tag>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, description FROM tags ORDER BY name")?;
        let tags = stmt
            .query_map([], row_to_tag)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tags)
    }

    /// Tag names for filter suggestions, sorted.
    pub fn tag_names(&self) -> Result<Vec<String>> {
        Ok(self.list_tags()?.into_iter().map(|t| t.name).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{catalog_db, insert_row};
    use super::*;
    use crate::db::{RecordEdit, SearchCriteria};

    #[test]
    fn test_validate_tag_name() {
        assert_eq!(validate_tag_name("  urgent ").unwrap(), "urgent");
        assert!(matches!(validate_tag_name("   "), Err(CatalogError::Validation(_))));
        assert!(matches!(validate_tag_name("a,b"), Err(CatalogError::Validation(_))));
    }

    #[test]
    fn test_crud_and_sorting() {
        let db = catalog_db();
        let b = db.create_tag("beta", Some("second")).unwrap();
        let a = db.create_tag("alpha", None).unwrap();

        let names = db.tag_names().unwrap();
        assert_eq!(names, vec!["alpha", "beta"]);

        db.update_tag(a, "gamma", Some("  ")).unwrap();
        let gamma = db.get_tag(a).unwrap();
        assert_eq!(gamma.name, "gamma");
        assert_eq!(gamma.description, None);
        assert_eq!(db.get_tag(b).unwrap().description.as_deref(), Some("second"));

        db.delete_tag(b).unwrap();
        assert_eq!(db.list_tags().unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_names() {
        let db = catalog_db();
        let first = db.create_tag("urgent", None).unwrap();
        let other = db.create_tag("later", None).unwrap();

        assert!(matches!(
            db.create_tag(" urgent ", None),
            Err(CatalogError::DuplicateKey(_))
        ));
        assert!(matches!(
            db.update_tag(other, "urgent", None),
            Err(CatalogError::DuplicateKey(_))
        ));
        // Renaming a tag to its own name is fine
        db.update_tag(first, "urgent", Some("now")).unwrap();
    }

    #[test]
    fn test_missing_tag_is_not_found() {
        let db = catalog_db();
        assert!(matches!(db.get_tag(9), Err(CatalogError::NotFound(_))));
        assert!(matches!(db.update_tag(9, "x", None), Err(CatalogError::NotFound(_))));
        assert!(matches!(db.delete_tag(9), Err(CatalogError::NotFound(_))));
    }

    #[test]
    fn test_urgent_tag_lifecycle_leaves_dangling_reference() {
        let db = catalog_db();
        let tag_id = db.create_tag("urgent", None).unwrap();
        let row_id = insert_row(&db, "archive", "/docs/report.pdf", "", None);
        insert_row(&db, "archive", "/docs/other.pdf", "", None);

        db.update_record(
            "archive",
            row_id,
            &RecordEdit {
                tags: vec!["urgent".to_string()],
                ..Default::default()
            },
        )
        .unwrap();

        let by_tag = SearchCriteria::new(None, &["urgent".to_string()]);
        let hits = db.search_public(&by_tag).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].row_id, row_id);
        assert_eq!(hits[0].path, "/docs/report.pdf");

        db.delete_tag(tag_id).unwrap();

        let record = db.get_record("archive", row_id).unwrap();
        assert_eq!(record.tags, "urgent");
        assert_eq!(db.search_public(&by_tag).unwrap().len(), 1);

        let by_path = SearchCriteria::new(Some("report"), &[]);
        let hits = db.search_public(&by_path).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].row_id, row_id);
    }
}
