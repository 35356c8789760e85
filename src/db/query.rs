//! SQL builder for record listings and searches.
//!
//! Every catalog table contributes one SELECT with the same predicate set;
//! the parts are joined with UNION ALL and ordered by registry position, then
//! rowid. Identifiers are quoted, values are always bound.

use rusqlite::types::Value;

use super::catalog::CatalogTable;

/// Path text and required tags for a search. All tags must be present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchCriteria {
    pub path: Option<String>,
    pub tags: Vec<String>,
}

impl SearchCriteria {
    pub fn new(path: Option<&str>, tags: &[String]) -> Self {
        Self {
            path: path.map(str::to_string),
            tags: tags.to_vec(),
        }
    }

    /// Path substring, if one was given and is non-empty.
    pub fn path_text(&self) -> Option<&str> {
        self.path.as_deref().filter(|p| !p.is_empty())
    }

    /// Requested tags, trimmed, without blanks or repeats.
    pub fn required_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = Vec::new();
        for tag in &self.tags {
            let tag = tag.trim();
            if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
                tags.push(tag.to_string());
            }
        }
        tags
    }

    /// No path text and no tags; distinct from a search that matched nothing.
    pub fn is_empty(&self) -> bool {
        self.path_text().is_none() && self.required_tags().is_empty()
    }
}

/// Quote an SQL identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// LIKE pattern matching `text` literally anywhere in the value. Used with `ESCAPE '\'`.
pub fn contains_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Predicates applied identically to every table of a query.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RecordFilter<'a> {
    pub path: Option<&'a str>,
    pub tags: &'a [String],
    pub row_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct RecordQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Result columns, in order: ord, source_table, row_id, path, sub_file,
/// comment, tags, photo, version.
pub(crate) fn build_record_query(
    tables: &[&CatalogTable],
    filter: RecordFilter<'_>,
) -> Option<RecordQuery> {
    if tables.is_empty() {
        return None;
    }

    let mut parts = Vec::with_capacity(tables.len());
    let mut params = Vec::new();

    for (ord, table) in tables.iter().enumerate() {
        let cols = &table.columns;
        let mut sql = format!(
            "SELECT {ord} AS ord, ? AS source_table, t.rowid AS row_id, \
             t.{path} AS path, t.{sub_file} AS sub_file, t.{comment} AS comment, \
             t.{tags} AS tags, t.{photo} AS photo, COALESCE(v.version, 0) AS version \
             FROM {table} AS t \
             LEFT JOIN record_versions AS v ON v.source_table = ? AND v.row_id = t.rowid",
            path = quote_ident(&cols.path),
            sub_file = quote_ident(&cols.sub_file),
            comment = quote_ident(&cols.comment),
            tags = quote_ident(&cols.tags),
            photo = quote_ident(&cols.photo),
            table = table.quoted_name(),
        );
        params.push(Value::Text(table.name.clone()));
        params.push(Value::Text(table.name.clone()));

        let mut predicates = Vec::new();
        if let Some(row_id) = filter.row_id {
            predicates.push("t.rowid = ?".to_string());
            params.push(Value::Integer(row_id));
        }
        if let Some(text) = filter.path {
            predicates.push(format!("t.{} LIKE ? ESCAPE '\\'", quote_ident(&cols.path)));
            params.push(Value::Text(contains_pattern(text)));
        }
        for tag in filter.tags {
            predicates.push(
                "EXISTS (SELECT 1 FROM record_tags AS rt \
                 WHERE rt.source_table = ? AND rt.row_id = t.rowid AND rt.tag = ? COLLATE NOCASE)"
                    .to_string(),
            );
            params.push(Value::Text(table.name.clone()));
            params.push(Value::Text(tag.clone()));
        }
        if !predicates.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&predicates.join(" AND "));
        }

        parts.push(sql);
    }

    let mut sql = parts.join(" UNION ALL ");
    sql.push_str(" ORDER BY ord, row_id");

    Some(RecordQuery { sql, params })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ColumnConfig;

    fn table(name: &str) -> CatalogTable {
        CatalogTable::new(name, ColumnConfig::default())
    }

    #[test]
    fn test_quote_ident_doubles_quotes() {
        assert_eq!(quote_ident("archive"), "\"archive\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_contains_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("docs"), "%docs%");
        assert_eq!(contains_pattern("100%_a\\b"), "%100\\%\\_a\\\\b%");
    }

    #[test]
    fn test_criteria_emptiness() {
        assert!(SearchCriteria::default().is_empty());
        assert!(SearchCriteria::new(Some(""), &[" ".to_string()]).is_empty());
        assert!(!SearchCriteria::new(Some("/docs"), &[]).is_empty());
        assert!(!SearchCriteria::new(None, &["urgent".to_string()]).is_empty());
    }

    #[test]
    fn test_required_tags_trims_and_dedups() {
        let criteria = SearchCriteria::new(None, &[" a".into(), "b".into(), "a ".into(), "".into()]);
        assert_eq!(criteria.required_tags(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_no_tables_no_query() {
        let filter = RecordFilter {
            path: Some("x"),
            ..Default::default()
        };
        assert!(build_record_query(&[], filter).is_none());
    }

    #[test]
    fn test_union_over_tables_with_tag_predicates() {
        let a = table("archive");
        let b = table("scans");
        let tags = ["x".to_string(), "y".to_string()];
        let filter = RecordFilter {
            path: Some("doc"),
            tags: &tags,
            row_id: None,
        };
        let query = build_record_query(&[&a, &b], filter).unwrap();

        assert_eq!(query.sql.matches(" UNION ALL ").count(), 1);
        assert_eq!(query.sql.matches("EXISTS").count(), 4);
        assert!(query.sql.contains("FROM \"archive\" AS t"));
        assert!(query.sql.contains("FROM \"scans\" AS t"));
        assert!(query.sql.ends_with("ORDER BY ord, row_id"));
        // 2 table-name params + 1 path + 2 per tag, per table
        assert_eq!(query.params.len(), 2 * (2 + 1 + 2 * 2));
    }

    #[test]
    fn test_unfiltered_single_table() {
        let a = table("archive");
        let query = build_record_query(&[&a], RecordFilter::default()).unwrap();
        assert!(!query.sql.contains("WHERE"));
        assert_eq!(query.params.len(), 2);
    }

    #[test]
    fn test_row_id_filter() {
        let a = table("archive");
        let filter = RecordFilter {
            row_id: Some(7),
            ..Default::default()
        };
        let query = build_record_query(&[&a], filter).unwrap();
        assert!(query.sql.contains("WHERE t.rowid = ?"));
        assert_eq!(query.params[2], Value::Integer(7));
    }
}
