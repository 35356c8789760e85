use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::db::Record;

/// Export format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }

    /// Guess the format from a file extension, defaulting to JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => ExportFormat::Csv,
            _ => ExportFormat::Json,
        }
    }
}

/// Flat record shape shared by both formats
#[derive(Debug, Serialize)]
struct ExportedRecord<'a> {
    table: &'a str,
    row_id: i64,
    path: &'a str,
    sub_file: &'a str,
    comment: &'a str,
    tags: Vec<String>,
    photo: &'a str,
    version: i64,
}

impl<'a> From<&'a Record> for ExportedRecord<'a> {
    fn from(record: &'a Record) -> Self {
        Self {
            table: &record.source_table,
            row_id: record.row_id,
            path: &record.path,
            sub_file: record.sub_file.as_deref().unwrap_or(""),
            comment: record.comment.as_deref().unwrap_or(""),
            tags: record.tag_list(),
            photo: record.photo_ref.as_deref().unwrap_or(""),
            version: record.version,
        }
    }
}

/// Write records to a file, returning how many were written
pub fn export_records(records: &[Record], output_path: &Path, format: ExportFormat) -> Result<usize> {
    let rows: Vec<ExportedRecord> = records.iter().map(ExportedRecord::from).collect();

    match format {
        ExportFormat::Json => export_json(&rows, output_path),
        ExportFormat::Csv => export_csv(&rows, output_path),
    }
    .with_context(|| format!("Failed to export records to {:?}", output_path))?;

    tracing::info!("Exported {} records to {:?}", rows.len(), output_path);
    Ok(rows.len())
}

fn export_json(rows: &[ExportedRecord], output_path: &Path) -> Result<()> {
    let mut file = BufWriter::new(File::create(output_path)?);
    serde_json::to_writer_pretty(&mut file, rows)?;
    file.write_all(b"\n")?;
    file.flush()?;
    Ok(())
}

fn export_csv(rows: &[ExportedRecord], output_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(output_path)?;

    wtr.write_record([
        "table", "row_id", "path", "sub_file", "comment", "tags", "photo", "version",
    ])?;

    for row in rows {
        let row_id = row.row_id.to_string();
        let tags = row.tags.join(",");
        let version = row.version.to_string();
        wtr.write_record([
            row.table,
            row_id.as_str(),
            row.path,
            row.sub_file,
            row.comment,
            tags.as_str(),
            row.photo,
            version.as_str(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
