//! Photo files attached to catalog records.
//!
//! A record stores a photo reference: a `/`-separated path relative to the
//! asset root, such as `img/archive/12_scan.png`. References that would
//! escape the root are never followed.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::collections::HashSet;
use std::fs;
use std::io::{Cursor, ErrorKind};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use crate::config::AssetConfig;
use crate::error::{CatalogError, Result};

pub struct AssetManager {
    root: PathBuf,
    images_dir: PathBuf,
    max_filename_len: usize,
}

/// An upload written to a temporary file beside its final location.
#[derive(Debug)]
pub struct StagedPhoto {
    photo_ref: String,
    temp: PathBuf,
    target: PathBuf,
    len: usize,
}

impl StagedPhoto {
    /// Reference the photo will have once committed.
    pub fn photo_ref(&self) -> &str {
        &self.photo_ref
    }
}

/// Outcome of an orphan sweep.
#[derive(Debug, Clone, Default)]
pub struct PruneReport {
    pub files_removed: usize,
    pub bytes_freed: u64,
    pub removed: Vec<String>,
}

/// Keep letters, digits, `-`, `_` and `.`; everything else becomes `_`.
///
/// Leading dots are dropped so the result is never hidden or a parent
/// reference. Long names are cut to `max_len` characters, keeping the
/// extension where it fits.
pub fn sanitize_filename(name: &str, max_len: usize) -> String {
    // Browsers on Windows may send the full client path
    let base = name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(name);

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '_') {
        return "photo".to_string();
    }

    let max_len = max_len.max(1);
    if cleaned.chars().count() <= max_len {
        return cleaned.to_string();
    }

    match cleaned.rfind('.') {
        Some(dot) if cleaned[dot..].chars().count() < max_len => {
            let ext = &cleaned[dot..];
            let keep = max_len - ext.chars().count();
            let stem: String = cleaned[..dot].chars().take(keep).collect();
            format!("{}{}", stem, ext)
        }
        _ => cleaned.chars().take(max_len).collect(),
    }
}

/// Directory name for a catalog table's photos.
///
/// Letters, digits, `-` and `_` are kept; every other character is
/// percent-encoded byte by byte, so distinct table names never share a
/// directory.
pub fn table_dir_name(table: &str) -> String {
    let mut out = String::with_capacity(table.len());
    for c in table.chars() {
        if c.is_alphanumeric() || matches!(c, '-' | '_') {
            out.push(c);
        } else {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                out.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    out
}

/// Canonical form of a stored reference: forward slashes, no leading `./`.
pub fn normalize_ref(photo_ref: &str) -> String {
    let unified = photo_ref.trim().replace('\\', "/");
    let mut rest = unified.as_str();
    while let Some(stripped) = rest.strip_prefix("./") {
        rest = stripped;
    }
    rest.to_string()
}

fn path_to_ref(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

impl AssetManager {
    pub fn new(config: &AssetConfig) -> Self {
        Self {
            root: config.root.clone(),
            images_dir: config.images_dir.clone(),
            max_filename_len: config.max_filename_len,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path for a reference, or `None` when the reference is empty,
    /// absolute, or climbs out of the asset root.
    pub fn resolve(&self, photo_ref: &str) -> Option<PathBuf> {
        let normalized = normalize_ref(photo_ref);
        if normalized.is_empty() {
            return None;
        }
        let relative = Path::new(&normalized);
        let mut path = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(path)
    }

    /// Write an uploaded photo for a record and return its reference.
    ///
    /// The file lands at `<images_dir>/<table>/<row_id>_<sanitized name>`;
    /// an existing file with that name is replaced.
    pub fn store(&self, table: &str, row_id: i64, bytes: &[u8], original_filename: &str) -> Result<String> {
        let staged = self.stage(table, row_id, bytes, original_filename)?;
        self.commit(staged)
    }

    /// Write an upload next to its final location without touching any
    /// existing file there. Finish with `commit` or `discard`.
    pub fn stage(&self, table: &str, row_id: i64, bytes: &[u8], original_filename: &str) -> Result<StagedPhoto> {
        let file_name = format!(
            "{}_{}",
            row_id,
            sanitize_filename(original_filename, self.max_filename_len)
        );

        let relative = self.images_dir.join(table_dir_name(table)).join(&file_name);
        let photo_ref = path_to_ref(&relative);
        let target = self
            .resolve(&photo_ref)
            .ok_or_else(|| CatalogError::Validation(format!("invalid images directory {:?}", self.images_dir)))?;

        // Sanitized names never start with a dot, so this cannot clash with a photo
        let temp = target.with_file_name(format!(".{}.upload", file_name));

        if let Some(dir) = target.parent() {
            fs::create_dir_all(dir).map_err(|e| CatalogError::storage(dir, e))?;
        }
        fs::write(&temp, bytes).map_err(|e| CatalogError::storage(&temp, e))?;

        Ok(StagedPhoto {
            photo_ref,
            temp,
            target,
            len: bytes.len(),
        })
    }

    /// Move a staged upload into place, replacing any file of the same name.
    pub fn commit(&self, staged: StagedPhoto) -> Result<String> {
        if let Err(e) = fs::rename(&staged.temp, &staged.target) {
            let _ = fs::remove_file(&staged.temp);
            return Err(CatalogError::storage(&staged.target, e));
        }
        tracing::info!("Stored photo {} ({} bytes)", staged.photo_ref, staged.len);
        Ok(staged.photo_ref)
    }

    /// Drop a staged upload.
    pub fn discard(&self, staged: StagedPhoto) {
        if let Err(e) = fs::remove_file(&staged.temp) {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!("Failed to remove staged upload {:?}: {}", staged.temp, e);
            }
        }
    }

    /// Whether two references name the same file.
    pub fn same_file(&self, a: &str, b: &str) -> bool {
        match (self.resolve(a), self.resolve(b)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Remove a photo file. Returns whether a file was actually removed;
    /// a missing file or an unresolvable reference is not an error.
    pub fn delete(&self, photo_ref: &str) -> Result<bool> {
        let Some(path) = self.resolve(photo_ref) else {
            tracing::warn!("Not deleting photo with unsafe reference {:?}", photo_ref);
            return Ok(false);
        };
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("Photo {:?} already gone", path);
                Ok(false)
            }
            Err(e) => Err(CatalogError::storage(path, e)),
        }
    }

    pub fn exists(&self, photo_ref: &str) -> bool {
        self.resolve(photo_ref).is_some_and(|p| p.is_file())
    }

    /// Raw bytes of a photo, or `None` when there is nothing to show.
    pub fn to_displayable(&self, photo_ref: &str) -> Option<Vec<u8>> {
        let path = self.resolve(photo_ref)?;
        match fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!("Failed to read photo {:?}: {}", path, e);
                None
            }
        }
    }

    /// Photo as a `data:` URI suitable for inline display.
    pub fn to_data_uri(&self, photo_ref: &str) -> Option<String> {
        let bytes = self.to_displayable(photo_ref)?;
        Some(data_uri(&bytes))
    }

    /// PNG thumbnail bounded by `width` x `height`, keeping aspect ratio.
    pub fn thumbnail(&self, photo_ref: &str, width: u32, height: u32) -> Option<Vec<u8>> {
        let bytes = self.to_displayable(photo_ref)?;
        let img = match image::load_from_memory(&bytes) {
            Ok(img) => img,
            Err(e) => {
                tracing::debug!("Cannot decode photo {}: {}", photo_ref, e);
                return None;
            }
        };

        let thumb = img.thumbnail(width.max(1), height.max(1));
        let mut out = Cursor::new(Vec::new());
        match thumb.write_to(&mut out, image::ImageFormat::Png) {
            Ok(()) => Some(out.into_inner()),
            Err(e) => {
                tracing::warn!("Failed to encode thumbnail for {}: {}", photo_ref, e);
                None
            }
        }
    }

    pub fn thumbnail_data_uri(&self, photo_ref: &str, width: u32, height: u32) -> Option<String> {
        self.thumbnail(photo_ref, width, height)
            .map(|png| data_uri(&png))
    }

    /// Delete files under the images directory that no record references.
    pub fn prune_orphans(&self, referenced: &HashSet<String>, dry_run: bool) -> Result<PruneReport> {
        let referenced: HashSet<String> = referenced.iter().map(|r| normalize_ref(r)).collect();
        let images_root = self.root.join(&self.images_dir);
        let mut report = PruneReport::default();

        if !images_root.is_dir() {
            return Ok(report);
        }

        for entry in WalkDir::new(&images_root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let photo_ref = path_to_ref(relative);
            if referenced.contains(&photo_ref) {
                continue;
            }

            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            if !dry_run {
                fs::remove_file(entry.path()).map_err(|e| CatalogError::storage(entry.path(), e))?;
                tracing::info!("Pruned orphaned photo {}", photo_ref);
            }
            report.files_removed += 1;
            report.bytes_freed += size;
            report.removed.push(photo_ref);
        }

        report.removed.sort();
        Ok(report)
    }
}

fn data_uri(bytes: &[u8]) -> String {
    let mime = image::guess_format(bytes)
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream");
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}
