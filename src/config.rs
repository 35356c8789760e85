use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default)]
    pub assets: AssetConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub listing: ListingConfig,
}

/// Where photo files live. Photo references stored on records are relative
/// to `root`, e.g. `img/archive_2019/12_scan.png`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetConfig {
    #[serde(default = "default_asset_root")]
    pub root: PathBuf,

    /// Images directory, relative to `root`.
    #[serde(default = "default_images_dir")]
    pub images_dir: PathBuf,

    /// Upper bound on the sanitized upload filename length.
    #[serde(default = "default_max_filename_len")]
    pub max_filename_len: usize,
}

fn default_asset_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tagdesk")
}

fn default_images_dir() -> PathBuf {
    PathBuf::from("img")
}

fn default_max_filename_len() -> usize {
    120
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            root: default_asset_root(),
            images_dir: default_images_dir(),
            max_filename_len: default_max_filename_len(),
        }
    }
}

/// Column names of a catalog table. The defaults match the import format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnConfig {
    #[serde(default = "default_path_column")]
    pub path: String,

    #[serde(default = "default_sub_file_column")]
    pub sub_file: String,

    #[serde(default = "default_comment_column")]
    pub comment: String,

    #[serde(default = "default_photo_column")]
    pub photo: String,

    #[serde(default = "default_tags_column")]
    pub tags: String,
}

fn default_path_column() -> String {
    "Путь".to_string()
}

fn default_sub_file_column() -> String {
    "Подфайл".to_string()
}

fn default_comment_column() -> String {
    "Комментарий".to_string()
}

fn default_photo_column() -> String {
    "Фото".to_string()
}

fn default_tags_column() -> String {
    "tags".to_string()
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            path: default_path_column(),
            sub_file: default_sub_file_column(),
            comment: default_comment_column(),
            photo: default_photo_column(),
            tags: default_tags_column(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    pub name: String,

    /// Per-table column overrides; falls back to `catalog.columns`.
    #[serde(default)]
    pub columns: Option<ColumnConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Known catalog tables, in display order. When empty, the tables found
    /// in the database at startup are registered instead.
    #[serde(default)]
    pub tables: Vec<TableConfig>,

    #[serde(default)]
    pub columns: ColumnConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// bcrypt work factor (4..=31).
    #[serde(default = "default_hash_cost")]
    pub hash_cost: u32,
}

fn default_hash_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            hash_cost: default_hash_cost(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Bounding box of photo thumbnails in listings.
    #[serde(default = "default_thumbnail_width")]
    pub thumbnail_width: u32,

    #[serde(default = "default_thumbnail_height")]
    pub thumbnail_height: u32,
}

fn default_page_size() -> usize {
    30
}

fn default_thumbnail_width() -> u32 {
    150
}

fn default_thumbnail_height() -> u32 {
    100
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            thumbnail_width: default_thumbnail_width(),
            thumbnail_height: default_thumbnail_height(),
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tagdesk")
        .join("app.db")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            assets: AssetConfig::default(),
            catalog: CatalogConfig::default(),
            auth: AuthConfig::default(),
            listing: ListingConfig::default(),
        }
    }
}

impl Config {
    /// Load from the default location, writing a default config there first if none exists.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// `TAGDESK_CONFIG` if set, otherwise `$XDG_CONFIG_HOME/tagdesk/config.toml`.
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("TAGDESK_CONFIG") {
            return PathBuf::from(path);
        }

        Self::config_dir().join("config.toml")
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tagdesk")
    }
}
