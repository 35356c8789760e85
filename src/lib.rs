//! Catalog and tagging administration over imported path records.
//!
//! Catalog tables are filled by an external import process; this crate lets
//! anyone search them by path and tags, and lets admins annotate records,
//! attach photos, curate the tag vocabulary and manage accounts.

pub mod assets;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod handlers;
pub mod logging;
pub mod pagination;
pub mod session;

pub use error::{CatalogError, Result};
