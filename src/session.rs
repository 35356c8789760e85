//! Per-request caller identity and listing state.
//!
//! Nothing here is global: the front end builds a `RequestContext` for every
//! request and hands it to the handlers.

use serde::Serialize;

use crate::db::SearchCriteria;
use crate::error::{CatalogError, Result};

/// An authenticated account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub username: String,
    pub display_name: Option<String>,
    pub is_admin: bool,
}

impl Identity {
    /// Display name when set, otherwise the username.
    pub fn display_label(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.username)
    }
}

/// Table, filter and page of an admin listing.
///
/// Changing the table or the filter returns to the first page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingState {
    table: Option<String>,
    criteria: SearchCriteria,
    page: usize,
}

impl Default for ListingState {
    fn default() -> Self {
        Self {
            table: None,
            criteria: SearchCriteria::default(),
            page: 1,
        }
    }
}

impl ListingState {
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn criteria(&self) -> &SearchCriteria {
        &self.criteria
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn set_table(&mut self, table: Option<&str>) {
        let table = table.filter(|t| !t.is_empty()).map(str::to_string);
        if table != self.table {
            self.table = table;
            self.page = 1;
        }
    }

    pub fn set_criteria(&mut self, criteria: SearchCriteria) {
        if criteria != self.criteria {
            self.criteria = criteria;
            self.page = 1;
        }
    }

    pub fn set_page(&mut self, page: usize) {
        self.page = page.max(1);
    }
}

#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub identity: Option<Identity>,
    pub listing: ListingState,
}

impl RequestContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
            listing: ListingState::default(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.identity.as_ref().is_some_and(|i| i.is_admin)
    }

    /// The caller's identity, if it carries the admin flag.
    pub fn require_admin(&self) -> Result<&Identity> {
        match &self.identity {
            Some(identity) if identity.is_admin => Ok(identity),
            _ => Err(CatalogError::PermissionDenied),
        }
    }

    pub fn username(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.username.as_str())
    }
}
