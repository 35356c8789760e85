//! Request handlers shared by every front end.
//!
//! Each handler receives the caller's `RequestContext` explicitly and checks
//! permissions before touching a store.

use crate::assets::AssetManager;
use crate::db::{Database, Record, RecordEdit, Registration, SearchCriteria, Tag, UserSummary, UserUpdate};
use crate::error::{CatalogError, Result};
use crate::session::RequestContext;

/// An uploaded photo as received from the client.
#[derive(Debug, Clone, Copy)]
pub struct PhotoUpload<'a> {
    pub file_name: &'a str,
    pub bytes: &'a [u8],
}

#[derive(Debug, Clone, Copy, Default)]
pub enum PhotoChange<'a> {
    #[default]
    Keep,
    Clear,
    Replace(PhotoUpload<'a>),
}

/// Admin edit form for one record.
#[derive(Debug, Clone, Default)]
pub struct EditForm<'a> {
    pub comment: String,
    pub tags: Vec<String>,
    pub photo: PhotoChange<'a>,
    pub expected_version: Option<i64>,
}

/// Log in; `None` for any invalid combination of username and password.
pub fn login(db: &Database, username: &str, password: &str) -> Result<Option<RequestContext>> {
    Ok(db
        .authenticate(username, password)?
        .map(RequestContext::authenticated))
}

/// Anonymous search by path text and tags.
pub fn public_search(db: &Database, criteria: &SearchCriteria) -> Result<Vec<Record>> {
    db.search_public(criteria)
}

/// Records for the admin listing described by `ctx.listing`.
///
/// With a table selected, that table is listed (filtered by path text);
/// without one, the path text is searched across all tables. Required tags
/// narrow either result.
pub fn admin_listing(ctx: &RequestContext, db: &Database) -> Result<Vec<Record>> {
    ctx.require_admin()?;
    let criteria = ctx.listing.criteria();

    let records = match ctx.listing.table() {
        Some(table) => db.get_records(table, criteria.path_text())?,
        None => db.search_all(criteria.path_text())?,
    };

    let required = criteria.required_tags();
    if required.is_empty() {
        return Ok(records);
    }
    Ok(records
        .into_iter()
        .filter(|record| {
            let tags = record.tag_list();
            required
                .iter()
                .all(|t| tags.iter().any(|have| have.eq_ignore_ascii_case(t)))
        })
        .collect())
}

/// Apply an edit form.
///
/// An uploaded photo is staged beside its final location and only moved into
/// place once the record update has committed, so a rejected edit never
/// touches existing files. A replaced or cleared photo file is removed after
/// the commit unless the new photo took over the same file.
pub fn edit_record(
    ctx: &RequestContext,
    db: &Database,
    assets: &AssetManager,
    table: &str,
    row_id: i64,
    form: &EditForm<'_>,
) -> Result<Record> {
    let identity = ctx.require_admin()?;
    let current = db.get_record(table, row_id)?;

    let (photo_ref, staged) = match form.photo {
        PhotoChange::Keep => (current.photo_ref.clone(), None),
        PhotoChange::Clear => (None, None),
        PhotoChange::Replace(upload) => {
            let staged = assets.stage(table, row_id, upload.bytes, upload.file_name)?;
            (Some(staged.photo_ref().to_string()), Some(staged))
        }
    };

    let edit = RecordEdit {
        comment: form.comment.clone(),
        tags: form.tags.clone(),
        photo_ref: photo_ref.clone(),
        expected_version: form.expected_version,
        edited_by: Some(identity.username.clone()),
    };

    let updated = match db.update_record(table, row_id, &edit) {
        Ok(record) => record,
        Err(e) => {
            if let Some(staged) = staged {
                assets.discard(staged);
            }
            return Err(e);
        }
    };

    if let Some(staged) = staged {
        if let Err(e) = assets.commit(staged) {
            tracing::error!(
                "Record {}#{} saved but its new photo could not be moved into place: {}",
                table,
                row_id,
                e
            );
            return Err(e);
        }
    }

    if let Some(old) = current.photo_ref {
        let kept = photo_ref
            .as_deref()
            .is_some_and(|new| assets.same_file(&old, new));
        if !kept {
            match assets.delete(&old) {
                Ok(_) => tracing::info!("Removed previous photo {} of {}#{}", old, table, row_id),
                Err(e) => tracing::warn!("Failed to remove previous photo {}: {}", old, e),
            }
        }
    }

    Ok(updated)
}

pub fn delete_record(
    ctx: &RequestContext,
    db: &Database,
    assets: &AssetManager,
    table: &str,
    row_id: i64,
) -> Result<()> {
    let identity = ctx.require_admin()?;
    db.delete_record(table, row_id, assets)?;
    tracing::info!("{} deleted record {}#{}", identity.username, table, row_id);
    Ok(())
}

/// Tag vocabulary, readable by anyone for filter suggestions.
pub fn list_tags(db: &Database) -> Result<Vec<Tag>> {
    db.list_tags()
}

pub fn create_tag(ctx: &RequestContext, db: &Database, name: &str, description: Option<&str>) -> Result<i64> {
    ctx.require_admin()?;
    db.create_tag(name, description)
}

pub fn update_tag(
    ctx: &RequestContext,
    db: &Database,
    id: i64,
    name: &str,
    description: Option<&str>,
) -> Result<()> {
    ctx.require_admin()?;
    db.update_tag(id, name, description)
}

pub fn delete_tag(ctx: &RequestContext, db: &Database, id: i64) -> Result<()> {
    ctx.require_admin()?;
    db.delete_tag(id)
}

/// Register an account. Only admins may register users, except for the
/// very first account, which is always created as an admin.
pub fn register_user(ctx: &RequestContext, db: &Database, form: Registration) -> Result<()> {
    let mut user = form.validate()?;
    if db.user_count()? == 0 {
        if !user.is_admin {
            tracing::info!("First account {:?} is made an admin", user.username);
        }
        user.is_admin = true;
    } else {
        ctx.require_admin()?;
    }
    db.register_user(&user)
}

pub fn list_users(ctx: &RequestContext, db: &Database) -> Result<Vec<UserSummary>> {
    ctx.require_admin()?;
    db.list_users()
}

pub fn update_user(ctx: &RequestContext, db: &Database, username: &str, update: &UserUpdate) -> Result<()> {
    ctx.require_admin()?;
    db.update_user(username, update)
}

pub fn delete_user(ctx: &RequestContext, db: &Database, username: &str) -> Result<()> {
    let identity = ctx.require_admin()?;
    if identity.username == username {
        return Err(CatalogError::Validation(
            "an admin cannot delete their own account".to_string(),
        ));
    }
    db.delete_user(username)
}
