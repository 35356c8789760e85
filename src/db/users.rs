use rusqlite::types::Value;
use rusqlite::OptionalExtension;
use serde::Serialize;

use super::Database;
use crate::error::{map_unique, CatalogError, Result};
use crate::session::Identity;

/// Account data for a new user. The password is plaintext until hashed.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub display_name: Option<String>,
    pub is_admin: bool,
}

/// A registration form: a new user plus the repeated password.
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub user: NewUser,
    pub confirm_password: String,
}

impl Registration {
    pub fn validate(self) -> Result<NewUser> {
        if self.user.username.trim().is_empty() {
            return Err(CatalogError::Validation("username must not be empty".to_string()));
        }
        if self.user.password.is_empty() {
            return Err(CatalogError::Validation("password must not be empty".to_string()));
        }
        if self.user.password != self.confirm_password {
            return Err(CatalogError::Validation("passwords do not match".to_string()));
        }
        Ok(self.user)
    }
}

/// Partial account update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub password: Option<String>,
    pub display_name: Option<String>,
    pub is_admin: Option<bool>,
}

impl UserUpdate {
    fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.password.is_none()
            && self.display_name.is_none()
            && self.is_admin.is_none()
    }
}

/// Account listing entry. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    pub username: String,
    pub display_name: Option<String>,
    pub is_admin: bool,
}

impl From<UserSummary> for Identity {
    fn from(user: UserSummary) -> Self {
        Identity {
            username: user.username,
            display_name: user.display_name,
            is_admin: user.is_admin,
        }
    }
}

fn row_to_summary(row: &rusqlite::Row) -> rusqlite::Result<UserSummary> {
    Ok(UserSummary {
        username: row.get(0)?,
        display_name: row.get(1)?,
        is_admin: row.get::<_, Option<bool>>(2)?.unwrap_or(false),
    })
}

impl Database {
    pub fn register_user(&self, user: &NewUser) -> Result<()> {
        let username = user.username.trim();
        if username.is_empty() || user.password.is_empty() {
            return Err(CatalogError::Validation(
                "username and password are required".to_string(),
            ));
        }

        let hash = bcrypt::hash(&user.password, self.hash_cost)?;
        let display_name = user.display_name.as_deref().filter(|n| !n.trim().is_empty());

        self.conn
            .execute(
                "INSERT INTO users (username, password, name, admin) VALUES (?, ?, ?, ?)",
                rusqlite::params![username, hash, display_name, user.is_admin],
            )
            .map_err(|e| map_unique(e, || format!("user {:?}", username)))?;

        tracing::info!("Registered user {:?} (admin: {})", username, user.is_admin);
        Ok(())
    }

    /// Check a username and password. Unknown users, wrong passwords and
    /// unreadable stored hashes all yield `None`.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<Option<Identity>> {
        let row = self
            .conn
            .query_row(
                "SELECT password, name, admin FROM users WHERE username = ?",
                [username],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<bool>>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((hash, display_name, admin)) = row else {
            tracing::debug!("Login attempt for unknown user {:?}", username);
            return Ok(None);
        };

        match bcrypt::verify(password, &hash) {
            Ok(true) => Ok(Some(Identity {
                username: username.to_string(),
                display_name,
                is_admin: admin.unwrap_or(false),
            })),
            Ok(false) => {
                tracing::debug!("Wrong password for {:?}", username);
                Ok(None)
            }
            Err(e) => {
                tracing::warn!("Unreadable password hash for {:?}: {}", username, e);
                Ok(None)
            }
        }
    }

    /// Apply the given fields to an account. A changed password is re-hashed.
    pub fn update_user(&self, username: &str, update: &UserUpdate) -> Result<()> {
        if update.is_empty() {
            self.get_user(username)?;
            return Ok(());
        }

        let mut sets = Vec::new();
        let mut params: Vec<Value> = Vec::new();

        if let Some(name) = &update.display_name {
            sets.push("name = ?");
            let name = name.trim();
            params.push(if name.is_empty() {
                Value::Null
            } else {
                Value::Text(name.to_string())
            });
        }
        if let Some(admin) = update.is_admin {
            sets.push("admin = ?");
            params.push(Value::Integer(admin as i64));
        }
        if let Some(new_name) = &update.username {
            let new_name = new_name.trim();
            if new_name.is_empty() {
                return Err(CatalogError::Validation("username must not be empty".to_string()));
            }
            sets.push("username = ?");
            params.push(Value::Text(new_name.to_string()));
        }
        if let Some(password) = &update.password {
            if password.is_empty() {
                return Err(CatalogError::Validation("password must not be empty".to_string()));
            }
            sets.push("password = ?");
            params.push(Value::Text(bcrypt::hash(password, self.hash_cost)?));
        }
        params.push(Value::Text(username.to_string()));

        let sql = format!("UPDATE users SET {} WHERE username = ?", sets.join(", "));
        let changed = self
            .conn
            .execute(&sql, rusqlite::params_from_iter(params))
            .map_err(|e| {
                map_unique(e, || {
                    format!("user {:?}", update.username.as_deref().unwrap_or(username))
                })
            })?;

        if changed == 0 {
            return Err(CatalogError::NotFound(format!("user {:?}", username)));
        }
        tracing::info!("Updated user {:?}", username);
        Ok(())
    }

    pub fn delete_user(&self, username: &str) -> Result<()> {
        let changed = self
            .conn
            .execute("DELETE FROM users WHERE username = ?", [username])?;
        if changed == 0 {
            return Err(CatalogError::NotFound(format!("user {:?}", username)));
        }
        tracing::info!("Deleted user {:?}", username);
        Ok(())
    }

    pub fn get_user(&self, username: &str) -> Result<UserSummary> {
        self.conn
            .query_row(
                "SELECT username, name, admin FROM users WHERE username = ?",
                [username],
                row_to_summary,
            )
            .optional()?
            .ok_or_else(|| CatalogError::NotFound(format!("user {:?}", username)))
    }

    pub fn list_users(&self) -> Result<Vec<UserSummary>> {
        let mut stmt = self
            .conn
            .prepare("SELECT username, name, admin FROM users ORDER BY username")?;
        let users = stmt
            .query_map([], row_to_summary)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    pub fn user_count(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::catalog_db;
    use super::*;

    fn alice() -> NewUser {
        NewUser {
            username: "alice".to_string(),
            password: "s3cret".to_string(),
            display_name: Some("Alice".to_string()),
            is_admin: true,
        }
    }

    #[test]
    fn test_registration_validation() {
        let ok = Registration {
            user: alice(),
            confirm_password: "s3cret".to_string(),
        };
        assert_eq!(ok.validate().unwrap().username, "alice");

        let mismatch = Registration {
            user: alice(),
            confirm_password: "other".to_string(),
        };
        assert!(matches!(mismatch.validate(), Err(CatalogError::Validation(_))));

        let blank = Registration {
            user: NewUser {
                username: "  ".to_string(),
                ..alice()
            },
            confirm_password: "s3cret".to_string(),
        };
        assert!(matches!(blank.validate(), Err(CatalogError::Validation(_))));
    }

    #[test]
    fn test_register_and_authenticate() {
        let db = catalog_db();
        db.register_user(&alice()).unwrap();

        let identity = db.authenticate("alice", "s3cret").unwrap().unwrap();
        assert_eq!(identity.username, "alice");
        assert_eq!(identity.display_name.as_deref(), Some("Alice"));
        assert!(identity.is_admin);

        assert!(db.authenticate("alice", "wrong").unwrap().is_none());
        assert!(db.authenticate("bob", "s3cret").unwrap().is_none());
    }

    #[test]
    fn test_password_is_stored_hashed() {
        let db = catalog_db();
        db.register_user(&alice()).unwrap();
        let stored: String = db
            .conn
            .query_row("SELECT password FROM users WHERE username = 'alice'", [], |row| row.get(0))
            .unwrap();
        assert_ne!(stored, "s3cret");
        assert!(stored.starts_with("$2"));
    }

    #[test]
    fn test_corrupt_hash_fails_closed() {
        let db = catalog_db();
        db.conn
            .execute(
                "INSERT INTO users (username, password, name, admin) VALUES ('legacy', 'plaintext', NULL, 0)",
                [],
            )
            .unwrap();
        assert!(db.authenticate("legacy", "plaintext").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_username() {
        let db = catalog_db();
        db.register_user(&alice()).unwrap();
        assert!(matches!(
            db.register_user(&alice()),
            Err(CatalogError::DuplicateKey(_))
        ));
    }

    #[test]
    fn test_empty_credentials_rejected() {
        let db = catalog_db();
        let user = NewUser {
            password: String::new(),
            ..alice()
        };
        assert!(matches!(db.register_user(&user), Err(CatalogError::Validation(_))));
    }

    #[test]
    fn test_update_password_and_rename() {
        let db = catalog_db();
        db.register_user(&alice()).unwrap();

        db.update_user(
            "alice",
            &UserUpdate {
                password: Some("n3w".to_string()),
                is_admin: Some(false),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(db.authenticate("alice", "s3cret").unwrap().is_none());
        let identity = db.authenticate("alice", "n3w").unwrap().unwrap();
        assert!(!identity.is_admin);

        db.update_user(
            "alice",
            &UserUpdate {
                username: Some("alicia".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(matches!(db.get_user("alice"), Err(CatalogError::NotFound(_))));
        assert!(db.authenticate("alicia", "n3w").unwrap().is_some());
    }

    #[test]
    fn test_rename_onto_existing_user() {
        let db = catalog_db();
        db.register_user(&alice()).unwrap();
        db.register_user(&NewUser {
            username: "bob".to_string(),
            ..alice()
        })
        .unwrap();

        let err = db
            .update_user(
                "bob",
                &UserUpdate {
                    username: Some("alice".to_string()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateKey(_)));
    }

    #[test]
    fn test_update_and_delete_missing_user() {
        let db = catalog_db();
        let update = UserUpdate {
            display_name: Some("Nobody".to_string()),
            ..Default::default()
        };
        assert!(matches!(db.update_user("ghost", &update), Err(CatalogError::NotFound(_))));
        assert!(matches!(
            db.update_user("ghost", &UserUpdate::default()),
            Err(CatalogError::NotFound(_))
        ));
        assert!(matches!(db.delete_user("ghost"), Err(CatalogError::NotFound(_))));
    }

    #[test]
    fn test_list_users_is_sorted_and_hash_free() {
        let db = catalog_db();
        for name in ["carol", "alice", "bob"] {
            db.register_user(&NewUser {
                username: name.to_string(),
                display_name: None,
                is_admin: false,
                password: "pw".to_string(),
            })
            .unwrap();
        }
        let users = db.list_users().unwrap();
        let names: Vec<_> = users.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob", "carol"]);
        assert_eq!(db.user_count().unwrap(), 3);

        db.delete_user("bob").unwrap();
        assert_eq!(db.user_count().unwrap(), 2);
        assert!(matches!(db.delete_user("bob"), Err(CatalogError::NotFound(_))));
    }
}
