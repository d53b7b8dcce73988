use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use efc_types::permissions::{ActorUser, Permission};

use crate::error::unique_violation;
use crate::models::{USER_COLUMNS, UserRow, now_timestamp, user_from_row};
use crate::roles::{query_default_role, query_role, query_role_with_permissions};
use crate::{Database, Result, StoreError};

const USER_UNIQUE: &[(&str, &'static str)] = &[("users.email", "email"), ("users.username", "username")];

pub struct NewUser<'a> {
    pub email: &'a str,
    pub username: &'a str,
    pub password_hash: &'a str,
}

/// Fields an administrator may overwrite on any account.
pub struct AdminUserUpdate<'a> {
    pub email: &'a str,
    pub username: &'a str,
    pub confirmed: bool,
    pub role_id: i64,
    pub name: Option<&'a str>,
    pub location: Option<&'a str>,
    pub about_me: Option<&'a str>,
}

impl Database {
    /// Creates an account. The role is fixed here: `admin_email` gets the
    /// full-permission role, everyone else the current default role.
    pub fn create_user(&self, new: &NewUser<'_>, admin_email: Option<&str>) -> Result<UserRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            ensure_unique(&tx, "email", new.email, None)?;
            ensure_unique(&tx, "username", new.username, None)?;

            let mut role = None;
            if admin_email.is_some_and(|admin| admin.eq_ignore_ascii_case(new.email)) {
                role = query_role_with_permissions(&tx, Permission::FULL)?;
            }
            if role.is_none() {
                role = query_default_role(&tx)?;
            }
            let role = role.ok_or(StoreError::NotFound("default role"))?;

            let now = now_timestamp();
            tx.execute(
                "INSERT INTO users (email, username, password_hash, role_id, member_since, last_seen)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                rusqlite::params![new.email, new.username, new.password_hash, role.id, now],
            )
            .map_err(|e| unique_violation(e, USER_UNIQUE))?;
            let id = tx.last_insert_rowid();
            let user = query_user(&tx, "id", &id)?.ok_or(StoreError::NotFound("user"))?;
            tx.commit()?;

            info!("Registered user '{}' with role '{}'", user.username, role.name);
            Ok(user)
        })
    }

    pub fn get_user(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", &id))
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", &email))
    }

    pub fn find_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", &username))
    }

    /// The user joined with their role, as the authorization guard needs it.
    pub fn load_actor(&self, user_id: i64) -> Result<Option<ActorUser>> {
        self.with_conn(|conn| {
            let actor = conn
                .query_row(
                    "SELECT u.id, u.username, u.email, u.confirmed, u.can_comment, u.role_id, r.permissions
                     FROM users u
                     JOIN roles r ON r.id = u.role_id
                     WHERE u.id = ?1",
                    [user_id],
                    |row| {
                        Ok(ActorUser {
                            id: row.get(0)?,
                            username: row.get(1)?,
                            email: row.get(2)?,
                            confirmed: row.get(3)?,
                            can_comment: row.get(4)?,
                            role_id: row.get(5)?,
                            role_permissions: Permission::from_stored(row.get(6)?),
                        })
                    },
                )
                .optional()?;
            Ok(actor)
        })
    }

    pub fn touch_last_seen(&self, user_id: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET last_seen = ?1 WHERE id = ?2",
                rusqlite::params![now_timestamp(), user_id],
            )?;
            Ok(())
        })
    }

    /// Marks the account confirmed. Returns false when it already was.
    pub fn confirm_user(&self, user_id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let user = query_user(conn, "id", &user_id)?.ok_or(StoreError::NotFound("user"))?;
            if user.confirmed {
                return Ok(false);
            }
            conn.execute("UPDATE users SET confirmed = 1 WHERE id = ?1", [user_id])?;
            info!("User '{}' confirmed their account", user.username);
            Ok(true)
        })
    }

    pub fn set_password_hash(&self, user_id: i64, password_hash: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE users SET password_hash = ?1 WHERE id = ?2",
                rusqlite::params![password_hash, user_id],
            )?;
            if n == 0 {
                return Err(StoreError::NotFound("user"));
            }
            Ok(())
        })
    }

    /// Parks a new address until the owner confirms it.
    pub fn set_temp_email(&self, user_id: i64, email: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            ensure_unique(conn, "email", email, Some(user_id))?;
            let n = conn.execute(
                "UPDATE users SET temp_email = ?1 WHERE id = ?2",
                rusqlite::params![email, user_id],
            )?;
            if n == 0 {
                return Err(StoreError::NotFound("user"));
            }
            Ok(())
        })
    }

    /// Promotes the parked address to the account email when it is still
    /// `expected`. Returns the new address, or `None` when nothing matching
    /// is pending.
    pub fn apply_email_change(&self, user_id: i64, expected: &str) -> Result<Option<String>> {
        self.with_conn_mut(|conn| {
            let user = query_user(conn, "id", &user_id)?.ok_or(StoreError::NotFound("user"))?;
            let Some(new_email) = user.temp_email.filter(|e| e == expected) else {
                return Ok(None);
            };
            ensure_unique(conn, "email", &new_email, Some(user_id))?;
            conn.execute(
                "UPDATE users SET email = ?1, temp_email = NULL WHERE id = ?2",
                rusqlite::params![new_email, user_id],
            )
            .map_err(|e| unique_violation(e, USER_UNIQUE))?;
            info!("User '{}' changed their email", user.username);
            Ok(Some(new_email))
        })
    }

    pub fn update_profile(
        &self,
        user_id: i64,
        name: Option<&str>,
        location: Option<&str>,
        about_me: Option<&str>,
    ) -> Result<UserRow> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE users SET name = ?1, location = ?2, about_me = ?3 WHERE id = ?4",
                rusqlite::params![name, location, about_me, user_id],
            )?;
            if n == 0 {
                return Err(StoreError::NotFound("user"));
            }
            query_user(conn, "id", &user_id)?.ok_or(StoreError::NotFound("user"))
        })
    }

    pub fn admin_update_user(&self, user_id: i64, update: &AdminUserUpdate<'_>) -> Result<UserRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if query_user(&tx, "id", &user_id)?.is_none() {
                return Err(StoreError::NotFound("user"));
            }
            if query_role(&tx, update.role_id)?.is_none() {
                return Err(StoreError::NotFound("role"));
            }
            ensure_unique(&tx, "email", update.email, Some(user_id))?;
            ensure_unique(&tx, "username", update.username, Some(user_id))?;

            tx.execute(
                "UPDATE users
                 SET email = ?1, username = ?2, confirmed = ?3, role_id = ?4,
                     name = ?5, location = ?6, about_me = ?7
                 WHERE id = ?8",
                rusqlite::params![
                    update.email,
                    update.username,
                    update.confirmed,
                    update.role_id,
                    update.name,
                    update.location,
                    update.about_me,
                    user_id
                ],
            )
            .map_err(|e| unique_violation(e, USER_UNIQUE))?;
            let user = query_user(&tx, "id", &user_id)?.ok_or(StoreError::NotFound("user"))?;
            tx.commit()?;
            Ok(user)
        })
    }

    /// Freezes (`false`) or unfreezes (`true`) a single account's commenting.
    /// The user's role is left alone.
    pub fn set_can_comment(&self, user_id: i64, can_comment: bool) -> Result<UserRow> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE users SET can_comment = ?1 WHERE id = ?2",
                rusqlite::params![can_comment, user_id],
            )?;
            if n == 0 {
                return Err(StoreError::NotFound("user"));
            }
            let user = query_user(conn, "id", &user_id)?.ok_or(StoreError::NotFound("user"))?;
            info!(
                "User '{}' {}",
                user.username,
                if can_comment { "unfrozen" } else { "frozen" }
            );
            Ok(user)
        })
    }

    /// Users who currently cannot comment, whether frozen individually or
    /// because their role lacks COMMENT.
    pub fn list_frozen_users(&self) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM users
                 WHERE can_comment = 0
                    OR role_id IN (SELECT id FROM roles WHERE (permissions & ?1) = 0)
                 ORDER BY id",
                USER_COLUMNS
            ))?;
            let rows = stmt
                .query_map([Permission::COMMENT.to_stored()], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

/// `column` is one of our own column names, never user input.
fn query_user(conn: &Connection, column: &str, value: &dyn rusqlite::ToSql) -> Result<Option<UserRow>> {
    let row = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1"),
            &[value],
            user_from_row,
        )
        .optional()?;
    Ok(row)
}

/// Fails with `Conflict` when another account already holds `value`.
fn ensure_unique(conn: &Connection, field: &'static str, value: &str, except: Option<i64>) -> Result<()> {
    let taken: Option<i64> = conn
        .query_row(
            &format!("SELECT id FROM users WHERE {field} = ?1"),
            &[value],
            |row| row.get(0),
        )
        .optional()?;
    match taken {
        Some(id) if Some(id) != except => Err(StoreError::Conflict { field }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::open_temp;

    fn register(db: &Database, email: &str, username: &str) -> UserRow {
        db.create_user(
            &NewUser {
                email,
                username,
                password_hash: "hash",
            },
            Some("admin@example.com"),
        )
        .unwrap()
    }

    #[test]
    fn role_resolved_at_creation() {
        let (_dir, db) = open_temp();
        let admin = register(&db, "admin@example.com", "admin");
        let plain = register(&db, "bob@example.com", "bob");

        let admin_actor = db.load_actor(admin.id).unwrap().unwrap();
        assert_eq!(admin_actor.role_permissions, Permission::FULL);
        assert!(admin_actor.is_administrator());

        let plain_actor = db.load_actor(plain.id).unwrap().unwrap();
        assert_eq!(
            plain_actor.role_permissions,
            Permission::CHECK_DOWNLOAD | Permission::COMMENT
        );
        assert!(!plain.confirmed);
    }

    #[test]
    fn duplicate_email_and_username_conflict() {
        let (_dir, db) = open_temp();
        register(&db, "bob@example.com", "bob");

        let dup_email = db.create_user(
            &NewUser {
                email: "bob@example.com",
                username: "bobby",
                password_hash: "h",
            },
            None,
        );
        assert!(matches!(dup_email, Err(StoreError::Conflict { field: "email" })));

        let dup_name = db.create_user(
            &NewUser {
                email: "other@example.com",
                username: "bob",
                password_hash: "h",
            },
            None,
        );
        assert!(matches!(dup_name, Err(StoreError::Conflict { field: "username" })));
    }

    #[test]
    fn freeze_is_per_user() {
        let (_dir, db) = open_temp();
        let bob = register(&db, "bob@example.com", "bob");
        let carol = register(&db, "carol@example.com", "carol");

        db.set_can_comment(bob.id, false).unwrap();

        assert!(!db.load_actor(bob.id).unwrap().unwrap().can(Permission::COMMENT));
        assert!(db.load_actor(carol.id).unwrap().unwrap().can(Permission::COMMENT));

        let frozen: Vec<_> = db.list_frozen_users().unwrap().into_iter().map(|u| u.id).collect();
        assert_eq!(frozen, vec![bob.id]);

        db.set_can_comment(bob.id, true).unwrap();
        assert!(db.list_frozen_users().unwrap().is_empty());
    }

    #[test]
    fn email_change_round() {
        let (_dir, db) = open_temp();
        let bob = register(&db, "bob@example.com", "bob");
        register(&db, "carol@example.com", "carol");

        assert!(matches!(
            db.set_temp_email(bob.id, "carol@example.com"),
            Err(StoreError::Conflict { field: "email" })
        ));

        db.set_temp_email(bob.id, "robert@example.com").unwrap();
        assert_eq!(db.apply_email_change(bob.id, "other@example.com").unwrap(), None);
        assert_eq!(
            db.apply_email_change(bob.id, "robert@example.com").unwrap().as_deref(),
            Some("robert@example.com")
        );
        assert_eq!(db.apply_email_change(bob.id, "robert@example.com").unwrap(), None);
        assert!(db.find_user_by_email("robert@example.com").unwrap().is_some());
    }

    #[test]
    fn confirm_once() {
        let (_dir, db) = open_temp();
        let bob = register(&db, "bob@example.com", "bob");
        assert!(db.confirm_user(bob.id).unwrap());
        assert!(!db.confirm_user(bob.id).unwrap());
    }

    #[test]
    fn admin_update_keeps_own_values() {
        let (_dir, db) = open_temp();
        let bob = register(&db, "bob@example.com", "bob");
        let leader = db.list_roles().unwrap().into_iter().find(|r| r.name == "School Leader").unwrap();

        let updated = db
            .admin_update_user(
                bob.id,
                &AdminUserUpdate {
                    email: "bob@example.com",
                    username: "bob",
                    confirmed: true,
                    role_id: leader.id,
                    name: Some("Bob"),
                    location: None,
                    about_me: None,
                },
            )
            .unwrap();
        assert!(updated.confirmed);
        assert_eq!(updated.role_id, leader.id);
        assert_eq!(updated.name.as_deref(), Some("Bob"));
    }
}
