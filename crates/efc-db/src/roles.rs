use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use efc_types::models::Role;
use efc_types::permissions::Permission;

use crate::models::role_from_row;
use crate::{Database, Result, StoreError};

const ROLE_COLUMNS: &str = "id, name, permissions, is_default";

impl Database {
    pub fn list_roles(&self) -> Result<Vec<Role>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("SELECT {ROLE_COLUMNS} FROM roles ORDER BY id"))?;
            let rows = stmt
                .query_map([], role_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_role(&self, id: i64) -> Result<Option<Role>> {
        self.with_conn(|conn| query_role(conn, id))
    }

    pub fn default_role(&self) -> Result<Option<Role>> {
        self.with_conn(query_default_role)
    }

    /// Grants `p` to the role. `changed` is false when the bits were already set.
    pub fn grant_permission(&self, role_id: i64, p: Permission) -> Result<(Role, bool)> {
        self.update_role_bits(role_id, |perms| perms.grant(p))
    }

    /// Revokes `p` from the role. `changed` is false when none of the bits were set.
    pub fn revoke_permission(&self, role_id: i64, p: Permission) -> Result<(Role, bool)> {
        self.update_role_bits(role_id, |perms| perms.revoke(p))
    }

    /// Makes `role_id` the default role and clears the flag everywhere else in
    /// one statement, so exactly one default exists afterwards.
    pub fn set_default_role(&self, role_id: i64) -> Result<Role> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if query_role(&tx, role_id)?.is_none() {
                return Err(StoreError::NotFound("role"));
            }
            tx.execute("UPDATE roles SET is_default = (id = ?1)", [role_id])?;
            let role = query_role(&tx, role_id)?.ok_or(StoreError::NotFound("role"))?;
            tx.commit()?;
            info!("Role '{}' is now the default role", role.name);
            Ok(role)
        })
    }

    fn update_role_bits<F>(&self, role_id: i64, apply: F) -> Result<(Role, bool)>
    where
        F: FnOnce(&mut Permission) -> bool,
    {
        self.with_conn_mut(|conn| {
            let mut role = query_role(conn, role_id)?.ok_or(StoreError::NotFound("role"))?;
            let changed = apply(&mut role.permissions);
            if changed {
                conn.execute(
                    "UPDATE roles SET permissions = ?1 WHERE id = ?2",
                    rusqlite::params![role.permissions.to_stored(), role_id],
                )?;
                info!("Role '{}' permissions now {:#04x}", role.name, role.permissions.bits());
            }
            Ok((role, changed))
        })
    }
}

pub(crate) fn query_role(conn: &Connection, id: i64) -> Result<Option<Role>> {
    let role = conn
        .query_row(
            &format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = ?1"),
            [id],
            role_from_row,
        )
        .optional()?;
    Ok(role)
}

pub(crate) fn query_default_role(conn: &Connection) -> Result<Option<Role>> {
    let role = conn
        .query_row(
            &format!("SELECT {ROLE_COLUMNS} FROM roles WHERE is_default = 1 ORDER BY id LIMIT 1"),
            [],
            role_from_row,
        )
        .optional()?;
    Ok(role)
}

pub(crate) fn query_role_with_permissions(conn: &Connection, p: Permission) -> Result<Option<Role>> {
    let role = conn
        .query_row(
            &format!("SELECT {ROLE_COLUMNS} FROM roles WHERE permissions = ?1 ORDER BY id LIMIT 1"),
            [p.to_stored()],
            role_from_row,
        )
        .optional()?;
    Ok(role)
}
