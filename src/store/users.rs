use super::{now_rfc3339, Db, StoreError};
use crate::models::{User, UserAuth};
use rusqlite::{params, Connection, OptionalExtension};

const USER_COLS: &str = "id, email, is_admin, created_at";

fn map_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        is_admin: row.get::<_, i64>(2)? != 0,
        created_at: row.get(3)?,
    })
}

fn user_by_id(conn: &Connection, id: i64) -> Result<User, StoreError> {
    Ok(conn.query_row(
        &format!("SELECT {USER_COLS} FROM users WHERE id = ?1"),
        [id],
        map_user,
    )?)
}

impl Db {
    /// Create a user. The very first user in the deployment is promoted to
    /// admin inside the same INSERT.
    pub fn create_user(&self, email: &str, password_hash: &str) -> Result<User, StoreError> {
        let email = email.trim().to_lowercase();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO users (email, password_hash, is_admin, created_at)
             VALUES (?1, ?2, NOT EXISTS(SELECT 1 FROM users), ?3)",
            params![email, password_hash, now_rfc3339()],
        )?;
        user_by_id(&conn, conn.last_insert_rowid())
    }

    /// Create a user with an explicit admin flag (admin-surface create).
    pub fn create_user_with_role(
        &self,
        email: &str,
        password_hash: &str,
        is_admin: bool,
    ) -> Result<User, StoreError> {
        let email = email.trim().to_lowercase();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO users (email, password_hash, is_admin, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![email, password_hash, is_admin as i64, now_rfc3339()],
        )?;
        user_by_id(&conn, conn.last_insert_rowid())
    }

    /// Startup admin bootstrap: create the account or re-promote an existing
    /// one, resetting its password either way.
    pub fn upsert_admin(&self, email: &str, password_hash: &str) -> Result<User, StoreError> {
        let email = email.trim().to_lowercase();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO users (email, password_hash, is_admin, created_at)
             VALUES (?1, ?2, 1, ?3)
             ON CONFLICT(email) DO UPDATE SET password_hash = excluded.password_hash, is_admin = 1",
            params![email, password_hash, now_rfc3339()],
        )?;
        Ok(conn.query_row(
            &format!("SELECT {USER_COLS} FROM users WHERE email = ?1"),
            [email],
            map_user,
        )?)
    }

    pub fn get_user(&self, id: i64) -> Result<User, StoreError> {
        user_by_id(&self.conn(), id)
    }

    pub fn get_user_auth(&self, email: &str) -> Result<UserAuth, StoreError> {
        let email = email.trim().to_lowercase();
        let conn = self.conn();
        Ok(conn.query_row(
            &format!("SELECT {USER_COLS}, password_hash FROM users WHERE email = ?1"),
            [email],
            |row| {
                Ok(UserAuth {
                    user: map_user(row)?,
                    password_hash: row.get(4)?,
                })
            },
        )?)
    }

    pub fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("SELECT {USER_COLS} FROM users ORDER BY id"))?;
        let users = stmt
            .query_map([], map_user)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    /// Delete a user. Refused with `Invariant` when it would leave the
    /// deployment without an admin. Cascades to machines, channels, resets.
    pub fn delete_user(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        let is_admin: i64 = tx.query_row("SELECT is_admin FROM users WHERE id = ?1", [id], |r| {
            r.get(0)
        })?;
        if is_admin != 0 {
            let admins: i64 =
                tx.query_row("SELECT COUNT(*) FROM users WHERE is_admin = 1", [], |r| {
                    r.get(0)
                })?;
            if admins <= 1 {
                return Err(StoreError::Invariant(
                    "cannot delete the last admin".to_string(),
                ));
            }
        }
        tx.execute("DELETE FROM users WHERE id = ?1", [id])?;
        tx.commit()?;
        Ok(())
    }

    pub fn set_password(&self, user_id: i64, password_hash: &str) -> Result<(), StoreError> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE users SET password_hash = ?1 WHERE id = ?2",
            params![password_hash, user_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Oldest admin account, if any. Owner of the synthetic local machine.
    pub fn first_admin(&self) -> Result<Option<User>, StoreError> {
        let conn = self.conn();
        Ok(conn
            .query_row(
                &format!("SELECT {USER_COLS} FROM users WHERE is_admin = 1 ORDER BY id LIMIT 1"),
                [],
                map_user,
            )
            .optional()?)
    }
}
