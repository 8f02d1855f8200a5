use super::{now_rfc3339, Db, StoreError};
use rusqlite::params;

impl Db {
    pub fn create_password_reset(
        &self,
        user_id: i64,
        token_hash: &str,
        expires_at: &str,
    ) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO password_resets (user_id, token_hash, expires_at, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![user_id, token_hash, expires_at, now_rfc3339()],
        )?;
        Ok(())
    }

    /// Redeem a reset token: valid iff unused and unexpired. Marks it used
    /// in the same transaction and returns the owning user id. Any invalid
    /// token (unknown, used, expired) is `NotFound`.
    pub fn consume_password_reset(&self, token_hash: &str, now: &str) -> Result<i64, StoreError> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        let (id, user_id): (i64, i64) = tx.query_row(
            "SELECT id, user_id FROM password_resets
             WHERE token_hash = ?1 AND used_at IS NULL AND expires_at > ?2",
            params![token_hash, now],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        tx.execute(
            "UPDATE password_resets SET used_at = ?1 WHERE id = ?2",
            params![now, id],
        )?;
        tx.commit()?;
        Ok(user_id)
    }
}
