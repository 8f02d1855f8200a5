use super::{now_rfc3339, Db, StoreError};
use crate::delivery::DeliveryState;
use crate::models::{TelegramRecipient, Webhook};
use chrono::{DateTime, Utc};
use rusqlite::params;

/// Which delivery-state table a dispatcher operates on. Both channels share
/// the same rate-limit/cooldown columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Webhook,
    Telegram,
}

impl ChannelKind {
    fn table(self) -> &'static str {
        match self {
            ChannelKind::Webhook => "webhooks",
            ChannelKind::Telegram => "telegram_recipients",
        }
    }
}

const WEBHOOK_COLS: &str = "id, user_id, url, is_active, failure_count, last_attempt_at, \
     last_success_at, last_error_at, cooldown_until, created_at, updated_at";

fn map_webhook(row: &rusqlite::Row<'_>) -> rusqlite::Result<Webhook> {
    Ok(Webhook {
        id: row.get(0)?,
        user_id: row.get(1)?,
        url: row.get(2)?,
        is_active: row.get::<_, i64>(3)? != 0,
        failure_count: row.get(4)?,
        last_attempt_at: row.get(5)?,
        last_success_at: row.get(6)?,
        last_error_at: row.get(7)?,
        cooldown_until: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

const TELEGRAM_COLS: &str = "id, user_id, chat_id, is_active, failure_count, last_attempt_at, \
     last_success_at, last_error_at, cooldown_until, created_at, updated_at";

fn map_telegram(row: &rusqlite::Row<'_>) -> rusqlite::Result<TelegramRecipient> {
    Ok(TelegramRecipient {
        id: row.get(0)?,
        user_id: row.get(1)?,
        chat_id: row.get(2)?,
        is_active: row.get::<_, i64>(3)? != 0,
        failure_count: row.get(4)?,
        last_attempt_at: row.get(5)?,
        last_success_at: row.get(6)?,
        last_error_at: row.get(7)?,
        cooldown_until: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn parse_ts(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

impl Db {
    // --- Webhooks ---

    pub fn create_webhook(
        &self,
        user_id: i64,
        url: &str,
        secret_hash: &str,
    ) -> Result<Webhook, StoreError> {
        let now = now_rfc3339();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO webhooks (user_id, url, secret_hash, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![user_id, url, secret_hash, now],
        )?;
        let id = conn.last_insert_rowid();
        Ok(conn.query_row(
            &format!("SELECT {WEBHOOK_COLS} FROM webhooks WHERE id = ?1"),
            [id],
            map_webhook,
        )?)
    }

    pub fn list_webhooks(&self, user_id: i64) -> Result<Vec<Webhook>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {WEBHOOK_COLS} FROM webhooks WHERE user_id = ?1 ORDER BY id"
        ))?;
        let hooks = stmt
            .query_map([user_id], map_webhook)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(hooks)
    }

    pub fn get_webhook(&self, id: i64) -> Result<Webhook, StoreError> {
        let conn = self.conn();
        Ok(conn.query_row(
            &format!("SELECT {WEBHOOK_COLS} FROM webhooks WHERE id = ?1"),
            [id],
            map_webhook,
        )?)
    }

    pub fn update_webhook(
        &self,
        id: i64,
        url: Option<&str>,
        secret_hash: Option<&str>,
        is_active: Option<bool>,
    ) -> Result<Webhook, StoreError> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE webhooks SET
                url = COALESCE(?1, url),
                secret_hash = COALESCE(?2, secret_hash),
                is_active = COALESCE(?3, is_active),
                updated_at = ?4
             WHERE id = ?5",
            params![url, secret_hash, is_active.map(|b| b as i64), now_rfc3339(), id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        drop(conn);
        self.get_webhook(id)
    }

    pub fn delete_webhook(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.conn();
        let deleted = conn.execute("DELETE FROM webhooks WHERE id = ?1", [id])?;
        if deleted == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    pub fn webhook_secret_hash(&self, id: i64) -> Result<String, StoreError> {
        let conn = self.conn();
        Ok(conn.query_row("SELECT secret_hash FROM webhooks WHERE id = ?1", [id], |r| {
            r.get(0)
        })?)
    }

    /// Active webhooks for a user, with their secret hashes (fan-out path).
    pub fn active_webhooks_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<(Webhook, String)>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {WEBHOOK_COLS}, secret_hash FROM webhooks WHERE user_id = ?1 AND is_active = 1"
        ))?;
        let hooks = stmt
            .query_map([user_id], |row| Ok((map_webhook(row)?, row.get::<_, String>(11)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(hooks)
    }

    // --- Telegram recipients ---

    pub fn create_telegram_recipient(
        &self,
        user_id: i64,
        chat_id: &str,
    ) -> Result<TelegramRecipient, StoreError> {
        let now = now_rfc3339();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO telegram_recipients (user_id, chat_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)",
            params![user_id, chat_id, now],
        )?;
        let id = conn.last_insert_rowid();
        Ok(conn.query_row(
            &format!("SELECT {TELEGRAM_COLS} FROM telegram_recipients WHERE id = ?1"),
            [id],
            map_telegram,
        )?)
    }

    pub fn list_telegram_recipients(
        &self,
        user_id: i64,
    ) -> Result<Vec<TelegramRecipient>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TELEGRAM_COLS} FROM telegram_recipients WHERE user_id = ?1 ORDER BY id"
        ))?;
        let recipients = stmt
            .query_map([user_id], map_telegram)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(recipients)
    }

    pub fn get_telegram_recipient(&self, id: i64) -> Result<TelegramRecipient, StoreError> {
        let conn = self.conn();
        Ok(conn.query_row(
            &format!("SELECT {TELEGRAM_COLS} FROM telegram_recipients WHERE id = ?1"),
            [id],
            map_telegram,
        )?)
    }

    pub fn update_telegram_recipient(
        &self,
        id: i64,
        chat_id: Option<&str>,
        is_active: Option<bool>,
    ) -> Result<TelegramRecipient, StoreError> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE telegram_recipients SET
                chat_id = COALESCE(?1, chat_id),
                is_active = COALESCE(?2, is_active),
                updated_at = ?3
             WHERE id = ?4",
            params![chat_id, is_active.map(|b| b as i64), now_rfc3339(), id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        drop(conn);
        self.get_telegram_recipient(id)
    }

    pub fn delete_telegram_recipient(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.conn();
        let deleted = conn.execute("DELETE FROM telegram_recipients WHERE id = ?1", [id])?;
        if deleted == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    pub fn active_telegram_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<TelegramRecipient>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TELEGRAM_COLS} FROM telegram_recipients WHERE user_id = ?1 AND is_active = 1"
        ))?;
        let recipients = stmt
            .query_map([user_id], map_telegram)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(recipients)
    }

    // --- Delivery state (shared by both channels) ---

    pub fn delivery_state(&self, kind: ChannelKind, id: i64) -> Result<DeliveryState, StoreError> {
        let conn = self.conn();
        Ok(conn.query_row(
            &format!(
                "SELECT failure_count, last_attempt_at, last_success_at, last_error_at, cooldown_until
                 FROM {} WHERE id = ?1",
                kind.table()
            ),
            [id],
            |row| {
                Ok(DeliveryState {
                    failure_count: row.get(0)?,
                    last_attempt_at: parse_ts(row.get(1)?),
                    last_success_at: parse_ts(row.get(2)?),
                    last_error_at: parse_ts(row.get(3)?),
                    cooldown_until: parse_ts(row.get(4)?),
                })
            },
        )?)
    }

    /// Stamp `last_attempt_at` before the outbound call goes on the wire.
    pub fn record_dispatch_attempt(
        &self,
        kind: ChannelKind,
        id: i64,
        now: &str,
    ) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            &format!("UPDATE {} SET last_attempt_at = ?1 WHERE id = ?2", kind.table()),
            params![now, id],
        )?;
        Ok(())
    }

    /// A 2xx closes the failure window: counter reset, cooldown cleared.
    pub fn record_dispatch_success(
        &self,
        kind: ChannelKind,
        id: i64,
        now: &str,
    ) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            &format!(
                "UPDATE {} SET last_success_at = ?1, failure_count = 0, cooldown_until = NULL
                 WHERE id = ?2",
                kind.table()
            ),
            params![now, id],
        )?;
        Ok(())
    }

    /// Terminal failure: bump the counter, stamp the error, and arm the
    /// cooldown when the circuit breaker decided to open.
    pub fn record_dispatch_failure(
        &self,
        kind: ChannelKind,
        id: i64,
        now: &str,
        cooldown_until: Option<&str>,
    ) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            &format!(
                "UPDATE {} SET failure_count = failure_count + 1, last_error_at = ?1,
                     cooldown_until = COALESCE(?2, cooldown_until)
                 WHERE id = ?3",
                kind.table()
            ),
            params![now, cooldown_until, id],
        )?;
        Ok(())
    }
}
