mod alerts;
mod machines;
mod notifications;
mod password_resets;
mod users;

pub use notifications::ChannelKind;

use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

/// Store error taxonomy. `QueryReturnedNoRows` is normalized to `NotFound`
/// and UNIQUE violations to `Conflict` at this boundary; everything else is
/// `Backend`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("{0}")]
    Invariant(String),
    #[error("storage error: {0}")]
    Backend(rusqlite::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
            rusqlite::Error::SqliteFailure(f, ref msg)
                if f.code == rusqlite::ErrorCode::ConstraintViolation
                    && msg.as_deref().is_some_and(|m| m.contains("UNIQUE")) =>
            {
                StoreError::Conflict(msg.clone().unwrap_or_default())
            }
            e => StoreError::Backend(e),
        }
    }
}

/// Current time as a fixed-width RFC3339 string (microseconds, Z suffix).
/// Fixed width keeps lexicographic SQL comparisons consistent with time order.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Re-format an arbitrary RFC3339 string into the store's canonical width.
pub fn canonical_rfc3339(value: &str) -> Option<String> {
    chrono::DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Micros, true))
}

pub struct Db {
    conn: Mutex<Connection>,
}

impl Db {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(StoreError::Backend)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        migrate(&conn)?;
        Ok(Db {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Named, idempotent migration steps. Startup replays only the steps not yet
/// recorded in `schema_migrations`, each inside its own transaction.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "0001_users",
        "CREATE TABLE users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL UNIQUE COLLATE NOCASE,
            password_hash TEXT NOT NULL,
            is_admin INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );",
    ),
    (
        "0002_machines",
        "CREATE TABLE machines (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            hostname TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            platform TEXT,
            kernel TEXT,
            cpu_cores INTEGER,
            total_memory_mb INTEGER,
            total_disk_gb INTEGER,
            last_boot_at TEXT,
            status TEXT NOT NULL DEFAULT 'offline',
            last_seen TEXT,
            is_enabled INTEGER NOT NULL DEFAULT 1,
            offline_notified_at TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX idx_machines_user ON machines(user_id);",
    ),
    (
        "0003_machine_api_keys",
        "CREATE TABLE machine_api_keys (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            machine_id INTEGER NOT NULL REFERENCES machines(id) ON DELETE CASCADE,
            key_hash TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL,
            revoked_at TEXT
        );
        CREATE INDEX idx_api_keys_machine ON machine_api_keys(machine_id);",
    ),
    (
        "0004_metrics_history",
        "CREATE TABLE metrics_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            machine_id INTEGER NOT NULL REFERENCES machines(id) ON DELETE CASCADE,
            timestamp TEXT NOT NULL,
            cpu_pct REAL NOT NULL,
            mem_used_pct REAL NOT NULL,
            disk_used_pct REAL NOT NULL,
            net_rx_bytes INTEGER NOT NULL DEFAULT 0,
            net_tx_bytes INTEGER NOT NULL DEFAULT 0,
            uptime_seconds INTEGER,
            UNIQUE(machine_id, timestamp)
        );
        CREATE INDEX idx_metrics_machine_ts ON metrics_history(machine_id, timestamp);",
    ),
    (
        "0005_alert_rules",
        "CREATE TABLE alert_rules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            metric TEXT NOT NULL,
            comparison TEXT NOT NULL,
            threshold_pct REAL NOT NULL,
            trigger_after INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );",
    ),
    (
        "0006_alert_events",
        "CREATE TABLE alert_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            rule_id INTEGER NOT NULL REFERENCES alert_rules(id) ON DELETE CASCADE,
            value REAL NOT NULL,
            triggered_at TEXT NOT NULL,
            acknowledged INTEGER NOT NULL DEFAULT 0,
            acknowledged_at TEXT
        );
        CREATE INDEX idx_alert_events_rule ON alert_events(rule_id);",
    ),
    (
        "0007_webhooks",
        "CREATE TABLE webhooks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            url TEXT NOT NULL,
            secret_hash TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            failure_count INTEGER NOT NULL DEFAULT 0,
            last_attempt_at TEXT,
            last_success_at TEXT,
            last_error_at TEXT,
            cooldown_until TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(user_id, url)
        );",
    ),
    (
        "0008_telegram_recipients",
        "CREATE TABLE telegram_recipients (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            chat_id TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            failure_count INTEGER NOT NULL DEFAULT 0,
            last_attempt_at TEXT,
            last_success_at TEXT,
            last_error_at TEXT,
            cooldown_until TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(user_id, chat_id)
        );",
    ),
    (
        "0009_password_resets",
        "CREATE TABLE password_resets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            token_hash TEXT NOT NULL UNIQUE,
            expires_at TEXT NOT NULL,
            used_at TEXT,
            created_at TEXT NOT NULL
        );",
    ),
];

fn migrate(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL
        );",
    )?;

    for (name, sql) in MIGRATIONS {
        let applied: i64 = conn.query_row(
            "SELECT COUNT(*) FROM schema_migrations WHERE name = ?1",
            [name],
            |r| r.get(0),
        )?;
        if applied > 0 {
            continue;
        }
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (name, applied_at) VALUES (?1, ?2)",
            params![name, now_rfc3339()],
        )?;
        tx.commit()?;
    }

    Ok(())
}
