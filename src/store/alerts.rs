use super::{now_rfc3339, Db, StoreError};
use crate::models::{AlertEvent, AlertRule, AlertRuleRequest};
use rusqlite::{params, Connection};

const RULE_COLS: &str =
    "id, name, metric, comparison, threshold_pct, trigger_after, created_at, updated_at";

fn map_rule(row: &rusqlite::Row<'_>) -> rusqlite::Result<AlertRule> {
    Ok(AlertRule {
        id: row.get(0)?,
        name: row.get(1)?,
        metric: row.get(2)?,
        comparison: row.get(3)?,
        threshold_pct: row.get(4)?,
        trigger_after: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn rule_by_id(conn: &Connection, id: i64) -> Result<AlertRule, StoreError> {
    Ok(conn.query_row(
        &format!("SELECT {RULE_COLS} FROM alert_rules WHERE id = ?1"),
        [id],
        map_rule,
    )?)
}

const EVENT_COLS: &str = "id, rule_id, value, triggered_at, acknowledged, acknowledged_at";

fn map_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<AlertEvent> {
    Ok(AlertEvent {
        id: row.get(0)?,
        rule_id: row.get(1)?,
        value: row.get(2)?,
        triggered_at: row.get(3)?,
        acknowledged: row.get::<_, i64>(4)? != 0,
        acknowledged_at: row.get(5)?,
    })
}

impl Db {
    pub fn list_rules(&self) -> Result<Vec<AlertRule>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("SELECT {RULE_COLS} FROM alert_rules ORDER BY id"))?;
        let rules = stmt
            .query_map([], map_rule)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rules)
    }

    pub fn get_rule(&self, id: i64) -> Result<AlertRule, StoreError> {
        rule_by_id(&self.conn(), id)
    }

    pub fn create_rule(&self, req: &AlertRuleRequest) -> Result<AlertRule, StoreError> {
        let now = now_rfc3339();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO alert_rules (name, metric, comparison, threshold_pct, trigger_after, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                req.name,
                req.metric,
                req.comparison,
                req.threshold_pct,
                req.trigger_after,
                now
            ],
        )?;
        rule_by_id(&conn, conn.last_insert_rowid())
    }

    pub fn update_rule(&self, id: i64, req: &AlertRuleRequest) -> Result<AlertRule, StoreError> {
        let now = now_rfc3339();
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE alert_rules SET name = ?1, metric = ?2, comparison = ?3,
                 threshold_pct = ?4, trigger_after = ?5, updated_at = ?6
             WHERE id = ?7",
            params![
                req.name,
                req.metric,
                req.comparison,
                req.threshold_pct,
                req.trigger_after,
                now,
                id
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        rule_by_id(&conn, id)
    }

    pub fn delete_rule(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.conn();
        let deleted = conn.execute("DELETE FROM alert_rules WHERE id = ?1", [id])?;
        if deleted == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Record a fired event. Written before any notification is dispatched,
    /// so a failing channel never loses the event.
    pub fn insert_event(
        &self,
        rule_id: i64,
        value: f64,
        triggered_at: &str,
    ) -> Result<AlertEvent, StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO alert_events (rule_id, value, triggered_at) VALUES (?1, ?2, ?3)",
            params![rule_id, value, triggered_at],
        )?;
        let id = conn.last_insert_rowid();
        Ok(conn.query_row(
            &format!("SELECT {EVENT_COLS} FROM alert_events WHERE id = ?1"),
            [id],
            map_event,
        )?)
    }

    pub fn list_events(&self, limit: i64) -> Result<Vec<AlertEvent>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {EVENT_COLS} FROM alert_events ORDER BY triggered_at DESC, id DESC LIMIT ?1"
        ))?;
        let events = stmt
            .query_map([limit], map_event)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    /// Acknowledge an event. Idempotent: acknowledging an acknowledged event
    /// returns the row unchanged.
    pub fn ack_event(&self, id: i64) -> Result<AlertEvent, StoreError> {
        let conn = self.conn();
        let event = conn.query_row(
            &format!("SELECT {EVENT_COLS} FROM alert_events WHERE id = ?1"),
            [id],
            map_event,
        )?;
        if event.acknowledged {
            return Ok(event);
        }
        conn.execute(
            "UPDATE alert_events SET acknowledged = 1, acknowledged_at = ?1 WHERE id = ?2",
            params![now_rfc3339(), id],
        )?;
        Ok(conn.query_row(
            &format!("SELECT {EVENT_COLS} FROM alert_events WHERE id = ?1"),
            [id],
            map_event,
        )?)
    }
}
