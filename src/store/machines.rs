use super::{now_rfc3339, Db, StoreError};
use crate::models::{Machine, MetricsSample, SystemInfoUpdate};
use rusqlite::{params, Connection, OptionalExtension};

const MACHINE_COLS: &str = "id, user_id, name, hostname, description, platform, kernel, \
     cpu_cores, total_memory_mb, total_disk_gb, last_boot_at, status, last_seen, is_enabled, created_at";

fn map_machine(row: &rusqlite::Row<'_>) -> rusqlite::Result<Machine> {
    Ok(Machine {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        hostname: row.get(3)?,
        description: row.get(4)?,
        platform: row.get(5)?,
        kernel: row.get(6)?,
        cpu_cores: row.get(7)?,
        total_memory_mb: row.get(8)?,
        total_disk_gb: row.get(9)?,
        last_boot_at: row.get(10)?,
        status: row.get(11)?,
        last_seen: row.get(12)?,
        is_enabled: row.get::<_, i64>(13)? != 0,
        created_at: row.get(14)?,
    })
}

fn machine_by_id(conn: &Connection, id: i64) -> Result<Machine, StoreError> {
    Ok(conn.query_row(
        &format!("SELECT {MACHINE_COLS} FROM machines WHERE id = ?1"),
        [id],
        map_machine,
    )?)
}

fn map_sample(row: &rusqlite::Row<'_>) -> rusqlite::Result<MetricsSample> {
    Ok(MetricsSample {
        machine_id: row.get(0)?,
        timestamp: row.get(1)?,
        cpu_pct: row.get(2)?,
        mem_used_pct: row.get(3)?,
        disk_used_pct: row.get(4)?,
        net_rx_bytes: row.get(5)?,
        net_tx_bytes: row.get(6)?,
        uptime_seconds: row.get(7)?,
    })
}

const SAMPLE_COLS: &str =
    "machine_id, timestamp, cpu_pct, mem_used_pct, disk_used_pct, net_rx_bytes, net_tx_bytes, uptime_seconds";

impl Db {
    /// Create a machine and its first API key in one transaction.
    pub fn register_machine(
        &self,
        user_id: i64,
        name: &str,
        hostname: &str,
        description: &str,
        key_hash: &str,
    ) -> Result<Machine, StoreError> {
        let now = now_rfc3339();
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO machines (user_id, name, hostname, description, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![user_id, name, hostname, description, now],
        )?;
        let machine_id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO machine_api_keys (machine_id, key_hash, created_at) VALUES (?1, ?2, ?3)",
            params![machine_id, key_hash, now],
        )?;
        let machine = machine_by_id(&tx, machine_id)?;
        tx.commit()?;
        Ok(machine)
    }

    /// Authenticate an agent by key hash. Rejects revoked keys (`NotFound`)
    /// and disabled machines (`Invariant`). On success records `last_seen`
    /// and flips the machine online; the returned flag says whether it was
    /// offline before this call.
    pub fn authenticate_machine(&self, key_hash: &str) -> Result<(Machine, bool), StoreError> {
        let now = now_rfc3339();
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        let machine_id: i64 = tx.query_row(
            "SELECT machine_id FROM machine_api_keys WHERE key_hash = ?1 AND revoked_at IS NULL",
            [key_hash],
            |r| r.get(0),
        )?;
        let mut machine = machine_by_id(&tx, machine_id)?;
        if !machine.is_enabled {
            return Err(StoreError::Invariant("machine is disabled".to_string()));
        }
        let was_offline = machine.status == "offline";
        tx.execute(
            "UPDATE machines SET last_seen = ?1, status = 'online' WHERE id = ?2",
            params![now, machine_id],
        )?;
        tx.commit()?;
        machine.last_seen = Some(now);
        machine.status = "online".to_string();
        Ok((machine, was_offline))
    }

    /// Revoke every active key and mint a new one atomically. At most one
    /// unrevoked key exists at any time.
    pub fn rotate_key(&self, machine_id: i64, new_key_hash: &str) -> Result<(), StoreError> {
        let now = now_rfc3339();
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        // Existence check; NotFound if the machine is gone.
        machine_by_id(&tx, machine_id)?;
        tx.execute(
            "UPDATE machine_api_keys SET revoked_at = ?1 WHERE machine_id = ?2 AND revoked_at IS NULL",
            params![now, machine_id],
        )?;
        tx.execute(
            "INSERT INTO machine_api_keys (machine_id, key_hash, created_at) VALUES (?1, ?2, ?3)",
            params![machine_id, new_key_hash, now],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn set_machine_enabled(&self, machine_id: i64, enabled: bool) -> Result<Machine, StoreError> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE machines SET is_enabled = ?1 WHERE id = ?2",
            params![enabled as i64, machine_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        machine_by_id(&conn, machine_id)
    }

    pub fn list_machines(&self, user_id: i64) -> Result<Vec<Machine>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {MACHINE_COLS} FROM machines WHERE user_id = ?1 ORDER BY name, id"
        ))?;
        let machines = stmt
            .query_map([user_id], map_machine)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(machines)
    }

    pub fn get_machine(&self, id: i64) -> Result<Machine, StoreError> {
        machine_by_id(&self.conn(), id)
    }

    pub fn find_machine_by_name(&self, user_id: i64, name: &str) -> Result<Option<Machine>, StoreError> {
        let conn = self.conn();
        Ok(conn
            .query_row(
                &format!("SELECT {MACHINE_COLS} FROM machines WHERE user_id = ?1 AND name = ?2"),
                params![user_id, name],
                map_machine,
            )
            .optional()?)
    }

    /// Apply an agent-reported system-facts delta; absent fields keep their
    /// stored value.
    pub fn update_system_info(
        &self,
        machine_id: i64,
        info: &SystemInfoUpdate,
    ) -> Result<(), StoreError> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE machines SET
                platform = COALESCE(?1, platform),
                kernel = COALESCE(?2, kernel),
                cpu_cores = COALESCE(?3, cpu_cores),
                total_memory_mb = COALESCE(?4, total_memory_mb),
                total_disk_gb = COALESCE(?5, total_disk_gb),
                last_boot_at = COALESCE(?6, last_boot_at)
             WHERE id = ?7",
            params![
                info.platform,
                info.kernel,
                info.cpu_cores,
                info.total_memory_mb,
                info.total_disk_gb,
                info.last_boot_at,
                machine_id
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Delete a machine; history and API keys go with it (CASCADE).
    pub fn delete_machine(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.conn();
        let deleted = conn.execute("DELETE FROM machines WHERE id = ?1", [id])?;
        if deleted == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    // --- Metric history ---

    /// Append a sample. `(machine_id, timestamp)` is unique; on a tie the
    /// first insert wins (`OR IGNORE`).
    pub fn record_sample(&self, sample: &MetricsSample) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            &format!("INSERT OR IGNORE INTO metrics_history ({SAMPLE_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
            params![
                sample.machine_id,
                sample.timestamp,
                sample.cpu_pct,
                sample.mem_used_pct,
                sample.disk_used_pct,
                sample.net_rx_bytes,
                sample.net_tx_bytes,
                sample.uptime_seconds
            ],
        )?;
        Ok(())
    }

    pub fn latest_sample(&self, machine_id: i64) -> Result<Option<MetricsSample>, StoreError> {
        let conn = self.conn();
        Ok(conn
            .query_row(
                &format!(
                    "SELECT {SAMPLE_COLS} FROM metrics_history WHERE machine_id = ?1
                     ORDER BY timestamp DESC, id DESC LIMIT 1"
                ),
                [machine_id],
                map_sample,
            )
            .optional()?)
    }

    pub fn sample_history(
        &self,
        machine_id: i64,
        from: Option<&str>,
        to: Option<&str>,
        limit: i64,
    ) -> Result<Vec<MetricsSample>, StoreError> {
        let conn = self.conn();
        let mut sql = format!("SELECT {SAMPLE_COLS} FROM metrics_history WHERE machine_id = ?1");
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(machine_id)];
        let mut idx = 2;

        if let Some(from_val) = from {
            sql.push_str(&format!(" AND timestamp >= ?{idx}"));
            values.push(Box::new(from_val.to_string()));
            idx += 1;
        }
        if let Some(to_val) = to {
            sql.push_str(&format!(" AND timestamp <= ?{idx}"));
            values.push(Box::new(to_val.to_string()));
            idx += 1;
        }
        sql.push_str(&format!(" ORDER BY timestamp ASC, id ASC LIMIT ?{idx}"));
        values.push(Box::new(limit));

        let param_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let samples = stmt
            .query_map(param_refs.as_slice(), map_sample)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(samples)
    }

    /// Drop history rows older than the cutoff. Retention policy hook for
    /// deployments that bound the table.
    pub fn prune_history_before(&self, cutoff: &str) -> Result<usize, StoreError> {
        let conn = self.conn();
        Ok(conn.execute("DELETE FROM metrics_history WHERE timestamp < ?1", [cutoff])?)
    }

    /// Mark a machine alive without an agent call (local sampler path).
    pub fn touch_machine(&self, machine_id: i64, now: &str) -> Result<(), StoreError> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE machines SET last_seen = ?1, status = 'online' WHERE id = ?2",
            params![now, machine_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    // --- Heartbeat transitions ---

    /// Flip silent machines offline. The status flip and the
    /// `offline_notified_at` marker are one compare-and-set UPDATE, so each
    /// transition is returned (and notified) at most once across sweeps.
    pub fn sweep_offline(&self, cutoff: &str, now: &str) -> Result<Vec<Machine>, StoreError> {
        let conn = self.conn();
        let candidates: Vec<i64> = {
            let mut stmt = conn.prepare(
                "SELECT id FROM machines
                 WHERE is_enabled = 1 AND status = 'online'
                   AND last_seen IS NOT NULL AND last_seen < ?1",
            )?;
            stmt.query_map([cutoff], |r| r.get(0))?
                .collect::<Result<Vec<_>, _>>()?
        };

        let mut transitioned = Vec::new();
        for id in candidates {
            let changed = conn.execute(
                "UPDATE machines SET status = 'offline', offline_notified_at = ?1
                 WHERE id = ?2 AND status = 'online' AND offline_notified_at IS NULL",
                params![now, id],
            )?;
            if changed > 0 {
                transitioned.push(machine_by_id(&conn, id)?);
            }
        }
        Ok(transitioned)
    }

    /// Machines back online after a notified offline period: clear the
    /// marker (compare-and-set) and return each exactly once.
    pub fn sweep_recoveries(&self) -> Result<Vec<Machine>, StoreError> {
        let conn = self.conn();
        let candidates: Vec<i64> = {
            let mut stmt = conn.prepare(
                "SELECT id FROM machines
                 WHERE is_enabled = 1 AND status = 'online' AND offline_notified_at IS NOT NULL",
            )?;
            stmt.query_map([], |r| r.get(0))?
                .collect::<Result<Vec<_>, _>>()?
        };

        let mut recovered = Vec::new();
        for id in candidates {
            if self.clear_offline_marker_locked(&conn, id)? {
                recovered.push(machine_by_id(&conn, id)?);
            }
        }
        Ok(recovered)
    }

    /// CAS-clear the offline-notified marker. True when this caller won the
    /// race and should emit the recovery notification.
    pub fn clear_offline_marker(&self, machine_id: i64) -> Result<bool, StoreError> {
        let conn = self.conn();
        self.clear_offline_marker_locked(&conn, machine_id)
    }

    fn clear_offline_marker_locked(
        &self,
        conn: &Connection,
        machine_id: i64,
    ) -> Result<bool, StoreError> {
        let changed = conn.execute(
            "UPDATE machines SET offline_notified_at = NULL
             WHERE id = ?1 AND offline_notified_at IS NOT NULL",
            [machine_id],
        )?;
        Ok(changed > 0)
    }
}
