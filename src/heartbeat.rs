use crate::config::Config;
use crate::events::ServerEvent;
use crate::models::Machine;
use crate::store::Db;
use chrono::{Duration as ChronoDuration, SecondsFormat, Utc};
use rocket::Shutdown;
use tokio::sync::broadcast;

/// Result of one heartbeat sweep.
#[derive(Debug)]
pub struct SweepResult {
    pub went_offline: Vec<Machine>,
    pub recovered: Vec<Machine>,
}

/// Execute one sweep: flip enabled machines silent past the threshold to
/// offline, and clear the offline-notified marker for machines that came
/// back. Both transitions are compare-and-set in the store, so a machine
/// appears in the result exactly once per transition no matter how often the
/// sweep runs.
pub fn run_sweep(db: &Db, offline_threshold_secs: u64) -> SweepResult {
    let now = Utc::now();
    let cutoff = (now - ChronoDuration::seconds(offline_threshold_secs as i64))
        .to_rfc3339_opts(SecondsFormat::Micros, true);
    let now_str = now.to_rfc3339_opts(SecondsFormat::Micros, true);

    let went_offline = db.sweep_offline(&cutoff, &now_str).unwrap_or_else(|e| {
        eprintln!("⚠️ Heartbeat: offline sweep failed: {e}");
        Vec::new()
    });
    let recovered = db.sweep_recoveries().unwrap_or_else(|e| {
        eprintln!("⚠️ Heartbeat: recovery sweep failed: {e}");
        Vec::new()
    });

    SweepResult {
        went_offline,
        recovered,
    }
}

/// Spawns the heartbeat loop: one sweep per `HEARTBEAT_INTERVAL` tick over
/// its own DB connection. The loop finishes its current sweep and exits when
/// shutdown is signalled.
pub fn spawn_heartbeat_task(
    db_path: String,
    config: Config,
    events: broadcast::Sender<ServerEvent>,
    mut shutdown: Shutdown,
) {
    tokio::spawn(async move {
        let db = match Db::open(&db_path) {
            Ok(d) => d,
            Err(e) => {
                eprintln!("⚠️ Heartbeat: failed to open DB: {e}");
                return;
            }
        };

        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(config.heartbeat_interval_secs));

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    let result = run_sweep(&db, config.offline_threshold_secs);
                    for machine in result.went_offline {
                        eprintln!("💤 Machine {} ({}) went offline", machine.name, machine.hostname);
                        let _ = events.send(ServerEvent::MachineOffline(machine));
                    }
                    for machine in result.recovered {
                        eprintln!("💡 Machine {} ({}) recovered", machine.name, machine.hostname);
                        let _ = events.send(ServerEvent::MachineOnline(machine));
                    }
                }
            }
        }
    });
}
