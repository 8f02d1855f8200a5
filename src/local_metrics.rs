use crate::alerts::AlertEngine;
use crate::config::Config;
use crate::events::ServerEvent;
use crate::models::{Machine, MetricsSample, SystemInfoUpdate};
use crate::store::{self, Db};
use rocket::Shutdown;
use std::sync::Arc;
use sysinfo::{Disks, Networks, System};
use tokio::sync::broadcast;

/// Name of the synthetic machine owned by the first admin.
pub const LOCAL_MACHINE_NAME: &str = "local-host";

/// Spawns the development-only self-sampler (`LOCAL_HOST_METRICS=true`):
/// registers a synthetic machine for this host and pushes one sample per
/// heartbeat interval through the normal persist + evaluate path.
pub fn spawn_local_sampler(
    db_path: String,
    config: Config,
    engine: Arc<AlertEngine>,
    events: broadcast::Sender<ServerEvent>,
    mut shutdown: Shutdown,
) {
    tokio::spawn(async move {
        let db = match Db::open(&db_path) {
            Ok(d) => d,
            Err(e) => {
                eprintln!("⚠️ Local sampler: failed to open DB: {e}");
                return;
            }
        };

        // The synthetic machine needs an owner; wait for the first admin.
        let owner = loop {
            match db.first_admin() {
                Ok(Some(user)) => break user,
                Ok(None) => {}
                Err(e) => {
                    eprintln!("⚠️ Local sampler: admin lookup failed: {e}");
                    return;
                }
            }
            tokio::select! {
                _ = &mut shutdown => return,
                _ = tokio::time::sleep(std::time::Duration::from_secs(5)) => {}
            }
        };

        let machine = match ensure_local_machine(&db, owner.id) {
            Ok(m) => m,
            Err(e) => {
                eprintln!("⚠️ Local sampler: machine setup failed: {e}");
                return;
            }
        };
        println!("🖥️  Sampling local host as machine '{}'", machine.name);

        let mut sys = System::new();
        loop {
            let sample = collect_sample(&mut sys, machine.id).await;
            let now = store::now_rfc3339();
            if let Err(e) = db.record_sample(&sample) {
                eprintln!("⚠️ Local sampler: sample write failed: {e}");
            } else {
                db.touch_machine(machine.id, &now).ok();
                if db.clear_offline_marker(machine.id).unwrap_or(false)
                    && let Ok(m) = db.get_machine(machine.id)
                {
                    let _ = events.send(ServerEvent::MachineOnline(m));
                }
                match engine.evaluate(&db, &sample) {
                    Ok(fired) => {
                        for (rule, event) in fired {
                            let _ = events.send(ServerEvent::AlertFired {
                                rule,
                                event,
                                machine_id: machine.id,
                            });
                        }
                    }
                    Err(e) => eprintln!("⚠️ Local sampler: evaluation failed: {e}"),
                }
                let _ = events.send(ServerEvent::SampleIngested {
                    machine_id: machine.id,
                    sample,
                });
            }

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(std::time::Duration::from_secs(config.heartbeat_interval_secs)) => {}
            }
        }
    });
}

fn ensure_local_machine(db: &Db, owner_id: i64) -> Result<Machine, store::StoreError> {
    if let Some(machine) = db.find_machine_by_name(owner_id, LOCAL_MACHINE_NAME)? {
        return Ok(machine);
    }

    // The key is minted and discarded; nothing authenticates as this machine.
    let (_plaintext, key_hash) = crate::auth::generate_api_key();
    let hostname = System::host_name().unwrap_or_else(|| "localhost".to_string());
    let machine = db.register_machine(
        owner_id,
        LOCAL_MACHINE_NAME,
        &hostname,
        "This server, sampled in-process",
        &key_hash,
    )?;

    let disks = Disks::new_with_refreshed_list();
    let total_disk: u64 = disks.iter().map(|d| d.total_space()).sum();
    let mut sys = System::new_all();
    sys.refresh_memory();
    let info = SystemInfoUpdate {
        platform: System::name(),
        kernel: System::kernel_version(),
        cpu_cores: Some(sys.cpus().len() as i64),
        total_memory_mb: Some((sys.total_memory() / (1024 * 1024)) as i64),
        total_disk_gb: Some((total_disk / (1024 * 1024 * 1024)) as i64),
        last_boot_at: chrono::DateTime::from_timestamp(System::boot_time() as i64, 0)
            .map(|t| t.to_rfc3339()),
    };
    db.update_system_info(machine.id, &info)?;
    db.get_machine(machine.id)
}

async fn collect_sample(sys: &mut System, machine_id: i64) -> MetricsSample {
    // CPU usage needs two refreshes a beat apart.
    sys.refresh_cpu_usage();
    tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
    sys.refresh_cpu_usage();
    sys.refresh_memory();

    let cpu_pct = sys.global_cpu_usage() as f64;
    let mem_used_pct = if sys.total_memory() > 0 {
        sys.used_memory() as f64 / sys.total_memory() as f64 * 100.0
    } else {
        0.0
    };

    let disks = Disks::new_with_refreshed_list();
    let (total, available) = disks
        .iter()
        .fold((0u64, 0u64), |(t, a), d| (t + d.total_space(), a + d.available_space()));
    let disk_used_pct = if total > 0 {
        (total - available) as f64 / total as f64 * 100.0
    } else {
        0.0
    };

    let networks = Networks::new_with_refreshed_list();
    let (rx, tx) = networks
        .iter()
        .fold((0u64, 0u64), |(r, t), (_, data)| {
            (r + data.total_received(), t + data.total_transmitted())
        });

    MetricsSample {
        machine_id,
        timestamp: store::now_rfc3339(),
        cpu_pct: cpu_pct.clamp(0.0, 100.0),
        mem_used_pct: mem_used_pct.clamp(0.0, 100.0),
        disk_used_pct: disk_used_pct.clamp(0.0, 100.0),
        net_rx_bytes: rx as i64,
        net_tx_bytes: tx as i64,
        uptime_seconds: Some(System::uptime() as i64),
    }
}
