use crate::alerts::AlertEngine;
use crate::events::{EventBus, ServerEvent};
use crate::models::{AgentMetricsRequest, MetricsSample};
use crate::store::{self, Db};
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{post, State};
use std::sync::Arc;

use super::{api_error, store_error, AgentAuth, ApiError};

fn validate_pct(value: f64, field: &str) -> Result<(), ApiError> {
    if !(0.0..=100.0).contains(&value) || value.is_nan() {
        return Err(api_error(
            Status::BadRequest,
            format!("{field} must be between 0 and 100"),
        ));
    }
    Ok(())
}

/// Agent-side ingest: authenticate, persist, apply system facts, evaluate
/// rules synchronously, then 202. A rule that fires here is visible to the
/// events API before the agent sees the response.
#[post("/agent/metrics", format = "json", data = "<body>")]
pub fn ingest_metrics(
    db: &State<Db>,
    engine: &State<Arc<AlertEngine>>,
    events: &State<EventBus>,
    agent: AgentAuth,
    body: Json<AgentMetricsRequest>,
) -> Result<Status, ApiError> {
    validate_pct(body.cpu_pct, "cpu_pct")?;
    validate_pct(body.mem_used_pct, "mem_used_pct")?;
    validate_pct(body.disk_used_pct, "disk_used_pct")?;
    if body.net_rx_bytes < 0 || body.net_tx_bytes < 0 {
        return Err(api_error(
            Status::BadRequest,
            "Network counters must be non-negative",
        ));
    }

    let timestamp = match body.timestamp.as_deref() {
        Some(raw) => store::canonical_rfc3339(raw)
            .ok_or_else(|| api_error(Status::BadRequest, "Invalid sample timestamp"))?,
        None => store::now_rfc3339(),
    };

    let sample = MetricsSample {
        machine_id: agent.machine.id,
        timestamp,
        cpu_pct: body.cpu_pct,
        mem_used_pct: body.mem_used_pct,
        disk_used_pct: body.disk_used_pct,
        net_rx_bytes: body.net_rx_bytes,
        net_tx_bytes: body.net_tx_bytes,
        uptime_seconds: body.uptime_seconds,
    };

    db.record_sample(&sample).map_err(store_error)?;

    if let Some(ref info) = body.system_info {
        db.update_system_info(agent.machine.id, info)
            .map_err(store_error)?;
    }

    // The guard already flipped the machine online. If an offline
    // notification went out while it was silent, the CAS-cleared marker says
    // this request owns the recovery notification.
    if db.clear_offline_marker(agent.machine.id).unwrap_or(false)
        && let Ok(machine) = db.get_machine(agent.machine.id)
    {
        events.publish(ServerEvent::MachineOnline(machine));
    }

    let fired = engine.evaluate(db, &sample).map_err(store_error)?;
    for (rule, event) in fired {
        events.publish(ServerEvent::AlertFired {
            rule,
            event,
            machine_id: agent.machine.id,
        });
    }

    events.publish(ServerEvent::SampleIngested {
        machine_id: agent.machine.id,
        sample,
    });

    Ok(Status::Accepted)
}
