use crate::config::Config;
use crate::events::{EventBus, ServerEvent};
use crate::store::{self, Db};
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::response::stream::{Event, EventStream};
use rocket::serde::json::Json;
use rocket::{get, State};
use tokio::time::{interval, Duration};

use super::{RequestOrigin, SessionUser};

fn refuse(status: Status, message: &str) -> Custom<Json<serde_json::Value>> {
    Custom(status, Json(serde_json::json!({ "error": message })))
}

/// Per-machine live metric stream. The caller must own the machine (or be
/// admin) and, when a browser sends one, the Origin must match the
/// allow-list; any violation closes the connection immediately.
///
/// The latest stored sample is pushed first, then one `sample` event per
/// newly ingested sample for this machine in ingestion order. A subscriber
/// that falls behind the bounded queue is dropped rather than buffered.
#[get("/machines/<id>/stream")]
pub fn machine_stream(
    db: &State<Db>,
    events: &State<EventBus>,
    config: &State<Config>,
    user: SessionUser,
    origin: RequestOrigin,
    id: i64,
) -> Result<EventStream![], Custom<Json<serde_json::Value>>> {
    if let Some(ref o) = origin.0
        && o.trim_end_matches('/') != config.cors_allowed_origin
    {
        return Err(refuse(Status::Forbidden, "Origin not allowed"));
    }

    let machine = db
        .get_machine(id)
        .map_err(|_| refuse(Status::NotFound, "Machine not found"))?;
    if machine.user_id != user.0.id && !user.0.is_admin {
        return Err(refuse(Status::Forbidden, "Not your machine"));
    }

    let latest = db.latest_sample(id).ok().flatten();
    let mut rx = events.sender.subscribe();
    let machine_id = id;

    Ok(EventStream! {
        // Current state first, so a fresh dashboard renders immediately.
        if let Some(sample) = latest {
            yield Event::json(&sample).event("sample");
        }

        let mut heartbeat = interval(Duration::from_secs(15));

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Ok(ServerEvent::SampleIngested { machine_id: mid, sample }) if mid == machine_id => {
                            yield Event::json(&sample).event("sample");
                        }
                        Ok(_) => {} // different machine or non-sample event
                        // Lagged: this consumer is too slow, drop it.
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => break,
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
                _ = heartbeat.tick() => {
                    yield Event::json(&serde_json::json!({"time": store::now_rfc3339()})).event("heartbeat");
                }
            }
        }
    })
}
