use crate::auth;
use crate::models::*;
use crate::store::{self, Db};
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{delete, get, post, State};

use super::{api_error, authorize_machine, store_error, ApiError, SessionUser};

#[get("/machines")]
pub fn list_machines(db: &State<Db>, user: SessionUser) -> Result<Json<Vec<Machine>>, ApiError> {
    db.list_machines(user.0.id).map(Json).map_err(store_error)
}

#[post("/machines", format = "json", data = "<body>")]
pub fn register_machine(
    db: &State<Db>,
    user: SessionUser,
    body: Json<RegisterMachineRequest>,
) -> Result<(Status, Json<RegisterMachineResponse>), ApiError> {
    let name = body.name.trim().to_string();
    let hostname = body.hostname.trim().to_string();
    if name.is_empty() || name.len() > 100 {
        return Err(api_error(
            Status::BadRequest,
            "Machine name must be 1-100 characters",
        ));
    }
    if hostname.is_empty() || hostname.len() > 255 {
        return Err(api_error(
            Status::BadRequest,
            "Hostname must be 1-255 characters",
        ));
    }

    let (api_key, key_hash) = auth::generate_api_key();
    let machine = db
        .register_machine(user.0.id, &name, &hostname, body.description.trim(), &key_hash)
        .map_err(store_error)?;

    Ok((
        Status::Created,
        Json(RegisterMachineResponse { machine, api_key }),
    ))
}

#[get("/machines/<id>")]
pub fn get_machine(
    db: &State<Db>,
    user: SessionUser,
    id: i64,
) -> Result<Json<serde_json::Value>, ApiError> {
    let machine = authorize_machine(db, &user.0, id)?;
    let latest_sample = db.latest_sample(id).map_err(store_error)?;
    Ok(Json(serde_json::json!({
        "machine": machine,
        "latest_sample": latest_sample,
    })))
}

#[delete("/machines/<id>")]
pub fn delete_machine(db: &State<Db>, user: SessionUser, id: i64) -> Result<Status, ApiError> {
    authorize_machine(db, &user.0, id)?;
    db.delete_machine(id).map_err(store_error)?;
    Ok(Status::NoContent)
}

#[post("/machines/<id>/rotate-key")]
pub fn rotate_key(
    db: &State<Db>,
    user: SessionUser,
    id: i64,
) -> Result<Json<serde_json::Value>, ApiError> {
    authorize_machine(db, &user.0, id)?;
    let (api_key, key_hash) = auth::generate_api_key();
    db.rotate_key(id, &key_hash).map_err(store_error)?;
    Ok(Json(serde_json::json!({ "api_key": api_key })))
}

#[post("/machines/<id>/enabled", format = "json", data = "<body>")]
pub fn set_machine_enabled(
    db: &State<Db>,
    user: SessionUser,
    id: i64,
    body: Json<SetEnabledRequest>,
) -> Result<Json<Machine>, ApiError> {
    authorize_machine(db, &user.0, id)?;
    db.set_machine_enabled(id, body.enabled)
        .map(Json)
        .map_err(store_error)
}

#[get("/machines/<id>/metrics?<from>&<to>&<limit>")]
pub fn machine_history(
    db: &State<Db>,
    user: SessionUser,
    id: i64,
    from: Option<&str>,
    to: Option<&str>,
    limit: Option<i64>,
) -> Result<Json<Vec<MetricsSample>>, ApiError> {
    authorize_machine(db, &user.0, id)?;

    let from = match from {
        Some(v) => Some(
            store::canonical_rfc3339(v)
                .ok_or_else(|| api_error(Status::BadRequest, "Invalid 'from' timestamp"))?,
        ),
        None => None,
    };
    let to = match to {
        Some(v) => Some(
            store::canonical_rfc3339(v)
                .ok_or_else(|| api_error(Status::BadRequest, "Invalid 'to' timestamp"))?,
        ),
        None => None,
    };
    let limit = limit.unwrap_or(100).clamp(1, 1000);

    db.sample_history(id, from.as_deref(), to.as_deref(), limit)
        .map(Json)
        .map_err(store_error)
}
