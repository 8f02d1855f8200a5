use crate::alerts::AlertEngine;
use crate::models::*;
use crate::store::Db;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{delete, get, post, put, State};
use std::sync::Arc;

use super::{api_error, store_error, ApiError, SessionUser};

fn validate_rule(req: &AlertRuleRequest) -> Result<(), ApiError> {
    let name = req.name.trim();
    if name.is_empty() || name.len() > 100 {
        return Err(api_error(
            Status::BadRequest,
            "Rule name must be 1-100 characters",
        ));
    }
    if !ALERT_METRICS.contains(&req.metric.as_str()) {
        return Err(api_error(
            Status::BadRequest,
            format!("Unknown metric '{}'. Valid metrics: {}", req.metric, ALERT_METRICS.join(", ")),
        ));
    }
    if !ALERT_COMPARISONS.contains(&req.comparison.as_str()) {
        return Err(api_error(
            Status::BadRequest,
            "Comparison must be 'above' or 'below'",
        ));
    }
    if !(0.0..=100.0).contains(&req.threshold_pct) || req.threshold_pct.is_nan() {
        return Err(api_error(
            Status::BadRequest,
            "threshold_pct must be between 0 and 100",
        ));
    }
    if req.trigger_after < 1 {
        return Err(api_error(Status::BadRequest, "trigger_after must be >= 1"));
    }
    Ok(())
}

#[get("/alerts/rules")]
pub fn list_rules(db: &State<Db>, _user: SessionUser) -> Result<Json<Vec<AlertRule>>, ApiError> {
    db.list_rules().map(Json).map_err(store_error)
}

#[post("/alerts/rules", format = "json", data = "<body>")]
pub fn create_rule(
    db: &State<Db>,
    engine: &State<Arc<AlertEngine>>,
    _user: SessionUser,
    body: Json<AlertRuleRequest>,
) -> Result<(Status, Json<AlertRule>), ApiError> {
    validate_rule(&body)?;
    let rule = db.create_rule(&body).map_err(store_error)?;
    engine.invalidate(None);
    Ok((Status::Created, Json(rule)))
}

#[put("/alerts/rules/<id>", format = "json", data = "<body>")]
pub fn update_rule(
    db: &State<Db>,
    engine: &State<Arc<AlertEngine>>,
    _user: SessionUser,
    id: i64,
    body: Json<AlertRuleRequest>,
) -> Result<Json<AlertRule>, ApiError> {
    validate_rule(&body)?;
    let rule = db.update_rule(id, &body).map_err(store_error)?;
    // Editing a rule wipes its runtime streak.
    engine.invalidate(Some(id));
    Ok(Json(rule))
}

#[delete("/alerts/rules/<id>")]
pub fn delete_rule(
    db: &State<Db>,
    engine: &State<Arc<AlertEngine>>,
    _user: SessionUser,
    id: i64,
) -> Result<Status, ApiError> {
    db.delete_rule(id).map_err(store_error)?;
    engine.invalidate(Some(id));
    Ok(Status::NoContent)
}

#[get("/alerts/events?<limit>")]
pub fn list_events(
    db: &State<Db>,
    _user: SessionUser,
    limit: Option<i64>,
) -> Result<Json<Vec<AlertEvent>>, ApiError> {
    let limit = limit.unwrap_or(100).clamp(1, 500);
    db.list_events(limit).map(Json).map_err(store_error)
}

/// Acknowledge an event. Idempotent: a second ack returns the row unchanged.
#[post("/alerts/events/<id>/ack")]
pub fn ack_event(db: &State<Db>, _user: SessionUser, id: i64) -> Result<Json<AlertEvent>, ApiError> {
    db.ack_event(id).map(Json).map_err(store_error)
}
