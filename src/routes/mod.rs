// Route module decomposition — each domain area in its own file.
// Shared request guards and error helpers live here; route functions in submodules.

mod agent;
mod alert_routes;
mod auth_routes;
mod machine_routes;
mod notification_routes;
mod stream;
mod system;
mod users;

// --- Re-exports (all route functions used by lib.rs mount) ---

pub use agent::ingest_metrics;
pub use alert_routes::{ack_event, create_rule, delete_rule, list_events, list_rules, update_rule};
pub use auth_routes::{forgot_password, login, logout, me, register, reset_password};
pub use machine_routes::{
    delete_machine, get_machine, list_machines, machine_history, register_machine, rotate_key,
    set_machine_enabled,
};
pub use notification_routes::{
    create_telegram, create_webhook, delete_telegram, delete_webhook, list_telegram, list_webhooks,
    test_telegram, test_webhook, update_telegram, update_webhook,
};
pub use stream::machine_stream;
pub use system::{forbidden, health, not_found, too_many_requests, unauthorized, unprocessable};
pub use users::{admin_create_user, admin_delete_user, admin_list_users};

use crate::auth;
use crate::config::Config;
use crate::models::{Machine, User};
use crate::store::{Db, StoreError};
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};
use rocket::serde::json::Json;

/// Error half of every handler: status plus an `{"error": ...}` body.
pub type ApiError = (Status, Json<serde_json::Value>);

pub fn api_error(status: Status, message: impl Into<String>) -> ApiError {
    (status, Json(serde_json::json!({ "error": message.into() })))
}

/// Handler-side store-error mapping: misses 404, uniqueness 409, invariant
/// violations 409, backend 500. Backend details stay out of response bodies.
pub fn store_error(e: StoreError) -> ApiError {
    match e {
        StoreError::NotFound => api_error(Status::NotFound, "Not found"),
        StoreError::Conflict(_) => api_error(Status::Conflict, "Already exists"),
        StoreError::Invariant(msg) => api_error(Status::Conflict, msg),
        StoreError::Backend(_) => api_error(Status::InternalServerError, "Internal server error"),
    }
}

// --- Shared request guards ---

pub struct ClientIp(pub String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ClientIp {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let ip = req
            .headers()
            .get_one("X-Forwarded-For")
            .and_then(|s| s.split(',').next())
            .map(|s| s.trim().to_string())
            .or_else(|| req.remote().map(|r| r.ip().to_string()))
            .unwrap_or_else(|| "unknown".to_string());
        Outcome::Success(ClientIp(ip))
    }
}

/// Dashboard caller: session cookie holding a valid signed token for an
/// existing user.
pub struct SessionUser(pub User);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for SessionUser {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let (Some(db), Some(config)) = (req.rocket().state::<Db>(), req.rocket().state::<Config>())
        else {
            return Outcome::Error((Status::InternalServerError, ()));
        };
        let Some(cookie) = req.cookies().get(auth::SESSION_COOKIE) else {
            return Outcome::Error((Status::Unauthorized, ()));
        };
        let Some(claims) = auth::verify_session(&config.jwt_secret, cookie.value()) else {
            return Outcome::Error((Status::Unauthorized, ()));
        };
        match db.get_user(claims.sub) {
            Ok(user) => Outcome::Success(SessionUser(user)),
            Err(_) => Outcome::Error((Status::Unauthorized, ())),
        }
    }
}

pub struct AdminUser(pub User);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminUser {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match req.guard::<SessionUser>().await {
            Outcome::Success(SessionUser(user)) if user.is_admin => {
                Outcome::Success(AdminUser(user))
            }
            Outcome::Success(_) => Outcome::Error((Status::Forbidden, ())),
            Outcome::Error(e) => Outcome::Error(e),
            Outcome::Forward(f) => Outcome::Forward(f),
        }
    }
}

/// Agent caller: `X-API-Key` (or `Authorization: Bearer`) matching an
/// unrevoked machine key. Authenticating records `last_seen` and flips the
/// machine online; `was_offline` reports the prior status. Unknown or
/// revoked keys are 401, disabled machines 403.
pub struct AgentAuth {
    pub machine: Machine,
    pub was_offline: bool,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AgentAuth {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(db) = req.rocket().state::<Db>() else {
            return Outcome::Error((Status::InternalServerError, ()));
        };
        let key = req
            .headers()
            .get_one("X-API-Key")
            .map(str::to_string)
            .or_else(|| {
                req.headers()
                    .get_one("Authorization")
                    .and_then(|a| a.strip_prefix("Bearer "))
                    .map(str::to_string)
            });
        let Some(key) = key else {
            return Outcome::Error((Status::Unauthorized, ()));
        };
        match db.authenticate_machine(&auth::sha256_hex(key.trim())) {
            Ok((machine, was_offline)) => Outcome::Success(AgentAuth {
                machine,
                was_offline,
            }),
            Err(StoreError::NotFound) => Outcome::Error((Status::Unauthorized, ())),
            Err(StoreError::Invariant(_)) => Outcome::Error((Status::Forbidden, ())),
            Err(_) => Outcome::Error((Status::InternalServerError, ())),
        }
    }
}

/// The request's Origin header, when the client sent one.
pub struct RequestOrigin(pub Option<String>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RequestOrigin {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        Outcome::Success(RequestOrigin(
            req.headers().get_one("Origin").map(str::to_string),
        ))
    }
}

/// Load a machine and check the caller may act on it (owner or admin).
pub fn authorize_machine(db: &Db, user: &User, machine_id: i64) -> Result<Machine, ApiError> {
    let machine = db.get_machine(machine_id).map_err(store_error)?;
    if machine.user_id != user.id && !user.is_admin {
        return Err(api_error(Status::Forbidden, "Not your machine"));
    }
    Ok(machine)
}
