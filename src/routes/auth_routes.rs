use crate::auth;
use crate::config::Config;
use crate::models::*;
use crate::rate_limit::{AuthRateLimits, RateLimiter};
use crate::store::{self, Db, StoreError};
use chrono::{Duration as ChronoDuration, SecondsFormat, Utc};
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::serde::json::Json;
use rocket::{get, post, State};

use super::{api_error, store_error, ApiError, ClientIp, SessionUser};

fn validate_email(email: &str) -> Result<(), ApiError> {
    let email = email.trim();
    if email.is_empty() || email.len() > 254 || !email.contains('@') {
        return Err(api_error(Status::BadRequest, "Invalid email address"));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.len() < 8 || password.len() > 256 {
        return Err(api_error(
            Status::BadRequest,
            "Password must be 8-256 characters",
        ));
    }
    Ok(())
}

fn set_session_cookie(
    cookies: &CookieJar<'_>,
    config: &Config,
    user: &User,
) -> Result<(), ApiError> {
    let token = auth::mint_session(
        &config.jwt_secret,
        user.id,
        &user.email,
        config.access_token_ttl_secs,
    )
    .ok_or_else(|| api_error(Status::InternalServerError, "Failed to create session"))?;

    cookies.add(
        Cookie::build((auth::SESSION_COOKIE, token))
            .http_only(true)
            .secure(config.secure_cookie)
            .same_site(SameSite::Lax)
            .path("/"),
    );
    Ok(())
}

#[post("/auth/register", format = "json", data = "<body>")]
pub fn register(
    db: &State<Db>,
    config: &State<Config>,
    rate_limiter: &State<RateLimiter>,
    limits: &State<AuthRateLimits>,
    ip: ClientIp,
    cookies: &CookieJar<'_>,
    body: Json<RegisterRequest>,
) -> Result<(Status, Json<User>), ApiError> {
    let info = rate_limiter.check_with_info(
        &format!("register:{}", ip.0),
        limits.register_max,
        limits.register_window_secs,
    );
    if !info.allowed {
        return Err(api_error(
            Status::TooManyRequests,
            format!(
                "Rate limited: retry in {} seconds",
                info.retry_after_secs
            ),
        ));
    }

    validate_email(&body.email)?;
    validate_password(&body.password)?;

    let hash = auth::hash_password(&body.password)
        .map_err(|_| api_error(Status::InternalServerError, "Failed to hash password"))?;

    let user = match db.create_user(&body.email, &hash) {
        Ok(user) => user,
        Err(StoreError::Conflict(_)) => {
            return Err(api_error(Status::Conflict, "Email is already registered"))
        }
        Err(e) => return Err(store_error(e)),
    };

    set_session_cookie(cookies, config, &user)?;
    Ok((Status::Created, Json(user)))
}

#[post("/auth/login", format = "json", data = "<body>")]
pub fn login(
    db: &State<Db>,
    config: &State<Config>,
    rate_limiter: &State<RateLimiter>,
    limits: &State<AuthRateLimits>,
    ip: ClientIp,
    cookies: &CookieJar<'_>,
    body: Json<LoginRequest>,
) -> Result<Json<User>, ApiError> {
    if !rate_limiter.check(
        &format!("login:{}", ip.0),
        limits.login_max,
        limits.login_window_secs,
    ) {
        return Err(api_error(
            Status::TooManyRequests,
            "Too many login attempts, try again shortly",
        ));
    }

    // One failure message for unknown email and wrong password alike.
    let auth_row = db
        .get_user_auth(&body.email)
        .map_err(|_| api_error(Status::Unauthorized, "Invalid email or password"))?;
    if !auth::verify_password(&body.password, &auth_row.password_hash) {
        return Err(api_error(Status::Unauthorized, "Invalid email or password"));
    }

    set_session_cookie(cookies, config, &auth_row.user)?;
    Ok(Json(auth_row.user))
}

#[post("/auth/logout")]
pub fn logout(cookies: &CookieJar<'_>) -> Status {
    cookies.remove(Cookie::build(auth::SESSION_COOKIE).path("/"));
    Status::NoContent
}

#[get("/auth/me")]
pub fn me(user: SessionUser) -> Json<User> {
    Json(user.0)
}

#[post("/auth/forgot-password", format = "json", data = "<body>")]
pub fn forgot_password(
    db: &State<Db>,
    config: &State<Config>,
    rate_limiter: &State<RateLimiter>,
    limits: &State<AuthRateLimits>,
    ip: ClientIp,
    body: Json<ForgotPasswordRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !rate_limiter.check(
        &format!("reset:{}", ip.0),
        limits.reset_max,
        limits.reset_window_secs,
    ) {
        return Err(api_error(
            Status::TooManyRequests,
            "Too many reset requests, try again later",
        ));
    }

    validate_email(&body.email)?;

    // No email transport in this deployment model: the single-use token is
    // returned to the caller directly. Stored hashed and TTL-bound.
    match db.get_user_auth(&body.email) {
        Ok(auth_row) => {
            let (token, token_hash) = auth::generate_reset_token();
            let expires_at = (Utc::now()
                + ChronoDuration::seconds(config.password_reset_ttl_secs as i64))
            .to_rfc3339_opts(SecondsFormat::Micros, true);
            db.create_password_reset(auth_row.user.id, &token_hash, &expires_at)
                .map_err(store_error)?;
            Ok(Json(serde_json::json!({ "reset_token": token })))
        }
        Err(StoreError::NotFound) => Ok(Json(serde_json::json!({}))),
        Err(e) => Err(store_error(e)),
    }
}

#[post("/auth/reset-password", format = "json", data = "<body>")]
pub fn reset_password(
    db: &State<Db>,
    body: Json<ResetPasswordRequest>,
) -> Result<Status, ApiError> {
    validate_password(&body.password)?;

    let token_hash = auth::sha256_hex(body.token.trim());
    let user_id = db
        .consume_password_reset(&token_hash, &store::now_rfc3339())
        .map_err(|_| api_error(Status::BadRequest, "Invalid or expired reset token"))?;

    let hash = auth::hash_password(&body.password)
        .map_err(|_| api_error(Status::InternalServerError, "Failed to hash password"))?;
    db.set_password(user_id, &hash).map_err(store_error)?;
    Ok(Status::NoContent)
}
