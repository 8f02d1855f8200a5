use crate::config::Config;
use crate::delivery::DispatchError;
use crate::models::*;
use crate::store::{Db, StoreError};
use crate::{auth, telegram, webhooks};
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{delete, get, post, put, State};

use super::{api_error, store_error, ApiError, SessionUser};

fn validate_webhook_url(url: &str) -> Result<String, ApiError> {
    let url = url.trim().to_string();
    if url.is_empty() || url.len() > 2048 || !url.starts_with("https://") {
        return Err(api_error(
            Status::BadRequest,
            "Webhook URL must start with https://",
        ));
    }
    Ok(url)
}

fn validate_webhook_secret(secret: &str) -> Result<(), ApiError> {
    if secret.len() < 16 || secret.len() > 128 {
        return Err(api_error(
            Status::BadRequest,
            "Webhook secret must be 16-128 characters",
        ));
    }
    Ok(())
}

/// Numeric chat id, possibly negative (group chats).
fn validate_chat_id(chat_id: &str) -> Result<String, ApiError> {
    let chat_id = chat_id.trim().to_string();
    let digits = chat_id.strip_prefix('-').unwrap_or(&chat_id);
    if digits.is_empty() || digits.len() > 20 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(api_error(
            Status::BadRequest,
            "chat_id must be a numeric Telegram chat id",
        ));
    }
    Ok(chat_id)
}

fn dispatch_error(e: DispatchError) -> ApiError {
    match e {
        DispatchError::RateLimited { reason, .. } => api_error(Status::TooManyRequests, reason),
        DispatchError::Transport(msg) => {
            api_error(Status::BadGateway, format!("Delivery failed: {msg}"))
        }
        DispatchError::ChannelDisabled => api_error(
            Status::ServiceUnavailable,
            "Telegram channel is not configured",
        ),
    }
}

fn outbound_client(config: &Config) -> Result<reqwest::Client, ApiError> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.http_timeout_secs))
        .build()
        .map_err(|_| api_error(Status::InternalServerError, "Failed to create HTTP client"))
}

// --- Webhooks ---

#[get("/notifications/webhooks")]
pub fn list_webhooks(db: &State<Db>, user: SessionUser) -> Result<Json<Vec<Webhook>>, ApiError> {
    db.list_webhooks(user.0.id).map(Json).map_err(store_error)
}

#[post("/notifications/webhooks", format = "json", data = "<body>")]
pub fn create_webhook(
    db: &State<Db>,
    user: SessionUser,
    body: Json<CreateWebhookRequest>,
) -> Result<(Status, Json<Webhook>), ApiError> {
    let url = validate_webhook_url(&body.url)?;
    validate_webhook_secret(&body.secret)?;

    let secret_hash = auth::sha256_hex(&body.secret);
    match db.create_webhook(user.0.id, &url, &secret_hash) {
        Ok(webhook) => Ok((Status::Created, Json(webhook))),
        Err(StoreError::Conflict(_)) => Err(api_error(
            Status::Conflict,
            "A webhook with this URL already exists",
        )),
        Err(e) => Err(store_error(e)),
    }
}

fn owned_webhook(db: &Db, user: &User, id: i64) -> Result<Webhook, ApiError> {
    let webhook = db.get_webhook(id).map_err(store_error)?;
    if webhook.user_id != user.id && !user.is_admin {
        return Err(api_error(Status::Forbidden, "Not your webhook"));
    }
    Ok(webhook)
}

#[put("/notifications/webhooks/<id>", format = "json", data = "<body>")]
pub fn update_webhook(
    db: &State<Db>,
    user: SessionUser,
    id: i64,
    body: Json<UpdateWebhookRequest>,
) -> Result<Json<Webhook>, ApiError> {
    owned_webhook(db, &user.0, id)?;

    let url = match body.url.as_deref() {
        Some(raw) => Some(validate_webhook_url(raw)?),
        None => None,
    };
    let secret_hash = match body.secret.as_deref() {
        Some(secret) => {
            validate_webhook_secret(secret)?;
            Some(auth::sha256_hex(secret))
        }
        None => None,
    };
    if url.is_none() && secret_hash.is_none() && body.is_active.is_none() {
        return Err(api_error(Status::BadRequest, "No fields to update"));
    }

    match db.update_webhook(id, url.as_deref(), secret_hash.as_deref(), body.is_active) {
        Ok(webhook) => Ok(Json(webhook)),
        Err(StoreError::Conflict(_)) => Err(api_error(
            Status::Conflict,
            "A webhook with this URL already exists",
        )),
        Err(e) => Err(store_error(e)),
    }
}

#[delete("/notifications/webhooks/<id>")]
pub fn delete_webhook(db: &State<Db>, user: SessionUser, id: i64) -> Result<Status, ApiError> {
    owned_webhook(db, &user.0, id)?;
    db.delete_webhook(id).map_err(store_error)?;
    Ok(Status::NoContent)
}

/// Send a synthetic payload through the real dispatcher. RateLimit and
/// transport outcomes surface unchanged as 429 / 502.
#[post("/notifications/webhooks/<id>/test")]
pub async fn test_webhook(
    db: &State<Db>,
    config: &State<Config>,
    user: SessionUser,
    id: i64,
) -> Result<Json<serde_json::Value>, ApiError> {
    let webhook = owned_webhook(db, &user.0, id)?;
    let secret_hash = db.webhook_secret_hash(id).map_err(store_error)?;
    let client = outbound_client(config)?;
    let payload = webhooks::test_payload();

    webhooks::deliver_webhook(db, &client, config, webhook.id, &webhook.url, &secret_hash, &payload)
        .await
        .map_err(dispatch_error)?;
    Ok(Json(serde_json::json!({ "delivered": true })))
}

// --- Telegram recipients ---

#[get("/notifications/telegram")]
pub fn list_telegram(
    db: &State<Db>,
    user: SessionUser,
) -> Result<Json<Vec<TelegramRecipient>>, ApiError> {
    db.list_telegram_recipients(user.0.id)
        .map(Json)
        .map_err(store_error)
}

#[post("/notifications/telegram", format = "json", data = "<body>")]
pub fn create_telegram(
    db: &State<Db>,
    user: SessionUser,
    body: Json<CreateTelegramRequest>,
) -> Result<(Status, Json<TelegramRecipient>), ApiError> {
    let chat_id = validate_chat_id(&body.chat_id)?;
    match db.create_telegram_recipient(user.0.id, &chat_id) {
        Ok(recipient) => Ok((Status::Created, Json(recipient))),
        Err(StoreError::Conflict(_)) => Err(api_error(
            Status::Conflict,
            "This chat is already registered",
        )),
        Err(e) => Err(store_error(e)),
    }
}

fn owned_telegram(db: &Db, user: &User, id: i64) -> Result<TelegramRecipient, ApiError> {
    let recipient = db.get_telegram_recipient(id).map_err(store_error)?;
    if recipient.user_id != user.id && !user.is_admin {
        return Err(api_error(Status::Forbidden, "Not your recipient"));
    }
    Ok(recipient)
}

#[put("/notifications/telegram/<id>", format = "json", data = "<body>")]
pub fn update_telegram(
    db: &State<Db>,
    user: SessionUser,
    id: i64,
    body: Json<UpdateTelegramRequest>,
) -> Result<Json<TelegramRecipient>, ApiError> {
    owned_telegram(db, &user.0, id)?;

    let chat_id = match body.chat_id.as_deref() {
        Some(raw) => Some(validate_chat_id(raw)?),
        None => None,
    };
    if chat_id.is_none() && body.is_active.is_none() {
        return Err(api_error(Status::BadRequest, "No fields to update"));
    }

    match db.update_telegram_recipient(id, chat_id.as_deref(), body.is_active) {
        Ok(recipient) => Ok(Json(recipient)),
        Err(StoreError::Conflict(_)) => Err(api_error(
            Status::Conflict,
            "This chat is already registered",
        )),
        Err(e) => Err(store_error(e)),
    }
}

#[delete("/notifications/telegram/<id>")]
pub fn delete_telegram(db: &State<Db>, user: SessionUser, id: i64) -> Result<Status, ApiError> {
    owned_telegram(db, &user.0, id)?;
    db.delete_telegram_recipient(id).map_err(store_error)?;
    Ok(Status::NoContent)
}

/// Test-fire the Telegram channel. 503 when no bot token is configured.
#[post("/notifications/telegram/<id>/test")]
pub async fn test_telegram(
    db: &State<Db>,
    config: &State<Config>,
    user: SessionUser,
    id: i64,
) -> Result<Json<serde_json::Value>, ApiError> {
    let recipient = owned_telegram(db, &user.0, id)?;
    let client = outbound_client(config)?;
    let text = telegram::test_message();

    telegram::deliver_telegram(
        db,
        &client,
        config,
        config.telegram_bot_token.as_deref(),
        recipient.id,
        &recipient.chat_id,
        &text,
    )
    .await
    .map_err(dispatch_error)?;
    Ok(Json(serde_json::json!({ "delivered": true })))
}
