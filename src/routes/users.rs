use crate::auth;
use crate::models::{CreateUserRequest, User};
use crate::store::{Db, StoreError};
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{delete, get, post, State};

use super::{api_error, store_error, AdminUser, ApiError};

#[post("/users", format = "json", data = "<body>")]
pub fn admin_create_user(
    db: &State<Db>,
    _admin: AdminUser,
    body: Json<CreateUserRequest>,
) -> Result<(Status, Json<User>), ApiError> {
    let email = body.email.trim();
    if email.is_empty() || email.len() > 254 || !email.contains('@') {
        return Err(api_error(Status::BadRequest, "Invalid email address"));
    }
    if body.password.len() < 8 || body.password.len() > 256 {
        return Err(api_error(
            Status::BadRequest,
            "Password must be 8-256 characters",
        ));
    }

    let hash = auth::hash_password(&body.password)
        .map_err(|_| api_error(Status::InternalServerError, "Failed to hash password"))?;

    match db.create_user_with_role(email, &hash, body.is_admin) {
        Ok(user) => Ok((Status::Created, Json(user))),
        Err(StoreError::Conflict(_)) => {
            Err(api_error(Status::Conflict, "Email is already registered"))
        }
        Err(e) => Err(store_error(e)),
    }
}

#[get("/users")]
pub fn admin_list_users(db: &State<Db>, _admin: AdminUser) -> Result<Json<Vec<User>>, ApiError> {
    db.list_users().map(Json).map_err(store_error)
}

#[delete("/users/<id>")]
pub fn admin_delete_user(db: &State<Db>, _admin: AdminUser, id: i64) -> Result<Status, ApiError> {
    db.delete_user(id).map_err(store_error)?;
    Ok(Status::NoContent)
}
