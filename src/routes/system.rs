use rocket::get;
use rocket::http::Status;
use rocket::serde::json::Json;

// --- Health ---

#[get("/health")]
pub fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "lunasentri",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

// --- Catchers ---

#[rocket::catch(401)]
pub fn unauthorized() -> Json<serde_json::Value> {
    Json(serde_json::json!({"error": "Authentication required"}))
}

#[rocket::catch(403)]
pub fn forbidden() -> Json<serde_json::Value> {
    Json(serde_json::json!({"error": "Forbidden"}))
}

#[rocket::catch(404)]
pub fn not_found() -> Json<serde_json::Value> {
    Json(serde_json::json!({"error": "Not found"}))
}

// Malformed JSON bodies surface from the framework as 422; the API contract
// treats them as plain validation failures.
#[rocket::catch(422)]
pub fn unprocessable() -> (Status, Json<serde_json::Value>) {
    (
        Status::BadRequest,
        Json(serde_json::json!({"error": "Invalid request body"})),
    )
}

#[rocket::catch(429)]
pub fn too_many_requests() -> Json<serde_json::Value> {
    Json(serde_json::json!({"error": "Too many requests"}))
}
