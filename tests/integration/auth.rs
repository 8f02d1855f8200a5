use crate::common::{register_user, test_client};
use rocket::http::{ContentType, Status};

// --- Registration ---

#[test]
fn test_first_user_is_admin() {
    let client = test_client();
    let user = register_user(&client, "a@example.com");
    assert_eq!(user["email"], "a@example.com");
    assert_eq!(user["is_admin"], true);

    let second = register_user(&client, "b@example.com");
    assert_eq!(second["is_admin"], false);
}

#[test]
fn test_register_duplicate_email() {
    let client = test_client();
    register_user(&client, "dup@example.com");

    let res = client
        .post("/auth/register")
        .header(ContentType::JSON)
        .body(r#"{"email": "dup@example.com", "password": "password123"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Conflict);
}

#[test]
fn test_register_email_case_insensitive() {
    let client = test_client();
    register_user(&client, "case@example.com");

    let res = client
        .post("/auth/register")
        .header(ContentType::JSON)
        .body(r#"{"email": "CASE@Example.com", "password": "password123"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Conflict);
}

#[test]
fn test_register_invalid_email() {
    let client = test_client();
    let res = client
        .post("/auth/register")
        .header(ContentType::JSON)
        .body(r#"{"email": "not-an-email", "password": "password123"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
}

#[test]
fn test_register_short_password() {
    let client = test_client();
    let res = client
        .post("/auth/register")
        .header(ContentType::JSON)
        .body(r#"{"email": "short@example.com", "password": "short"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
}

// --- Sessions ---

#[test]
fn test_login_and_me() {
    let client = test_client();
    register_user(&client, "me@example.com");

    // Fresh login replaces the registration session
    let res = client
        .post("/auth/login")
        .header(ContentType::JSON)
        .body(r#"{"email": "me@example.com", "password": "password123"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);

    let res = client.get("/auth/me").dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["email"], "me@example.com");
}

#[test]
fn test_login_wrong_password() {
    let client = test_client();
    register_user(&client, "wrong@example.com");

    let res = client
        .post("/auth/login")
        .header(ContentType::JSON)
        .body(r#"{"email": "wrong@example.com", "password": "not-the-password"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Unauthorized);
}

#[test]
fn test_login_unknown_email() {
    let client = test_client();
    let res = client
        .post("/auth/login")
        .header(ContentType::JSON)
        .body(r#"{"email": "ghost@example.com", "password": "password123"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Unauthorized);
}

#[test]
fn test_logout_clears_session() {
    let client = test_client();
    register_user(&client, "bye@example.com");

    let res = client.post("/auth/logout").dispatch();
    assert_eq!(res.status(), Status::NoContent);

    let res = client.get("/auth/me").dispatch();
    assert_eq!(res.status(), Status::Unauthorized);
}

#[test]
fn test_me_requires_session() {
    let client = test_client();
    let res = client.get("/auth/me").dispatch();
    assert_eq!(res.status(), Status::Unauthorized);
}

// --- Password reset ---

#[test]
fn test_password_reset_flow() {
    let client = test_client();
    register_user(&client, "reset@example.com");

    let res = client
        .post("/auth/forgot-password")
        .header(ContentType::JSON)
        .body(r#"{"email": "reset@example.com"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    let token = body["reset_token"].as_str().unwrap().to_string();
    assert!(token.starts_with("lsr_"));

    let res = client
        .post("/auth/reset-password")
        .header(ContentType::JSON)
        .body(format!(
            r#"{{"token": "{token}", "password": "newpassword456"}}"#
        ))
        .dispatch();
    assert_eq!(res.status(), Status::NoContent);

    // Old password no longer works
    let res = client
        .post("/auth/login")
        .header(ContentType::JSON)
        .body(r#"{"email": "reset@example.com", "password": "password123"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Unauthorized);

    // New password does
    let res = client
        .post("/auth/login")
        .header(ContentType::JSON)
        .body(r#"{"email": "reset@example.com", "password": "newpassword456"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
}

#[test]
fn test_reset_token_single_use() {
    let client = test_client();
    register_user(&client, "once@example.com");

    let res = client
        .post("/auth/forgot-password")
        .header(ContentType::JSON)
        .body(r#"{"email": "once@example.com"}"#)
        .dispatch();
    let body: serde_json::Value = res.into_json().unwrap();
    let token = body["reset_token"].as_str().unwrap().to_string();

    let res = client
        .post("/auth/reset-password")
        .header(ContentType::JSON)
        .body(format!(
            r#"{{"token": "{token}", "password": "newpassword456"}}"#
        ))
        .dispatch();
    assert_eq!(res.status(), Status::NoContent);

    // Second redemption fails
    let res = client
        .post("/auth/reset-password")
        .header(ContentType::JSON)
        .body(format!(
            r#"{{"token": "{token}", "password": "anotherpass789"}}"#
        ))
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
}

#[test]
fn test_reset_invalid_token() {
    let client = test_client();
    let res = client
        .post("/auth/reset-password")
        .header(ContentType::JSON)
        .body(r#"{"token": "lsr_bogus", "password": "newpassword456"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
}

#[test]
fn test_forgot_password_unknown_email() {
    let client = test_client();
    let res = client
        .post("/auth/forgot-password")
        .header(ContentType::JSON)
        .body(r#"{"email": "nobody@example.com"}"#)
        .dispatch();
    // Opaque 200 with no token
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert!(body.get("reset_token").is_none());
}
