use crate::common::{register_user, test_client};
use rocket::http::{ContentType, Status};

#[test]
fn test_admin_creates_and_lists_users() {
    let client = test_client();
    register_user(&client, "admin@example.com"); // first user → admin

    let res = client
        .post("/users")
        .header(ContentType::JSON)
        .body(r#"{"email": "worker@example.com", "password": "password123"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Created);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["is_admin"], false);

    let res = client.get("/users").dispatch();
    assert_eq!(res.status(), Status::Ok);
    let users: Vec<serde_json::Value> = res.into_json().unwrap();
    assert_eq!(users.len(), 2);
}

#[test]
fn test_non_admin_cannot_manage_users() {
    let client = test_client();
    register_user(&client, "admin@example.com");
    register_user(&client, "plain@example.com"); // session is now the non-admin

    let res = client.get("/users").dispatch();
    assert_eq!(res.status(), Status::Forbidden);

    let res = client
        .post("/users")
        .header(ContentType::JSON)
        .body(r#"{"email": "x@example.com", "password": "password123"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Forbidden);
}

#[test]
fn test_users_require_session() {
    let client = test_client();
    let res = client.get("/users").dispatch();
    assert_eq!(res.status(), Status::Unauthorized);
}

#[test]
fn test_delete_user() {
    let client = test_client();
    register_user(&client, "admin@example.com");

    let res = client
        .post("/users")
        .header(ContentType::JSON)
        .body(r#"{"email": "victim@example.com", "password": "password123"}"#)
        .dispatch();
    let victim: serde_json::Value = res.into_json().unwrap();
    let victim_id = victim["id"].as_i64().unwrap();

    let res = client.delete(format!("/users/{victim_id}")).dispatch();
    assert_eq!(res.status(), Status::NoContent);

    let res = client.get("/users").dispatch();
    let users: Vec<serde_json::Value> = res.into_json().unwrap();
    assert_eq!(users.len(), 1);
}

#[test]
fn test_last_admin_protected() {
    let client = test_client();
    let admin = register_user(&client, "admin@example.com");
    let admin_id = admin["id"].as_i64().unwrap();

    // Only admin in the deployment: refuse
    let res = client.delete(format!("/users/{admin_id}")).dispatch();
    assert_eq!(res.status(), Status::Conflict);

    // With a second admin present the same delete succeeds
    let res = client
        .post("/users")
        .header(ContentType::JSON)
        .body(r#"{"email": "admin2@example.com", "password": "password123", "is_admin": true}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Created);

    let res = client.delete(format!("/users/{admin_id}")).dispatch();
    assert_eq!(res.status(), Status::NoContent);
}

#[test]
fn test_delete_user_not_found() {
    let client = test_client();
    register_user(&client, "admin@example.com");
    let res = client.delete("/users/9999").dispatch();
    assert_eq!(res.status(), Status::NotFound);
}
