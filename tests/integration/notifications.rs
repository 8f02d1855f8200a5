use crate::common::{register_user, test_client};
use rocket::http::{ContentType, Status};

// --- Webhooks ---

#[test]
fn test_create_webhook() {
    let client = test_client();
    register_user(&client, "op@example.com");

    let res = client
        .post("/notifications/webhooks")
        .header(ContentType::JSON)
        .body(r#"{"url": "https://hooks.example.com/lunasentri", "secret": "a-shared-secret-16"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Created);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["url"], "https://hooks.example.com/lunasentri");
    assert_eq!(body["is_active"], true);
    assert_eq!(body["failure_count"], 0);
    // Secret material never appears on the wire
    assert!(body.get("secret").is_none());
    assert!(body.get("secret_hash").is_none());
}

#[test]
fn test_webhook_requires_https() {
    let client = test_client();
    register_user(&client, "op@example.com");
    let res = client
        .post("/notifications/webhooks")
        .header(ContentType::JSON)
        .body(r#"{"url": "http://hooks.example.com/x", "secret": "a-shared-secret-16"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
}

#[test]
fn test_webhook_secret_length() {
    let client = test_client();
    register_user(&client, "op@example.com");
    let res = client
        .post("/notifications/webhooks")
        .header(ContentType::JSON)
        .body(r#"{"url": "https://hooks.example.com/x", "secret": "short"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
}

#[test]
fn test_webhook_duplicate_url() {
    let client = test_client();
    register_user(&client, "op@example.com");
    let res = client
        .post("/notifications/webhooks")
        .header(ContentType::JSON)
        .body(r#"{"url": "https://hooks.example.com/dup", "secret": "a-shared-secret-16"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Created);
    let res = client
        .post("/notifications/webhooks")
        .header(ContentType::JSON)
        .body(r#"{"url": "https://hooks.example.com/dup", "secret": "other-shared-secret"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Conflict);
}

#[test]
fn test_webhook_list_is_per_user() {
    let client = test_client();
    register_user(&client, "a@example.com");
    client
        .post("/notifications/webhooks")
        .header(ContentType::JSON)
        .body(r#"{"url": "https://hooks.example.com/a", "secret": "a-shared-secret-16"}"#)
        .dispatch();

    register_user(&client, "b@example.com");
    let res = client.get("/notifications/webhooks").dispatch();
    let hooks: Vec<serde_json::Value> = res.into_json().unwrap();
    assert!(hooks.is_empty());
}

#[test]
fn test_update_webhook() {
    let client = test_client();
    register_user(&client, "op@example.com");
    let res = client
        .post("/notifications/webhooks")
        .header(ContentType::JSON)
        .body(r#"{"url": "https://hooks.example.com/old", "secret": "a-shared-secret-16"}"#)
        .dispatch();
    let hook: serde_json::Value = res.into_json().unwrap();
    let id = hook["id"].as_i64().unwrap();

    let res = client
        .put(format!("/notifications/webhooks/{id}"))
        .header(ContentType::JSON)
        .body(r#"{"url": "https://hooks.example.com/new", "is_active": false}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let updated: serde_json::Value = res.into_json().unwrap();
    assert_eq!(updated["url"], "https://hooks.example.com/new");
    assert_eq!(updated["is_active"], false);
}

#[test]
fn test_update_webhook_no_fields() {
    let client = test_client();
    register_user(&client, "op@example.com");
    let res = client
        .post("/notifications/webhooks")
        .header(ContentType::JSON)
        .body(r#"{"url": "https://hooks.example.com/x", "secret": "a-shared-secret-16"}"#)
        .dispatch();
    let hook: serde_json::Value = res.into_json().unwrap();
    let id = hook["id"].as_i64().unwrap();

    let res = client
        .put(format!("/notifications/webhooks/{id}"))
        .header(ContentType::JSON)
        .body(r#"{}"#)
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
}

#[test]
fn test_other_users_webhook_is_forbidden() {
    let client = test_client();
    register_user(&client, "a@example.com"); // admin
    register_user(&client, "b@example.com");
    let res = client
        .post("/notifications/webhooks")
        .header(ContentType::JSON)
        .body(r#"{"url": "https://hooks.example.com/b", "secret": "a-shared-secret-16"}"#)
        .dispatch();
    let hook: serde_json::Value = res.into_json().unwrap();
    let id = hook["id"].as_i64().unwrap();

    // Third, non-admin user may not touch B's webhook
    register_user(&client, "c@example.com");
    let res = client
        .put(format!("/notifications/webhooks/{id}"))
        .header(ContentType::JSON)
        .body(r#"{"is_active": false}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Forbidden);

    let res = client
        .delete(format!("/notifications/webhooks/{id}"))
        .dispatch();
    assert_eq!(res.status(), Status::Forbidden);
}

#[test]
fn test_delete_webhook() {
    let client = test_client();
    register_user(&client, "op@example.com");
    let res = client
        .post("/notifications/webhooks")
        .header(ContentType::JSON)
        .body(r#"{"url": "https://hooks.example.com/x", "secret": "a-shared-secret-16"}"#)
        .dispatch();
    let hook: serde_json::Value = res.into_json().unwrap();
    let id = hook["id"].as_i64().unwrap();

    let res = client
        .delete(format!("/notifications/webhooks/{id}"))
        .dispatch();
    assert_eq!(res.status(), Status::NoContent);

    let res = client.get("/notifications/webhooks").dispatch();
    let hooks: Vec<serde_json::Value> = res.into_json().unwrap();
    assert!(hooks.is_empty());
}

// --- Telegram recipients ---

#[test]
fn test_create_telegram_recipient() {
    let client = test_client();
    register_user(&client, "op@example.com");

    let res = client
        .post("/notifications/telegram")
        .header(ContentType::JSON)
        .body(r#"{"chat_id": "123456789"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Created);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["chat_id"], "123456789");
    assert_eq!(body["is_active"], true);
}

#[test]
fn test_group_chat_id_may_be_negative() {
    let client = test_client();
    register_user(&client, "op@example.com");
    let res = client
        .post("/notifications/telegram")
        .header(ContentType::JSON)
        .body(r#"{"chat_id": "-1001234567890"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Created);
}

#[test]
fn test_telegram_chat_id_validation() {
    let client = test_client();
    register_user(&client, "op@example.com");
    for chat_id in ["abc", "", "12-34", "-"] {
        let res = client
            .post("/notifications/telegram")
            .header(ContentType::JSON)
            .body(format!(r#"{{"chat_id": "{chat_id}"}}"#))
            .dispatch();
        assert_eq!(res.status(), Status::BadRequest, "chat_id: {chat_id}");
    }
}

#[test]
fn test_telegram_duplicate_chat() {
    let client = test_client();
    register_user(&client, "op@example.com");
    client
        .post("/notifications/telegram")
        .header(ContentType::JSON)
        .body(r#"{"chat_id": "42"}"#)
        .dispatch();
    let res = client
        .post("/notifications/telegram")
        .header(ContentType::JSON)
        .body(r#"{"chat_id": "42"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Conflict);
}

#[test]
fn test_update_and_delete_telegram() {
    let client = test_client();
    register_user(&client, "op@example.com");
    let res = client
        .post("/notifications/telegram")
        .header(ContentType::JSON)
        .body(r#"{"chat_id": "42"}"#)
        .dispatch();
    let body: serde_json::Value = res.into_json().unwrap();
    let id = body["id"].as_i64().unwrap();

    let res = client
        .put(format!("/notifications/telegram/{id}"))
        .header(ContentType::JSON)
        .body(r#"{"is_active": false}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let updated: serde_json::Value = res.into_json().unwrap();
    assert_eq!(updated["is_active"], false);

    let res = client
        .delete(format!("/notifications/telegram/{id}"))
        .dispatch();
    assert_eq!(res.status(), Status::NoContent);

    let res = client.get("/notifications/telegram").dispatch();
    let recipients: Vec<serde_json::Value> = res.into_json().unwrap();
    assert!(recipients.is_empty());
}

#[test]
fn test_notifications_require_session() {
    let client = test_client();
    assert_eq!(
        client.get("/notifications/webhooks").dispatch().status(),
        Status::Unauthorized
    );
    assert_eq!(
        client.get("/notifications/telegram").dispatch().status(),
        Status::Unauthorized
    );
}
