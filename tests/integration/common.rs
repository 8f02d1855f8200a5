use lunasentri::config::Config;
use rocket::http::{ContentType, Status};
use rocket::local::blocking::Client;

/// Wrapper around Client that auto-deletes the temp DB on drop.
/// Uses Option<Client> so the SQLite connection is released (WAL mode holds
/// the file) before the files are removed.
pub struct TestClient {
    client: Option<Client>,
    db_path: String,
}

impl Drop for TestClient {
    fn drop(&mut self) {
        drop(self.client.take());
        let _ = std::fs::remove_file(&self.db_path);
        let _ = std::fs::remove_file(format!("{}-wal", self.db_path));
        let _ = std::fs::remove_file(format!("{}-shm", self.db_path));
    }
}

impl std::ops::Deref for TestClient {
    type Target = Client;
    fn deref(&self) -> &Client {
        self.client.as_ref().unwrap()
    }
}

fn temp_db_path() -> String {
    format!(
        "/tmp/lunasentri_test_{}.db",
        uuid::Uuid::new_v4().to_string().split('-').next().unwrap()
    )
}

/// Config suitable for tests: fixed signing key, plain cookies.
pub fn test_config() -> Config {
    Config {
        jwt_secret: "test-signing-key".to_string(),
        secure_cookie: false,
        ..Config::default()
    }
}

pub fn test_client() -> TestClient {
    test_client_with_config(test_config())
}

pub fn test_client_with_config(config: Config) -> TestClient {
    // Unique temp DB per test (avoids parallel test contention)
    let db_path = temp_db_path();
    let rocket = lunasentri::rocket_with_config(&db_path, config);
    let client = Client::tracked(rocket).expect("valid rocket instance");
    TestClient {
        client: Some(client),
        db_path,
    }
}

/// A bare store handle for white-box tests, deleted on drop.
pub struct TestDb {
    db: Option<lunasentri::store::Db>,
    db_path: String,
}

impl Drop for TestDb {
    fn drop(&mut self) {
        drop(self.db.take());
        let _ = std::fs::remove_file(&self.db_path);
        let _ = std::fs::remove_file(format!("{}-wal", self.db_path));
        let _ = std::fs::remove_file(format!("{}-shm", self.db_path));
    }
}

impl std::ops::Deref for TestDb {
    type Target = lunasentri::store::Db;
    fn deref(&self) -> &lunasentri::store::Db {
        self.db.as_ref().unwrap()
    }
}

pub fn test_db() -> TestDb {
    let db_path = temp_db_path();
    let db = lunasentri::store::Db::open(&db_path).expect("valid store");
    TestDb {
        db: Some(db),
        db_path,
    }
}

/// Register a user over HTTP; the session cookie lands in the client jar.
pub fn register_user(client: &Client, email: &str) -> serde_json::Value {
    let res = client
        .post("/auth/register")
        .header(ContentType::JSON)
        .body(format!(
            r#"{{"email": "{email}", "password": "password123"}}"#
        ))
        .dispatch();
    assert_eq!(res.status(), Status::Created);
    res.into_json().unwrap()
}

pub fn login_user(client: &Client, email: &str) {
    let res = client
        .post("/auth/login")
        .header(ContentType::JSON)
        .body(format!(
            r#"{{"email": "{email}", "password": "password123"}}"#
        ))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
}

/// Register a machine for the logged-in user; returns (machine_id, api_key).
pub fn register_machine(client: &Client, name: &str) -> (i64, String) {
    let res = client
        .post("/machines")
        .header(ContentType::JSON)
        .body(format!(
            r#"{{"name": "{name}", "hostname": "{name}.local"}}"#
        ))
        .dispatch();
    assert_eq!(res.status(), Status::Created);
    let body: serde_json::Value = res.into_json().unwrap();
    (
        body["machine"]["id"].as_i64().unwrap(),
        body["api_key"].as_str().unwrap().to_string(),
    )
}

/// Post one metric sample as an agent. Asserts the expected status.
pub fn post_sample(client: &Client, api_key: &str, cpu: f64, expected: Status) {
    let res = client
        .post("/agent/metrics")
        .header(ContentType::JSON)
        .header(rocket::http::Header::new("X-API-Key", api_key.to_string()))
        .body(format!(
            r#"{{"cpu_pct": {cpu}, "mem_used_pct": 40.0, "disk_used_pct": 55.0}}"#
        ))
        .dispatch();
    assert_eq!(res.status(), expected);
}
