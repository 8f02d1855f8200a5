use crate::common::{register_machine, register_user, test_client};
use rocket::http::{ContentType, Header, Status};

#[test]
fn test_ingest_requires_key() {
    let client = test_client();
    let res = client
        .post("/agent/metrics")
        .header(ContentType::JSON)
        .body(r#"{"cpu_pct": 10.0, "mem_used_pct": 20.0, "disk_used_pct": 30.0}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Unauthorized);
}

#[test]
fn test_ingest_unknown_key() {
    let client = test_client();
    let res = client
        .post("/agent/metrics")
        .header(ContentType::JSON)
        .header(Header::new("X-API-Key", "lsk_0000000000000000"))
        .body(r#"{"cpu_pct": 10.0, "mem_used_pct": 20.0, "disk_used_pct": 30.0}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Unauthorized);
}

#[test]
fn test_ingest_valid_sample() {
    let client = test_client();
    register_user(&client, "op@example.com");
    let (machine_id, api_key) = register_machine(&client, "agent-box");

    let res = client
        .post("/agent/metrics")
        .header(ContentType::JSON)
        .header(Header::new("X-API-Key", api_key))
        .body(
            r#"{"cpu_pct": 33.5, "mem_used_pct": 60.0, "disk_used_pct": 71.2,
                "net_rx_bytes": 1024, "net_tx_bytes": 2048, "uptime_seconds": 3600}"#,
        )
        .dispatch();
    assert_eq!(res.status(), Status::Accepted);
    assert!(res.into_string().unwrap_or_default().is_empty());

    let res = client
        .get(format!("/machines/{machine_id}/metrics"))
        .dispatch();
    let samples: Vec<serde_json::Value> = res.into_json().unwrap();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0]["cpu_pct"], 33.5);
    assert_eq!(samples[0]["net_rx_bytes"], 1024);
    assert_eq!(samples[0]["uptime_seconds"], 3600);
}

#[test]
fn test_ingest_bearer_auth() {
    let client = test_client();
    register_user(&client, "op@example.com");
    let (_machine_id, api_key) = register_machine(&client, "bearer-box");

    let res = client
        .post("/agent/metrics")
        .header(ContentType::JSON)
        .header(Header::new("Authorization", format!("Bearer {api_key}")))
        .body(r#"{"cpu_pct": 10.0, "mem_used_pct": 20.0, "disk_used_pct": 30.0}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Accepted);
}

#[test]
fn test_ingest_out_of_range_pct() {
    let client = test_client();
    register_user(&client, "op@example.com");
    let (_machine_id, api_key) = register_machine(&client, "range-box");

    let res = client
        .post("/agent/metrics")
        .header(ContentType::JSON)
        .header(Header::new("X-API-Key", api_key))
        .body(r#"{"cpu_pct": 120.0, "mem_used_pct": 20.0, "disk_used_pct": 30.0}"#)
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
}

#[test]
fn test_ingest_invalid_timestamp() {
    let client = test_client();
    register_user(&client, "op@example.com");
    let (_machine_id, api_key) = register_machine(&client, "ts-box");

    let res = client
        .post("/agent/metrics")
        .header(ContentType::JSON)
        .header(Header::new("X-API-Key", api_key))
        .body(
            r#"{"cpu_pct": 10.0, "mem_used_pct": 20.0, "disk_used_pct": 30.0, "timestamp": "noonish"}"#,
        )
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
}

#[test]
fn test_ingest_system_info_delta() {
    let client = test_client();
    register_user(&client, "op@example.com");
    let (machine_id, api_key) = register_machine(&client, "facts-box");

    let res = client
        .post("/agent/metrics")
        .header(ContentType::JSON)
        .header(Header::new("X-API-Key", api_key.clone()))
        .body(
            r#"{"cpu_pct": 10.0, "mem_used_pct": 20.0, "disk_used_pct": 30.0,
                "system_info": {"platform": "linux", "kernel": "6.8.0", "cpu_cores": 8}}"#,
        )
        .dispatch();
    assert_eq!(res.status(), Status::Accepted);

    let res = client.get(format!("/machines/{machine_id}")).dispatch();
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["machine"]["platform"], "linux");
    assert_eq!(body["machine"]["kernel"], "6.8.0");
    assert_eq!(body["machine"]["cpu_cores"], 8);

    // Absent fields keep their values on the next report
    let res = client
        .post("/agent/metrics")
        .header(ContentType::JSON)
        .header(Header::new("X-API-Key", api_key))
        .body(
            r#"{"cpu_pct": 11.0, "mem_used_pct": 20.0, "disk_used_pct": 30.0,
                "system_info": {"kernel": "6.9.1"}}"#,
        )
        .dispatch();
    assert_eq!(res.status(), Status::Accepted);

    let res = client.get(format!("/machines/{machine_id}")).dispatch();
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["machine"]["platform"], "linux");
    assert_eq!(body["machine"]["kernel"], "6.9.1");
}

#[test]
fn test_ingest_duplicate_timestamp_keeps_first() {
    let client = test_client();
    register_user(&client, "op@example.com");
    let (machine_id, api_key) = register_machine(&client, "dup-box");

    for cpu in [10.0, 99.0] {
        let res = client
            .post("/agent/metrics")
            .header(ContentType::JSON)
            .header(Header::new("X-API-Key", api_key.clone()))
            .body(format!(
                r#"{{"cpu_pct": {cpu}, "mem_used_pct": 20.0, "disk_used_pct": 30.0,
                     "timestamp": "2026-08-01T09:00:00Z"}}"#
            ))
            .dispatch();
        assert_eq!(res.status(), Status::Accepted);
    }

    let res = client
        .get(format!("/machines/{machine_id}/metrics"))
        .dispatch();
    let samples: Vec<serde_json::Value> = res.into_json().unwrap();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0]["cpu_pct"], 10.0);
}
