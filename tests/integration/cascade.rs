use crate::common::test_db;
use chrono::{Duration, SecondsFormat, Utc};
use lunasentri::auth;
use lunasentri::models::MetricsSample;
use lunasentri::store::{now_rfc3339, StoreError};

/// Deleting a user removes machines, channels, keys, history, and reset
/// tokens; no orphan rows survive.
#[test]
fn test_user_delete_cascades() {
    let db = test_db();
    db.create_user("admin@example.com", "irrelevant-hash").unwrap(); // first → admin
    let user = db.create_user("victim@example.com", "irrelevant-hash").unwrap();
    assert!(!user.is_admin);

    let (key, key_hash) = auth::generate_api_key();
    let machine = db
        .register_machine(user.id, "web-1", "web-1.local", "", &key_hash)
        .unwrap();
    db.record_sample(&MetricsSample {
        machine_id: machine.id,
        timestamp: now_rfc3339(),
        cpu_pct: 50.0,
        mem_used_pct: 50.0,
        disk_used_pct: 50.0,
        net_rx_bytes: 0,
        net_tx_bytes: 0,
        uptime_seconds: None,
    })
    .unwrap();
    let webhook = db
        .create_webhook(user.id, "https://example.com/hook", &auth::sha256_hex("a-shared-secret-16"))
        .unwrap();
    let recipient = db.create_telegram_recipient(user.id, "42").unwrap();
    let (_token, token_hash) = auth::generate_reset_token();
    let expires = (Utc::now() + Duration::hours(1)).to_rfc3339_opts(SecondsFormat::Micros, true);
    db.create_password_reset(user.id, &token_hash, &expires).unwrap();

    db.delete_user(user.id).unwrap();

    assert!(matches!(db.get_user(user.id), Err(StoreError::NotFound)));
    assert!(matches!(db.get_machine(machine.id), Err(StoreError::NotFound)));
    assert!(matches!(db.get_webhook(webhook.id), Err(StoreError::NotFound)));
    assert!(matches!(
        db.get_telegram_recipient(recipient.id),
        Err(StoreError::NotFound)
    ));
    assert!(db.latest_sample(machine.id).unwrap().is_none());
    assert!(matches!(
        db.authenticate_machine(&auth::sha256_hex(&key)),
        Err(StoreError::NotFound)
    ));
    assert!(matches!(
        db.consume_password_reset(&token_hash, &now_rfc3339()),
        Err(StoreError::NotFound)
    ));
}

/// Deleting a machine removes its keys and history but not its owner.
#[test]
fn test_machine_delete_cascades() {
    let db = test_db();
    let user = db.create_user("op@example.com", "irrelevant-hash").unwrap();
    let (key, key_hash) = auth::generate_api_key();
    let machine = db
        .register_machine(user.id, "web-1", "web-1.local", "", &key_hash)
        .unwrap();
    db.record_sample(&MetricsSample {
        machine_id: machine.id,
        timestamp: now_rfc3339(),
        cpu_pct: 10.0,
        mem_used_pct: 10.0,
        disk_used_pct: 10.0,
        net_rx_bytes: 0,
        net_tx_bytes: 0,
        uptime_seconds: None,
    })
    .unwrap();

    db.delete_machine(machine.id).unwrap();

    assert!(db.latest_sample(machine.id).unwrap().is_none());
    assert!(matches!(
        db.authenticate_machine(&auth::sha256_hex(&key)),
        Err(StoreError::NotFound)
    ));
    assert!(db.get_user(user.id).is_ok());
}

/// Rotation keeps at most one live key and the transaction is atomic.
#[test]
fn test_rotate_key_revokes_previous() {
    let db = test_db();
    let user = db.create_user("op@example.com", "irrelevant-hash").unwrap();
    let (old_key, old_hash) = auth::generate_api_key();
    let machine = db
        .register_machine(user.id, "web-1", "web-1.local", "", &old_hash)
        .unwrap();

    let (new_key, new_hash) = auth::generate_api_key();
    db.rotate_key(machine.id, &new_hash).unwrap();

    assert!(matches!(
        db.authenticate_machine(&auth::sha256_hex(&old_key)),
        Err(StoreError::NotFound)
    ));
    let (authed, _was_offline) = db.authenticate_machine(&auth::sha256_hex(&new_key)).unwrap();
    assert_eq!(authed.id, machine.id);
}
