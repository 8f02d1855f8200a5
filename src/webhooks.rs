use crate::config::Config;
use crate::delivery::{check_preconditions, cooldown_after_failure, DispatchError};
use crate::models::{AlertEvent, AlertRule, Machine};
use crate::store::{self, ChannelKind, Db};
use chrono::{SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const WEBHOOK_USER_AGENT: &str = "LunaSentri-Webhook/1.0";

/// Signature header value for a payload: `sha256=<hex>` where the MAC key is
/// the hex-decoded stored secret hash.
pub fn signature_for(secret_hash_hex: &str, body: &[u8]) -> String {
    let key = hex::decode(secret_hash_hex).unwrap_or_else(|_| secret_hash_hex.as_bytes().to_vec());
    let mut mac =
        HmacSha256::new_from_slice(&key).expect("HMAC-SHA256 accepts keys of any length");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Scheme and host of a URL, for log lines. Never the path, query, or
/// credentials.
pub fn display_host(url: &str) -> String {
    let rest = url.split("://").nth(1).unwrap_or(url);
    let scheme = url.split("://").next().unwrap_or("https");
    let host = rest.split('/').next().unwrap_or(rest);
    let host = host.rsplit('@').next().unwrap_or(host);
    format!("{scheme}://{host}")
}

// --- Payload shapes ---

pub fn alert_payload(rule: &AlertRule, event: &AlertEvent) -> serde_json::Value {
    serde_json::json!({
        "rule": {
            "id": rule.id,
            "name": rule.name,
            "metric": rule.metric,
            "comparison": rule.comparison,
            "threshold_pct": rule.threshold_pct,
            "trigger_after": rule.trigger_after,
        },
        "event": {
            "id": event.id,
            "value": event.value,
            "triggered_at": event.triggered_at,
        },
        "timestamp": store::now_rfc3339(),
    })
}

pub fn transition_payload(machine: &Machine, online: bool) -> serde_json::Value {
    serde_json::json!({
        "event": if online { "machine.online" } else { "machine.offline" },
        "machine": {
            "id": machine.id,
            "name": machine.name,
            "hostname": machine.hostname,
            "description": machine.description,
            "status": machine.status,
            "last_seen": machine.last_seen,
        },
    })
}

/// Synthetic payload for the test endpoint; goes through the real dispatcher.
pub fn test_payload() -> serde_json::Value {
    serde_json::json!({
        "event": "test",
        "message": "LunaSentri webhook test",
        "timestamp": store::now_rfc3339(),
    })
}

/// Deliver one payload to one webhook under full dispatch discipline:
/// cooldown and min-interval preconditions, `last_attempt_at` stamped before
/// the wire, up to 3 attempts with 1 s / 2 s backoff, delivery state
/// recorded on the terminal outcome.
pub async fn deliver_webhook(
    db: &Db,
    client: &reqwest::Client,
    config: &Config,
    webhook_id: i64,
    url: &str,
    secret_hash: &str,
    payload: &serde_json::Value,
) -> Result<(), DispatchError> {
    let state = db
        .delivery_state(ChannelKind::Webhook, webhook_id)
        .map_err(|e| DispatchError::Transport(e.to_string()))?;
    check_preconditions(&state, config.webhook_min_interval_secs, Utc::now())?;

    db.record_dispatch_attempt(ChannelKind::Webhook, webhook_id, &store::now_rfc3339())
        .map_err(|e| DispatchError::Transport(e.to_string()))?;

    let body = serde_json::to_string(payload)
        .map_err(|e| DispatchError::Transport(e.to_string()))?;
    let signature = signature_for(secret_hash, body.as_bytes());

    let mut last_error = String::new();
    for attempt in 0..3u64 {
        if attempt > 0 {
            tokio::time::sleep(std::time::Duration::from_secs(attempt)).await;
        }
        let result = client
            .post(url)
            .header("Content-Type", "application/json")
            .header("X-LunaSentri-Signature", &signature)
            .header("User-Agent", WEBHOOK_USER_AGENT)
            .body(body.clone())
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => {
                db.record_dispatch_success(ChannelKind::Webhook, webhook_id, &store::now_rfc3339())
                    .ok();
                return Ok(());
            }
            Ok(resp) => last_error = format!("HTTP {}", resp.status()),
            // without_url keeps the endpoint out of error text
            Err(e) => last_error = e.without_url().to_string(),
        }
    }

    let now = Utc::now();
    let cooldown = cooldown_after_failure(
        &state,
        config.failure_threshold,
        config.failure_window_secs,
        config.cooldown_secs,
        now,
    )
    .map(|t| t.to_rfc3339_opts(SecondsFormat::Micros, true));
    db.record_dispatch_failure(
        ChannelKind::Webhook,
        webhook_id,
        &now.to_rfc3339_opts(SecondsFormat::Micros, true),
        cooldown.as_deref(),
    )
    .ok();

    Err(DispatchError::Transport(last_error))
}
