use crate::config::Config;
use crate::delivery::{check_preconditions, cooldown_after_failure, DispatchError};
use crate::models::{AlertEvent, AlertRule, Machine};
use crate::store::{self, ChannelKind, Db};
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;

/// Bot API response envelope (the subset we read).
#[derive(Debug, Deserialize)]
struct BotResponse {
    ok: bool,
    description: Option<String>,
}

// --- Message templates ---
// Plain text on purpose; no parse_mode means no formatter escaping pitfalls.

pub fn alert_message(rule: &AlertRule, event: &AlertEvent) -> String {
    format!(
        "LunaSentri alert: {}\n{} {} {:.1} (observed {:.1})\nTriggered at {}",
        rule.name, rule.metric, rule.comparison, rule.threshold_pct, event.value, event.triggered_at
    )
}

pub fn transition_message(machine: &Machine, online: bool) -> String {
    if online {
        format!(
            "LunaSentri: machine {} ({}) is back online",
            machine.name, machine.hostname
        )
    } else {
        let last_seen = machine.last_seen.as_deref().unwrap_or("never");
        format!(
            "LunaSentri: machine {} ({}) went offline\nLast seen {}",
            machine.name, machine.hostname, last_seen
        )
    }
}

pub fn test_message() -> String {
    format!("LunaSentri test message sent at {}", store::now_rfc3339())
}

async fn send_message(
    client: &reqwest::Client,
    bot_token: &str,
    chat_id: &str,
    text: &str,
) -> Result<(), String> {
    let url = format!("https://api.telegram.org/bot{bot_token}/sendMessage");
    let result = client
        .post(&url)
        .json(&serde_json::json!({"chat_id": chat_id, "text": text}))
        .send()
        .await;
    match result {
        Ok(resp) => {
            let status = resp.status();
            match resp.json::<BotResponse>().await {
                Ok(body) if body.ok => Ok(()),
                Ok(body) => Err(body
                    .description
                    .unwrap_or_else(|| format!("Telegram API error (HTTP {status})"))),
                Err(_) => Err(format!("Telegram API error (HTTP {status})")),
            }
        }
        // without_url: the request URL embeds the bot token
        Err(e) => Err(e.without_url().to_string()),
    }
}

/// Deliver one message to one recipient under the same dispatch discipline
/// as the webhook channel. A missing bot token disables the whole channel.
pub async fn deliver_telegram(
    db: &Db,
    client: &reqwest::Client,
    config: &Config,
    bot_token: Option<&str>,
    recipient_id: i64,
    chat_id: &str,
    text: &str,
) -> Result<(), DispatchError> {
    let Some(token) = bot_token else {
        return Err(DispatchError::ChannelDisabled);
    };

    let state = db
        .delivery_state(ChannelKind::Telegram, recipient_id)
        .map_err(|e| DispatchError::Transport(e.to_string()))?;
    check_preconditions(&state, config.webhook_min_interval_secs, Utc::now())?;

    db.record_dispatch_attempt(ChannelKind::Telegram, recipient_id, &store::now_rfc3339())
        .map_err(|e| DispatchError::Transport(e.to_string()))?;

    let mut last_error = String::new();
    for attempt in 0..3u64 {
        if attempt > 0 {
            tokio::time::sleep(std::time::Duration::from_secs(attempt)).await;
        }
        match send_message(client, token, chat_id, text).await {
            Ok(()) => {
                db.record_dispatch_success(
                    ChannelKind::Telegram,
                    recipient_id,
                    &store::now_rfc3339(),
                )
                .ok();
                return Ok(());
            }
            Err(e) => last_error = e,
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
        ChannelKind::Telegram,
        recipient_id,
        &now.to_rfc3339_opts(SecondsFormat::Micros, true),
        cooldown.as_deref(),
    )
    .ok();

    Err(DispatchError::Transport(last_error))
}
