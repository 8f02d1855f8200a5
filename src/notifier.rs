use crate::config::Config;
use crate::delivery::DispatchError;
use crate::events::ServerEvent;
use crate::store::Db;
use crate::{telegram, webhooks};
use rocket::Shutdown;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Spawns the fan-out task: subscribes to the event bus and dispatches every
/// fired alert and machine transition to the owner's channels. Runs with its
/// own DB connection and HTTP client; exits on shutdown or bus close.
pub fn spawn_dispatcher(
    mut receiver: broadcast::Receiver<ServerEvent>,
    db_path: String,
    config: Config,
    mut shutdown: Shutdown,
) {
    tokio::spawn(async move {
        let client = match reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.http_timeout_secs))
            .build()
        {
            Ok(c) => c,
            Err(e) => {
                eprintln!("⚠️ Notifier: failed to create HTTP client: {e}");
                return;
            }
        };
        let db = match Db::open(&db_path) {
            Ok(d) => Arc::new(d),
            Err(e) => {
                eprintln!("⚠️ Notifier: failed to open DB: {e}");
                return;
            }
        };

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                event = receiver.recv() => match event {
                    Ok(ServerEvent::AlertFired { rule, event, machine_id }) => {
                        let owner = match db.get_machine(machine_id) {
                            Ok(m) => m.user_id,
                            Err(e) => {
                                eprintln!("⚠️ Notifier: machine {machine_id} lookup failed: {e}");
                                continue;
                            }
                        };
                        let payload = webhooks::alert_payload(&rule, &event);
                        let text = telegram::alert_message(&rule, &event);
                        fan_out(&db, &client, &config, owner, payload, text);
                    }
                    Ok(ServerEvent::MachineOffline(machine)) => {
                        let payload = webhooks::transition_payload(&machine, false);
                        let text = telegram::transition_message(&machine, false);
                        fan_out(&db, &client, &config, machine.user_id, payload, text);
                    }
                    Ok(ServerEvent::MachineOnline(machine)) => {
                        let payload = webhooks::transition_payload(&machine, true);
                        let text = telegram::transition_message(&machine, true);
                        fan_out(&db, &client, &config, machine.user_id, payload, text);
                    }
                    Ok(ServerEvent::SampleIngested { .. }) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        eprintln!("⚠️ Notifier lagged, missed {n} events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    });
}

/// Dispatch one notification to every active channel of a user. Each channel
/// runs as a detached task with its own timeout budget; a failing channel
/// never blocks or cancels another, and a client hang-up upstream never
/// reaches these tasks.
fn fan_out(
    db: &Arc<Db>,
    client: &reqwest::Client,
    config: &Config,
    user_id: i64,
    payload: serde_json::Value,
    text: String,
) {
    let budget = std::time::Duration::from_secs(config.dispatch_timeout_secs);

    let hooks = match db.active_webhooks_for_user(user_id) {
        Ok(hooks) => hooks,
        Err(e) => {
            eprintln!("⚠️ Notifier: webhook lookup for user {user_id} failed: {e}");
            Vec::new()
        }
    };
    for (hook, secret_hash) in hooks {
        let db = db.clone();
        let client = client.clone();
        let config = config.clone();
        let payload = payload.clone();
        tokio::spawn(async move {
            let result = tokio::time::timeout(
                budget,
                webhooks::deliver_webhook(
                    &db,
                    &client,
                    &config,
                    hook.id,
                    &hook.url,
                    &secret_hash,
                    &payload,
                ),
            )
            .await;
            match result {
                Ok(Ok(())) => {}
                // endpoint is pacing us; nothing to do until it reopens
                Ok(Err(DispatchError::RateLimited { .. })) => {}
                Ok(Err(e)) => eprintln!(
                    "⚠️ Webhook {} ({}) delivery failed: {e}",
                    hook.id,
                    webhooks::display_host(&hook.url)
                ),
                Err(_) => eprintln!("⚠️ Webhook {} delivery timed out", hook.id),
            }
        });
    }

    // Telegram fan-out is a silent no-op without a bot token.
    let Some(token) = config.telegram_bot_token.clone() else {
        return;
    };
    let recipients = match db.active_telegram_for_user(user_id) {
        Ok(recipients) => recipients,
        Err(e) => {
            eprintln!("⚠️ Notifier: telegram lookup for user {user_id} failed: {e}");
            Vec::new()
        }
    };
    for recipient in recipients {
        let db = db.clone();
        let client = client.clone();
        let config = config.clone();
        let token = token.clone();
        let text = text.clone();
        tokio::spawn(async move {
            let result = tokio::time::timeout(
                budget,
                telegram::deliver_telegram(
                    &db,
                    &client,
                    &config,
                    Some(&token),
                    recipient.id,
                    &recipient.chat_id,
                    &text,
                ),
            )
            .await;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(DispatchError::RateLimited { .. })) => {}
                Ok(Err(e)) => eprintln!(
                    "⚠️ Telegram recipient {} delivery failed: {e}",
                    recipient.id
                ),
                Err(_) => eprintln!("⚠️ Telegram recipient {} delivery timed out", recipient.id),
            }
        });
    }
}
