pub mod alerts;
pub mod auth;
pub mod config;
pub mod delivery;
pub mod events;
pub mod heartbeat;
pub mod local_metrics;
pub mod models;
pub mod notifier;
pub mod rate_limit;
pub mod routes;
pub mod store;
pub mod telegram;
pub mod webhooks;

use alerts::AlertEngine;
use config::Config;
use events::EventBus;
use rate_limit::{AuthRateLimits, RateLimiter};
use rocket_cors::{AllowedOrigins, CorsOptions};
use std::env;
use std::sync::Arc;
use store::Db;

pub fn rocket() -> rocket::Rocket<rocket::Build> {
    let db_path = env::var("DB_PATH").unwrap_or_else(|_| "data/lunasentri.db".to_string());
    rocket_with_db(&db_path)
}

pub fn rocket_with_db(db_path: &str) -> rocket::Rocket<rocket::Build> {
    build_rocket(db_path, Config::from_env())
}

pub fn rocket_with_config(db_path: &str, config: Config) -> rocket::Rocket<rocket::Build> {
    build_rocket(db_path, config)
}

fn build_rocket(db_path: &str, config: Config) -> rocket::Rocket<rocket::Build> {
    // Ensure data directory exists
    if let Some(parent) = std::path::Path::new(db_path).parent() {
        std::fs::create_dir_all(parent).ok();
    }

    let db = Db::open(db_path).expect("Failed to open database");

    // Admin bootstrap runs before the first request is served.
    if let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) {
        match auth::hash_password(password) {
            Ok(hash) => match db.upsert_admin(email, &hash) {
                Ok(user) => println!("👤 Admin user ready: {}", user.email),
                Err(e) => eprintln!("⚠️ Admin bootstrap failed: {e}"),
            },
            Err(e) => eprintln!("⚠️ Admin bootstrap failed: {e}"),
        }
    }

    let events = EventBus::new();
    let engine = Arc::new(AlertEngine::new(std::time::Duration::from_secs(30)));

    // Subscribe the notifier BEFORE handing the EventBus to Rocket
    let notifier_receiver = events.sender.subscribe();
    let heartbeat_sender = events.sender.clone();
    let sampler_sender = events.sender.clone();

    let cors = CorsOptions {
        allowed_origins: AllowedOrigins::some_exact(&[config.cors_allowed_origin.as_str()]),
        allow_credentials: true,
        ..Default::default()
    }
    .to_cors()
    .expect("Failed to create CORS");

    let notifier_db_path = db_path.to_string();
    let notifier_config = config.clone();
    let heartbeat_db_path = db_path.to_string();
    let heartbeat_config = config.clone();
    let sampler_db_path = db_path.to_string();
    let sampler_config = config.clone();
    let sampler_engine = engine.clone();
    let local_host_metrics = config.local_host_metrics;

    rocket::build()
        .manage(db)
        .manage(events)
        .manage(engine)
        .manage(config)
        .manage(RateLimiter::new())
        .manage(AuthRateLimits::from_env())
        .attach(cors)
        .register(
            "/",
            rocket::catchers![
                routes::unauthorized,
                routes::forbidden,
                routes::not_found,
                routes::unprocessable,
                routes::too_many_requests,
            ],
        )
        .mount(
            "/",
            rocket::routes![
                routes::health,
                routes::register,
                routes::login,
                routes::logout,
                routes::me,
                routes::forgot_password,
                routes::reset_password,
                routes::admin_create_user,
                routes::admin_list_users,
                routes::admin_delete_user,
                routes::list_machines,
                routes::register_machine,
                routes::get_machine,
                routes::delete_machine,
                routes::rotate_key,
                routes::set_machine_enabled,
                routes::machine_history,
                routes::machine_stream,
                routes::ingest_metrics,
                routes::list_rules,
                routes::create_rule,
                routes::update_rule,
                routes::delete_rule,
                routes::list_events,
                routes::ack_event,
                routes::list_webhooks,
                routes::create_webhook,
                routes::update_webhook,
                routes::delete_webhook,
                routes::test_webhook,
                routes::list_telegram,
                routes::create_telegram,
                routes::update_telegram,
                routes::delete_telegram,
                routes::test_telegram,
            ],
        )
        .attach(rocket::fairing::AdHoc::on_liftoff(
            "Notification Dispatcher",
            move |rocket| {
                Box::pin(async move {
                    notifier::spawn_dispatcher(
                        notifier_receiver,
                        notifier_db_path,
                        notifier_config,
                        rocket.shutdown(),
                    );
                    println!("🔔 Notification dispatcher started");
                })
            },
        ))
        .attach(rocket::fairing::AdHoc::on_liftoff(
            "Heartbeat Monitor",
            move |rocket| {
                Box::pin(async move {
                    heartbeat::spawn_heartbeat_task(
                        heartbeat_db_path,
                        heartbeat_config,
                        heartbeat_sender,
                        rocket.shutdown(),
                    );
                    println!("💓 Heartbeat monitor started");
                })
            },
        ))
        .attach(rocket::fairing::AdHoc::on_liftoff(
            "Local Host Metrics",
            move |rocket| {
                Box::pin(async move {
                    if !local_host_metrics {
                        return;
                    }
                    local_metrics::spawn_local_sampler(
                        sampler_db_path,
                        sampler_config,
                        sampler_engine,
                        sampler_sender,
                        rocket.shutdown(),
                    );
                    println!("🖥️  Local host sampler started");
                })
            },
        ))
}
