use std::env;

/// Runtime configuration. All values read from environment variables with
/// sensible defaults; durations are plain integer seconds.
///
/// Environment variables:
/// - `AUTH_JWT_SECRET` — Session signing key. Required in production; a random
///   fallback is generated (with a loud warning) when absent.
/// - `ACCESS_TOKEN_TTL` — Session lifetime in seconds (default: 900)
/// - `PASSWORD_RESET_TTL` — Reset-token lifetime in seconds (default: 3600)
/// - `SECURE_COOKIE` — Secure flag on the session cookie (default: true)
/// - `CORS_ALLOWED_ORIGIN` — Origin allow-list for REST and the live stream
///   (default: `http://localhost:3000`)
/// - `TELEGRAM_BOT_TOKEN` — Absence disables the Telegram channel entirely
/// - `ADMIN_EMAIL`, `ADMIN_PASSWORD` — Upsert an admin user at startup
/// - `HEARTBEAT_INTERVAL` — Sweep period in seconds (default: 30)
/// - `OFFLINE_THRESHOLD` — Silence before a machine flips offline (default: 120)
/// - `LOCAL_HOST_METRICS` — Sample the server's own host as a synthetic
///   machine, for development (default: false)
#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub access_token_ttl_secs: u64,
    pub password_reset_ttl_secs: u64,
    pub secure_cookie: bool,
    pub cors_allowed_origin: String,
    pub telegram_bot_token: Option<String>,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    pub heartbeat_interval_secs: u64,
    pub offline_threshold_secs: u64,
    pub local_host_metrics: bool,

    // Dispatcher discipline. Not env-tunable; tests override these directly.
    pub webhook_min_interval_secs: i64,
    pub failure_threshold: i64,
    pub failure_window_secs: i64,
    pub cooldown_secs: i64,
    pub dispatch_timeout_secs: u64,
    pub http_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            access_token_ttl_secs: 900,
            password_reset_ttl_secs: 3600,
            secure_cookie: true,
            cors_allowed_origin: "http://localhost:3000".to_string(),
            telegram_bot_token: None,
            admin_email: None,
            admin_password: None,
            heartbeat_interval_secs: 30,
            offline_threshold_secs: 120,
            local_host_metrics: false,
            webhook_min_interval_secs: 30,
            failure_threshold: 3,
            failure_window_secs: 600,
            cooldown_secs: 900,
            dispatch_timeout_secs: 10,
            http_timeout_secs: 5,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        match env::var("AUTH_JWT_SECRET") {
            Ok(secret) if !secret.trim().is_empty() => config.jwt_secret = secret,
            _ => {
                config.jwt_secret = crate::auth::generate_secret();
                eprintln!(
                    "⚠️  AUTH_JWT_SECRET not set — using a random key; sessions will not survive a restart"
                );
            }
        }

        if let Ok(val) = env::var("ACCESS_TOKEN_TTL")
            && let Ok(n) = val.parse::<u64>()
        {
            config.access_token_ttl_secs = n;
        }
        if let Ok(val) = env::var("PASSWORD_RESET_TTL")
            && let Ok(n) = val.parse::<u64>()
        {
            config.password_reset_ttl_secs = n;
        }
        if let Ok(val) = env::var("SECURE_COOKIE") {
            config.secure_cookie = val != "0" && val.to_lowercase() != "false";
        }
        if let Ok(val) = env::var("CORS_ALLOWED_ORIGIN")
            && !val.trim().is_empty()
        {
            config.cors_allowed_origin = val.trim().trim_end_matches('/').to_string();
        }
        if let Ok(val) = env::var("TELEGRAM_BOT_TOKEN")
            && !val.trim().is_empty()
        {
            config.telegram_bot_token = Some(val.trim().to_string());
        }
        if let Ok(val) = env::var("ADMIN_EMAIL")
            && !val.trim().is_empty()
        {
            config.admin_email = Some(val.trim().to_string());
        }
        if let Ok(val) = env::var("ADMIN_PASSWORD")
            && !val.is_empty()
        {
            config.admin_password = Some(val);
        }
        if let Ok(val) = env::var("HEARTBEAT_INTERVAL")
            && let Ok(n) = val.parse::<u64>()
            && n > 0
        {
            config.heartbeat_interval_secs = n;
        }
        if let Ok(val) = env::var("OFFLINE_THRESHOLD")
            && let Ok(n) = val.parse::<u64>()
            && n > 0
        {
            config.offline_threshold_secs = n;
        }
        if let Ok(val) = env::var("LOCAL_HOST_METRICS") {
            config.local_host_metrics = val == "1" || val.to_lowercase() == "true";
        }

        config
    }
}
