use std::collections::HashMap;
use std::env;
use std::sync::Mutex;
use std::time::Instant;

/// Brute-force limits for the auth surface, per client IP. All read from
/// environment variables with sensible defaults.
///
/// Environment variables:
/// - `RATE_LIMIT_LOGIN` — Max login attempts per minute per IP (default: 10)
/// - `RATE_LIMIT_REGISTER` — Max registrations per hour per IP (default: 5)
/// - `RATE_LIMIT_RESET` — Max password-reset requests per hour per IP (default: 5)
pub struct AuthRateLimits {
    pub login_max: usize,
    pub login_window_secs: u64,
    pub register_max: usize,
    pub register_window_secs: u64,
    pub reset_max: usize,
    pub reset_window_secs: u64,
}

impl Default for AuthRateLimits {
    fn default() -> Self {
        Self {
            login_max: 10,
            login_window_secs: 60,
            register_max: 5,
            register_window_secs: 3600,
            reset_max: 5,
            reset_window_secs: 3600,
        }
    }
}

impl AuthRateLimits {
    pub fn from_env() -> Self {
        let mut limits = Self::default();

        if let Ok(val) = env::var("RATE_LIMIT_LOGIN")
            && let Ok(n) = val.parse::<usize>()
        {
            limits.login_max = n;
        }
        if let Ok(val) = env::var("RATE_LIMIT_REGISTER")
            && let Ok(n) = val.parse::<usize>()
        {
            limits.register_max = n;
        }
        if let Ok(val) = env::var("RATE_LIMIT_RESET")
            && let Ok(n) = val.parse::<usize>()
        {
            limits.reset_max = n;
        }

        limits
    }
}

/// Sliding-window request counter keyed by "action:ip".
pub struct RateLimiter {
    limits: Mutex<HashMap<String, Vec<Instant>>>,
}

/// Outcome of a rate-limit check, with the retry hint for 429 bodies.
#[derive(Debug, Clone)]
pub struct RateLimitInfo {
    pub allowed: bool,
    pub limit: usize,
    pub remaining: usize,
    /// Seconds until the oldest request in the window expires (a slot opens).
    /// 0 if there's remaining capacity.
    pub retry_after_secs: u64,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        RateLimiter {
            limits: Mutex::new(HashMap::new()),
        }
    }

    pub fn check(&self, key: &str, max: usize, window_secs: u64) -> bool {
        self.check_with_info(key, max, window_secs).allowed
    }

    pub fn check_with_info(&self, key: &str, max: usize, window_secs: u64) -> RateLimitInfo {
        let mut limits = self.limits.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let window = std::time::Duration::from_secs(window_secs);

        let entries = limits.entry(key.to_string()).or_default();

        // Remove expired entries
        entries.retain(|t| now.duration_since(*t) < window);

        if entries.len() >= max {
            let oldest = match entries.iter().min() {
                Some(t) => t,
                None => {
                    return RateLimitInfo {
                        allowed: false,
                        limit: max,
                        remaining: 0,
                        retry_after_secs: 1,
                    }
                }
            };
            let elapsed = now.duration_since(*oldest);
            let retry_after = if elapsed < window {
                (window - elapsed).as_secs() + 1 // +1 to ensure the slot is actually open
            } else {
                1
            };

            return RateLimitInfo {
                allowed: false,
                limit: max,
                remaining: 0,
                retry_after_secs: retry_after,
            };
        }

        entries.push(now);
        let remaining = max - entries.len();

        RateLimitInfo {
            allowed: true,
            limit: max,
            remaining,
            retry_after_secs: 0,
        }
    }
}
