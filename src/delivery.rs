use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

/// Snapshot of a channel's delivery-state columns, shared by the webhook and
/// Telegram dispatchers.
#[derive(Debug, Clone, Default)]
pub struct DeliveryState {
    pub failure_count: i64,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub cooldown_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitKind {
    /// The circuit breaker is open; attempts are refused until
    /// `cooldown_until`.
    Cooldown,
    /// Minimum spacing between attempts has not elapsed yet.
    MinInterval,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{reason}")]
    RateLimited {
        kind: RateLimitKind,
        reason: String,
        retry_at: DateTime<Utc>,
    },
    #[error("{0}")]
    Transport(String),
    #[error("channel is not configured")]
    ChannelDisabled,
}

/// Per-call dispatch preconditions: cooldown first, then minimum spacing.
/// The returned error carries the earliest time a retry can succeed.
pub fn check_preconditions(
    state: &DeliveryState,
    min_interval_secs: i64,
    now: DateTime<Utc>,
) -> Result<(), DispatchError> {
    if let Some(cooldown_until) = state.cooldown_until
        && cooldown_until > now
    {
        return Err(DispatchError::RateLimited {
            kind: RateLimitKind::Cooldown,
            reason: format!(
                "channel is in cooldown until {}",
                cooldown_until.to_rfc3339()
            ),
            retry_at: cooldown_until,
        });
    }

    if let Some(last_attempt) = state.last_attempt_at {
        let next_allowed = last_attempt + Duration::seconds(min_interval_secs);
        if now < next_allowed {
            return Err(DispatchError::RateLimited {
                kind: RateLimitKind::MinInterval,
                reason: format!("rate limited: retry after {}", next_allowed.to_rfc3339()),
                retry_at: next_allowed,
            });
        }
    }

    Ok(())
}

/// Circuit-breaker decision for a terminal failure happening at `now`, given
/// the state as it stood *before* this failure is recorded. Returns the
/// cooldown expiry to arm, if any.
///
/// The window check is the documented approximation over
/// `failure_count + last_error_at`: the streak must still be warm (previous
/// error within the window) when the counter crosses the threshold.
pub fn cooldown_after_failure(
    state_before: &DeliveryState,
    failure_threshold: i64,
    failure_window_secs: i64,
    cooldown_secs: i64,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let new_count = state_before.failure_count + 1;
    if new_count < failure_threshold {
        return None;
    }
    let streak_is_warm = state_before
        .last_error_at
        .map(|t| now - t <= Duration::seconds(failure_window_secs))
        .unwrap_or(true);
    if streak_is_warm {
        Some(now + Duration::seconds(cooldown_secs))
    } else {
        None
    }
}
