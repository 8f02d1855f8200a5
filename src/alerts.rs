use crate::models::{AlertEvent, AlertRule, MetricsSample};
use crate::store::{Db, StoreError};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Per-rule runtime state: the current consecutive-breach streak.
#[derive(Debug, Clone)]
pub struct RuleStreak {
    pub consecutive_breaches: i64,
    pub last_value: f64,
    pub last_evaluated: String,
}

struct EngineInner {
    rules: Vec<AlertRule>,
    refreshed_at: Option<Instant>,
    streaks: HashMap<i64, RuleStreak>,
}

/// The alert evaluation engine. Rules are cached with a short TTL and
/// invalidated immediately on any rule mutation; breach streaks live in
/// memory under the same mutex.
///
/// Streak state is keyed by rule id only: every ingested sample advances the
/// same counter regardless of which machine sent it. One global stream of
/// samples per rule.
pub struct AlertEngine {
    inner: Mutex<EngineInner>,
    ttl: Duration,
}

impl AlertEngine {
    pub fn new(ttl: Duration) -> Self {
        AlertEngine {
            inner: Mutex::new(EngineInner {
                rules: Vec::new(),
                refreshed_at: None,
                streaks: HashMap::new(),
            }),
            ttl,
        }
    }

    /// Force a rule reload on the next evaluation. Passing a rule id also
    /// wipes that rule's streak (editing or deleting a rule resets its
    /// runtime state).
    pub fn invalidate(&self, rule_id: Option<i64>) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.refreshed_at = None;
        if let Some(id) = rule_id {
            inner.streaks.remove(&id);
        }
    }

    /// Current streak length for a rule, if any. Introspection only.
    pub fn streak_len(&self, rule_id: i64) -> Option<i64> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.streaks.get(&rule_id).map(|s| s.consecutive_breaches)
    }

    /// Evaluate one sample against every active rule, synchronously on the
    /// ingest path. Fired events are written to the store before this
    /// returns, so a rule that fires is immediately visible to the ack API.
    ///
    /// A rule fires exactly once per breach streak: when the counter first
    /// reaches `trigger_after`. Equality with the threshold is never a
    /// breach. The first non-breach clears the streak.
    pub fn evaluate(
        &self,
        db: &Db,
        sample: &MetricsSample,
    ) -> Result<Vec<(AlertRule, AlertEvent)>, StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        let stale = inner
            .refreshed_at
            .map(|t| t.elapsed() >= self.ttl)
            .unwrap_or(true);
        if stale {
            inner.rules = db.list_rules()?;
            inner.refreshed_at = Some(Instant::now());
            let live: std::collections::HashSet<i64> = inner.rules.iter().map(|r| r.id).collect();
            inner.streaks.retain(|id, _| live.contains(id));
        }

        let EngineInner { rules, streaks, .. } = &mut *inner;
        let mut fired = Vec::new();

        for rule in rules.iter() {
            let value = match rule.metric.as_str() {
                "cpu_pct" => sample.cpu_pct,
                "mem_used_pct" => sample.mem_used_pct,
                "disk_used_pct" => sample.disk_used_pct,
                _ => continue,
            };
            let breached = match rule.comparison.as_str() {
                "above" => value > rule.threshold_pct,
                "below" => value < rule.threshold_pct,
                _ => false,
            };

            let streak = streaks.entry(rule.id).or_insert_with(|| RuleStreak {
                consecutive_breaches: 0,
                last_value: 0.0,
                last_evaluated: String::new(),
            });
            streak.last_value = value;
            streak.last_evaluated = sample.timestamp.clone();

            if breached {
                streak.consecutive_breaches += 1;
                if streak.consecutive_breaches == rule.trigger_after {
                    let event = db.insert_event(rule.id, value, &sample.timestamp)?;
                    fired.push((rule.clone(), event));
                }
                // counter keeps growing; no re-fire until a non-breach resets it
            } else {
                streak.consecutive_breaches = 0;
            }
        }

        Ok(fired)
    }
}
