//! Per-replica, in-memory suppression (§4.3.3). Advisory only — the
//! durable cross-replica guarantee lives in the State Store's dedup; this
//! exists to reduce load, not to provide correctness.

use crate::config::SuppressionConfig;
use crate::models::AlertStatus;
use chrono::{Duration, Utc};
use dashmap::DashMap;

/// Returns true and clears expired suppression as a side effect (the spec's
/// "cleared the first time the engine observes `now >= suppressUntil`").
pub fn is_suppressed(map: &DashMap<String, AlertStatus>, rule_name: &str) -> bool {
    let Some(mut status) = map.get_mut(rule_name) else {
        return false;
    };
    if !status.suppressed {
        return false;
    }
    match status.suppress_until {
        Some(until) if Utc::now() < until => true,
        _ => {
            status.suppressed = false;
            false
        }
    }
}

/// Record a successful emission and recompute the suppression window
/// (§4.3.3). `suppressUntil` only ever grows within one process lifetime
/// (P9): it is only reached from here once the prior window has already
/// expired, since `is_suppressed` blocks entry otherwise.
pub fn record_emission(map: &DashMap<String, AlertStatus>, config: &SuppressionConfig, rule_name: &str) {
    let mut status = map.entry(rule_name.to_string()).or_default();
    let now = Utc::now();
    status.alert_count += 1;
    status.last_alert = Some(now);

    if !config.enabled {
        return;
    }

    let window = if config.exponential_realert.enabled {
        Duration::hours(config.exponential_realert.hours * status.alert_count as i64)
    } else {
        Duration::minutes(config.realert_minutes)
    };
    let candidate = now + window;
    status.suppress_until = Some(match status.suppress_until {
        Some(existing) if existing > candidate => existing,
        _ => candidate,
    });
    status.suppressed = true;
}
