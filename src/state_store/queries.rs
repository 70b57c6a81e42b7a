//! SQL text for the two dialects. Every statement here binds positionally;
//! `pg_placeholders` rewrites the shared `?`-style text into Postgres's
//! `$n` style so only one copy of each statement has to be maintained.

pub fn pg_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut n = 0;
    for ch in sql.chars() {
        if ch == '?' {
            n += 1;
            out.push('$');
            out.push_str(&n.to_string());
        } else {
            out.push(ch);
        }
    }
    out
}

pub const SQLITE_UPSERT_LEASE: &str =
    "INSERT OR IGNORE INTO rule_leases (rule_name, ttl_seconds) VALUES (?, ?)";

pub const POSTGRES_UPSERT_LEASE: &str =
    "INSERT INTO rule_leases (rule_name, ttl_seconds) VALUES ($1, $2) ON CONFLICT (rule_name) DO NOTHING";

/// The sole mutual-exclusion primitive between replicas per rule (§4.2).
/// An expired lease (`acquired_at + ttl_seconds <= now`) is reclaimable;
/// re-entrance by the current holder is allowed.
pub const ACQUIRE_LEASE: &str = "
UPDATE rule_leases
   SET holder = ?, acquired_at = ?
 WHERE rule_name = ?
   AND (acquired_at IS NULL
        OR acquired_at + ttl_seconds <= ?
        OR holder = ?)";

pub const RELEASE_LEASE: &str = "
UPDATE rule_leases
   SET holder = NULL, acquired_at = ?
 WHERE rule_name = ? AND holder = ?";

pub const SQLITE_UPSERT_DEDUPE: &str =
    "INSERT OR IGNORE INTO dedupe_keys (dedupe_key, rule_name, level, last_sent_at, ttl_seconds) VALUES (?, ?, ?, ?, ?)";

pub const POSTGRES_UPSERT_DEDUPE: &str =
    "INSERT INTO dedupe_keys (dedupe_key, rule_name, level, last_sent_at, ttl_seconds) VALUES ($1, $2, $3, $4, $5) ON CONFLICT (dedupe_key) DO NOTHING";

/// Conditional update used as the acquisition signal for send-time dedup
/// (§4.2, Open Question 4): only one concurrent caller can move
/// `last_sent_at` forward within the TTL window.
pub const TOUCH_DEDUPE: &str = "
UPDATE dedupe_keys
   SET last_sent_at = ?
 WHERE dedupe_key = ? AND last_sent_at <= ?";

pub const INSERT_HISTORY: &str = "
INSERT INTO alert_history
    (alert_id, rule_name, level, message, timestamp, count, matches, data, created_at)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)";

pub const LIST_HISTORY_SQLITE: &str = "
SELECT id, alert_id, rule_name, level, message, timestamp, count, matches, data, created_at
  FROM alert_history
 WHERE (? IS NULL OR rule_name = ?)
   AND (? IS NULL OR level = ?)
   AND (? IS NULL OR timestamp >= ?)
   AND (? IS NULL OR timestamp <= ?)
 ORDER BY timestamp DESC
 LIMIT ? OFFSET ?";

pub const LEVEL_HISTOGRAM: &str =
    "SELECT level, COUNT(*) as cnt FROM alert_history GROUP BY level";

pub const GET_BY_ALERT_ID: &str = "
SELECT id, alert_id, rule_name, level, message, timestamp, count, matches, data, created_at
  FROM alert_history
 WHERE alert_id = ?
 ORDER BY timestamp DESC
 LIMIT 1";

pub const HOURLY_TIMESTAMPS: &str = "SELECT timestamp FROM alert_history";
