//! Core data model (§3): Rule, Alert, RuleLease, DedupeKey, AlertHistoryRow,
//! and the in-memory AlertStatus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    Frequency,
    Any,
    Spike,
    Flatline,
    Change,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RuleType::Frequency => "frequency",
            RuleType::Any => "any",
            RuleType::Spike => "spike",
            RuleType::Flatline => "flatline",
            RuleType::Change => "change",
            RuleType::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

impl FromStr for RuleType {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "frequency" => RuleType::Frequency,
            "any" => RuleType::Any,
            "spike" => RuleType::Spike,
            "flatline" => RuleType::Flatline,
            "change" => RuleType::Change,
            _ => RuleType::Unknown,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Level {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Level::Critical => "Critical",
            Level::High => "High",
            Level::Medium => "Medium",
            Level::Low => "Low",
            Level::Info => "Info",
        };
        f.write_str(s)
    }
}

impl FromStr for Level {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Critical" => Level::Critical,
            "High" => Level::High,
            "Medium" => Level::Medium,
            "Low" => Level::Low,
            _ => Level::Info,
        })
    }
}

/// A declarative alerting rule (§3). Loaded at startup, mutated only by the
/// (out-of-scope) external loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    pub index_pattern: String,
    #[serde(default)]
    pub query_fragment: serde_json::Value,
    #[serde(default)]
    pub threshold: i64,
    pub timeframe_seconds: i64,
    #[serde(default)]
    pub level: Option<Level>,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub custom_text: Option<String>,
    #[serde(default)]
    pub custom_args: Vec<String>,
    #[serde(default)]
    pub query_key: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl Rule {
    /// All channels enabled when the rule's channel list is empty (§3).
    pub fn is_channel_enabled(&self, name: &str) -> bool {
        self.channels.is_empty() || self.channels.iter().any(|c| c.eq_ignore_ascii_case(name))
    }
}

/// An emitted alert (§3), immutable once persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub rule_name: String,
    pub level: Level,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub count: i64,
    pub matches: Vec<serde_json::Value>,
    pub data: serde_json::Value,
}

impl Alert {
    /// Derive the alert id from the rule name and the trigger epoch (§3).
    pub fn derive_id(rule_name: &str, trigger_epoch: i64) -> String {
        format!("{rule_name}-{trigger_epoch}")
    }
}

/// A cross-replica lease row (§3/§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleLease {
    pub rule_name: String,
    pub holder: Option<String>,
    pub acquired_at: Option<DateTime<Utc>>,
    pub ttl_seconds: i64,
}

/// A send-time dedup key (§3/§4.2).
#[derive(Debug, Clone)]
pub struct DedupeKey {
    pub rule_name: String,
    pub level: Level,
    pub message_hash: String,
}

impl DedupeKey {
    pub fn new(rule_name: &str, level: Level, message: &str) -> Self {
        use sha1::{Digest, Sha1};
        let mut hasher = Sha1::new();
        hasher.update(message.as_bytes());
        let digest = hasher.finalize();
        Self {
            rule_name: rule_name.to_string(),
            level,
            message_hash: hex::encode(digest),
        }
    }

    pub fn key(&self) -> String {
        format!("{}|{}|{}", self.rule_name, self.level, self.message_hash)
    }
}

/// A durable audit row (§3), written only for alerts that passed dedup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertHistoryRow {
    pub id: i64,
    pub alert_id: String,
    pub rule_name: String,
    pub level: Level,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub count: i64,
    pub matches: serde_json::Value,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Per-replica, in-memory suppression state (§3), never persisted.
#[derive(Debug, Clone, Default)]
pub struct AlertStatus {
    pub last_alert: Option<DateTime<Utc>>,
    pub alert_count: u64,
    pub suppressed: bool,
    pub suppress_until: Option<DateTime<Utc>>,
}
