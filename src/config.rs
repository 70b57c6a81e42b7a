//! Engine configuration (§6). Layered TOML + environment, loaded with the
//! `config` crate the way the teacher's `PipelineConfig` is, but scoped to
//! the sections this engine actually recognizes.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EngineConfig {
    pub search_store: SearchStoreConfig,
    pub engine: EngineSettings,
    pub suppression: SuppressionConfig,
    pub notifiers: NotifiersConfig,
    pub state_store: StateStoreConfig,
    pub leases: LeaseDedupConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SearchStoreConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_true")]
    pub verify_certs: bool,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl SearchStoreConfig {
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }
}

fn default_protocol() -> String {
    "https".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EngineSettings {
    #[serde(default = "default_run_interval")]
    pub run_interval_seconds: u64,
    /// Reserved (§6); not used by the trigger query builder unless
    /// `wire_buffer_time` is set — see Open Question 2 in SPEC_FULL.md §9.
    #[serde(default)]
    pub buffer_time_seconds: i64,
    #[serde(default = "default_max_running_rules")]
    pub max_running_rules: usize,
    pub writeback_index: String,
    #[serde(default = "default_alert_time_limit")]
    pub alert_time_limit_seconds: u64,
}

fn default_run_interval() -> u64 {
    60
}

fn default_max_running_rules() -> usize {
    4
}

fn default_alert_time_limit() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SuppressionConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_realert_minutes")]
    pub realert_minutes: i64,
    #[serde(default)]
    pub exponential_realert: ExponentialRealertConfig,
}

fn default_realert_minutes() -> i64 {
    60
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExponentialRealertConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NotifiersConfig {
    #[serde(default)]
    pub email: EmailNotifierConfig,
    #[serde(default)]
    pub slack: WebhookNotifierConfig,
    #[serde(default)]
    pub teams: WebhookNotifierConfig,
    #[serde(default)]
    pub discord: WebhookNotifierConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EmailNotifierConfig {
    #[serde(default)]
    pub enabled: bool,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub from_address: Option<String>,
    #[serde(default)]
    pub to_addresses: Vec<String>,
    #[serde(default)]
    pub mention_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WebhookNotifierConfig {
    #[serde(default)]
    pub enabled: bool,
    pub webhook_url: Option<String>,
    pub signing_secret: Option<String>,
    #[serde(default)]
    pub mention_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum StateStoreConfig {
    EmbeddedFile { path: String },
    Networked { url: String, max_connections: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LeaseDedupConfig {
    #[serde(default = "default_lease_ttl")]
    pub lease_ttl_seconds: i64,
    #[serde(default = "default_dedupe_ttl")]
    pub dedupe_ttl_seconds: i64,
}

fn default_lease_ttl() -> i64 {
    30
}

fn default_dedupe_ttl() -> i64 {
    120
}

impl EngineConfig {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()
            .map_err(|e| EngineError::ConfigInvalid(e.to_string()))?;
        let cfg: EngineConfig = settings
            .try_deserialize()
            .map_err(|e| EngineError::ConfigInvalid(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.engine.run_interval_seconds == 0 {
            return Err(EngineError::ConfigInvalid(
                "engine.run_interval_seconds must be > 0".into(),
            ));
        }
        if self.engine.writeback_index.trim().is_empty() {
            return Err(EngineError::ConfigInvalid(
                "engine.writeback_index must be set".into(),
            ));
        }
        if self.leases.lease_ttl_seconds <= 0 || self.leases.dedupe_ttl_seconds <= 0 {
            return Err(EngineError::ConfigInvalid(
                "lease/dedupe TTLs must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Resolve this replica's instance identity (§6): `INSTANCE_ID` env var,
/// falling back to the OS hostname.
pub fn instance_id() -> String {
    std::env::var("INSTANCE_ID").unwrap_or_else(|_| {
        hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown-host".to_string())
    })
}
