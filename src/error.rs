//! Crate-wide error type.
//!
//! Internal errors never escape the scheduler driver (§7 of the design doc):
//! every per-rule evaluation step converts its error into a log line and a
//! quiet `return`, so this enum exists for *within* an evaluation, not across
//! ticks.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("configuration invalid: {0}")]
    ConfigInvalid(String),

    #[error("search store unavailable: {0}")]
    SearchUnavailable(String),

    #[error("search store transport error: {0}")]
    SearchTransport(#[from] reqwest::Error),

    #[error("search store returned {status}: {body}")]
    SearchBadResponse { status: u16, body: String },

    #[error("state store error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("state store transient error: {0}")]
    StateStoreTransient(String),

    #[error("notifier failure: {0}")]
    NotifierFailure(String),

    #[error("history write failed: {0}")]
    HistoryWriteFailure(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("rule validation error: {0}")]
    RuleInvalid(String),
}

impl EngineError {
    pub fn database(msg: impl Into<String>) -> Self {
        EngineError::StateStoreTransient(msg.into())
    }
}
