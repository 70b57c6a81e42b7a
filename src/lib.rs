//! Rule evaluation engine and coordination layer for search-store-backed
//! alerting.
//!
//! A single periodic driver (`engine::Engine::run_scheduler`) evaluates
//! declarative rules against a remote search store, serializes concurrent
//! replicas through a lease held in the State Store, suppresses repeat
//! sends with an atomic dedup primitive, renders a message per rule, and
//! fans the result out to a fixed set of notifier adapters before writing
//! a durable history row.
//!
//! ```text
//! rules.yaml ─► Engine ─┬─► SearchClient ──► remote search store
//!                        ├─► StateStore ────► sqlite/postgres
//!                        └─► notifiers::* ──► email/slack/teams/discord
//! ```

pub mod admin;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod models;
pub mod notifiers;
pub mod renderer;
pub mod rules;
pub mod search_client;
pub mod state_store;

pub use error::{EngineError, Result};
