//! Rule Engine (§4.3): the scheduler loop and the per-rule evaluation
//! protocol, grounded in the teacher's `v2::engine::run_scheduler` shape —
//! an outer `tokio::time::interval` tick, a `Semaphore` capping concurrent
//! per-rule tasks, one `tokio::spawn` per rule per tick.

mod level;
mod suppression;

pub use level::resolve_level;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::metrics;
use crate::models::{Alert, AlertStatus, DedupeKey, Rule, RuleType};
use crate::notifiers::{self, Notifier};
use crate::renderer::render;
use crate::search_client::{build_prior_window_query, build_trigger_query, evaluate_trigger, SearchClient};
use crate::state_store::StateStore;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::Semaphore;

pub struct Engine {
    config: EngineConfig,
    search: SearchClient,
    store: StateStore,
    notifiers: Vec<Box<dyn Notifier>>,
    rules: Vec<Rule>,
    suppression: DashMap<String, AlertStatus>,
    instance_id: String,
}

impl Engine {
    pub fn new(config: EngineConfig, search: SearchClient, store: StateStore, rules: Vec<Rule>) -> Arc<Self> {
        let instance_id = crate::config::instance_id();
        metrics::set_rules_loaded(&instance_id, rules.len() as i64);
        let notifiers = notifiers::build_registry(&config.notifiers);
        Arc::new(Self {
            config,
            search,
            store,
            notifiers,
            rules,
            suppression: DashMap::new(),
            instance_id,
        })
    }

    /// Drive the periodic scheduler (§4.3 "Scheduling") until `shutdown`
    /// is signalled. In-flight evaluations are allowed to drain: the tick
    /// loop simply stops launching new ones (§5, P10).
    pub async fn run_scheduler(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(StdDuration::from_secs(self.config.engine.run_interval_seconds));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.clone().run_tick().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("scheduler shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn run_tick(self: Arc<Self>) {
        let semaphore = Arc::new(Semaphore::new(self.config.engine.max_running_rules.max(1)));
        let deadline = StdDuration::from_secs(self.config.engine.alert_time_limit_seconds);
        let mut handles = Vec::with_capacity(self.rules.len());
        for rule in self.rules.iter().cloned() {
            if !rule.enabled {
                continue;
            }
            let engine = self.clone();
            let permit = semaphore.clone();
            handles.push(tokio::spawn(async move {
                let _permit = match permit.acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => return,
                };
                metrics::inc_rules_evaluated(&rule.name);
                if tokio::time::timeout(deadline, engine.evaluate_rule(&rule)).await.is_err() {
                    tracing::warn!(rule = %rule.name, "evaluation exceeded deadline");
                }
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// The 12-step per-rule evaluation protocol (§4.3). Every internal error
    /// is logged and absorbed here; nothing propagates to the scheduler.
    async fn evaluate_rule(&self, rule: &Rule) {
        let holder = self.instance_id.as_str();
        let lease_ttl = self.config.leases.lease_ttl_seconds;

        // 1. Acquire lease.
        match self.store.try_acquire_lease(&rule.name, holder, lease_ttl).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(rule = %rule.name, "lease not acquired");
                metrics::inc_lease_denied(&rule.name);
                return;
            }
            Err(err) => {
                tracing::error!(rule = %rule.name, error = %err, "lease acquisition failed");
                return;
            }
        }

        // 2. Suppression check.
        if suppression::is_suppressed(&self.suppression, &rule.name) {
            tracing::debug!(rule = %rule.name, "suppressed, skipping tick");
            self.release(rule, holder, lease_ttl).await;
            return;
        }

        // 3. Build trigger query and search.
        let now = Utc::now();
        let query = build_trigger_query(rule, now, self.config.engine.buffer_time_seconds);
        let response = match self.search.search(&rule.index_pattern, &query).await {
            Ok(r) => r,
            Err(err) => {
                tracing::error!(rule = %rule.name, error = %err, "search failed");
                self.release(rule, holder, lease_ttl).await;
                return;
            }
        };
        let n = response.hits.total.value;

        let prior_n = if rule.rule_type == RuleType::Spike {
            let prior_query = build_prior_window_query(rule, now, self.config.engine.buffer_time_seconds);
            match self.search.count(&rule.index_pattern, &prior_query).await {
                Ok(c) => Some(c),
                Err(err) => {
                    tracing::warn!(rule = %rule.name, error = %err, "prior-window count failed, treating as no prior data");
                    None
                }
            }
        } else {
            None
        };

        // 4. Evaluate trigger.
        if !evaluate_trigger(rule, n, prior_n) {
            self.release(rule, holder, lease_ttl).await;
            return;
        }

        // 5. Determine level.
        let level = resolve_level(rule);

        // 6. Render message.
        let message = render(rule, &response);

        // 7. Send-time dedup.
        let dedupe_key = DedupeKey::new(&rule.name, level, &message);
        match self
            .store
            .check_and_touch(&dedupe_key, self.config.leases.dedupe_ttl_seconds)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(rule = %rule.name, "deduped, skipping send");
                metrics::inc_alerts_deduped(&rule.name);
                self.release(rule, holder, lease_ttl).await;
                return;
            }
            Err(err) => {
                tracing::error!(rule = %rule.name, error = %err, "dedup check failed, skipping send to preserve at-most-once");
                self.release(rule, holder, lease_ttl).await;
                return;
            }
        }

        // 8. Build Alert, fan out.
        let matches: Vec<Value> = response.hits.hits.iter().map(|h| h.source.clone()).collect();
        let alert = Alert {
            id: Alert::derive_id(&rule.name, now.timestamp()),
            rule_name: rule.name.clone(),
            level,
            message: message.clone(),
            timestamp: now,
            count: n,
            matches,
            data: Value::Null,
        };
        if let Err(err) = notifiers::fan_out(&self.notifiers, rule, &alert).await {
            tracing::error!(rule = %rule.name, error = %err, "notifier fan-out failed");
        }
        metrics::inc_alerts_fired(&rule.name, &level.to_string());

        // 9. Insert history row.
        let matches_json = Value::Array(alert.matches.clone());
        if let Err(err) = self
            .store
            .insert_history(&alert.id, &rule.name, level, &message, now, n, &matches_json, &alert.data)
            .await
        {
            tracing::error!(rule = %rule.name, alert_id = %alert.id, error = %err, "history write failed");
        }

        // 10. Writeback index (best-effort).
        let document = serde_json::to_value(&alert).unwrap_or(Value::Null);
        if let Err(err) = self
            .search
            .index(&self.config.engine.writeback_index, &alert.id, &document)
            .await
        {
            tracing::warn!(rule = %rule.name, alert_id = %alert.id, error = %err, "writeback failed");
        }

        // 11. Update suppression.
        suppression::record_emission(&self.suppression, &self.config.suppression, &rule.name);

        // 12. Release lease.
        self.release(rule, holder, lease_ttl).await;
    }

    async fn release(&self, rule: &Rule, holder: &str, ttl_seconds: i64) {
        if let Err(err) = self.store.release_lease(&rule.name, holder, ttl_seconds).await {
            tracing::error!(rule = %rule.name, error = %err, "lease release failed");
        }
    }

    /// Send a synthetic Info-level alert through the same fan-out used by
    /// real evaluations (§4.5 "Test-notification hook").
    pub async fn send_test_notification(&self) -> Result<()> {
        let alert = Alert {
            id: Alert::derive_id("test-notification", Utc::now().timestamp()),
            rule_name: "test-notification".into(),
            level: crate::models::Level::Info,
            message: "This is a test notification from the alerting engine.".into(),
            timestamp: Utc::now(),
            count: 0,
            matches: vec![],
            data: Value::Null,
        };
        let synthetic_rule = Rule {
            name: "test-notification".into(),
            rule_type: RuleType::Any,
            index_pattern: String::new(),
            query_fragment: Value::Null,
            threshold: 0,
            timeframe_seconds: 1,
            level: Some(crate::models::Level::Info),
            channels: vec![],
            enabled: true,
            custom_text: None,
            custom_args: vec![],
            query_key: vec![],
        };
        notifiers::fan_out(&self.notifiers, &synthetic_rule, &alert).await
    }

    /// Probes both backing dependencies for `/healthz`. Returns the first
    /// failure's message, if either is unreachable.
    pub async fn health_check(&self) -> std::result::Result<(), String> {
        self.search.health_probe().await.map_err(|e| format!("search store: {e}"))?;
        self.store.health_probe().await.map_err(|e| format!("state store: {e}"))?;
        Ok(())
    }
}
