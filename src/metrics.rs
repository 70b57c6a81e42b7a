//! Ambient Prometheus metrics, grounded in the teacher's `v2::metrics`
//! module: a process-wide `Registry` plus a handful of `Lazy` vectors,
//! exposed for scraping at `/metrics`.

use once_cell::sync::Lazy;
use prometheus::{IntCounterVec, IntGaugeVec, Opts, Registry};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static RULES_EVALUATED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new("rules_evaluated_total", "Rule evaluations started, by rule"),
        &["rule"],
    )
    .expect("metric registration");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("metric registration");
    counter
});

pub static ALERTS_FIRED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new("alerts_fired_total", "Alerts fired, by rule and level"),
        &["rule", "level"],
    )
    .expect("metric registration");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("metric registration");
    counter
});

pub static ALERTS_DEDUPED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new("alerts_deduped_total", "Alerts suppressed by send-time dedup, by rule"),
        &["rule"],
    )
    .expect("metric registration");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("metric registration");
    counter
});

pub static NOTIFIER_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new("notifier_failures_total", "Notifier send failures, by channel"),
        &["channel"],
    )
    .expect("metric registration");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("metric registration");
    counter
});

pub static LEASE_DENIED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new("lease_denied_total", "Lease acquisition attempts that lost the race, by rule"),
        &["rule"],
    )
    .expect("metric registration");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("metric registration");
    counter
});

pub static RULES_LOADED: Lazy<IntGaugeVec> = Lazy::new(|| {
    let gauge = IntGaugeVec::new(Opts::new("rules_loaded", "Currently loaded rule count"), &["instance"])
        .expect("metric registration");
    REGISTRY.register(Box::new(gauge.clone())).expect("metric registration");
    gauge
});

pub fn inc_rules_evaluated(rule: &str) {
    RULES_EVALUATED_TOTAL.with_label_values(&[rule]).inc();
}

pub fn inc_alerts_fired(rule: &str, level: &str) {
    ALERTS_FIRED_TOTAL.with_label_values(&[rule, level]).inc();
}

pub fn inc_alerts_deduped(rule: &str) {
    ALERTS_DEDUPED_TOTAL.with_label_values(&[rule]).inc();
}

pub fn inc_notifier_failure(channel: &str) {
    NOTIFIER_FAILURES_TOTAL.with_label_values(&[channel]).inc();
}

pub fn inc_lease_denied(rule: &str) {
    LEASE_DENIED_TOTAL.with_label_values(&[rule]).inc();
}

pub fn set_rules_loaded(instance: &str, count: i64) {
    RULES_LOADED.with_label_values(&[instance]).set(count);
}

/// Render the registry in Prometheus text exposition format for `/metrics`.
pub fn render() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    encoder.encode(&families, &mut buf).expect("encode metrics");
    String::from_utf8(buf).expect("metrics output is valid utf8")
}
