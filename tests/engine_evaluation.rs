//! End-to-end scenario coverage (§8): a frequency rule tripping against a
//! mocked search store, persisting one history row and one writeback
//! document, through the real scheduler loop.

use alert_engine::config::{
    EmailNotifierConfig, EngineConfig, EngineSettings, ExponentialRealertConfig, LeaseDedupConfig,
    NotifiersConfig, SearchStoreConfig, StateStoreConfig, SuppressionConfig, WebhookNotifierConfig,
};
use alert_engine::engine::Engine;
use alert_engine::models::{DedupeKey, Rule, RuleType};
use alert_engine::search_client::SearchClient;
use alert_engine::state_store::StateStore;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn base_config(search_port: u16, db_path: &str) -> EngineConfig {
    EngineConfig {
        search_store: SearchStoreConfig {
            host: "127.0.0.1".into(),
            port: search_port,
            protocol: "http".into(),
            username: None,
            password: None,
            verify_certs: false,
            request_timeout_seconds: 5,
        },
        engine: EngineSettings {
            run_interval_seconds: 1,
            buffer_time_seconds: 0,
            max_running_rules: 4,
            writeback_index: "alerts-writeback".into(),
            alert_time_limit_seconds: 5,
        },
        suppression: SuppressionConfig {
            enabled: false,
            realert_minutes: 60,
            exponential_realert: ExponentialRealertConfig::default(),
        },
        notifiers: NotifiersConfig {
            email: EmailNotifierConfig::default(),
            slack: WebhookNotifierConfig::default(),
            teams: WebhookNotifierConfig::default(),
            discord: WebhookNotifierConfig::default(),
        },
        state_store: StateStoreConfig::EmbeddedFile { path: db_path.into() },
        leases: LeaseDedupConfig {
            lease_ttl_seconds: 30,
            dedupe_ttl_seconds: 120,
        },
    }
}

fn frequency_rule() -> Rule {
    Rule {
        name: "app-errors".into(),
        rule_type: RuleType::Frequency,
        index_pattern: "logging-app".into(),
        query_fragment: serde_json::Value::Null,
        threshold: 5,
        timeframe_seconds: 300,
        level: None,
        channels: vec![],
        enabled: true,
        custom_text: None,
        custom_args: vec![],
        query_key: vec![],
    }
}

#[tokio::test]
async fn frequency_trip_writes_one_history_row_and_writeback_document() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/logging-app/_search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "took": 1,
            "timed_out": false,
            "_shards": {},
            "hits": {
                "total": { "value": 7 },
                "max_score": null,
                "hits": [{
                    "_index": "logging-app",
                    "_id": "1",
                    "_score": 1.0,
                    "_source": {
                        "log": "panic: nil map",
                        "@timestamp": "2025-01-01T12:00:00Z",
                        "kubernetes": {
                            "pod_name": "api-1",
                            "namespace_name": "prod",
                            "container_name": "api",
                            "container_image": "api:v1"
                        }
                    }
                }]
            }
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("PUT"))
        .and(path_regex(r"^/alerts-writeback/_doc/app-errors-\d+$"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let db_path = tmp.path().join("state.db");
    let db_path_str = db_path.to_str().unwrap();

    let search_port: u16 = mock_server
        .uri()
        .rsplit(':')
        .next()
        .and_then(|p| p.parse().ok())
        .expect("wiremock uri carries a port");
    let config = base_config(search_port, db_path_str);
    let search = SearchClient::new(&config.search_store).unwrap();
    let store = StateStore::connect(&config.state_store).await.unwrap();

    let engine = Engine::new(config, search, store, vec![frequency_rule()]);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let scheduler = tokio::spawn({
        let engine = engine.clone();
        async move { engine.run_scheduler(shutdown_rx).await }
    });

    tokio::time::sleep(Duration::from_millis(300)).await;
    let _ = shutdown_tx.send(true);
    let _ = scheduler.await;

    let verify_store = StateStore::connect(&StateStoreConfig::EmbeddedFile { path: db_path_str.into() })
        .await
        .unwrap();
    let recent = verify_store.recent(10).await.unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].rule_name, "app-errors");
    assert_eq!(recent[0].count, 7);
    assert!(recent[0].message.contains("api-1"));
}

/// Scenario 6 (§8): one of several enabled notifiers fails outright; the
/// other channels still receive the alert, and the history row is written
/// regardless, per `notifiers::fan_out`'s "always `Ok` — failures never
/// roll back the write" contract.
#[tokio::test]
async fn notifier_partial_failure_still_writes_history() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/logging-app/_search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "took": 1,
            "timed_out": false,
            "_shards": {},
            "hits": {
                "total": { "value": 7 },
                "max_score": null,
                "hits": [{
                    "_index": "logging-app",
                    "_id": "1",
                    "_score": 1.0,
                    "_source": {
                        "log": "panic: nil map",
                        "@timestamp": "2025-01-01T12:00:00Z",
                        "kubernetes": {
                            "pod_name": "api-1",
                            "namespace_name": "prod",
                            "container_name": "api",
                            "container_image": "api:v1"
                        }
                    }
                }]
            }
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("PUT"))
        .and(path_regex(r"^/alerts-writeback/_doc/app-errors-\d+$"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    // Slack and Discord deliver successfully; Teams fails outright.
    Mock::given(method("POST"))
        .and(path("/hooks/slack"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/hooks/teams"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/hooks/discord"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let db_path = tmp.path().join("state.db");
    let db_path_str = db_path.to_str().unwrap();

    let search_port: u16 = mock_server
        .uri()
        .rsplit(':')
        .next()
        .and_then(|p| p.parse().ok())
        .expect("wiremock uri carries a port");
    let mut config = base_config(search_port, db_path_str);
    config.notifiers.slack = WebhookNotifierConfig {
        enabled: true,
        webhook_url: Some(format!("{}/hooks/slack", mock_server.uri())),
        signing_secret: None,
        mention_ids: vec![],
    };
    config.notifiers.teams = WebhookNotifierConfig {
        enabled: true,
        webhook_url: Some(format!("{}/hooks/teams", mock_server.uri())),
        signing_secret: None,
        mention_ids: vec![],
    };
    config.notifiers.discord = WebhookNotifierConfig {
        enabled: true,
        webhook_url: Some(format!("{}/hooks/discord", mock_server.uri())),
        signing_secret: None,
        mention_ids: vec![],
    };

    let search = SearchClient::new(&config.search_store).unwrap();
    let store = StateStore::connect(&config.state_store).await.unwrap();

    let engine = Engine::new(config, search, store, vec![frequency_rule()]);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let scheduler = tokio::spawn({
        let engine = engine.clone();
        async move { engine.run_scheduler(shutdown_rx).await }
    });

    tokio::time::sleep(Duration::from_millis(300)).await;
    let _ = shutdown_tx.send(true);
    let _ = scheduler.await;

    let verify_store = StateStore::connect(&StateStoreConfig::EmbeddedFile { path: db_path_str.into() })
        .await
        .unwrap();
    let recent = verify_store.recent(10).await.unwrap();
    assert_eq!(recent.len(), 1, "history row must be written despite the Teams notifier failing");
    assert_eq!(recent[0].rule_name, "app-errors");

    // The send-time dedup key is still set, per scenario 6: a second
    // check-and-touch against the same key within the TTL must be refused.
    let dedupe_key = DedupeKey::new(&recent[0].rule_name, recent[0].level, &recent[0].message);
    assert!(!verify_store.check_and_touch(&dedupe_key, 120).await.unwrap());

    // Slack and Discord each received exactly one request; Teams (the failing
    // channel) was still attempted once.
    assert_eq!(
        mock_server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.path() == "/hooks/slack")
            .count(),
        1
    );
    assert_eq!(
        mock_server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.path() == "/hooks/teams")
            .count(),
        1
    );
    assert_eq!(
        mock_server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.path() == "/hooks/discord")
            .count(),
        1
    );
}
