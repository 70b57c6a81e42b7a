//! Search Client (§4.1): issues search/count/index requests against the
//! remote search store over HTTPS with basic auth, and builds the
//! time-bounded trigger query.

use crate::config::SearchStoreConfig;
use crate::error::{EngineError, Result};
use crate::models::{Rule, RuleType};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration as StdDuration;

#[derive(Debug, Clone)]
pub struct SearchClient {
    http: reqwest::Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    pub took: i64,
    #[serde(rename = "timed_out")]
    pub timed_out: bool,
    #[serde(rename = "_shards")]
    pub shards: Value,
    pub hits: Hits,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hits {
    pub total: Total,
    pub max_score: Option<f64>,
    pub hits: Vec<Hit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Total {
    pub value: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Hit {
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_score")]
    pub score: Option<f64>,
    #[serde(rename = "_source")]
    pub source: Value,
}

impl SearchClient {
    pub fn new(config: &SearchStoreConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!config.verify_certs)
            .timeout(StdDuration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(EngineError::SearchTransport)?;
        Ok(Self {
            http,
            base_url: config.base_url(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'));
        let mut req = self.http.request(method, url);
        if let Some(user) = &self.username {
            req = req.basic_auth(user, self.password.as_ref());
        }
        req
    }

    pub async fn search(&self, index: &str, query_body: &Value) -> Result<SearchResponse> {
        let resp = self
            .request(reqwest::Method::POST, &format!("{index}/_search"))
            .json(query_body)
            .send()
            .await
            .map_err(EngineError::SearchTransport)?;
        Self::parse(resp).await
    }

    pub async fn count(&self, index: &str, query_body: &Value) -> Result<i64> {
        let resp = self
            .request(reqwest::Method::POST, &format!("{index}/_count"))
            .json(query_body)
            .send()
            .await
            .map_err(EngineError::SearchTransport)?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(EngineError::SearchBadResponse {
                status: status.as_u16(),
                body: text,
            });
        }
        let v: Value = serde_json::from_str(&text)?;
        Ok(v.get("count").and_then(|c| c.as_i64()).unwrap_or(0))
    }

    pub async fn index(&self, index: &str, id: &str, document: &Value) -> Result<()> {
        let resp = self
            .request(reqwest::Method::PUT, &format!("{index}/_doc/{id}"))
            .json(document)
            .send()
            .await
            .map_err(EngineError::SearchTransport)?;
        Self::check_status(resp).await
    }

    pub async fn index_auto_id(&self, index: &str, document: &Value) -> Result<()> {
        let resp = self
            .request(reqwest::Method::POST, &format!("{index}/_doc"))
            .json(document)
            .send()
            .await
            .map_err(EngineError::SearchTransport)?;
        Self::check_status(resp).await
    }

    pub async fn health_probe(&self) -> Result<()> {
        let resp = self
            .request(reqwest::Method::GET, "_cluster/health")
            .send()
            .await
            .map_err(|e| EngineError::SearchUnavailable(e.to_string()))?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(EngineError::SearchUnavailable(format!(
                "cluster health returned {status}: {text}"
            )));
        }
        let v: Value = serde_json::from_str(&text)
            .map_err(|e| EngineError::SearchUnavailable(e.to_string()))?;
        match v.get("status").and_then(|s| s.as_str()) {
            Some("red") | None => Err(EngineError::SearchUnavailable(format!(
                "cluster health is red: {text}"
            ))),
            _ => Ok(()),
        }
    }

    async fn parse(resp: reqwest::Response) -> Result<SearchResponse> {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(EngineError::SearchBadResponse {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn check_status(resp: reqwest::Response) -> Result<()> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EngineError::SearchBadResponse {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Build the boolean trigger query (§4.1). `buffer_time_seconds` implements
/// Open Question 2 (SPEC_FULL.md §9): the window becomes
/// `[now - timeframe - buffer, now - buffer]` when non-zero.
pub fn build_trigger_query(rule: &Rule, now: DateTime<Utc>, buffer_time_seconds: i64) -> Value {
    let upper = now - Duration::seconds(buffer_time_seconds);
    let lower = upper - Duration::seconds(rule.timeframe_seconds);
    build_range_query(rule, lower, upper)
}

/// Build the prior-window query used by `spike` rules (Open Question 1):
/// `[now - 2*timeframe - buffer, now - timeframe - buffer)`.
pub fn build_prior_window_query(rule: &Rule, now: DateTime<Utc>, buffer_time_seconds: i64) -> Value {
    let upper = now - Duration::seconds(buffer_time_seconds) - Duration::seconds(rule.timeframe_seconds);
    let lower = upper - Duration::seconds(rule.timeframe_seconds);
    build_range_query(rule, lower, upper)
}

fn build_range_query(rule: &Rule, lower: DateTime<Utc>, upper: DateTime<Utc>) -> Value {
    let mut must = vec![json!({
        "range": {
            "@timestamp": {
                "gte": lower.to_rfc3339(),
                "lte": upper.to_rfc3339(),
            }
        }
    })];
    if !rule.query_fragment.is_null() {
        if let Value::Object(_) = &rule.query_fragment {
            must.push(rule.query_fragment.clone());
        }
    }
    json!({
        "query": { "bool": { "must": must } },
        "size": 100,
        "sort": [{ "@timestamp": "desc" }],
    })
}

/// Trigger predicate (§4.3.1). `prior_n` is only consulted for `spike`.
pub fn evaluate_trigger(rule: &Rule, n: i64, prior_n: Option<i64>) -> bool {
    match rule.rule_type {
        RuleType::Frequency => n >= rule.threshold,
        RuleType::Any => n > 0,
        RuleType::Spike => {
            // threshold is interpreted as a percentage growth factor for spike
            // rules (Open Question 1, SPEC_FULL.md §9).
            let prior = prior_n.unwrap_or(0);
            if prior == 0 {
                n > 0
            } else {
                n * 100 >= prior * (100 + rule.threshold)
            }
        }
        RuleType::Flatline => n < rule.threshold,
        RuleType::Change => n > 0,
        RuleType::Unknown => n >= rule.threshold,
    }
}
