//! Teams adapter (§4.5): webhook POST of an Adaptive-Card-shaped JSON body,
//! HMAC-signed.

use super::{mention_policy, sign, Notifier};
use crate::config::WebhookNotifierConfig;
use crate::error::{EngineError, Result};
use crate::models::Alert;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

pub struct TeamsNotifier {
    config: WebhookNotifierConfig,
    http: reqwest::Client,
}

impl TeamsNotifier {
    pub fn new(config: WebhookNotifierConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }
}

fn render_card(alert: &Alert, mention_ids: &[String]) -> Value {
    let mut facts = vec![
        json!({ "title": "Rule", "value": alert.rule_name }),
        json!({ "title": "Level", "value": alert.level.to_string() }),
        json!({ "title": "Count", "value": alert.count.to_string() }),
        json!({ "title": "Timestamp", "value": alert.timestamp.to_rfc3339() }),
    ];
    if let Some(mention) = mention_policy(alert.level, mention_ids) {
        facts.push(json!({ "title": "Mention", "value": mention }));
    }
    json!({
        "type": "AdaptiveCard",
        "body": [
            { "type": "TextBlock", "text": alert.rule_name, "weight": "bolder", "size": "medium" },
            { "type": "TextBlock", "text": alert.message, "wrap": true },
            { "type": "FactSet", "facts": facts },
        ],
    })
}

#[async_trait]
impl Notifier for TeamsNotifier {
    fn name(&self) -> &'static str {
        "teams"
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }

    async fn send(&self, alert: &Alert) -> Result<()> {
        let webhook_url = self
            .config
            .webhook_url
            .as_deref()
            .ok_or_else(|| EngineError::NotifierFailure("teams: webhook_url not configured".into()))?;

        let mut url = webhook_url.to_string();
        if let Some(secret) = &self.config.signing_secret {
            let timestamp = Utc::now().timestamp().to_string();
            let signature = sign(secret, &timestamp);
            let separator = if url.contains('?') { '&' } else { '?' };
            url = format!("{url}{separator}signature={signature}&timestamp={timestamp}");
        }

        let resp = self
            .http
            .post(&url)
            .json(&render_card(alert, &self.config.mention_ids))
            .send()
            .await
            .map_err(|e| EngineError::NotifierFailure(format!("teams: request failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(EngineError::NotifierFailure(format!(
                "teams: webhook returned {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Level;

    #[test]
    fn card_contains_fact_set_with_rule_and_level() {
        let alert = Alert {
            id: "r1-1".into(),
            rule_name: "app-errors".into(),
            level: Level::Critical,
            message: "boom".into(),
            timestamp: Utc::now(),
            count: 3,
            matches: vec![],
            data: Value::Null,
        };
        let card = render_card(&alert, &["@oncall".to_string()]);
        assert_eq!(card["type"], "AdaptiveCard");
        let facts = card["body"][2]["facts"].as_array().unwrap();
        assert!(facts.iter().any(|f| f["value"] == "app-errors"));
        assert!(facts.iter().any(|f| f["title"] == "Mention"));
    }

    #[test]
    fn no_configured_ids_omits_mention_fact() {
        let alert = Alert {
            id: "r1-1".into(),
            rule_name: "app-errors".into(),
            level: Level::Critical,
            message: "boom".into(),
            timestamp: Utc::now(),
            count: 3,
            matches: vec![],
            data: Value::Null,
        };
        let card = render_card(&alert, &[]);
        let facts = card["body"][2]["facts"].as_array().unwrap();
        assert!(!facts.iter().any(|f| f["title"] == "Mention"));
    }
}
