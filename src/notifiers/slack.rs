//! Slack adapter (§4.5): webhook POST preserving lightweight Markdown, using
//! Slack's `"  \n  "` line-break convention, HMAC-signed.

use super::{mention_policy, sign, Notifier};
use crate::config::WebhookNotifierConfig;
use crate::error::{EngineError, Result};
use crate::models::Alert;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

pub struct SlackNotifier {
    config: WebhookNotifierConfig,
    http: reqwest::Client,
}

impl SlackNotifier {
    pub fn new(config: WebhookNotifierConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }
}

fn render_text(alert: &Alert, mention_ids: &[String]) -> String {
    let mention = mention_policy(alert.level, mention_ids)
        .map(|m| format!("{m}  \n  "))
        .unwrap_or_default();
    format!(
        "{mention}*[{level}] {rule}*  \n  count: {count}  \n  {message}",
        mention = mention,
        level = alert.level,
        rule = alert.rule_name,
        count = alert.count,
        message = alert.message,
    )
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn name(&self) -> &'static str {
        "slack"
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }

    async fn send(&self, alert: &Alert) -> Result<()> {
        let webhook_url = self
            .config
            .webhook_url
            .as_deref()
            .ok_or_else(|| EngineError::NotifierFailure("slack: webhook_url not configured".into()))?;

        let mut url = webhook_url.to_string();
        if let Some(secret) = &self.config.signing_secret {
            let timestamp = Utc::now().timestamp().to_string();
            let signature = sign(secret, &timestamp);
            let separator = if url.contains('?') { '&' } else { '?' };
            url = format!("{url}{separator}signature={signature}&timestamp={timestamp}");
        }

        let body = json!({ "text": render_text(alert, &self.config.mention_ids) });
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::NotifierFailure(format!("slack: request failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(EngineError::NotifierFailure(format!(
                "slack: webhook returned {}",
                resp.status()
            )));
        }
        Ok(())
    }
}
