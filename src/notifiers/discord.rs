//! Discord adapter (§4.5): webhook POST whose body strips Markdown fences
//! and bold markers down to plain text, HMAC-signed.

use super::{mention_policy, sign, Notifier};
use crate::config::WebhookNotifierConfig;
use crate::error::{EngineError, Result};
use crate::models::Alert;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

pub struct DiscordNotifier {
    config: WebhookNotifierConfig,
    http: reqwest::Client,
}

impl DiscordNotifier {
    pub fn new(config: WebhookNotifierConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }
}

fn strip_markdown(text: &str) -> String {
    text.replace("```", "").replace("**", "").replace('*', "").replace('`', "")
}

fn render_content(alert: &Alert, mention_ids: &[String]) -> String {
    let mention = mention_policy(alert.level, mention_ids)
        .map(|m| format!("{m} "))
        .unwrap_or_default();
    let plain_message = strip_markdown(&alert.message);
    format!(
        "{mention}[{level}] {rule} (count: {count}): {message}",
        mention = mention,
        level = alert.level,
        rule = alert.rule_name,
        count = alert.count,
        message = plain_message,
    )
}

#[async_trait]
impl Notifier for DiscordNotifier {
    fn name(&self) -> &'static str {
        "discord"
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }

    async fn send(&self, alert: &Alert) -> Result<()> {
        let webhook_url = self
            .config
            .webhook_url
            .as_deref()
            .ok_or_else(|| EngineError::NotifierFailure("discord: webhook_url not configured".into()))?;

        let mut url = webhook_url.to_string();
        if let Some(secret) = &self.config.signing_secret {
            let timestamp = Utc::now().timestamp().to_string();
            let signature = sign(secret, &timestamp);
            let separator = if url.contains('?') { '&' } else { '?' };
            url = format!("{url}{separator}signature={signature}&timestamp={timestamp}");
        }

        let body = json!({ "content": render_content(alert, &self.config.mention_ids) });
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::NotifierFailure(format!("discord: request failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(EngineError::NotifierFailure(format!(
                "discord: webhook returned {}",
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
    use serde_json::Value;

    #[test]
    fn content_strips_markdown_markers() {
        let alert = Alert {
            id: "r1-1".into(),
            rule_name: "app-errors".into(),
            level: Level::Medium,
            message: "**bold** and ```code```".into(),
            timestamp: Utc::now(),
            count: 3,
            matches: vec![],
            data: Value::Null,
        };
        let content = render_content(&alert, &[]);
        assert!(!content.contains('*'));
        assert!(!content.contains('`'));
    }

    #[test]
    fn high_severity_mentions_configured_ids() {
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
        let content = render_content(&alert, &["@oncall".to_string()]);
        assert!(content.starts_with("@oncall "));
    }
}
