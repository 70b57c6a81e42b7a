//! Email adapter (§4.5): HTML body wrapped in level-keyed CSS classes, sent
//! via `lettre`'s async SMTP transport.

use super::{mention_policy, Notifier};
use crate::config::EmailNotifierConfig;
use crate::error::{EngineError, Result};
use crate::models::{Alert, Level};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

pub struct EmailNotifier {
    config: EmailNotifierConfig,
}

impl EmailNotifier {
    pub fn new(config: EmailNotifierConfig) -> Self {
        Self { config }
    }
}

fn level_css_class(level: Level) -> &'static str {
    match level {
        Level::Critical => "level-critical",
        Level::High => "level-high",
        Level::Medium => "level-medium",
        Level::Low => "level-low",
        Level::Info => "level-info",
    }
}

fn render_html(alert: &Alert, mention_ids: &[String]) -> String {
    let css_class = level_css_class(alert.level);
    let mention = mention_policy(alert.level, mention_ids)
        .map(|m| format!("<p class=\"mention\">{m}</p>"))
        .unwrap_or_default();
    format!(
        "<html><body><div class=\"{css_class}\"><h2>{rule}</h2><p>Level: {level}</p><p>Count: {count}</p><p>{message}</p>{mention}</div></body></html>",
        css_class = css_class,
        rule = alert.rule_name,
        level = alert.level,
        count = alert.count,
        message = alert.message,
        mention = mention,
    )
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn name(&self) -> &'static str {
        "email"
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }

    async fn send(&self, alert: &Alert) -> Result<()> {
        let host = self
            .config
            .smtp_host
            .as_deref()
            .ok_or_else(|| EngineError::NotifierFailure("email: smtp_host not configured".into()))?;
        let from = self
            .config
            .from_address
            .as_deref()
            .ok_or_else(|| EngineError::NotifierFailure("email: from_address not configured".into()))?;
        if self.config.to_addresses.is_empty() {
            return Err(EngineError::NotifierFailure("email: no to_addresses configured".into()));
        }

        let mut builder = Message::builder()
            .from(from.parse().map_err(|e| EngineError::NotifierFailure(format!("email: invalid from address: {e}")))?)
            .subject(format!("[{}] {}", alert.level, alert.rule_name));
        for to in &self.config.to_addresses {
            builder = builder.to(to
                .parse()
                .map_err(|e| EngineError::NotifierFailure(format!("email: invalid to address: {e}")))?);
        }
        let email = builder
            .header(ContentType::TEXT_HTML)
            .body(render_html(alert, &self.config.mention_ids))
            .map_err(|e| EngineError::NotifierFailure(format!("email: build failed: {e}")))?;

        let mut transport = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| EngineError::NotifierFailure(format!("email: relay setup failed: {e}")))?;
        if let (Some(user), Some(pass)) = (&self.config.smtp_username, &self.config.smtp_password) {
            transport = transport.credentials(Credentials::new(user.clone(), pass.clone()));
        }
        let transport = transport.build();

        transport
            .send(email)
            .await
            .map_err(|e| EngineError::NotifierFailure(format!("email: send failed: {e}")))?;
        Ok(())
    }
}
