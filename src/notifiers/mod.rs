//! Notifier Set (§4.5): a fixed registry of adapters, fanned out concurrently
//! per alert. Individual adapter failures are logged and never propagate.

pub mod discord;
pub mod email;
pub mod slack;
pub mod teams;

use crate::config::NotifiersConfig;
use crate::models::{Alert, Level};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;
    fn enabled(&self) -> bool;
    async fn send(&self, alert: &Alert) -> crate::error::Result<()>;
}

/// Mention users only for Critical/High (§4.5), using the channel's
/// configured `mention_ids`; lower levels, and channels with none
/// configured, omit the mention entirely.
pub fn mention_policy(level: Level, mention_ids: &[String]) -> Option<String> {
    match level {
        Level::Critical | Level::High if !mention_ids.is_empty() => Some(mention_ids.join(" ")),
        _ => None,
    }
}

/// `HMAC-SHA256(secret, timestamp+"\n"+secret)` base64-encoded (§4.5).
pub fn sign(secret: &str, timestamp: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(timestamp.as_bytes());
    mac.update(b"\n");
    mac.update(secret.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

/// Build the registry of enabled notifiers from configuration.
pub fn build_registry(config: &NotifiersConfig) -> Vec<Box<dyn Notifier>> {
    vec![
        Box::new(email::EmailNotifier::new(config.email.clone())),
        Box::new(slack::SlackNotifier::new(config.slack.clone())),
        Box::new(teams::TeamsNotifier::new(config.teams.clone())),
        Box::new(discord::DiscordNotifier::new(config.discord.clone())),
    ]
}

/// Fan out `alert` to every notifier that is both config-enabled and listed
/// in `rule.channels` (empty channel list = all enabled, §3), concurrently,
/// wait for all of them, and log failures. Always returns `Ok` — per §4.5,
/// notifier failure is never fatal to the caller (the history row is
/// written regardless).
pub async fn fan_out(notifiers: &[Box<dyn Notifier>], rule: &crate::models::Rule, alert: &Alert) -> crate::error::Result<()> {
    let sends = notifiers
        .iter()
        .filter(|n| n.enabled() && rule.is_channel_enabled(n.name()))
        .map(|n| async move { (n.name(), n.send(alert).await) });
    let results = futures::future::join_all(sends).await;
    for (name, result) in results {
        if let Err(err) = result {
            tracing::error!(notifier = name, alert_id = %alert.id, error = %err, "notifier failed");
            crate::metrics::inc_notifier_failure(name);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mention_policy_only_fires_for_high_severity_with_ids_configured() {
        let ids = vec!["@alice".to_string(), "@bob".to_string()];
        assert_eq!(mention_policy(Level::Critical, &ids), Some("@alice @bob".to_string()));
        assert_eq!(mention_policy(Level::High, &ids), Some("@alice @bob".to_string()));
        assert!(mention_policy(Level::Medium, &ids).is_none());
        assert!(mention_policy(Level::Low, &ids).is_none());
        assert!(mention_policy(Level::Info, &ids).is_none());
    }

    #[test]
    fn mention_policy_is_empty_when_no_ids_configured() {
        assert!(mention_policy(Level::Critical, &[]).is_none());
        assert!(mention_policy(Level::High, &[]).is_none());
    }

    #[test]
    fn sign_is_stable_for_same_inputs() {
        let a = sign("secret", "1700000000");
        let b = sign("secret", "1700000000");
        assert_eq!(a, b);
        let c = sign("secret", "1700000001");
        assert_ne!(a, c);
    }
}
