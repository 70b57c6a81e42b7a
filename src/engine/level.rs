//! Level resolution (§4.3.2): explicit `rule.level` wins; otherwise match
//! the rule name case-insensitively against ordered patterns, first hit
//! wins.

use crate::models::{Level, Rule};

pub fn resolve_level(rule: &Rule) -> Level {
    if let Some(level) = rule.level {
        return level;
    }
    let name = rule.name.to_ascii_lowercase();
    let has_system_component = name.contains("system component");
    if has_system_component && name.contains("error") {
        Level::Critical
    } else if name.contains("security") {
        Level::Critical
    } else if name.contains("fatal") || name.contains("panic") {
        Level::Critical
    } else if name.contains("error") {
        Level::High
    } else if has_system_component && name.contains("warning") {
        Level::High
    } else if name.contains("warning") {
        Level::Medium
    } else {
        Level::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RuleType;
    use serde_json::Value;

    fn rule(name: &str, level: Option<Level>) -> Rule {
        Rule {
            name: name.into(),
            rule_type: RuleType::Any,
            index_pattern: "events-*".into(),
            query_fragment: Value::Null,
            threshold: 0,
            timeframe_seconds: 60,
            level,
            channels: vec![],
            enabled: true,
            custom_text: None,
            custom_args: vec![],
            query_key: vec![],
        }
    }

    #[test]
    fn explicit_level_wins() {
        assert_eq!(resolve_level(&rule("Warning spike", Some(Level::Info))), Level::Info);
    }

    #[test]
    fn system_component_error_is_critical() {
        assert_eq!(resolve_level(&rule("System Component Error on node", None)), Level::Critical);
    }

    #[test]
    fn security_is_critical() {
        assert_eq!(resolve_level(&rule("Security breach detected", None)), Level::Critical);
    }

    #[test]
    fn fatal_or_panic_is_critical() {
        assert_eq!(resolve_level(&rule("kernel panic observed", None)), Level::Critical);
        assert_eq!(resolve_level(&rule("fatal allocation failure", None)), Level::Critical);
    }

    #[test]
    fn bare_error_is_high() {
        assert_eq!(resolve_level(&rule("app-errors", None)), Level::High);
    }

    #[test]
    fn system_component_warning_is_high() {
        assert_eq!(resolve_level(&rule("System Component Warning", None)), Level::High);
    }

    #[test]
    fn bare_warning_is_medium() {
        assert_eq!(resolve_level(&rule("disk-warning", None)), Level::Medium);
    }

    #[test]
    fn fallback_is_low() {
        assert_eq!(resolve_level(&rule("generic-rule", None)), Level::Low);
    }

    #[test]
    fn level_resolution_is_total() {
        for name in ["", "anything", "ERROR", "Warning"] {
            let _ = resolve_level(&rule(name, None));
        }
    }
}
