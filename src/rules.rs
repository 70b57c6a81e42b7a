//! Minimal YAML rule loader. The full authoring/admin loader is out of
//! scope; this exists only so the binary has rules to feed the engine.

use crate::error::{EngineError, Result};
use crate::models::Rule;
use std::collections::HashSet;
use std::path::Path;

pub fn load_rules_from_yaml(path: impl AsRef<Path>) -> Result<Vec<Rule>> {
    let text = std::fs::read_to_string(path)?;
    let rules: Vec<Rule> = serde_yaml::from_str(&text)?;
    validate_unique_names(&rules)?;
    Ok(rules)
}

fn validate_unique_names(rules: &[Rule]) -> Result<()> {
    let mut seen = HashSet::with_capacity(rules.len());
    for rule in rules {
        if !seen.insert(rule.name.as_str()) {
            return Err(EngineError::RuleInvalid(format!(
                "duplicate rule name: {}",
                rule.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_duplicate_rule_names() {
        let rules = vec![
            Rule {
                name: "dup".into(),
                rule_type: crate::models::RuleType::Any,
                index_pattern: "events-*".into(),
                query_fragment: serde_json::Value::Null,
                threshold: 0,
                timeframe_seconds: 60,
                level: None,
                channels: vec![],
                enabled: true,
                custom_text: None,
                custom_args: vec![],
                query_key: vec![],
            },
            Rule {
                name: "dup".into(),
                rule_type: crate::models::RuleType::Any,
                index_pattern: "events-*".into(),
                query_fragment: serde_json::Value::Null,
                threshold: 0,
                timeframe_seconds: 60,
                level: None,
                channels: vec![],
                enabled: true,
                custom_text: None,
                custom_args: vec![],
                query_key: vec![],
            },
        ];
        assert!(validate_unique_names(&rules).is_err());
    }

    #[test]
    fn loads_rules_from_yaml_text() {
        let yaml = "
- name: app-errors
  type: frequency
  index_pattern: logging-*
  threshold: 5
  timeframe_seconds: 300
";
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.yaml");
        std::fs::write(&path, yaml).unwrap();
        let rules = load_rules_from_yaml(&path).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name, "app-errors");
    }
}
