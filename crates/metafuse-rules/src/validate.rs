//! Structural validation for rule configs.
//!
//! Evaluation is deliberately forgiving (soft failures in the condition
//! evaluator and the rule engine); this module is where problems become
//! visible, through the rule-management API. Errors block a save, warnings
//! do not.

use regex::Regex;
use serde_json::Value;

use crate::model::{ConditionGroup, ConditionNode, ConditionType, Rule, RuleConfig};
use crate::template::Template;

/// Outcome of validating a rule or a whole config.
#[derive(Debug, Clone, Default)]
pub struct Validation {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn merge_prefixed(&mut self, prefix: &str, other: Validation) {
        self.errors
            .extend(other.errors.into_iter().map(|e| format!("{prefix}: {e}")));
        self.warnings
            .extend(other.warnings.into_iter().map(|w| format!("{prefix}: {w}")));
    }
}

/// Validate a single rule.
pub fn validate_rule(rule: &Rule) -> Validation {
    let mut v = Validation::default();

    if rule.name.trim().is_empty() {
        v.warnings.push("rule has no name".to_string());
    }
    if rule.template.trim().is_empty() {
        v.errors.push("template is empty".to_string());
    } else if let Err(e) = Template::parse(&rule.template) {
        v.errors.push(e.to_string());
    }

    validate_group(&rule.conditions, &mut v);
    v
}

/// Validate a full config: every rule, the default rule, and id uniqueness.
pub fn validate_config(config: &RuleConfig) -> Validation {
    let mut v = Validation::default();

    let mut seen_ids = std::collections::HashSet::new();
    for rule in &config.rules {
        if !rule.id.is_empty() && !seen_ids.insert(rule.id.as_str()) {
            v.errors.push(format!("duplicate rule id: {}", rule.id));
        }
    }

    for rule in &config.rules {
        let label = if rule.id.is_empty() { &rule.name } else { &rule.id };
        v.merge_prefixed(&format!("rule {label}"), validate_rule(rule));
    }
    if let Some(default_rule) = &config.default_rule {
        v.merge_prefixed("default rule", validate_rule(default_rule));
    }
    v
}

fn validate_group(group: &ConditionGroup, v: &mut Validation) {
    for node in &group.conditions {
        match node {
            ConditionNode::Leaf(c) => {
                if c.field.trim().is_empty() {
                    v.errors.push("condition has an empty field".to_string());
                }
                if c.kind == ConditionType::Unknown {
                    v.warnings
                        .push(format!("unknown condition type on field {}", c.field));
                }
                if c.kind.requires_value() && c.value.is_none() {
                    v.errors.push(format!(
                        "condition {:?} on {} requires a value",
                        c.kind, c.field
                    ));
                }
                if c.kind == ConditionType::Matches {
                    if let Some(Value::String(pattern)) = &c.value {
                        if let Err(e) = Regex::new(pattern) {
                            v.warnings
                                .push(format!("pattern on {} never matches: {e}", c.field));
                        }
                    }
                }
            }
            ConditionNode::Group(sub) => validate_group(sub, v),
        }
    }
}
