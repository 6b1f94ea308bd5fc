//! Rule configuration model.
//!
//! Mirrors the on-disk `renaming-rules.json` layout (camelCase JSON, same
//! shape the management UI edits). Rules are ordered; selection runs in
//! descending priority with position breaking ties.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The full user-editable rule configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleConfig {
    /// Schema tag for future migrations
    pub version: u32,
    /// Ordered rule list
    pub rules: Vec<Rule>,
    /// Applied when no enabled rule yields a path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_rule: Option<Rule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    /// True only for the seeded built-in config; stripped on save
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_default: bool,
}

/// A single rename rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    /// Stable identifier
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Evaluated descending; ties broken by list position
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub conditions: ConditionGroup,
    /// Path template, see the `template` module for the grammar
    pub template: String,
    /// When conditions match but interpolation fails, place the file under
    /// `Unsorted/` instead of trying the next rule
    #[serde(default)]
    pub fallback_to_unsorted: bool,
}

fn default_true() -> bool {
    true
}

/// Boolean combination of conditions. An empty group evaluates true.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionGroup {
    #[serde(default)]
    pub operator: GroupOperator,
    #[serde(default)]
    pub conditions: Vec<ConditionNode>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GroupOperator {
    #[default]
    And,
    Or,
}

/// Either a leaf condition or a nested group.
///
/// Untagged: a leaf always carries `type` + `field`, a group carries
/// `conditions`, so the shapes never overlap.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionNode {
    Leaf(Condition),
    Group(ConditionGroup),
}

/// A leaf condition over one metadata field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub kind: ConditionType,
    /// Dot- or slash-delimited property path
    pub field: String,
    /// Comparison operand; required for everything but the existence checks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// Condition operator.
///
/// Unrecognized strings deserialize to [`Unknown`](ConditionType::Unknown)
/// instead of failing the whole config; evaluation treats them as a soft
/// failure of that one condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConditionType {
    Exists,
    NotExists,
    Equals,
    NotEquals,
    Contains,
    Matches,
    #[serde(other)]
    Unknown,
}

impl ConditionType {
    /// Whether this operator needs a `value` operand.
    pub fn requires_value(&self) -> bool {
        matches!(
            self,
            ConditionType::Equals
                | ConditionType::NotEquals
                | ConditionType::Contains
                | ConditionType::Matches
        )
    }
}

impl ConditionGroup {
    /// Every field path referenced by this group, leaves and subgroups.
    pub fn referenced_fields(&self) -> Vec<String> {
        let mut fields = Vec::new();
        self.collect_fields(&mut fields);
        fields
    }

    fn collect_fields(&self, out: &mut Vec<String>) {
        for node in &self.conditions {
            match node {
                ConditionNode::Leaf(c) => out.push(c.field.clone()),
                ConditionNode::Group(g) => g.collect_fields(out),
            }
        }
    }
}
