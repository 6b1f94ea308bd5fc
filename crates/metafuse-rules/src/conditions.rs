//! Condition evaluation over file metadata.
//!
//! Groups recurse; leaves compare one field against an operand. Operand
//! coercion follows the stored JSON type: booleans compare as booleans,
//! numbers through a numeric parse, everything else as strings. A broken
//! condition (missing operand, bad regex, unknown operator) fails that
//! condition only and logs a warning.

use metafuse_core::FileMetadata;
use regex::Regex;
use serde_json::Value;
use tracing::warn;

use crate::model::{Condition, ConditionGroup, ConditionNode, ConditionType, GroupOperator};

/// Evaluate a condition group against a file's metadata.
///
/// An empty group is vacuously true.
pub fn evaluate_group(group: &ConditionGroup, meta: &FileMetadata) -> bool {
    match group.operator {
        GroupOperator::And => group
            .conditions
            .iter()
            .all(|node| evaluate_node(node, meta)),
        GroupOperator::Or => {
            if group.conditions.is_empty() {
                return true;
            }
            group
                .conditions
                .iter()
                .any(|node| evaluate_node(node, meta))
        }
    }
}

fn evaluate_node(node: &ConditionNode, meta: &FileMetadata) -> bool {
    match node {
        ConditionNode::Leaf(condition) => evaluate_condition(condition, meta),
        ConditionNode::Group(group) => evaluate_group(group, meta),
    }
}

fn evaluate_condition(condition: &Condition, meta: &FileMetadata) -> bool {
    let field_value = meta.field(&condition.field);

    match condition.kind {
        ConditionType::Exists => field_value.is_some(),
        ConditionType::NotExists => field_value.is_none(),
        ConditionType::Equals => match operand(condition) {
            Some(operand) => compare_eq(field_value.as_deref(), operand),
            None => false,
        },
        ConditionType::NotEquals => match operand(condition) {
            Some(operand) => !compare_eq(field_value.as_deref(), operand),
            None => false,
        },
        ConditionType::Contains => match (field_value, operand(condition)) {
            (Some(v), Some(operand)) => v.contains(&stringify(operand)),
            _ => false,
        },
        ConditionType::Matches => match (field_value, operand(condition)) {
            (Some(v), Some(operand)) => {
                let pattern = stringify(operand);
                match Regex::new(&pattern) {
                    Ok(re) => re.is_match(&v),
                    Err(e) => {
                        warn!(field = %condition.field, %pattern, "invalid MATCHES pattern: {e}");
                        false
                    }
                }
            }
            _ => false,
        },
        ConditionType::Unknown => {
            warn!(field = %condition.field, "unknown condition type, skipping");
            false
        }
    }
}

fn operand(condition: &Condition) -> Option<&Value> {
    match &condition.value {
        Some(v) => Some(v),
        None => {
            warn!(
                field = %condition.field,
                "condition {:?} is missing its value operand",
                condition.kind
            );
            None
        }
    }
}

/// Equality with type coercion driven by the operand.
fn compare_eq(field_value: Option<&str>, operand: &Value) -> bool {
    let Some(field_value) = field_value else {
        return false;
    };
    match operand {
        Value::Bool(b) => field_value.parse::<bool>().map_or(false, |v| v == *b),
        Value::Number(n) => match (field_value.parse::<f64>(), n.as_f64()) {
            (Ok(fv), Some(ov)) => fv == ov,
            _ => false,
        },
        Value::String(s) => field_value == s,
        other => field_value == stringify(other),
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
