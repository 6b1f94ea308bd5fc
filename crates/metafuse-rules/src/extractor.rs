//! Static analysis of a rule config into the set of relevant properties.
//!
//! The event consumer fetches a property value only when its path can
//! affect virtual-path computation. That set is the union of a fixed core
//! (path, sizes, timestamps, classification), every template variable in
//! the enabled rules (recursing into conditional subtemplates), and every
//! field referenced by a condition. The default rule contributes
//! unconditionally.

use std::collections::BTreeSet;

use metafuse_core::normalize_property_path;
use tracing::warn;

use crate::model::{Rule, RuleConfig};
use crate::template::Template;

/// Properties that always matter, whatever the rules say.
const CORE_PROPERTIES: &[&str] = &[
    "filePath",
    "size",
    "fileSize",
    "sizeByte",
    "mtime",
    "ctime",
    "fileName",
    "extension",
    "fileType",
];

/// The set of property paths that can affect virtual-path computation.
///
/// Paths are held in dot form. Matching is by exact path or dotted-prefix
/// ancestry in either direction: tracking `titles` admits `titles/eng`
/// updates, and tracking `titles/eng` admits coarse `titles` updates.
#[derive(Debug, Clone)]
pub struct RelevanceSet {
    paths: BTreeSet<String>,
}

impl RelevanceSet {
    /// Compute the set for a rule configuration.
    pub fn from_config(config: &RuleConfig) -> RelevanceSet {
        let mut paths: BTreeSet<String> =
            CORE_PROPERTIES.iter().map(|p| p.to_string()).collect();

        for rule in config.rules.iter().filter(|r| r.enabled) {
            collect_rule(rule, &mut paths);
        }
        if let Some(default_rule) = &config.default_rule {
            collect_rule(default_rule, &mut paths);
        }

        RelevanceSet { paths }
    }

    /// Whether a property path can affect any virtual path.
    pub fn is_relevant(&self, prop: &str) -> bool {
        let prop = normalize_property_path(prop);
        if self.paths.contains(&prop) {
            return true;
        }
        self.paths.iter().any(|member| {
            prop.strip_prefix(member.as_str())
                .is_some_and(|rest| rest.starts_with('.'))
                || member
                    .strip_prefix(prop.as_str())
                    .is_some_and(|rest| rest.starts_with('.'))
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Member paths in sorted order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }
}

fn collect_rule(rule: &Rule, out: &mut BTreeSet<String>) {
    match Template::parse(&rule.template) {
        Ok(template) => {
            for var in template.variables() {
                out.insert(var);
            }
        }
        Err(e) => warn!(rule = %rule.id, "skipping template during extraction: {e}"),
    }
    for field in rule.conditions.referenced_fields() {
        out.insert(normalize_property_path(&field));
    }
}
