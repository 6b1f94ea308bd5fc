//! Rule selection: metadata in, virtual path out.
//!
//! Rules are compiled once per config (templates parsed, disabled rules
//! dropped, order fixed) and evaluated per file. Selection walks the
//! compiled list in descending priority; the first rule whose conditions
//! hold and whose template interpolates wins. Files that nothing claims
//! land under `Unsorted/`.

use metafuse_core::FileMetadata;
use tracing::warn;

use crate::conditions::evaluate_group;
use crate::model::{Rule, RuleConfig};
use crate::template::Template;

/// Directory collecting files no rule could place.
pub const UNSORTED_DIR: &str = "Unsorted";

/// The outcome of rule selection. Selection is total: every complete file
/// gets a path, `rule_id` says which rule produced it (`None` for the
/// built-in unsorted fallback).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub path: String,
    pub rule_id: Option<String>,
}

struct CompiledRule {
    rule: Rule,
    template: Template,
}

/// A rule config compiled for evaluation.
pub struct RuleSet {
    ordered: Vec<CompiledRule>,
    default_rule: Option<CompiledRule>,
}

impl RuleSet {
    /// Compile a config: order enabled rules by descending priority (stable
    /// by position) and parse their templates. Rules whose template fails to
    /// parse are skipped with a warning.
    pub fn compile(config: &RuleConfig) -> RuleSet {
        let mut indexed: Vec<(usize, &Rule)> = config
            .rules
            .iter()
            .enumerate()
            .filter(|(_, r)| r.enabled)
            .collect();
        indexed.sort_by_key(|(position, rule)| (-rule.priority, *position));

        let ordered = indexed
            .into_iter()
            .filter_map(|(_, rule)| compile_rule(rule))
            .collect();

        let default_rule = config.default_rule.as_ref().and_then(compile_rule);

        RuleSet {
            ordered,
            default_rule,
        }
    }

    /// Resolve the virtual path for a file.
    pub fn resolve(&self, meta: &FileMetadata) -> ResolvedPath {
        for compiled in &self.ordered {
            if let Some(resolved) = try_rule(compiled, meta) {
                return resolved;
            }
        }
        if let Some(default_rule) = &self.default_rule {
            if let Some(resolved) = try_rule(default_rule, meta) {
                return resolved;
            }
        }
        ResolvedPath {
            path: unsorted_path(meta),
            rule_id: None,
        }
    }
}

fn compile_rule(rule: &Rule) -> Option<CompiledRule> {
    match Template::parse(&rule.template) {
        Ok(template) => Some(CompiledRule {
            rule: rule.clone(),
            template,
        }),
        Err(e) => {
            warn!(rule = %rule.id, "skipping rule with invalid template: {e}");
            None
        }
    }
}

fn try_rule(compiled: &CompiledRule, meta: &FileMetadata) -> Option<ResolvedPath> {
    if !evaluate_group(&compiled.rule.conditions, meta) {
        return None;
    }
    match compiled.template.render(&|path| meta.field(path)) {
        Some(path) if !path.trim().is_empty() => Some(ResolvedPath {
            path,
            rule_id: Some(compiled.rule.id.clone()),
        }),
        _ => {
            if compiled.rule.fallback_to_unsorted {
                Some(ResolvedPath {
                    path: unsorted_path(meta),
                    rule_id: Some(compiled.rule.id.clone()),
                })
            } else {
                None
            }
        }
    }
}

fn unsorted_path(meta: &FileMetadata) -> String {
    format!("{UNSORTED_DIR}/{}", meta.file_name)
}
