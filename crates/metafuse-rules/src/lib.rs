//! # metafuse-rules
//!
//! The user-configurable rename layer of metafuse: which files get which
//! virtual paths.
//!
//! - [`model`]: the rule configuration as edited by the UI and stored on
//!   disk ([`RuleConfig`], [`Rule`], condition trees)
//! - [`template`]: the brace-template language ([`Template`]): parsing,
//!   interpolation, and variable extraction
//! - [`conditions`]: recursive condition evaluation over file metadata
//! - [`engine`]: priority-ordered rule selection ([`RuleSet`])
//! - [`extractor`]: static analysis of a config into the [`RelevanceSet`]
//!   of properties worth fetching
//! - [`validate`]: structural validation surfaced by the management API
//! - [`store`]: the `renaming-rules.json` file with backup rotation
//!
//! ## Evaluation pipeline
//!
//! ```text
//! RuleConfig ──compile──▶ RuleSet ──resolve(metadata)──▶ virtual path
//!      │
//!      └──analyze──▶ RelevanceSet (which property events to follow)
//! ```

pub mod conditions;
pub mod defaults;
pub mod engine;
pub mod extractor;
pub mod model;
pub mod store;
pub mod template;
pub mod validate;

pub use conditions::evaluate_group;
pub use defaults::default_config;
pub use engine::{ResolvedPath, RuleSet, UNSORTED_DIR};
pub use extractor::RelevanceSet;
pub use model::{
    Condition, ConditionGroup, ConditionNode, ConditionType, GroupOperator, Rule, RuleConfig,
};
pub use store::RuleConfigStore;
pub use template::Template;
pub use validate::{validate_config, validate_rule, Validation};
