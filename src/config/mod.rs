//! Configuration
//!
//! - Audit settings (database names, access modes, classification overrides)
//! - Property rules for dataflow components (YAML)
//! - Static naming and classification patterns

pub mod audit;
pub mod patterns;
pub mod rules;

pub use audit::AuditConfig;
pub use patterns::{
    ClassificationRule, ClassificationRuleSpec, ClassificationRules, DatabaseTarget,
    PatternCatalog, default_classification_specs,
};
pub use rules::{
    Predicate, PropertyRule, PropertyRuleConfig, RuleConfigError, default_rules_yaml,
    ensure_rules_file,
};
