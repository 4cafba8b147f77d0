//! Property rule configuration
//!
//! Rules are declared per component type as a mapping of property name to
//! `{condition, value?}`:
//!
//! ```yaml
//! oledb_source:
//!   AlwaysUseDefaultCodePage:
//!     condition: equals
//!     value: 'false'
//!   SqlCommand:
//!     condition: str_not_empty
//! ```
//!
//! Supported conditions are `equals`, `str_not_empty`, `is_none` and
//! `regex_match`. A rule with an unknown condition, a missing value or an
//! invalid pattern is skipped and recorded in
//! [`PropertyRuleConfig::skipped`]; loading never fails because of one bad
//! rule.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::error::{AuditError, AuditResult};
use crate::import::read_text_file;

/// A rule that could not be compiled
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RuleConfigError {
    #[error("{component}.{property}: unknown condition '{condition}'")]
    UnknownCondition {
        component: String,
        property: String,
        condition: String,
    },

    #[error("{component}.{property}: condition '{condition}' requires a value")]
    MissingValue {
        component: String,
        property: String,
        condition: String,
    },

    #[error("{component}.{property}: invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        component: String,
        property: String,
        pattern: String,
        reason: String,
    },
}

/// How a property value is checked
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Value must equal the expected string exactly
    Equals(String),
    /// Value must be present and not blank after trimming
    NonEmpty,
    /// Property must not be present
    IsAbsent,
    /// Value must match the pattern (anchored at the start)
    Matches(Regex),
}

impl Predicate {
    pub fn condition_name(&self) -> &'static str {
        match self {
            Predicate::Equals(_) => "equals",
            Predicate::NonEmpty => "str_not_empty",
            Predicate::IsAbsent => "is_none",
            Predicate::Matches(_) => "regex_match",
        }
    }
}

impl PartialEq for Predicate {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Predicate::Equals(a), Predicate::Equals(b)) => a == b,
            (Predicate::NonEmpty, Predicate::NonEmpty) => true,
            (Predicate::IsAbsent, Predicate::IsAbsent) => true,
            (Predicate::Matches(a), Predicate::Matches(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

/// One compiled property rule
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyRule {
    pub property: String,
    pub predicate: Predicate,
}

/// Rule as written in the configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRule {
    pub condition: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_yaml::Value>,
}

impl RawRule {
    fn new(condition: &str, value: Option<&str>) -> Self {
        Self {
            condition: condition.to_string(),
            value: value.map(|v| serde_yaml::Value::String(v.to_string())),
        }
    }

    /// Scalar value rendered as a string; YAML numbers and booleans are accepted
    fn value_string(&self) -> Option<String> {
        match self.value.as_ref()? {
            serde_yaml::Value::String(s) => Some(s.clone()),
            serde_yaml::Value::Number(n) => Some(n.to_string()),
            serde_yaml::Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

/// Component type to property to rule, as written in the configuration file
pub type RawPropertyRules = BTreeMap<String, BTreeMap<String, RawRule>>;

/// Compiled property rules, keyed by component type
#[derive(Debug, Clone, Default)]
pub struct PropertyRuleConfig {
    sets: BTreeMap<String, BTreeMap<String, PropertyRule>>,
    skipped: Vec<RuleConfigError>,
}

impl PropertyRuleConfig {
    /// Compile raw rules, skipping (and logging) the ones that are invalid
    pub fn from_raw(raw: &RawPropertyRules) -> Self {
        let mut config = Self::default();

        for (component, properties) in raw {
            let set = config.sets.entry(component.clone()).or_default();
            for (property, rule) in properties {
                match compile_rule(component, property, rule) {
                    Ok(predicate) => {
                        set.insert(
                            property.clone(),
                            PropertyRule {
                                property: property.clone(),
                                predicate,
                            },
                        );
                    }
                    Err(err) => {
                        tracing::warn!("Skipping property rule: {}", err);
                        config.skipped.push(err);
                    }
                }
            }
        }

        config
    }

    pub fn from_yaml_str(yaml: &str) -> AuditResult<Self> {
        let raw: RawPropertyRules = serde_yaml::from_str(yaml)?;
        Ok(Self::from_raw(&raw))
    }

    pub fn from_file(path: &Path) -> AuditResult<Self> {
        let content = read_text_file(path)?;
        Self::from_yaml_str(&content)
    }

    /// Rules for a component type; empty when none are configured
    pub fn rules_for(&self, component_type: &str) -> impl Iterator<Item = &PropertyRule> {
        self.sets
            .get(component_type)
            .into_iter()
            .flat_map(|set| set.values())
    }

    pub fn component_types(&self) -> impl Iterator<Item = &str> {
        self.sets.keys().map(String::as_str)
    }

    /// Rules dropped while loading
    pub fn skipped(&self) -> &[RuleConfigError] {
        &self.skipped
    }

    /// Copy of this configuration with one rule replaced or added
    pub fn with_override(
        &self,
        component_type: &str,
        property: &str,
        predicate: Predicate,
    ) -> Self {
        let mut config = self.clone();
        config.sets.entry(component_type.to_string()).or_default().insert(
            property.to_string(),
            PropertyRule {
                property: property.to_string(),
                predicate,
            },
        );
        config
    }
}

fn compile_rule(component: &str, property: &str, rule: &RawRule) -> Result<Predicate, RuleConfigError> {
    let missing_value = || RuleConfigError::MissingValue {
        component: component.to_string(),
        property: property.to_string(),
        condition: rule.condition.clone(),
    };

    match rule.condition.as_str() {
        "equals" => rule
            .value_string()
            .map(Predicate::Equals)
            .ok_or_else(missing_value),
        "str_not_empty" => Ok(Predicate::NonEmpty),
        "is_none" => Ok(Predicate::IsAbsent),
        "regex_match" => {
            let pattern = rule.value_string().ok_or_else(missing_value)?;
            Regex::new(&format!("^(?:{})", pattern))
                .map(Predicate::Matches)
                .map_err(|e| RuleConfigError::InvalidPattern {
                    component: component.to_string(),
                    property: property.to_string(),
                    pattern,
                    reason: e.to_string(),
                })
        }
        other => Err(RuleConfigError::UnknownCondition {
            component: component.to_string(),
            property: property.to_string(),
            condition: other.to_string(),
        }),
    }
}

const RULES_FILE_HEADER: &str = "\
# Dataflow Component Properties Rules
#
# This YAML file contains validation rules for dataflow pipeline components.
# Each component type has property rules with validation conditions and expected values.
#
# Supported validation conditions:
# - equals: Value must match exactly
# - str_not_empty: Must be a non-empty string
# - is_none: Value must be None/empty
# - regex_match: Value must match regular expression
#
# Rule structure:
# component_type:
#   property_name:
#     condition: validation_type
#     value: expected_value  # (optional)
";

/// Built-in rules for the four recognised dataflow component types
pub fn default_raw_rules() -> RawPropertyRules {
    let mut rules = RawPropertyRules::new();

    rules.insert(
        "oledb_source".to_string(),
        BTreeMap::from([
            ("AlwaysUseDefaultCodePage".to_string(), RawRule::new("equals", Some("false"))),
            ("SqlCommand".to_string(), RawRule::new("str_not_empty", None)),
            ("SqlCommandVariable".to_string(), RawRule::new("is_none", None)),
        ]),
    );
    rules.insert(
        "oracle_source".to_string(),
        BTreeMap::from([
            ("DefaultCodePage".to_string(), RawRule::new("equals", Some("1256"))),
            ("SqlCommand".to_string(), RawRule::new("str_not_empty", None)),
            ("BatchSize".to_string(), RawRule::new("equals", Some("100000"))),
        ]),
    );
    rules.insert(
        "oledb_destination".to_string(),
        BTreeMap::from([
            ("AlwaysUseDefaultCodePage".to_string(), RawRule::new("equals", Some("false"))),
            ("SqlCommand".to_string(), RawRule::new("is_none", None)),
            ("FastLoadOptions".to_string(), RawRule::new("is_none", None)),
        ]),
    );
    rules.insert(
        "multiple_hash".to_string(),
        BTreeMap::from([
            ("MultipleThreads".to_string(), RawRule::new("equals", Some("0"))),
            ("SafeNullHandling".to_string(), RawRule::new("equals", Some("1"))),
            ("IncludeMillsecond".to_string(), RawRule::new("equals", Some("1"))),
            ("HashType".to_string(), RawRule::new("equals", Some("6"))),
            ("HashOutputType".to_string(), RawRule::new("equals", Some("0"))),
        ]),
    );

    rules
}

impl PropertyRuleConfig {
    /// Built-in rule set
    pub fn builtin() -> Self {
        Self::from_raw(&default_raw_rules())
    }
}

/// Built-in rules rendered as a commented YAML document
pub fn default_rules_yaml() -> AuditResult<String> {
    let body = serde_yaml::to_string(&default_raw_rules())?;
    Ok(format!("{}\n{}", RULES_FILE_HEADER, body))
}

/// Write the built-in rules to `path` unless the file already exists.
///
/// Returns `true` when a new file was written.
pub fn ensure_rules_file(path: &Path) -> AuditResult<bool> {
    if path.exists() {
        return Ok(false);
    }
    let io_err = |source| AuditError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, default_rules_yaml()?).map_err(io_err)?;
    tracing::info!("Created default property rules file at {}", path.display());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_rules_compile_cleanly() {
        let config = PropertyRuleConfig::builtin();
        assert!(config.skipped().is_empty());
        assert_eq!(config.rules_for("multiple_hash").count(), 5);
        assert_eq!(config.rules_for("unknown_component").count(), 0);
    }

    #[test]
    fn test_unknown_condition_is_skipped_not_fatal() {
        let yaml = r#"
oledb_source:
  SqlCommand:
    condition: str_not_empty
  DefaultCodePage:
    condition: greater_than
    value: 10
"#;
        let config = PropertyRuleConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.rules_for("oledb_source").count(), 1);
        assert!(matches!(
            config.skipped(),
            [RuleConfigError::UnknownCondition { condition, .. }] if condition == "greater_than"
        ));
    }

    #[test]
    fn test_numeric_values_are_stringified() {
        let yaml = r#"
oracle_source:
  BatchSize:
    condition: equals
    value: 100000
"#;
        let config = PropertyRuleConfig::from_yaml_str(yaml).unwrap();
        let rule = config.rules_for("oracle_source").next().unwrap();
        assert_eq!(rule.predicate, Predicate::Equals("100000".to_string()));
    }

    #[test]
    fn test_missing_value_and_bad_pattern_are_skipped() {
        let yaml = r#"
oledb_destination:
  DefaultCodePage:
    condition: equals
  FastLoadOptions:
    condition: regex_match
    value: "TABLOCK("
"#;
        let config = PropertyRuleConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.rules_for("oledb_destination").count(), 0);
        assert_eq!(config.skipped().len(), 2);
    }

    #[test]
    fn test_default_yaml_round_trips_through_loader() {
        let yaml = default_rules_yaml().unwrap();
        assert!(yaml.starts_with("# Dataflow Component Properties Rules"));
        let config = PropertyRuleConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(config.component_types().count(), 4);
    }

    #[test]
    fn test_with_override_replaces_rule() {
        let config = PropertyRuleConfig::builtin().with_override(
            "oledb_destination",
            "DefaultCodePage",
            Predicate::Equals("1252".to_string()),
        );
        assert!(
            config
                .rules_for("oledb_destination")
                .any(|r| r.property == "DefaultCodePage")
        );
        assert!(
            !PropertyRuleConfig::builtin()
                .rules_for("oledb_destination")
                .any(|r| r.property == "DefaultCodePage")
        );
    }

    #[test]
    fn test_ensure_rules_file_writes_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config").join("property_rules.yml");

        assert!(ensure_rules_file(&path).unwrap());
        assert!(!ensure_rules_file(&path).unwrap());

        let config = PropertyRuleConfig::from_file(&path).unwrap();
        assert!(config.skipped().is_empty());
    }

    #[test]
    fn test_from_file_reads_utf16() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("property_rules.yml");
        let yaml = "oracle_source:\n  BatchSize:\n    condition: equals\n    value: 500\n";
        let mut bytes = vec![0xFF, 0xFE];
        bytes.extend(yaml.encode_utf16().flat_map(|u| u.to_le_bytes()));
        std::fs::write(&path, bytes).unwrap();

        let config = PropertyRuleConfig::from_file(&path).unwrap();
        let rule = config.rules_for("oracle_source").next().unwrap();
        assert_eq!(rule.predicate, Predicate::Equals("500".to_string()));
    }
}
