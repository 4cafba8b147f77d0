//! Property rule evaluation
//!
//! Severity is asymmetric: a present value that breaks its rule is a
//! warning, while a property that is missing from the component is only
//! informational ("blank"), since several configured properties are optional
//! placeholders. Properties without a configured rule are never checked.

use std::collections::BTreeMap;

use crate::config::{Predicate, PropertyRuleConfig};
use crate::models::{Finding, FindingCategory, Severity};

/// A rule outcome worth reporting
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub property: String,
    pub severity: Severity,
    pub message: String,
}

impl Violation {
    fn blank(property: &str) -> Self {
        Self {
            property: property.to_string(),
            severity: Severity::Info,
            message: format!("'{}' is blank in the component properties", property),
        }
    }

    fn wrong(property: &str, message: String) -> Self {
        Self {
            property: property.to_string(),
            severity: Severity::Warning,
            message,
        }
    }

    /// Attach the component the violation was found on
    pub fn into_finding(self, component: &str) -> Finding {
        Finding {
            severity: self.severity,
            category: FindingCategory::Property,
            subject: Some(component.to_string()),
            message: self.message,
        }
    }
}

/// Evaluates configured property rules against a component's properties
#[derive(Debug, Clone, Copy)]
pub struct PropertyRuleEngine<'a> {
    config: &'a PropertyRuleConfig,
}

impl<'a> PropertyRuleEngine<'a> {
    pub fn new(config: &'a PropertyRuleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &'a PropertyRuleConfig {
        self.config
    }

    /// Check `properties` against the rules for `component_type`.
    ///
    /// An empty property element counts as absent.
    pub fn evaluate(
        &self,
        component_type: &str,
        properties: &BTreeMap<String, String>,
    ) -> Vec<Violation> {
        let mut violations = Vec::new();

        for rule in self.config.rules_for(component_type) {
            let property = rule.property.as_str();
            let value = properties
                .get(property)
                .map(String::as_str)
                .filter(|v| !v.is_empty());

            let Some(value) = value else {
                if rule.predicate != Predicate::IsAbsent {
                    violations.push(Violation::blank(property));
                }
                continue;
            };

            let failure = match &rule.predicate {
                Predicate::Equals(expected) if value != expected.as_str() => Some(format!(
                    "Property {} should be {}, found {}",
                    property, expected, value
                )),
                Predicate::NonEmpty if value.trim().is_empty() => {
                    Some(format!("Property {} should be a non-empty string", property))
                }
                Predicate::IsAbsent => Some(format!(
                    "Property {} should be empty, found {}",
                    property, value
                )),
                Predicate::Matches(pattern) if !pattern.is_match(value) => Some(format!(
                    "Property {} should match '{}', found {}",
                    property,
                    pattern.as_str(),
                    value
                )),
                _ => None,
            };

            match failure {
                Some(message) => violations.push(Violation::wrong(property, message)),
                None => tracing::debug!(property, "Property complies"),
            }
        }

        violations
    }
}
