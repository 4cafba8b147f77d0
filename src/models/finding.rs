//! Audit findings

use serde::{Deserialize, Serialize};
use std::fmt;

/// Finding severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// What part of the package a finding is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingCategory {
    /// Container layout, variables, parameters
    Structure,
    /// Package, container, task or component names
    Naming,
    /// Component property rules
    Property,
    /// Destination columns without an upstream input
    ColumnMapping,
    /// Source columns not selected by a transform
    ColumnSelection,
    /// Embedded SQL differing from the reference script
    SqlDrift,
    /// A query or column block could not be read
    Extraction,
    /// Rule or catalog configuration problems
    Configuration,
}

impl fmt::Display for FindingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FindingCategory::Structure => "structure",
            FindingCategory::Naming => "naming",
            FindingCategory::Property => "property",
            FindingCategory::ColumnMapping => "column_mapping",
            FindingCategory::ColumnSelection => "column_selection",
            FindingCategory::SqlDrift => "sql_drift",
            FindingCategory::Extraction => "extraction",
            FindingCategory::Configuration => "configuration",
        };
        write!(f, "{}", label)
    }
}

/// A single audit observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub category: FindingCategory,
    /// Component, container or query the finding refers to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub message: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subject {
            Some(subject) => write!(
                f,
                "[{}] {} '{}': {}",
                self.severity, self.category, subject, self.message
            ),
            None => write!(f, "[{}] {}: {}", self.severity, self.category, self.message),
        }
    }
}

/// Ordered list of findings.
///
/// Every finding pushed here is also emitted as a tracing event at the
/// matching level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Findings(Vec<Finding>);

impl Findings {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, finding: Finding) {
        match finding.severity {
            Severity::Info => tracing::info!(
                category = %finding.category,
                subject = finding.subject.as_deref().unwrap_or(""),
                "{}",
                finding.message
            ),
            Severity::Warning => tracing::warn!(
                category = %finding.category,
                subject = finding.subject.as_deref().unwrap_or(""),
                "{}",
                finding.message
            ),
            Severity::Error => tracing::error!(
                category = %finding.category,
                subject = finding.subject.as_deref().unwrap_or(""),
                "{}",
                finding.message
            ),
        }
        self.0.push(finding);
    }

    pub fn info(
        &mut self,
        category: FindingCategory,
        subject: Option<&str>,
        message: impl Into<String>,
    ) {
        self.record(Severity::Info, category, subject, message);
    }

    pub fn warn(
        &mut self,
        category: FindingCategory,
        subject: Option<&str>,
        message: impl Into<String>,
    ) {
        self.record(Severity::Warning, category, subject, message);
    }

    pub fn error(
        &mut self,
        category: FindingCategory,
        subject: Option<&str>,
        message: impl Into<String>,
    ) {
        self.record(Severity::Error, category, subject, message);
    }

    fn record(
        &mut self,
        severity: Severity,
        category: FindingCategory,
        subject: Option<&str>,
        message: impl Into<String>,
    ) {
        self.push(Finding {
            severity,
            category,
            subject: subject.map(str::to_string),
            message: message.into(),
        });
    }

    pub fn extend(&mut self, other: Findings) {
        self.0.extend(other.0);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Finding> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Findings at exactly the given severity
    pub fn with_severity(&self, severity: Severity) -> impl Iterator<Item = &Finding> {
        self.0.iter().filter(move |f| f.severity == severity)
    }

    /// Findings in the given category
    pub fn in_category(&self, category: FindingCategory) -> impl Iterator<Item = &Finding> {
        self.0.iter().filter(move |f| f.category == category)
    }

    /// Number of warning-or-worse findings
    pub fn problem_count(&self) -> usize {
        self.0
            .iter()
            .filter(|f| f.severity >= Severity::Warning)
            .count()
    }

    pub fn into_vec(self) -> Vec<Finding> {
        self.0
    }
}

impl<'a> IntoIterator for &'a Findings {
    type Item = &'a Finding;
    type IntoIter = std::slice::Iter<'a, Finding>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
