//! Package validation
//!
//! - Text similarity between package SQL and the reference script
//! - Property rule evaluation for dataflow components
//! - Dataflow column and naming analysis
//! - The package-level audit tying them together

pub mod dataflow;
pub mod package;
pub mod rules;
pub mod similarity;

pub use dataflow::{ColumnMap, ComponentKind, DataflowAnalyzer, DataflowComponent, SourceState};
pub use package::{AuditReport, PackageSummary, PackageValidator, STAGE_INITIALIZATION_SECTION};
pub use rules::{PropertyRuleEngine, Violation};
pub use similarity::{normalize, similarity};
