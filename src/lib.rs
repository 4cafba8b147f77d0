//! Package Auditor - Compliance audits for ETL package definitions
//!
//! Provides:
//! - Package XML parsing into a queryable model
//! - Convention checks (names, containers, SQL tasks, dataflow properties)
//! - Drift detection against a reference SQL script
//! - Extraction, ordering and formatting of embedded SQL into one script

pub mod config;
pub mod error;
pub mod export;
pub mod import;
pub mod models;
pub mod validation;
pub mod xml;

#[cfg(feature = "cli")]
pub mod cli;

// Re-export commonly used types
pub use config::{AuditConfig, PropertyRuleConfig};
pub use error::{AuditError, AuditResult};
pub use export::{
    NoSchemaProvider, SqlBeautifier, SqlClassifierOrderer, SqlExtractor, SqlFile, SqlFileBuilder,
    StaticSchemaProvider, TableSchemaProvider,
};
pub use import::{PackageModelBuilder, ReferenceScript, read_text_file};
pub use validation::{AuditReport, DataflowAnalyzer, PackageValidator, PropertyRuleEngine};

// Re-export models
pub use models::{Finding, FindingCategory, Findings, PackageKind, PackageModel, Severity, SqlQueryRecord};
pub use xml::{NodeId, XmlDocument};
