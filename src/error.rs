//! Error types for package audits
//!
//! Only conditions that abort a package's audit are errors. Compliance
//! deviations and single-item extraction problems are recorded as
//! [`Finding`](crate::models::Finding)s instead.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that halt the audit of one package
#[derive(Error, Debug)]
pub enum AuditError {
    /// The document is not well-formed XML
    #[error("XML parse error at position {position}: {message}")]
    XmlParse { position: u64, message: String },

    /// Required package structure is missing
    #[error("Malformed package: {0}")]
    MalformedPackage(String),

    /// The package name carries no recognised kind prefix
    #[error("Unknown package kind for '{name}': name must start with 'Fill_Dim' or 'Fill_Fact'")]
    UnknownPackageKind { name: String },

    /// The reference script targets a different table than the package
    #[error(
        "Reference script table mismatch: expected '{expected}', found {}",
        found.as_deref().map(|f| format!("'{f}'")).unwrap_or_else(|| "no 'Table Name:' header".to_string())
    )]
    SqlTableMismatch {
        expected: String,
        found: Option<String>,
    },

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failed to read an input file
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for audit operations
pub type AuditResult<T> = Result<T, AuditError>;

impl From<serde_yaml::Error> for AuditError {
    fn from(err: serde_yaml::Error) -> Self {
        AuditError::Config(err.to_string())
    }
}
