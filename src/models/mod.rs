//! Models for package audits

pub mod finding;
pub mod package;
pub mod query;

pub use finding::{Finding, FindingCategory, Findings, Severity};
pub use package::{
    ExecutableInfo, PACKAGE_NAME_PREFIX, PackageKind, PackageModel, Parameter, Variable,
    connection_key,
};
pub use query::SqlQueryRecord;
