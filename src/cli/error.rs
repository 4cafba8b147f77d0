//! CLI error type

use std::path::PathBuf;
use thiserror::Error;

use crate::error::AuditError;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to read {0}: {1}")]
    FileReadError(PathBuf, String),

    #[error("Failed to write {0}: {1}")]
    FileWriteError(PathBuf, String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}
