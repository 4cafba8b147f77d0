//! CLI command implementations

pub mod audit;
pub mod init_rules;
pub mod sql;

pub use audit::{AuditOptions, handle_audit, run_audit};
pub use init_rules::{DEFAULT_RULES_PATH, handle_init_rules};
pub use sql::{SqlOptions, build_sql_file, handle_sql};

use std::path::Path;

use crate::cli::error::CliError;
use crate::config::AuditConfig;
use crate::error::AuditError;
use crate::import::read_text_file;

/// Load `--config`, or the defaults, then fill database names from the environment
pub(crate) fn load_config(path: Option<&Path>) -> Result<AuditConfig, CliError> {
    let config = match path {
        Some(path) => AuditConfig::from_file(path)?,
        None => AuditConfig::default(),
    };
    Ok(config.with_env_defaults())
}

/// Read an optional text input, keeping read failures tied to their path
pub(crate) fn read_input(path: &Path) -> Result<String, CliError> {
    read_text_file(path).map_err(|err| match err {
        AuditError::Io { path, source } => CliError::FileReadError(path, source.to_string()),
        other => CliError::Audit(other),
    })
}
