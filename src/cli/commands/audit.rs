//! Audit command implementation

use std::path::PathBuf;

use crate::cli::commands::sql::sql_file_for;
use crate::cli::commands::{load_config, read_input};
use crate::cli::error::CliError;
use crate::cli::output::{OutputFormat, format_report};
use crate::config::PropertyRuleConfig;
use crate::import::{PackageModelBuilder, ReferenceScript};
use crate::validation::{AuditReport, PackageValidator};

/// Inputs of `package-auditor audit`
#[derive(Debug, Clone)]
pub struct AuditOptions {
    pub package: PathBuf,
    pub reference: PathBuf,
    pub rules: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub format: OutputFormat,
    /// Attach the consolidated SQL script to the report
    pub with_sql: bool,
    /// DDL of the warehouse table, used with `with_sql`
    pub ddl: Option<PathBuf>,
    /// Null-record insert script, used with `with_sql`
    pub null_records: Option<PathBuf>,
}

/// Run one package audit and build its report
pub fn run_audit(options: &AuditOptions) -> Result<AuditReport, CliError> {
    let config = load_config(options.config.as_deref())?;
    let rules = match &options.rules {
        Some(path) => PropertyRuleConfig::from_file(path)?,
        None => PropertyRuleConfig::builtin(),
    };

    let model = PackageModelBuilder::new().build_from_file(&options.package)?;
    let reference = ReferenceScript::parse(&read_input(&options.reference)?);

    let report = PackageValidator::new(&rules).validate(&model, &reference)?;
    if !options.with_sql {
        return Ok(report);
    }

    let sql_file = sql_file_for(&model, &config, options.ddl.as_deref(), options.null_records.as_deref())?;
    Ok(report.with_sql(sql_file.content, sql_file.findings))
}

/// Handle the audit command; returns whether the package is compliant
pub fn handle_audit(options: &AuditOptions) -> Result<bool, CliError> {
    let report = run_audit(options)?;
    println!("{}", format_report(&report, options.format)?);
    Ok(report.is_compliant())
}
