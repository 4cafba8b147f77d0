//! SQL command implementation

use std::path::{Path, PathBuf};

use crate::cli::commands::{load_config, read_input};
use crate::cli::error::CliError;
use crate::cli::output::format_findings;
use crate::config::AuditConfig;
use crate::export::{SqlFile, SqlFileBuilder, StaticSchemaProvider};
use crate::import::PackageModelBuilder;
use crate::models::PackageModel;

/// Inputs of `package-auditor sql`
#[derive(Debug, Clone, Default)]
pub struct SqlOptions {
    pub package: PathBuf,
    pub config: Option<PathBuf>,
    /// Script holding the null-record inserts of dimension tables
    pub null_records: Option<PathBuf>,
    /// DDL of the warehouse table
    pub ddl: Option<PathBuf>,
    /// Write here instead of stdout
    pub output: Option<PathBuf>,
}

/// Build the consolidated script for one package
pub fn build_sql_file(options: &SqlOptions) -> Result<SqlFile, CliError> {
    let config = load_config(options.config.as_deref())?;
    let model = PackageModelBuilder::new().build_from_file(&options.package)?;
    sql_file_for(&model, &config, options.ddl.as_deref(), options.null_records.as_deref())
}

/// Script for an already loaded package, with the optional DDL and
/// null-record inputs read from disk
pub(crate) fn sql_file_for(
    model: &PackageModel,
    config: &AuditConfig,
    ddl: Option<&Path>,
    null_records: Option<&Path>,
) -> Result<SqlFile, CliError> {
    let mut provider = StaticSchemaProvider::new();
    if let Some(path) = ddl {
        provider = provider.with_definition(&config.schema, &model.table_name, read_input(path)?);
    }

    let mut builder = SqlFileBuilder::new(config, &provider)?;
    if let Some(path) = null_records {
        builder = builder.with_null_record_script(read_input(path)?);
    }
    Ok(builder.build(model))
}

/// Handle the sql command
pub fn handle_sql(options: &SqlOptions) -> Result<(), CliError> {
    let sql_file = build_sql_file(options)?;

    match &options.output {
        Some(path) => {
            std::fs::write(path, &sql_file.content)
                .map_err(|e| CliError::FileWriteError(path.clone(), e.to_string()))?;
            eprintln!("SQL script written to {}", path.display());
        }
        None => println!("{}", sql_file.content),
    }

    if !sql_file.findings.is_empty() {
        eprint!("{}", format_findings(&sql_file.findings));
    }
    if !sql_file.unrecognized.is_empty() {
        eprintln!(
            "\n⚠️  Unrecognized queries (emitted last): {}",
            sql_file.unrecognized.join(", ")
        );
    }
    Ok(())
}
