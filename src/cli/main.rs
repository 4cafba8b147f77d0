//! CLI entry point for `package-auditor`.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use package_auditor::cli::OutputFormat;
use package_auditor::cli::commands::{
    AuditOptions, DEFAULT_RULES_PATH, SqlOptions, handle_audit, handle_init_rules, handle_sql,
};
use tracing_subscriber::EnvFilter;

/// Exit status of an audit that completed with warnings or errors
const NON_COMPLIANT_EXIT_CODE: i32 = 2;

#[derive(Parser)]
#[command(
    name = "package-auditor",
    version,
    about = "Audit ETL packages against framework conventions and consolidate their SQL"
)]
struct Cli {
    /// Log progress at info level (overridden by RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Audit a package against the conventions and a reference script
    Audit {
        /// Package file (.dtsx)
        package: PathBuf,

        /// Reference SQL script for the package's table
        #[arg(long)]
        reference: PathBuf,

        /// Property rules file (YAML); the built-in rules when omitted
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Audit configuration file (YAML)
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Include the consolidated SQL script in the report
        #[arg(long)]
        with_sql: bool,

        /// DDL of the warehouse table, used with --with-sql
        #[arg(long, requires = "with_sql")]
        ddl: Option<PathBuf>,

        /// Script with the null-record inserts, used with --with-sql
        #[arg(long, requires = "with_sql")]
        null_records: Option<PathBuf>,
    },

    /// Write the consolidated SQL script of a package
    Sql {
        /// Package file (.dtsx)
        package: PathBuf,

        /// Audit configuration file (YAML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Script with the null-record inserts of dimension tables
        #[arg(long)]
        null_records: Option<PathBuf>,

        /// DDL of the warehouse table
        #[arg(long)]
        ddl: Option<PathBuf>,

        /// Output file; stdout when omitted
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Write the built-in property rules to a file
    InitRules {
        #[arg(long, default_value = DEFAULT_RULES_PATH)]
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Audit {
            package,
            reference,
            rules,
            config,
            format,
            with_sql,
            ddl,
            null_records,
        } => {
            let compliant = handle_audit(&AuditOptions {
                package,
                reference,
                rules,
                config,
                format,
                with_sql,
                ddl,
                null_records,
            })?;
            tracing::info!(compliant, "Audit finished");
            if !compliant {
                std::process::exit(NON_COMPLIANT_EXIT_CODE);
            }
        }
        Command::Sql {
            package,
            config,
            null_records,
            ddl,
            output,
        } => handle_sql(&SqlOptions {
            package,
            config,
            null_records,
            ddl,
            output,
        })?,
        Command::InitRules { path } => handle_init_rules(&path)?,
    }

    Ok(())
}
