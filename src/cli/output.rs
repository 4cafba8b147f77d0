//! Output formatting for CLI

use crate::cli::error::CliError;
use crate::models::{Findings, Severity};
use crate::validation::AuditReport;

/// Report rendering selected with `--format`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Render a report in the selected format
pub fn format_report(report: &AuditReport, format: OutputFormat) -> Result<String, CliError> {
    match format {
        OutputFormat::Text => Ok(format_text_report(report)),
        OutputFormat::Json => format_json_report(report),
    }
}

/// Human-readable report, findings grouped by severity
pub fn format_text_report(report: &AuditReport) -> String {
    let package = &report.package;
    let mut output = String::new();

    output.push_str(&format!("Package: {}\n", package.name));
    output.push_str(&format!("  Kind: {}\n", package.kind));
    output.push_str(&format!("  Table: {}\n", package.table_name));
    if let Some(version) = &package.version {
        output.push_str(&format!("  Version: {}\n", version));
    }
    if let Some(created) = &package.creation_date {
        output.push_str(&format!("  Created: {}\n", created));
    }
    if let Some(creator) = &package.creator {
        output.push_str(&format!("  Creator: {}\n", creator));
    }
    output.push_str(&format!(
        "  Load: {}\n",
        if report.incremental { "incremental" } else { "full" }
    ));
    output.push_str(&format!("  Containers: {}\n", package.containers.join(", ")));

    output.push_str(&format_findings(&report.findings));

    if !report.sql_findings.is_empty() {
        output.push_str("\nSQL script (not counted for compliance):");
        output.push_str(&format_findings(&report.sql_findings));
    }

    if report.is_compliant() {
        output.push_str("\n✅ All checks passed!\n");
    } else {
        output.push_str(&format!(
            "\n⚠️  {} problem(s) found\n",
            report.findings.problem_count()
        ));
    }

    output
}

/// Findings listed under one heading per severity, most severe first
pub fn format_findings(findings: &Findings) -> String {
    let mut output = String::new();
    for (severity, heading) in [
        (Severity::Error, "Errors"),
        (Severity::Warning, "Warnings"),
        (Severity::Info, "Info"),
    ] {
        let group: Vec<_> = findings.with_severity(severity).collect();
        if group.is_empty() {
            continue;
        }
        output.push_str(&format!("\n{} ({}):\n", heading, group.len()));
        for finding in group {
            match &finding.subject {
                Some(subject) => output.push_str(&format!(
                    "  - [{}] {}: {}\n",
                    finding.category, subject, finding.message
                )),
                None => output.push_str(&format!("  - [{}] {}\n", finding.category, finding.message)),
            }
        }
    }
    output
}

pub fn format_json_report(report: &AuditReport) -> Result<String, CliError> {
    serde_json::to_string_pretty(report).map_err(|e| CliError::Serialization(e.to_string()))
}
