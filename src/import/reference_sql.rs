//! Reference SQL script parsing
//!
//! A reference script is plain SQL split into sections by lines of three or
//! more hyphens. Each section starts with a `--<section name>` comment line;
//! `USE <db>` lines are dropped from section bodies. Somewhere in the script a
//! `Table Name: <identifier>` comment names the table the script belongs to.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::error::{AuditError, AuditResult};

static SECTION_DELIMITER: Lazy<Regex> = Lazy::new(|| Regex::new(r"-{3,}\r?\n").unwrap());
static SECTION_HEADER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^--(.*?)(?:\r?\n|$)").unwrap());
static USE_STATEMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*USE\s+.*\s*;?\s*(?:\n|$)").unwrap());
static TABLE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"Table Name:\s*(\w+)").unwrap());

/// One named section of a reference script
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceSection {
    pub name: String,
    /// Section SQL without its header line and `USE` directives
    pub body: String,
}

/// Parsed reference script
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReferenceScript {
    table_name: Option<String>,
    sections: Vec<ReferenceSection>,
}

impl ReferenceScript {
    pub fn parse(content: &str) -> Self {
        let table_name = TABLE_NAME
            .captures(content)
            .map(|caps| caps[1].to_string());

        let mut sections: Vec<ReferenceSection> = Vec::new();
        for raw in SECTION_DELIMITER.split(content) {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let Some(header) = SECTION_HEADER.captures(raw) else {
                tracing::debug!("Skipping reference section without a header comment");
                continue;
            };
            let name = header[1].trim().to_string();
            let body = raw[header[0].len()..].trim();
            let body = USE_STATEMENT.replace_all(body, "").trim().to_string();

            // A later section with the same name replaces the earlier one
            match sections.iter_mut().find(|s| s.name == name) {
                Some(existing) => existing.body = body,
                None => sections.push(ReferenceSection { name, body }),
            }
        }

        tracing::info!(sections = sections.len(), "Parsed reference script");
        Self {
            table_name,
            sections,
        }
    }

    /// Table declared by the `Table Name:` header, if any
    pub fn table_name(&self) -> Option<&str> {
        self.table_name.as_deref()
    }

    /// Check the declared table against the package's table.
    ///
    /// A missing header is treated as a mismatch.
    pub fn ensure_table(&self, expected: &str) -> AuditResult<()> {
        match self.table_name() {
            Some(found) if found == expected => {
                tracing::info!(table = found, "Reference script matches package table");
                Ok(())
            }
            found => Err(AuditError::SqlTableMismatch {
                expected: expected.to_string(),
                found: found.map(str::to_string),
            }),
        }
    }

    pub fn section(&self, name: &str) -> Option<&str> {
        self.sections
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.body.as_str())
    }

    pub fn sections(&self) -> &[ReferenceSection] {
        &self.sections
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = "-- Table Name: DimCustomer\n\
---------------------------------------------------------------------------\n\
-- Stage Initialization\n\
USE DWStage\n\
GO\n\
CREATE TABLE DimCustomerStage (Id INT);\n\
---------------------------------------------------------------------------\n\
-- Update IsExists\n\
use DWStage;\n\
UPDATE s SET IsExists = 1 FROM DimCustomerStage s;\n";

    #[test]
    fn test_sections_and_table_header() {
        let script = ReferenceScript::parse(SCRIPT);
        assert_eq!(script.table_name(), Some("DimCustomer"));
        assert_eq!(
            script.section("Stage Initialization"),
            Some("GO\nCREATE TABLE DimCustomerStage (Id INT);")
        );
        assert_eq!(
            script.section("Update IsExists"),
            Some("UPDATE s SET IsExists = 1 FROM DimCustomerStage s;")
        );
        assert_eq!(script.section("Table Name: DimCustomer"), Some(""));
    }

    #[test]
    fn test_ensure_table() {
        let script = ReferenceScript::parse(SCRIPT);
        assert!(script.ensure_table("DimCustomer").is_ok());

        let err = script.ensure_table("DimProduct").unwrap_err();
        assert!(matches!(
            err,
            AuditError::SqlTableMismatch { ref expected, found: Some(ref found) }
                if expected == "DimProduct" && found == "DimCustomer"
        ));
    }

    #[test]
    fn test_missing_header_is_mismatch() {
        let script = ReferenceScript::parse("-- Something\nSELECT 1");
        assert!(matches!(
            script.ensure_table("DimCustomer"),
            Err(AuditError::SqlTableMismatch { found: None, .. })
        ));
    }

    #[test]
    fn test_crlf_delimiters() {
        let script = ReferenceScript::parse("-- A\r\nSELECT 1\r\n-----\r\n-- B\r\nSELECT 2\r\n");
        assert_eq!(script.sections().len(), 2);
        assert_eq!(script.section("B"), Some("SELECT 2"));
    }
}
