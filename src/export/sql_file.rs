//! Consolidated SQL script generation
//!
//! Assembles one reviewable script per package: the warehouse table DDL,
//! every extracted query in classification order under its section alias,
//! and for dimension packages the insert that seeds the null record.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use thiserror::Error;

use super::beautifier::SqlBeautifier;
use super::classifier::SqlClassifierOrderer;
use super::extractor::SqlExtractor;
use crate::config::AuditConfig;
use crate::error::AuditResult;
use crate::models::{FindingCategory, Findings, PackageKind, PackageModel};

/// Line separating the sections of the generated script
pub const SECTION_DIVIDER: &str =
    "---------------------------------------------------------------------------";

static STATEMENT_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*(?:INSERT\s+INTO\s|END\b)").unwrap());
static ANY_INSERT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*INSERT\s+INTO\s+([\w.\[\]]+)").unwrap());

/// Table definition lookup failures
#[derive(Error, Debug)]
pub enum SchemaProviderError {
    #[error("Schema lookup for {schema}.{table} failed: {message}")]
    Lookup {
        schema: String,
        table: String,
        message: String,
    },
}

/// Source of `CREATE TABLE` DDL for the warehouse table.
///
/// Implementations backed by a live database own their retry policy.
pub trait TableSchemaProvider {
    /// DDL for `schema.table`, or `None` when the table is unknown
    fn get_table_definition(
        &self,
        table: &str,
        schema: &str,
    ) -> Result<Option<String>, SchemaProviderError>;
}

/// Provider that never has a definition
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSchemaProvider;

impl TableSchemaProvider for NoSchemaProvider {
    fn get_table_definition(
        &self,
        _table: &str,
        _schema: &str,
    ) -> Result<Option<String>, SchemaProviderError> {
        Ok(None)
    }
}

/// Provider serving definitions from memory. Lookups ignore case.
#[derive(Debug, Clone, Default)]
pub struct StaticSchemaProvider {
    definitions: BTreeMap<(String, String), String>,
}

impl StaticSchemaProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_definition(
        mut self,
        schema: &str,
        table: &str,
        ddl: impl Into<String>,
    ) -> Self {
        self.definitions
            .insert((schema.to_lowercase(), table.to_lowercase()), ddl.into());
        self
    }
}

impl TableSchemaProvider for StaticSchemaProvider {
    fn get_table_definition(
        &self,
        table: &str,
        schema: &str,
    ) -> Result<Option<String>, SchemaProviderError> {
        Ok(self
            .definitions
            .get(&(schema.to_lowercase(), table.to_lowercase()))
            .cloned())
    }
}

/// The `INSERT INTO <table>` statement in a script.
///
/// The statement runs to its `;`, or, without one, to the next
/// `INSERT INTO` or `END` line or the end of the script. The table may be
/// schema-qualified or bracketed.
pub fn find_insert_statement(script: &str, table: &str) -> Option<String> {
    let escaped = regex::escape(table);
    let pattern = RegexBuilder::new(&format!(
        r"^\s*INSERT\s+INTO\s+(?:\[?\w+\]?\.)?\[?{}(?:\]|\b)",
        escaped
    ))
    .case_insensitive(true)
    .multi_line(true)
    .build()
    .ok()?;

    let Some(found) = pattern.find(script) else {
        tracing::warn!("INSERT INTO statement for table '{}' not found in SQL script", table);
        let tables: Vec<&str> = ANY_INSERT
            .captures_iter(script)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
            .collect();
        if !tables.is_empty() {
            tracing::debug!("Tables with INSERT statements: {}", tables.join(", "));
        }
        return None;
    };

    let rest = &script[found.end()..];
    let boundary = STATEMENT_BOUNDARY
        .find(rest)
        .map_or(rest.len(), |m| m.start());
    let end = match rest[..boundary].find(';') {
        Some(semicolon) => found.end() + semicolon + 1,
        None => found.end() + boundary,
    };

    Some(script[found.start()..end].trim().to_string())
}

/// Generated script plus what went wrong while producing it
#[derive(Debug, Clone, Default, Serialize)]
pub struct SqlFile {
    pub content: String,
    pub findings: Findings,
    /// Queries that matched no classification rule, emitted last
    pub unrecognized: Vec<String>,
}

/// Builds the consolidated SQL script for a package
pub struct SqlFileBuilder<'a> {
    config: &'a AuditConfig,
    schema_provider: &'a dyn TableSchemaProvider,
    classifier: SqlClassifierOrderer,
    beautifier: SqlBeautifier,
    null_record_script: Option<String>,
}

impl<'a> SqlFileBuilder<'a> {
    /// Fails when the configured classification list does not compile
    pub fn new(
        config: &'a AuditConfig,
        schema_provider: &'a dyn TableSchemaProvider,
    ) -> AuditResult<Self> {
        Ok(Self {
            config,
            schema_provider,
            classifier: SqlClassifierOrderer::new(config.classification_rules()?),
            beautifier: SqlBeautifier::new(),
            null_record_script: None,
        })
    }

    /// Script holding the null-record inserts for dimension tables
    pub fn with_null_record_script(mut self, script: impl Into<String>) -> Self {
        self.null_record_script = Some(script.into());
        self
    }

    pub fn build(&self, model: &PackageModel) -> SqlFile {
        let extracted = SqlExtractor::new(self.config).extract(model);
        let mut findings = extracted.findings;
        let mut lines: Vec<String> = Vec::new();
        let warehouse = self.config.warehouse_database.as_deref();

        tracing::info!("Fetching table creation DDL...");
        match self
            .schema_provider
            .get_table_definition(&model.table_name, &self.config.schema)
        {
            Ok(Some(ddl)) => {
                open_section(&mut lines, "Create DW Table", warehouse);
                lines.push(ddl.trim_end().to_string());
                lines.push("\n".to_string());
            }
            Ok(None) => findings.warn(
                FindingCategory::Extraction,
                Some(&model.table_name),
                format!(
                    "No table definition for {}.{}, DDL section omitted",
                    self.config.schema, model.table_name
                ),
            ),
            Err(e) => findings.warn(
                FindingCategory::Extraction,
                Some(&model.table_name),
                format!("{}, DDL section omitted", e),
            ),
        }

        let (ordered, unrecognized) = self.classifier.order_records(&extracted.records);
        for record in ordered {
            let classification = self.classifier.classify(&record.name);
            let database = classification
                .database
                .as_deref()
                .or(record.database_context.as_deref());

            open_section(&mut lines, &format!("'{}'", classification.alias), database);
            lines.push(self.beautify_or_raw(&record.name, &record.body, &mut findings));
            lines.push("\n".to_string());
            tracing::debug!(query = %record.name, "Query section written");
        }

        if model.kind() == PackageKind::Dim {
            match &self.null_record_script {
                Some(script) => match find_insert_statement(script, &model.table_name) {
                    Some(statement) => {
                        open_section(&mut lines, "Insert Record for Null Values", warehouse);
                        lines.push(self.beautify_or_raw("Insert Record for Null Values", &statement, &mut findings));
                    }
                    None => findings.warn(
                        FindingCategory::Extraction,
                        Some(&model.table_name),
                        "No null-record INSERT statement found for the table",
                    ),
                },
                None => tracing::debug!("No null-record script supplied"),
            }
        }

        SqlFile {
            content: lines.join("\n"),
            findings,
            unrecognized: unrecognized.into_iter().map(str::to_string).collect(),
        }
    }

    fn beautify_or_raw(&self, name: &str, body: &str, findings: &mut Findings) -> String {
        match self.beautifier.beautify(body.trim()) {
            Ok(formatted) => formatted,
            Err(e) => {
                findings.warn(
                    FindingCategory::Extraction,
                    Some(name),
                    format!("Query emitted unformatted: {}", e),
                );
                body.trim().to_string()
            }
        }
    }
}

fn open_section(lines: &mut Vec<String>, title: &str, database: Option<&str>) {
    lines.push(SECTION_DIVIDER.to_string());
    lines.push(format!("-- {}", title));
    if let Some(database) = database {
        lines.push(format!("USE {}\nGO\n", database));
    }
}
