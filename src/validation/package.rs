//! Package-level audit
//!
//! Runs every check for one package in a fixed order and gathers the
//! findings into an [`AuditReport`]. Only a reference script for a different
//! table aborts the audit; everything else is reported.

use serde::Serialize;

use super::dataflow::DataflowAnalyzer;
use super::similarity::similarity;
use crate::config::patterns::{
    CLUSTERED_INDEX_TASK, EXTRACT_TRANSFORM_OLTP, FACT_DYNAMIC_TASKS, INCREMENTAL_MARKER,
    INSERT_PACKAGE_LOG_TASK, LOAD_DATA, STAGE_INITIALIZATION, UPDATE_CONFIG_INSERT_LOG,
    UPDATE_IS_EXISTS_TASK, UPDATE_TABLE_TASK,
};
use crate::config::{PatternCatalog, Predicate, PropertyRuleConfig};
use crate::error::AuditResult;
use crate::import::{PIPELINE_EXECUTABLE, ReferenceScript, SEQUENCE_EXECUTABLE, SQL_TASK_EXECUTABLE};
use crate::models::{ExecutableInfo, FindingCategory, Findings, PackageKind, PackageModel};
use crate::xml::{DTS_NAMESPACE, NodeId, SQLTASK_NAMESPACE};

/// Section of the reference script holding the stage table DDL
pub const STAGE_INITIALIZATION_SECTION: &str = "Stage Initialization";

/// Package metadata carried into the report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackageSummary {
    pub name: String,
    pub table_name: String,
    pub kind: PackageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    pub containers: Vec<String>,
}

impl From<&PackageModel> for PackageSummary {
    fn from(model: &PackageModel) -> Self {
        Self {
            name: model.name.clone(),
            table_name: model.table_name.clone(),
            kind: model.kind(),
            version: model.version.clone(),
            creation_date: model.creation_date.clone(),
            creator: model.creator.clone(),
            containers: model.containers.iter().cloned().collect(),
        }
    }
}

/// Outcome of a package audit
#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub package: PackageSummary,
    pub incremental: bool,
    pub findings: Findings,
    /// Consolidated SQL script, when one was generated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    /// Problems met while generating the script. They degrade the script
    /// only and never count against compliance.
    #[serde(skip_serializing_if = "Findings::is_empty")]
    pub sql_findings: Findings,
}

impl AuditReport {
    /// No warning or error findings
    pub fn is_compliant(&self) -> bool {
        self.findings.problem_count() == 0
    }

    pub fn with_sql(mut self, sql: impl Into<String>, findings: Findings) -> Self {
        self.sql = Some(sql.into());
        self.sql_findings = findings;
        self
    }
}

/// Audits a package against the framework conventions and a reference script
pub struct PackageValidator<'a> {
    rules: &'a PropertyRuleConfig,
}

impl<'a> PackageValidator<'a> {
    pub fn new(rules: &'a PropertyRuleConfig) -> Self {
        Self { rules }
    }

    /// Audit `model` against `reference`.
    ///
    /// Fails only with [`AuditError::SqlTableMismatch`](crate::error::AuditError::SqlTableMismatch)
    /// when the reference script belongs to another table.
    pub fn validate(&self, model: &PackageModel, reference: &ReferenceScript) -> AuditResult<AuditReport> {
        tracing::info!(package = %model.name, kind = %model.kind(), "Starting package validation");
        reference.ensure_table(&model.table_name)?;

        let mut findings = Findings::new();
        for skipped in self.rules.skipped() {
            findings.info(FindingCategory::Configuration, None, format!("Rule skipped: {}", skipped));
        }

        if !PatternCatalog::package_name(model.kind()).is_match(&model.name) {
            findings.warn(FindingCategory::Naming, Some(&model.name), "Invalid package name");
        }

        let incremental = model.components.iter().any(|c| INCREMENTAL_MARKER.is_match(&c.name));
        if incremental {
            tracing::info!("Package uses incremental loading pattern");
        }

        self.check_containers(model, incremental, &mut findings);
        self.check_variables(model, incremental, &mut findings);
        self.check_sql_tasks(model, reference, incremental, &mut findings);
        self.check_dataflows(model, &mut findings);

        tracing::info!(
            findings = findings.len(),
            problems = findings.problem_count(),
            "Package validation completed"
        );
        Ok(AuditReport {
            package: PackageSummary::from(model),
            incremental,
            findings,
            sql: None,
            sql_findings: Findings::new(),
        })
    }

    fn check_containers(&self, model: &PackageModel, incremental: bool, findings: &mut Findings) {
        let all = PatternCatalog::expected_containers(model.kind());
        for container in &model.containers {
            tracing::info!(container = %container, "Container found");
        }

        let missing: Vec<&str> = all
            .iter()
            .filter(|p| incremental || !PatternCatalog::is_incremental_only(p))
            .filter(|p| !model.containers.iter().any(|c| p.is_match(c)))
            .map(|p| p.as_str())
            .collect();
        if !missing.is_empty() {
            findings.warn(
                FindingCategory::Structure,
                None,
                format!("Missing required containers: {}", missing.join(", ")),
            );
        }

        let extra: Vec<&str> = model
            .containers
            .iter()
            .filter(|c| !PatternCatalog::matches_any(c, all))
            .map(String::as_str)
            .collect();
        if !extra.is_empty() {
            findings.warn(
                FindingCategory::Structure,
                None,
                format!("Unexpected containers: {}", extra.join(", ")),
            );
        }

        if missing.is_empty() && extra.is_empty() {
            tracing::info!("All framework containers are available");
        }
    }

    fn check_variables(&self, model: &PackageModel, incremental: bool, findings: &mut Findings) {
        if !model.variables.is_empty() && !incremental {
            findings.warn(
                FindingCategory::Structure,
                None,
                format!("{} variable(s) found on a non-incremental package", model.variables.len()),
            );
        }
        if !model.parameters.is_empty() {
            findings.warn(
                FindingCategory::Structure,
                None,
                format!("{} package parameter(s) found", model.parameters.len()),
            );
        }
    }

    fn check_sql_tasks(
        &self,
        model: &PackageModel,
        reference: &ReferenceScript,
        incremental: bool,
        findings: &mut Findings,
    ) {
        let table = model.table_name.as_str();

        for container in model.components_of_type(SEQUENCE_EXECUTABLE) {
            let name = container.name.as_str();
            let tasks: Vec<&ExecutableInfo> = direct_children(model, container)
                .filter(|c| c.executable_type == SQL_TASK_EXECUTABLE)
                .collect();

            if STAGE_INITIALIZATION.is_match(name) {
                match model
                    .document()
                    .find_descendant(container.node, |id| is_sql_task_data(model, id))
                {
                    Some(data) => compare_with_reference(
                        model,
                        name,
                        data,
                        reference,
                        STAGE_INITIALIZATION_SECTION,
                        findings,
                    ),
                    None => findings.warn(FindingCategory::SqlDrift, Some(name), "No SQL task found in container"),
                }
                continue;
            }

            if let Some(patterns) = PatternCatalog::task_names_for_container(name) {
                for task in &tasks {
                    if !PatternCatalog::matches_any(&task.name, patterns) {
                        findings.warn(FindingCategory::Naming, Some(&task.name), "Invalid SQL task name");
                    }
                }
            }

            let expected: Vec<(&regex::Regex, String)> = if EXTRACT_TRANSFORM_OLTP.is_match(name) {
                vec![
                    (&*CLUSTERED_INDEX_TASK, format!("Create Clustered Index on {}Stage", table)),
                    (&*UPDATE_IS_EXISTS_TASK, "Update IsExists".to_string()),
                ]
            } else if LOAD_DATA.is_match(name) {
                for task in &tasks {
                    if !task.name.contains(table) {
                        findings.warn(
                            FindingCategory::Naming,
                            Some(&task.name),
                            format!("SQL task name must include '{}'", table),
                        );
                    }
                }
                vec![(&*UPDATE_TABLE_TASK, format!("Update {}", table))]
            } else if UPDATE_CONFIG_INSERT_LOG.is_match(name) {
                vec![(&*INSERT_PACKAGE_LOG_TASK, "Insert PackageLog".to_string())]
            } else {
                Vec::new()
            };

            for (pattern, section) in expected {
                let matching: Vec<&&ExecutableInfo> = tasks.iter().filter(|t| pattern.is_match(&t.name)).collect();
                if matching.is_empty() {
                    findings.warn(
                        FindingCategory::SqlDrift,
                        Some(name),
                        format!("No '{}' SQL task found in container", section),
                    );
                }
                for task in matching {
                    self.compare_task(model, task, reference, &section, findings);
                }
            }
        }

        if model.kind() == PackageKind::Fact {
            for (label, pattern) in FACT_DYNAMIC_TASKS.iter() {
                let matching: Vec<&ExecutableInfo> = model
                    .components_of_type(SQL_TASK_EXECUTABLE)
                    .filter(|t| pattern.is_match(&t.name))
                    .collect();
                if matching.is_empty() && incremental {
                    findings.warn(
                        FindingCategory::SqlDrift,
                        None,
                        format!("No '{}' SQL task found", label),
                    );
                }
                for task in matching {
                    // the task's own section, else the generic one
                    let section = if reference.section(&task.name).is_some() { task.name.as_str() } else { *label };
                    self.compare_task(model, task, reference, section, findings);
                }
            }
        }
    }

    fn compare_task(
        &self,
        model: &PackageModel,
        task: &ExecutableInfo,
        reference: &ReferenceScript,
        section: &str,
        findings: &mut Findings,
    ) {
        match model
            .document()
            .find_descendant(task.node, |id| is_sql_task_data(model, id))
        {
            Some(data) => compare_with_reference(model, &task.name, data, reference, section, findings),
            None => findings.warn(
                FindingCategory::Extraction,
                Some(&task.name),
                "SQL task has no SqlTaskData element",
            ),
        }
    }

    fn check_dataflows(&self, model: &PackageModel, findings: &mut Findings) {
        let mut pipelines: Vec<(&ExecutableInfo, Vec<String>)> = model
            .components_of_type(PIPELINE_EXECUTABLE)
            .map(|p| (p, location(model, p)))
            .collect();
        // stable: OLTP extraction first, then loading, then the rest
        pipelines.sort_by_key(|(_, segments)| {
            if segments.iter().any(|s| EXTRACT_TRANSFORM_OLTP.is_match(s)) {
                0
            } else if segments.iter().any(|s| LOAD_DATA.is_match(s)) {
                1
            } else {
                2
            }
        });

        let load_rules = self.rules.with_override(
            "oledb_destination",
            "DefaultCodePage",
            Predicate::Equals("1252".to_string()),
        );

        for (dataflow, segments) in pipelines {
            let document = model.document();
            let Some(pipeline) = document.find_descendant(dataflow.node, |id| document.local_name(id) == "pipeline") else {
                findings.warn(FindingCategory::Structure, Some(&dataflow.name), "Dataflow has no pipeline element");
                continue;
            };

            let rules = if segments.iter().any(|s| LOAD_DATA.is_match(s)) {
                &load_rules
            } else {
                self.rules
            };
            tracing::info!(dataflow = %dataflow.name, "Reviewing dataflow");
            findings.extend(DataflowAnalyzer::new(rules, &model.table_name).analyze(document, pipeline));
        }
    }
}

fn is_sql_task_data(model: &PackageModel, id: NodeId) -> bool {
    model.document().is_element(id, SQLTASK_NAMESPACE, "SqlTaskData")
}

/// Executables directly inside `container`'s `DTS:Executables`
fn direct_children<'m>(
    model: &'m PackageModel,
    container: &'m ExecutableInfo,
) -> impl Iterator<Item = &'m ExecutableInfo> + 'm {
    let document = model.document();
    model.components.iter().filter(move |c| {
        document
            .parent(c.node)
            .filter(|&p| document.is_element(p, DTS_NAMESPACE, "Executables"))
            .and_then(|p| document.parent(p))
            == Some(container.node)
    })
}

/// Container names an executable sits in, outermost first.
///
/// Taken from the `refId` path when present, else from the enclosing
/// executables.
fn location(model: &PackageModel, executable: &ExecutableInfo) -> Vec<String> {
    if let Some(ref_id) = &executable.ref_id {
        return ref_id.split('\\').map(str::to_string).collect();
    }

    let document = model.document();
    let mut segments = Vec::new();
    let mut current = document.parent(executable.node);
    while let Some(id) = current {
        if document.is_element(id, DTS_NAMESPACE, "Executable")
            && let Some(name) = document.attr_ns(id, DTS_NAMESPACE, "ObjectName")
        {
            segments.push(name.to_string());
        }
        current = document.parent(id);
    }
    segments.reverse();
    segments
}

fn compare_with_reference(
    model: &PackageModel,
    subject: &str,
    task_data: NodeId,
    reference: &ReferenceScript,
    section: &str,
    findings: &mut Findings,
) {
    let Some(statement) = model
        .document()
        .attr_ns(task_data, SQLTASK_NAMESPACE, "SqlStatementSource")
    else {
        findings.warn(FindingCategory::Extraction, Some(subject), "SQL task has no statement source");
        return;
    };
    let Some(expected) = reference.section(section) else {
        findings.warn(
            FindingCategory::SqlDrift,
            Some(subject),
            format!("Reference section '{}' not found", section),
        );
        return;
    };

    tracing::debug!(subject, section, "Comparing queries");
    let percentage = similarity(statement, expected);
    if percentage == 100.0 {
        findings.info(FindingCategory::SqlDrift, Some(subject), "The queries are identical");
    } else {
        findings.warn(
            FindingCategory::SqlDrift,
            Some(subject),
            format!("The queries are {:.2}% similar to reference section '{}'", percentage, section),
        );
    }
}
