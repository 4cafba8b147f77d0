//! Package model builder
//!
//! Walks a parsed package document once and seals the result into a
//! [`PackageModel`].

use chrono::NaiveDateTime;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::error::{AuditError, AuditResult};
use crate::import::text::read_text_file;
use crate::models::package::PackageParts;
use crate::models::{ExecutableInfo, PackageKind, PackageModel, Parameter, Variable, connection_key};
use crate::xml::{DTS_NAMESPACE, NodeId, XmlDocument};

/// Executable type of sequence containers
pub const SEQUENCE_EXECUTABLE: &str = "STOCK:SEQUENCE";
/// Executable type of Execute SQL tasks
pub const SQL_TASK_EXECUTABLE: &str = "Microsoft.ExecuteSQLTask";
/// Executable type of dataflow tasks
pub const PIPELINE_EXECUTABLE: &str = "Microsoft.Pipeline";

const CREATION_DATE_FORMAT: &str = "%m/%d/%Y %I:%M:%S %p";
const NORMALISED_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Builds [`PackageModel`]s from package XML
#[derive(Debug, Default, Clone, Copy)]
pub struct PackageModelBuilder;

impl PackageModelBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Parse and build from XML text
    pub fn build_from_str(&self, xml_content: &str) -> AuditResult<PackageModel> {
        self.build(XmlDocument::parse(xml_content)?)
    }

    /// Parse and build from a package file
    pub fn build_from_file(&self, path: &Path) -> AuditResult<PackageModel> {
        let content = read_text_file(path)?;
        self.build_from_str(&content)
    }

    /// Build the model from an already parsed document.
    ///
    /// Fails with [`AuditError::MalformedPackage`] when the root has no name
    /// or there is no executables container, and with
    /// [`AuditError::UnknownPackageKind`] when the name prefix is not a known
    /// package kind.
    pub fn build(&self, document: XmlDocument) -> AuditResult<PackageModel> {
        let root = document.root();
        let name = document
            .attr_ns(root, DTS_NAMESPACE, "ObjectName")
            .map(str::to_string)
            .ok_or_else(|| {
                AuditError::MalformedPackage("package root has no DTS:ObjectName attribute".to_string())
            })?;

        let kind = PackageKind::from_name(&name)
            .ok_or_else(|| AuditError::UnknownPackageKind { name: name.clone() })?;
        tracing::info!(package = %name, kind = %kind, "Detected package kind");

        let executables_root = document
            .find_descendant(root, |id| document.is_element(id, DTS_NAMESPACE, "Executables"))
            .ok_or_else(|| {
                AuditError::MalformedPackage("package has no DTS:Executables element".to_string())
            })?;

        let components = collect_executables(&document, executables_root);
        let containers: BTreeSet<String> = components
            .iter()
            .filter(|c| c.executable_type == SEQUENCE_EXECUTABLE)
            .map(|c| c.name.clone())
            .collect();
        tracing::debug!(
            executables = components.len(),
            containers = containers.len(),
            "Collected executables"
        );

        let parts = PackageParts {
            version: document
                .attr_ns(root, DTS_NAMESPACE, "VersionMajor")
                .or_else(|| document.attr_ns(root, DTS_NAMESPACE, "VersionBuild"))
                .map(str::to_string),
            creation_date: document
                .attr_ns(root, DTS_NAMESPACE, "CreationDate")
                .map(normalise_creation_date),
            creator: document
                .attr_ns(root, DTS_NAMESPACE, "CreatorName")
                .map(strip_domain),
            variables: collect_variables(&document, root),
            parameters: collect_parameters(&document, root),
            connections: collect_connections(&document, root),
            name,
            kind,
            containers,
            components,
        };

        Ok(PackageModel::from_parts(parts, document))
    }
}

fn collect_executables(document: &XmlDocument, executables_root: NodeId) -> Vec<ExecutableInfo> {
    document
        .descendants(executables_root)
        .filter(|&id| document.is_element(id, DTS_NAMESPACE, "Executable"))
        .map(|id| ExecutableInfo {
            path: document.path_of(id),
            name: document
                .attr_ns(id, DTS_NAMESPACE, "ObjectName")
                .unwrap_or_default()
                .to_string(),
            executable_type: document
                .attr_ns(id, DTS_NAMESPACE, "ExecutableType")
                .unwrap_or_default()
                .to_string(),
            ref_id: document.attr_ns(id, DTS_NAMESPACE, "refId").map(str::to_string),
            node: id,
        })
        .collect()
}

fn collect_variables(document: &XmlDocument, root: NodeId) -> Vec<Variable> {
    document
        .descendants(root)
        .filter(|&id| document.is_element(id, DTS_NAMESPACE, "Variable"))
        .map(|id| Variable {
            name: document
                .attr_ns(id, DTS_NAMESPACE, "ObjectName")
                .unwrap_or_default()
                .to_string(),
            expression: document
                .attr_ns(id, DTS_NAMESPACE, "Expression")
                .map(str::to_string),
        })
        .collect()
}

fn collect_parameters(document: &XmlDocument, root: NodeId) -> Vec<Parameter> {
    document
        .descendants(root)
        .filter(|&id| document.is_element(id, DTS_NAMESPACE, "PackageParameter"))
        .map(|id| Parameter {
            name: document
                .attr_ns(id, DTS_NAMESPACE, "ObjectName")
                .unwrap_or_default()
                .to_string(),
            value: document
                .children_named(id, DTS_NAMESPACE, "Property")
                .find(|&p| document.attr_ns(p, DTS_NAMESPACE, "Name") == Some("ParameterValue"))
                .map(|p| document.text(p).to_string()),
        })
        .collect()
}

/// Connection id to alias, from package connection managers and from
/// dataflow `connection` elements.
fn collect_connections(document: &XmlDocument, root: NodeId) -> BTreeMap<String, Option<String>> {
    let mut connections: BTreeMap<String, Option<String>> = BTreeMap::new();
    let mut record = |key: String, alias: Option<String>| {
        let entry = connections.entry(key).or_insert(None);
        if entry.is_none() {
            *entry = alias;
        }
    };

    for id in document.descendants(root) {
        if document.is_element(id, DTS_NAMESPACE, "ConnectionManager") {
            let alias = document
                .attr_ns(id, DTS_NAMESPACE, "ObjectName")
                .filter(|n| !n.is_empty())
                .map(str::to_string);
            for attribute in ["DTSID", "refId"] {
                if let Some(key) = document
                    .attr_ns(id, DTS_NAMESPACE, attribute)
                    .and_then(connection_key)
                {
                    record(key, alias.clone());
                }
            }
        } else if document.local_name(id) == "connection" && document.node(id).namespace.is_none() {
            let Some(key) = document.attr(id, "connectionManagerID").and_then(connection_key) else {
                tracing::debug!(path = %document.path_of(id), "Connection without a manager id");
                continue;
            };
            let alias = document
                .attr(id, "connectionManagerRefId")
                .and_then(bracketed_alias);
            if alias.is_none() {
                tracing::warn!(connection = %key, "Could not resolve connection alias");
            }
            record(key, alias);
        }
    }

    connections
}

fn bracketed_alias(reference: &str) -> Option<String> {
    let start = reference.find('[')?;
    let len = reference[start + 1..].find(']')?;
    let alias = &reference[start + 1..start + 1 + len];
    (!alias.is_empty()).then(|| alias.to_string())
}

fn normalise_creation_date(raw: &str) -> String {
    match NaiveDateTime::parse_from_str(raw.trim(), CREATION_DATE_FORMAT) {
        Ok(date) => date.format(NORMALISED_DATE_FORMAT).to_string(),
        Err(e) => {
            tracing::debug!(value = raw, error = %e, "Keeping creation date verbatim");
            raw.to_string()
        }
    }
}

fn strip_domain(creator: &str) -> String {
    creator.rsplit('\\').next().unwrap_or(creator).to_string()
}
