//! Dataflow (pipeline) analysis
//!
//! Components of one pipeline are visited sources first. Each recognised
//! component has its name and properties checked; destinations and hash
//! transforms also have their input columns compared, case-insensitively,
//! against what is available to them.

use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

use super::rules::PropertyRuleEngine;
use crate::config::PropertyRuleConfig;
use crate::config::patterns::{HASH_COMPONENT_NAME, PatternCatalog, SOURCE_COMPONENT_NAME};
use crate::models::{FindingCategory, Findings};
use crate::xml::{NodeId, XmlDocument};

const MULTIPLE_HASH_HOST: &str = "Microsoft.ManagedComponentHost";
const MULTIPLE_HASH_PROJECT: &str = "keif888/SSISMHash";

/// Column name to data type
pub type ColumnMap = BTreeMap<String, String>;

/// Recognised dataflow component classes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentKind {
    OleDbSource,
    OracleSource,
    OleDbDestination,
    MultipleHash,
    /// Any other class; skipped without a finding
    Unrecognized(String),
}

impl ComponentKind {
    pub fn classify(class_id: &str, contact_info: Option<&str>) -> Self {
        match class_id {
            "Microsoft.OLEDBSource" => ComponentKind::OleDbSource,
            "Microsoft.SSISOracleSrc" => ComponentKind::OracleSource,
            "Microsoft.OLEDBDestination" => ComponentKind::OleDbDestination,
            id if id.contains("MultipleHash") => ComponentKind::MultipleHash,
            MULTIPLE_HASH_HOST
                if contact_info.is_some_and(|info| info.contains(MULTIPLE_HASH_PROJECT)) =>
            {
                ComponentKind::MultipleHash
            }
            other => ComponentKind::Unrecognized(other.to_string()),
        }
    }

    /// Key of the property rule set for this kind
    pub fn rule_key(&self) -> Option<&'static str> {
        match self {
            ComponentKind::OleDbSource => Some("oledb_source"),
            ComponentKind::OracleSource => Some("oracle_source"),
            ComponentKind::OleDbDestination => Some("oledb_destination"),
            ComponentKind::MultipleHash => Some("multiple_hash"),
            ComponentKind::Unrecognized(_) => None,
        }
    }

    pub fn is_source(&self) -> bool {
        matches!(self, ComponentKind::OleDbSource | ComponentKind::OracleSource)
    }

    fn role(&self) -> &'static str {
        match self {
            ComponentKind::OleDbSource | ComponentKind::OracleSource => "source",
            ComponentKind::OleDbDestination => "destination",
            ComponentKind::MultipleHash => "hash",
            ComponentKind::Unrecognized(_) => "unrecognized",
        }
    }

    /// Name of the regular (non-error) output of a source
    fn source_output(&self) -> Option<&'static str> {
        match self {
            ComponentKind::OleDbSource => Some("OLE DB Source Output"),
            ComponentKind::OracleSource => Some("Oracle Source Output"),
            _ => None,
        }
    }
}

/// One component as read during an analysis pass
#[derive(Debug, Clone)]
pub struct DataflowComponent {
    pub node: NodeId,
    pub class_id: String,
    pub kind: ComponentKind,
    pub declared_name: String,
    /// Component-level properties; column-level properties are not included
    pub properties: BTreeMap<String, String>,
    pub input_columns: ColumnMap,
    pub output_columns: ColumnMap,
    pub external_columns: ColumnMap,
}

impl DataflowComponent {
    /// Read a `component` element. Columns that cannot be read are reported
    /// and left out.
    pub fn read(document: &XmlDocument, node: NodeId, findings: &mut Findings) -> Self {
        let class_id = document.attr(node, "componentClassID").unwrap_or("unknown").to_string();
        let kind = ComponentKind::classify(&class_id, document.attr(node, "contactInfo"));
        let declared_name = document.attr(node, "name").unwrap_or("unnamed").to_string();

        let properties = document
            .children_local(node, "properties")
            .flat_map(|props| document.children_local(props, "property"))
            .filter_map(|p| {
                document
                    .attr(p, "name")
                    .map(|name| (name.to_string(), document.text(p).to_string()))
            })
            .collect();

        let input_columns = read_columns(
            document,
            document.descendants_local(node, "inputColumn"),
            ("cachedName", "cachedDataType"),
            &declared_name,
            findings,
        );
        let external_columns = read_columns(
            document,
            document.descendants_local(node, "externalMetadataColumn"),
            ("name", "dataType"),
            &declared_name,
            findings,
        );

        let regular_output = kind.source_output().and_then(|output_name| {
            document
                .descendants_local(node, "output")
                .find(|&o| document.attr(o, "name") == Some(output_name))
        });
        let output_nodes: Vec<NodeId> = match regular_output {
            Some(output) => document.descendants_local(output, "outputColumn").collect(),
            None => document.descendants_local(node, "outputColumn").collect(),
        };
        let output_columns = read_columns(
            document,
            output_nodes.into_iter(),
            ("name", "dataType"),
            &declared_name,
            findings,
        );

        Self {
            node,
            class_id,
            kind,
            declared_name,
            properties,
            input_columns,
            output_columns,
            external_columns,
        }
    }
}

fn read_columns(
    document: &XmlDocument,
    nodes: impl Iterator<Item = NodeId>,
    (name_attr, type_attr): (&str, &str),
    component: &str,
    findings: &mut Findings,
) -> ColumnMap {
    let mut columns = ColumnMap::new();
    for node in nodes {
        match document.attr(node, name_attr) {
            Some(name) => {
                let data_type = document.attr(node, type_attr).unwrap_or_default();
                columns.insert(name.to_string(), data_type.to_string());
            }
            None => findings.warn(
                FindingCategory::Extraction,
                Some(component),
                format!(
                    "Skipped {} at {} without a '{}' attribute",
                    document.local_name(node),
                    document.path_of(node),
                    name_attr
                ),
            ),
        }
    }
    columns
}

/// Names in `expected` whose lowercase form is absent from `actual`,
/// reported with their original casing
fn missing_case_insensitive(expected: &ColumnMap, actual: &ColumnMap) -> Vec<String> {
    let actual_lower: BTreeSet<String> = actual.keys().map(|k| k.to_lowercase()).collect();
    expected
        .keys()
        .filter(|name| !actual_lower.contains(&name.to_lowercase()))
        .cloned()
        .collect()
}

/// Walk state: output columns of the most recent source, once one was seen
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SourceState {
    #[default]
    AwaitingSource,
    HaveSource(ColumnMap),
}

/// Analyses one pipeline against the property rules and column conventions
pub struct DataflowAnalyzer<'a> {
    rules: PropertyRuleEngine<'a>,
    destination_name: Regex,
}

impl<'a> DataflowAnalyzer<'a> {
    pub fn new(rules: &'a PropertyRuleConfig, table_name: &str) -> Self {
        Self {
            rules: PropertyRuleEngine::new(rules),
            destination_name: PatternCatalog::destination_component_name(table_name),
        }
    }

    /// Analyse the `pipeline` element at `pipeline`
    pub fn analyze(&self, document: &XmlDocument, pipeline: NodeId) -> Findings {
        let mut findings = Findings::new();
        tracing::info!(pipeline = %document.path_of(pipeline), "Starting dataflow analysis");

        self.check_pipeline_attributes(document, pipeline, &mut findings);

        let Some(components) = document
            .find_descendant(pipeline, |id| document.local_name(id) == "components")
        else {
            findings.warn(FindingCategory::Structure, None, "No components found in pipeline");
            return findings;
        };

        let mut read: Vec<DataflowComponent> = document
            .children_local(components, "component")
            .map(|node| DataflowComponent::read(document, node, &mut findings))
            .collect();
        // stable: sources keep their relative order, as do the rest
        read.sort_by_key(|c| !c.kind.is_source());

        let final_state = read.iter().fold(SourceState::default(), |state, component| {
            self.step(state, component, &mut findings)
        });
        tracing::debug!(have_source = final_state != SourceState::AwaitingSource, "Dataflow analysis completed");

        findings
    }

    fn check_pipeline_attributes(&self, document: &XmlDocument, pipeline: NodeId, findings: &mut Findings) {
        match document.attr(pipeline, "autoAdjustBufferSize") {
            None => findings.warn(
                FindingCategory::Structure,
                None,
                "The 'AutoAdjustBufferSize' attribute is not set",
            ),
            Some(value) if !value.eq_ignore_ascii_case("true") => findings.warn(
                FindingCategory::Structure,
                None,
                format!("'AutoAdjustBufferSize' is {}", value),
            ),
            Some(_) => tracing::info!("'AutoAdjustBufferSize' is enabled"),
        }

        for attribute in &document.node(pipeline).attributes {
            if attribute.namespace.is_none()
                && attribute.local_name != "version"
                && attribute.local_name != "autoAdjustBufferSize"
            {
                tracing::debug!(
                    attribute = %attribute.local_name,
                    value = %attribute.value,
                    "Dataflow custom attribute"
                );
            }
        }
    }

    /// Process one component and return the state for the next one
    fn step(&self, state: SourceState, component: &DataflowComponent, findings: &mut Findings) -> SourceState {
        let Some(rule_key) = component.kind.rule_key() else {
            tracing::debug!(
                class_id = %component.class_id,
                name = %component.declared_name,
                "Skipping unrecognized component"
            );
            return state;
        };
        tracing::info!(class_id = %component.class_id, name = %component.declared_name, "Reviewing component");

        self.check_name(component, findings);
        for violation in self.rules.evaluate(rule_key, &component.properties) {
            findings.push(violation.into_finding(&component.declared_name));
        }

        match component.kind {
            ComponentKind::OleDbSource | ComponentKind::OracleSource => {
                return SourceState::HaveSource(component.output_columns.clone());
            }
            ComponentKind::OleDbDestination => {
                let unmapped = missing_case_insensitive(&component.external_columns, &component.input_columns);
                if !unmapped.is_empty() {
                    findings.warn(
                        FindingCategory::ColumnMapping,
                        Some(&component.declared_name),
                        format!("Unmapped columns: {}", unmapped.join(", ")),
                    );
                }
            }
            ComponentKind::MultipleHash => match &state {
                SourceState::HaveSource(source_columns) => {
                    let unselected = missing_case_insensitive(source_columns, &component.input_columns);
                    if !unselected.is_empty() {
                        findings.warn(
                            FindingCategory::ColumnSelection,
                            Some(&component.declared_name),
                            format!("Unselected columns: {}", unselected.join(", ")),
                        );
                    }
                }
                SourceState::AwaitingSource => tracing::debug!(
                    name = %component.declared_name,
                    "No upstream source columns to compare"
                ),
            },
            ComponentKind::Unrecognized(_) => {}
        }

        state
    }

    fn check_name(&self, component: &DataflowComponent, findings: &mut Findings) {
        let pattern: &Regex = match component.kind {
            ComponentKind::OleDbSource | ComponentKind::OracleSource => &*SOURCE_COMPONENT_NAME,
            ComponentKind::OleDbDestination => &self.destination_name,
            ComponentKind::MultipleHash => &*HASH_COMPONENT_NAME,
            ComponentKind::Unrecognized(_) => return,
        };
        if !pattern.is_match(&component.declared_name) {
            findings.warn(
                FindingCategory::Naming,
                Some(&component.declared_name),
                format!("Invalid {} name", component.kind.role()),
            );
        }
    }
}
