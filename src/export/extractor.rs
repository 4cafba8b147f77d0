//! SQL extraction
//!
//! Collects every SQL fragment a package carries, in document order:
//! - Execute SQL tasks: the statement source, verbatim
//! - Dataflows: each component's `SqlCommand` when its access mode is a SQL
//!   mode, or, for FACT packages whose dataflow binds properties through
//!   expressions, the package variables those expressions read
//!
//! Each record is tagged with the database its connection points at. Records
//! are keyed by name: a repeated name keeps its first position and the later body.

use serde::Serialize;

use crate::config::AuditConfig;
use crate::import::{PIPELINE_EXECUTABLE, SQL_TASK_EXECUTABLE};
use crate::models::{ExecutableInfo, FindingCategory, Findings, PackageKind, PackageModel, SqlQueryRecord};
use crate::validation::dataflow::ComponentKind;
use crate::xml::{DTS_NAMESPACE, NodeId, SQLTASK_NAMESPACE, XmlDocument};

/// Queries found in one package, plus anything that could not be read
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractedQueries {
    pub records: Vec<SqlQueryRecord>,
    pub findings: Findings,
}

impl ExtractedQueries {
    /// Add a record keyed by name. A later query with the same name replaces
    /// the earlier one in its original position.
    pub fn insert(&mut self, record: SqlQueryRecord) {
        match self.records.iter_mut().find(|r| r.name == record.name) {
            Some(existing) => {
                tracing::debug!(query = %record.name, "Query name seen again, keeping the later body");
                *existing = record;
            }
            None => self.records.push(record),
        }
    }
}

/// Pulls SQL out of a [`PackageModel`]
pub struct SqlExtractor<'a> {
    config: &'a AuditConfig,
}

impl<'a> SqlExtractor<'a> {
    pub fn new(config: &'a AuditConfig) -> Self {
        Self { config }
    }

    pub fn extract(&self, model: &PackageModel) -> ExtractedQueries {
        let mut out = ExtractedQueries::default();
        let document = model.document();

        let bound_pipelines: Vec<NodeId> = if model.kind() == PackageKind::Fact {
            model
                .components_of_type(PIPELINE_EXECUTABLE)
                .filter(|p| {
                    document
                        .find_descendant(p.node, |id| document.is_element(id, DTS_NAMESPACE, "PropertyExpression"))
                        .is_some()
                })
                .map(|p| p.node)
                .collect()
        } else {
            Vec::new()
        };
        let mut variables_extracted = false;

        for executable in &model.components {
            match executable.executable_type.as_str() {
                SQL_TASK_EXECUTABLE => self.extract_sql_task(model, executable, &mut out),
                PIPELINE_EXECUTABLE if bound_pipelines.contains(&executable.node) => {
                    // package variables are shared by every bound pipeline
                    if !variables_extracted {
                        tracing::debug!(dataflow = %executable.name, "Extracting queries from variables");
                        self.extract_variables(model, &bound_pipelines, &mut out);
                        variables_extracted = true;
                    }
                }
                PIPELINE_EXECUTABLE => {
                    tracing::debug!(dataflow = %executable.name, "Extracting queries from SQL command properties");
                    self.extract_components(model, executable, &mut out);
                }
                _ => {}
            }
        }

        tracing::info!(queries = out.records.len(), "SQL extraction completed");
        out
    }

    fn database_for(&self, model: &PackageModel, reference: Option<&str>) -> Option<String> {
        let alias = model.resolve_connection(reference?)?;
        Some(self.config.database_for_connection(alias))
    }

    fn extract_sql_task(&self, model: &PackageModel, task: &ExecutableInfo, out: &mut ExtractedQueries) {
        let document = model.document();
        let task_data = document.find_descendant(task.node, |id| {
            document.is_element(id, SQLTASK_NAMESPACE, "SqlTaskData")
        });
        let Some(task_data) = task_data else {
            out.findings.warn(
                FindingCategory::Extraction,
                Some(&task.name),
                "SQL task has no SqlTaskData element",
            );
            return;
        };
        let Some(statement) = document.attr_ns(task_data, SQLTASK_NAMESPACE, "SqlStatementSource") else {
            out.findings.warn(
                FindingCategory::Extraction,
                Some(&task.name),
                "SQL task has no statement source",
            );
            return;
        };

        let database = self.database_for(model, document.attr_ns(task_data, SQLTASK_NAMESPACE, "Connection"));
        out.insert(SqlQueryRecord::new(&task.name, statement, database));
    }

    fn extract_components(&self, model: &PackageModel, dataflow: &ExecutableInfo, out: &mut ExtractedQueries) {
        let document = model.document();

        for component in document.descendants_local(dataflow.node, "component") {
            let name = document.attr(component, "name").unwrap_or("unnamed");
            let kind = ComponentKind::classify(
                document.attr(component, "componentClassID").unwrap_or_default(),
                document.attr(component, "contactInfo"),
            );
            // destination access modes describe load modes, not SQL commands
            if kind == ComponentKind::OleDbDestination {
                continue;
            }

            let Some(mode) = component_property(document, component, "AccessMode") else {
                tracing::debug!(component = name, "No access mode, skipping");
                continue;
            };
            if !self.config.is_sql_access_mode(mode) {
                tracing::debug!(component = name, mode, "Access mode is not a SQL mode, skipping");
                continue;
            }

            let command = component_property(document, component, "SqlCommand")
                .map(str::trim)
                .unwrap_or_default();
            if command.is_empty() {
                out.findings.warn(
                    FindingCategory::Extraction,
                    Some(name),
                    format!("Empty SqlCommand under SQL access mode {}", mode.trim()),
                );
                continue;
            }

            let database = self.database_for(model, component_connection(document, component));
            out.insert(SqlQueryRecord::new(name, command, database));
        }
    }

    fn extract_variables(&self, model: &PackageModel, pipelines: &[NodeId], out: &mut ExtractedQueries) {
        for variable in &model.variables {
            let Some(expression) = variable.expression.as_deref() else {
                out.findings.warn(
                    FindingCategory::Extraction,
                    Some(&variable.name),
                    "Variable has no expression to extract",
                );
                continue;
            };
            let body = expression.trim().trim_matches('"').trim();
            let connection = pipelines
                .iter()
                .find_map(|&pipeline| bound_connection(model.document(), pipeline, &variable.name));
            let database = self.database_for(model, connection);
            out.insert(SqlQueryRecord::new(&variable.name, body, database));
        }
    }
}

/// Text of a component-level property
fn component_property<'d>(document: &'d XmlDocument, component: NodeId, name: &str) -> Option<&'d str> {
    document
        .children_local(component, "properties")
        .flat_map(|props| document.children_local(props, "property"))
        .find(|&p| document.attr(p, "name") == Some(name))
        .map(|p| document.text(p))
}

fn component_connection(document: &XmlDocument, component: NodeId) -> Option<&str> {
    document
        .descendants_local(component, "connection")
        .find_map(|c| document.attr(c, "connectionManagerID"))
}

/// Connection of the component whose property is bound to `@[User::<variable>]`.
///
/// Property expressions are named `[Component].[Property]`.
fn bound_connection<'d>(document: &'d XmlDocument, dataflow: NodeId, variable: &str) -> Option<&'d str> {
    let reference = format!("User::{}", variable);
    let expression = document.descendants(dataflow).find(|&id| {
        document.is_element(id, DTS_NAMESPACE, "PropertyExpression") && document.text(id).contains(&reference)
    })?;
    let target = document.attr_ns(expression, DTS_NAMESPACE, "Name")?;
    let component_name = target.strip_prefix('[')?.split(']').next()?;

    let component = document
        .descendants_local(dataflow, "component")
        .find(|&c| document.attr(c, "name") == Some(component_name))?;
    component_connection(document, component)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::PackageModelBuilder;

    fn package(name: &str, executables: &str, variables: &str) -> PackageModel {
        let xml = format!(
            r#"<DTS:Executable xmlns:DTS="www.microsoft.com/SqlServer/Dts"
  xmlns:SQLTask="www.microsoft.com/sqlserver/dts/tasks/sqltask" DTS:ObjectName="{name}">
  <DTS:ConnectionManagers>
    <DTS:ConnectionManager DTS:DTSID="{{S-1}}" DTS:ObjectName="DWStage" />
    <DTS:ConnectionManager DTS:DTSID="{{O-1}}" DTS:ObjectName="OLTP" />
  </DTS:ConnectionManagers>
  <DTS:Variables>{variables}</DTS:Variables>
  <DTS:Executables>{executables}</DTS:Executables>
</DTS:Executable>"#
        );
        PackageModelBuilder::new().build_from_str(&xml).unwrap()
    }

    const SQL_TASK: &str = r#"
<DTS:Executable DTS:ExecutableType="Microsoft.ExecuteSQLTask" DTS:ObjectName="Update IsExists">
  <DTS:ObjectData>
    <SQLTask:SqlTaskData SQLTask:Connection="{S-1}" SQLTask:SqlStatementSource="UPDATE s SET IsExists = 1" />
  </DTS:ObjectData>
</DTS:Executable>"#;

    const DATAFLOW: &str = r#"
<DTS:Executable DTS:ExecutableType="Microsoft.Pipeline" DTS:ObjectName="Load Customers">
  <DTS:ObjectData><pipeline><components>
    <component componentClassID="Microsoft.OLEDBSource" name="Get Data from Customers">
      <properties>
        <property name="AccessMode">2</property>
        <property name="SqlCommand">  SELECT * FROM Customers  </property>
      </properties>
      <connections><connection connectionManagerID="{O-1}" connectionManagerRefId="Package.ConnectionManagers[OLTP]" /></connections>
    </component>
    <component componentClassID="Microsoft.OLEDBSource" name="Get Data from Table">
      <properties><property name="AccessMode">0</property><property name="SqlCommand"></property></properties>
    </component>
    <component componentClassID="Microsoft.OLEDBSource" name="Get Data from Nothing">
      <properties><property name="AccessMode">3</property><property name="SqlCommand"></property></properties>
    </component>
    <component componentClassID="Microsoft.OLEDBDestination" name="Insert into DimCustomer">
      <properties><property name="AccessMode">3</property><property name="SqlCommand"></property></properties>
    </component>
  </components></pipeline></DTS:ObjectData>
</DTS:Executable>"#;

    #[test]
    fn test_sql_task_and_dataflow_components() {
        let model = package("Fill_DimCustomer", &format!("{SQL_TASK}{DATAFLOW}"), "");
        let config = AuditConfig::default().with_connection_database("OLTP", "SalesDB");
        let extracted = SqlExtractor::new(&config).extract(&model);

        assert_eq!(
            extracted.records,
            vec![
                SqlQueryRecord::new("Update IsExists", "UPDATE s SET IsExists = 1", Some("DWStage".into())),
                SqlQueryRecord::new("Get Data from Customers", "SELECT * FROM Customers", Some("SalesDB".into())),
            ]
        );
        // empty command under a SQL access mode
        assert_eq!(extracted.findings.len(), 1);
        assert_eq!(extracted.findings.problem_count(), 1);
    }

    #[test]
    fn test_fact_with_property_expression_reads_variables() {
        let dataflow = DATAFLOW.replace(
            "<DTS:ObjectData>",
            r#"<DTS:PropertyExpressions><DTS:PropertyExpression DTS:Name="[Get Data from Customers].[SqlCommand]">@[User::V_Query]</DTS:PropertyExpression></DTS:PropertyExpressions><DTS:ObjectData>"#,
        );
        let variables = r#"
<DTS:Variable DTS:ObjectName="V_Query" DTS:Expression="&quot;SELECT * FROM Orders&quot;" />
<DTS:Variable DTS:ObjectName="V_Unbound" DTS:Expression="&quot;SELECT 1&quot;" />
<DTS:Variable DTS:ObjectName="LoadDate" />"#;
        let model = package("Fill_FactSales", &dataflow, variables);
        let config = AuditConfig::default();
        let extracted = SqlExtractor::new(&config).extract(&model);

        assert_eq!(
            extracted.records,
            vec![
                SqlQueryRecord::new("V_Query", "SELECT * FROM Orders", Some("OLTP".into())),
                SqlQueryRecord::new("V_Unbound", "SELECT 1", None),
            ]
        );
        assert_eq!(extracted.findings.in_category(FindingCategory::Extraction).count(), 1);
    }

    #[test]
    fn test_variables_extracted_once_for_several_bound_pipelines() {
        let bound = DATAFLOW.replace(
            "<DTS:ObjectData>",
            r#"<DTS:PropertyExpressions><DTS:PropertyExpression DTS:Name="[Get Data from Customers].[SqlCommand]">@[User::V_Query]</DTS:PropertyExpression></DTS:PropertyExpressions><DTS:ObjectData>"#,
        );
        let full_load = bound.replace("Load Customers", "Full Load Orders");
        let incremental = bound.replace("Load Customers", "Incremental Load Orders");
        let variables = r#"<DTS:Variable DTS:ObjectName="V_Query" DTS:Expression="&quot;SELECT * FROM Orders&quot;" />"#;
        let model = package("Fill_FactSales", &format!("{full_load}{incremental}"), variables);
        let extracted = SqlExtractor::new(&AuditConfig::default()).extract(&model);

        let names: Vec<&str> = extracted.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["V_Query"]);
        assert_eq!(extracted.records[0].database_context.as_deref(), Some("OLTP"));
        assert!(extracted.findings.is_empty());
    }

    #[test]
    fn test_fact_mixes_bound_and_plain_pipelines() {
        let bound = DATAFLOW.replace(
            "<DTS:ObjectData>",
            r#"<DTS:PropertyExpressions><DTS:PropertyExpression DTS:Name="[Get Data from Customers].[SqlCommand]">@[User::V_Query]</DTS:PropertyExpression></DTS:PropertyExpressions><DTS:ObjectData>"#,
        );
        let plain = DATAFLOW.replace("Load Customers", "Load Lookups");
        let variables = r#"<DTS:Variable DTS:ObjectName="V_Query" DTS:Expression="&quot;SELECT * FROM Orders&quot;" />"#;
        let model = package("Fill_FactSales", &format!("{bound}{plain}"), variables);
        let extracted = SqlExtractor::new(&AuditConfig::default()).extract(&model);

        let names: Vec<&str> = extracted.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["V_Query", "Get Data from Customers"]);
        assert_eq!(extracted.records[1].body, "SELECT * FROM Customers");
    }

    #[test]
    fn test_repeated_name_keeps_position_and_later_body() {
        let later = SQL_TASK.replace("UPDATE s SET IsExists = 1", "UPDATE s SET IsExists = 0");
        let model = package("Fill_DimCustomer", &format!("{SQL_TASK}{DATAFLOW}{later}"), "");
        let extracted = SqlExtractor::new(&AuditConfig::default()).extract(&model);

        let names: Vec<&str> = extracted.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Update IsExists", "Get Data from Customers"]);
        assert_eq!(extracted.records[0].body, "UPDATE s SET IsExists = 0");
    }

    #[test]
    fn test_dim_ignores_property_expressions() {
        let dataflow = DATAFLOW.replace(
            "<DTS:ObjectData>",
            r#"<DTS:PropertyExpression DTS:Name="[X].[SqlCommand]">@[User::V_Query]</DTS:PropertyExpression><DTS:ObjectData>"#,
        );
        let model = package("Fill_DimCustomer", &dataflow, "");
        let extracted = SqlExtractor::new(&AuditConfig::default()).extract(&model);
        assert_eq!(extracted.records[0].name, "Get Data from Customers");
        assert_eq!(extracted.records[0].database_context.as_deref(), Some("OLTP"));
    }
}
