//! Package audit tests

use std::path::{Path, PathBuf};

use package_auditor::config::{AuditConfig, PropertyRuleConfig};
use package_auditor::export::{NoSchemaProvider, SqlFileBuilder};
use package_auditor::error::AuditError;
use package_auditor::import::{PackageModelBuilder, ReferenceScript, read_text_file};
use package_auditor::models::{FindingCategory, Severity};
use package_auditor::validation::{AuditReport, PackageValidator};

fn sql_task(name: &str, sql: &str) -> String {
    format!(
        r#"<DTS:Executable DTS:ExecutableType="Microsoft.ExecuteSQLTask" DTS:ObjectName="{name}">
  <DTS:ObjectData><SQLTask:SqlTaskData SQLTask:SqlStatementSource="{sql}" /></DTS:ObjectData>
</DTS:Executable>"#
    )
}

fn container(name: &str, children: &str) -> String {
    format!(
        r#"<DTS:Executable DTS:ExecutableType="STOCK:SEQUENCE" DTS:ObjectName="{name}">
  <DTS:Executables>{children}</DTS:Executables>
</DTS:Executable>"#
    )
}

const LOAD_DATAFLOW: &str = r#"
<DTS:Executable DTS:ExecutableType="Microsoft.Pipeline" DTS:ObjectName="Load DimCustomer">
  <DTS:ObjectData><pipeline version="1" autoAdjustBufferSize="true"><components>
    <component componentClassID="Microsoft.OLEDBDestination" name="Insert into DimCustomer">
      <properties>
        <property name="AlwaysUseDefaultCodePage">false</property>
        <property name="DefaultCodePage">1252</property>
      </properties>
      <inputs>
        <input name="OLE DB Destination Input">
          <inputColumns><inputColumn cachedName="CustID" cachedDataType="i4" /></inputColumns>
          <externalMetadataColumns>
            <externalMetadataColumn name="CustID" dataType="i4" />
            <externalMetadataColumn name="Name" dataType="wstr" />
          </externalMetadataColumns>
        </input>
      </inputs>
    </component>
  </components></pipeline></DTS:ObjectData>
</DTS:Executable>"#;

fn dim_customer_xml(load_data_extra: &str) -> String {
    let executables = [
        container(
            "Stage Initialization",
            &sql_task("Create Table DimCustomerStage", "CREATE TABLE DimCustomerStage (Id INT)"),
        ),
        container(
            "Extract &amp; Transform Data from OLTP",
            &[
                sql_task(
                    "Create Clustered Index on DimCustomerStage",
                    "CREATE CLUSTERED INDEX IX ON DimCustomerStage (Id)",
                ),
                sql_task("Update IsExists", "UPDATE s SET IsExists = 1"),
            ]
            .concat(),
        ),
        container(
            "Load Data",
            &format!(
                "{}{}",
                sql_task("Update DimCustomer", "UPDATE d SET d.Name = s.Name"),
                load_data_extra
            ),
        ),
        container(
            "Update Config Table &amp; Insert Log",
            &sql_task("Insert PackageLog", "INSERT INTO PackageLog VALUES (1)"),
        ),
    ]
    .concat();

    format!(
        r#"<?xml version="1.0"?>
<DTS:Executable xmlns:DTS="www.microsoft.com/SqlServer/Dts"
  xmlns:SQLTask="www.microsoft.com/sqlserver/dts/tasks/sqltask"
  DTS:ObjectName="Fill_DimCustomer" DTS:VersionMajor="3" DTS:CreatorName="CORP\jdoe">
  <DTS:Executables>{executables}</DTS:Executables>
</DTS:Executable>"#
    )
}

const REFERENCE: &str = "-- Table Name: DimCustomer
---------------
--Stage Initialization
USE DWStage
GO
CREATE TABLE DimCustomerStage (Id INT);
GO
---------------
--Create Clustered Index on DimCustomerStage
CREATE CLUSTERED INDEX IX ON DimCustomerStage (Id)
---------------
--Update IsExists
UPDATE s SET IsExists = 1
---------------
--Update DimCustomer
UPDATE d SET d.Name = s.Name
---------------
--Insert PackageLog
INSERT INTO PackageLog VALUES (1)
";

fn write_utf16(path: &Path, text: &str) {
    let mut bytes = vec![0xFF, 0xFE];
    bytes.extend(text.encode_utf16().flat_map(|u| u.to_le_bytes()));
    std::fs::write(path, bytes).unwrap();
}

/// Package as UTF-8, reference as UTF-16, like a typical export
fn write_inputs(dir: &Path, package_xml: &str, reference: &str) -> (PathBuf, PathBuf) {
    let package = dir.join("Fill_DimCustomer.dtsx");
    let script = dir.join("DimCustomer.sql");
    std::fs::write(&package, package_xml).unwrap();
    write_utf16(&script, reference);
    (package, script)
}

fn audit(package: &Path, script: &Path) -> Result<AuditReport, AuditError> {
    let rules = PropertyRuleConfig::builtin();
    let model = PackageModelBuilder::new().build_from_file(package)?;
    let reference = ReferenceScript::parse(&read_text_file(script)?);
    PackageValidator::new(&rules).validate(&model, &reference)
}

mod audit_tests {
    use super::*;

    #[test]
    fn test_compliant_package_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let (package, script) = write_inputs(dir.path(), &dim_customer_xml(""), REFERENCE);

        let report = audit(&package, &script).unwrap();
        assert!(report.is_compliant(), "{:?}", report.findings);
        assert_eq!(report.package.table_name, "DimCustomer");
        assert_eq!(report.package.creator.as_deref(), Some("jdoe"));
        assert_eq!(
            report
                .findings
                .in_category(FindingCategory::SqlDrift)
                .filter(|f| f.message == "The queries are identical")
                .count(),
            5
        );
    }

    #[test]
    fn test_compliance_unaffected_by_attached_sql() {
        let dir = tempfile::tempdir().unwrap();
        let (package, script) = write_inputs(dir.path(), &dim_customer_xml(""), REFERENCE);
        let report = audit(&package, &script).unwrap();

        let config = AuditConfig::default();
        let model = PackageModelBuilder::new().build_from_file(&package).unwrap();
        let sql_file = SqlFileBuilder::new(&config, &NoSchemaProvider).unwrap().build(&model);
        // the DDL section is missing
        assert_eq!(sql_file.findings.problem_count(), 1);

        let report = report.with_sql(sql_file.content, sql_file.findings);
        assert!(report.is_compliant(), "{:?}", report.findings);
        assert_eq!(report.sql_findings.problem_count(), 1);
        assert!(report.sql.as_deref().is_some_and(|sql| sql.contains("-- 'Update DW Table'")));
    }

    #[test]
    fn test_reference_for_another_table_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let reference = REFERENCE.replace("Table Name: DimCustomer", "Table Name: DimProduct");
        let (package, script) = write_inputs(dir.path(), &dim_customer_xml(""), &reference);

        match audit(&package, &script) {
            Err(AuditError::SqlTableMismatch { expected, found }) => {
                assert_eq!(expected, "DimCustomer");
                assert_eq!(found.as_deref(), Some("DimProduct"));
            }
            other => panic!("expected table mismatch, got {:?}", other.map(|r| r.findings)),
        }
    }

    #[test]
    fn test_unmapped_destination_column_in_load_data() {
        let dir = tempfile::tempdir().unwrap();
        let (package, script) = write_inputs(dir.path(), &dim_customer_xml(LOAD_DATAFLOW), REFERENCE);

        let report = audit(&package, &script).unwrap();
        let problems: Vec<_> = report
            .findings
            .iter()
            .filter(|f| f.severity >= Severity::Warning)
            .collect();
        assert_eq!(problems.len(), 1, "{:?}", report.findings);
        assert_eq!(problems[0].category, FindingCategory::ColumnMapping);
        assert_eq!(problems[0].subject.as_deref(), Some("Insert into DimCustomer"));
        assert_eq!(problems[0].message, "Unmapped columns: Name");
    }

    #[test]
    fn test_wrong_code_page_in_load_data() {
        let dir = tempfile::tempdir().unwrap();
        let dataflow = LOAD_DATAFLOW.replace(">1252<", ">65001<");
        let (package, script) = write_inputs(dir.path(), &dim_customer_xml(&dataflow), REFERENCE);

        let report = audit(&package, &script).unwrap();
        assert_eq!(
            report
                .findings
                .in_category(FindingCategory::Property)
                .filter(|f| f.severity == Severity::Warning)
                .count(),
            1
        );
    }

    #[test]
    fn test_unknown_package_kind() {
        let dir = tempfile::tempdir().unwrap();
        let xml = dim_customer_xml("").replace("Fill_DimCustomer", "Load_Customer");
        let (package, script) = write_inputs(dir.path(), &xml, REFERENCE);

        assert!(matches!(
            audit(&package, &script),
            Err(AuditError::UnknownPackageKind { .. })
        ));
    }

    #[test]
    fn test_report_serializes_to_json() {
        let dir = tempfile::tempdir().unwrap();
        let (package, script) = write_inputs(dir.path(), &dim_customer_xml(""), REFERENCE);

        let report = audit(&package, &script).unwrap();
        let json: serde_json::Value = serde_json::to_value(&report).unwrap();
        assert_eq!(json["package"]["kind"], "DIM");
        assert_eq!(json["incremental"], false);
        assert!(json.get("sql").is_none());
        assert_eq!(json["findings"][0]["category"], "sql_drift");
    }
}
