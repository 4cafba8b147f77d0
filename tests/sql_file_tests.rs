//! SQL file assembly tests

use package_auditor::config::AuditConfig;
use package_auditor::export::{SECTION_DIVIDER, SqlFileBuilder, StaticSchemaProvider};
use package_auditor::import::{PackageModelBuilder, read_text_file};
use package_auditor::models::{FindingCategory, PackageModel};

fn package(name: &str) -> PackageModel {
    let xml = format!(
        r#"<DTS:Executable xmlns:DTS="www.microsoft.com/SqlServer/Dts"
  xmlns:SQLTask="www.microsoft.com/sqlserver/dts/tasks/sqltask" DTS:ObjectName="{name}">
  <DTS:ConnectionManagers>
    <DTS:ConnectionManager DTS:DTSID="{{S-1}}" DTS:ObjectName="DWStage" />
    <DTS:ConnectionManager DTS:DTSID="{{W-1}}" DTS:ObjectName="DW" />
  </DTS:ConnectionManagers>
  <DTS:Executables>
    <DTS:Executable DTS:ExecutableType="Microsoft.ExecuteSQLTask" DTS:ObjectName="Insert PackageLog">
      <DTS:ObjectData>
        <SQLTask:SqlTaskData SQLTask:Connection="{{W-1}}" SQLTask:SqlStatementSource="insert into PackageLog values (1)" />
      </DTS:ObjectData>
    </DTS:Executable>
    <DTS:Executable DTS:ExecutableType="Microsoft.ExecuteSQLTask" DTS:ObjectName="Update IsExists">
      <DTS:ObjectData>
        <SQLTask:SqlTaskData SQLTask:Connection="{{S-1}}" SQLTask:SqlStatementSource="update s set IsExists = 1" />
      </DTS:ObjectData>
    </DTS:Executable>
    <DTS:Executable DTS:ExecutableType="Microsoft.ExecuteSQLTask" DTS:ObjectName="Refresh Statistics">
      <DTS:ObjectData>
        <SQLTask:SqlTaskData SQLTask:Connection="{{W-1}}" SQLTask:SqlStatementSource="exec sp_updatestats" />
      </DTS:ObjectData>
    </DTS:Executable>
  </DTS:Executables>
</DTS:Executable>"#
    );
    PackageModelBuilder::new().build_from_str(&xml).unwrap()
}

fn config() -> AuditConfig {
    AuditConfig::default()
        .with_warehouse_database("DW")
        .with_stage_database("DWStage")
}

fn position(content: &str, needle: &str) -> usize {
    content
        .find(needle)
        .unwrap_or_else(|| panic!("'{}' not found in:\n{}", needle, content))
}

mod sql_file_tests {
    use super::*;

    #[test]
    fn test_sections_follow_classification_order() {
        let config = config();
        let provider = StaticSchemaProvider::new().with_definition(
            "dbo",
            "DimCustomer",
            "CREATE TABLE DimCustomer (Id INT)",
        );
        let sql_file = SqlFileBuilder::new(&config, &provider)
            .unwrap()
            .with_null_record_script("INSERT INTO DimCustomer (Id) VALUES (-1);")
            .build(&package("Fill_DimCustomer"));
        let content = &sql_file.content;

        assert!(content.starts_with(SECTION_DIVIDER));
        let ddl = position(content, "-- Create DW Table");
        let is_exists = position(content, "UPDATE s SET IsExists = 1");
        let package_log = position(content, "INSERT INTO PackageLog VALUES (1)");
        let unrecognized = position(content, "EXEC sp_updatestats");
        let null_record = position(content, "-- Insert Record for Null Values");
        assert!(ddl < is_exists);
        assert!(is_exists < package_log);
        assert!(package_log < unrecognized);
        assert!(unrecognized < null_record);

        assert_eq!(sql_file.unrecognized, vec!["Refresh Statistics".to_string()]);
        assert!(sql_file.findings.is_empty(), "{:?}", sql_file.findings);
    }

    #[test]
    fn test_missing_inputs_only_warn() {
        let config = config();
        let provider = StaticSchemaProvider::new();
        let sql_file = SqlFileBuilder::new(&config, &provider)
            .unwrap()
            .with_null_record_script("INSERT INTO DimProduct (Id) VALUES (-1);")
            .build(&package("Fill_DimCustomer"));

        assert!(!sql_file.content.contains("-- Create DW Table"));
        assert!(!sql_file.content.contains("-- Insert Record for Null Values"));
        assert!(sql_file.content.contains("UPDATE s SET IsExists = 1"));
        assert_eq!(sql_file.findings.in_category(FindingCategory::Extraction).count(), 2);
        assert_eq!(sql_file.findings.problem_count(), 2);
    }

    #[test]
    fn test_null_record_script_from_utf16_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("null_records.sql");
        let script = "INSERT INTO DimStore (Id) VALUES (-1);\nINSERT INTO [dbo].[DimCustomer] (Id) VALUES (-1);\n";
        let mut bytes = vec![0xFF, 0xFE];
        bytes.extend(script.encode_utf16().flat_map(|u| u.to_le_bytes()));
        std::fs::write(&path, bytes).unwrap();

        let config = config();
        let provider = StaticSchemaProvider::new();
        let sql_file = SqlFileBuilder::new(&config, &provider)
            .unwrap()
            .with_null_record_script(read_text_file(&path).unwrap())
            .build(&package("Fill_DimCustomer"));

        let section = position(&sql_file.content, "-- Insert Record for Null Values");
        assert!(sql_file.content[section..].contains("[DimCustomer]"));
        assert!(!sql_file.content.contains("DimStore"));
    }

    #[test]
    fn test_fact_has_no_null_record_section() {
        let config = config();
        let provider = StaticSchemaProvider::new();
        let sql_file = SqlFileBuilder::new(&config, &provider)
            .unwrap()
            .with_null_record_script("INSERT INTO FactSales (Id) VALUES (-1);")
            .build(&package("Fill_FactSales"));

        assert!(!sql_file.content.contains("-- Insert Record for Null Values"));
        // only the missing DDL
        assert_eq!(sql_file.findings.problem_count(), 1);
    }
}
