//! Audit configuration
//!
//! One `AuditConfig` is built per run and passed by reference to every stage
//! that needs database names, access modes or classification rules.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::patterns::{ClassificationRuleSpec, ClassificationRules, default_classification_specs};
use crate::error::{AuditError, AuditResult};
use crate::import::read_text_file;

/// Environment variable naming the data-warehouse database
pub const WAREHOUSE_DATABASE_ENV: &str = "SQL_DATABASE";
/// Environment variable naming the staging database
pub const STAGE_DATABASE_ENV: &str = "SQL_DATABASE_STAGE";

fn default_access_modes() -> Vec<String> {
    vec!["2".to_string(), "3".to_string()]
}

fn default_schema() -> String {
    "dbo".to_string()
}

/// Settings shared by the validator and the SQL file builder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Data-warehouse database; `None` suppresses its `USE` directives
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warehouse_database: Option<String>,
    /// Staging database; `None` suppresses its `USE` directives
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_database: Option<String>,
    /// Connection alias to database name, for aliases that differ from the
    /// database they point at
    #[serde(default)]
    pub connection_databases: BTreeMap<String, String>,
    /// `AccessMode` codes that mark a dataflow component as carrying SQL
    #[serde(default = "default_access_modes")]
    pub sql_access_modes: Vec<String>,
    /// Schema passed to the table-definition lookup
    #[serde(default = "default_schema")]
    pub schema: String,
    /// Replaces the built-in classification list when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<Vec<ClassificationRuleSpec>>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            warehouse_database: None,
            stage_database: None,
            connection_databases: BTreeMap::new(),
            sql_access_modes: default_access_modes(),
            schema: default_schema(),
            classification: None,
        }
    }
}

impl AuditConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_warehouse_database(mut self, database: impl Into<String>) -> Self {
        self.warehouse_database = Some(database.into());
        self
    }

    pub fn with_stage_database(mut self, database: impl Into<String>) -> Self {
        self.stage_database = Some(database.into());
        self
    }

    pub fn with_connection_database(
        mut self,
        alias: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        self.connection_databases.insert(alias.into(), database.into());
        self
    }

    pub fn with_classification(mut self, specs: Vec<ClassificationRuleSpec>) -> Self {
        self.classification = Some(specs);
        self
    }

    pub fn from_yaml_str(yaml: &str) -> AuditResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        if config.sql_access_modes.is_empty() {
            return Err(AuditError::Config(
                "sql_access_modes must list at least one access mode".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn from_file(path: &Path) -> AuditResult<Self> {
        let content = read_text_file(path)?;
        Self::from_yaml_str(&content)
    }

    /// Fill unset database names from `SQL_DATABASE` / `SQL_DATABASE_STAGE`
    pub fn with_env_defaults(mut self) -> Self {
        let from_env = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        if self.warehouse_database.is_none() {
            self.warehouse_database = from_env(WAREHOUSE_DATABASE_ENV);
        }
        if self.stage_database.is_none() {
            self.stage_database = from_env(STAGE_DATABASE_ENV);
        }
        self
    }

    /// Database a connection alias points at. Aliases without an override
    /// are taken to name their database.
    pub fn database_for_connection(&self, alias: &str) -> String {
        self.connection_databases
            .get(alias)
            .cloned()
            .unwrap_or_else(|| alias.to_string())
    }

    pub fn is_sql_access_mode(&self, mode: &str) -> bool {
        self.sql_access_modes.iter().any(|m| m == mode.trim())
    }

    /// Compile the configured (or built-in) classification list
    pub fn classification_rules(&self) -> AuditResult<ClassificationRules> {
        let defaults;
        let specs = match &self.classification {
            Some(specs) => specs.as_slice(),
            None => {
                defaults = default_classification_specs();
                defaults.as_slice()
            }
        };
        ClassificationRules::compile(
            specs,
            self.warehouse_database.as_deref(),
            self.stage_database.as_deref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AuditConfig::default();
        assert_eq!(config.schema, "dbo");
        assert!(config.is_sql_access_mode("2"));
        assert!(config.is_sql_access_mode(" 3 "));
        assert!(!config.is_sql_access_mode("0"));
        assert_eq!(config.classification_rules().unwrap().len(), 12);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = AuditConfig::from_yaml_str(
            r#"
warehouse_database: DW
connection_databases:
  OLTP_Conn: SalesDB
"#,
        )
        .unwrap();
        assert_eq!(config.warehouse_database.as_deref(), Some("DW"));
        assert_eq!(config.sql_access_modes, vec!["2", "3"]);
        assert_eq!(config.database_for_connection("OLTP_Conn"), "SalesDB");
        assert_eq!(config.database_for_connection("DWStage"), "DWStage");
    }

    #[test]
    fn test_empty_access_modes_rejected() {
        let result = AuditConfig::from_yaml_str("sql_access_modes: []");
        assert!(matches!(result, Err(AuditError::Config(_))));
    }

    #[test]
    fn test_explicit_names_win_over_env() {
        let config = AuditConfig::new()
            .with_warehouse_database("DW")
            .with_stage_database("DWStage")
            .with_env_defaults();
        assert_eq!(config.warehouse_database.as_deref(), Some("DW"));
        assert_eq!(config.stage_database.as_deref(), Some("DWStage"));
    }

    #[test]
    fn test_from_file_reads_utf16() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.yml");
        let mut bytes = vec![0xFF, 0xFE];
        bytes.extend("warehouse_database: DW\n".encode_utf16().flat_map(|u| u.to_le_bytes()));
        std::fs::write(&path, bytes).unwrap();

        let config = AuditConfig::from_file(&path).unwrap();
        assert_eq!(config.warehouse_database.as_deref(), Some("DW"));
    }
}
