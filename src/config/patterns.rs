//! Naming and classification pattern catalog
//!
//! Static patterns describe the framework conventions a package must follow:
//! package names, expected containers, component and task names. The
//! classification list maps extracted query names to a database and a section
//! alias; its order is the priority (first match wins).

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{AuditError, AuditResult};
use crate::models::PackageKind;

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid built-in pattern {pattern}: {e}"))
}

static DIM_NAME: Lazy<Regex> = Lazy::new(|| compile(r"^Fill_Dim\w+$"));
static FACT_NAME: Lazy<Regex> = Lazy::new(|| compile(r"^Fill_Fact\w+$"));

/// Container that marks an incremental package
pub static INCREMENTAL_MARKER: Lazy<Regex> = Lazy::new(|| compile(r"^Get.*Config.*Table"));

pub static STAGE_INITIALIZATION: Lazy<Regex> = Lazy::new(|| compile(r"^Stage.*Initialization"));
pub static EXTRACT_TRANSFORM_OLTP: Lazy<Regex> = Lazy::new(|| compile(r"^Extract.*Transform.*OLTP"));
pub static LOAD_DATA: Lazy<Regex> = Lazy::new(|| compile(r"^Load.*Data"));
pub static UPDATE_CONFIG_INSERT_LOG: Lazy<Regex> =
    Lazy::new(|| compile(r"^Update.*Config.*Table.*Insert.*Log"));
pub static GET_RECORD_CONFIG_TABLE: Lazy<Regex> = Lazy::new(|| compile(r"^Get.*Record.*Config.*Table"));

static DIM_CONTAINERS: Lazy<Vec<&'static Regex>> = Lazy::new(|| {
    vec![
        &*STAGE_INITIALIZATION,
        &*EXTRACT_TRANSFORM_OLTP,
        &*LOAD_DATA,
        &*UPDATE_CONFIG_INSERT_LOG,
    ]
});

static FACT_CONTAINERS: Lazy<Vec<&'static Regex>> = Lazy::new(|| {
    vec![
        &*GET_RECORD_CONFIG_TABLE,
        &*STAGE_INITIALIZATION,
        &*EXTRACT_TRANSFORM_OLTP,
        &*LOAD_DATA,
        &*UPDATE_CONFIG_INSERT_LOG,
    ]
});

pub static SOURCE_COMPONENT_NAME: Lazy<Regex> = Lazy::new(|| compile(r"^Get Data [Ff]rom \w+$"));
pub static HASH_COMPONENT_NAME: Lazy<Regex> = Lazy::new(|| compile(r"^Multiple Hash"));

pub static CLUSTERED_INDEX_TASK: Lazy<Regex> =
    Lazy::new(|| compile(r"^Create Clustered Index on \w+Stage$"));
pub static UPDATE_IS_EXISTS_TASK: Lazy<Regex> = Lazy::new(|| compile(r"^Update IsExists$"));
pub static UPDATE_TABLE_TASK: Lazy<Regex> = Lazy::new(|| compile(r"^Update \w+$"));
pub static INSERT_PACKAGE_LOG_TASK: Lazy<Regex> = Lazy::new(|| compile(r"^Insert PackageLog$"));

/// Extra SQL tasks a FACT package carries, as `(label, pattern)`
pub static FACT_DYNAMIC_TASKS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        ("Get Last Value", compile(r"^Get.*Last.*Value for \w+")),
        ("Get IsFullLoad Value", compile(r"^Get.*IsFullLoad.*Value")),
        ("Update ConfigTable", compile(r"^Update.*ConfigTable")),
    ]
});

/// Lookup helpers over the static catalog
pub struct PatternCatalog;

impl PatternCatalog {
    /// Naming pattern a package of this kind must follow
    pub fn package_name(kind: PackageKind) -> &'static Regex {
        match kind {
            PackageKind::Dim => &DIM_NAME,
            PackageKind::Fact => &FACT_NAME,
        }
    }

    /// Containers every package of this kind is expected to carry
    pub fn expected_containers(kind: PackageKind) -> &'static [&'static Regex] {
        match kind {
            PackageKind::Dim => &DIM_CONTAINERS,
            PackageKind::Fact => &FACT_CONTAINERS,
        }
    }

    /// Whether a container is only expected for incremental packages
    pub fn is_incremental_only(pattern: &Regex) -> bool {
        pattern.as_str() == GET_RECORD_CONFIG_TABLE.as_str()
    }

    /// Destination component name pattern for a target table
    pub fn destination_component_name(table_name: &str) -> Regex {
        compile(&format!(r"^Insert [Ii]nto {}\w*(?:\s\w+)?$", regex::escape(table_name)))
    }

    /// SQL task name patterns allowed inside a container, if the container
    /// constrains its task names
    pub fn task_names_for_container(container: &str) -> Option<&'static [&'static Regex]> {
        static OLTP_TASKS: Lazy<Vec<&'static Regex>> =
            Lazy::new(|| vec![&*CLUSTERED_INDEX_TASK, &*UPDATE_IS_EXISTS_TASK]);
        static LOAD_TASKS: Lazy<Vec<&'static Regex>> = Lazy::new(|| vec![&*UPDATE_TABLE_TASK]);
        static LOG_TASKS: Lazy<Vec<&'static Regex>> = Lazy::new(|| vec![&*INSERT_PACKAGE_LOG_TASK]);

        if EXTRACT_TRANSFORM_OLTP.is_match(container) {
            Some(&OLTP_TASKS)
        } else if LOAD_DATA.is_match(container) {
            Some(&LOAD_TASKS)
        } else if UPDATE_CONFIG_INSERT_LOG.is_match(container) {
            Some(&LOG_TASKS)
        } else {
            None
        }
    }

    /// Whether a name matches any of the patterns
    pub fn matches_any(name: &str, patterns: &[&Regex]) -> bool {
        patterns.iter().any(|p| p.is_match(name))
    }
}

/// Database a classified query runs against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseTarget {
    /// The configured data-warehouse database
    Warehouse,
    /// The configured staging database
    Stage,
    /// A literal database name
    Named(String),
}

/// Classification rule as written in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRuleSpec {
    /// Matched case-insensitively against the whole query name
    pub pattern: String,
    /// Names that also match this pattern are not claimed by the rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseTarget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl ClassificationRuleSpec {
    pub fn new(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            exclude: None,
            database: None,
            alias: None,
        }
    }

    pub fn with_exclude(mut self, exclude: &str) -> Self {
        self.exclude = Some(exclude.to_string());
        self
    }

    pub fn with_database(mut self, database: DatabaseTarget) -> Self {
        self.database = Some(database);
        self
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_string());
        self
    }
}

/// Built-in classification list, highest priority first
pub fn default_classification_specs() -> Vec<ClassificationRuleSpec> {
    use DatabaseTarget::{Stage, Warehouse};

    vec![
        ClassificationRuleSpec::new(r"Get\s+Last\s+Value\s+for\s+\w+")
            .with_database(Warehouse)
            .with_alias("Get Config Record"),
        ClassificationRuleSpec::new(r"Create\s+Table\s+(?:Dim|Fact)\w*Stage")
            .with_database(Stage)
            .with_alias("Stage Initialization"),
        ClassificationRuleSpec::new(r"Get\s+(?:Record|Data)\s+from\s+\w+")
            .with_exclude(r"Get\s+(?:Record|Data)\s+from\s+\w*Stage")
            .with_alias("Get Record from OLTP"),
        ClassificationRuleSpec::new(r"V_FullLoadQuery(?:_\w+|\w*)"),
        ClassificationRuleSpec::new(r"V_IncrementalLoadQuery(?:_\w+|\w*)"),
        ClassificationRuleSpec::new(r"V_Query(?:_\w+|\w*)"),
        ClassificationRuleSpec::new(r"Create\s+Clustered\s+Index\s+on\s+(?:Dim|Fact)\w*Stage")
            .with_database(Stage)
            .with_alias("Create Clustered Index on Stage Table"),
        ClassificationRuleSpec::new(r"Update\s+IsExists").with_database(Stage),
        ClassificationRuleSpec::new(r"Get\s+(?:Record|Data)\s+from\s+(?:Dim|Fact)\w*Stage")
            .with_database(Stage)
            .with_alias("Get Data from Stage"),
        ClassificationRuleSpec::new(r"Update\s+(?:Dim|Fact)\w+")
            .with_exclude(r"Update\s+(?:Dim|Fact)\w*Stage")
            .with_database(Warehouse)
            .with_alias("Update DW Table"),
        ClassificationRuleSpec::new(r"Update\s+ConfigTable").with_database(Warehouse),
        ClassificationRuleSpec::new(r"Insert\s+PackageLog").with_database(Warehouse),
    ]
}

/// Compiled classification rule
#[derive(Debug, Clone)]
pub struct ClassificationRule {
    pattern: Regex,
    exclude: Option<Regex>,
    pub database: Option<String>,
    pub alias: Option<String>,
}

impl ClassificationRule {
    /// Whole-name, case-insensitive match honouring the exclusion
    pub fn matches(&self, name: &str) -> bool {
        self.pattern.is_match(name)
            && !self.exclude.as_ref().is_some_and(|ex| ex.is_match(name))
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

/// Ordered classification list. Iteration order is priority order: the first
/// rule that matches a name decides its alias and database.
#[derive(Debug, Clone, Default)]
pub struct ClassificationRules(Vec<ClassificationRule>);

impl ClassificationRules {
    /// Compile specs, resolving symbolic databases against configured names.
    ///
    /// A symbolic target whose database name is not configured resolves to
    /// `None`, which suppresses the `USE` directive for that section.
    pub fn compile(
        specs: &[ClassificationRuleSpec],
        warehouse: Option<&str>,
        stage: Option<&str>,
    ) -> AuditResult<Self> {
        let full_match = |pattern: &str| {
            RegexBuilder::new(&format!(r"^(?:{})$", pattern))
                .case_insensitive(true)
                .build()
                .map_err(|e| {
                    AuditError::Config(format!("invalid classification pattern '{}': {}", pattern, e))
                })
        };

        let rules = specs
            .iter()
            .map(|spec| {
                let database = match &spec.database {
                    Some(DatabaseTarget::Warehouse) => warehouse.map(str::to_string),
                    Some(DatabaseTarget::Stage) => stage.map(str::to_string),
                    Some(DatabaseTarget::Named(name)) => Some(name.clone()),
                    None => None,
                };
                Ok(ClassificationRule {
                    pattern: full_match(&spec.pattern)?,
                    exclude: spec.exclude.as_deref().map(full_match).transpose()?,
                    database,
                    alias: spec.alias.clone(),
                })
            })
            .collect::<AuditResult<Vec<_>>>()?;

        Ok(Self(rules))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ClassificationRule> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First rule matching the name
    pub fn first_match(&self, name: &str) -> Option<&ClassificationRule> {
        self.0.iter().find(|rule| rule.matches(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builtin() -> ClassificationRules {
        ClassificationRules::compile(&default_classification_specs(), Some("DW"), Some("DWStage"))
            .unwrap()
    }

    #[test]
    fn test_expected_containers_by_kind() {
        assert_eq!(PatternCatalog::expected_containers(PackageKind::Dim).len(), 4);
        let fact = PatternCatalog::expected_containers(PackageKind::Fact);
        assert_eq!(fact.len(), 5);
        assert!(PatternCatalog::is_incremental_only(fact[0]));
        assert!(fact[0].is_match("Get Record From Config Table"));
    }

    #[test]
    fn test_destination_name_embeds_table() {
        let pattern = PatternCatalog::destination_component_name("DimCustomer");
        assert!(pattern.is_match("Insert into DimCustomer"));
        assert!(pattern.is_match("Insert Into DimCustomer Stage"));
        assert!(!pattern.is_match("Insert into DimProduct"));
    }

    #[test]
    fn test_task_names_by_container() {
        let oltp = PatternCatalog::task_names_for_container("Extract & Transform OLTP").unwrap();
        assert!(PatternCatalog::matches_any("Create Clustered Index on DimCustomerStage", oltp));
        assert!(PatternCatalog::matches_any("Update IsExists", oltp));
        assert!(PatternCatalog::task_names_for_container("Stage Initialization").is_none());
    }

    #[test]
    fn test_exclusion_stands_in_for_lookahead() {
        let rules = builtin();

        let oltp = rules.first_match("Get Data from Customers").unwrap();
        assert_eq!(oltp.alias.as_deref(), Some("Get Record from OLTP"));
        assert_eq!(oltp.database, None);

        let stage = rules.first_match("Get Data from DimCustomerStage").unwrap();
        assert_eq!(stage.alias.as_deref(), Some("Get Data from Stage"));
        assert_eq!(stage.database.as_deref(), Some("DWStage"));
    }

    #[test]
    fn test_rule_order_decides_overlaps() {
        let rules = builtin();
        let update = rules.first_match("update dimcustomer").unwrap();
        assert_eq!(update.alias.as_deref(), Some("Update DW Table"));
        assert_eq!(update.database.as_deref(), Some("DW"));

        assert!(rules.first_match("Update DimCustomerStage").is_none());
        assert!(rules.first_match("Insert PackageLog extra").is_none());
    }

    #[test]
    fn test_unconfigured_database_resolves_to_none() {
        let rules =
            ClassificationRules::compile(&default_classification_specs(), None, None).unwrap();
        assert_eq!(rules.first_match("Update IsExists").unwrap().database, None);
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let specs = vec![ClassificationRuleSpec::new("Update (")];
        assert!(matches!(
            ClassificationRules::compile(&specs, None, None),
            Err(AuditError::Config(_))
        ));
    }

    #[test]
    fn test_rule_yaml_shape() {
        let yaml = r#"
- pattern: 'Load\s+\w+'
  database: stage
  alias: Loader
- pattern: 'Archive\s+\w+'
  database:
    named: ArchiveDB
"#;
        let specs: Vec<ClassificationRuleSpec> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(specs[0].database, Some(DatabaseTarget::Stage));
        assert_eq!(specs[1].database, Some(DatabaseTarget::Named("ArchiveDB".to_string())));
    }
}
