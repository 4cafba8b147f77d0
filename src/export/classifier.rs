//! Query classification and ordering
//!
//! The classification list decides, for each extracted query name, the
//! section alias, the database it runs against and its position in the
//! generated SQL file. Rules are tried in list order and the first match wins.

use serde::Serialize;

use crate::config::ClassificationRules;
use crate::models::SqlQueryRecord;

/// Alias and database assigned to a query name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub alias: String,
    pub database: Option<String>,
}

/// Result of ordering a set of queries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOrder {
    /// Input positions in emission order; always a permutation of the input
    pub positions: Vec<usize>,
    /// Input positions that matched no rule, in discovery order
    pub unrecognized: Vec<usize>,
}

/// Classifies and orders queries by the configured rule list
#[derive(Debug, Clone)]
pub struct SqlClassifierOrderer {
    rules: ClassificationRules,
}

impl SqlClassifierOrderer {
    pub fn new(rules: ClassificationRules) -> Self {
        Self { rules }
    }

    /// Alias and database of the first matching rule; a name matching no
    /// rule is its own alias with no database.
    pub fn classify(&self, query_name: &str) -> Classification {
        match self.rules.first_match(query_name) {
            Some(rule) => Classification {
                alias: rule.alias.clone().unwrap_or_else(|| query_name.to_string()),
                database: rule.database.clone(),
            },
            None => Classification {
                alias: query_name.to_string(),
                database: None,
            },
        }
    }

    /// Emission order for `names`.
    ///
    /// For each rule in priority order, every not-yet-emitted name it claims
    /// is emitted in discovery order. Names claimed by no rule follow at the
    /// end, also in discovery order.
    pub fn order_positions<S: AsRef<str>>(&self, names: &[S]) -> QueryOrder {
        let mut claimed = vec![false; names.len()];
        let mut positions = Vec::with_capacity(names.len());

        for rule in self.rules.iter() {
            for (i, name) in names.iter().enumerate() {
                if !claimed[i] && rule.matches(name.as_ref()) {
                    claimed[i] = true;
                    positions.push(i);
                }
            }
        }

        let unrecognized: Vec<usize> = (0..names.len()).filter(|&i| !claimed[i]).collect();
        if !unrecognized.is_empty() {
            let listed: Vec<&str> = unrecognized.iter().map(|&i| names[i].as_ref()).collect();
            tracing::warn!("Unrecognized queries: {}", listed.join(", "));
        }
        positions.extend(&unrecognized);

        QueryOrder {
            positions,
            unrecognized,
        }
    }

    /// `names` in emission order
    pub fn order<S: AsRef<str>>(&self, names: &[S]) -> Vec<String> {
        self.order_positions(names)
            .positions
            .into_iter()
            .map(|i| names[i].as_ref().to_string())
            .collect()
    }

    /// Records in emission order, with the names that matched no rule
    pub fn order_records<'r>(
        &self,
        records: &'r [SqlQueryRecord],
    ) -> (Vec<&'r SqlQueryRecord>, Vec<&'r str>) {
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        let order = self.order_positions(&names);
        (
            order.positions.iter().map(|&i| &records[i]).collect(),
            order.unrecognized.iter().map(|&i| names[i]).collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClassificationRuleSpec, default_classification_specs};

    fn builtin() -> SqlClassifierOrderer {
        SqlClassifierOrderer::new(
            ClassificationRules::compile(&default_classification_specs(), Some("DW"), Some("DWStage"))
                .unwrap(),
        )
    }

    #[test]
    fn test_classify_uses_alias_or_falls_back_to_name() {
        let classifier = builtin();
        assert_eq!(
            classifier.classify("Get Last Value for OrderDate"),
            Classification {
                alias: "Get Config Record".to_string(),
                database: Some("DW".to_string()),
            }
        );
        // rule without alias keeps the query name
        assert_eq!(
            classifier.classify("Update IsExists"),
            Classification {
                alias: "Update IsExists".to_string(),
                database: Some("DWStage".to_string()),
            }
        );
        assert_eq!(
            classifier.classify("Something Else"),
            Classification {
                alias: "Something Else".to_string(),
                database: None,
            }
        );
    }

    #[test]
    fn test_order_follows_rule_priority_not_discovery() {
        let classifier = builtin();
        let names = [
            "Insert PackageLog",
            "Update DimCustomer",
            "Mystery Task",
            "Create Table DimCustomerStage",
            "Update IsExists",
            "Get Data from Customers",
        ];
        assert_eq!(
            classifier.order(&names),
            vec![
                "Create Table DimCustomerStage",
                "Get Data from Customers",
                "Update IsExists",
                "Update DimCustomer",
                "Insert PackageLog",
                "Mystery Task",
            ]
        );
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let specs = vec![
            ClassificationRuleSpec::new(r"Update\s+\w+").with_alias("Generic"),
            ClassificationRuleSpec::new(r"Update\s+ConfigTable").with_alias("Specific"),
        ];
        let classifier =
            SqlClassifierOrderer::new(ClassificationRules::compile(&specs, None, None).unwrap());
        assert_eq!(classifier.classify("Update ConfigTable").alias, "Generic");
    }

    #[test]
    fn test_order_is_permutation_when_nothing_matches() {
        let classifier = builtin();
        let names = ["b", "a", "b", "c"];
        let order = classifier.order_positions(&names);
        assert_eq!(order.positions, vec![0, 1, 2, 3]);
        assert_eq!(order.unrecognized, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_order_is_permutation_with_duplicates() {
        let classifier = builtin();
        let names = ["Update IsExists", "x", "Update IsExists", "Insert PackageLog"];
        let mut positions = classifier.order_positions(&names).positions;
        positions.sort_unstable();
        assert_eq!(positions, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_order_records_reports_unrecognized() {
        let classifier = builtin();
        let records = vec![
            SqlQueryRecord::new("Lookup Thing", "SELECT 1", None),
            SqlQueryRecord::new("Update IsExists", "UPDATE x SET y = 1", None),
        ];
        let (ordered, unrecognized) = classifier.order_records(&records);
        assert_eq!(ordered[0].name, "Update IsExists");
        assert_eq!(unrecognized, vec!["Lookup Thing"]);
    }
}
