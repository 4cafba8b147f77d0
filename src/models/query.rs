//! Extracted SQL query records

use serde::{Deserialize, Serialize};

/// A SQL fragment found in a package, tagged with the database it runs against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlQueryRecord {
    pub name: String,
    pub body: String,
    /// `None` when the connection could not be resolved
    pub database_context: Option<String>,
}

impl SqlQueryRecord {
    pub fn new(name: impl Into<String>, body: impl Into<String>, database: Option<String>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
            database_context: database,
        }
    }

    /// `USE <database>` for a resolved connection
    pub fn use_directive(&self) -> Option<String> {
        self.database_context
            .as_deref()
            .map(|db| format!("USE {}", db))
    }

    /// Body preceded by its `USE` directive, or the bare body when unresolved
    pub fn with_use_prefix(&self) -> String {
        match self.use_directive() {
            Some(directive) => format!("{}\n{}", directive, self.body),
            None => self.body.clone(),
        }
    }
}
