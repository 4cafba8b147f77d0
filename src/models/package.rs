//! Structural model of an ETL package

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use crate::xml::{NodeId, XmlDocument};

/// Fixed prefix shared by every package name
pub const PACKAGE_NAME_PREFIX: &str = "Fill_";

/// Package kind, derived from the name prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PackageKind {
    #[serde(rename = "DIM")]
    Dim,
    #[serde(rename = "FACT")]
    Fact,
}

impl PackageKind {
    /// Case-sensitive name prefix that identifies the kind
    pub fn prefix(self) -> &'static str {
        match self {
            PackageKind::Dim => "Fill_Dim",
            PackageKind::Fact => "Fill_Fact",
        }
    }

    /// Detect the kind from a package name
    pub fn from_name(name: &str) -> Option<Self> {
        [PackageKind::Dim, PackageKind::Fact]
            .into_iter()
            .find(|kind| name.starts_with(kind.prefix()))
    }
}

impl fmt::Display for PackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageKind::Dim => write!(f, "DIM"),
            PackageKind::Fact => write!(f, "FACT"),
        }
    }
}

/// One executable (task, container or dataflow) in the package tree
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutableInfo {
    /// Structural locator, unique within the document
    pub path: String,
    pub name: String,
    pub executable_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<String>,
    #[serde(skip)]
    pub node: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// In-memory model of a package, built once and read by every audit stage.
///
/// The parsed document travels with the model so that components can be
/// revisited through their [`NodeId`] without re-deriving paths.
#[derive(Debug, Clone, Serialize)]
pub struct PackageModel {
    pub name: String,
    /// Package name without the `Fill_` prefix
    pub table_name: String,
    kind: PackageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    /// Names of sequence containers
    pub containers: BTreeSet<String>,
    /// Executables in depth-first document order
    pub components: Vec<ExecutableInfo>,
    pub variables: Vec<Variable>,
    pub parameters: Vec<Parameter>,
    /// Connection id to alias; `None` when the reference could not be resolved
    pub connections: BTreeMap<String, Option<String>>,
    #[serde(skip)]
    component_index: HashMap<String, usize>,
    #[serde(skip)]
    document: XmlDocument,
}

/// Fields gathered by the builder before the model is sealed
#[derive(Debug)]
pub(crate) struct PackageParts {
    pub name: String,
    pub kind: PackageKind,
    pub version: Option<String>,
    pub creation_date: Option<String>,
    pub creator: Option<String>,
    pub containers: BTreeSet<String>,
    pub components: Vec<ExecutableInfo>,
    pub variables: Vec<Variable>,
    pub parameters: Vec<Parameter>,
    pub connections: BTreeMap<String, Option<String>>,
}

impl PackageModel {
    pub(crate) fn from_parts(parts: PackageParts, document: XmlDocument) -> Self {
        let component_index = parts
            .components
            .iter()
            .enumerate()
            .map(|(i, c)| (c.path.clone(), i))
            .collect();
        let table_name = parts
            .name
            .strip_prefix(PACKAGE_NAME_PREFIX)
            .unwrap_or(&parts.name)
            .to_string();

        Self {
            table_name,
            name: parts.name,
            kind: parts.kind,
            version: parts.version,
            creation_date: parts.creation_date,
            creator: parts.creator,
            containers: parts.containers,
            components: parts.components,
            variables: parts.variables,
            parameters: parts.parameters,
            connections: parts.connections,
            component_index,
            document,
        }
    }

    pub fn kind(&self) -> PackageKind {
        self.kind
    }

    pub fn document(&self) -> &XmlDocument {
        &self.document
    }

    /// Look up an executable by its structural path
    pub fn component(&self, path: &str) -> Option<&ExecutableInfo> {
        self.component_index
            .get(path)
            .map(|&i| &self.components[i])
    }

    /// Executables of the given type, in document order
    pub fn components_of_type<'a>(
        &'a self,
        executable_type: &'a str,
    ) -> impl Iterator<Item = &'a ExecutableInfo> + 'a {
        self.components
            .iter()
            .filter(move |c| c.executable_type == executable_type)
    }

    /// Resolve a connection reference such as `{GUID}` or
    /// `Package.ConnectionManagers[Alias]` to its alias.
    pub fn resolve_connection(&self, reference: &str) -> Option<&str> {
        let key = connection_key(reference)?;
        self.connections.get(&key).and_then(|alias| alias.as_deref())
    }
}

/// Normalise a connection reference to the key used in
/// [`PackageModel::connections`].
///
/// `{GUID}` and `{GUID}:external` reduce to the GUID; bracketed references
/// reduce to the bracketed alias.
pub fn connection_key(reference: &str) -> Option<String> {
    let reference = reference.trim();
    if let Some(start) = reference.find('{')
        && let Some(len) = reference[start + 1..].find('}')
    {
        let id = &reference[start + 1..start + 1 + len];
        if !id.is_empty() {
            return Some(id.to_string());
        }
    }
    if let Some(start) = reference.find('[')
        && let Some(len) = reference[start + 1..].find(']')
    {
        let id = &reference[start + 1..start + 1 + len];
        if !id.is_empty() {
            return Some(id.to_string());
        }
    }
    if reference.is_empty() {
        None
    } else {
        Some(reference.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_name_is_case_sensitive() {
        assert_eq!(PackageKind::from_name("Fill_DimCustomer"), Some(PackageKind::Dim));
        assert_eq!(PackageKind::from_name("Fill_FactSales"), Some(PackageKind::Fact));
        assert_eq!(PackageKind::from_name("fill_dimCustomer"), None);
        assert_eq!(PackageKind::from_name("Load_Customer"), None);
    }

    #[test]
    fn test_connection_key_forms() {
        assert_eq!(
            connection_key("{4F2B-11}:external").as_deref(),
            Some("4F2B-11")
        );
        assert_eq!(
            connection_key("Package.ConnectionManagers[DW]").as_deref(),
            Some("DW")
        );
        assert_eq!(connection_key("  ").as_deref(), None);
    }
}
