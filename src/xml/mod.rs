//! XML document arena
//!
//! Package documents are read once with `quick-xml` into a flat arena of
//! nodes addressed by [`NodeId`]. Namespace prefixes are resolved while
//! reading, so lookups use `(namespace URI, local name)` pairs and never
//! depend on the prefix a particular file happens to use.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::HashMap;

use crate::error::{AuditError, AuditResult};

/// Package-description namespace
pub const DTS_NAMESPACE: &str = "www.microsoft.com/SqlServer/Dts";
/// Execute-SQL task namespace
pub const SQLTASK_NAMESPACE: &str = "www.microsoft.com/sqlserver/dts/tasks/sqltask";

/// Handle to a node inside an [`XmlDocument`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Position of the node in document order
    pub fn index(self) -> usize {
        self.0
    }
}

/// A namespaced attribute
#[derive(Debug, Clone)]
pub struct XmlAttribute {
    pub local_name: String,
    pub namespace: Option<String>,
    pub value: String,
}

/// An element node
#[derive(Debug, Clone)]
pub struct XmlNode {
    pub prefix: Option<String>,
    pub local_name: String,
    pub namespace: Option<String>,
    pub attributes: Vec<XmlAttribute>,
    /// Concatenated character data directly inside this element
    pub text: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// Parsed XML document stored as an arena of element nodes
#[derive(Debug, Clone)]
pub struct XmlDocument {
    nodes: Vec<XmlNode>,
}

impl XmlDocument {
    /// Parse XML text into an arena.
    ///
    /// Fails with [`AuditError::XmlParse`] for malformed input and with
    /// [`AuditError::MalformedPackage`] when the document has no root element.
    pub fn parse(xml_content: &str) -> AuditResult<Self> {
        let mut reader = Reader::from_str(xml_content);
        reader.config_mut().trim_text(false);

        let mut nodes: Vec<XmlNode> = Vec::new();
        let mut open: Vec<NodeId> = Vec::new();
        let mut scopes: Vec<HashMap<String, String>> = Vec::new();

        loop {
            let event = reader.read_event().map_err(|e| AuditError::XmlParse {
                position: reader.error_position() as u64,
                message: e.to_string(),
            })?;

            match event {
                Event::Start(ref e) => {
                    let id = push_element(&mut nodes, &mut scopes, open.last().copied(), e)
                        .map_err(|message| AuditError::XmlParse {
                            position: reader.buffer_position() as u64,
                            message,
                        })?;
                    open.push(id);
                }
                Event::Empty(ref e) => {
                    push_element(&mut nodes, &mut scopes, open.last().copied(), e).map_err(
                        |message| AuditError::XmlParse {
                            position: reader.buffer_position() as u64,
                            message,
                        },
                    )?;
                    scopes.pop();
                }
                Event::End(_) => {
                    open.pop();
                    scopes.pop();
                }
                Event::Text(ref e) => {
                    if let Some(&current) = open.last() {
                        let text = e.unescape().map_err(|err| AuditError::XmlParse {
                            position: reader.buffer_position() as u64,
                            message: err.to_string(),
                        })?;
                        nodes[current.0].text.push_str(&text);
                    }
                }
                Event::CData(e) => {
                    if let Some(&current) = open.last() {
                        let raw = e.into_inner();
                        nodes[current.0]
                            .text
                            .push_str(&String::from_utf8_lossy(raw.as_ref()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !open.is_empty() {
            return Err(AuditError::XmlParse {
                position: reader.buffer_position() as u64,
                message: "unexpected end of document: unclosed elements".to_string(),
            });
        }

        if nodes.is_empty() {
            return Err(AuditError::MalformedPackage(
                "document has no root element".to_string(),
            ));
        }

        Ok(Self { nodes })
    }

    /// The document element
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &XmlNode {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn local_name(&self, id: NodeId) -> &str {
        &self.nodes[id.0].local_name
    }

    /// True when the node has the given namespace URI and local name
    pub fn is_element(&self, id: NodeId, namespace: &str, local_name: &str) -> bool {
        let node = &self.nodes[id.0];
        node.local_name == local_name && node.namespace.as_deref() == Some(namespace)
    }

    /// Attribute value looked up by namespace URI and local name
    pub fn attr_ns(&self, id: NodeId, namespace: &str, local_name: &str) -> Option<&str> {
        self.nodes[id.0]
            .attributes
            .iter()
            .find(|a| a.local_name == local_name && a.namespace.as_deref() == Some(namespace))
            .map(|a| a.value.as_str())
    }

    /// Un-namespaced attribute value
    pub fn attr(&self, id: NodeId, local_name: &str) -> Option<&str> {
        self.nodes[id.0]
            .attributes
            .iter()
            .find(|a| a.local_name == local_name && a.namespace.is_none())
            .map(|a| a.value.as_str())
    }

    pub fn text(&self, id: NodeId) -> &str {
        &self.nodes[id.0].text
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id.0].children.iter().copied()
    }

    /// Direct children with the given namespace URI and local name
    pub fn children_named<'a>(
        &'a self,
        id: NodeId,
        namespace: &'a str,
        local_name: &'a str,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.children(id)
            .filter(move |&c| self.is_element(c, namespace, local_name))
    }

    /// Direct children with the given local name in any namespace
    pub fn children_local<'a>(
        &'a self,
        id: NodeId,
        local_name: &'a str,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.children(id)
            .filter(move |&c| self.nodes[c.0].local_name == local_name)
    }

    /// All descendants of `id` in depth-first document order, excluding `id`.
    ///
    /// Nodes are appended to the arena in document order, so the subtree of
    /// a node is the contiguous range that follows it.
    pub fn descendants(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let end = self.subtree_end(id);
        (id.0 + 1..end).map(NodeId)
    }

    /// First descendant satisfying `predicate`
    pub fn find_descendant(
        &self,
        id: NodeId,
        predicate: impl Fn(NodeId) -> bool,
    ) -> Option<NodeId> {
        self.descendants(id).find(|&d| predicate(d))
    }

    /// Descendants with the given local name in any namespace
    pub fn descendants_local<'a>(
        &'a self,
        id: NodeId,
        local_name: &'a str,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.descendants(id)
            .filter(move |&d| self.nodes[d.0].local_name == local_name)
    }

    /// Stable structural locator such as `DTS:Executable[1]/DTS:Executables[1]/DTS:Executable[2]`.
    ///
    /// Each segment carries the 1-based position among same-named siblings,
    /// so the locator is unique within the document.
    pub fn path_of(&self, id: NodeId) -> String {
        let mut segments = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = &self.nodes[node_id.0];
            let position = match node.parent {
                Some(parent) => {
                    self.nodes[parent.0]
                        .children
                        .iter()
                        .take_while(|&&c| c != node_id)
                        .filter(|&&c| {
                            let sibling = &self.nodes[c.0];
                            sibling.local_name == node.local_name
                                && sibling.namespace == node.namespace
                        })
                        .count()
                        + 1
                }
                None => 1,
            };
            let name = match &node.prefix {
                Some(prefix) => format!("{}:{}", prefix, node.local_name),
                None => node.local_name.clone(),
            };
            segments.push(format!("{}[{}]", name, position));
            current = node.parent;
        }
        segments.reverse();
        segments.join("/")
    }

    fn subtree_end(&self, id: NodeId) -> usize {
        let mut current = id;
        loop {
            match self.nodes[current.0].children.last() {
                Some(&last) => current = last,
                None => return current.0 + 1,
            }
        }
    }
}

fn split_qname(raw: &[u8]) -> (Option<String>, String) {
    let name = String::from_utf8_lossy(raw);
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix.to_string()), local.to_string()),
        None => (None, name.to_string()),
    }
}

fn resolve_prefix(scopes: &[HashMap<String, String>], prefix: &str) -> Option<String> {
    scopes
        .iter()
        .rev()
        .find_map(|scope| scope.get(prefix).cloned())
}

fn push_element(
    nodes: &mut Vec<XmlNode>,
    scopes: &mut Vec<HashMap<String, String>>,
    parent: Option<NodeId>,
    start: &BytesStart<'_>,
) -> Result<NodeId, String> {
    let mut declarations = HashMap::new();
    let mut raw_attributes = Vec::new();

    for attr in start.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr.unescape_value().map_err(|e| e.to_string())?.to_string();

        if key == "xmlns" {
            declarations.insert(String::new(), value);
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            declarations.insert(prefix.to_string(), value);
        } else {
            raw_attributes.push((key, value));
        }
    }
    scopes.push(declarations);

    let (prefix, local_name) = split_qname(start.name().as_ref());
    let namespace = resolve_prefix(scopes, prefix.as_deref().unwrap_or(""));

    let attributes = raw_attributes
        .into_iter()
        .map(|(key, value)| {
            let (attr_prefix, attr_local) = split_qname(key.as_bytes());
            // Unprefixed attributes never inherit the default namespace
            let namespace = attr_prefix
                .as_deref()
                .and_then(|p| resolve_prefix(scopes, p));
            XmlAttribute {
                local_name: attr_local,
                namespace,
                value,
            }
        })
        .collect();

    let id = NodeId(nodes.len());
    nodes.push(XmlNode {
        prefix,
        local_name,
        namespace,
        attributes,
        text: String::new(),
        parent,
        children: Vec::new(),
    });
    if let Some(parent) = parent {
        nodes[parent.0].children.push(id);
    }
    Ok(id)
}
