//! An arena-allocated document tree.
//!
//! Nodes live in a single `Vec` owned by [`Document`] and refer to each other by
//! [`NodeId`]. The tree is built by [`DOMBuilder`] from the events of
//! [`XMLReader`](crate::sax::parser::XMLReader).
//!
//! # Example
//! ```
//! use strictxml::{dom::DOMBuilder, sax::parser::XMLReaderBuilder};
//!
//! let mut reader = XMLReaderBuilder::new().set_handler(DOMBuilder::new()).build();
//! reader.parse_str("<root a='1'>text<child/></root>", None).unwrap();
//! let document = reader.into_handler().into_document();
//!
//! let root = document.document_element().unwrap();
//! assert_eq!(document.as_element(root).unwrap().qname(), "root");
//! assert_eq!(document.text_content(root).unwrap(), "text");
//! ```

mod builder;

pub use builder::DOMBuilder;

use std::sync::Arc;

use crate::error::XMLError;

/// The index of a node in its [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    /// The document node. Every [`Document`] has one.
    pub const DOCUMENT: Self = Self(0);

    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Document,
    DocumentType,
    Element,
    Attribute,
    Text,
    CDATASection,
    Comment,
    ProcessingInstruction,
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Document => write!(f, "document"),
            Self::DocumentType => write!(f, "document type"),
            Self::Element => write!(f, "element"),
            Self::Attribute => write!(f, "attribute"),
            Self::Text => write!(f, "text"),
            Self::CDATASection => write!(f, "CDATA section"),
            Self::Comment => write!(f, "comment"),
            Self::ProcessingInstruction => write!(f, "processing instruction"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentNode {
    pub version: Option<Box<str>>,
    pub encoding: Option<Box<str>>,
    pub standalone: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentTypeNode {
    pub name: Box<str>,
    pub public_id: Option<Box<str>>,
    pub system_id: Option<Box<str>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementNode {
    qname: Arc<str>,
    uri: Option<Arc<str>>,
    local_name: Option<Arc<str>>,
    attributes: Vec<NodeId>,
}

impl ElementNode {
    pub fn qname(&self) -> &str {
        &self.qname
    }

    /// The namespace name, if namespace processing was enabled and the element is in a
    /// namespace.
    pub fn namespace_uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    pub fn local_name(&self) -> Option<&str> {
        self.local_name.as_deref()
    }

    /// Attribute nodes in document order, including namespace declarations.
    pub fn attributes(&self) -> &[NodeId] {
        &self.attributes
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeNode {
    qname: Arc<str>,
    uri: Option<Arc<str>>,
    local_name: Option<Arc<str>>,
    value: Box<str>,
    specified: bool,
}

impl AttributeNode {
    pub fn qname(&self) -> &str {
        &self.qname
    }

    pub fn namespace_uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    pub fn local_name(&self) -> Option<&str> {
        self.local_name.as_deref()
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// `false` if the value was supplied by a default in the grammar.
    pub fn is_specified(&self) -> bool {
        self.specified
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingInstructionNode {
    pub target: Box<str>,
    pub data: Option<Box<str>>,
}

/// The payload of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Document(DocumentNode),
    DocumentType(DocumentTypeNode),
    Element(ElementNode),
    Attribute(AttributeNode),
    Text(String),
    CDATASection(String),
    Comment(Box<str>),
    ProcessingInstruction(ProcessingInstructionNode),
}

impl NodeKind {
    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Document(_) => NodeType::Document,
            Self::DocumentType(_) => NodeType::DocumentType,
            Self::Element(_) => NodeType::Element,
            Self::Attribute(_) => NodeType::Attribute,
            Self::Text(_) => NodeType::Text,
            Self::CDATASection(_) => NodeType::CDATASection,
            Self::Comment(_) => NodeType::Comment,
            Self::ProcessingInstruction(_) => NodeType::ProcessingInstruction,
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
    // line and column in the source document
    position: Option<(usize, usize)>,
}

macro_rules! impl_node_accessor {
    ($fn:ident, $variant:ident, $type:ty) => {
        /// # Errors
        /// - [`XMLError::DOMInvalidNodeId`] if `id` is not a node of this document.
        /// - [`XMLError::DOMNodeKindMismatch`] if the node is of another kind.
        pub fn $fn(&self, id: NodeId) -> Result<&$type, XMLError> {
            match self.kind(id)? {
                NodeKind::$variant(node) => Ok(node),
                _ => Err(XMLError::DOMNodeKindMismatch),
            }
        }
    };
}

/// A document tree.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                parent: None,
                children: vec![],
                kind: NodeKind::Document(DocumentNode::default()),
                position: None,
            }],
        }
    }

    fn node(&self, id: NodeId) -> Result<&Node, XMLError> {
        self.nodes.get(id.0).ok_or(XMLError::DOMInvalidNodeId)
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, XMLError> {
        self.nodes.get_mut(id.0).ok_or(XMLError::DOMInvalidNodeId)
    }

    /// The number of nodes, including attributes and the document node.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the document has no node except the document node.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    pub fn kind(&self, id: NodeId) -> Result<&NodeKind, XMLError> {
        Ok(&self.node(id)?.kind)
    }

    pub fn node_type(&self, id: NodeId) -> Result<NodeType, XMLError> {
        Ok(self.kind(id)?.node_type())
    }

    /// The parent of `id`. The parent of an attribute is its owner element.
    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>, XMLError> {
        Ok(self.node(id)?.parent)
    }

    /// The line and column at which `id` was read, if it was built by a parser.
    pub fn position(&self, id: NodeId) -> Option<(usize, usize)> {
        self.node(id).ok()?.position
    }

    pub fn set_position(&mut self, id: NodeId, line: usize, column: usize) -> Result<(), XMLError> {
        self.node_mut(id)?.position = Some((line, column));
        Ok(())
    }

    /// Child nodes of `id`. Attributes are not children.
    pub fn children(&self, id: NodeId) -> Result<&[NodeId], XMLError> {
        Ok(&self.node(id)?.children)
    }

    impl_node_accessor!(as_document, Document, DocumentNode);
    impl_node_accessor!(as_document_type, DocumentType, DocumentTypeNode);
    impl_node_accessor!(as_element, Element, ElementNode);
    impl_node_accessor!(as_attribute, Attribute, AttributeNode);
    impl_node_accessor!(as_comment, Comment, Box<str>);
    impl_node_accessor!(
        as_processing_instruction,
        ProcessingInstruction,
        ProcessingInstructionNode
    );

    /// The data of a text or CDATA section node.
    pub fn as_text(&self, id: NodeId) -> Result<&str, XMLError> {
        match self.kind(id)? {
            NodeKind::Text(data) | NodeKind::CDATASection(data) => Ok(data),
            _ => Err(XMLError::DOMNodeKindMismatch),
        }
    }

    pub fn document_element(&self) -> Option<NodeId> {
        self.nodes[0]
            .children
            .iter()
            .copied()
            .find(|&id| matches!(self.nodes[id.0].kind, NodeKind::Element(_)))
    }

    pub fn doctype(&self) -> Option<NodeId> {
        self.nodes[0]
            .children
            .iter()
            .copied()
            .find(|&id| matches!(self.nodes[id.0].kind, NodeKind::DocumentType(_)))
    }

    /// Get the value of the attribute `qname` of the element `id`.
    pub fn get_attribute(&self, id: NodeId, qname: &str) -> Result<Option<&str>, XMLError> {
        let element = self.as_element(id)?;
        for &att in &element.attributes {
            let att = self.as_attribute(att)?;
            if att.qname() == qname {
                return Ok(Some(att.value()));
            }
        }
        Ok(None)
    }

    /// Get the value of the attribute `{uri}local_name` of the element `id`.
    pub fn get_attribute_ns(
        &self,
        id: NodeId,
        uri: Option<&str>,
        local_name: &str,
    ) -> Result<Option<&str>, XMLError> {
        let element = self.as_element(id)?;
        for &att in &element.attributes {
            let att = self.as_attribute(att)?;
            if att.namespace_uri() == uri && att.local_name() == Some(local_name) {
                return Ok(Some(att.value()));
            }
        }
        Ok(None)
    }

    /// Descendants of `id` in document order, not including `id` itself.
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        let stack = self
            .nodes
            .get(id.0)
            .map(|node| node.children.iter().rev().copied().collect())
            .unwrap_or_default();
        Descendants {
            document: self,
            stack,
        }
    }

    /// Descendant elements of `id` whose QName is `qname`.
    pub fn get_elements_by_qname<'a>(
        &'a self,
        id: NodeId,
        qname: &'a str,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.descendants(id).filter(move |&desc| {
            self.as_element(desc)
                .is_ok_and(|element| element.qname() == qname)
        })
    }

    /// The concatenated text of all text and CDATA section descendants of `id`.
    ///
    /// For a text-like node, this is its own data.
    pub fn text_content(&self, id: NodeId) -> Result<String, XMLError> {
        match self.kind(id)? {
            NodeKind::Text(data) | NodeKind::CDATASection(data) => return Ok(data.clone()),
            NodeKind::Comment(data) => return Ok(data.to_string()),
            NodeKind::Attribute(att) => return Ok(att.value.to_string()),
            NodeKind::ProcessingInstruction(pi) => {
                return Ok(pi.data.as_deref().unwrap_or_default().to_owned());
            }
            _ => {}
        }
        let mut ret = String::new();
        for desc in self.descendants(id) {
            if let NodeKind::Text(data) | NodeKind::CDATASection(data) = &self.nodes[desc.0].kind {
                ret.push_str(data);
            }
        }
        Ok(ret)
    }

    fn push(&mut self, parent: NodeId, kind: NodeKind) -> Result<NodeId, XMLError> {
        let id = NodeId(self.nodes.len());
        let is_attribute = matches!(kind, NodeKind::Attribute(_));
        let parent_node = self.node_mut(parent)?;
        if is_attribute {
            let NodeKind::Element(element) = &mut parent_node.kind else {
                return Err(XMLError::DOMNodeKindMismatch);
            };
            element.attributes.push(id);
        } else {
            parent_node.children.push(id);
        }
        self.nodes.push(Node {
            parent: Some(parent),
            children: vec![],
            kind,
            position: None,
        });
        Ok(id)
    }

    pub fn append_element(
        &mut self,
        parent: NodeId,
        qname: &str,
        uri: Option<&str>,
        local_name: Option<&str>,
    ) -> Result<NodeId, XMLError> {
        self.check_container(parent)?;
        let element = ElementNode {
            qname: qname.into(),
            uri: uri.map(Arc::from),
            local_name: local_name.map(Arc::from),
            attributes: vec![],
        };
        self.push(parent, NodeKind::Element(element))
    }

    pub fn set_attribute(
        &mut self,
        element: NodeId,
        qname: &str,
        uri: Option<&str>,
        local_name: Option<&str>,
        value: &str,
        specified: bool,
    ) -> Result<NodeId, XMLError> {
        let attributes = self.as_element(element)?.attributes.clone();
        for id in attributes {
            if let NodeKind::Attribute(att) = &mut self.node_mut(id)?.kind
                && &*att.qname == qname
            {
                att.value = value.into();
                att.specified = specified;
                return Ok(id);
            }
        }
        let attribute = AttributeNode {
            qname: qname.into(),
            uri: uri.map(Arc::from),
            local_name: local_name.map(Arc::from),
            value: value.into(),
            specified,
        };
        self.push(element, NodeKind::Attribute(attribute))
    }

    /// Append `data` to `parent`, merging it into the last child if that is a text node.
    pub fn append_text(&mut self, parent: NodeId, data: &str) -> Result<NodeId, XMLError> {
        self.check_container(parent)?;
        if let Some(&last) = self.node(parent)?.children.last()
            && let NodeKind::Text(text) = &mut self.node_mut(last)?.kind
        {
            text.push_str(data);
            return Ok(last);
        }
        self.push(parent, NodeKind::Text(data.to_owned()))
    }

    pub fn append_cdata_section(&mut self, parent: NodeId, data: &str) -> Result<NodeId, XMLError> {
        self.check_container(parent)?;
        self.push(parent, NodeKind::CDATASection(data.to_owned()))
    }

    pub fn append_comment(&mut self, parent: NodeId, data: &str) -> Result<NodeId, XMLError> {
        self.check_container(parent)?;
        self.push(parent, NodeKind::Comment(data.into()))
    }

    pub fn append_processing_instruction(
        &mut self,
        parent: NodeId,
        target: &str,
        data: Option<&str>,
    ) -> Result<NodeId, XMLError> {
        self.check_container(parent)?;
        let pi = ProcessingInstructionNode {
            target: target.into(),
            data: data.map(Box::from),
        };
        self.push(parent, NodeKind::ProcessingInstruction(pi))
    }

    pub fn append_doctype(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        system_id: Option<&str>,
    ) -> Result<NodeId, XMLError> {
        let doctype = DocumentTypeNode {
            name: name.into(),
            public_id: public_id.map(Box::from),
            system_id: system_id.map(Box::from),
        };
        self.push(NodeId::DOCUMENT, NodeKind::DocumentType(doctype))
    }

    pub(crate) fn set_declaration(
        &mut self,
        version: &str,
        encoding: Option<&str>,
        standalone: Option<bool>,
    ) {
        if let NodeKind::Document(document) = &mut self.nodes[0].kind {
            document.version = Some(version.into());
            document.encoding = encoding.map(Box::from);
            document.standalone = standalone;
        }
    }

    // Only the document node and elements have children.
    fn check_container(&self, id: NodeId) -> Result<(), XMLError> {
        match self.kind(id)? {
            NodeKind::Document(_) | NodeKind::Element(_) => Ok(()),
            _ => Err(XMLError::DOMNodeKindMismatch),
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

/// The iterator returned by [`Document::descendants`].
pub struct Descendants<'a> {
    document: &'a Document,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        if let Some(node) = self.document.nodes.get(id.0) {
            self.stack.extend(node.children.iter().rev());
        }
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Document, NodeId) {
        let mut document = Document::new();
        let root = document
            .append_element(NodeId::DOCUMENT, "doc", None, None)
            .unwrap();
        document.set_attribute(root, "id", None, None, "d1", true).unwrap();
        let child = document.append_element(root, "p", None, None).unwrap();
        document.append_text(child, "Hello, ").unwrap();
        document.append_text(child, "world").unwrap();
        document.append_comment(root, " note ").unwrap();
        document.append_cdata_section(root, "<raw>").unwrap();
        (document, root)
    }

    #[test]
    fn tree_tests() {
        let (document, root) = sample();
        assert_eq!(document.document_element(), Some(root));
        assert_eq!(document.children(root).unwrap().len(), 3);
        let p = document.children(root).unwrap()[0];
        // adjacent text is merged
        assert_eq!(document.children(p).unwrap().len(), 1);
        assert_eq!(document.parent(p).unwrap(), Some(root));
        assert_eq!(document.text_content(root).unwrap(), "Hello, world<raw>");
        assert_eq!(document.get_attribute(root, "id").unwrap(), Some("d1"));
        assert_eq!(document.get_attribute(root, "missing").unwrap(), None);
        assert_eq!(document.get_elements_by_qname(NodeId::DOCUMENT, "p").count(), 1);
        let att = document.as_element(root).unwrap().attributes()[0];
        assert_eq!(document.parent(att).unwrap(), Some(root));
        assert!(!document.children(root).unwrap().contains(&att));
    }

    #[test]
    fn kind_mismatch_tests() {
        let (mut document, root) = sample();
        let p = document.children(root).unwrap()[0];
        let text = document.children(p).unwrap()[0];
        assert_eq!(document.node_type(text).unwrap(), NodeType::Text);
        assert!(matches!(
            document.as_element(text),
            Err(XMLError::DOMNodeKindMismatch)
        ));
        assert!(matches!(
            document.append_element(text, "x", None, None),
            Err(XMLError::DOMNodeKindMismatch)
        ));
        assert!(matches!(
            document.set_attribute(text, "a", None, None, "v", true),
            Err(XMLError::DOMNodeKindMismatch)
        ));
        assert!(matches!(
            document.kind(NodeId(1000)),
            Err(XMLError::DOMInvalidNodeId)
        ));
        assert_eq!(document.descendants(NodeId(1000)).count(), 0);
    }
}
