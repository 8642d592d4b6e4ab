use std::sync::Arc;

use crate::{
    dom::{Document, NodeId},
    error::XMLError,
    grammar::dtd::{AttributeType, ContentSpec, DefaultDecl},
    sax::{
        Locator,
        attributes::Attributes,
        error::SAXParseError,
        handler::{DefaultSAXHandler, EntityResolver, SAXHandler},
        source::InputSource,
    },
};

/// Builds a [`Document`] from the events of a reader and forwards every event to
/// `handler`.
pub struct DOMBuilder<H: SAXHandler = DefaultSAXHandler> {
    handler: H,
    document: Document,
    cur: NodeId,
    node_stack: Vec<NodeId>,
    in_cdata: bool,
    in_dtd: bool,
    keep_ignorable_whitespace: bool,
    locator: Option<Arc<Locator>>,
}

impl DOMBuilder {
    pub fn new() -> Self {
        Self::with_handler(DefaultSAXHandler)
    }
}

impl Default for DOMBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: SAXHandler> DOMBuilder<H> {
    pub fn with_handler(handler: H) -> Self {
        Self {
            handler,
            document: Document::new(),
            cur: NodeId::DOCUMENT,
            node_stack: vec![],
            in_cdata: false,
            in_dtd: false,
            keep_ignorable_whitespace: true,
            locator: None,
        }
    }

    /// If `false`, whitespace in element content is not added to the tree.
    pub fn set_keep_ignorable_whitespace(&mut self, keep: bool) {
        self.keep_ignorable_whitespace = keep;
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn into_document(self) -> Document {
        self.document
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    fn check(&self, result: Result<NodeId, XMLError>) {
        if let Err(err) = result {
            log::warn!("the node under {} cannot be appended: {err}", self.cur);
        }
    }

    fn add_text(&mut self, data: &str) {
        let result = if self.in_cdata {
            self.document.append_cdata_section(self.cur, data)
        } else {
            self.document.append_text(self.cur, data)
        };
        self.check(result);
    }
}

impl<H: SAXHandler> EntityResolver for DOMBuilder<H> {
    fn get_external_subset(
        &mut self,
        name: &str,
        base_uri: Option<&str>,
    ) -> Result<Option<InputSource>, XMLError> {
        self.handler.get_external_subset(name, base_uri)
    }

    fn resolve_entity(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        base_uri: Option<&str>,
        system_id: &str,
    ) -> Result<Option<InputSource>, XMLError> {
        self.handler
            .resolve_entity(name, public_id, base_uri, system_id)
    }
}

impl<H: SAXHandler> SAXHandler for DOMBuilder<H> {
    fn characters(&mut self, data: &str) {
        self.handler.characters(data);
        if self.cur != NodeId::DOCUMENT {
            self.add_text(data);
        }
    }

    fn declaration(&mut self, version: &str, encoding: Option<&str>, standalone: Option<bool>) {
        self.handler.declaration(version, encoding, standalone);
        self.document.set_declaration(version, encoding, standalone);
    }

    fn ignorable_whitespace(&mut self, data: &str) {
        self.handler.ignorable_whitespace(data);
        if self.keep_ignorable_whitespace {
            self.add_text(data);
        }
    }

    fn processing_instruction(&mut self, target: &str, data: Option<&str>) {
        self.handler.processing_instruction(target, data);
        if !self.in_dtd {
            let result = self
                .document
                .append_processing_instruction(self.cur, target, data);
            self.check(result);
        }
    }

    fn set_document_locator(&mut self, locator: Arc<Locator>) {
        self.handler.set_document_locator(locator.clone());
        self.locator = Some(locator);
    }

    fn skipped_entity(&mut self, name: &str) {
        self.handler.skipped_entity(name);
    }

    fn start_document(&mut self) {
        self.handler.start_document();
        self.document = Document::new();
        self.cur = NodeId::DOCUMENT;
        self.node_stack.clear();
        self.in_cdata = false;
        self.in_dtd = false;
    }

    fn end_document(&mut self) {
        self.handler.end_document();
    }

    fn start_element(
        &mut self,
        uri: Option<&str>,
        local_name: Option<&str>,
        qname: &str,
        atts: &Attributes,
    ) {
        self.handler.start_element(uri, local_name, qname, atts);
        let element = match self.document.append_element(self.cur, qname, uri, local_name) {
            Ok(element) => element,
            Err(err) => {
                log::warn!("the element '{qname}' cannot be appended: {err}");
                return;
            }
        };
        if let Some(locator) = &self.locator
            && let Err(err) = self
                .document
                .set_position(element, locator.line(), locator.column())
        {
            log::warn!("the position of '{qname}' cannot be recorded: {err}");
        }
        for att in atts {
            let result = self.document.set_attribute(
                element,
                &att.qname,
                att.uri.as_deref(),
                att.local_name.as_deref(),
                &att.value,
                att.is_specified(),
            );
            self.check(result);
        }
        self.node_stack.push(self.cur);
        self.cur = element;
    }

    fn end_element(&mut self, uri: Option<&str>, local_name: Option<&str>, qname: &str) {
        self.handler.end_element(uri, local_name, qname);
        if let Some(parent) = self.node_stack.pop() {
            self.cur = parent;
        }
    }

    fn start_prefix_mapping(&mut self, prefix: Option<&str>, uri: &str) {
        self.handler.start_prefix_mapping(prefix, uri);
    }

    fn end_prefix_mapping(&mut self, prefix: Option<&str>) {
        self.handler.end_prefix_mapping(prefix);
    }

    fn attribute_decl(
        &mut self,
        element_name: &str,
        attribute_name: &str,
        attribute_type: &AttributeType,
        default_decl: &DefaultDecl,
    ) {
        self.handler
            .attribute_decl(element_name, attribute_name, attribute_type, default_decl);
    }

    fn element_decl(&mut self, name: &str, contentspec: &ContentSpec) {
        self.handler.element_decl(name, contentspec);
    }

    fn external_entity_decl(&mut self, name: &str, public_id: Option<&str>, system_id: &str) {
        self.handler.external_entity_decl(name, public_id, system_id);
    }

    fn internal_entity_decl(&mut self, name: &str, value: &str) {
        self.handler.internal_entity_decl(name, value);
    }

    fn notation_decl(&mut self, name: &str, public_id: Option<&str>, system_id: Option<&str>) {
        self.handler.notation_decl(name, public_id, system_id);
    }

    fn unparsed_entity_decl(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        system_id: &str,
        notation_name: &str,
    ) {
        self.handler
            .unparsed_entity_decl(name, public_id, system_id, notation_name);
    }

    fn error(&mut self, error: SAXParseError) {
        self.handler.error(error);
    }

    fn fatal_error(&mut self, error: SAXParseError) {
        self.handler.fatal_error(error);
    }

    fn warning(&mut self, error: SAXParseError) {
        self.handler.warning(error);
    }

    fn comment(&mut self, data: &str) {
        self.handler.comment(data);
        if !self.in_dtd {
            let result = self.document.append_comment(self.cur, data);
            self.check(result);
        }
    }

    fn start_cdata(&mut self) {
        self.handler.start_cdata();
        self.in_cdata = true;
    }

    fn end_cdata(&mut self) {
        self.handler.end_cdata();
        self.in_cdata = false;
    }

    fn start_dtd(&mut self, name: &str, public_id: Option<&str>, system_id: Option<&str>) {
        self.handler.start_dtd(name, public_id, system_id);
        let result = self.document.append_doctype(name, public_id, system_id);
        self.check(result);
        self.in_dtd = true;
    }

    fn end_dtd(&mut self) {
        self.handler.end_dtd();
        self.in_dtd = false;
    }

    fn start_entity(&mut self, name: &str) {
        self.handler.start_entity(name);
    }

    fn end_entity(&mut self) {
        self.handler.end_entity();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dom::{NodeKind, NodeType},
        sax::{
            handler::ErrorCollector,
            parser::{ParserOption, XMLReaderBuilder},
        },
    };

    #[test]
    fn build_tests() {
        let mut reader = XMLReaderBuilder::new()
            .set_handler(DOMBuilder::with_handler(ErrorCollector::new()))
            .build();
        reader
            .parse_str(
                r#"<?xml version="1.0"?>
<!DOCTYPE doc [
  <!-- in the DTD -->
  <!ATTLIST doc lang CDATA "en">
]>
<doc><!-- body --><p>a<![CDATA[<b>]]>c</p><?pi data?></doc>"#,
                None,
            )
            .unwrap();
        let builder = reader.into_handler();
        assert!(!builder.handler().has_errors());
        let document = builder.into_document();

        let doctype = document.doctype().unwrap();
        assert_eq!(document.as_document_type(doctype).unwrap().name.as_ref(), "doc");
        let root = document.document_element().unwrap();
        let lang = document.as_element(root).unwrap().attributes()[0];
        let lang = document.as_attribute(lang).unwrap();
        assert_eq!(lang.value(), "en");
        assert!(!lang.is_specified());

        let children = document.children(root).unwrap();
        let types = children
            .iter()
            .map(|&id| document.node_type(id).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(
            types,
            [
                NodeType::Comment,
                NodeType::Element,
                NodeType::ProcessingInstruction
            ]
        );
        assert_eq!(document.text_content(children[1]).unwrap(), "a<b>c");
        assert_eq!(document.position(root).map(|(line, _)| line), Some(6));
        assert_eq!(document.position(children[1]).map(|(line, _)| line), Some(6));
        assert_eq!(document.position(NodeId::DOCUMENT), None);
        let p = document.children(children[1]).unwrap();
        assert!(matches!(document.kind(p[1]).unwrap(), NodeKind::CDATASection(_)));
        assert_eq!(
            document.as_document(NodeId::DOCUMENT).unwrap().version.as_deref(),
            Some("1.0")
        );
    }

    #[test]
    fn namespace_tests() {
        let mut reader = XMLReaderBuilder::new()
            .set_handler(DOMBuilder::with_handler(ErrorCollector::new()))
            .set_option(ParserOption::Namespaces, true)
            .build();
        reader
            .parse_str(r#"<x:doc xmlns:x="urn:x" x:a="1"/>"#, None)
            .unwrap();
        let document = reader.into_handler().into_document();
        let root = document.document_element().unwrap();
        let element = document.as_element(root).unwrap();
        assert_eq!(element.namespace_uri(), Some("urn:x"));
        assert_eq!(element.local_name(), Some("doc"));
        assert_eq!(
            document.get_attribute_ns(root, Some("urn:x"), "a").unwrap(),
            Some("1")
        );
    }
}
