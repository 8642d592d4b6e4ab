use std::{fmt::Write as _, sync::Arc};

use crate::{
    error::XMLError,
    grammar::dtd::{AttributeType, ContentSpec, DefaultDecl},
    sax::{Locator, attributes::Attributes, error::SAXParseError, source::InputSource},
};

/// Receives the events of [`XMLReader`](crate::sax::parser::XMLReader).
///
/// Every method has an empty default implementation, so implementors only override the
/// events they are interested in.
pub trait SAXHandler: EntityResolver {
    /// # Reference
    /// [`ContentHandler` interface in Java SAX API](https://docs.oracle.com/javase/jp/21/docs/api/java.xml/org/xml/sax/ContentHandler.html)
    fn characters(&mut self, data: &str) {
        let _ = data;
    }

    /// Reports the XML declaration.
    fn declaration(&mut self, version: &str, encoding: Option<&str>, standalone: Option<bool>) {
        let _ = (version, encoding, standalone);
    }

    /// Whitespace in element content.
    ///
    /// This is reported only if the element is declared to have element content.
    fn ignorable_whitespace(&mut self, data: &str) {
        let _ = data;
    }

    fn processing_instruction(&mut self, target: &str, data: Option<&str>) {
        let _ = (target, data);
    }

    /// Called before any other event of a document.
    fn set_document_locator(&mut self, locator: Arc<Locator>) {
        let _ = locator;
    }

    /// An entity reference was not expanded.
    fn skipped_entity(&mut self, name: &str) {
        let _ = name;
    }

    fn start_document(&mut self) {}
    /// Called only if no fatal error occurred.
    fn end_document(&mut self) {}

    /// `uri` and `local_name` are `None` if namespace processing is disabled.
    fn start_element(
        &mut self,
        uri: Option<&str>,
        local_name: Option<&str>,
        qname: &str,
        atts: &Attributes,
    ) {
        let _ = (uri, local_name, qname, atts);
    }
    fn end_element(&mut self, uri: Option<&str>, local_name: Option<&str>, qname: &str) {
        let _ = (uri, local_name, qname);
    }

    /// `prefix` is `None` for the default namespace.
    fn start_prefix_mapping(&mut self, prefix: Option<&str>, uri: &str) {
        let _ = (prefix, uri);
    }
    fn end_prefix_mapping(&mut self, prefix: Option<&str>) {
        let _ = prefix;
    }

    /// # Reference
    /// [`DeclHandler` interface in Java SAX API](https://docs.oracle.com/javase/jp/21/docs/api/java.xml/org/xml/sax/ext/DeclHandler.html)
    fn attribute_decl(
        &mut self,
        element_name: &str,
        attribute_name: &str,
        attribute_type: &AttributeType,
        default_decl: &DefaultDecl,
    ) {
        let _ = (element_name, attribute_name, attribute_type, default_decl);
    }

    fn element_decl(&mut self, name: &str, contentspec: &ContentSpec) {
        let _ = (name, contentspec);
    }

    fn external_entity_decl(&mut self, name: &str, public_id: Option<&str>, system_id: &str) {
        let _ = (name, public_id, system_id);
    }

    /// Parameter entities are reported with a leading `%`.
    fn internal_entity_decl(&mut self, name: &str, value: &str) {
        let _ = (name, value);
    }

    /// # Reference
    /// [`DTDHandler` interface in Java SAX API](https://docs.oracle.com/javase/jp/21/docs/api/java.xml/org/xml/sax/DTDHandler.html)
    fn notation_decl(&mut self, name: &str, public_id: Option<&str>, system_id: Option<&str>) {
        let _ = (name, public_id, system_id);
    }

    fn unparsed_entity_decl(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        system_id: &str,
        notation_name: &str,
    ) {
        let _ = (name, public_id, system_id, notation_name);
    }

    /// Recoverable errors, including validity errors.
    ///
    /// # Reference
    /// [`ErrorHandler` interface in Java SAX API](https://docs.oracle.com/javase/jp/21/docs/api/java.xml/org/xml/sax/ErrorHandler.html)
    fn error(&mut self, error: SAXParseError) {
        let _ = error;
    }

    /// After a fatal error, no content events are reported.
    fn fatal_error(&mut self, error: SAXParseError) {
        let _ = error;
    }

    fn warning(&mut self, error: SAXParseError) {
        let _ = error;
    }

    /// # Reference
    /// [`LexicalHandler` interface in Java SAX API](https://docs.oracle.com/javase/jp/21/docs/api/java.xml/org/xml/sax/ext/LexicalHandler.html)
    fn comment(&mut self, data: &str) {
        let _ = data;
    }

    fn start_cdata(&mut self) {}
    fn end_cdata(&mut self) {}

    fn start_dtd(&mut self, name: &str, public_id: Option<&str>, system_id: Option<&str>) {
        let _ = (name, public_id, system_id);
    }
    fn end_dtd(&mut self) {}

    /// The external subset is reported as `[dtd]`, parameter entities with a leading `%`.
    fn start_entity(&mut self, name: &str) {
        let _ = name;
    }
    fn end_entity(&mut self) {}
}

/// Resolves external entities.
///
/// Returning `Ok(None)` asks the reader for the default resolution, which reads the
/// local file the system identifier points to.
pub trait EntityResolver {
    /// Provide an external subset for a document without one.
    ///
    /// # Reference
    /// [`EntityResolver2` interface in Java SAX API](https://docs.oracle.com/javase/jp/21/docs/api/java.xml/org/xml/sax/ext/EntityResolver2.html)
    fn get_external_subset(
        &mut self,
        name: &str,
        base_uri: Option<&str>,
    ) -> Result<Option<InputSource>, XMLError> {
        let _ = (name, base_uri);
        Ok(None)
    }

    /// When handling untrusted XML documents, it is recommended to implement custom logic
    /// to prevent unexpected access to local resources.
    fn resolve_entity(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        base_uri: Option<&str>,
        system_id: &str,
    ) -> Result<Option<InputSource>, XMLError> {
        let _ = (name, public_id, base_uri, system_id);
        Ok(None)
    }
}

/// Prints errors and warnings to the standard error, and ignores everything else.
pub struct DefaultSAXHandler;

impl SAXHandler for DefaultSAXHandler {
    fn error(&mut self, error: SAXParseError) {
        eprintln!("{error}")
    }

    fn fatal_error(&mut self, error: SAXParseError) {
        eprintln!("{error}")
    }

    fn warning(&mut self, error: SAXParseError) {
        eprintln!("{error}")
    }
}
impl EntityResolver for DefaultSAXHandler {}

/// Records every event in `buffer`, one line per event, and forwards it to `child`.
pub struct DebugHandler<Child: SAXHandler = DefaultSAXHandler> {
    pub buffer: String,
    pub child: Child,
}

impl<Child: SAXHandler> DebugHandler<Child> {
    pub fn new(child: Child) -> Self {
        Self {
            buffer: String::new(),
            child,
        }
    }
}

impl<Child: SAXHandler> EntityResolver for DebugHandler<Child> {
    fn get_external_subset(
        &mut self,
        name: &str,
        base_uri: Option<&str>,
    ) -> Result<Option<InputSource>, XMLError> {
        writeln!(self.buffer, "getExternalSubset({name}, {base_uri:?})").ok();
        self.child.get_external_subset(name, base_uri)
    }

    fn resolve_entity(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        base_uri: Option<&str>,
        system_id: &str,
    ) -> Result<Option<InputSource>, XMLError> {
        writeln!(
            self.buffer,
            "resolveEntity({name}, {public_id:?}, {base_uri:?}, {system_id})"
        )
        .ok();
        self.child
            .resolve_entity(name, public_id, base_uri, system_id)
    }
}

impl<Child: SAXHandler> SAXHandler for DebugHandler<Child> {
    fn characters(&mut self, data: &str) {
        writeln!(self.buffer, "characters({data})").ok();
        self.child.characters(data);
    }

    fn declaration(&mut self, version: &str, encoding: Option<&str>, standalone: Option<bool>) {
        writeln!(
            self.buffer,
            "declaration({version}, {encoding:?}, {standalone:?})"
        )
        .ok();
        self.child.declaration(version, encoding, standalone);
    }

    fn ignorable_whitespace(&mut self, data: &str) {
        writeln!(self.buffer, "ignorableWhitespace({data})").ok();
        self.child.ignorable_whitespace(data);
    }

    fn processing_instruction(&mut self, target: &str, data: Option<&str>) {
        writeln!(self.buffer, "processingInstruction({target}, {data:?})").ok();
        self.child.processing_instruction(target, data);
    }

    fn set_document_locator(&mut self, locator: Arc<Locator>) {
        writeln!(self.buffer, "setDocumentLocator()").ok();
        self.child.set_document_locator(locator);
    }

    fn skipped_entity(&mut self, name: &str) {
        writeln!(self.buffer, "skippedEntity({name})").ok();
        self.child.skipped_entity(name);
    }

    fn start_document(&mut self) {
        writeln!(self.buffer, "startDocument()").ok();
        self.child.start_document();
    }
    fn end_document(&mut self) {
        writeln!(self.buffer, "endDocument()").ok();
        self.child.end_document();
    }

    fn start_element(
        &mut self,
        uri: Option<&str>,
        local_name: Option<&str>,
        qname: &str,
        atts: &Attributes,
    ) {
        write!(self.buffer, "startElement({uri:?}, {local_name:?}, {qname}").ok();
        for att in atts {
            write!(self.buffer, ", ").ok();
            if let Some(local_name) = att.local_name.as_deref() {
                write!(
                    self.buffer,
                    "{{{}}}{local_name}='{}'",
                    att.uri.as_deref().unwrap_or(""),
                    att.value
                )
                .ok();
            } else {
                write!(self.buffer, "{}='{}'", att.qname, att.value).ok();
            }
        }
        writeln!(self.buffer, ")").ok();
        self.child.start_element(uri, local_name, qname, atts);
    }
    fn end_element(&mut self, uri: Option<&str>, local_name: Option<&str>, qname: &str) {
        writeln!(self.buffer, "endElement({uri:?}, {local_name:?}, {qname})").ok();
        self.child.end_element(uri, local_name, qname);
    }

    fn start_prefix_mapping(&mut self, prefix: Option<&str>, uri: &str) {
        writeln!(self.buffer, "startPrefixMapping({prefix:?}, {uri})").ok();
        self.child.start_prefix_mapping(prefix, uri);
    }
    fn end_prefix_mapping(&mut self, prefix: Option<&str>) {
        writeln!(self.buffer, "endPrefixMapping({prefix:?})").ok();
        self.child.end_prefix_mapping(prefix);
    }

    fn attribute_decl(
        &mut self,
        element_name: &str,
        attribute_name: &str,
        attribute_type: &AttributeType,
        default_decl: &DefaultDecl,
    ) {
        writeln!(
            self.buffer,
            "attributeDecl({element_name}, {attribute_name}, {attribute_type}, {default_decl})"
        )
        .ok();
        self.child
            .attribute_decl(element_name, attribute_name, attribute_type, default_decl);
    }

    fn element_decl(&mut self, name: &str, contentspec: &ContentSpec) {
        writeln!(self.buffer, "elementDecl({name}, {contentspec})").ok();
        self.child.element_decl(name, contentspec);
    }

    fn external_entity_decl(&mut self, name: &str, public_id: Option<&str>, system_id: &str) {
        writeln!(
            self.buffer,
            "externalEntityDecl({name}, {public_id:?}, {system_id})"
        )
        .ok();
        self.child.external_entity_decl(name, public_id, system_id);
    }

    fn internal_entity_decl(&mut self, name: &str, value: &str) {
        writeln!(self.buffer, "internalEntityDecl({name}, {value})").ok();
        self.child.internal_entity_decl(name, value);
    }

    fn notation_decl(&mut self, name: &str, public_id: Option<&str>, system_id: Option<&str>) {
        writeln!(
            self.buffer,
            "notationDecl({name}, {public_id:?}, {system_id:?})"
        )
        .ok();
        self.child.notation_decl(name, public_id, system_id);
    }

    fn unparsed_entity_decl(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        system_id: &str,
        notation_name: &str,
    ) {
        writeln!(
            self.buffer,
            "unparsedEntityDecl({name}, {public_id:?}, {system_id}, {notation_name})",
        )
        .ok();
        self.child
            .unparsed_entity_decl(name, public_id, system_id, notation_name);
    }

    fn error(&mut self, error: SAXParseError) {
        writeln!(self.buffer, "error({:?})", error.error).ok();
        self.child.error(error);
    }

    fn fatal_error(&mut self, error: SAXParseError) {
        writeln!(self.buffer, "fatalError({:?})", error.error).ok();
        self.child.fatal_error(error);
    }

    fn warning(&mut self, error: SAXParseError) {
        writeln!(self.buffer, "warning({:?})", error.error).ok();
        self.child.warning(error);
    }

    fn comment(&mut self, data: &str) {
        writeln!(self.buffer, "comment({data})").ok();
        self.child.comment(data);
    }

    fn start_cdata(&mut self) {
        writeln!(self.buffer, "startCDATA()").ok();
        self.child.start_cdata();
    }
    fn end_cdata(&mut self) {
        writeln!(self.buffer, "endCDATA()").ok();
        self.child.end_cdata();
    }

    fn start_dtd(&mut self, name: &str, public_id: Option<&str>, system_id: Option<&str>) {
        writeln!(
            self.buffer,
            "startDTD({name}, {public_id:?}, {system_id:?})"
        )
        .ok();
        self.child.start_dtd(name, public_id, system_id);
    }
    fn end_dtd(&mut self) {
        writeln!(self.buffer, "endDTD()").ok();
        self.child.end_dtd();
    }

    fn start_entity(&mut self, name: &str) {
        writeln!(self.buffer, "startEntity({name})").ok();
        self.child.start_entity(name);
    }
    fn end_entity(&mut self) {
        writeln!(self.buffer, "endEntity()").ok();
        self.child.end_entity();
    }
}

impl Default for DebugHandler {
    fn default() -> Self {
        Self::new(DefaultSAXHandler)
    }
}

/// Collects every reported error. Useful for tests and tools that inspect errors after
/// parsing.
#[derive(Debug, Default)]
pub struct ErrorCollector {
    pub warnings: Vec<SAXParseError>,
    pub errors: Vec<SAXParseError>,
    pub fatal_errors: Vec<SAXParseError>,
}

impl ErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// All errors and warnings in order of severity.
    pub fn iter(&self) -> impl Iterator<Item = &SAXParseError> {
        self.fatal_errors
            .iter()
            .chain(&self.errors)
            .chain(&self.warnings)
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty() || !self.fatal_errors.is_empty()
    }
}

impl SAXHandler for ErrorCollector {
    fn error(&mut self, error: SAXParseError) {
        self.errors.push(error);
    }

    fn fatal_error(&mut self, error: SAXParseError) {
        self.fatal_errors.push(error);
    }

    fn warning(&mut self, error: SAXParseError) {
        self.warnings.push(error);
    }
}
impl EntityResolver for ErrorCollector {}
