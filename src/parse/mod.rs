mod cdsect;
mod char_data;
mod comment;
mod content;
mod dtd;
mod element;
mod literals;
mod pi;
mod tokens;
mod xmldecl;

use std::{mem::replace, sync::Arc};

use crate::{
    XML_NS_NAMESPACE, XML_XML_NAMESPACE,
    datatype::ValidationContext,
    error::XMLError,
    grammar::dtd::DTDGrammar,
    sax::{
        error::{fatal_error, warning},
        handler::SAXHandler,
        parser::{ParserOption, ParserState, XMLReader},
        source::{InputSource, SourceKind},
    },
    util::resolve_system_id,
    validation::Violation,
};

/// Entities nested deeper than this are treated as recursive.
const MAX_ENTITY_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntityKind {
    General,
    /// `in_markup` is `true` if the reference appears inside a markup declaration.
    Parameter { in_markup: bool },
    ExternalSubset,
}

/// A suspended input source and the entity that replaced it.
pub(crate) struct EntityFrame {
    parent: InputSource,
    /// The name of the entity being read. Parameter entities start with `%`.
    pub(crate) name: Arc<str>,
    pub(crate) kind: EntityKind,
    /// The depth of the element stack when the entity was entered.
    pub(crate) depth: usize,
    line: usize,
    column: usize,
    system_id: Arc<str>,
    public_id: Option<Arc<str>>,
}

pub(crate) struct OpenElement {
    pub(crate) qname: Arc<str>,
    pub(crate) uri: Option<Arc<str>>,
    pub(crate) local_name: Option<Arc<str>>,
    /// The length of the namespace stack before this element's declarations.
    pub(crate) ns_depth: usize,
    /// Declared with element content in the DTD.
    pub(crate) element_only: bool,
    /// Whitespace in this element matters to a standalone document.
    pub(crate) external_element_content: bool,
    pub(crate) entity_depth: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct NamespaceBinding {
    /// `None` for the default namespace.
    pub(crate) prefix: Option<Arc<str>>,
    /// Empty if the binding undeclares the default namespace.
    pub(crate) uri: Arc<str>,
}

/// The result of looking at the next input of the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scanned {
    Markup,
    /// The replacement text of the current entity is exhausted.
    EndOfEntity,
    /// The document entity is exhausted.
    EndOfInput,
}

/// Provides in-scope namespaces and unparsed entities to datatype validators.
pub(crate) struct DocumentContext<'a> {
    namespaces: &'a [NamespaceBinding],
    dtd: Option<&'a DTDGrammar>,
    checks_prefixes: bool,
}

impl<'a> DocumentContext<'a> {
    pub(crate) fn new(
        namespaces: &'a [NamespaceBinding],
        dtd: Option<&'a DTDGrammar>,
        checks_prefixes: bool,
    ) -> Self {
        Self {
            namespaces,
            dtd,
            checks_prefixes,
        }
    }
}

pub(crate) fn lookup_namespace<'a>(
    namespaces: &'a [NamespaceBinding],
    prefix: Option<&str>,
) -> Option<&'a str> {
    match prefix {
        Some("xml") => return Some(XML_XML_NAMESPACE),
        Some("xmlns") => return Some(XML_NS_NAMESPACE),
        _ => {}
    }
    namespaces
        .iter()
        .rev()
        .find(|binding| binding.prefix.as_deref() == prefix)
        .map(|binding| binding.uri.as_ref())
        .filter(|uri| !uri.is_empty())
}

impl ValidationContext for DocumentContext<'_> {
    fn namespace_of(&self, prefix: Option<&str>) -> Option<String> {
        lookup_namespace(self.namespaces, prefix).map(str::to_owned)
    }

    fn checks_prefixes(&self) -> bool {
        self.checks_prefixes
    }

    fn is_unparsed_entity(&self, name: &str) -> bool {
        self.dtd
            .and_then(|dtd| dtd.get_entity(name))
            .is_some_and(|decl| decl.is_unparsed())
    }
}

impl<H: SAXHandler> XMLReader<H> {
    pub(crate) fn scan_step(&mut self) -> Result<bool, XMLError> {
        match self.state {
            ParserState::BeforeDocument => {
                self.handler.set_document_locator(self.locator.clone());
                self.handler.start_document();
                if self.starts_with("<?xml")? {
                    self.source.fill(6)?;
                    if self.source.content_bytes().get(5).is_some_and(|&b| {
                        self.version.is_whitespace(b)
                    }) {
                        self.parse_xml_decl()?;
                    }
                }
                self.state = ParserState::Prolog;
            }
            ParserState::Prolog => self.scan_prolog()?,
            ParserState::Content => {
                self.scan_content()?;
                if self.element_stack.is_empty() && self.state == ParserState::Content {
                    self.state = ParserState::AfterRootElement;
                }
            }
            ParserState::AfterRootElement => self.scan_after_root()?,
            ParserState::Done => return Ok(false),
            ParserState::FatalErrorOccurred => {
                return Err(self
                    .first_fatal_error
                    .clone()
                    .unwrap_or(XMLError::InternalError));
            }
        }
        Ok(self.state != ParserState::Done)
    }

    fn scan_prolog(&mut self) -> Result<(), XMLError> {
        self.skip_whitespaces()?;
        self.grow()?;
        let content = self.source.content_bytes();
        if content.is_empty() {
            fatal_error!(self, ParserUnexpectedEOF, "The document has no root element.");
            return Err(XMLError::ParserUnexpectedEOF);
        }
        if content.starts_with(b"<?") {
            self.parse_pi()
        } else if content.starts_with(b"<!--") {
            self.parse_comment()
        } else if content.starts_with(b"<!DOCTYPE") {
            if !self.dtd_name.is_empty() {
                fatal_error!(
                    self,
                    ParserInvalidDoctypeDecl,
                    "The document type declaration must appear only once."
                );
                return Err(XMLError::ParserInvalidDoctypeDecl);
            }
            self.parse_doctypedecl()
        } else if content.starts_with(b"<") {
            self.state = ParserState::Content;
            Ok(())
        } else {
            fatal_error!(
                self,
                ParserUnexpectedDocumentContent,
                "Only comments, processing instructions and the document type declaration are allowed before the root element."
            );
            Err(XMLError::ParserUnexpectedDocumentContent)
        }
    }

    fn scan_after_root(&mut self) -> Result<(), XMLError> {
        self.skip_whitespaces()?;
        self.grow()?;
        let content = self.source.content_bytes();
        if content.is_empty() {
            return self.finish_document();
        }
        if content.starts_with(b"<?") {
            self.parse_pi()
        } else if content.starts_with(b"<!--") {
            self.parse_comment()
        } else {
            fatal_error!(
                self,
                ParserUnexpectedDocumentContent,
                "Only comments and processing instructions are allowed after the root element."
            );
            Err(XMLError::ParserUnexpectedDocumentContent)
        }
    }

    fn finish_document(&mut self) -> Result<(), XMLError> {
        if self.validates_with_dtd() {
            let violations = self.dtd_validator.end_document();
            self.report_violations(violations);
        }
        if self.validates_with_schema() {
            let violations = self.schema_validator.end_document();
            self.report_violations(violations);
        }
        if self.config.is_enable(ParserOption::CacheGrammarFromParse)
            && !self.fatal_error_occurred
            && let Err(err) = self.resolver.cache_grammars()
        {
            warning!(self, err, "Grammars of this document cannot be cached.");
        }
        if !self.fatal_error_occurred {
            self.handler.end_document();
        }
        self.state = ParserState::Done;
        Ok(())
    }

    pub(crate) fn report_violations(&mut self, violations: Vec<Violation>) {
        for violation in violations {
            self.report(
                self.validity_error_level(),
                violation.error,
                violation.message.into(),
            );
        }
    }

    /// Check if the content is validated against the DTD.
    pub(crate) fn validates_with_dtd(&self) -> bool {
        self.config.is_enable(ParserOption::Validation) && self.dtd.is_some()
    }

    pub(crate) fn validates_with_schema(&self) -> bool {
        self.config.is_enable(ParserOption::SchemaValidation)
    }

    pub(crate) fn grow(&mut self) -> Result<(), XMLError> {
        self.source.grow()
    }

    pub(crate) fn starts_with(&mut self, pattern: &str) -> Result<bool, XMLError> {
        self.source.starts_with(pattern)
    }

    fn tracks_position(&self) -> bool {
        self.source.kind() == SourceKind::External
    }

    /// Skip `len` bytes of markup that contains no line breaks.
    pub(crate) fn advance(&mut self, len: usize) -> Result<(), XMLError> {
        self.source.advance(len)?;
        if self.tracks_position() {
            self.locator.update_column(|c| c + len);
        }
        Ok(())
    }

    pub(crate) fn peek_char(&mut self) -> Result<Option<char>, XMLError> {
        self.source.peek_char()
    }

    pub(crate) fn next_char(&mut self) -> Result<Option<char>, XMLError> {
        let c = self.source.next_char()?;
        if self.tracks_position() {
            match c {
                Some('\n') => {
                    self.locator.update_line(|l| l + 1);
                    self.locator.set_column(1);
                }
                Some(_) => self.locator.update_column(|c| c + 1),
                None => {}
            }
        }
        Ok(c)
    }

    pub(crate) fn next_char_if(
        &mut self,
        f: impl Fn(char) -> bool,
    ) -> Result<Option<char>, XMLError> {
        match self.source.peek_char()? {
            Some(c) if f(c) => self.next_char(),
            _ => Ok(None),
        }
    }

    /// Look at the next input of the content without consuming it.
    pub(crate) fn peek_markup(&mut self) -> Result<Scanned, XMLError> {
        if !self.source.is_eof()? {
            Ok(Scanned::Markup)
        } else if self.entity_stack.is_empty() {
            Ok(Scanned::EndOfInput)
        } else {
            Ok(Scanned::EndOfEntity)
        }
    }

    /// The base URI of the current input: the system identifier of the innermost
    /// external entity.
    pub(crate) fn base_uri(&self) -> Option<Arc<str>> {
        if let Some(system_id) = self.source.system_id() {
            return Some(system_id.clone());
        }
        self.entity_stack
            .iter()
            .rev()
            .find_map(|frame| frame.parent.system_id().cloned())
    }

    pub(crate) fn is_entity_active(&self, name: &str) -> bool {
        self.entity_stack
            .iter()
            .any(|frame| frame.name.as_ref() == name)
    }

    /// Check if the current input belongs to external markup, that is, the external
    /// subset or a parameter entity.
    pub(crate) fn in_external_markup(&self) -> bool {
        self.entity_stack.iter().any(|frame| {
            matches!(
                frame.kind,
                EntityKind::ExternalSubset | EntityKind::Parameter { .. }
            )
        })
    }

    /// Suspend the current input and continue with `source`.
    pub(crate) fn push_entity(
        &mut self,
        source: InputSource,
        name: Arc<str>,
        kind: EntityKind,
    ) -> Result<(), XMLError> {
        if self.entity_stack.len() >= MAX_ENTITY_DEPTH {
            fatal_error!(
                self,
                ParserEntityRecursion,
                "Entities are nested too deeply at '{}'.",
                name
            );
            return Err(XMLError::ParserEntityRecursion);
        }
        log::trace!("push entity '{name}'");
        let external = source.kind() == SourceKind::External;
        let system_id = source.system_id().cloned();
        let public_id = source.public_id().cloned();
        let parent = replace(&mut self.source, source);
        self.entity_stack.push(EntityFrame {
            parent,
            name,
            kind,
            depth: self.element_stack.len(),
            line: self.locator.line(),
            column: self.locator.column(),
            system_id: self.locator.system_id(),
            public_id: self.locator.public_id(),
        });
        if external {
            self.locator
                .set_system_id(system_id.unwrap_or_else(|| "".into()));
            self.locator.set_public_id(public_id);
            self.locator.set_line(1);
            self.locator.set_column(1);
        }
        Ok(())
    }

    /// Return to the input suspended by the last [`XMLReader::push_entity`].
    pub(crate) fn pop_entity(&mut self) -> Option<(Arc<str>, EntityKind, usize)> {
        let frame = self.entity_stack.pop()?;
        log::trace!("pop entity '{}'", frame.name);
        let finished = replace(&mut self.source, frame.parent);
        if finished.kind() == SourceKind::External {
            self.locator.set_system_id(frame.system_id);
            self.locator.set_public_id(frame.public_id);
            self.locator.set_line(frame.line);
            self.locator.set_column(frame.column);
        }
        Some((frame.name, frame.kind, frame.depth))
    }

    /// Open an external entity.
    ///
    /// The handler is asked first. If it leaves the resolution to the reader, the system
    /// identifier is resolved against `base_uri` and read from the file system.
    pub(crate) fn open_external_entity(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        base_uri: Option<&str>,
        system_id: &str,
    ) -> Result<InputSource, XMLError> {
        if let Some(mut source) =
            self.handler
                .resolve_entity(name, public_id, base_uri, system_id)?
        {
            if source.system_id().is_none() {
                source.set_system_id(resolve_system_id(base_uri, system_id));
            }
            return Ok(source);
        }
        let path = resolve_system_id(base_uri, system_id);
        log::debug!("read external entity '{name}' from '{path}'");
        let mut source = InputSource::from_path(&path)?;
        if let Some(public_id) = public_id {
            source.set_public_id(public_id);
        }
        Ok(source)
    }
}
