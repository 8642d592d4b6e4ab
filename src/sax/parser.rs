use std::{borrow::Cow, io::Read, path::Path, sync::Arc};

use crate::{
    XMLVersion,
    environment::ParserEnvironment,
    error::{XMLError, XMLErrorLevel},
    grammar::{DTDGrammar, Grammar, GrammarPool, GrammarResolver, GrammarType},
    parse::{EntityFrame, NamespaceBinding, OpenElement},
    sax::{
        Locator,
        attributes::Attributes,
        error::SAXParseError,
        handler::{DefaultSAXHandler, SAXHandler},
        source::InputSource,
    },
    validation::{dtd::DTDValidator, schema::SchemaValidator},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParserOption {
    /// Process namespaces and report expanded names.
    Namespaces = 0,
    /// Validate the document against its DTD.
    Validation = 1,
    /// Validate the document against XML Schemas.
    SchemaValidation = 2,
    /// Read external parsed general entities.
    ExternalGeneralEntities = 3,
    /// Read the external subset and external parameter entities.
    ExternalParameterEntities = 4,
    /// External entities that cannot be read are skipped with a warning instead of
    /// stopping the parse.
    SkipUnresolvedEntities = 5,
    /// Report validity errors as fatal errors.
    ValidityErrorsAreFatal = 6,
    /// Check `xs:unique`, `xs:key` and `xs:keyref` while validating with schemas.
    IdentityConstraintChecking = 7,
    /// Store the grammars read during a parse in the grammar pool.
    CacheGrammarFromParse = 8,
    /// Use grammars stored in the grammar pool instead of reading them again.
    UseCachedGrammarInParse = 9,
}

impl std::ops::BitOr<Self> for ParserOption {
    type Output = ParserConfig;

    fn bitor(self, rhs: Self) -> Self::Output {
        ParserConfig {
            flags: (1 << self as i32) | (1 << rhs as i32),
        }
    }
}

impl std::ops::BitOr<ParserConfig> for ParserOption {
    type Output = ParserConfig;

    fn bitor(self, rhs: ParserConfig) -> Self::Output {
        ParserConfig {
            flags: rhs.flags | (1 << self as i32),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParserConfig {
    flags: u64,
}

impl ParserConfig {
    pub fn is_enable(&self, option: ParserOption) -> bool {
        self.flags & (1 << option as i32) != 0
    }

    pub fn get_option(&self, option: ParserOption) -> bool {
        (self.flags >> option as i32) & 1 != 0
    }

    pub fn set_option(&mut self, option: ParserOption, flag: bool) {
        if flag {
            self.flags |= 1 << (option as i32);
        } else {
            self.flags &= !(1 << (option as i32));
        }
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        ParserOption::Namespaces
            | ParserOption::ExternalGeneralEntities
            | ParserOption::ExternalParameterEntities
    }
}

impl From<ParserOption> for ParserConfig {
    fn from(value: ParserOption) -> Self {
        Self {
            flags: 1 << value as i32,
        }
    }
}

impl std::ops::BitOr<Self> for ParserConfig {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        ParserConfig {
            flags: self.flags | rhs.flags,
        }
    }
}

impl std::ops::BitOr<ParserOption> for ParserConfig {
    type Output = Self;

    fn bitor(self, rhs: ParserOption) -> Self::Output {
        ParserConfig {
            flags: self.flags | (1 << rhs as i32),
        }
    }
}

impl std::ops::BitOrAssign<ParserOption> for ParserConfig {
    fn bitor_assign(&mut self, rhs: ParserOption) {
        self.flags |= 1 << rhs as i32;
    }
}

impl std::ops::BitOrAssign<Self> for ParserConfig {
    fn bitor_assign(&mut self, rhs: Self) {
        self.flags |= rhs.flags;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// Nothing has been read yet.
    BeforeDocument,
    /// Reading the XML declaration, the document type declaration and the
    /// miscellaneous items before the root element.
    Prolog,
    /// Inside the root element.
    Content,
    /// Reading the miscellaneous items after the root element.
    AfterRootElement,
    Done,
    FatalErrorOccurred,
}

/// A streaming, validating XML parser.
///
/// The whole document can be parsed at once by [`XMLReader::scan_document`] (or one of
/// the `parse_*` shortcuts), or step by step with [`XMLReader::scan_first`] and
/// [`XMLReader::scan_next`]. Both ways report exactly the same events.
///
/// # Example
/// ```
/// use strictxml::sax::{handler::DebugHandler, parser::XMLReaderBuilder};
///
/// let mut reader = XMLReaderBuilder::new()
///     .set_handler(DebugHandler::default())
///     .build();
/// reader.parse_str("<root a='1'>text</root>", None).unwrap();
/// let events = &reader.handler().buffer;
/// assert!(events.contains("startElement(None, Some(\"root\"), root, {}a='1')"));
/// assert!(events.contains("characters(text)"));
/// ```
pub struct XMLReader<H: SAXHandler = DefaultSAXHandler> {
    pub(crate) source: InputSource,
    pub(crate) entity_stack: Vec<EntityFrame>,
    pub(crate) handler: H,
    pub(crate) locator: Arc<Locator>,
    pub(crate) config: ParserConfig,
    pub(crate) resolver: GrammarResolver,
    pub(crate) preloaded: Vec<Arc<Grammar>>,

    // Parser Context
    pub(crate) state: ParserState,
    pub(crate) fatal_error_occurred: bool,
    pub(crate) first_fatal_error: Option<XMLError>,
    pub(crate) version: XMLVersion,
    pub(crate) encoding: Option<String>,
    pub(crate) standalone: Option<bool>,

    // DTD
    pub(crate) dtd_name: String,
    pub(crate) dtd_building: Option<DTDGrammar>,
    pub(crate) dtd: Option<Arc<Grammar>>,
    pub(crate) has_internal_subset: bool,
    pub(crate) has_external_subset: bool,
    pub(crate) has_parameter_entity: bool,

    // Content
    pub(crate) element_stack: Vec<OpenElement>,
    pub(crate) namespaces: Vec<NamespaceBinding>,
    pub(crate) attributes: Attributes,
    pub(crate) dtd_validator: DTDValidator,
    pub(crate) schema_validator: SchemaValidator,
}

impl<H: SAXHandler> XMLReader<H> {
    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn into_handler(self) -> H {
        self.handler
    }

    pub fn config(&self) -> ParserConfig {
        self.config
    }

    pub fn set_option(&mut self, option: ParserOption, flag: bool) {
        self.config.set_option(option, flag);
    }

    pub fn resolver(&self) -> &GrammarResolver {
        &self.resolver
    }

    pub fn resolver_mut(&mut self) -> &mut GrammarResolver {
        &mut self.resolver
    }

    pub fn locator(&self) -> Arc<Locator> {
        self.locator.clone()
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    /// The DTD of the current document, if it has one.
    pub fn dtd(&self) -> Option<&DTDGrammar> {
        self.dtd_building
            .as_ref()
            .or_else(|| self.dtd.as_ref()?.as_dtd())
    }

    /// Parse `content`. `system_id` is used to resolve relative references and in error
    /// reports.
    pub fn parse_str(&mut self, content: &str, system_id: Option<&str>) -> Result<(), XMLError> {
        let mut source = InputSource::from_content(content);
        if let Some(system_id) = system_id {
            source.set_system_id(system_id);
        }
        self.scan_document(source)
    }

    /// Parse a byte stream. If `encoding` is `None`, it is detected from the stream.
    pub fn parse_reader(
        &mut self,
        reader: impl Read + 'static,
        encoding: Option<&str>,
        system_id: Option<&str>,
    ) -> Result<(), XMLError> {
        let mut source = InputSource::from_reader(reader, encoding)?;
        if let Some(system_id) = system_id {
            source.set_system_id(system_id);
        }
        self.scan_document(source)
    }

    pub fn parse_path(&mut self, path: impl AsRef<Path>) -> Result<(), XMLError> {
        let source = InputSource::from_path(path)?;
        self.scan_document(source)
    }

    /// Parse the whole document read from `source`.
    ///
    /// # Errors
    /// The first fatal error, if any. Validity errors are only reported to the handler
    /// unless [`ParserOption::ValidityErrorsAreFatal`] is enabled.
    pub fn scan_document(&mut self, source: InputSource) -> Result<(), XMLError> {
        self.scan_first(source)?;
        while self.scan_next()? {}
        match self.first_fatal_error.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Start a progressive parse of `source` and process its first step.
    ///
    /// Returns `Ok(false)` if the document is already complete.
    pub fn scan_first(&mut self, source: InputSource) -> Result<bool, XMLError> {
        self.reset();
        let system_id: Arc<str> = source.system_id().cloned().unwrap_or_else(|| "".into());
        self.locator = Arc::new(Locator::new(
            system_id,
            source.public_id().cloned(),
            1,
            1,
        ));
        self.source = source;
        self.scan_next()
    }

    /// Process the next piece of the document: one markup construct, one chunk of
    /// character data or the end of one entity.
    ///
    /// Returns `Ok(false)` once the document is complete.
    pub fn scan_next(&mut self) -> Result<bool, XMLError> {
        if self.state == ParserState::FatalErrorOccurred {
            return Err(self
                .first_fatal_error
                .clone()
                .unwrap_or(XMLError::InternalError));
        }
        match self.scan_step() {
            Ok(ret) => Ok(ret),
            Err(err) => {
                if !self.fatal_error_occurred {
                    let message = format!("Parsing is aborted: {err}");
                    self.report(XMLErrorLevel::FatalError, err.clone(), message.into());
                }
                self.state = ParserState::FatalErrorOccurred;
                Err(err)
            }
        }
    }

    /// Read a grammar from `source` without parsing a document.
    ///
    /// The grammar is registered with this reader, and also stored in the grammar pool
    /// if `cache` is `true`.
    pub fn load_grammar(
        &mut self,
        source: InputSource,
        grammar_type: GrammarType,
        cache: bool,
    ) -> Result<Arc<Grammar>, XMLError> {
        let grammar = match grammar_type {
            GrammarType::DTD => self.load_external_dtd(source)?,
            GrammarType::Schema => {
                let mut loader = crate::schema::SchemaLoader::new(&mut self.resolver);
                let loaded = loader.load(source);
                let errors = loader.take_diagnostics();
                self.report_grammar_errors(errors);
                loaded?
            }
        };
        log::debug!("grammar {} is loaded", grammar.key());
        self.resolver.put_grammar(grammar.clone());
        self.preloaded.retain(|loaded| loaded.key() != grammar.key());
        self.preloaded.push(grammar.clone());
        if cache {
            self.resolver.cache_grammars()?;
        }
        Ok(grammar)
    }

    pub(crate) fn reset(&mut self) {
        self.source = InputSource::default();
        self.entity_stack.clear();
        self.state = ParserState::BeforeDocument;
        self.fatal_error_occurred = false;
        self.first_fatal_error = None;
        self.version = XMLVersion::default();
        self.encoding = None;
        self.standalone = None;
        self.dtd_name.clear();
        self.dtd_building = None;
        self.dtd = None;
        self.has_internal_subset = false;
        self.has_external_subset = false;
        self.has_parameter_entity = false;
        self.element_stack.clear();
        self.namespaces.clear();
        self.attributes.clear();
        self.dtd_validator.reset();
        self.schema_validator.reset();

        self.resolver.reset();
        for grammar in &self.preloaded {
            self.resolver.put_grammar(grammar.clone());
        }
        if self.config.is_enable(ParserOption::UseCachedGrammarInParse) {
            self.resolver.preload_from_pool(GrammarType::Schema);
        }
    }

    /// Build an error from the current position and deliver it to the handler.
    pub(crate) fn report(
        &mut self,
        level: XMLErrorLevel,
        error: XMLError,
        message: Cow<'static, str>,
    ) {
        let error = SAXParseError {
            domain: error.domain(),
            error,
            level,
            line: self.locator.line() as i64,
            column: self.locator.column() as i64,
            system_id: self.locator.system_id(),
            public_id: self.locator.public_id(),
            message,
        };
        log::trace!("{error}");
        match level {
            XMLErrorLevel::FatalError => {
                self.fatal_error_occurred = true;
                if self.first_fatal_error.is_none() {
                    self.first_fatal_error = Some(error.error.clone());
                }
                self.handler.fatal_error(error);
            }
            XMLErrorLevel::Error => self.handler.error(error),
            XMLErrorLevel::Warning => self.handler.warning(error),
        }
    }

    /// Deliver errors found in grammar documents, which are located in those
    /// documents rather than at the current position.
    pub(crate) fn report_grammar_errors(&mut self, errors: Vec<SAXParseError>) {
        for error in errors {
            log::trace!("{error}");
            match error.level {
                XMLErrorLevel::Warning => self.handler.warning(error),
                _ => self.handler.error(error),
            }
        }
    }

    pub(crate) fn validity_error_level(&self) -> XMLErrorLevel {
        if self.config.is_enable(ParserOption::ValidityErrorsAreFatal) {
            XMLErrorLevel::FatalError
        } else {
            XMLErrorLevel::Error
        }
    }
}

impl Default for XMLReader {
    fn default() -> Self {
        XMLReaderBuilder::new().build()
    }
}

/// Wires a handler, options and grammars into an [`XMLReader`].
pub struct XMLReaderBuilder<H: SAXHandler = DefaultSAXHandler> {
    handler: H,
    config: ParserConfig,
    pool: Option<Arc<dyn GrammarPool>>,
    environment: Option<Arc<ParserEnvironment>>,
    grammars: Vec<Arc<Grammar>>,
}

impl XMLReaderBuilder {
    pub fn new() -> Self {
        Self {
            handler: DefaultSAXHandler,
            config: ParserConfig::default(),
            pool: None,
            environment: None,
            grammars: vec![],
        }
    }
}

impl<H: SAXHandler> XMLReaderBuilder<H> {
    pub fn set_handler<S: SAXHandler>(self, handler: S) -> XMLReaderBuilder<S> {
        XMLReaderBuilder {
            handler,
            config: self.config,
            pool: self.pool,
            environment: self.environment,
            grammars: self.grammars,
        }
    }

    pub fn set_parser_config(mut self, config: impl Into<ParserConfig>) -> Self {
        self.config = config.into();
        self
    }

    pub fn set_option(mut self, option: ParserOption, flag: bool) -> Self {
        self.config.set_option(option, flag);
        self
    }

    pub fn set_grammar_pool(mut self, pool: Arc<dyn GrammarPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Share regular expression tables and builtin types with other readers.
    pub fn set_environment(mut self, environment: Arc<ParserEnvironment>) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Make `grammar` available to every document parsed by the reader.
    pub fn add_grammar(mut self, grammar: impl Into<Arc<Grammar>>) -> Self {
        self.grammars.push(grammar.into());
        self
    }

    pub fn build(self) -> XMLReader<H> {
        let environment = self.environment.unwrap_or_else(ParserEnvironment::new);
        XMLReader {
            source: InputSource::default(),
            entity_stack: vec![],
            handler: self.handler,
            locator: Arc::new(Locator::new("".into(), None, 1, 1)),
            config: self.config,
            resolver: GrammarResolver::new(self.pool, environment),
            preloaded: self.grammars,
            state: ParserState::BeforeDocument,
            fatal_error_occurred: false,
            first_fatal_error: None,
            version: XMLVersion::default(),
            encoding: None,
            standalone: None,
            dtd_name: String::new(),
            dtd_building: None,
            dtd: None,
            has_internal_subset: false,
            has_external_subset: false,
            has_parameter_entity: false,
            element_stack: vec![],
            namespaces: vec![],
            attributes: Attributes::new(),
            dtd_validator: DTDValidator::new(),
            schema_validator: SchemaValidator::new(),
        }
    }
}

impl Default for XMLReaderBuilder {
    fn default() -> Self {
        Self::new()
    }
}
