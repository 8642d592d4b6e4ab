mod attlist_decl;
mod element_decl;
mod entity_decl;
mod ext_subset;
mod notation_decl;

use std::sync::Arc;

use crate::{
    error::XMLError,
    grammar::{
        DTDGrammar, Grammar, GrammarKey,
        dtd::{AttributeType, ContentSpec, EntityDecl},
    },
    parse::{EntityKind, xmldecl::TextDeclContext},
    sax::{
        Locator,
        error::{fatal_error, validity_error, warning},
        handler::SAXHandler,
        parser::{ParserOption, ParserState, XMLReader},
        source::InputSource,
    },
    util::resolve_system_id,
};

/// The name under which the external subset is reported to `start_entity`.
const EXTERNAL_SUBSET_NAME: &str = "[dtd]";

/// Where a run of markup declarations ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeclsEnd {
    /// Before the `']'` that closes the internal subset.
    InternalSubset,
    /// Before the `']]>'` that closes an `INCLUDE` section.
    IncludeSection,
    /// At the end of the current entity.
    EndOfEntity,
}

impl<H: SAXHandler> XMLReader<H> {
    /// ```text
    /// [28] doctypedecl ::= '<!DOCTYPE' S Name (S ExternalID)? S? ('[' intSubset ']' S?)? '>'
    ///                                                             [VC:  Root Element Type]
    ///                                                             [WFC: External Subset]
    /// ```
    pub(crate) fn parse_doctypedecl(&mut self) -> Result<(), XMLError> {
        // skip '<!DOCTYPE'
        self.advance(9)?;
        if self.skip_whitespaces()? == 0 {
            fatal_error!(
                self,
                ParserInvalidDoctypeDecl,
                "Whitespaces are required after '<!DOCTYPE'."
            );
        }
        let mut name = String::new();
        self.parse_element_type_name(&mut name)?;
        self.dtd_name = name.clone();

        let s = self.skip_whitespaces()?;
        let (public_id, system_id) = match self.peek_char()? {
            Some('[' | '>') => (None, None),
            Some(_) => {
                if s == 0 {
                    fatal_error!(
                        self,
                        ParserInvalidDoctypeDecl,
                        "Whitespaces are required between Name and ExternalID."
                    );
                }
                self.parse_external_id(false)?
            }
            None => {
                fatal_error!(self, ParserUnexpectedEOF, "Unexpected EOF in DOCTYPE.");
                return Err(XMLError::ParserUnexpectedEOF);
            }
        };
        self.skip_whitespaces()?;

        let base_uri = self.base_uri();
        let resolved = system_id
            .as_deref()
            .map(|system_id| resolve_system_id(base_uri.as_deref(), system_id));
        self.dtd_building = Some(DTDGrammar::new(
            &name,
            public_id.as_deref(),
            resolved.as_deref(),
        ));
        self.has_external_subset = system_id.is_some();
        if !self.fatal_error_occurred {
            self.handler
                .start_dtd(&name, public_id.as_deref(), system_id.as_deref());
        }

        if self.next_char_if(|c| c == '[')?.is_some() {
            self.has_internal_subset = true;
            if let Some(dtd) = self.dtd_building.as_mut() {
                dtd.set_has_internal_subset();
            }
            self.parse_markup_decls(DeclsEnd::InternalSubset)?;
            if self.next_char_if(|c| c == ']')?.is_none() {
                fatal_error!(
                    self,
                    ParserInvalidDoctypeDecl,
                    "']' for the end of the internal subset is not found."
                );
                return Err(XMLError::ParserInvalidDoctypeDecl);
            }
            self.skip_whitespaces()?;
        }
        if self.next_char_if(|c| c == '>')?.is_none() {
            fatal_error!(
                self,
                ParserInvalidDoctypeDecl,
                "The document type declaration does not close with '>'."
            );
            return Err(XMLError::ParserInvalidDoctypeDecl);
        }

        let reads_external = self.config.is_enable(ParserOption::ExternalParameterEntities)
            || self.config.is_enable(ParserOption::Validation);
        if let Some(system_id) = system_id.as_deref() {
            if !reads_external {
                if !self.fatal_error_occurred {
                    self.handler.skipped_entity(EXTERNAL_SUBSET_NAME);
                }
            } else if let Some(cached) = self.cached_dtd(resolved.as_deref()) {
                log::debug!("use the cached DTD for '{system_id}'");
                self.dtd_building = None;
                self.dtd = Some(cached);
                if !self.fatal_error_occurred {
                    self.handler.end_dtd();
                }
                return Ok(());
            } else {
                match self.open_external_entity(
                    EXTERNAL_SUBSET_NAME,
                    public_id.as_deref(),
                    base_uri.as_deref(),
                    system_id,
                ) {
                    Ok(source) => self.read_external_subset(source)?,
                    Err(err) if self.config.is_enable(ParserOption::SkipUnresolvedEntities) => {
                        warning!(
                            self,
                            err,
                            "The external subset '{}' cannot be read, so it is skipped.",
                            system_id
                        );
                        if !self.fatal_error_occurred {
                            self.handler.skipped_entity(EXTERNAL_SUBSET_NAME);
                        }
                    }
                    Err(err) => {
                        fatal_error!(
                            self,
                            err.clone(),
                            "The external subset '{}' cannot be read: {}",
                            system_id,
                            err
                        );
                        return Err(err);
                    }
                }
            }
        } else if reads_external
            && let Some(source) = self
                .handler
                .get_external_subset(&name, base_uri.as_deref())?
        {
            self.has_external_subset = true;
            self.read_external_subset(source)?;
        }

        if !self.fatal_error_occurred {
            self.handler.end_dtd();
        }
        self.finish_dtd();
        Ok(())
    }

    /// A DTD from the pool or loaded in advance, if it may replace the external subset.
    ///
    /// Documents with an internal subset always read their external subset, because the
    /// internal declarations take precedence.
    fn cached_dtd(&mut self, system_id: Option<&str>) -> Option<Arc<Grammar>> {
        if !self.config.is_enable(ParserOption::UseCachedGrammarInParse)
            || self.has_internal_subset
        {
            return None;
        }
        self.resolver
            .get_grammar(&GrammarKey::dtd(system_id))
            .filter(|grammar| grammar.as_dtd().is_some())
    }

    /// Read the external subset from `source` into the DTD being built.
    fn read_external_subset(&mut self, source: InputSource) -> Result<(), XMLError> {
        self.push_entity(source, EXTERNAL_SUBSET_NAME.into(), EntityKind::ExternalSubset)?;
        if !self.fatal_error_occurred {
            self.handler.start_entity(EXTERNAL_SUBSET_NAME);
        }
        self.parse_text_decl_if_present(TextDeclContext::ExternalSubset)?;
        self.parse_markup_decls(DeclsEnd::EndOfEntity)?;
        self.pop_entity();
        if !self.fatal_error_occurred {
            self.handler.end_entity();
        }
        Ok(())
    }

    /// Read a standalone external DTD, as if it were the external subset of a document
    /// without an internal subset.
    pub(crate) fn load_external_dtd(
        &mut self,
        source: InputSource,
    ) -> Result<Arc<Grammar>, XMLError> {
        self.reset();
        let system_id = source.system_id().cloned();
        self.locator = Arc::new(Locator::new(
            system_id.clone().unwrap_or_else(|| "".into()),
            source.public_id().cloned(),
            1,
            1,
        ));
        self.state = ParserState::Prolog;
        self.dtd_building = Some(DTDGrammar::new("", None, system_id.as_deref()));
        self.has_external_subset = true;
        let ret = self.read_external_subset(source);
        self.finish_dtd();
        self.state = ParserState::Done;
        ret?;
        if let Some(err) = self.first_fatal_error.clone() {
            return Err(err);
        }
        self.dtd.clone().ok_or(XMLError::InternalError)
    }

    /// Check the DTD as a whole and freeze it.
    fn finish_dtd(&mut self) {
        let Some(mut dtd) = self.dtd_building.take() else {
            return;
        };
        if self.config.is_enable(ParserOption::Validation) {
            self.check_dtd(&dtd);
        }
        dtd.set_validated();
        let grammar = Arc::new(Grammar::from(dtd));
        log::debug!("DTD {} is built", grammar.key());
        self.resolver.put_grammar(grammar.clone());
        self.dtd = Some(grammar);
    }

    /// Validity constraints that can only be checked after the whole DTD is read.
    fn check_dtd(&mut self, dtd: &DTDGrammar) {
        for (name, decl) in dtd.entities() {
            if let EntityDecl::ExternalGeneralUnparsedEntity { notation_name, .. } = decl
                && dtd.get_notation(notation_name).is_none()
            {
                // [VC: Notation Declared]
                validity_error!(
                    self,
                    ParserUndeclaredNotation,
                    "The notation '{}' of the unparsed entity '{}' is not declared.",
                    notation_name,
                    name
                );
            }
        }

        for decl in dtd.elements() {
            for def in decl.attributes() {
                let AttributeType::NOTATION(notations) = &def.att_type else {
                    continue;
                };
                if matches!(decl.content_spec(), Some(ContentSpec::EMPTY)) {
                    // [VC: No Notation on Empty Element]
                    validity_error!(
                        self,
                        ParserNotationAttlistDeclOnEmptyElement,
                        "The NOTATION attribute '{}' is declared on the EMPTY element '{}'.",
                        def.name,
                        decl.name()
                    );
                }
                for notation in notations {
                    if dtd.get_notation(notation).is_none() {
                        // [VC: Notation Attributes]
                        validity_error!(
                            self,
                            ParserUndeclaredNotation,
                            "The notation '{}' in the type of the attribute '{}' is not declared.",
                            notation,
                            def.name
                        );
                    }
                }
            }
        }
    }

    /// ```text
    /// [28a] DeclSep     ::= PEReference | S                [WFC: PE Between Declarations]
    /// [28b] intSubset   ::= (markupdecl | DeclSep)*
    /// [29]  markupdecl  ::= elementdecl | AttlistDecl | EntityDecl | NotationDecl | PI | Comment
    /// [31]  extSubsetDecl ::= ( markupdecl | conditionalSect | DeclSep)*
    /// ```
    ///
    /// Parameter entities referenced between declarations are read through, so this
    /// returns in the entity it started in.
    pub(crate) fn parse_markup_decls(&mut self, until: DeclsEnd) -> Result<(), XMLError> {
        let base_depth = self.entity_stack.len();
        loop {
            self.skip_whitespaces()?;
            let Some(c) = self.peek_char()? else {
                if self.entity_stack.len() > base_depth {
                    self.pop_entity();
                    if !self.fatal_error_occurred {
                        self.handler.end_entity();
                    }
                    continue;
                }
                match until {
                    DeclsEnd::EndOfEntity => return Ok(()),
                    DeclsEnd::InternalSubset => {
                        fatal_error!(
                            self,
                            ParserUnexpectedEOF,
                            "The internal subset is not closed."
                        );
                    }
                    DeclsEnd::IncludeSection => {
                        fatal_error!(
                            self,
                            ParserInvalidConditionalSect,
                            "The conditional section is not closed."
                        );
                    }
                }
                return Err(XMLError::ParserUnexpectedEOF);
            };

            let at_base = self.entity_stack.len() == base_depth;
            match c {
                ']' if at_base && until == DeclsEnd::InternalSubset => return Ok(()),
                ']' if at_base
                    && until == DeclsEnd::IncludeSection
                    && self.starts_with("]]>")? =>
                {
                    return Ok(());
                }
                '%' => self.parse_pe_reference(false)?,
                _ if self.starts_with("<!ELEMENT")? => self.parse_element_decl()?,
                _ if self.starts_with("<!ATTLIST")? => self.parse_attlist_decl()?,
                _ if self.starts_with("<!ENTITY")? => self.parse_entity_decl()?,
                _ if self.starts_with("<!NOTATION")? => self.parse_notation_decl()?,
                _ if self.starts_with("<![")? => {
                    if !self.in_external_markup() {
                        fatal_error!(
                            self,
                            ParserInvalidConditionalSect,
                            "Conditional sections are not allowed in the internal subset."
                        );
                        return Err(XMLError::ParserInvalidConditionalSect);
                    }
                    self.parse_conditional_sect()?;
                }
                _ if self.starts_with("<!--")? => self.parse_comment()?,
                _ if self.starts_with("<?")? => self.parse_pi()?,
                _ => {
                    fatal_error!(
                        self,
                        ParserInvalidDoctypeDecl,
                        "A markup declaration is expected, but '{}' is found.",
                        c
                    );
                    return Err(XMLError::ParserInvalidDoctypeDecl);
                }
            }
        }
    }

    /// ```text
    /// [69] PEReference ::= '%' Name ';'
    /// ```
    ///
    /// The entity is pushed onto the entity stack. Its text is read by the caller.
    pub(crate) fn parse_pe_reference(&mut self, in_markup: bool) -> Result<(), XMLError> {
        // skip '%'
        self.advance(1)?;
        let mut name = String::new();
        self.parse_name(&mut name)?;
        if self.next_char_if(|c| c == ';')?.is_none() {
            fatal_error!(
                self,
                ParserInvalidEntityReference,
                "The parameter entity reference '%{}' does not end with ';'.",
                name
            );
            return Err(XMLError::ParserInvalidEntityReference);
        }

        let entity_name: Arc<str> = format!("%{name}").into();
        let Some(source) = self.open_parameter_entity(&name, in_markup)? else {
            if !self.fatal_error_occurred {
                self.handler.skipped_entity(&entity_name);
            }
            return Ok(());
        };
        self.push_entity(source, entity_name.clone(), EntityKind::Parameter { in_markup })?;
        if !self.fatal_error_occurred {
            self.handler.start_entity(&entity_name);
        }
        self.parse_text_decl_if_present(TextDeclContext::ParameterEntity)
    }

    /// Open the replacement text of the parameter entity `name`.
    ///
    /// Returns `None` if the entity is undeclared or is not read.
    pub(crate) fn open_parameter_entity(
        &mut self,
        name: &str,
        in_markup: bool,
    ) -> Result<Option<InputSource>, XMLError> {
        self.has_parameter_entity = true;
        let decl = self
            .dtd()
            .and_then(|dtd| dtd.get_parameter_entity(name))
            .cloned();
        let Some(decl) = decl else {
            if self.config.is_enable(ParserOption::Validation) {
                // [VC: Entity Declared]
                validity_error!(
                    self,
                    ParserUndeclaredEntityReference,
                    "The parameter entity '%{};' is not declared.",
                    name
                );
            } else {
                warning!(
                    self,
                    ParserUndeclaredEntityReference,
                    "The parameter entity '%{};' is not declared.",
                    name
                );
            }
            return Ok(None);
        };
        if self.is_entity_active(&format!("%{name}")) {
            // [WFC: No Recursion]
            fatal_error!(
                self,
                ParserEntityRecursion,
                "The parameter entity '%{};' refers to itself.",
                name
            );
            return Err(XMLError::ParserEntityRecursion);
        }

        log::trace!("expand parameter entity '%{name};' (in markup: {in_markup})");
        match decl {
            EntityDecl::InternalParameterEntity {
                replacement_text, ..
            } => Ok(Some(InputSource::from_replacement_text(&replacement_text))),
            EntityDecl::ExternalParameterEntity {
                base_uri,
                system_id,
                public_id,
                ..
            } => {
                if !self.config.is_enable(ParserOption::ExternalParameterEntities)
                    && !self.config.is_enable(ParserOption::Validation)
                {
                    return Ok(None);
                }
                let base_uri = (!base_uri.is_empty()).then_some(base_uri.as_ref());
                match self.open_external_entity(
                    &format!("%{name}"),
                    public_id.as_deref(),
                    base_uri,
                    &system_id,
                ) {
                    Ok(source) => Ok(Some(source)),
                    Err(err) if self.config.is_enable(ParserOption::SkipUnresolvedEntities) => {
                        warning!(
                            self,
                            err,
                            "The parameter entity '%{};' cannot be read, so it is skipped.",
                            name
                        );
                        Ok(None)
                    }
                    Err(err) => {
                        fatal_error!(
                            self,
                            err.clone(),
                            "The parameter entity '%{};' cannot be read: {}",
                            name,
                            err
                        );
                        Err(err)
                    }
                }
            }
            _ => Err(XMLError::InternalError),
        }
    }

    /// Skip whitespaces inside a markup declaration.
    ///
    /// In external markup, parameter entity references are expanded and the ends of
    /// their replacement text are skipped. Each of them counts as one whitespace.
    pub(crate) fn skip_whitespaces_in_decl(&mut self) -> Result<usize, XMLError> {
        let mut skipped = 0;
        loop {
            skipped += self.skip_whitespaces()?;
            match self.peek_char()? {
                None => match self.entity_stack.last().map(|frame| frame.kind) {
                    Some(EntityKind::Parameter { .. }) => {
                        self.pop_entity();
                        if !self.fatal_error_occurred {
                            self.handler.end_entity();
                        }
                        skipped += 1;
                    }
                    _ => return Ok(skipped),
                },
                Some('%') => {
                    self.source.fill(2)?;
                    let version = self.version;
                    let is_reference = self
                        .source
                        .content_str()
                        .chars()
                        .nth(1)
                        .is_some_and(|c| version.is_name_start_char(c));
                    if !is_reference {
                        return Ok(skipped);
                    }
                    if !self.in_external_markup() {
                        // [WFC: PEs in Internal Subset]
                        fatal_error!(
                            self,
                            ParserPEReferenceInInternalSubsetMarkup,
                            "Parameter entity references must not appear within markup declarations in the internal subset."
                        );
                        return Err(XMLError::ParserPEReferenceInInternalSubsetMarkup);
                    }
                    self.parse_pe_reference(true)?;
                    skipped += 1;
                }
                Some(_) => return Ok(skipped),
            }
        }
    }

    /// Check that a markup declaration ends in the entity it started in.
    pub(crate) fn check_decl_nesting(&mut self, start_depth: usize, decl: &str) {
        if self.entity_stack.len() != start_depth && self.config.is_enable(ParserOption::Validation)
        {
            // [VC: Proper Declaration/PE Nesting]
            validity_error!(
                self,
                ParserEntityIncorrectNesting,
                "The {} declaration starts and ends in different entities.",
                decl
            );
        }
    }

    /// Consume the `'>'` that closes a markup declaration.
    pub(crate) fn close_decl(
        &mut self,
        start_depth: usize,
        decl: &str,
        error: XMLError,
    ) -> Result<(), XMLError> {
        self.skip_whitespaces_in_decl()?;
        if self.next_char_if(|c| c == '>')?.is_none() {
            fatal_error!(
                self,
                error.clone(),
                "The {} declaration does not end with '>'.",
                decl
            );
            return Err(error);
        }
        self.check_decl_nesting(start_depth, decl);
        Ok(())
    }
}
