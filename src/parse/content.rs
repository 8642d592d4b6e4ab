use crate::{
    error::XMLError,
    grammar::dtd::{EntityDecl, predefined_entity_char},
    parse::{EntityKind, Scanned, xmldecl::TextDeclContext},
    sax::{
        error::{fatal_error, validity_error, warning},
        handler::SAXHandler,
        parser::{ParserOption, XMLReader},
        source::InputSource,
    },
};

impl<H: SAXHandler> XMLReader<H> {
    /// Process one construct of the content.
    ///
    /// ```text
    /// [43] content ::= CharData? ((element | Reference | CDSect | PI | Comment) CharData?)*
    /// ```
    pub(crate) fn scan_content(&mut self) -> Result<(), XMLError> {
        match self.peek_markup()? {
            Scanned::Markup => {}
            Scanned::EndOfEntity => return self.end_entity_in_content(),
            Scanned::EndOfInput => {
                let name = self
                    .element_stack
                    .last()
                    .map(|elem| elem.qname.clone())
                    .unwrap_or_else(|| "".into());
                fatal_error!(
                    self,
                    ParserUnexpectedEOF,
                    "The element '{}' is not closed.",
                    name
                );
                return Err(XMLError::ParserUnexpectedEOF);
            }
        }

        if self.element_stack.is_empty() {
            return self.parse_start_tag();
        }
        if self.starts_with("</")? {
            self.parse_end_tag()
        } else if self.starts_with("<!--")? {
            self.parse_comment()
        } else if self.starts_with("<![CDATA[")? {
            self.parse_cdsect()
        } else if self.starts_with("<?")? {
            self.parse_pi()
        } else if self.starts_with("<")? {
            self.parse_start_tag()
        } else if self.starts_with("&#")? {
            let c = self.parse_char_ref()?;
            let mut buf = [0; 4];
            self.deliver_text(c.encode_utf8(&mut buf), false);
            Ok(())
        } else if self.starts_with("&")? {
            self.parse_entity_ref_in_content()
        } else {
            self.parse_char_data()
        }
    }

    fn end_entity_in_content(&mut self) -> Result<(), XMLError> {
        let Some((name, _, depth)) = self.pop_entity() else {
            return Ok(());
        };
        if depth != self.element_stack.len() {
            fatal_error!(
                self,
                ParserEntityIncorrectNesting,
                "The entity '{}' is nested incorrectly.",
                name
            );
            return Err(XMLError::ParserEntityIncorrectNesting);
        }
        if !self.fatal_error_occurred {
            self.handler.end_entity();
        }
        Ok(())
    }

    /// ```text
    /// [68] EntityRef ::= '&' Name ';'     [WFC: Entity Declared]
    ///                                     [VC:  Entity Declared]
    ///                                     [WFC: Parsed Entity]
    ///                                     [WFC: No Recursion]
    /// ```
    fn parse_entity_ref_in_content(&mut self) -> Result<(), XMLError> {
        // skip '&'
        self.advance(1)?;
        let mut name = String::new();
        self.parse_name(&mut name)?;
        if self.next_char_if(|c| c == ';')?.is_none() {
            fatal_error!(
                self,
                ParserInvalidEntityReference,
                "The entity reference '&{}' does not end with ';'.",
                name
            );
            return Err(XMLError::ParserInvalidEntityReference);
        }

        if let Some(c) = predefined_entity_char(&name) {
            let mut buf = [0; 4];
            self.deliver_text(c.encode_utf8(&mut buf), false);
            return Ok(());
        }

        let Some(decl) = self.dtd().and_then(|dtd| dtd.get_entity(&name)).cloned() else {
            self.undeclared_entity(&name)?;
            if !self.fatal_error_occurred {
                self.handler.skipped_entity(&name);
            }
            return Ok(());
        };
        self.check_standalone_entity(&name, &decl)?;
        if self.is_entity_active(&name) {
            // [WFC: No Recursion]
            fatal_error!(
                self,
                ParserEntityRecursion,
                "The entity '{}' refers to itself.",
                name
            );
            return Err(XMLError::ParserEntityRecursion);
        }

        match decl {
            EntityDecl::InternalGeneralEntity {
                replacement_text, ..
            } => {
                let source = InputSource::from_replacement_text(&replacement_text);
                self.push_entity(source, name.as_str().into(), EntityKind::General)?;
                if !self.fatal_error_occurred {
                    self.handler.start_entity(&name);
                }
            }
            EntityDecl::ExternalGeneralParsedEntity {
                base_uri,
                system_id,
                public_id,
                ..
            } => {
                if !self.config.is_enable(ParserOption::ExternalGeneralEntities) {
                    if !self.fatal_error_occurred {
                        self.handler.skipped_entity(&name);
                    }
                    return Ok(());
                }
                let base_uri = (!base_uri.is_empty()).then_some(base_uri.as_ref());
                let source = match self.open_external_entity(
                    &name,
                    public_id.as_deref(),
                    base_uri,
                    &system_id,
                ) {
                    Ok(source) => source,
                    Err(err) if self.config.is_enable(ParserOption::SkipUnresolvedEntities) => {
                        warning!(
                            self,
                            err,
                            "The external entity '{}' cannot be read, so it is skipped.",
                            name
                        );
                        if !self.fatal_error_occurred {
                            self.handler.skipped_entity(&name);
                        }
                        return Ok(());
                    }
                    Err(err) => {
                        fatal_error!(
                            self,
                            err.clone(),
                            "The external entity '{}' cannot be read: {}",
                            name,
                            err
                        );
                        return Err(err);
                    }
                };
                self.push_entity(source, name.as_str().into(), EntityKind::General)?;
                if !self.fatal_error_occurred {
                    self.handler.start_entity(&name);
                }
                self.parse_text_decl_if_present(TextDeclContext::GeneralEntity)?;
            }
            EntityDecl::ExternalGeneralUnparsedEntity { .. } => {
                // [WFC: Parsed Entity]
                fatal_error!(
                    self,
                    ParserUnparsedEntityReference,
                    "The unparsed entity '{}' cannot be referred to.",
                    name
                );
                return Err(XMLError::ParserUnparsedEntityReference);
            }
            EntityDecl::InternalParameterEntity { .. }
            | EntityDecl::ExternalParameterEntity { .. } => return Err(XMLError::InternalError),
        }
        Ok(())
    }

    /// Report a reference to an undeclared general entity.
    ///
    /// This is a fatal error if all declarations have been read, and a validity error
    /// otherwise.
    pub(crate) fn undeclared_entity(&mut self, name: &str) -> Result<(), XMLError> {
        let unread = self.has_external_subset || self.has_parameter_entity;
        if self.dtd().is_none() || !unread || self.standalone == Some(true) {
            // [WFC: Entity Declared]
            fatal_error!(
                self,
                ParserUndeclaredEntityReference,
                "The entity '{}' is not declared.",
                name
            );
            return Err(XMLError::ParserUndeclaredEntityReference);
        }
        if self.config.is_enable(ParserOption::Validation) {
            // [VC: Entity Declared]
            validity_error!(
                self,
                ParserUndeclaredEntityReference,
                "The entity '{}' is not declared.",
                name
            );
        }
        Ok(())
    }

    /// A standalone document must not refer to entities declared in external markup.
    pub(crate) fn check_standalone_entity(
        &mut self,
        name: &str,
        decl: &EntityDecl,
    ) -> Result<(), XMLError> {
        if self.standalone == Some(true) && decl.in_external_markup() && !self.in_external_markup()
        {
            fatal_error!(
                self,
                ParserUndeclaredEntityReference,
                "The entity '{}' is declared in external markup, but the document is standalone.",
                name
            );
            return Err(XMLError::ParserUndeclaredEntityReference);
        }
        Ok(())
    }
}
