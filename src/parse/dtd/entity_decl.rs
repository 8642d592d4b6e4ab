use std::sync::Arc;

use crate::{
    error::XMLError,
    grammar::dtd::EntityDecl,
    sax::{
        error::fatal_error,
        handler::SAXHandler,
        parser::{ParserOption, XMLReader},
    },
};

impl<H: SAXHandler> XMLReader<H> {
    /// ```text
    /// [70] EntityDecl ::= GEDecl | PEDecl
    /// [71] GEDecl     ::= '<!ENTITY' S Name S EntityDef S? '>'
    /// [72] PEDecl     ::= '<!ENTITY' S '%' S Name S PEDef S? '>'
    /// [73] EntityDef  ::= EntityValue | (ExternalID NDataDecl?)
    /// [74] PEDef      ::= EntityValue | ExternalID
    /// [76] NDataDecl  ::= S 'NDATA' S Name                [VC: Notation Declared]
    /// ```
    pub(crate) fn parse_entity_decl(&mut self) -> Result<(), XMLError> {
        let start_depth = self.entity_stack.len();
        let in_external_markup = self.in_external_markup();
        // Relative system identifiers are resolved against the entity in which the
        // declaration starts.
        let base_uri: Arc<str> = self.base_uri().unwrap_or_else(|| "".into());
        // skip '<!ENTITY'
        self.advance(8)?;

        let mut s = self.skip_whitespaces_in_decl()?;
        let pe = self.next_char_if(|c| c == '%')?.is_some();
        if pe {
            if s == 0 {
                fatal_error!(
                    self,
                    ParserInvalidEntityDecl,
                    "Whitespaces are required before '%' in a parameter entity declaration."
                );
            }
            s = self.skip_whitespaces_in_decl()?;
        }
        if s == 0 {
            fatal_error!(
                self,
                ParserInvalidEntityDecl,
                "Whitespaces are required before Name in an entity declaration."
            );
        }
        let mut name = String::new();
        if self.config.is_enable(ParserOption::Namespaces) {
            self.parse_ncname(&mut name)?;
        } else {
            self.parse_name(&mut name)?;
        }
        if self.skip_whitespaces_in_decl()? == 0 {
            fatal_error!(
                self,
                ParserInvalidEntityDecl,
                "Whitespaces are required after Name in entity declaration."
            );
        }

        let decl = match self.peek_char()? {
            Some('"' | '\'') => {
                let mut value = String::new();
                self.parse_entity_value(&mut value)?;
                let replacement_text = value.into_boxed_str();
                if pe {
                    EntityDecl::InternalParameterEntity {
                        base_uri,
                        replacement_text,
                        in_external_markup,
                    }
                } else {
                    EntityDecl::InternalGeneralEntity {
                        base_uri,
                        replacement_text,
                        in_external_markup,
                    }
                }
            }
            Some('S' | 'P') => {
                let (public_id, system_id) = self.parse_external_id(false)?;
                let Some(system_id) = system_id else {
                    return Err(XMLError::ParserInvalidExternalID);
                };
                let public_id = public_id.map(String::into_boxed_str);
                let system_id = system_id.into_boxed_str();
                let s = self.skip_whitespaces_in_decl()?;
                let notation_name = if !pe && self.starts_with("NDATA")? {
                    if s == 0 {
                        fatal_error!(
                            self,
                            ParserInvalidEntityDecl,
                            "Whitespaces are required between ExternalID and NDataDecl."
                        );
                    }
                    self.advance(5)?;
                    if self.skip_whitespaces_in_decl()? == 0 {
                        fatal_error!(
                            self,
                            ParserInvalidEntityDecl,
                            "Whitespaces are required after 'NDATA' in entity declaration."
                        );
                    }
                    let mut notation = String::new();
                    if self.config.is_enable(ParserOption::Namespaces) {
                        self.parse_ncname(&mut notation)?;
                    } else {
                        self.parse_name(&mut notation)?;
                    }
                    // Notations may be declared later, so they are checked after the
                    // whole DTD is read.
                    Some(notation.into_boxed_str())
                } else {
                    None
                };

                if pe {
                    EntityDecl::ExternalParameterEntity {
                        base_uri,
                        system_id,
                        public_id,
                        in_external_markup,
                    }
                } else if let Some(notation_name) = notation_name {
                    EntityDecl::ExternalGeneralUnparsedEntity {
                        base_uri,
                        system_id,
                        public_id,
                        notation_name,
                        in_external_markup,
                    }
                } else {
                    EntityDecl::ExternalGeneralParsedEntity {
                        base_uri,
                        system_id,
                        public_id,
                        in_external_markup,
                    }
                }
            }
            Some(_) => {
                fatal_error!(
                    self,
                    ParserInvalidEntityDecl,
                    "Neither EntityValue nor ExternalID are found in entity declaration."
                );
                return Err(XMLError::ParserInvalidEntityDecl);
            }
            None => {
                fatal_error!(
                    self,
                    ParserUnexpectedEOF,
                    "Unexpected EOF in entity declaration."
                );
                return Err(XMLError::ParserUnexpectedEOF);
            }
        };

        self.close_decl(start_depth, "entity", XMLError::ParserInvalidEntityDecl)?;

        if pe {
            self.has_parameter_entity = true;
        }
        let Some(dtd) = self.dtd_building.as_mut() else {
            return Ok(());
        };
        // The first declaration is binding.
        if !dtd.add_entity(&name, decl.clone())? {
            log::debug!("the entity '{name}' is declared more than once");
            return Ok(());
        }
        if !self.fatal_error_occurred {
            self.report_entity_decl(&name, &decl);
        }
        Ok(())
    }

    fn report_entity_decl(&mut self, name: &str, decl: &EntityDecl) {
        match decl {
            EntityDecl::InternalGeneralEntity {
                replacement_text, ..
            } => self.handler.internal_entity_decl(name, replacement_text),
            EntityDecl::InternalParameterEntity {
                replacement_text, ..
            } => self
                .handler
                .internal_entity_decl(&format!("%{name}"), replacement_text),
            EntityDecl::ExternalGeneralParsedEntity {
                system_id,
                public_id,
                ..
            } => self
                .handler
                .external_entity_decl(name, public_id.as_deref(), system_id),
            EntityDecl::ExternalParameterEntity {
                system_id,
                public_id,
                ..
            } => self.handler.external_entity_decl(
                &format!("%{name}"),
                public_id.as_deref(),
                system_id,
            ),
            EntityDecl::ExternalGeneralUnparsedEntity {
                system_id,
                public_id,
                notation_name,
                ..
            } => self.handler.unparsed_entity_decl(
                name,
                public_id.as_deref(),
                system_id,
                notation_name,
            ),
        }
    }
}
