use std::sync::Arc;

use crate::{
    error::XMLError,
    grammar::dtd::{EntityDecl, predefined_entity_char},
    parse::xmldecl::TextDeclContext,
    sax::{
        error::{error, fatal_error},
        handler::SAXHandler,
        parser::XMLReader,
    },
};

/// A reference found in a string that has already been read.
pub(crate) enum Reference<'a> {
    Char(char),
    Entity(&'a str),
}

/// Split the reference at the head of `s`.
///
/// Returns the reference and its length in bytes, or `None` if `s` does not start with
/// a well-formed reference.
pub(crate) fn split_reference(s: &str) -> Option<(Reference<'_>, usize)> {
    if let Some(rem) = s.strip_prefix("&#x") {
        let end = rem.find(';')?;
        let code = u32::from_str_radix(&rem[..end], 16).ok()?;
        let c = char::from_u32(code)?;
        return (end > 0).then_some((Reference::Char(c), end + 4));
    }
    if let Some(rem) = s.strip_prefix("&#") {
        let end = rem.find(';')?;
        if end == 0 || !rem[..end].bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let c = char::from_u32(rem[..end].parse().ok()?)?;
        return Some((Reference::Char(c), end + 3));
    }
    let rem = s.strip_prefix('&')?;
    let end = rem.find(';')?;
    let name = &rem[..end];
    if !crate::XMLVersion::XML10.validate_name(name) {
        return None;
    }
    Some((Reference::Entity(name), end + 2))
}

impl<H: SAXHandler> XMLReader<H> {
    fn parse_quote(&mut self, error: XMLError, what: &str) -> Result<char, XMLError> {
        match self.next_char()? {
            Some(c @ ('"' | '\'')) => Ok(c),
            Some(c) => {
                fatal_error!(
                    self,
                    error.clone(),
                    "A character '0x{:X}' is not correct quotation mark for {}.",
                    c as u32,
                    what
                );
                Err(error)
            }
            None => {
                fatal_error!(self, ParserUnexpectedEOF, "Unexpected EOF.");
                Err(XMLError::ParserUnexpectedEOF)
            }
        }
    }

    /// ```text
    /// [11] SystemLiteral ::= ('"' [^"]* '"') | ("'" [^']* "'")
    /// ```
    pub(crate) fn parse_system_literal(&mut self, buffer: &mut String) -> Result<(), XMLError> {
        let quote = self.parse_quote(XMLError::ParserInvalidSystemLiteral, "SystemLiteral")?;
        while let Some(c) = self.next_char_if(|c| c != quote)? {
            buffer.push(c);
        }
        if self.next_char()?.is_none() {
            fatal_error!(self, ParserUnexpectedEOF, "Unexpected EOF.");
            return Err(XMLError::ParserUnexpectedEOF);
        }
        if buffer.contains('#') {
            error!(
                self,
                ParserInvalidSystemLiteral,
                "SystemLiteral '{}' must not contain a fragment identifier.",
                buffer
            );
        }
        Ok(())
    }

    /// ```text
    /// [12] PubidLiteral ::= '"' PubidChar* '"' | "'" (PubidChar - "'")* "'"
    /// ```
    pub(crate) fn parse_pubid_literal(&mut self, buffer: &mut String) -> Result<(), XMLError> {
        let quote = self.parse_quote(XMLError::ParserInvalidPubidLiteral, "PubidLiteral")?;
        let version = self.version;
        while let Some(c) = self.next_char_if(|c| version.is_pubid_char(c) && c != quote)? {
            buffer.push(c);
        }

        match self.next_char()? {
            Some(c) if c == quote => Ok(()),
            Some(c) => {
                fatal_error!(
                    self,
                    ParserInvalidPubidLiteral,
                    "A character '0x{:X}' is not allowed in PubidLiteral.",
                    c as u32
                );
                Err(XMLError::ParserInvalidPubidLiteral)
            }
            None => {
                fatal_error!(self, ParserUnexpectedEOF, "Unexpected EOF.");
                Err(XMLError::ParserUnexpectedEOF)
            }
        }
    }

    /// ```text
    /// [75] ExternalID ::= 'SYSTEM' S SystemLiteral
    ///                     | 'PUBLIC' S PubidLiteral S SystemLiteral
    /// [83] PublicID   ::= 'PUBLIC' S PubidLiteral
    /// ```
    ///
    /// If `allow_public_id` is `true`, the system literal after a public identifier is
    /// optional, as in notation declarations.
    ///
    /// Returns `(public_id, system_id)`.
    pub(crate) fn parse_external_id(
        &mut self,
        allow_public_id: bool,
    ) -> Result<(Option<String>, Option<String>), XMLError> {
        if self.starts_with("SYSTEM")? {
            self.advance(6)?;
            if self.skip_whitespaces_in_decl()? == 0 {
                fatal_error!(
                    self,
                    ParserInvalidExternalID,
                    "Whitespaces are required after 'SYSTEM'."
                );
            }
            let mut system_id = String::new();
            self.parse_system_literal(&mut system_id)?;
            return Ok((None, Some(system_id)));
        }
        if !self.starts_with("PUBLIC")? {
            fatal_error!(
                self,
                ParserInvalidExternalID,
                "ExternalID must start with 'SYSTEM' or 'PUBLIC'."
            );
            return Err(XMLError::ParserInvalidExternalID);
        }
        self.advance(6)?;
        if self.skip_whitespaces_in_decl()? == 0 {
            fatal_error!(
                self,
                ParserInvalidExternalID,
                "Whitespaces are required after 'PUBLIC'."
            );
        }
        let mut public_id = String::new();
        self.parse_pubid_literal(&mut public_id)?;

        let s = self.skip_whitespaces_in_decl()?;
        if allow_public_id && !matches!(self.peek_char()?, Some('"' | '\'')) {
            return Ok((Some(public_id), None));
        }
        if s == 0 {
            fatal_error!(
                self,
                ParserInvalidExternalID,
                "Whitespaces are required between PubidLiteral and SystemLiteral."
            );
        }
        let mut system_id = String::new();
        self.parse_system_literal(&mut system_id)?;
        Ok((Some(public_id), Some(system_id)))
    }

    /// ```text
    /// [66] CharRef ::= '&#' [0-9]+ ';' | '&#x' [0-9a-fA-F]+ ';'
    /// ```
    pub(crate) fn parse_char_ref(&mut self) -> Result<char, XMLError> {
        if !self.starts_with("&#")? {
            fatal_error!(
                self,
                ParserInvalidCharacterReference,
                "A character reference must start with '&#' or '&#x'."
            );
            return Err(XMLError::ParserInvalidCharacterReference);
        }
        // skip '&#'
        self.advance(2)?;
        let radix = if self.next_char_if(|c| c == 'x')?.is_some() {
            16
        } else {
            10
        };

        let mut code = Some(0u32);
        let mut len = 0;
        while let Some(c) = self.next_char_if(|c| c.is_digit(radix))? {
            code = code
                .and_then(|code| code.checked_mul(radix))
                .and_then(|code| code.checked_add(c.to_digit(radix)?));
            len += 1;
        }

        if self.next_char_if(|c| c == ';')?.is_none() {
            fatal_error!(
                self,
                ParserInvalidCharacterReference,
                "The character reference does not end with ';'."
            );
            return Err(XMLError::ParserInvalidCharacterReference);
        }
        if len == 0 {
            fatal_error!(
                self,
                ParserInvalidCharacterReference,
                "'&#{};' is not a correct character reference.",
                if radix == 16 { "x" } else { "" }
            );
            return Err(XMLError::ParserInvalidCharacterReference);
        }
        let Some(code) = code else {
            fatal_error!(
                self,
                ParserInvalidCharacterReference,
                "The code point specified by the character reference is too large."
            );
            return Err(XMLError::ParserInvalidCharacterReference);
        };
        match char::from_u32(code).filter(|&c| self.is_char(c)) {
            Some(c) => Ok(c),
            None => {
                fatal_error!(
                    self,
                    ParserInvalidCharacter,
                    "The code point '0x{:X}' does not indicate a character that is allowed in a XML document.",
                    code
                );
                Err(XMLError::ParserInvalidCharacter)
            }
        }
    }

    /// ```text
    /// [10] AttValue ::= '"' ([^<&"] | Reference)* '"' | "'" ([^<&'] | Reference)* "'"
    /// ```
    ///
    /// References are expanded and whitespaces are normalized as for CDATA attributes.
    pub(crate) fn parse_att_value(&mut self, buffer: &mut String) -> Result<(), XMLError> {
        let quote = self.parse_quote(XMLError::ParserInvalidAttValue, "AttValue")?;
        loop {
            match self.peek_char()? {
                None => {
                    fatal_error!(self, ParserUnexpectedEOF, "Unexpected EOF in AttValue.");
                    return Err(XMLError::ParserUnexpectedEOF);
                }
                Some(c) if c == quote => {
                    self.next_char()?;
                    return Ok(());
                }
                Some('<') => {
                    fatal_error!(self, ParserInvalidAttValue, "'<' is not allowed in AttValue.");
                    return Err(XMLError::ParserInvalidAttValue);
                }
                Some('&') => {
                    if self.starts_with("&#")? {
                        buffer.push(self.parse_char_ref()?);
                    } else {
                        self.next_char()?;
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
                        let mut visiting = vec![];
                        self.expand_entity_in_att_value(&name, buffer, &mut visiting)?;
                    }
                }
                Some(_) => {
                    let Some(c) = self.next_char()? else {
                        continue;
                    };
                    if self.is_whitespace(c) {
                        buffer.push(' ');
                    } else if self.is_char(c) {
                        buffer.push(c);
                    } else {
                        fatal_error!(
                            self,
                            ParserInvalidCharacter,
                            "A character '0x{:X}' is not allowed in XML documents.",
                            c as u32
                        );
                        return Err(XMLError::ParserInvalidCharacter);
                    }
                }
            }
        }
    }

    /// Append the normalized replacement text of the general entity `name`.
    fn expand_entity_in_att_value(
        &mut self,
        name: &str,
        buffer: &mut String,
        visiting: &mut Vec<Arc<str>>,
    ) -> Result<(), XMLError> {
        if let Some(c) = predefined_entity_char(name) {
            buffer.push(c);
            return Ok(());
        }
        let Some(decl) = self.dtd().and_then(|dtd| dtd.get_entity(name)).cloned() else {
            return self.undeclared_entity(name);
        };
        self.check_standalone_entity(name, &decl)?;
        let EntityDecl::InternalGeneralEntity {
            replacement_text, ..
        } = decl
        else {
            fatal_error!(
                self,
                ParserExternalEntityInAttribute,
                "The external entity '{}' cannot be referred to in attribute values.",
                name
            );
            return Err(XMLError::ParserExternalEntityInAttribute);
        };
        if visiting.iter().any(|v| v.as_ref() == name) || self.is_entity_active(name) {
            fatal_error!(
                self,
                ParserEntityRecursion,
                "The entity '{}' refers to itself.",
                name
            );
            return Err(XMLError::ParserEntityRecursion);
        }

        visiting.push(name.into());
        let mut rem = replacement_text.as_ref();
        while let Some(c) = rem.chars().next() {
            match c {
                '<' => {
                    fatal_error!(
                        self,
                        ParserInvalidAttValue,
                        "The replacement text of '{}' contains '<', so it cannot be used in attribute values.",
                        name
                    );
                    return Err(XMLError::ParserInvalidAttValue);
                }
                '&' => {
                    let Some((reference, len)) = split_reference(rem) else {
                        fatal_error!(
                            self,
                            ParserInvalidEntityReference,
                            "The replacement text of '{}' contains a broken reference.",
                            name
                        );
                        return Err(XMLError::ParserInvalidEntityReference);
                    };
                    match reference {
                        Reference::Char(c) => buffer.push(c),
                        Reference::Entity(child) => {
                            self.expand_entity_in_att_value(child, buffer, visiting)?
                        }
                    }
                    rem = &rem[len..];
                    continue;
                }
                c if self.is_whitespace(c) => buffer.push(' '),
                c => buffer.push(c),
            }
            rem = &rem[c.len_utf8()..];
        }
        visiting.pop();
        Ok(())
    }

    /// ```text
    /// [9] EntityValue ::= '"' ([^%&"] | PEReference | Reference)* '"'
    ///                     |  "'" ([^%&'] | PEReference | Reference)* "'"
    /// ```
    ///
    /// Character references and parameter entity references are expanded. References to
    /// general entities are kept as they are.
    pub(crate) fn parse_entity_value(&mut self, buffer: &mut String) -> Result<(), XMLError> {
        let quote = self.parse_quote(XMLError::ParserInvalidEntityDecl, "EntityValue")?;
        // The closing quote must be found in the same entity as the opening one.
        let depth = self.entity_stack.len();
        loop {
            match self.peek_char()? {
                None if self.entity_stack.len() > depth => {
                    self.pop_entity();
                }
                None => {
                    fatal_error!(self, ParserUnexpectedEOF, "Unexpected EOF in EntityValue.");
                    return Err(XMLError::ParserUnexpectedEOF);
                }
                Some(c) if c == quote && self.entity_stack.len() == depth => {
                    self.next_char()?;
                    return Ok(());
                }
                Some('&') => {
                    if self.starts_with("&#")? {
                        buffer.push(self.parse_char_ref()?);
                        continue;
                    }
                    self.next_char()?;
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
                    buffer.push('&');
                    buffer.push_str(&name);
                    buffer.push(';');
                }
                Some('%') => {
                    if !self.in_external_markup() {
                        fatal_error!(
                            self,
                            ParserPEReferenceInInternalSubsetMarkup,
                            "Parameter entity references must not appear within markup declarations in the internal subset."
                        );
                        return Err(XMLError::ParserPEReferenceInInternalSubsetMarkup);
                    }
                    self.next_char()?;
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
                    if let Some(source) = self.open_parameter_entity(&name, true)? {
                        self.push_entity(
                            source,
                            format!("%{name}").into(),
                            crate::parse::EntityKind::Parameter { in_markup: true },
                        )?;
                        self.parse_text_decl_if_present(TextDeclContext::ParameterEntity)?;
                    }
                }
                Some(_) => {
                    let Some(c) = self.next_char()? else {
                        continue;
                    };
                    if !self.is_char(c) {
                        fatal_error!(
                            self,
                            ParserInvalidCharacter,
                            "A character '0x{:X}' is not allowed in XML documents.",
                            c as u32
                        );
                        return Err(XMLError::ParserInvalidCharacter);
                    }
                    buffer.push(c);
                }
            }
        }
    }
}
