use crate::{
    ENCODING_NAME_LIMIT_LENGTH, XML_VERSION_NUM_LIMIT_LENGTH, XMLVersion,
    encoding::{UTF16BE_NAME, UTF16LE_NAME, find_decoder},
    error::XMLError,
    sax::{
        error::{fatal_error, warning},
        handler::SAXHandler,
        parser::XMLReader,
        source::{EncodingOrigin, SourceKind},
    },
};

/// Where a text declaration is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TextDeclContext {
    ExternalSubset,
    ParameterEntity,
    GeneralEntity,
}

fn is_utf16(name: &str) -> bool {
    name == UTF16BE_NAME || name == UTF16LE_NAME
}

impl<H: SAXHandler> XMLReader<H> {
    /// ```text
    /// [23] XMLDecl ::= '<?xml' VersionInfo EncodingDecl? SDDecl? S? '?>'
    /// ```
    pub(crate) fn parse_xml_decl(&mut self) -> Result<(), XMLError> {
        if !self.starts_with("<?xml")? {
            fatal_error!(
                self,
                ParserInvalidXMLDecl,
                "XML declaration must start with '<?xml'."
            );
            return Err(XMLError::ParserInvalidXMLDecl);
        }
        // skip '<?xml'
        self.advance(5)?;

        let (version, version_str) = self.parse_version_info(false)?;

        let mut s = self.skip_whitespaces()?;
        let mut encoding = None;
        if self.starts_with("encoding")? {
            if s == 0 {
                fatal_error!(
                    self,
                    ParserInvalidXMLDecl,
                    "Whitespaces are required before 'encoding'."
                );
            }
            encoding = Some(self.parse_encoding_decl()?);
            s = self.skip_whitespaces()?;
        }

        let mut standalone = None;
        if self.starts_with("standalone")? {
            if s == 0 {
                fatal_error!(
                    self,
                    ParserInvalidXMLDecl,
                    "Whitespaces are required before 'standalone'."
                );
            }
            standalone = Some(self.parse_sddecl()?);
            self.skip_whitespaces()?;
        }

        if !self.starts_with("?>")? {
            fatal_error!(
                self,
                ParserInvalidXMLDecl,
                "XMLDecl is not closed with '?>'."
            );
            return Err(XMLError::ParserInvalidXMLDecl);
        }
        // skip '?>'
        self.advance(2)?;

        if let Some(encoding) = encoding.as_deref() {
            self.check_declared_encoding(encoding)?;
        }
        if !self.fatal_error_occurred {
            self.handler
                .declaration(&version_str, encoding.as_deref(), standalone);
        }
        self.version = version;
        self.standalone = standalone;
        self.encoding = encoding;
        Ok(())
    }

    /// Check that the declared encoding agrees with the decoder of the current source.
    ///
    /// Sources created from strings or with an explicit encoding ignore the declaration.
    fn check_declared_encoding(&mut self, encoding: &str) -> Result<(), XMLError> {
        let origin = self.source.encoding_origin();
        if origin == EncodingOrigin::Forced {
            return Ok(());
        }
        let Some(decoder) = find_decoder(encoding) else {
            fatal_error!(
                self,
                ParserUnsupportedEncoding,
                "The declared encoding '{}' is not supported.",
                encoding
            );
            return Err(XMLError::ParserUnsupportedEncoding);
        };
        let actual = self.source.encoding_name();
        if is_utf16(decoder.name()) != is_utf16(actual) {
            fatal_error!(
                self,
                ParserInvalidEncodingDecl,
                "The declared encoding '{}' does not match the detected encoding '{}'.",
                encoding,
                actual
            );
            return Err(XMLError::ParserInvalidEncodingDecl);
        }
        if decoder.name() != actual && origin == EncodingOrigin::ByteOrderMark {
            warning!(
                self,
                ParserInvalidEncodingDecl,
                "The declared encoding '{}' is ignored because the byte order mark selects '{}'.",
                encoding,
                actual
            );
        }
        Ok(())
    }

    /// ```text
    /// [24] VersionInfo ::= S 'version' Eq ("'" VersionNum "'" | '"' VersionNum '"')
    /// [26] VersionNum  ::= '1.' [0-9]+
    /// ```
    ///
    /// Returns the version and its literal.
    fn parse_version_info(&mut self, text_decl: bool) -> Result<(XMLVersion, String), XMLError> {
        if self.skip_whitespaces()? == 0 {
            fatal_error!(
                self,
                ParserInvalidXMLDecl,
                "Whitespaces are required before 'version'."
            );
        }
        if !self.starts_with("version")? {
            fatal_error!(
                self,
                ParserInvalidXMLVersion,
                "VersionInfo must start with 'version'."
            );
            return Err(XMLError::ParserInvalidXMLVersion);
        }
        // skip 'version'
        self.advance(7)?;
        self.parse_eq(XMLError::ParserInvalidXMLDecl)?;
        let quote = self.parse_decl_quote(XMLError::ParserInvalidXMLDecl)?;

        let mut version_str = String::new();
        while let Some(c) = self.next_char_if(|c| c.is_ascii_digit() || c == '.')? {
            if version_str.len() >= XML_VERSION_NUM_LIMIT_LENGTH {
                fatal_error!(
                    self,
                    ParserTooLongXMLVersionNumber,
                    "Too long XML version number is found."
                );
                return Err(XMLError::ParserTooLongXMLVersionNumber);
            }
            version_str.push(c);
        }
        self.parse_closing_quote(quote, XMLError::ParserInvalidXMLDecl)?;

        let version = match version_str.split_once('.') {
            Some(("1", "0")) => XMLVersion::XML10,
            Some(("1", minor))
                if !minor.is_empty() && minor.bytes().all(|b| b.is_ascii_digit()) =>
            {
                warning!(
                    self,
                    ParserUnsupportedXMLVersion,
                    "XML version '{}' is not supported. Fallback to XML 1.0.",
                    version_str
                );
                XMLVersion::Unknown
            }
            _ => {
                fatal_error!(
                    self,
                    ParserInvalidXMLVersion,
                    "'{}' is not a correct XML version number.",
                    version_str
                );
                return Err(XMLError::ParserInvalidXMLVersion);
            }
        };
        if text_decl && version != self.version {
            fatal_error!(
                self,
                ParserUnsupportedXMLVersion,
                "XML {} document must not refer to XML {} entity.",
                self.version,
                version
            );
        }
        Ok((version, version_str))
    }

    /// ```text
    /// [25] Eq ::= S? '=' S?
    /// ```
    fn parse_eq(&mut self, error: XMLError) -> Result<(), XMLError> {
        self.skip_whitespaces()?;
        if self.next_char_if(|c| c == '=')?.is_none() {
            fatal_error!(self, error.clone(), "'=' is not found.");
            return Err(error);
        }
        self.skip_whitespaces()?;
        Ok(())
    }

    fn parse_decl_quote(&mut self, error: XMLError) -> Result<char, XMLError> {
        match self.next_char_if(|c| c == '"' || c == '\'')? {
            Some(quote) => Ok(quote),
            None => {
                fatal_error!(self, error.clone(), "A quotation mark is required.");
                Err(error)
            }
        }
    }

    fn parse_closing_quote(&mut self, quote: char, error: XMLError) -> Result<(), XMLError> {
        if self.next_char_if(|c| c == quote)?.is_none() {
            fatal_error!(
                self,
                error.clone(),
                "The quotation marks are incorrect. '{}' is expected.",
                quote
            );
            return Err(error);
        }
        Ok(())
    }

    /// ```text
    /// [80] EncodingDecl ::= S 'encoding' Eq ('"' EncName '"' | "'" EncName "'" )
    /// [81] EncName      ::= [A-Za-z] ([A-Za-z0-9._] | '-')*
    /// ```
    fn parse_encoding_decl(&mut self) -> Result<String, XMLError> {
        if !self.starts_with("encoding")? {
            fatal_error!(
                self,
                ParserInvalidEncodingDecl,
                "'encoding' is not found for EncodingDecl."
            );
            return Err(XMLError::ParserInvalidEncodingDecl);
        }
        // skip 'encoding'
        self.advance(8)?;
        self.parse_eq(XMLError::ParserInvalidEncodingDecl)?;
        let quote = self.parse_decl_quote(XMLError::ParserInvalidEncodingDecl)?;

        let mut name = String::new();
        if let Some(c) = self.next_char_if(|c| c.is_ascii_alphabetic())? {
            name.push(c);
        } else {
            fatal_error!(
                self,
                ParserInvalidEncodingName,
                "The first character of an encoding name must be ASCII alphabetic."
            );
        }
        while let Some(c) =
            self.next_char_if(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))?
        {
            if name.len() >= ENCODING_NAME_LIMIT_LENGTH {
                fatal_error!(
                    self,
                    ParserTooLongEncodingName,
                    "Too long encoding name is found."
                );
                return Err(XMLError::ParserTooLongEncodingName);
            }
            name.push(c);
        }
        self.parse_closing_quote(quote, XMLError::ParserInvalidEncodingDecl)?;
        Ok(name)
    }

    /// ```text
    /// [32] SDDecl ::= S 'standalone' Eq (("'" ('yes' | 'no') "'") | ('"' ('yes' | 'no') '"'))
    /// ```
    fn parse_sddecl(&mut self) -> Result<bool, XMLError> {
        // skip 'standalone'
        self.advance(10)?;
        self.parse_eq(XMLError::ParserInvalidSDDecl)?;
        let quote = self.parse_decl_quote(XMLError::ParserInvalidSDDecl)?;
        let ret = if self.starts_with("yes")? {
            self.advance(3)?;
            true
        } else if self.starts_with("no")? {
            self.advance(2)?;
            false
        } else {
            fatal_error!(
                self,
                ParserInvalidSDDecl,
                "The value of SDDecl must be either 'yes' or 'no'."
            );
            return Err(XMLError::ParserInvalidSDDecl);
        };
        self.parse_closing_quote(quote, XMLError::ParserInvalidSDDecl)?;
        Ok(ret)
    }

    /// Read the text declaration at the head of an external entity, if any.
    pub(crate) fn parse_text_decl_if_present(
        &mut self,
        context: TextDeclContext,
    ) -> Result<(), XMLError> {
        if self.source.kind() != SourceKind::External || !self.starts_with("<?xml")? {
            return Ok(());
        }
        self.source.fill(6)?;
        let version = self.version;
        if self
            .source
            .content_bytes()
            .get(5)
            .is_some_and(|&b| version.is_whitespace(b))
        {
            log::trace!("text declaration in {context:?}");
            self.parse_text_decl()?;
        }
        Ok(())
    }

    /// ```text
    /// [77] TextDecl ::= '<?xml' VersionInfo? EncodingDecl S? '?>'
    /// ```
    fn parse_text_decl(&mut self) -> Result<(), XMLError> {
        // skip '<?xml'
        self.advance(5)?;

        // `parse_version_info` consumes the leading whitespaces by itself.
        self.source.fill(8)?;
        let version = self.version;
        let head = self.source.content_bytes();
        let skip = head.iter().take_while(|&&b| version.is_whitespace(b)).count();
        if head[skip..].starts_with(b"version") {
            self.parse_version_info(true)?;
        }

        if self.skip_whitespaces()? == 0 {
            fatal_error!(
                self,
                ParserInvalidTextDecl,
                "Whitespaces are required before 'encoding'."
            );
        }
        if !self.starts_with("encoding")? {
            fatal_error!(
                self,
                ParserInvalidTextDecl,
                "The text declaration must have an encoding declaration."
            );
            return Err(XMLError::ParserInvalidTextDecl);
        }
        let encoding = self.parse_encoding_decl()?;
        self.check_declared_encoding(&encoding)?;
        self.skip_whitespaces()?;

        if !self.starts_with("?>")? {
            fatal_error!(
                self,
                ParserInvalidTextDecl,
                "The text declaration does not end with '?>'."
            );
            return Err(XMLError::ParserInvalidTextDecl);
        }
        // skip '?>'
        self.advance(2)?;
        Ok(())
    }
}
