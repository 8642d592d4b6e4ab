use crate::{
    CHARDATA_CHUNK_LENGTH,
    error::XMLError,
    sax::{
        error::{fatal_error, validity_error},
        handler::SAXHandler,
        parser::XMLReader,
    },
};

impl<H: SAXHandler> XMLReader<H> {
    /// ```text
    /// [14] CharData ::= [^<&]* - ([^<&]* ']]>' [^<&]*)
    /// ```
    ///
    /// Reads until the next markup or reference, or the end of the current entity.
    pub(crate) fn parse_char_data(&mut self) -> Result<(), XMLError> {
        let mut buffer = String::new();
        let mut whitespace_only = true;
        while let Some(c) = self.peek_char()? {
            if c == '<' || c == '&' {
                break;
            }
            if c == ']' && self.starts_with("]]>")? {
                fatal_error!(
                    self,
                    ParserUnacceptablePatternInCharData,
                    "']]>' is not allowed in character data."
                );
                return Err(XMLError::ParserUnacceptablePatternInCharData);
            }
            // '\r' and '\r\n' come back as '\n'
            let c = self.next_char()?.unwrap_or(c);
            if !self.is_char(c) {
                fatal_error!(
                    self,
                    ParserInvalidCharacter,
                    "A character '0x{:X}' is not allowed in XML documents.",
                    c as u32
                );
                return Err(XMLError::ParserInvalidCharacter);
            }
            whitespace_only &= self.is_whitespace(c);
            buffer.push(c);

            if buffer.len() >= CHARDATA_CHUNK_LENGTH {
                self.deliver_text(&buffer, whitespace_only);
                buffer.clear();
                whitespace_only = true;
            }
        }
        if !buffer.is_empty() {
            self.deliver_text(&buffer, whitespace_only);
        }
        Ok(())
    }

    /// Pass character data to the validators and the handler.
    ///
    /// `whitespace_only` is `true` only for literal whitespace, which element content may
    /// contain.
    pub(crate) fn deliver_text(&mut self, text: &str, whitespace_only: bool) {
        let (element_only, external) = self
            .element_stack
            .last()
            .map_or((false, false), |elem| {
                (elem.element_only, elem.external_element_content)
            });
        let ignorable = whitespace_only && element_only;

        if self.validates_with_dtd() {
            if ignorable && external && self.standalone == Some(true) {
                // [VC: Standalone Document Declaration]
                validity_error!(
                    self,
                    ParserInvalidStandaloneDocument,
                    "Whitespace appears in an element whose content is declared externally, but the document is standalone."
                );
            }
            let violations = self.dtd_validator.characters(text, whitespace_only);
            self.report_violations(violations);
        }
        if self.validates_with_schema() {
            let violations = self.schema_validator.characters(text);
            self.report_violations(violations);
        }

        if self.fatal_error_occurred {
            return;
        }
        if ignorable {
            self.handler.ignorable_whitespace(text);
        } else {
            self.handler.characters(text);
        }
    }
}
