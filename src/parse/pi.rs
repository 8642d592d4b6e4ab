use crate::{
    error::XMLError,
    sax::{
        error::fatal_error,
        handler::SAXHandler,
        parser::{ParserOption, XMLReader},
    },
};

impl<H: SAXHandler> XMLReader<H> {
    /// ```text
    /// [16] PI       ::= '<?' PITarget (S (Char* - (Char* '?>' Char*)))? '?>'
    /// [17] PITarget ::= Name - (('X' | 'x') ('M' | 'm') ('L' | 'l'))
    /// ```
    pub(crate) fn parse_pi(&mut self) -> Result<(), XMLError> {
        if !self.starts_with("<?")? {
            fatal_error!(
                self,
                ParserInvalidProcessingInstruction,
                "PI does not start with '<?'."
            );
            return Err(XMLError::ParserInvalidProcessingInstruction);
        }
        // skip '<?'
        self.advance(2)?;

        let mut target = String::new();
        if self.config.is_enable(ParserOption::Namespaces) {
            self.parse_ncname(&mut target)?;
        } else {
            self.parse_name(&mut target)?;
        }
        if target.eq_ignore_ascii_case("xml") {
            fatal_error!(
                self,
                ParserUnacceptablePITarget,
                "PI target '{}' is not allowed.",
                target
            );
            return Err(XMLError::ParserUnacceptablePITarget);
        }

        let s = self.skip_whitespaces()?;
        if self.starts_with("?>")? {
            // skip '?>'
            self.advance(2)?;
            if !self.fatal_error_occurred {
                self.handler.processing_instruction(&target, None);
            }
            return Ok(());
        }
        if s == 0 {
            fatal_error!(
                self,
                ParserInvalidProcessingInstruction,
                "Whitespaces are required between PI target and data."
            );
        }

        let mut data = String::new();
        while !self.starts_with("?>")? {
            match self.next_char()? {
                Some(c) if self.is_char(c) => data.push(c),
                Some(c) => {
                    fatal_error!(
                        self,
                        ParserInvalidCharacter,
                        "A character '0x{:X}' is not allowed in XML documents.",
                        c as u32
                    );
                    return Err(XMLError::ParserInvalidCharacter);
                }
                None => {
                    fatal_error!(
                        self,
                        ParserInvalidProcessingInstruction,
                        "PI does not close with '?>'."
                    );
                    return Err(XMLError::ParserUnexpectedEOF);
                }
            }
        }
        // skip '?>'
        self.advance(2)?;

        if !self.fatal_error_occurred {
            self.handler.processing_instruction(&target, Some(&data));
        }
        Ok(())
    }
}
