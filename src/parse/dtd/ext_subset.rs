use crate::{
    error::XMLError,
    parse::dtd::DeclsEnd,
    sax::{
        error::{fatal_error, validity_error},
        handler::SAXHandler,
        parser::{ParserOption, XMLReader},
    },
};

impl<H: SAXHandler> XMLReader<H> {
    /// ```text
    /// [61] conditionalSect ::= includeSect | ignoreSect
    /// [62] includeSect     ::= '<![' S? 'INCLUDE' S? '[' extSubsetDecl ']]>'
    ///                                         [VC: Proper Conditional Section/PE Nesting]
    /// [63] ignoreSect      ::= '<![' S? 'IGNORE' S? '[' ignoreSectContents* ']]>'
    ///                                         [VC: Proper Conditional Section/PE Nesting]
    /// ```
    pub(crate) fn parse_conditional_sect(&mut self) -> Result<(), XMLError> {
        let start_depth = self.entity_stack.len();
        // skip '<!['
        self.advance(3)?;
        self.skip_whitespaces_in_decl()?;

        let include = if self.starts_with("INCLUDE")? {
            self.advance(7)?;
            true
        } else if self.starts_with("IGNORE")? {
            self.advance(6)?;
            false
        } else {
            fatal_error!(
                self,
                ParserInvalidConditionalSect,
                "A conditional section must be 'INCLUDE' or 'IGNORE'."
            );
            return Err(XMLError::ParserInvalidConditionalSect);
        };
        self.skip_whitespaces_in_decl()?;
        if self.next_char_if(|c| c == '[')?.is_none() {
            fatal_error!(
                self,
                ParserInvalidConditionalSect,
                "'[' is required after the keyword of a conditional section."
            );
            return Err(XMLError::ParserInvalidConditionalSect);
        }
        self.check_section_nesting(start_depth);

        if include {
            self.parse_markup_decls(DeclsEnd::IncludeSection)?;
        } else {
            self.skip_ignore_sect()?;
        }
        self.check_section_nesting(start_depth);
        // skip ']]>'
        self.advance(3)
    }

    /// ```text
    /// [64] ignoreSectContents ::= Ignore ('<![' ignoreSectContents ']]>' Ignore)*
    /// [65] Ignore             ::= Char* - (Char* ('<![' | ']]>') Char*)
    /// ```
    ///
    /// Stops before the `']]>'` that closes the section. References are not recognized.
    fn skip_ignore_sect(&mut self) -> Result<(), XMLError> {
        let mut nest = 0usize;
        loop {
            if self.starts_with("]]>")? {
                if nest == 0 {
                    return Ok(());
                }
                nest -= 1;
                self.advance(3)?;
            } else if self.starts_with("<![")? {
                nest += 1;
                self.advance(3)?;
            } else {
                match self.next_char()? {
                    Some(c) if self.is_char(c) => {}
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
                            ParserInvalidConditionalSect,
                            "The ignored section is not closed."
                        );
                        return Err(XMLError::ParserUnexpectedEOF);
                    }
                }
            }
        }
    }

    fn check_section_nesting(&mut self, start_depth: usize) {
        if self.entity_stack.len() != start_depth
            && self.config.is_enable(ParserOption::Validation)
        {
            // [VC: Proper Conditional Section/PE Nesting]
            validity_error!(
                self,
                ParserEntityIncorrectNesting,
                "A conditional section starts and ends in different entities."
            );
        }
    }
}
