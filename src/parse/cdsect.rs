use crate::{
    CHARDATA_CHUNK_LENGTH,
    error::XMLError,
    sax::{error::fatal_error, handler::SAXHandler, parser::XMLReader},
};

impl<H: SAXHandler> XMLReader<H> {
    /// ```text
    /// [18] CDSect  ::= CDStart CData CDEnd
    /// [19] CDStart ::= '<![CDATA['
    /// [20] CData   ::= (Char* - (Char* ']]>' Char*))
    /// [21] CDEnd   ::= ']]>'
    /// ```
    pub(crate) fn parse_cdsect(&mut self) -> Result<(), XMLError> {
        if !self.starts_with("<![CDATA[")? {
            fatal_error!(
                self,
                ParserInvalidCDSect,
                "CDSect must start with '<![CDATA['."
            );
            return Err(XMLError::ParserInvalidCDSect);
        }
        // skip '<![CDATA['
        self.advance(9)?;

        if !self.fatal_error_occurred {
            self.handler.start_cdata();
        }

        let mut buffer = String::new();
        while !self.starts_with("]]>")? {
            match self.next_char()? {
                Some(c) if self.is_char(c) => buffer.push(c),
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
                    fatal_error!(self, ParserInvalidCDSect, "CDSect does not end with ']]>'.");
                    return Err(XMLError::ParserUnexpectedEOF);
                }
            }
            if buffer.len() >= CHARDATA_CHUNK_LENGTH {
                // CDATA sections are never ignorable, even if they contain only whitespaces.
                self.deliver_text(&buffer, false);
                buffer.clear();
            }
        }
        // skip ']]>'
        self.advance(3)?;

        if !buffer.is_empty() {
            self.deliver_text(&buffer, false);
        }
        if !self.fatal_error_occurred {
            self.handler.end_cdata();
        }
        Ok(())
    }
}
