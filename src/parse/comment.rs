use crate::{
    error::XMLError,
    sax::{error::fatal_error, handler::SAXHandler, parser::XMLReader},
};

impl<H: SAXHandler> XMLReader<H> {
    /// ```text
    /// [15] Comment ::= '<!--' ((Char - '-') | ('-' (Char - '-')))* '-->'
    /// ```
    pub(crate) fn parse_comment(&mut self) -> Result<(), XMLError> {
        if !self.starts_with("<!--")? {
            fatal_error!(
                self,
                ParserInvalidComment,
                "Comment does not start with '<!--'."
            );
            return Err(XMLError::ParserInvalidComment);
        }
        // skip '<!--'
        self.advance(4)?;

        let mut buffer = String::new();
        loop {
            if self.starts_with("-->")? {
                break;
            }
            match self.next_char()? {
                Some('-') => {
                    if self.peek_char()? == Some('-') {
                        fatal_error!(
                            self,
                            ParserInvalidComment,
                            "Comment must not contain '--' except for delimiters."
                        );
                        return Err(XMLError::ParserInvalidComment);
                    }
                    buffer.push('-');
                }
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
                    fatal_error!(
                        self,
                        ParserInvalidComment,
                        "Comment does not end with '-->'."
                    );
                    return Err(XMLError::ParserUnexpectedEOF);
                }
            }
        }
        // skip '-->'
        self.advance(3)?;

        if !self.fatal_error_occurred {
            self.handler.comment(&buffer);
        }
        Ok(())
    }
}
