use crate::{
    error::XMLError,
    sax::{error::fatal_error, handler::SAXHandler, parser::XMLReader},
};

impl<H: SAXHandler> XMLReader<H> {
    pub(crate) fn is_char(&self, c: char) -> bool {
        self.version.is_char(c)
    }

    pub(crate) fn is_whitespace(&self, c: char) -> bool {
        self.version.is_whitespace(c)
    }

    /// Returns the number of skipped whitespaces.
    pub(crate) fn skip_whitespaces(&mut self) -> Result<usize, XMLError> {
        let version = self.version;
        let mut skipped = 0;
        while self.next_char_if(|c| version.is_whitespace(c))?.is_some() {
            skipped += 1;
        }
        Ok(skipped)
    }

    pub(crate) fn parse_nmtoken(&mut self, buffer: &mut String) -> Result<(), XMLError> {
        let version = self.version;
        let orig = buffer.len();
        while let Some(c) = self.next_char_if(|c| version.is_name_char(c))? {
            buffer.push(c);
        }

        if buffer.len() == orig {
            fatal_error!(self, ParserEmptyNmtoken, "Nmtoken is empty.");
            return Err(XMLError::ParserEmptyNmtoken);
        }
        Ok(())
    }

    pub(crate) fn parse_name(&mut self, buffer: &mut String) -> Result<(), XMLError> {
        let version = self.version;
        let Some(c) = self.next_char_if(|c| version.is_name_start_char(c))? else {
            fatal_error!(self, ParserEmptyName, "Name is empty.");
            return Err(XMLError::ParserEmptyName);
        };
        buffer.push(c);

        while let Some(c) = self.next_char_if(|c| version.is_name_char(c))? {
            buffer.push(c);
        }
        Ok(())
    }

    /// Even if NCName is empty, no error will be reported.
    fn parse_ncname_allow_empty(&mut self, buffer: &mut String) -> Result<(), XMLError> {
        let version = self.version;
        let Some(c) = self.next_char_if(|c| version.is_name_start_char(c) && c != ':')? else {
            return Ok(());
        };
        buffer.push(c);

        while let Some(c) = self.next_char_if(|c| version.is_name_char(c) && c != ':')? {
            buffer.push(c);
        }
        Ok(())
    }

    pub(crate) fn parse_ncname(&mut self, buffer: &mut String) -> Result<(), XMLError> {
        let orig = buffer.len();
        self.parse_ncname_allow_empty(buffer)?;
        if buffer.len() == orig {
            fatal_error!(self, ParserEmptyName, "NCName is empty.");
            return Err(XMLError::ParserEmptyName);
        }
        Ok(())
    }

    /// Read a QName and return the length of its prefix.
    ///
    /// An empty prefix and extra colons are reported, but the name is still returned.
    pub(crate) fn parse_qname(&mut self, buffer: &mut String) -> Result<usize, XMLError> {
        let orig = buffer.len();
        self.parse_ncname_allow_empty(buffer)?;

        if self.next_char_if(|c| c == ':')?.is_none() {
            if buffer.len() == orig {
                fatal_error!(self, ParserEmptyQName, "QName is empty.");
                return Err(XMLError::ParserEmptyQName);
            }
            return Ok(0);
        }
        let prefix = buffer.len() - orig;
        buffer.push(':');
        if prefix == 0 {
            fatal_error!(
                self,
                ParserEmptyQNamePrefix,
                "':' is found in QName, but its prefix is empty."
            );
        }

        let before_local = buffer.len();
        self.parse_ncname_allow_empty(buffer)?;
        if buffer.len() == before_local {
            fatal_error!(
                self,
                ParserEmptyQNameLocalPart,
                "':' is found in QName, but its local part is empty."
            );
            return Err(XMLError::ParserEmptyQNameLocalPart);
        }
        // further colons are not allowed, but the name must still be consumed
        let version = self.version;
        let mut extra = false;
        while let Some(c) = self.next_char_if(|c| version.is_name_char(c))? {
            buffer.push(c);
            extra = true;
        }
        if extra {
            fatal_error!(
                self,
                ParserInvalidQNameSeparator,
                "QName '{}' contains more than one ':'.",
                &buffer[orig..]
            );
        }
        Ok(prefix)
    }

    /// Read a Name, or a QName if namespace processing is enabled.
    pub(crate) fn parse_element_type_name(&mut self, buffer: &mut String) -> Result<(), XMLError> {
        if self
            .config
            .is_enable(crate::sax::parser::ParserOption::Namespaces)
        {
            self.parse_qname(buffer)?;
        } else {
            self.parse_name(buffer)?;
        }
        Ok(())
    }
}
