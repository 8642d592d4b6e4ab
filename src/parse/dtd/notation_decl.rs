use crate::{
    error::XMLError,
    grammar::dtd::NotationDecl,
    sax::{
        error::{fatal_error, validity_error},
        handler::SAXHandler,
        parser::{ParserOption, XMLReader},
    },
};

impl<H: SAXHandler> XMLReader<H> {
    /// ```text
    /// [82] NotationDecl ::= '<!NOTATION' S Name S (ExternalID | PublicID) S? '>'
    ///                                             [VC: Unique Notation Name]
    /// [83] PublicID     ::= 'PUBLIC' S PubidLiteral
    /// ```
    pub(crate) fn parse_notation_decl(&mut self) -> Result<(), XMLError> {
        let start_depth = self.entity_stack.len();
        // skip '<!NOTATION'
        self.advance(10)?;
        if self.skip_whitespaces_in_decl()? == 0 {
            fatal_error!(
                self,
                ParserInvalidNotationDecl,
                "Whitespaces are required after '<!NOTATION' in Notation declaration."
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
                ParserInvalidNotationDecl,
                "Whitespaces are required after Name in Notation declaration."
            );
        }
        let (public_id, system_id) = self.parse_external_id(true)?;
        self.close_decl(start_depth, "notation", XMLError::ParserInvalidNotationDecl)?;

        let decl = NotationDecl {
            name: name.as_str().into(),
            public_id: public_id.map(String::into_boxed_str),
            system_id: system_id.map(String::into_boxed_str),
        };
        let Some(dtd) = self.dtd_building.as_mut() else {
            return Ok(());
        };
        if !dtd.add_notation(decl.clone())? {
            if self.config.is_enable(ParserOption::Validation) {
                // [VC: Unique Notation Name]
                validity_error!(
                    self,
                    ParserInvalidNotationDecl,
                    "The notation '{}' is declared more than once.",
                    name
                );
            }
            return Ok(());
        }
        if !self.fatal_error_occurred {
            self.handler.notation_decl(
                &name,
                decl.public_id.as_deref(),
                decl.system_id.as_deref(),
            );
        }
        Ok(())
    }
}
