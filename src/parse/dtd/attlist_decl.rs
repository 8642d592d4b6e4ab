use crate::{
    error::XMLError,
    grammar::dtd::{AttributeType, DefaultDecl},
    sax::{
        error::{fatal_error, validity_error},
        handler::SAXHandler,
        parser::{ParserOption, XMLReader},
    },
    util::{StringTokenizer, collapse_whitespace},
};

impl<H: SAXHandler> XMLReader<H> {
    /// ```text
    /// [52] AttlistDecl ::= '<!ATTLIST' S Name AttDef* S? '>'
    /// [53] AttDef      ::= S Name S AttType S DefaultDecl
    /// ```
    pub(crate) fn parse_attlist_decl(&mut self) -> Result<(), XMLError> {
        let start_depth = self.entity_stack.len();
        let in_external_markup = self.in_external_markup();
        // skip '<!ATTLIST'
        self.advance(9)?;
        if self.skip_whitespaces_in_decl()? == 0 {
            fatal_error!(
                self,
                ParserInvalidAttlistDecl,
                "Whitespaces are required after '<!ATTLIST' in attribute-list declaration."
            );
        }
        let mut elem_name = String::new();
        self.parse_element_type_name(&mut elem_name)?;

        let mut att_name = String::new();
        loop {
            let s = self.skip_whitespaces_in_decl()?;
            match self.peek_char()? {
                Some('>') => break,
                Some(_) if s == 0 => {
                    fatal_error!(
                        self,
                        ParserInvalidAttlistDecl,
                        "Whitespaces are required before an attribute definition."
                    );
                    return Err(XMLError::ParserInvalidAttlistDecl);
                }
                Some(_) => {}
                None => {
                    fatal_error!(
                        self,
                        ParserUnexpectedEOF,
                        "Unexpected EOF in attribute-list declaration."
                    );
                    return Err(XMLError::ParserUnexpectedEOF);
                }
            }

            att_name.clear();
            self.parse_element_type_name(&mut att_name)?;
            if self.skip_whitespaces_in_decl()? == 0 {
                fatal_error!(
                    self,
                    ParserInvalidAttlistDecl,
                    "Whitespaces are required after the attribute name '{}'.",
                    att_name
                );
            }
            let att_type = self.parse_att_type(&att_name)?;
            if self.skip_whitespaces_in_decl()? == 0 {
                fatal_error!(
                    self,
                    ParserInvalidAttlistDecl,
                    "Whitespaces are required after the type of the attribute '{}'.",
                    att_name
                );
            }
            let default_decl = self.parse_default_decl(&att_type)?;
            self.add_attribute_def(
                &elem_name,
                &att_name,
                att_type,
                default_decl,
                in_external_markup,
            )?;
        }

        self.close_decl(
            start_depth,
            "attribute-list",
            XMLError::ParserInvalidAttlistDecl,
        )
    }

    /// ```text
    /// [54] AttType        ::= StringType | TokenizedType | EnumeratedType
    /// [55] StringType     ::= 'CDATA'
    /// [56] TokenizedType  ::= 'ID' | 'IDREF' | 'IDREFS' | 'ENTITY' | 'ENTITIES'
    ///                         | 'NMTOKEN' | 'NMTOKENS'
    /// [57] EnumeratedType ::= NotationType | Enumeration
    /// [58] NotationType   ::= 'NOTATION' S '(' S? Name (S? '|' S? Name)* S? ')'
    /// [59] Enumeration    ::= '(' S? Nmtoken (S? '|' S? Nmtoken)* S? ')'
    /// ```
    fn parse_att_type(&mut self, att_name: &str) -> Result<AttributeType, XMLError> {
        const KEYWORDS: &[(&str, AttributeType)] = &[
            ("CDATA", AttributeType::CDATA),
            ("IDREFS", AttributeType::IDREFS),
            ("IDREF", AttributeType::IDREF),
            ("ID", AttributeType::ID),
            ("ENTITIES", AttributeType::ENTITIES),
            ("ENTITY", AttributeType::ENTITY),
            ("NMTOKENS", AttributeType::NMTOKENS),
            ("NMTOKEN", AttributeType::NMTOKEN),
        ];
        for (keyword, att_type) in KEYWORDS {
            if self.starts_with(keyword)? {
                self.advance(keyword.len())?;
                return Ok(att_type.clone());
            }
        }

        if self.starts_with("NOTATION")? {
            self.advance(8)?;
            if self.skip_whitespaces_in_decl()? == 0 {
                fatal_error!(
                    self,
                    ParserInvalidAttlistDecl,
                    "Whitespaces are required after 'NOTATION'."
                );
            }
            let names = self.parse_enumerated_values(att_name, true)?;
            Ok(AttributeType::NOTATION(names))
        } else if self.starts_with("(")? {
            let values = self.parse_enumerated_values(att_name, false)?;
            Ok(AttributeType::Enumeration(values))
        } else {
            fatal_error!(
                self,
                ParserInvalidAttlistDecl,
                "The type of the attribute '{}' is invalid.",
                att_name
            );
            Err(XMLError::ParserInvalidAttlistDecl)
        }
    }

    /// Read `'(' S? token (S? '|' S? token)* S? ')'`.
    ///
    /// Tokens are Names if `notation` is `true`, and Nmtokens otherwise.
    fn parse_enumerated_values(
        &mut self,
        att_name: &str,
        notation: bool,
    ) -> Result<Vec<Box<str>>, XMLError> {
        if self.next_char_if(|c| c == '(')?.is_none() {
            fatal_error!(
                self,
                ParserInvalidAttlistDecl,
                "The enumeration of the attribute '{}' must start with '('.",
                att_name
            );
            return Err(XMLError::ParserInvalidAttlistDecl);
        }
        let group_depth = self.entity_stack.len();
        let mut values: Vec<Box<str>> = vec![];
        let mut buffer = String::new();
        loop {
            self.skip_whitespaces_in_decl()?;
            buffer.clear();
            if notation {
                self.parse_name(&mut buffer)?;
            } else {
                self.parse_nmtoken(&mut buffer)?;
            }
            if values.iter().any(|value| value.as_ref() == buffer) {
                if self.config.is_enable(ParserOption::Validation) {
                    // [VC: No Duplicate Tokens]
                    validity_error!(
                        self,
                        ParserDuplicateTokensInAttlistDecl,
                        "The token '{}' appears more than once in the type of the attribute '{}'.",
                        buffer,
                        att_name
                    );
                }
            } else {
                values.push(buffer.as_str().into());
            }
            self.skip_whitespaces_in_decl()?;
            match self.next_char()? {
                Some('|') => {}
                Some(')') => break,
                _ => {
                    fatal_error!(
                        self,
                        ParserInvalidAttlistDecl,
                        "The enumeration of the attribute '{}' is not closed correctly.",
                        att_name
                    );
                    return Err(XMLError::ParserInvalidAttlistDecl);
                }
            }
        }
        if self.entity_stack.len() != group_depth
            && self.config.is_enable(ParserOption::Validation)
        {
            validity_error!(
                self,
                ParserEntityIncorrectNesting,
                "A parameter entity in the type of the attribute '{}' is nested incorrectly.",
                att_name
            );
        }
        Ok(values)
    }

    /// ```text
    /// [60] DefaultDecl ::= '#REQUIRED' | '#IMPLIED' | (('#FIXED' S)? AttValue)
    ///                                             [VC: Required Attribute]
    ///                                             [VC: Attribute Default Value Syntactically Correct]
    ///                                             [WFC: No < in Attribute Values]
    ///                                             [VC: Fixed Attribute Default]
    ///                                             [WFC: No External Entity References]
    /// ```
    fn parse_default_decl(&mut self, att_type: &AttributeType) -> Result<DefaultDecl, XMLError> {
        if self.starts_with("#REQUIRED")? {
            self.advance(9)?;
            return Ok(DefaultDecl::REQUIRED);
        }
        if self.starts_with("#IMPLIED")? {
            self.advance(8)?;
            return Ok(DefaultDecl::IMPLIED);
        }
        let fixed = self.starts_with("#FIXED")?;
        if fixed {
            self.advance(6)?;
            if self.skip_whitespaces_in_decl()? == 0 {
                fatal_error!(
                    self,
                    ParserInvalidAttlistDecl,
                    "Whitespaces are required after '#FIXED'."
                );
            }
        }
        let mut value = String::new();
        self.parse_att_value(&mut value)?;
        let value: Box<str> = if att_type.is_tokenized() {
            collapse_whitespace(&value).into()
        } else {
            value.into()
        };
        Ok(if fixed {
            DefaultDecl::FIXED(value)
        } else {
            DefaultDecl::None(value)
        })
    }

    /// Register an attribute definition and check the constraints that involve other
    /// definitions of the same element.
    fn add_attribute_def(
        &mut self,
        elem_name: &str,
        att_name: &str,
        att_type: AttributeType,
        default_decl: DefaultDecl,
        in_external_markup: bool,
    ) -> Result<(), XMLError> {
        let validation = self.config.is_enable(ParserOption::Validation);
        if validation {
            self.check_attribute_def(elem_name, att_name, &att_type, &default_decl);
        }

        let Some(dtd) = self.dtd_building.as_mut() else {
            return Ok(());
        };
        let added = dtd.add_attribute_def(
            elem_name,
            att_name,
            att_type.clone(),
            default_decl.clone(),
            in_external_markup,
        )?;
        if !added {
            log::debug!("the attribute '{att_name}' of '{elem_name}' is already defined");
            return Ok(());
        }
        if !self.fatal_error_occurred {
            self.handler
                .attribute_decl(elem_name, att_name, &att_type, &default_decl);
        }
        Ok(())
    }

    fn check_attribute_def(
        &mut self,
        elem_name: &str,
        att_name: &str,
        att_type: &AttributeType,
        default_decl: &DefaultDecl,
    ) {
        let (has_id, has_notation, redefined) = self
            .dtd_building
            .as_ref()
            .and_then(|dtd| dtd.get_elem_decl(elem_name))
            .map_or((false, false, false), |decl| {
                (
                    decl.id_attribute().is_some(),
                    decl.attributes()
                        .iter()
                        .any(|def| matches!(def.att_type, AttributeType::NOTATION(_))),
                    decl.get_attribute_def(att_name).is_some(),
                )
            });
        if redefined {
            return;
        }

        match att_type {
            AttributeType::ID => {
                if has_id {
                    // [VC: One ID per Element Type]
                    validity_error!(
                        self,
                        ParserMultipleIDAttributePerElement,
                        "The element type '{}' has more than one ID attribute.",
                        elem_name
                    );
                }
                if !matches!(default_decl, DefaultDecl::IMPLIED | DefaultDecl::REQUIRED) {
                    // [VC: ID Attribute Default]
                    validity_error!(
                        self,
                        ParserIDAttributeWithDefault,
                        "The ID attribute '{}' must be declared '#IMPLIED' or '#REQUIRED'.",
                        att_name
                    );
                }
            }
            AttributeType::NOTATION(_) if has_notation => {
                // [VC: One Notation Per Element Type]
                validity_error!(
                    self,
                    ParserMultipleNotationAttributePerElement,
                    "The element type '{}' has more than one NOTATION attribute.",
                    elem_name
                );
            }
            _ => {}
        }

        if let Some(value) = default_decl.default_value()
            && !self.is_valid_default(att_type, value)
        {
            // [VC: Attribute Default Value Syntactically Correct]
            validity_error!(
                self,
                ParserInvalidAttributeDefault,
                "The default value '{}' of the attribute '{}' does not match its type '{}'.",
                value,
                att_name,
                att_type
            );
        }
    }

    fn is_valid_default(&self, att_type: &AttributeType, value: &str) -> bool {
        let namespaces = self.config.is_enable(ParserOption::Namespaces);
        let is_name = |s: &str| {
            if namespaces {
                self.version.validate_ncname(s)
            } else {
                self.version.validate_name(s)
            }
        };
        let mut tokens = StringTokenizer::new(value);
        match att_type {
            AttributeType::CDATA => true,
            AttributeType::ID | AttributeType::IDREF | AttributeType::ENTITY => is_name(value),
            AttributeType::IDREFS | AttributeType::ENTITIES => {
                tokens.has_more_tokens() && tokens.all(is_name)
            }
            AttributeType::NMTOKEN => self.version.validate_nmtoken(value),
            AttributeType::NMTOKENS => {
                tokens.has_more_tokens() && tokens.all(|t| self.version.validate_nmtoken(t))
            }
            AttributeType::NOTATION(values) | AttributeType::Enumeration(values) => {
                values.iter().any(|v| v.as_ref() == value)
            }
        }
    }
}
