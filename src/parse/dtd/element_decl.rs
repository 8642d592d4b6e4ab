use std::sync::Arc;

use crate::{
    error::XMLError,
    grammar::dtd::ContentSpec,
    sax::{
        error::{error, fatal_error, validity_error},
        handler::SAXHandler,
        parser::{ParserOption, XMLReader},
    },
    validation::content_model::{ContentModel, ContentParticle},
};

impl<H: SAXHandler> XMLReader<H> {
    /// ```text
    /// [45] elementdecl ::= '<!ELEMENT' S Name S contentspec S? '>'
    ///                                                 [VC: Unique Element Type Declaration]
    /// [46] contentspec ::= 'EMPTY' | 'ANY' | Mixed | children
    /// ```
    pub(crate) fn parse_element_decl(&mut self) -> Result<(), XMLError> {
        let start_depth = self.entity_stack.len();
        let in_external_markup = self.in_external_markup();
        // skip '<!ELEMENT'
        self.advance(9)?;
        if self.skip_whitespaces_in_decl()? == 0 {
            fatal_error!(
                self,
                ParserInvalidElementDecl,
                "Whitespaces are required after '<!ELEMENT' in element declaration."
            );
        }
        let mut name = String::new();
        self.parse_element_type_name(&mut name)?;
        if self.skip_whitespaces_in_decl()? == 0 {
            fatal_error!(
                self,
                ParserInvalidElementDecl,
                "Whitespaces are required after Name in element declaration."
            );
        }

        let contentspec = if self.starts_with("EMPTY")? {
            self.advance(5)?;
            ContentSpec::EMPTY
        } else if self.starts_with("ANY")? {
            self.advance(3)?;
            ContentSpec::ANY
        } else if self.starts_with("(")? {
            let group_depth = self.entity_stack.len();
            // skip '('
            self.advance(1)?;
            self.skip_whitespaces_in_decl()?;
            if self.starts_with("#PCDATA")? {
                self.parse_mixed(&name, group_depth)?
            } else {
                let particle = self.parse_choice_or_seq(group_depth)?;
                ContentSpec::Children(self.parse_occurrence(particle)?)
            }
        } else {
            fatal_error!(
                self,
                ParserInvalidElementDecl,
                "Element or Mixed content must start with '('."
            );
            return Err(XMLError::ParserInvalidElementDecl);
        };

        self.close_decl(start_depth, "element", XMLError::ParserInvalidElementDecl)?;

        if !self.fatal_error_occurred {
            self.handler.element_decl(&name, &contentspec);
        }
        if let ContentSpec::Children(particle) = &contentspec {
            self.check_ambiguity(&name, particle);
        }
        let Some(dtd) = self.dtd_building.as_mut() else {
            return Ok(());
        };
        match dtd.declare_element(&name, contentspec, in_external_markup) {
            Ok(_) => {}
            Err(XMLError::ParserDuplicateElementDecl) => {
                if self.config.is_enable(ParserOption::Validation) {
                    // [VC: Unique Element Type Declaration]
                    validity_error!(
                        self,
                        ParserDuplicateElementDecl,
                        "The element type '{}' is declared more than once.",
                        name
                    );
                }
            }
            Err(err) => return Err(err),
        }
        Ok(())
    }

    /// ```text
    /// [51] Mixed ::= '(' S? '#PCDATA' (S? '|' S? Name)* S? ')*'
    ///              | '(' S? '#PCDATA' S? ')'          [VC: Proper Group/PE Nesting]
    ///                                                 [VC: No Duplicate Types]
    /// ```
    ///
    /// The leading `'('` has already been read.
    fn parse_mixed(&mut self, name: &str, group_depth: usize) -> Result<ContentSpec, XMLError> {
        // skip '#PCDATA'
        self.advance(7)?;
        self.skip_whitespaces_in_decl()?;
        let mut names: Vec<Arc<str>> = vec![];
        let mut buffer = String::new();
        while self.next_char_if(|c| c == '|')?.is_some() {
            self.skip_whitespaces_in_decl()?;
            buffer.clear();
            self.parse_element_type_name(&mut buffer)?;
            if names.iter().any(|n| n.as_ref() == buffer) {
                if self.config.is_enable(ParserOption::Validation) {
                    // [VC: No Duplicate Types]
                    validity_error!(
                        self,
                        ParserDuplicateMixedContent,
                        "'{}' is duplicated as a mixed content of element '{}'.",
                        buffer,
                        name
                    );
                }
            } else {
                names.push(buffer.as_str().into());
            }
            self.skip_whitespaces_in_decl()?;
        }

        self.check_group_nesting(group_depth);
        if self.starts_with(")*")? {
            self.advance(2)?;
        } else if self.starts_with(")")? {
            if !names.is_empty() {
                fatal_error!(
                    self,
                    ParserInvalidElementDecl,
                    "Mixed content with element types must end with ')*'."
                );
                return Err(XMLError::ParserInvalidElementDecl);
            }
            self.advance(1)?;
        } else {
            fatal_error!(
                self,
                ParserInvalidElementDecl,
                "Mixed content is not closed correctly."
            );
            return Err(XMLError::ParserInvalidElementDecl);
        }
        Ok(ContentSpec::Mixed(names))
    }

    /// ```text
    /// [47] children ::= (choice | seq) ('?' | '*' | '+')?
    /// [48] cp       ::= (Name | choice | seq) ('?' | '*' | '+')?
    /// [49] choice   ::= '(' S? cp ( S? '|' S? cp )+ S? ')'	[VC: Proper Group/PE Nesting]
    /// [50] seq      ::= '(' S? cp ( S? ',' S? cp )* S? ')' [VC: Proper Group/PE Nesting]
    /// ```
    ///
    /// The leading `'('` has already been read. The occurrence indicator is not read.
    fn parse_choice_or_seq(&mut self, group_depth: usize) -> Result<ContentParticle, XMLError> {
        self.skip_whitespaces_in_decl()?;
        let mut children = vec![self.parse_cp()?];
        let mut separator = None;
        loop {
            self.skip_whitespaces_in_decl()?;
            match self.peek_char()? {
                Some(')') => break,
                Some(c @ ('|' | ',')) => {
                    if separator.is_some_and(|sep| sep != c) {
                        fatal_error!(
                            self,
                            ParserInvalidElementDecl,
                            "'|' and ',' must not be mixed in one group."
                        );
                        return Err(XMLError::ParserInvalidElementDecl);
                    }
                    separator = Some(c);
                    self.advance(1)?;
                    self.skip_whitespaces_in_decl()?;
                    children.push(self.parse_cp()?);
                }
                _ => {
                    fatal_error!(
                        self,
                        ParserInvalidElementDecl,
                        "Element content is not closed correctly."
                    );
                    return Err(XMLError::ParserInvalidElementDecl);
                }
            }
        }
        self.check_group_nesting(group_depth);
        // skip ')'
        self.advance(1)?;

        Ok(match separator {
            Some('|') => ContentParticle::Choice(children),
            _ => ContentParticle::Sequence(children),
        })
    }

    fn parse_cp(&mut self) -> Result<ContentParticle, XMLError> {
        let particle = if self.starts_with("(")? {
            let group_depth = self.entity_stack.len();
            self.advance(1)?;
            self.parse_choice_or_seq(group_depth)?
        } else {
            let mut name = String::new();
            self.parse_element_type_name(&mut name)?;
            ContentParticle::leaf(None, &name)
        };
        self.parse_occurrence(particle)
    }

    fn parse_occurrence(&mut self, particle: ContentParticle) -> Result<ContentParticle, XMLError> {
        Ok(match self.next_char_if(|c| matches!(c, '?' | '*' | '+'))? {
            Some('?') => particle.optional(),
            Some('*') => particle.zero_or_more(),
            Some('+') => particle.one_or_more(),
            _ => particle,
        })
    }

    fn check_group_nesting(&mut self, group_depth: usize) {
        if self.entity_stack.len() != group_depth
            && self.config.is_enable(ParserOption::Validation)
        {
            // [VC: Proper Group/PE Nesting]
            validity_error!(
                self,
                ParserEntityIncorrectNesting,
                "A parameter entity in an element declaration is nested incorrectly."
            );
        }
    }

    /// XML 1.0 requires content models to be deterministic.
    fn check_ambiguity(&mut self, name: &str, particle: &ContentParticle) {
        let result = ContentModel::build(particle)
            .and_then(|model| model.check_unique_particle_attribution());
        if let Err(err) = result {
            error!(
                self,
                ParserAmbiguousElementContentModel,
                "The content model of element '{}' is not deterministic: {}",
                name,
                err
            );
        }
    }
}
