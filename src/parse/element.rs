use std::sync::Arc;

use crate::{
    XML_NS_NAMESPACE, XML_SCHEMA_INSTANCE_NAMESPACE, XML_XML_NAMESPACE,
    error::XMLError,
    grammar::{Grammar, GrammarKey, dtd::ContentSpec},
    parse::{DocumentContext, NamespaceBinding, OpenElement, lookup_namespace},
    sax::{
        attributes::Attribute,
        error::{fatal_error, ns_error, validity_error, warning},
        handler::SAXHandler,
        parser::{ParserOption, XMLReader},
    },
    split_qname,
    util::{collapse_whitespace, resolve_system_id},
    validation::content_model::ElementName,
};

impl<H: SAXHandler> XMLReader<H> {
    /// ```text
    /// [40] STag         ::= '<' Name (S Attribute)* S? '>'
    /// [44] EmptyElemTag ::= '<' Name (S Attribute)* S? '/>'
    /// ```
    pub(crate) fn parse_start_tag(&mut self) -> Result<(), XMLError> {
        if !self.starts_with("<")? {
            fatal_error!(
                self,
                ParserInvalidStartOrEmptyTag,
                "The start tag does not start with '<'."
            );
            return Err(XMLError::ParserInvalidStartOrEmptyTag);
        }
        // skip '<'
        self.advance(1)?;
        let mut name = String::new();
        self.parse_element_type_name(&mut name)?;

        self.attributes.clear();
        let empty = loop {
            let s = self.skip_whitespaces()?;
            if self.starts_with("/>")? {
                self.advance(2)?;
                break true;
            }
            if self.starts_with(">")? {
                self.advance(1)?;
                break false;
            }
            if self.peek_char()?.is_none() {
                fatal_error!(
                    self,
                    ParserUnexpectedEOF,
                    "The start tag of '{}' is not closed.",
                    name
                );
                return Err(XMLError::ParserUnexpectedEOF);
            }
            if s == 0 {
                fatal_error!(
                    self,
                    ParserInvalidStartOrEmptyTag,
                    "Whitespaces are required before attributes."
                );
                return Err(XMLError::ParserInvalidStartOrEmptyTag);
            }
            self.parse_attribute()?;
        };

        let (element_only, external_element_content) = self.apply_dtd_attributes(&name);

        let ns_depth = self.namespaces.len();
        let (uri, local_name) = if self.config.is_enable(ParserOption::Namespaces) {
            self.process_namespaces(&name)
        } else {
            (None, None)
        };

        if self.element_stack.is_empty()
            && self.config.is_enable(ParserOption::Validation)
            && !self.config.is_enable(ParserOption::SchemaValidation)
            && self.dtd.is_none()
        {
            validity_error!(
                self,
                ParserDoctypeDeclNotFound,
                "Validation is requested, but the document has no document type declaration."
            );
        }

        let namespaces_enabled = self.config.is_enable(ParserOption::Namespaces);
        if self.validates_with_dtd() {
            let ctx = DocumentContext::new(
                &self.namespaces,
                self.dtd.as_deref().and_then(Grammar::as_dtd),
                namespaces_enabled,
            );
            if self.element_stack.is_empty()
                && let Some(dtd) = self.dtd.clone()
            {
                let root = self.dtd_name.clone();
                self.dtd_validator.start_document(dtd, &root);
            }
            let violations = self.dtd_validator.start_element(
                &name,
                &self.attributes,
                &ctx,
            );
            self.report_violations(violations);
        }
        if self.validates_with_schema() {
            self.load_schema_hints();
            let element = ElementName::new(uri.as_deref(), local_name.as_deref().unwrap_or(&name));
            let ctx = DocumentContext::new(
                &self.namespaces,
                self.dtd.as_deref().and_then(Grammar::as_dtd),
                namespaces_enabled,
            );
            let violations = self.schema_validator.start_element(
                &self.resolver,
                &element,
                &mut self.attributes,
                &ctx,
                self.config
                    .is_enable(ParserOption::IdentityConstraintChecking),
            );
            self.report_violations(violations);
        }

        if !self.fatal_error_occurred {
            self.handler.start_element(
                uri.as_deref(),
                local_name.as_deref(),
                &name,
                &self.attributes,
            );
        }
        self.element_stack.push(OpenElement {
            qname: name.into(),
            uri,
            local_name,
            ns_depth,
            element_only,
            external_element_content,
            entity_depth: self.entity_stack.len(),
        });

        if empty {
            self.end_element()?;
        }
        Ok(())
    }

    /// ```text
    /// [41] Attribute ::= Name Eq AttValue
    /// ```
    fn parse_attribute(&mut self) -> Result<(), XMLError> {
        let mut name = String::new();
        self.parse_element_type_name(&mut name)?;
        self.skip_whitespaces()?;
        if self.next_char_if(|c| c == '=')?.is_none() {
            fatal_error!(
                self,
                ParserInvalidStartOrEmptyTag,
                "'=' is not found after the attribute name '{}'.",
                name
            );
            return Err(XMLError::ParserInvalidStartOrEmptyTag);
        }
        self.skip_whitespaces()?;
        let mut value = String::new();
        self.parse_att_value(&mut value)?;

        let mut attribute = Attribute::new(name, value);
        attribute.set_specified();
        if let Err((attribute, _)) = self.attributes.push(attribute) {
            // [WFC: Unique Att Spec]
            fatal_error!(
                self,
                ParserDuplicateAttributes,
                "The attribute '{}' appears more than once in the same tag.",
                attribute.qname
            );
            return Err(XMLError::ParserDuplicateAttributes);
        }
        Ok(())
    }

    /// Normalize tokenized attributes and add default attributes declared in the DTD.
    ///
    /// Returns whether the element has element content, and whether that content is
    /// declared in external markup.
    fn apply_dtd_attributes(&mut self, name: &str) -> (bool, bool) {
        let Some(decl) = self.dtd().and_then(|dtd| dtd.get_elem_decl(name)) else {
            return (false, false);
        };
        let element_only = matches!(decl.content_spec(), Some(ContentSpec::Children(_)));
        let external = decl.has_external_element_content();
        let defs = decl.attributes().to_vec();

        let validation = self.config.is_enable(ParserOption::Validation);
        let standalone = self.standalone == Some(true);
        for def in defs {
            if let Some(index) = self.attributes.get_index_by_qname(&def.name) {
                let Some(attribute) = self.attributes.iter_mut().nth(index) else {
                    continue;
                };
                attribute.set_declared();
                if !def.att_type.is_tokenized() {
                    continue;
                }
                let normalized = collapse_whitespace(&attribute.value);
                if normalized == attribute.value.as_ref() {
                    continue;
                }
                let normalized = normalized.into_owned();
                self.attributes.set_value(index, normalized);
                if validation && standalone && def.in_external_markup {
                    // [VC: Standalone Document Declaration]
                    validity_error!(
                        self,
                        ParserInvalidStandaloneDocument,
                        "The value of '{}' is changed by normalization declared externally, but the document is standalone.",
                        def.name
                    );
                }
            } else if let Some(default) = def.default_decl.default_value() {
                let mut attribute = Attribute::new(def.name.clone(), default);
                attribute.set_declared();
                if self.attributes.push(attribute).is_err() {
                    continue;
                }
                if validation && standalone && def.in_external_markup {
                    // [VC: Standalone Document Declaration]
                    validity_error!(
                        self,
                        ParserInvalidStandaloneDocument,
                        "The default value of '{}' is declared externally, but the document is standalone.",
                        def.name
                    );
                }
            }
        }
        (element_only, external)
    }

    /// Bind the namespace declarations of the current start tag and expand the names of
    /// the element and its attributes.
    ///
    /// Returns the namespace name and the local name of the element.
    fn process_namespaces(&mut self, name: &str) -> (Option<Arc<str>>, Option<Arc<str>>) {
        let declarations = self
            .attributes
            .iter()
            .enumerate()
            .filter_map(|(index, att)| {
                let prefix = match att.qname.as_ref() {
                    "xmlns" => None,
                    qname => Some(qname.strip_prefix("xmlns:")?),
                };
                Some((index, prefix.map(Arc::<str>::from), att.value.as_ref().into()))
            })
            .collect::<Vec<(usize, Option<Arc<str>>, Arc<str>)>>();

        for (index, prefix, uri) in declarations {
            if let Some(att) = self.attributes.iter_mut().nth(index) {
                att.set_nsdecl();
            }
            let local_name: Arc<str> = prefix.clone().unwrap_or_else(|| "xmlns".into());
            if self
                .attributes
                .set_expanded_name(index, Some(XML_NS_NAMESPACE.into()), local_name)
                .is_err()
            {
                ns_error!(
                    self,
                    ParserDuplicateAttributes,
                    "The namespace declaration for '{}' appears more than once.",
                    prefix.as_deref().unwrap_or("xmlns")
                );
            }
            if !self.check_namespace_declaration(prefix.as_deref(), &uri) {
                continue;
            }
            if !self.fatal_error_occurred {
                self.handler.start_prefix_mapping(prefix.as_deref(), &uri);
            }
            self.namespaces.push(NamespaceBinding { prefix, uri });
        }

        let (prefix, local_name) = split_qname(name);
        let uri = lookup_namespace(&self.namespaces, prefix).map(Arc::<str>::from);
        if let Some(prefix) = prefix.filter(|_| uri.is_none()) {
            ns_error!(
                self,
                ParserUndefinedNamespace,
                "The namespace prefix '{}' of the element '{}' is not bound.",
                prefix,
                name
            );
        }

        let targets = self
            .attributes
            .iter()
            .enumerate()
            .filter(|(_, att)| !att.is_nsdecl())
            .map(|(index, att)| (index, att.qname.clone()))
            .collect::<Vec<_>>();
        for (index, qname) in targets {
            let (prefix, local) = split_qname(&qname);
            let att_uri = match prefix {
                // Unprefixed attributes are in no namespace.
                None => None,
                Some(prefix) => {
                    let uri = lookup_namespace(&self.namespaces, Some(prefix)).map(Arc::<str>::from);
                    if uri.is_none() {
                        ns_error!(
                            self,
                            ParserUndefinedNamespace,
                            "The namespace prefix '{}' of the attribute '{}' is not bound.",
                            prefix,
                            qname
                        );
                    }
                    uri
                }
            };
            if self
                .attributes
                .set_expanded_name(index, att_uri, local.into())
                .is_err()
            {
                // [NSC: Attributes Unique]
                ns_error!(
                    self,
                    ParserDuplicateAttributes,
                    "The attribute '{}' has the same expanded name as another attribute.",
                    qname
                );
            }
        }
        (uri, Some(local_name.into()))
    }

    /// Returns `false` if the declaration must not be bound.
    fn check_namespace_declaration(&mut self, prefix: Option<&str>, uri: &str) -> bool {
        match prefix {
            Some("xmlns") => {
                ns_error!(
                    self,
                    ParserUnacceptableNamespaceName,
                    "The prefix 'xmlns' must not be declared."
                );
                return false;
            }
            Some("xml") => {
                if uri != XML_XML_NAMESPACE {
                    ns_error!(
                        self,
                        ParserUnacceptableNamespaceName,
                        "The prefix 'xml' must be bound to '{}'.",
                        XML_XML_NAMESPACE
                    );
                }
                return false;
            }
            Some(prefix) if uri.is_empty() => {
                ns_error!(
                    self,
                    ParserUnacceptableNamespaceName,
                    "The prefix '{}' cannot be undeclared.",
                    prefix
                );
                return false;
            }
            _ => {}
        }
        if uri == XML_XML_NAMESPACE || uri == XML_NS_NAMESPACE {
            ns_error!(
                self,
                ParserUnacceptableNamespaceName,
                "The namespace name '{}' cannot be bound to any other prefix.",
                uri
            );
            return false;
        }
        true
    }

    /// Read the schemas named by `xsi:schemaLocation` and `xsi:noNamespaceSchemaLocation`
    /// of the current start tag, unless a grammar for the namespace is already known.
    fn load_schema_hints(&mut self) {
        let mut hints = vec![];
        if let Some(value) = self
            .attributes
            .get_value_by_expanded_name(Some(XML_SCHEMA_INSTANCE_NAMESPACE), "schemaLocation")
        {
            let mut tokens = value.split_ascii_whitespace();
            while let (Some(namespace), Some(location)) = (tokens.next(), tokens.next()) {
                hints.push((Some(namespace.to_owned()), location.to_owned()));
            }
        }
        if let Some(value) = self.attributes.get_value_by_expanded_name(
            Some(XML_SCHEMA_INSTANCE_NAMESPACE),
            "noNamespaceSchemaLocation",
        ) {
            hints.push((None, value.trim().to_owned()));
        }

        for (namespace, location) in hints {
            let key = GrammarKey::schema(namespace.as_deref());
            if self.resolver.get_grammar(&key).is_some() {
                continue;
            }
            let base_uri = self.base_uri();
            log::debug!(
                "load schema for '{}' from '{}'",
                namespace.as_deref().unwrap_or(""),
                resolve_system_id(base_uri.as_deref(), &location)
            );
            let mut errors = vec![];
            let loaded = self
                .open_external_entity("[schema]", None, base_uri.as_deref(), &location)
                .and_then(|source| {
                    let mut loader = crate::schema::SchemaLoader::new(&mut self.resolver);
                    let loaded = loader.load(source);
                    errors = loader.take_diagnostics();
                    loaded
                });
            self.report_grammar_errors(errors);
            match loaded {
                Ok(grammar) if grammar.key() != key => {
                    warning!(
                        self,
                        SchemaNamespaceMismatch,
                        "The schema '{}' is not for the namespace '{}'.",
                        location,
                        namespace.as_deref().unwrap_or("")
                    );
                }
                Ok(grammar) => {
                    self.resolver.put_grammar(grammar);
                }
                Err(err) => {
                    warning!(
                        self,
                        err,
                        "The schema '{}' cannot be loaded.",
                        location
                    );
                }
            }
        }
    }

    /// ```text
    /// [42] ETag ::= '</' Name S? '>'
    /// ```
    pub(crate) fn parse_end_tag(&mut self) -> Result<(), XMLError> {
        // skip '</'
        self.advance(2)?;
        let mut name = String::new();
        self.parse_element_type_name(&mut name)?;
        self.skip_whitespaces()?;
        if self.next_char_if(|c| c == '>')?.is_none() {
            fatal_error!(
                self,
                ParserInvalidEndTag,
                "The end tag '{}' is not closed with '>'.",
                name
            );
            return Err(XMLError::ParserInvalidEndTag);
        }

        let Some(elem) = self.element_stack.last() else {
            return Err(XMLError::InternalError);
        };
        if elem.qname.as_ref() != name {
            // [WFC: Element Type Match]
            let expected = elem.qname.clone();
            fatal_error!(
                self,
                ParserMismatchElementType,
                "The end tag '{}' does not match the start tag '{}'.",
                name,
                expected
            );
            return Err(XMLError::ParserMismatchElementType);
        }
        if elem.entity_depth != self.entity_stack.len() {
            fatal_error!(
                self,
                ParserEntityIncorrectNesting,
                "The element '{}' starts and ends in different entities.",
                name
            );
            return Err(XMLError::ParserEntityIncorrectNesting);
        }
        self.end_element()
    }

    fn end_element(&mut self) -> Result<(), XMLError> {
        if self.validates_with_dtd() {
            let violations = self.dtd_validator.end_element();
            self.report_violations(violations);
        }
        if self.validates_with_schema() {
            let ctx = DocumentContext::new(
                &self.namespaces,
                self.dtd.as_deref().and_then(Grammar::as_dtd),
                self.config.is_enable(ParserOption::Namespaces),
            );
            let (violations, default_text) = self.schema_validator.end_element(&self.resolver, &ctx);
            self.report_violations(violations);
            if let Some(text) = default_text
                && !self.fatal_error_occurred
            {
                self.handler.characters(&text);
            }
        }

        let Some(elem) = self.element_stack.pop() else {
            return Err(XMLError::InternalError);
        };
        if !self.fatal_error_occurred {
            self.handler
                .end_element(elem.uri.as_deref(), elem.local_name.as_deref(), &elem.qname);
        }
        let ns_depth = elem.ns_depth.min(self.namespaces.len());
        for binding in self.namespaces.drain(ns_depth..).rev() {
            if !self.fatal_error_occurred {
                self.handler.end_prefix_mapping(binding.prefix.as_deref());
            }
        }
        Ok(())
    }
}
