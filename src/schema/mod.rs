//! Reading XML Schema documents into [`SchemaGrammar`]s.
//!
//! A schema document is first read into a [`Document`] by a non-validating reader.
//! Its top-level components are then indexed by name, so that references can be
//! resolved in any order, and each component is built the first time it is needed.
//!
//! `xs:include`d documents contribute to the same grammar. `xs:import`ed namespaces
//! are loaded into grammars of their own and registered with the
//! [`GrammarResolver`].
//!
//! Errors in schema documents are kept with the system id and position of the
//! offending element, see [`SchemaLoader::take_diagnostics`].
//!
//! # Example
//! ```
//! use strictxml::{environment::ParserEnvironment, grammar::GrammarResolver, schema::SchemaLoader};
//!
//! let mut resolver = GrammarResolver::new(None, ParserEnvironment::new());
//! let grammar = SchemaLoader::new(&mut resolver)
//!     .load_str(
//!         r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:greeting">
//!             <xs:element name="hello" type="xs:string"/>
//!         </xs:schema>"#,
//!         None,
//!     )
//!     .unwrap();
//! let schema = grammar.as_schema().unwrap();
//! assert_eq!(schema.target_namespace(), Some("urn:greeting"));
//! assert_eq!(schema.global_elements().count(), 1);
//! ```

mod complex;
mod simple;

use std::{cell::RefCell, sync::Arc};

use crate::{
    FastHashMap, FastHashSet, XML_SCHEMA_NAMESPACE, XML_XML_NAMESPACE, XMLVersion,
    datatype::{DerivationSet, TypeName},
    dom::{DOMBuilder, Document, NodeId},
    error::{XMLError, XMLErrorLevel},
    grammar::{
        Grammar, GrammarKey, GrammarResolver, SchemaGrammar,
        schema::{ComplexType, Scope, TypeDefinition},
    },
    sax::{
        error::SAXParseError, handler::ErrorCollector, parser::XMLReaderBuilder,
        source::InputSource,
    },
    split_qname,
    util::resolve_system_id,
    validation::content_model::ElementName,
};

/// Substitution group chains longer than this are treated as circular.
const MAX_SUBSTITUTION_DEPTH: usize = 64;

/// Reads schema documents into grammars.
pub struct SchemaLoader<'a> {
    resolver: &'a mut GrammarResolver,
    /// Namespaces whose loading is in progress, to stop circular imports.
    loading: Vec<GrammarKey>,
    diagnostics: Vec<SAXParseError>,
}

impl<'a> SchemaLoader<'a> {
    pub fn new(resolver: &'a mut GrammarResolver) -> Self {
        Self {
            resolver,
            loading: vec![],
            diagnostics: vec![],
        }
    }

    /// Errors found in the schema documents read so far.
    pub fn diagnostics(&self) -> &[SAXParseError] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<SAXParseError> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Read the schema document `source` and everything it includes.
    ///
    /// The returned grammar is validated and frozen. It is not registered with the
    /// resolver; only the grammars of imported namespaces are.
    pub fn load(&mut self, source: InputSource) -> Result<Arc<Grammar>, XMLError> {
        let environment = self.resolver.environment().clone();
        let document = SchemaDocument::read(source, None, &mut self.diagnostics)?;
        let key = GrammarKey::schema(document.target_namespace.as_deref());
        if self.loading.contains(&key) {
            let error = XMLError::SchemaCircularDefinition;
            let message = format!("{key} is imported while it is loaded");
            self.diagnostics
                .push(document.diagnostic(document.root, &error, message));
            return Err(error);
        }
        log::debug!(
            "load schema {key} from '{}'",
            document.system_id.as_deref().unwrap_or("[memory]")
        );

        let grammar = SchemaGrammar::new(
            document.target_namespace.as_deref(),
            &environment.builtin_types(),
        );
        let mut loading = self.loading.clone();
        loading.push(key);
        let builder = SchemaBuilder::new(self.resolver, loading, grammar);
        let (built, diagnostics) = builder.build(document);
        self.diagnostics.extend(diagnostics);
        let mut grammar = built?;
        grammar.set_validated();
        grammar.prebuild_content_models();
        Ok(Arc::new(Grammar::from(grammar)))
    }

    pub fn load_str(
        &mut self,
        content: &str,
        system_id: Option<&str>,
    ) -> Result<Arc<Grammar>, XMLError> {
        let mut source = InputSource::from_content(content);
        if let Some(system_id) = system_id {
            source.set_system_id(system_id);
        }
        self.load(source)
    }
}

/// A parsed schema document together with the defaults of its `xs:schema` element.
struct SchemaDocument {
    document: Document,
    root: NodeId,
    system_id: Option<Arc<str>>,
    target_namespace: Option<Arc<str>>,
    element_qualified: bool,
    attribute_qualified: bool,
    block_default: DerivationSet,
    final_default: DerivationSet,
}

impl SchemaDocument {
    /// Read a schema document. If `chameleon` is given, a document without a target
    /// namespace takes it over.
    ///
    /// Errors of the document are appended to `diagnostics`.
    fn read(
        source: InputSource,
        chameleon: Option<&str>,
        diagnostics: &mut Vec<SAXParseError>,
    ) -> Result<Self, XMLError> {
        let system_id = source.system_id().cloned();
        let mut reader = XMLReaderBuilder::new()
            .set_handler(DOMBuilder::with_handler(ErrorCollector::new()))
            .build();
        let scanned = reader.scan_document(source);
        let builder = reader.into_handler();
        let errors = builder
            .handler()
            .iter()
            .filter(|error| error.level != XMLErrorLevel::Warning)
            .map(|error| SAXParseError {
                level: XMLErrorLevel::Error,
                ..error.clone()
            })
            .collect::<Vec<_>>();
        if let Some(error) = errors.first() {
            log::warn!("the schema document is not well-formed: {error}");
            diagnostics.extend(errors);
            return Err(XMLError::SchemaLoadFailure);
        }
        scanned?;
        let document = builder.into_document();
        let root = document
            .document_element()
            .ok_or(XMLError::SchemaLoadFailure)?;
        let element = document.as_element(root)?;
        if element.namespace_uri() != Some(XML_SCHEMA_NAMESPACE)
            || element.local_name() != Some("schema")
        {
            let error = XMLError::SchemaUnexpectedElement;
            let message = format!("the document element '{}' is not 'xs:schema'", element.qname());
            log::warn!("{message}");
            let mut located = Self::diagnostic_at(&document, system_id.as_ref(), root, &error);
            located.message = message.into();
            diagnostics.push(located);
            return Err(error);
        }

        let attribute = |name: &str| document.get_attribute(root, name).ok().flatten();
        let target_namespace = attribute("targetNamespace")
            .filter(|ns| !ns.is_empty())
            .or(chameleon)
            .map(Arc::from);
        let element_qualified = attribute("elementFormDefault") == Some("qualified");
        let attribute_qualified = attribute("attributeFormDefault") == Some("qualified");
        let block_default = attribute("blockDefault")
            .map(|value| DerivationSet::parse(value).ok_or(XMLError::SchemaInvalidAttribute))
            .transpose()?
            .unwrap_or_default();
        let final_default = attribute("finalDefault")
            .map(|value| DerivationSet::parse(value).ok_or(XMLError::SchemaInvalidAttribute))
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            document,
            root,
            system_id,
            target_namespace,
            element_qualified,
            attribute_qualified,
            block_default,
            final_default,
        })
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.document.get_attribute(node, name).ok().flatten()
    }

    /// An error located at `node` of this document.
    fn diagnostic(&self, node: NodeId, error: &XMLError, message: String) -> SAXParseError {
        let mut ret = Self::diagnostic_at(&self.document, self.system_id.as_ref(), node, error);
        ret.message = message.into();
        ret
    }

    fn diagnostic_at(
        document: &Document,
        system_id: Option<&Arc<str>>,
        node: NodeId,
        error: &XMLError,
    ) -> SAXParseError {
        let (line, column) = document.position(node).unwrap_or_default();
        SAXParseError {
            error: error.clone(),
            domain: error.domain(),
            level: XMLErrorLevel::Error,
            line: line as i64,
            column: column as i64,
            system_id: system_id.cloned().unwrap_or_else(|| "".into()),
            public_id: None,
            message: error.to_string().into(),
        }
    }

    /// The schema elements among the children of `node`, without annotations.
    fn children(&self, node: NodeId) -> Vec<(NodeId, String)> {
        self.document
            .children(node)
            .unwrap_or_default()
            .iter()
            .filter_map(|&child| {
                let element = self.document.as_element(child).ok()?;
                if element.namespace_uri() != Some(XML_SCHEMA_NAMESPACE) {
                    return None;
                }
                let local_name = element.local_name()?;
                (local_name != "annotation").then(|| (child, local_name.to_owned()))
            })
            .collect()
    }

    /// Resolve `prefix` with the namespace declarations in scope at `node`.
    fn namespace_of(&self, node: NodeId, prefix: Option<&str>) -> Option<String> {
        if prefix == Some("xml") {
            return Some(XML_XML_NAMESPACE.to_owned());
        }
        let qname = prefix.map_or_else(|| "xmlns".to_owned(), |prefix| format!("xmlns:{prefix}"));
        let mut current = Some(node);
        while let Some(id) = current {
            if let Ok(Some(uri)) = self.document.get_attribute(id, &qname) {
                return (!uri.is_empty()).then(|| uri.to_owned());
            }
            current = self.document.parent(id).ok().flatten();
        }
        None
    }

    fn resolve_qname(&self, node: NodeId, qname: &str) -> Result<ElementName, XMLError> {
        let qname = qname.trim();
        if !XMLVersion::XML10.validate_qname(qname) {
            return Err(XMLError::SchemaInvalidAttribute);
        }
        let (prefix, local_name) = split_qname(qname);
        let uri = self.namespace_of(node, prefix);
        if prefix.is_some() && uri.is_none() {
            log::warn!("the prefix of '{qname}' is not bound");
            return Err(XMLError::SchemaUnresolvedReference);
        }
        Ok(ElementName::new(uri.as_deref(), local_name))
    }
}

/// A node of one of the documents that make up a grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct Component {
    doc: usize,
    node: NodeId,
}

/// Builds one [`SchemaGrammar`] from a schema document and its includes.
struct SchemaBuilder<'r> {
    resolver: &'r mut GrammarResolver,
    loading: Vec<GrammarKey>,
    grammar: SchemaGrammar,
    documents: Vec<SchemaDocument>,
    simple_types: FastHashMap<TypeName, Component>,
    complex_types: FastHashMap<TypeName, Component>,
    elements: FastHashMap<ElementName, Component>,
    attributes: FastHashMap<ElementName, Component>,
    attribute_groups: FastHashMap<ElementName, Component>,
    groups: FastHashMap<ElementName, Component>,
    /// Reserved complex types whose definition is not built yet.
    pending_complex: FastHashMap<usize, Component>,
    /// Named components under construction.
    building: FastHashSet<ElementName>,
    /// Complex types under construction.
    building_complex: FastHashSet<usize>,
    /// Elements whose type is taken from their substitution group head.
    inherit_type: Vec<usize>,
    /// The `xs:complexType` of each complex type built from these documents.
    complex_components: FastHashMap<usize, Component>,
    diagnostics: RefCell<Vec<SAXParseError>>,
}

impl<'r> SchemaBuilder<'r> {
    fn new(
        resolver: &'r mut GrammarResolver,
        loading: Vec<GrammarKey>,
        grammar: SchemaGrammar,
    ) -> Self {
        Self {
            resolver,
            loading,
            grammar,
            documents: vec![],
            simple_types: FastHashMap::default(),
            complex_types: FastHashMap::default(),
            elements: FastHashMap::default(),
            attributes: FastHashMap::default(),
            attribute_groups: FastHashMap::default(),
            groups: FastHashMap::default(),
            pending_complex: FastHashMap::default(),
            building: FastHashSet::default(),
            building_complex: FastHashSet::default(),
            inherit_type: vec![],
            complex_components: FastHashMap::default(),
            diagnostics: RefCell::new(vec![]),
        }
    }

    /// Build the grammar of `document`. The errors found on the way are returned
    /// whether or not the grammar could be built.
    fn build(
        mut self,
        document: SchemaDocument,
    ) -> (Result<SchemaGrammar, XMLError>, Vec<SAXParseError>) {
        let built = self.build_components(document);
        if let Err(err) = &built
            && self.diagnostics.get_mut().is_empty()
            && let Some(doc) = self.documents.first()
        {
            let diagnostic = doc.diagnostic(doc.root, err, format!("the schema is invalid: {err}"));
            self.diagnostics.get_mut().push(diagnostic);
        }
        let diagnostics = self.diagnostics.into_inner();
        (built.map(|()| self.grammar), diagnostics)
    }

    fn build_components(&mut self, document: SchemaDocument) -> Result<(), XMLError> {
        self.add_document(document)?;

        let mut pending = self.pending_complex.keys().copied().collect::<Vec<_>>();
        pending.sort_unstable();
        for index in pending {
            self.complete_complex_type(index)?;
        }
        for (name, _) in sorted(&self.simple_types) {
            self.simple_type_by_name(&name)?;
        }
        for (name, _) in sorted(&self.attributes) {
            self.global_attribute(&name)?;
        }
        for (name, _) in sorted(&self.attribute_groups) {
            self.attribute_group(&name)?;
        }
        for (_, comp) in sorted(&self.elements) {
            let decl = self.element_decl(comp, Scope::Global)?;
            for constraint in &decl.identity_constraints {
                self.grammar
                    .add_identity_constraint(constraint.clone())
                    .map_err(|err| self.fail(comp, err, "duplicate identity constraint"))?;
            }
            let inherits = decl.substitution_group.is_some() && !self.has_type(comp);
            let id = self.grammar.add_element_decl(decl)?;
            if inherits {
                self.inherit_type.push(id);
            }
        }
        self.resolve_substitution_types()?;
        self.check_content_models()
    }

    /// Record a schema error at `comp` and return `error`.
    fn fail(&self, comp: Component, error: XMLError, message: impl std::fmt::Display) -> XMLError {
        let doc = &self.documents[comp.doc];
        let name = doc
            .document
            .as_element(comp.node)
            .map(|element| element.qname().to_owned())
            .unwrap_or_default();
        log::warn!(
            "{} ({name}): {message}",
            doc.system_id.as_deref().unwrap_or("[memory]")
        );
        let diagnostic = doc.diagnostic(comp.node, &error, format!("{name}: {message}"));
        self.diagnostics.borrow_mut().push(diagnostic);
        error
    }

    fn doc(&self, comp: Component) -> &SchemaDocument {
        &self.documents[comp.doc]
    }

    fn attribute(&self, comp: Component, name: &str) -> Option<String> {
        self.doc(comp).attribute(comp.node, name).map(str::to_owned)
    }

    fn children(&self, comp: Component) -> Vec<(Component, String)> {
        self.doc(comp)
            .children(comp.node)
            .into_iter()
            .map(|(node, name)| (Component { doc: comp.doc, node }, name))
            .collect()
    }

    fn resolve_qname(&self, comp: Component, qname: &str) -> Result<ElementName, XMLError> {
        self.doc(comp)
            .resolve_qname(comp.node, qname)
            .map_err(|err| self.fail(comp, err, format_args!("the QName '{qname}' cannot be resolved")))
    }

    fn target_namespace(&self) -> Option<&str> {
        self.grammar.target_namespace()
    }

    /// The `name` attribute of a named component, qualified with the target namespace.
    fn component_name(&self, comp: Component) -> Result<ElementName, XMLError> {
        let name = self
            .attribute(comp, "name")
            .ok_or_else(|| self.fail(comp, XMLError::SchemaMissingAttribute, "'name' is missing"))?;
        if !XMLVersion::XML10.validate_ncname(&name) {
            return Err(self.fail(
                comp,
                XMLError::SchemaInvalidAttribute,
                format_args!("'{name}' is not an NCName"),
            ));
        }
        Ok(ElementName::new(self.target_namespace(), &name))
    }

    fn boolean_attribute(&self, comp: Component, name: &str) -> Result<bool, XMLError> {
        match self.attribute(comp, name).as_deref().map(str::trim) {
            None | Some("false" | "0") => Ok(false),
            Some("true" | "1") => Ok(true),
            Some(value) => Err(self.fail(
                comp,
                XMLError::SchemaInvalidAttribute,
                format_args!("'{value}' is not a boolean value of '{name}'"),
            )),
        }
    }

    /// Parse `block` or `final`, falling back to `default` and keeping only `allowed`.
    fn derivation_attribute(
        &self,
        comp: Component,
        name: &str,
        default: DerivationSet,
        allowed: DerivationSet,
    ) -> Result<DerivationSet, XMLError> {
        let set = match self.attribute(comp, name) {
            Some(value) => DerivationSet::parse(&value).ok_or_else(|| {
                self.fail(
                    comp,
                    XMLError::SchemaInvalidAttribute,
                    format_args!("'{value}' is not a valid value of '{name}'"),
                )
            })?,
            None => default,
        };
        Ok(set & allowed)
    }

    fn add_document(&mut self, document: SchemaDocument) -> Result<(), XMLError> {
        if let Some(system_id) = document.system_id.as_deref()
            && !self.grammar.add_location(system_id)
        {
            log::trace!("'{system_id}' is already included");
            return Ok(());
        }
        let doc = self.documents.len();
        let root = Component {
            doc,
            node: document.root,
        };
        self.documents.push(document);

        for (comp, local_name) in self.children(root) {
            match local_name.as_str() {
                "include" => self.include(comp)?,
                "import" => self.import(comp)?,
                "simpleType" => {
                    let name = self.component_name(comp)?;
                    self.register_type(comp, name, false)?;
                }
                "complexType" => {
                    let name = self.component_name(comp)?;
                    self.register_type(comp, name, true)?;
                }
                "element" => {
                    let name = self.component_name(comp)?;
                    register(&mut self.elements, name, comp)
                        .map_err(|err| self.fail(comp, err, "duplicate element declaration"))?;
                }
                "attribute" => {
                    let name = self.component_name(comp)?;
                    register(&mut self.attributes, name, comp)
                        .map_err(|err| self.fail(comp, err, "duplicate attribute declaration"))?;
                }
                "attributeGroup" => {
                    let name = self.component_name(comp)?;
                    register(&mut self.attribute_groups, name, comp)
                        .map_err(|err| self.fail(comp, err, "duplicate attribute group"))?;
                }
                "group" => {
                    let name = self.component_name(comp)?;
                    register(&mut self.groups, name, comp)
                        .map_err(|err| self.fail(comp, err, "duplicate model group"))?;
                }
                "notation" => {
                    log::trace!("notation '{}' is ignored", self.attribute(comp, "name").unwrap_or_default());
                }
                "redefine" => {
                    return Err(self.fail(
                        comp,
                        XMLError::SchemaUnexpectedElement,
                        "'xs:redefine' is not supported",
                    ));
                }
                other => {
                    return Err(self.fail(
                        comp,
                        XMLError::SchemaUnexpectedElement,
                        format_args!("'{other}' is not a top-level schema component"),
                    ));
                }
            }
        }
        Ok(())
    }

    fn register_type(&mut self, comp: Component, name: TypeName, complex: bool) -> Result<(), XMLError> {
        if self.simple_types.contains_key(&name) || self.complex_types.contains_key(&name) {
            return Err(self.fail(
                comp,
                XMLError::SchemaDuplicateDeclaration,
                format_args!("the type '{name}' is already defined"),
            ));
        }
        if complex {
            let index = self
                .grammar
                .add_complex_type(ComplexType::new(Some(name.clone())))?;
            self.pending_complex.insert(index, comp);
            self.complex_types.insert(name, comp);
        } else {
            self.simple_types.insert(name, comp);
        }
        Ok(())
    }

    fn location_source(&self, comp: Component, location: &str) -> Result<InputSource, XMLError> {
        let base = self.doc(comp).system_id.clone();
        let path = resolve_system_id(base.as_deref(), location);
        log::debug!("read schema document '{path}'");
        InputSource::from_path(&path)
            .map_err(|err| self.fail(comp, err, format_args!("'{path}' cannot be read")))
    }

    fn include(&mut self, comp: Component) -> Result<(), XMLError> {
        let location = self.attribute(comp, "schemaLocation").ok_or_else(|| {
            self.fail(comp, XMLError::SchemaMissingAttribute, "'schemaLocation' is missing")
        })?;
        let source = self.location_source(comp, &location)?;
        let target_namespace = self.target_namespace().map(str::to_owned);
        let included = SchemaDocument::read(
            source,
            target_namespace.as_deref(),
            self.diagnostics.get_mut(),
        )?;
        if included.target_namespace.as_deref() != target_namespace.as_deref() {
            return Err(self.fail(
                comp,
                XMLError::SchemaNamespaceMismatch,
                format_args!("'{location}' has a different target namespace"),
            ));
        }
        self.add_document(included)
    }

    fn import(&mut self, comp: Component) -> Result<(), XMLError> {
        let namespace = self.attribute(comp, "namespace").filter(|ns| !ns.is_empty());
        if namespace.as_deref() == self.target_namespace() {
            return Err(self.fail(
                comp,
                XMLError::SchemaInvalidAttribute,
                "a schema cannot import its own target namespace",
            ));
        }
        let key = GrammarKey::schema(namespace.as_deref());
        if self.loading.contains(&key) || self.resolver.get_grammar(&key).is_some() {
            return Ok(());
        }
        let Some(location) = self.attribute(comp, "schemaLocation") else {
            log::debug!("no location is given for the imported grammar {key}");
            return Ok(());
        };
        let source = self.location_source(comp, &location)?;
        let mut loader = SchemaLoader {
            resolver: &mut *self.resolver,
            loading: self.loading.clone(),
            diagnostics: vec![],
        };
        let loaded = loader.load(source);
        self.diagnostics.get_mut().append(&mut loader.diagnostics);
        let grammar = loaded?;
        if grammar.key() != key {
            return Err(self.fail(
                comp,
                XMLError::SchemaNamespaceMismatch,
                format_args!("'{location}' is not a schema for {key}"),
            ));
        }
        self.resolver.put_grammar(grammar);
        Ok(())
    }

    /// The schema grammar of another namespace, if it is known.
    fn foreign_grammar(&mut self, namespace: Option<&str>) -> Option<Arc<Grammar>> {
        self.resolver
            .get_grammar(&GrammarKey::schema(namespace))
            .filter(|grammar| grammar.as_schema().is_some())
    }

    /// Check if the element declaration `comp` names or contains its type.
    fn has_type(&self, comp: Component) -> bool {
        self.attribute(comp, "type").is_some()
            || self
                .children(comp)
                .iter()
                .any(|(_, name)| name == "simpleType" || name == "complexType")
    }

    /// The type of the global element `head`, in this grammar or an imported one.
    fn head_type(&mut self, head: &ElementName) -> Option<TypeDefinition> {
        if head.namespace() == self.target_namespace() {
            return self
                .grammar
                .global_element(head)
                .map(|decl| decl.type_definition.clone());
        }
        let grammar = self.foreign_grammar(head.namespace())?;
        grammar
            .as_schema()?
            .global_element(head)
            .map(|decl| decl.type_definition.clone())
    }

    /// Give elements declared without a type the type of their substitution group head.
    fn resolve_substitution_types(&mut self) -> Result<(), XMLError> {
        let mut pending = std::mem::take(&mut self.inherit_type);
        for _ in 0..MAX_SUBSTITUTION_DEPTH {
            if pending.is_empty() {
                return Ok(());
            }
            let mut deferred = vec![];
            for &id in &pending {
                let Some(decl) = self.grammar.elem_decl(id) else {
                    continue;
                };
                let Some(head) = decl.substitution_group.clone() else {
                    continue;
                };
                if decl.name == head {
                    log::warn!("'{head}' is the head of its own substitution group");
                    return Err(XMLError::SchemaCircularDefinition);
                }
                // the head inherits its type as well
                if pending.iter().any(|&other| {
                    self.grammar
                        .elem_decl(other)
                        .is_some_and(|decl| decl.name == head)
                }) {
                    deferred.push(id);
                    continue;
                }
                let Some(type_definition) = self.head_type(&head) else {
                    log::warn!("the substitution group head '{head}' is not declared");
                    return Err(XMLError::SchemaUnresolvedReference);
                };
                if let Some(decl) = self.grammar.elem_decl_mut(id) {
                    decl.type_definition = type_definition;
                }
            }
            if deferred.len() == pending.len() {
                break;
            }
            pending = deferred;
        }
        log::warn!("substitution groups are circular");
        Err(XMLError::SchemaCircularDefinition)
    }

    /// Build every content model, reporting occurrence and ambiguity errors now rather
    /// than while documents are validated.
    fn check_content_models(&self) -> Result<(), XMLError> {
        for (index, complex_type) in self.grammar.complex_types().enumerate() {
            let checked = complex_type
                .content_model()
                .and_then(|model| model.check_unique_particle_attribution());
            let Err(err) = checked else {
                continue;
            };
            let name = complex_type
                .name
                .as_ref()
                .map(|name| name.to_string())
                .unwrap_or_else(|| "(anonymous)".to_owned());
            let message = format!("the content model of '{name}' is invalid: {err}");
            let error = content_model_error(err);
            return Err(match self.complex_components.get(&index) {
                Some(&comp) => self.fail(comp, error, message),
                None => {
                    log::warn!("{message}");
                    error
                }
            });
        }
        Ok(())
    }
}

fn content_model_error(err: crate::validation::content_model::ContentModelError) -> XMLError {
    use crate::validation::content_model::ContentModelError::*;

    match err {
        TooLargeOccurrence { .. } | InvalidOccurrence { .. } => XMLError::SchemaInvalidOccurrence,
        Ambiguous { .. } => XMLError::SchemaAmbiguousContentModel,
        other => XMLError::ContentModel(other),
    }
}

fn register(
    table: &mut FastHashMap<ElementName, Component>,
    name: ElementName,
    comp: Component,
) -> Result<(), XMLError> {
    if table.contains_key(&name) {
        return Err(XMLError::SchemaDuplicateDeclaration);
    }
    table.insert(name, comp);
    Ok(())
}

/// The entries of `table` in document order.
fn sorted(table: &FastHashMap<ElementName, Component>) -> Vec<(ElementName, Component)> {
    let mut entries = table
        .iter()
        .map(|(name, &comp)| (name.clone(), comp))
        .collect::<Vec<_>>();
    entries.sort_by_key(|&(_, comp)| comp);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        environment::ParserEnvironment,
        grammar::schema::ContentType,
        sax::parser::{ParserOption, XMLReader},
    };

    const LIBRARY: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           xmlns:lib="urn:library" targetNamespace="urn:library" elementFormDefault="qualified">
  <xs:simpleType name="isbn">
    <xs:restriction base="xs:string">
      <xs:minLength value="3"/>
      <xs:maxLength value="13"/>
    </xs:restriction>
  </xs:simpleType>
  <xs:complexType name="item">
    <xs:sequence>
      <xs:element name="title" type="xs:string"/>
    </xs:sequence>
    <xs:attribute name="id" type="xs:ID" use="required"/>
  </xs:complexType>
  <xs:complexType name="book">
    <xs:complexContent>
      <xs:extension base="lib:item">
        <xs:sequence>
          <xs:element name="isbn" type="lib:isbn"/>
        </xs:sequence>
        <xs:attribute name="lang" type="xs:language" default="en"/>
      </xs:extension>
    </xs:complexContent>
  </xs:complexType>
  <xs:element name="library">
    <xs:complexType>
      <xs:sequence>
        <xs:element ref="lib:entry" maxOccurs="unbounded"/>
      </xs:sequence>
    </xs:complexType>
    <xs:key name="isbn-key">
      <xs:selector xpath="lib:book"/>
      <xs:field xpath="lib:isbn"/>
    </xs:key>
  </xs:element>
  <xs:element name="entry" type="lib:item" abstract="true"/>
  <xs:element name="book" substitutionGroup="lib:entry" type="lib:book"/>
  <xs:element name="magazine" substitutionGroup="lib:entry"/>
</xs:schema>"#;

    fn load(schema: &str) -> Result<Arc<Grammar>, XMLError> {
        let mut resolver = GrammarResolver::new(None, ParserEnvironment::new());
        SchemaLoader::new(&mut resolver).load_str(schema, None)
    }

    fn reader(grammar: Arc<Grammar>) -> XMLReader<ErrorCollector> {
        XMLReaderBuilder::new()
            .set_handler(ErrorCollector::new())
            .set_option(ParserOption::SchemaValidation, true)
            .set_option(ParserOption::IdentityConstraintChecking, true)
            .add_grammar(grammar)
            .build()
    }

    fn errors(grammar: &Arc<Grammar>, document: &str) -> Vec<XMLError> {
        let mut reader = reader(grammar.clone());
        reader.parse_str(document, None).ok();
        let handler = reader.into_handler();
        handler
            .fatal_errors
            .iter()
            .chain(&handler.errors)
            .map(|error| error.error.clone())
            .collect()
    }

    #[test]
    fn component_tests() {
        let grammar = load(LIBRARY).unwrap();
        let schema = grammar.as_schema().unwrap();
        assert_eq!(schema.global_elements().count(), 4);

        let isbn = schema
            .datatypes()
            .get_by_name(Some("urn:library"), "isbn")
            .unwrap();
        assert!(isbn.validate("978", &crate::datatype::NoContext).is_ok());
        assert!(isbn.validate("97", &crate::datatype::NoContext).is_err());

        let book = schema
            .complex_type_index(&TypeName::new(Some("urn:library"), "book"))
            .and_then(|index| schema.complex_type(index))
            .unwrap();
        assert!(matches!(book.content, ContentType::ElementOnly(_)));
        let names = book
            .attributes
            .iter()
            .map(|att| att.name.local_name.as_ref())
            .collect::<Vec<_>>();
        assert_eq!(names, ["id", "lang"]);

        // the type of a member without its own type comes from the head
        let magazine = schema
            .global_element(&ElementName::new(Some("urn:library"), "magazine"))
            .unwrap();
        assert!(matches!(magazine.type_definition, TypeDefinition::Complex(_)));
        assert!(
            schema
                .get_identity_constraint(&ElementName::new(Some("urn:library"), "isbn-key"))
                .is_some()
        );
    }

    #[test]
    fn validation_tests() {
        let grammar = load(LIBRARY).unwrap();
        let valid = r#"<library xmlns="urn:library">
  <book id="b1"><title>First</title><isbn>111-1</isbn></book>
  <book id="b2" lang="ja"><title>Second</title><isbn>222-2</isbn></book>
</library>"#;
        assert!(errors(&grammar, valid).is_empty());

        // the head is abstract
        let abstract_head = r#"<library xmlns="urn:library"><entry id="e"><title/></entry></library>"#;
        assert!(errors(&grammar, abstract_head).iter().any(|err| matches!(err, XMLError::SchemaValidAbstract)));

        // 'isbn' is missing
        let incomplete = r#"<library xmlns="urn:library"><book id="b"><title/></book></library>"#;
        assert!(errors(&grammar, incomplete).iter().any(|err| matches!(err, XMLError::SchemaValidContentModel)));

        let duplicate = r#"<library xmlns="urn:library">
  <book id="b1"><title/><isbn>111</isbn></book>
  <book id="b2"><title/><isbn>111</isbn></book>
</library>"#;
        assert!(errors(&grammar, duplicate).iter().any(|err| matches!(err, XMLError::IdentityConstraintDuplicateKey)));
    }

    #[test]
    fn derivation_tests() {
        let schema = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:complexType name="base" final="extension">
    <xs:sequence><xs:element name="a"/></xs:sequence>
  </xs:complexType>
  <xs:complexType name="derived">
    <xs:complexContent>
      <xs:extension base="base"/>
    </xs:complexContent>
  </xs:complexType>
</xs:schema>"#;
        assert!(matches!(load(schema), Err(XMLError::SchemaFinalDerivation)));

        let schema = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:complexType name="price">
    <xs:simpleContent>
      <xs:extension base="xs:decimal">
        <xs:attribute name="currency" type="xs:string" fixed="EUR"/>
      </xs:extension>
    </xs:simpleContent>
  </xs:complexType>
  <xs:complexType name="small-price">
    <xs:simpleContent>
      <xs:restriction base="price">
        <xs:maxInclusive value="10"/>
      </xs:restriction>
    </xs:simpleContent>
  </xs:complexType>
  <xs:element name="price" type="small-price"/>
</xs:schema>"#;
        let grammar = load(schema).unwrap();
        assert!(errors(&grammar, "<price>9.5</price>").is_empty());
        assert!(
            errors(&grammar, "<price>10.5</price>").iter().any(|err| matches!(err, XMLError::SchemaValidElementValue))
        );
        assert!(
            errors(&grammar, r#"<price currency="JPY">1</price>"#)
                .iter().any(|err| matches!(err, XMLError::SchemaValidFixedValue))
        );
    }

    #[test]
    fn model_group_tests() {
        let schema = r###"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:group name="name">
    <xs:sequence>
      <xs:element name="first" type="xs:string"/>
      <xs:element name="last" type="xs:string"/>
    </xs:sequence>
  </xs:group>
  <xs:attributeGroup name="common">
    <xs:attribute name="id" type="xs:ID"/>
    <xs:anyAttribute namespace="##other" processContents="skip"/>
  </xs:attributeGroup>
  <xs:element name="person">
    <xs:complexType>
      <xs:all>
        <xs:element name="age" type="xs:int" minOccurs="0"/>
        <xs:element name="email" type="xs:string"/>
      </xs:all>
      <xs:attributeGroup ref="common"/>
    </xs:complexType>
  </xs:element>
  <xs:element name="contact">
    <xs:complexType>
      <xs:group ref="name"/>
    </xs:complexType>
  </xs:element>
</xs:schema>"###;
        let grammar = load(schema).unwrap();
        let schema_grammar = grammar.as_schema().unwrap();
        assert!(schema_grammar.get_model_group(&ElementName::new(None, "name")).is_some());
        assert!(
            schema_grammar
                .get_attribute_group(&ElementName::new(None, "common"))
                .is_some()
        );

        assert!(errors(&grammar, "<person><email>a@b</email><age>3</age></person>").is_empty());
        assert!(errors(
                &grammar,
                r#"<person xmlns:x="urn:x" x:note="n" id="p"><email>a@b</email></person>"#
            ).is_empty());
        assert!(
            errors(&grammar, "<person><age>3</age></person>")
                .iter().any(|err| matches!(err, XMLError::SchemaValidContentModel))
        );
        assert!(errors(&grammar, "<contact><first>A</first><last>B</last></contact>").is_empty());
    }

    #[test]
    fn schema_error_tests() {
        let unresolved = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="a" type="missing"/>
</xs:schema>"#;
        assert!(matches!(load(unresolved), Err(XMLError::SchemaUnresolvedReference)));

        let duplicate = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="a"/>
  <xs:element name="a"/>
</xs:schema>"#;
        assert!(matches!(load(duplicate), Err(XMLError::SchemaDuplicateDeclaration)));

        let ambiguous = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:complexType name="t">
    <xs:sequence>
      <xs:element name="a" minOccurs="0"/>
      <xs:element name="a"/>
    </xs:sequence>
  </xs:complexType>
</xs:schema>"#;
        assert!(matches!(load(ambiguous), Err(XMLError::SchemaAmbiguousContentModel)));

        let occurrence = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:complexType name="t">
    <xs:sequence>
      <xs:element name="a" minOccurs="2" maxOccurs="1"/>
    </xs:sequence>
  </xs:complexType>
</xs:schema>"#;
        assert!(matches!(load(occurrence), Err(XMLError::SchemaInvalidOccurrence)));

        let circular = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:simpleType name="a"><xs:restriction base="b"/></xs:simpleType>
  <xs:simpleType name="b"><xs:restriction base="a"/></xs:simpleType>
</xs:schema>"#;
        assert!(matches!(load(circular), Err(XMLError::SchemaCircularDefinition)));

        assert!(matches!(
            load("<schema/>"),
            Err(XMLError::SchemaUnexpectedElement)
        ));
        assert!(matches!(
            load(r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"><xs:element name="a""#),
            Err(_)
        ));
    }

    #[test]
    fn diagnostics_tests() {
        let mut resolver = GrammarResolver::new(None, ParserEnvironment::new());
        let mut loader = SchemaLoader::new(&mut resolver);
        let occurrence = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:complexType name="t">
    <xs:sequence>
      <xs:element name="a" minOccurs="2" maxOccurs="1"/>
    </xs:sequence>
  </xs:complexType>
</xs:schema>"#;
        assert!(loader.load_str(occurrence, Some("t.xsd")).is_err());
        let diagnostic = loader
            .diagnostics()
            .iter()
            .find(|diagnostic| diagnostic.error == XMLError::SchemaInvalidOccurrence)
            .unwrap();
        assert_eq!(&*diagnostic.system_id, "t.xsd");
        assert!((2..=4).contains(&diagnostic.line));
        assert_eq!(diagnostic.level, XMLErrorLevel::Error);

        // not well-formed
        let diagnostics = loader.take_diagnostics();
        assert!(!diagnostics.is_empty());
        assert!(loader.diagnostics().is_empty());
        assert!(loader.load_str("<xs:schema", None).is_err());
        assert!(!loader.diagnostics().is_empty());

        let diagnostics = loader.take_diagnostics();
        assert!(loader.load_str("<schema/>", None).is_err());
        assert_eq!(loader.diagnostics().len(), 1);
        assert_eq!(loader.diagnostics()[0].error, XMLError::SchemaUnexpectedElement);
        assert!(diagnostics.iter().all(|diagnostic| diagnostic.line >= 1));
    }
}
