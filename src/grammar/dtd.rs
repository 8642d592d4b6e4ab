//! Document type definitions.

use std::sync::{Arc, LazyLock, OnceLock};

use crate::{
    FastHashMap,
    error::XMLError,
    grammar::{GrammarKey, GrammarState},
    validation::content_model::{ContentModel, ContentModelError, ContentParticle, ElementName},
};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum AttributeType {
    #[default]
    CDATA,
    ID,
    IDREF,
    IDREFS,
    ENTITY,
    ENTITIES,
    NMTOKEN,
    NMTOKENS,
    NOTATION(Vec<Box<str>>),
    Enumeration(Vec<Box<str>>),
}

impl AttributeType {
    /// Check if values of this type are tokenized, that is, whitespace-collapsed after
    /// the CDATA normalization.
    pub fn is_tokenized(&self) -> bool {
        !matches!(self, Self::CDATA)
    }
}

impl std::fmt::Display for AttributeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CDATA => write!(f, "CDATA"),
            Self::ID => write!(f, "ID"),
            Self::IDREF => write!(f, "IDREF"),
            Self::IDREFS => write!(f, "IDREFS"),
            Self::ENTITY => write!(f, "ENTITY"),
            Self::ENTITIES => write!(f, "ENTITIES"),
            Self::NMTOKEN => write!(f, "NMTOKEN"),
            Self::NMTOKENS => write!(f, "NMTOKENS"),
            Self::NOTATION(names) => write!(f, "NOTATION ({})", names.join("|")),
            Self::Enumeration(values) => write!(f, "({})", values.join("|")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DefaultDecl {
    REQUIRED,
    IMPLIED,
    FIXED(Box<str>),
    None(Box<str>),
}

impl DefaultDecl {
    /// The value supplied when the attribute is not specified.
    pub fn default_value(&self) -> Option<&str> {
        match self {
            Self::FIXED(value) | Self::None(value) => Some(value),
            _ => None,
        }
    }
}

impl std::fmt::Display for DefaultDecl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::REQUIRED => write!(f, "#REQUIRED"),
            Self::IMPLIED => write!(f, "#IMPLIED"),
            Self::FIXED(value) => write!(f, "#FIXED \"{value}\""),
            Self::None(value) => write!(f, "\"{value}\""),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContentSpec {
    EMPTY,
    ANY,
    Mixed(Vec<Arc<str>>),
    Children(ContentParticle),
}

impl std::fmt::Display for ContentSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EMPTY => write!(f, "EMPTY"),
            Self::ANY => write!(f, "ANY"),
            Self::Mixed(names) if names.is_empty() => write!(f, "(#PCDATA)"),
            Self::Mixed(names) => write!(f, "(#PCDATA|{})*", names.join("|")),
            Self::Children(particle) => write_particle(f, particle, true),
        }
    }
}

fn write_particle(
    f: &mut std::fmt::Formatter<'_>,
    particle: &ContentParticle,
    top: bool,
) -> std::fmt::Result {
    let group = |f: &mut std::fmt::Formatter<'_>, children: &[ContentParticle], sep: &str| {
        write!(f, "(")?;
        for (i, child) in children.iter().enumerate() {
            if i > 0 {
                write!(f, "{sep}")?;
            }
            write_particle(f, child, false)?;
        }
        write!(f, ")")
    };
    match particle {
        ContentParticle::Leaf(name) if top => write!(f, "({name})"),
        ContentParticle::Leaf(name) => write!(f, "{name}"),
        ContentParticle::Sequence(children) | ContentParticle::All(children) => {
            group(f, children, ",")
        }
        ContentParticle::Choice(children) => group(f, children, "|"),
        ContentParticle::Wildcard(_) => write!(f, "ANY"),
        ContentParticle::Repeat { particle, min, max } => {
            write_particle(f, particle, top)?;
            match (min, max) {
                (0, Some(1)) => write!(f, "?"),
                (0, None) => write!(f, "*"),
                (1, None) => write!(f, "+"),
                (min, Some(max)) => write!(f, "{{{min},{max}}}"),
                (min, None) => write!(f, "{{{min},}}"),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityDecl {
    InternalGeneralEntity {
        base_uri: Arc<str>,
        replacement_text: Box<str>,
        in_external_markup: bool,
    },
    InternalParameterEntity {
        base_uri: Arc<str>,
        replacement_text: Box<str>,
        in_external_markup: bool,
    },
    ExternalGeneralParsedEntity {
        base_uri: Arc<str>,
        system_id: Box<str>,
        public_id: Option<Box<str>>,
        in_external_markup: bool,
    },
    ExternalGeneralUnparsedEntity {
        base_uri: Arc<str>,
        system_id: Box<str>,
        public_id: Option<Box<str>>,
        notation_name: Box<str>,
        in_external_markup: bool,
    },
    ExternalParameterEntity {
        base_uri: Arc<str>,
        system_id: Box<str>,
        public_id: Option<Box<str>>,
        in_external_markup: bool,
    },
}

impl EntityDecl {
    pub fn is_parameter_entity(&self) -> bool {
        matches!(
            self,
            Self::InternalParameterEntity { .. } | Self::ExternalParameterEntity { .. }
        )
    }

    pub fn is_unparsed(&self) -> bool {
        matches!(self, Self::ExternalGeneralUnparsedEntity { .. })
    }

    pub fn in_external_markup(&self) -> bool {
        match self {
            Self::InternalGeneralEntity {
                in_external_markup, ..
            }
            | Self::InternalParameterEntity {
                in_external_markup, ..
            }
            | Self::ExternalGeneralParsedEntity {
                in_external_markup, ..
            }
            | Self::ExternalGeneralUnparsedEntity {
                in_external_markup, ..
            }
            | Self::ExternalParameterEntity {
                in_external_markup, ..
            } => *in_external_markup,
        }
    }
}

fn predefined(replacement_text: &str) -> EntityDecl {
    EntityDecl::InternalGeneralEntity {
        base_uri: "#predefined".into(),
        replacement_text: replacement_text.into(),
        in_external_markup: false,
    }
}

static PREDEFINED_ENTITY_LT: LazyLock<EntityDecl> = LazyLock::new(|| predefined("&#60;"));
static PREDEFINED_ENTITY_GT: LazyLock<EntityDecl> = LazyLock::new(|| predefined(">"));
static PREDEFINED_ENTITY_AMP: LazyLock<EntityDecl> = LazyLock::new(|| predefined("&#38;"));
static PREDEFINED_ENTITY_APOS: LazyLock<EntityDecl> = LazyLock::new(|| predefined("'"));
static PREDEFINED_ENTITY_QUOT: LazyLock<EntityDecl> = LazyLock::new(|| predefined("\""));

/// Returns the expansion of the five predefined entities.
pub fn predefined_entity_char(name: &str) -> Option<char> {
    match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "apos" => Some('\''),
        "quot" => Some('"'),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NotationDecl {
    pub name: Arc<str>,
    pub public_id: Option<Box<str>>,
    pub system_id: Option<Box<str>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributeDef {
    pub name: Arc<str>,
    /// The id of the owning element declaration.
    pub element: usize,
    pub att_type: AttributeType,
    pub default_decl: DefaultDecl,
    pub in_external_markup: bool,
}

#[derive(Debug)]
pub struct DTDElementDecl {
    id: usize,
    name: Arc<str>,
    content_spec: Option<ContentSpec>,
    in_external_markup: bool,
    used: bool,
    attributes: Vec<AttributeDef>,
    content_model: OnceLock<Result<ContentModel, ContentModelError>>,
}

impl DTDElementDecl {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    /// `None` if the element is only referenced by an attribute-list declaration or a
    /// content model, and never declared.
    pub fn content_spec(&self) -> Option<&ContentSpec> {
        self.content_spec.as_ref()
    }

    pub fn is_declared(&self) -> bool {
        self.content_spec.is_some()
    }

    /// Check if the element appears in some content model or attribute-list declaration.
    pub fn is_used(&self) -> bool {
        self.used
    }

    pub fn in_external_markup(&self) -> bool {
        self.in_external_markup
    }

    /// Check if this element has element content declared in the external subset.
    ///
    /// Whitespace in such elements is significant to the standalone declaration.
    pub fn has_external_element_content(&self) -> bool {
        self.in_external_markup && matches!(self.content_spec, Some(ContentSpec::Children(_)))
    }

    pub fn attributes(&self) -> &[AttributeDef] {
        &self.attributes
    }

    pub fn get_attribute_def(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.iter().find(|def| def.name.as_ref() == name)
    }

    pub fn id_attribute(&self) -> Option<&AttributeDef> {
        self.attributes
            .iter()
            .find(|def| def.att_type == AttributeType::ID)
    }

    /// The compiled content model, built on first use.
    ///
    /// Returns `Ok(None)` for undeclared elements.
    pub fn content_model(&self) -> Result<Option<&ContentModel>, ContentModelError> {
        let Some(spec) = self.content_spec.as_ref() else {
            return Ok(None);
        };
        self.content_model
            .get_or_init(|| match spec {
                ContentSpec::EMPTY => Ok(ContentModel::empty()),
                ContentSpec::ANY => Ok(ContentModel::any()),
                ContentSpec::Mixed(names) => Ok(ContentModel::mixed(
                    names.iter().map(|name| ElementName::new(None, name)),
                )),
                ContentSpec::Children(particle) => ContentModel::build(particle),
            })
            .as_ref()
            .map(Some)
            .map_err(Clone::clone)
    }
}

/// The declarations of one document type definition.
#[derive(Debug)]
pub struct DTDGrammar {
    root_name: Arc<str>,
    public_id: Option<Arc<str>>,
    system_id: Option<Arc<str>>,
    state: GrammarState,
    has_internal_subset: bool,
    elements: Vec<DTDElementDecl>,
    element_index: FastHashMap<Arc<str>, usize>,
    general_entities: FastHashMap<Arc<str>, EntityDecl>,
    parameter_entities: FastHashMap<Arc<str>, EntityDecl>,
    notations: FastHashMap<Arc<str>, NotationDecl>,
}

impl DTDGrammar {
    pub fn new(root_name: &str, public_id: Option<&str>, system_id: Option<&str>) -> Self {
        Self {
            root_name: root_name.into(),
            public_id: public_id.map(Arc::from),
            system_id: system_id.map(Arc::from),
            state: GrammarState::Building,
            has_internal_subset: false,
            elements: vec![],
            element_index: FastHashMap::default(),
            general_entities: FastHashMap::default(),
            parameter_entities: FastHashMap::default(),
            notations: FastHashMap::default(),
        }
    }

    pub fn key(&self) -> GrammarKey {
        GrammarKey::dtd(self.system_id.as_deref())
    }

    pub fn state(&self) -> GrammarState {
        self.state
    }

    /// Mark the grammar complete. No declarations can be added afterwards.
    pub fn set_validated(&mut self) {
        self.state = GrammarState::Validated;
    }

    pub fn root_name(&self) -> &str {
        &self.root_name
    }

    pub fn public_id(&self) -> Option<&str> {
        self.public_id.as_deref()
    }

    pub fn system_id(&self) -> Option<&str> {
        self.system_id.as_deref()
    }

    pub fn has_internal_subset(&self) -> bool {
        self.has_internal_subset
    }

    pub(crate) fn set_has_internal_subset(&mut self) {
        self.has_internal_subset = true;
    }

    fn check_mutable(&self) -> Result<(), XMLError> {
        if self.state != GrammarState::Building {
            return Err(XMLError::GrammarNotMutable);
        }
        Ok(())
    }

    /// Get the id of the declaration for `name`, creating an undeclared entry if absent.
    pub fn find_or_add_elem_decl(&mut self, name: &str) -> Result<usize, XMLError> {
        self.check_mutable()?;
        if let Some(&id) = self.element_index.get(name) {
            return Ok(id);
        }
        let id = self.elements.len();
        let name: Arc<str> = name.into();
        self.elements.push(DTDElementDecl {
            id,
            name: name.clone(),
            content_spec: None,
            in_external_markup: false,
            used: false,
            attributes: vec![],
            content_model: OnceLock::new(),
        });
        self.element_index.insert(name, id);
        Ok(id)
    }

    /// Declare the content of `name`.
    ///
    /// # Errors
    /// - [`XMLError::ParserDuplicateElementDecl`] if `name` is already declared.
    /// - [`XMLError::GrammarNotMutable`] if the grammar is no longer being built.
    pub fn declare_element(
        &mut self,
        name: &str,
        content_spec: ContentSpec,
        in_external_markup: bool,
    ) -> Result<usize, XMLError> {
        let id = self.find_or_add_elem_decl(name)?;
        if let ContentSpec::Mixed(names) = &content_spec {
            for child in names {
                self.mark_used(child)?;
            }
        } else if let ContentSpec::Children(particle) = &content_spec {
            let mut names = vec![];
            collect_leaves(particle, &mut names);
            for child in names {
                self.mark_used(&child)?;
            }
        }
        let decl = &mut self.elements[id];
        if decl.content_spec.is_some() {
            return Err(XMLError::ParserDuplicateElementDecl);
        }
        decl.content_spec = Some(content_spec);
        decl.in_external_markup = in_external_markup;
        Ok(id)
    }

    fn mark_used(&mut self, name: &str) -> Result<(), XMLError> {
        let id = self.find_or_add_elem_decl(name)?;
        self.elements[id].used = true;
        Ok(())
    }

    pub fn get_elem_decl(&self, name: &str) -> Option<&DTDElementDecl> {
        self.element_index
            .get(name)
            .and_then(|&id| self.elements.get(id))
    }

    pub fn elem_decl(&self, id: usize) -> Option<&DTDElementDecl> {
        self.elements.get(id)
    }

    pub fn elements(&self) -> impl Iterator<Item = &DTDElementDecl> {
        self.elements.iter()
    }

    /// Add an attribute definition to `element`.
    ///
    /// Returns `Ok(false)` if the attribute is already defined. The first definition is
    /// binding and later ones are ignored.
    pub fn add_attribute_def(
        &mut self,
        element: &str,
        name: &str,
        att_type: AttributeType,
        default_decl: DefaultDecl,
        in_external_markup: bool,
    ) -> Result<bool, XMLError> {
        let id = self.find_or_add_elem_decl(element)?;
        let decl = &mut self.elements[id];
        if decl.get_attribute_def(name).is_some() {
            return Ok(false);
        }
        decl.attributes.push(AttributeDef {
            name: name.into(),
            element: id,
            att_type,
            default_decl,
            in_external_markup,
        });
        Ok(true)
    }

    /// Returns `Ok(false)` if an entity with the same name is already declared.
    pub fn add_entity(&mut self, name: &str, decl: EntityDecl) -> Result<bool, XMLError> {
        self.check_mutable()?;
        let map = if decl.is_parameter_entity() {
            &mut self.parameter_entities
        } else {
            &mut self.general_entities
        };
        if map.contains_key(name) {
            return Ok(false);
        }
        map.insert(name.into(), decl);
        Ok(true)
    }

    /// Get a general entity, including the predefined ones.
    pub fn get_entity(&self, name: &str) -> Option<&EntityDecl> {
        if let Some(decl) = self.general_entities.get(name) {
            return Some(decl);
        }

        match name {
            "lt" => Some(&PREDEFINED_ENTITY_LT),
            "gt" => Some(&PREDEFINED_ENTITY_GT),
            "amp" => Some(&PREDEFINED_ENTITY_AMP),
            "apos" => Some(&PREDEFINED_ENTITY_APOS),
            "quot" => Some(&PREDEFINED_ENTITY_QUOT),
            _ => None,
        }
    }

    pub fn get_parameter_entity(&self, name: &str) -> Option<&EntityDecl> {
        self.parameter_entities.get(name)
    }

    pub fn has_parameter_entities(&self) -> bool {
        !self.parameter_entities.is_empty()
    }

    pub fn entities(&self) -> impl Iterator<Item = (&Arc<str>, &EntityDecl)> {
        self.general_entities.iter()
    }

    /// Returns `Ok(false)` if a notation with the same name is already declared.
    pub fn add_notation(&mut self, decl: NotationDecl) -> Result<bool, XMLError> {
        self.check_mutable()?;
        if self.notations.contains_key(&decl.name) {
            return Ok(false);
        }
        self.notations.insert(decl.name.clone(), decl);
        Ok(true)
    }

    pub fn get_notation(&self, name: &str) -> Option<&NotationDecl> {
        self.notations.get(name)
    }

    pub fn notations(&self) -> impl Iterator<Item = &NotationDecl> {
        self.notations.values()
    }

    pub fn prebuild_content_models(&self) {
        for decl in &self.elements {
            if let Err(err) = decl.content_model() {
                log::warn!("content model of '{}' cannot be built: {err:?}", decl.name);
            }
        }
    }
}

fn collect_leaves(particle: &ContentParticle, out: &mut Vec<Arc<str>>) {
    match particle {
        ContentParticle::Leaf(name) => out.push(name.local_name.clone()),
        ContentParticle::Wildcard(_) => {}
        ContentParticle::Sequence(children)
        | ContentParticle::Choice(children)
        | ContentParticle::All(children) => {
            for child in children {
                collect_leaves(child, out);
            }
        }
        ContentParticle::Repeat { particle, .. } => collect_leaves(particle, out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn children(spec: ContentParticle) -> ContentSpec {
        ContentSpec::Children(spec)
    }

    #[test]
    fn declaration_tests() {
        let mut dtd = DTDGrammar::new("doc", None, None);
        let particle = ContentParticle::Sequence(vec![
            ContentParticle::leaf(None, "a"),
            ContentParticle::leaf(None, "b").optional(),
        ]);
        let id = dtd.declare_element("doc", children(particle), false).unwrap();
        assert_eq!(dtd.get_elem_decl("doc").unwrap().id(), id);
        // referenced, but not declared
        let a = dtd.get_elem_decl("a").unwrap();
        assert!(!a.is_declared());
        assert!(a.is_used());
        assert!(matches!(
            dtd.declare_element("doc", ContentSpec::EMPTY, false),
            Err(XMLError::ParserDuplicateElementDecl)
        ));
        assert_eq!(
            dtd.get_elem_decl("doc").unwrap().content_spec().unwrap().to_string(),
            "(a,b?)"
        );
    }

    #[test]
    fn attribute_def_tests() {
        let mut dtd = DTDGrammar::new("doc", None, None);
        assert!(
            dtd.add_attribute_def("doc", "id", AttributeType::ID, DefaultDecl::IMPLIED, false)
                .unwrap()
        );
        assert!(
            !dtd.add_attribute_def("doc", "id", AttributeType::CDATA, DefaultDecl::REQUIRED, false)
                .unwrap()
        );
        let decl = dtd.get_elem_decl("doc").unwrap();
        assert_eq!(decl.id_attribute().unwrap().att_type, AttributeType::ID);
        assert_eq!(decl.attributes().len(), 1);
    }

    #[test]
    fn entity_tests() {
        let mut dtd = DTDGrammar::new("doc", None, None);
        let decl = EntityDecl::InternalGeneralEntity {
            base_uri: "file:///doc.xml".into(),
            replacement_text: "text".into(),
            in_external_markup: false,
        };
        assert!(dtd.add_entity("e", decl.clone()).unwrap());
        assert!(!dtd.add_entity("e", decl).unwrap());
        assert!(dtd.get_entity("amp").is_some());
        assert!(dtd.get_parameter_entity("e").is_none());

        dtd.set_validated();
        assert!(matches!(
            dtd.find_or_add_elem_decl("late"),
            Err(XMLError::GrammarNotMutable)
        ));
    }

    #[test]
    fn content_model_tests() {
        let mut dtd = DTDGrammar::new("doc", None, None);
        dtd.declare_element("p", ContentSpec::Mixed(vec!["b".into()]), false)
            .unwrap();
        let model = dtd.get_elem_decl("p").unwrap().content_model().unwrap().unwrap();
        assert!(model.is_mixed());
        assert!(dtd.get_elem_decl("b").unwrap().content_model().unwrap().is_none());
    }
}
